//! # Loot Error Types
//!
//! All errors that can occur while loading, selecting or analysing loot.
//!
//! Structural errors abort a reload: [`LootError::DuplicateLoot`],
//! [`LootError::CyclicGroup`], [`LootError::InvalidConfig`], and a
//! [`LootError::Requirement`] raised while building conditions. Everything
//! else is handled where it happens: the offending rule is skipped or its
//! weight drops to zero, and the rest of the table keeps working.

use thiserror::Error;

/// Errors that can occur in the loot engine.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LootError {
    /// A rule target is neither a registered loot nor a combination.
    #[error("group {group}: target {target} is not a registered loot")]
    ConfigurationReference {
        /// Group that declared the rule.
        group: String,
        /// The unresolved target.
        target: String,
    },

    /// An expression references a combination with no aggregate entry.
    #[error("no aggregate weight for {key} in expression {expression}")]
    UnresolvedPlaceholder {
        /// The expression being resolved.
        expression: String,
        /// Canonical combination key that was looked up.
        key: String,
    },

    /// An expression could not be evaluated.
    #[error("cannot evaluate {expression}: {reason}")]
    Evaluation {
        /// The expression text after substitution.
        expression: String,
        /// What went wrong.
        reason: String,
    },

    /// Nothing had positive weight at selection time.
    #[error("no eligible loot")]
    NoEligibleLoot,

    /// Two loot sections share an id.
    #[error("duplicate loot id: {0}")]
    DuplicateLoot(String),

    /// A group repeats the name of one of its ancestors.
    #[error("cyclic group reference: {0}")]
    CyclicGroup(String),

    /// A group's combined weight is not a finite number.
    #[error("group {group} has a non-finite total weight")]
    NonFiniteWeight {
        /// The offending group.
        group: String,
    },

    /// A requirement could not be built or described.
    #[error("requirement error: {0}")]
    Requirement(String),

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl LootError {
    /// Shorthand for an evaluation failure.
    pub(crate) fn evaluation(expression: &str, reason: impl Into<String>) -> Self {
        Self::Evaluation {
            expression: expression.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type for loot operations.
pub type LootResult<T> = Result<T, LootError>;
