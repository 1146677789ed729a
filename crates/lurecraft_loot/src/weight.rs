//! # Weight Operations
//!
//! A rule's weight is either a plain number or an expression resolved at
//! selection time.
//!
//! ## Resolution Order
//!
//! ```text
//! "{{group_ocean&no_star}} * 0.5 + {depth}"
//!        │
//!        ▼  aggregate tokens     (no_star&ocean -> 150)
//! "150 * 0.5 + {depth}"
//!        │
//!        ▼  context tokens       ({depth} -> 12)
//! "150 * 0.5 + 12"
//!        │
//!        ▼  evaluate
//! 87.0
//! ```
//!
//! Live resolution never fails outright: every error becomes weight 0 and a
//! warning. Analysis resolution falls back to a configurable weight instead,
//! since it has no context to work with.

use tracing::{debug, warn};

use crate::aggregate::GroupAggregates;
use crate::error::{LootError, LootResult};
use crate::expression;
use crate::requirement::LootContext;

/// Opening token of an aggregate placeholder.
pub const GROUP_PLACEHOLDER_OPEN: &str = "{{group_";
/// Closing token of an aggregate placeholder.
pub const GROUP_PLACEHOLDER_CLOSE: &str = "}}";

/// The weight of one rule.
#[derive(Clone, Debug, PartialEq)]
pub enum WeightOperation {
    /// A fixed weight.
    Constant(f64),
    /// An arithmetic expression with placeholders.
    Expression(String),
}

impl WeightOperation {
    /// Parses a configured weight: a number becomes [`Self::Constant`],
    /// anything else an [`Self::Expression`].
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        match raw.parse::<f64>() {
            Ok(value) if value.is_finite() => Self::Constant(value),
            _ => Self::Expression(raw.to_string()),
        }
    }

    /// The constant value, if this is a constant.
    #[must_use]
    pub const fn as_constant(&self) -> Option<f64> {
        match self {
            Self::Constant(value) => Some(*value),
            Self::Expression(_) => None,
        }
    }

    /// The expression text, if this is an expression.
    #[must_use]
    pub fn as_expression(&self) -> Option<&str> {
        match self {
            Self::Constant(_) => None,
            Self::Expression(text) => Some(text),
        }
    }

    /// Resolves the weight for a live selection. Never negative.
    ///
    /// Unresolved aggregate placeholders and evaluation failures are logged
    /// and yield 0, which excludes the rule from this draw.
    #[must_use]
    pub fn resolve(&self, context: &LootContext, aggregates: &GroupAggregates) -> f64 {
        let text = match self {
            Self::Constant(value) => return clamp(*value),
            Self::Expression(text) => text,
        };

        // Aggregates first: argument values are pasted verbatim and must not
        // be able to introduce a group lookup.
        let result = substitute_group_placeholders(text, aggregates)
            .and_then(|resolved| expression::evaluate(&context.substitute(&resolved)));

        match result {
            Ok(value) => clamp(value),
            Err(err) => {
                warn!("weight '{}' resolved to 0: {}", text, err);
                0.0
            }
        }
    }

    /// Resolves the weight without a context, for probability analysis.
    ///
    /// Expressions that still depend on the context, reference a missing
    /// aggregate, or fail to evaluate yield `fallback`.
    #[must_use]
    pub fn resolve_static(&self, aggregates: &GroupAggregates, fallback: f64) -> f64 {
        let text = match self {
            Self::Constant(value) => return clamp(*value),
            Self::Expression(text) => text,
        };

        let resolved = match substitute_group_placeholders(text, aggregates) {
            Ok(resolved) => resolved,
            Err(err) => {
                warn!("analysis weight '{}' falls back to {}: {}", text, fallback, err);
                return fallback;
            }
        };

        if has_context_placeholder(&resolved) {
            debug!("analysis weight '{}' depends on context, using {}", text, fallback);
            return fallback;
        }

        match expression::evaluate(&resolved) {
            Ok(value) => clamp(value),
            Err(err) => {
                warn!("analysis weight '{}' falls back to {}: {}", text, fallback, err);
                fallback
            }
        }
    }

    /// Resolves a plain numeric value (scores and the like), without any
    /// aggregate table. Failures yield 0.
    #[must_use]
    pub fn resolve_value(&self, context: &LootContext) -> f64 {
        match self {
            Self::Constant(value) => *value,
            Self::Expression(text) => expression::evaluate(&context.substitute(text))
                .unwrap_or_else(|err| {
                    warn!("value '{}' resolved to 0: {}", text, err);
                    0.0
                }),
        }
    }
}

impl From<f64> for WeightOperation {
    fn from(value: f64) -> Self {
        Self::Constant(value)
    }
}

/// Replaces every `{{group_<combo>}}` token with its aggregate total.
///
/// # Errors
///
/// Returns [`LootError::UnresolvedPlaceholder`] for the first token with no
/// positive entry, and [`LootError::Evaluation`] for an unterminated token.
pub fn substitute_group_placeholders(
    text: &str,
    aggregates: &GroupAggregates,
) -> LootResult<String> {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find(GROUP_PLACEHOLDER_OPEN) {
        out.push_str(&rest[..start]);
        let body_start = start + GROUP_PLACEHOLDER_OPEN.len();
        let Some(len) = rest[body_start..].find(GROUP_PLACEHOLDER_CLOSE) else {
            return Err(LootError::evaluation(text, "unterminated group placeholder"));
        };

        let combo = &rest[body_start..body_start + len];
        let key = aggregates.canonical_key(combo);
        match aggregates.total(&key) {
            Some(total) if total > 0.0 => out.push_str(&total.to_string()),
            _ => {
                return Err(LootError::UnresolvedPlaceholder {
                    expression: text.to_string(),
                    key,
                })
            }
        }
        rest = &rest[body_start + len + GROUP_PLACEHOLDER_CLOSE.len()..];
    }

    out.push_str(rest);
    Ok(out)
}

/// `{token}` or `%token%` left after aggregate substitution.
fn has_context_placeholder(text: &str) -> bool {
    text.contains('{')
        || text
            .split('%')
            .skip(1)
            .any(|tail| tail.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_'))
}

/// Negative and non-finite weights exclude the rule.
fn clamp(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}
