//! # Requirements and Context
//!
//! The seam between the loot engine and the game. A [`LootContext`] carries
//! the acting holder and named arguments for one attempt; a [`Requirement`]
//! is a predicate over that context.
//!
//! Real requirements (biome checks, permissions, weather...) live in the
//! game integration layer and are injected through a [`RequirementFactory`].
//! [`BuiltinRequirements`] covers the context-only cases.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{LootError, LootResult};

/// Per-attempt context: who is fishing, and where.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LootContext {
    holder: String,
    args: HashMap<String, String>,
}

impl LootContext {
    /// Creates a context for the given holder (usually a player name).
    #[must_use]
    pub fn new(holder: impl Into<String>) -> Self {
        Self {
            holder: holder.into(),
            args: HashMap::new(),
        }
    }

    /// Adds a named argument.
    #[must_use]
    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }

    /// The acting holder.
    #[must_use]
    pub fn holder(&self) -> &str {
        &self.holder
    }

    /// Looks up a named argument.
    #[must_use]
    pub fn arg(&self, key: &str) -> Option<&str> {
        self.args.get(key).map(String::as_str)
    }

    /// Replaces `{player}` and `{<arg>}` tokens with their values.
    ///
    /// Unknown tokens are left in place. `{{...}}` blocks are skipped
    /// untouched; they belong to the aggregate table.
    #[must_use]
    pub fn substitute(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;

        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let tail = &rest[open..];

            if tail.starts_with("{{") {
                let end = tail.find("}}").map_or(tail.len(), |i| i + 2);
                out.push_str(&tail[..end]);
                rest = &tail[end..];
                continue;
            }

            let Some(close) = tail.find('}') else {
                out.push_str(tail);
                rest = "";
                break;
            };
            let key = &tail[1..close];
            match self.lookup(key) {
                Some(value) => out.push_str(value),
                None => out.push_str(&tail[..=close]),
            }
            rest = &tail[close + 1..];
        }

        out.push_str(rest);
        out
    }

    fn lookup(&self, key: &str) -> Option<&str> {
        if key == "player" {
            Some(&self.holder)
        } else {
            self.arg(key)
        }
    }
}

/// A gating predicate on a group.
pub trait Requirement: Send + Sync + fmt::Debug {
    /// Whether the requirement holds for this attempt.
    fn is_satisfied(&self, context: &LootContext) -> bool;

    /// Outcome known without any context, if there is one.
    ///
    /// Probability analysis runs context-free; a group whose requirement
    /// reports `Some(false)` here can never be reached and is excluded.
    fn static_outcome(&self) -> Option<bool> {
        None
    }

    /// Short human-readable label.
    ///
    /// # Errors
    ///
    /// Returns [`LootError::Requirement`] if the label cannot be produced.
    fn describe(&self) -> LootResult<String>;
}

/// Shared handle to a requirement.
pub type RequirementRef = Arc<dyn Requirement>;

/// Evaluates requirements in order, stopping at the first failure.
#[must_use]
pub fn all_satisfied(requirements: &[RequirementRef], context: &LootContext) -> bool {
    requirements.iter().all(|r| r.is_satisfied(context))
}

/// Builds requirements from a group's `conditions` table.
pub trait RequirementFactory: Send + Sync {
    /// Builds the ordered requirement list for one group.
    ///
    /// # Errors
    ///
    /// Returns an error if a condition is unknown or malformed. Unknown
    /// conditions are fatal: dropping one would silently ungate a group.
    fn build(&self, conditions: &toml::Table) -> LootResult<Vec<RequirementRef>>;
}

/// Always or never satisfied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Constant(pub bool);

impl Requirement for Constant {
    fn is_satisfied(&self, _context: &LootContext) -> bool {
        self.0
    }

    fn static_outcome(&self) -> Option<bool> {
        Some(self.0)
    }

    fn describe(&self) -> LootResult<String> {
        Ok(if self.0 { "always" } else { "never" }.to_string())
    }
}

/// Satisfied when a context argument equals one of the allowed values.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArgIn {
    key: String,
    allowed: Vec<String>,
}

impl ArgIn {
    /// Creates the requirement.
    #[must_use]
    pub fn new(key: impl Into<String>, allowed: Vec<String>) -> Self {
        Self {
            key: key.into(),
            allowed,
        }
    }
}

impl Requirement for ArgIn {
    fn is_satisfied(&self, context: &LootContext) -> bool {
        context
            .arg(&self.key)
            .is_some_and(|value| self.allowed.iter().any(|a| a == value))
    }

    fn static_outcome(&self) -> Option<bool> {
        // Nothing allowed means nothing can ever match.
        self.allowed.is_empty().then_some(false)
    }

    fn describe(&self) -> LootResult<String> {
        Ok(format!("{} in [{}]", self.key, self.allowed.join(", ")))
    }
}

/// Satisfied when the holder is one of the listed names.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HolderIn(pub Vec<String>);

impl Requirement for HolderIn {
    fn is_satisfied(&self, context: &LootContext) -> bool {
        self.0.iter().any(|name| name == context.holder())
    }

    fn static_outcome(&self) -> Option<bool> {
        self.0.is_empty().then_some(false)
    }

    fn describe(&self) -> LootResult<String> {
        Ok(format!("holder in [{}]", self.0.join(", ")))
    }
}

/// Factory for the context-only requirements.
///
/// ```toml
/// conditions = { never = true }
/// conditions = { arg = { environment = ["ocean", "river"] } }
/// conditions = { holder = ["Steve"] }
/// ```
#[derive(Clone, Copy, Debug, Default)]
pub struct BuiltinRequirements;

impl RequirementFactory for BuiltinRequirements {
    fn build(&self, conditions: &toml::Table) -> LootResult<Vec<RequirementRef>> {
        let mut requirements: Vec<RequirementRef> = Vec::with_capacity(conditions.len());

        for (kind, value) in conditions {
            match kind.as_str() {
                "always" | "never" => {
                    let flag = value.as_bool().ok_or_else(|| {
                        LootError::Requirement(format!("{kind} expects a boolean"))
                    })?;
                    let holds = if kind == "always" { flag } else { !flag };
                    requirements.push(Arc::new(Constant(holds)));
                }
                "arg" => {
                    let table = value.as_table().ok_or_else(|| {
                        LootError::Requirement("arg expects a table of key = [values]".into())
                    })?;
                    for (key, allowed) in table {
                        requirements.push(Arc::new(ArgIn::new(key.clone(), string_list(allowed)?)));
                    }
                }
                "holder" => {
                    requirements.push(Arc::new(HolderIn(string_list(value)?)));
                }
                other => {
                    return Err(LootError::Requirement(format!("unknown condition '{other}'")));
                }
            }
        }

        Ok(requirements)
    }
}

/// Accepts a single string or an array of strings.
fn string_list(value: &toml::Value) -> LootResult<Vec<String>> {
    match value {
        toml::Value::String(s) => Ok(vec![s.clone()]),
        toml::Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| LootError::Requirement(format!("expected string, got {item}")))
            })
            .collect(),
        other => Err(LootError::Requirement(format!("expected string list, got {other}"))),
    }
}
