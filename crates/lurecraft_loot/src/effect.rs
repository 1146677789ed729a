//! # Attempt Effects
//!
//! Per-attempt weight modifiers: baits, rods, enchantments, events. An
//! [`Effect`] is built for one fishing attempt, applied to that attempt's
//! weight map, and thrown away.
//!
//! Modifiers apply in declaration order and only touch loot already in the
//! map with a positive weight; an effect can make an eligible loot likelier,
//! never make an ineligible one appear. A weight an earlier modifier drove to
//! zero stays at zero.

use indexmap::IndexMap;

use crate::loot::LootRegistry;

/// Which entries a modifier applies to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModifierTarget {
    /// One loot id.
    Loot(String),
    /// Every loot carrying this tag.
    Tag(String),
}

/// How a modifier changes a weight.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ModifierOp {
    /// `weight + value`
    Add(f64),
    /// `weight * value`
    Multiply(f64),
}

impl ModifierOp {
    /// Applies to a positive weight in place, clamping at zero.
    fn adjust(self, weight: &mut f64) {
        if *weight <= 0.0 {
            return;
        }
        let changed = match self {
            Self::Add(value) => *weight + value,
            Self::Multiply(value) => *weight * value,
        };
        *weight = changed.max(0.0);
    }
}

/// One weight modifier.
#[derive(Clone, Debug, PartialEq)]
pub struct WeightModifier {
    /// Entries affected.
    pub target: ModifierTarget,
    /// Change applied.
    pub op: ModifierOp,
}

/// The modifier set for one attempt.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Effect {
    modifiers: Vec<WeightModifier>,
}

impl Effect {
    /// An effect with no modifiers.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Adds a modifier.
    #[must_use]
    pub fn with(mut self, target: ModifierTarget, op: ModifierOp) -> Self {
        self.modifiers.push(WeightModifier { target, op });
        self
    }

    /// Adds `value` to one loot.
    #[must_use]
    pub fn add_loot(self, id: impl Into<String>, value: f64) -> Self {
        self.with(ModifierTarget::Loot(id.into()), ModifierOp::Add(value))
    }

    /// Multiplies one loot by `factor`.
    #[must_use]
    pub fn multiply_loot(self, id: impl Into<String>, factor: f64) -> Self {
        self.with(ModifierTarget::Loot(id.into()), ModifierOp::Multiply(factor))
    }

    /// Adds `value` to every loot with `tag`.
    #[must_use]
    pub fn add_tag(self, tag: impl Into<String>, value: f64) -> Self {
        self.with(ModifierTarget::Tag(tag.into()), ModifierOp::Add(value))
    }

    /// Multiplies every loot with `tag` by `factor`.
    #[must_use]
    pub fn multiply_tag(self, tag: impl Into<String>, factor: f64) -> Self {
        self.with(ModifierTarget::Tag(tag.into()), ModifierOp::Multiply(factor))
    }

    /// The modifiers, in application order.
    #[must_use]
    pub fn modifiers(&self) -> &[WeightModifier] {
        &self.modifiers
    }

    /// Whether the effect changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modifiers.is_empty()
    }

    /// Applies every modifier to `weights`. Entries at or below zero are left
    /// alone; results below zero become zero.
    pub fn apply(&self, weights: &mut IndexMap<String, f64>, registry: &LootRegistry) {
        for modifier in &self.modifiers {
            match &modifier.target {
                ModifierTarget::Loot(id) => {
                    if let Some(weight) = weights.get_mut(id) {
                        modifier.op.adjust(weight);
                    }
                }
                ModifierTarget::Tag(tag) => {
                    for (id, weight) in weights.iter_mut() {
                        let tagged = registry
                            .get(id)
                            .is_some_and(|loot| loot.groups().iter().any(|g| g == tag));
                        if tagged {
                            modifier.op.adjust(weight);
                        }
                    }
                }
            }
        }
    }
}
