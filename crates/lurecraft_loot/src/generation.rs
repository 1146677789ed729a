//! # Configuration Generations
//!
//! Everything a reload produces lives in one immutable [`LootGeneration`].
//! Readers take an `Arc` to the current generation and keep using it until
//! they finish, so a reload never tears a selection in half:
//!
//! ```text
//!   reader A ──► Arc<gen 3> ─────────────────────► done (still gen 3)
//!   reload   ──────────────► swap(gen 4)
//!   reader B ─────────────────────────► Arc<gen 4>
//! ```

use parking_lot::RwLock;
use std::sync::Arc;

use crate::aggregate::{AggregateMemo, GroupAggregates};
use crate::conditional::LootTree;
use crate::config::LootSettings;
use crate::loot::LootRegistry;

/// One loaded configuration.
#[derive(Debug)]
pub struct LootGeneration {
    number: u64,
    registry: LootRegistry,
    tree: LootTree,
    settings: LootSettings,
    aggregates: AggregateMemo,
}

impl LootGeneration {
    /// Creates a generation. Aggregates are computed on first use.
    #[must_use]
    pub fn new(number: u64, registry: LootRegistry, tree: LootTree, settings: LootSettings) -> Self {
        Self {
            number,
            registry,
            tree,
            settings,
            aggregates: AggregateMemo::new(),
        }
    }

    /// Generation 0: nothing loaded.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(0, LootRegistry::new(), LootTree::default(), LootSettings::default())
    }

    /// Monotonic reload counter.
    #[must_use]
    pub const fn number(&self) -> u64 {
        self.number
    }

    /// Registered loot.
    #[must_use]
    pub const fn registry(&self) -> &LootRegistry {
        &self.registry
    }

    /// Group tree.
    #[must_use]
    pub const fn tree(&self) -> &LootTree {
        &self.tree
    }

    /// Engine settings.
    #[must_use]
    pub const fn settings(&self) -> &LootSettings {
        &self.settings
    }

    /// The aggregate table, built once on first call.
    pub fn aggregates(&self) -> Arc<GroupAggregates> {
        self.aggregates.get_or_compute(|| {
            GroupAggregates::compute(
                &self.tree,
                &self.registry,
                &self.settings.combination_separator,
            )
        })
    }

    /// Whether [`Self::aggregates`] has run.
    #[must_use]
    pub fn aggregates_ready(&self) -> bool {
        self.aggregates.is_computed()
    }
}

/// The slot holding the current generation.
#[derive(Debug)]
pub struct GenerationCell {
    current: RwLock<Arc<LootGeneration>>,
}

impl GenerationCell {
    /// Creates a cell holding `generation`.
    #[must_use]
    pub fn new(generation: LootGeneration) -> Self {
        Self {
            current: RwLock::new(Arc::new(generation)),
        }
    }

    /// The current generation.
    #[must_use]
    pub fn load(&self) -> Arc<LootGeneration> {
        Arc::clone(&self.current.read())
    }

    /// Number of the current generation.
    #[must_use]
    pub fn number(&self) -> u64 {
        self.current.read().number()
    }

    /// Installs `generation` and returns the one it replaced.
    pub fn swap(&self, generation: LootGeneration) -> Arc<LootGeneration> {
        std::mem::replace(&mut *self.current.write(), Arc::new(generation))
    }
}

impl Default for GenerationCell {
    fn default() -> Self {
        Self::new(LootGeneration::empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditional::{ConditionalElement, LootTarget};
    use crate::loot::Loot;
    use indexmap::IndexMap;

    fn generation(number: u64) -> LootGeneration {
        let mut registry = LootRegistry::new();
        registry
            .register(Loot::builder("tuna").groups(["ocean", "no_star"]).build())
            .unwrap();
        let tree = LootTree::new(IndexMap::from([(
            "global".to_string(),
            ConditionalElement::new().with_rule(LootTarget::Loot("tuna".into()), 40.0),
        )]))
        .unwrap();
        LootGeneration::new(number, registry, tree, LootSettings::default())
    }

    #[test]
    fn test_aggregates_are_lazy_and_shared() {
        let generation = generation(1);
        assert!(!generation.aggregates_ready());
        let first = generation.aggregates();
        assert!(generation.aggregates_ready());
        assert!(Arc::ptr_eq(&first, &generation.aggregates()));
        assert_eq!(first.total("ocean&no_star"), Some(40.0));
    }

    #[test]
    fn test_swap_keeps_old_readers_valid() {
        let cell = GenerationCell::default();
        assert_eq!(cell.number(), 0);

        let held = cell.load();
        let old = cell.swap(generation(1));
        assert!(Arc::ptr_eq(&held, &old));
        assert_eq!(held.number(), 0);
        assert!(held.registry().is_empty());

        assert_eq!(cell.number(), 1);
        assert!(cell.load().registry().contains("tuna"));
    }
}
