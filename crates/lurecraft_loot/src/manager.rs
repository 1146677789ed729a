//! # Loot Manager
//!
//! The one handle the game keeps: reloads, draws, and probability queries.
//!
//! ```text
//!             ┌────────────────── LootManager ──────────────────┐
//!  reload ──► │ build_generation ──► GenerationCell::swap       │
//!             │                  └─► clear probability cache    │
//!  draw   ──► │ load ──► WeightedSelector ──► Arc<Loot>         │
//!  query  ──► │ GroupProbabilityCalculator (cached)             │
//!             └─────────────────────────────────────────────────┘
//! ```
//!
//! Every call works on the generation current when it started. Reloads are
//! serialized among themselves and never block draws beyond the pointer
//! swap.

use indexmap::IndexSet;
use parking_lot::Mutex;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::build_generation;
use crate::effect::Effect;
use crate::error::LootResult;
use crate::generation::{GenerationCell, LootGeneration};
use crate::loot::Loot;
use crate::probability::{GroupProbabilityCalculator, GroupProbabilityInfo};
use crate::requirement::{LootContext, RequirementFactory};
use crate::selector::WeightedSelector;

/// Loot engine facade.
pub struct LootManager {
    factory: Box<dyn RequirementFactory>,
    generations: Arc<GenerationCell>,
    probabilities: GroupProbabilityCalculator,
    reload_lock: Mutex<()>,
}

impl LootManager {
    /// Creates a manager with nothing loaded; conditions are built by
    /// `factory`.
    #[must_use]
    pub fn new(factory: impl RequirementFactory + 'static) -> Self {
        let generations = Arc::new(GenerationCell::default());
        Self {
            factory: Box::new(factory),
            probabilities: GroupProbabilityCalculator::new(Arc::clone(&generations)),
            generations,
            reload_lock: Mutex::new(()),
        }
    }

    /// Loads `config` as the next generation and clears the probability
    /// cache. Returns the new generation number.
    ///
    /// # Errors
    ///
    /// Returns the load error; the previous generation stays in place.
    pub fn reload(&self, config: &toml::Table) -> LootResult<u64> {
        let _guard = self.reload_lock.lock();
        let number = self.generations.number() + 1;

        let generation = build_generation(config, self.factory.as_ref(), number)?;
        let loots = generation.registry().len();
        let groups = generation.tree().group_ids().len();

        self.generations.swap(generation);
        self.probabilities.clear_cache();

        info!("loaded loot generation {} ({} loot, {} groups)", number, loots, groups);
        Ok(number)
    }

    /// The current generation.
    #[must_use]
    pub fn generation(&self) -> Arc<LootGeneration> {
        self.generations.load()
    }

    /// Draws one loot over every top-level group with the thread RNG.
    ///
    /// # Errors
    ///
    /// Returns [`LootError::NoEligibleLoot`] when nothing can be caught.
    ///
    /// [`LootError::NoEligibleLoot`]: crate::error::LootError::NoEligibleLoot
    pub fn get_next_loot(&self, effect: &Effect, context: &LootContext) -> LootResult<Arc<Loot>> {
        self.get_next_loot_with(&mut rand::thread_rng(), effect, context)
    }

    /// [`Self::get_next_loot`] with a caller-supplied RNG.
    ///
    /// # Errors
    ///
    /// See [`Self::get_next_loot`].
    pub fn get_next_loot_with<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        effect: &Effect,
        context: &LootContext,
    ) -> LootResult<Arc<Loot>> {
        let generation = self.generations.load();
        let aggregates = generation.aggregates();
        WeightedSelector::new(generation.registry(), &aggregates).select(
            generation.tree().roots().values(),
            context,
            effect,
            rng,
        )
    }

    /// Draws one loot starting from the named groups only. Names not in
    /// the tree are ignored.
    ///
    /// # Errors
    ///
    /// See [`Self::get_next_loot`].
    pub fn get_next_loot_from<R: Rng + ?Sized>(
        &self,
        groups: &[&str],
        rng: &mut R,
        effect: &Effect,
        context: &LootContext,
    ) -> LootResult<Arc<Loot>> {
        let generation = self.generations.load();
        let aggregates = generation.aggregates();
        let tree = generation.tree();
        let nodes = groups.iter().filter_map(|name| {
            let node = tree.find(name);
            if node.is_none() {
                warn!("no loot group named '{}'", name);
            }
            node
        });
        WeightedSelector::new(generation.registry(), &aggregates).select(nodes, context, effect, rng)
    }

    /// Ids that could be caught right now, in weight-map order.
    #[must_use]
    pub fn get_weighted_loots(&self, effect: &Effect, context: &LootContext) -> IndexSet<String> {
        let generation = self.generations.load();
        let aggregates = generation.aggregates();
        WeightedSelector::new(generation.registry(), &aggregates)
            .effective_weights(generation.tree().roots().values(), context, effect)
            .into_iter()
            .filter(|(_, weight)| *weight > 0.0)
            .map(|(id, _)| id)
            .collect()
    }

    /// Looks up a loot in the current generation.
    #[must_use]
    pub fn get_loot(&self, id: &str) -> Option<Arc<Loot>> {
        self.generations.load().registry().get(id).cloned()
    }

    /// Every loot in the current generation, in registration order.
    #[must_use]
    pub fn registered_loots(&self) -> Vec<Arc<Loot>> {
        self.generations.load().registry().iter().cloned().collect()
    }

    /// See [`GroupProbabilityCalculator::calculate_group_probabilities`].
    #[must_use]
    pub fn calculate_group_probabilities(&self, loot_id: &str) -> HashMap<String, GroupProbabilityInfo> {
        self.probabilities.calculate_group_probabilities(loot_id)
    }

    /// See [`GroupProbabilityCalculator::get_loot_groups`].
    #[must_use]
    pub fn get_loot_groups(&self, loot_id: &str) -> Vec<String> {
        self.probabilities.get_loot_groups(loot_id)
    }

    /// See [`GroupProbabilityCalculator::get_group_probability`].
    #[must_use]
    pub fn get_group_probability(&self, loot_id: &str, group_id: &str) -> Option<GroupProbabilityInfo> {
        self.probabilities.get_group_probability(loot_id, group_id)
    }

    /// Drops cached probability results.
    pub fn clear_cache(&self) {
        self.probabilities.clear_cache();
    }

    /// The probability calculator.
    #[must_use]
    pub const fn probabilities(&self) -> &GroupProbabilityCalculator {
        &self.probabilities
    }
}

impl std::fmt::Debug for LootManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LootManager")
            .field("generation", &self.generations.number())
            .finish_non_exhaustive()
    }
}
