//! # Weighted Selection
//!
//! One fishing attempt, start to finish:
//!
//! ```text
//! groups ──► requirements? ──► resolve rules ──► merge children ──► effect ──► sample
//!              │ no                 │
//!              ▼                    ▼
//!        skip subtree     combination targets expand to
//!                         every matching item loot
//! ```
//!
//! ## Sampling
//!
//! Cumulative weights over the positive entries, in insertion order. A draw
//! `r` in `[0, total)` picks the first entry whose running total exceeds it.
//! Insertion order is fixed per generation, so a seeded RNG reproduces the
//! same sequence of picks.

use indexmap::IndexMap;
use rand::Rng;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::aggregate::GroupAggregates;
use crate::conditional::{ConditionalElement, LootTarget, WeightRule};
use crate::effect::Effect;
use crate::error::{LootError, LootResult};
use crate::loot::{Loot, LootRegistry};
use crate::requirement::LootContext;
use crate::weight::WeightOperation;

/// Selects loot from a generation's registry and aggregate table.
#[derive(Clone, Copy, Debug)]
pub struct WeightedSelector<'a> {
    registry: &'a LootRegistry,
    aggregates: &'a GroupAggregates,
}

impl<'a> WeightedSelector<'a> {
    /// Creates a selector over one generation's data.
    #[must_use]
    pub const fn new(registry: &'a LootRegistry, aggregates: &'a GroupAggregates) -> Self {
        Self {
            registry,
            aggregates,
        }
    }

    /// Resolves every reachable rule into a `loot id -> weight` map.
    ///
    /// Groups whose requirements fail are skipped with all their children.
    /// Weights for the same loot add up across rules and groups.
    #[must_use]
    pub fn collect<'n>(
        &self,
        nodes: impl IntoIterator<Item = &'n ConditionalElement>,
        context: &LootContext,
    ) -> IndexMap<String, f64> {
        let mut weights = IndexMap::new();
        for node in nodes {
            self.collect_node(node, context, &mut weights);
        }
        weights
    }

    fn collect_node(
        &self,
        node: &ConditionalElement,
        context: &LootContext,
        weights: &mut IndexMap<String, f64>,
    ) {
        if !node.requirements_met(context) {
            return;
        }
        accumulate_rules(node.element(), self.registry, weights, |op| {
            op.resolve(context, self.aggregates)
        });
        for child in node.children().values() {
            self.collect_node(child, context, weights);
        }
    }

    /// [`Self::collect`] without the excluded entries, followed by the
    /// attempt's effect.
    #[must_use]
    pub fn effective_weights<'n>(
        &self,
        nodes: impl IntoIterator<Item = &'n ConditionalElement>,
        context: &LootContext,
        effect: &Effect,
    ) -> IndexMap<String, f64> {
        let mut weights = self.collect(nodes, context);
        weights.retain(|_, weight| *weight > 0.0);
        effect.apply(&mut weights, self.registry);
        weights
    }

    /// Draws one loot.
    ///
    /// # Errors
    ///
    /// Returns [`LootError::NoEligibleLoot`] when no entry has positive
    /// weight. This is an ordinary outcome ("nothing bites").
    pub fn select<'n, R: Rng + ?Sized>(
        &self,
        nodes: impl IntoIterator<Item = &'n ConditionalElement>,
        context: &LootContext,
        effect: &Effect,
        rng: &mut R,
    ) -> LootResult<Arc<Loot>> {
        let weights = self.effective_weights(nodes, context, effect);
        sample(&weights, rng)
            .and_then(|id| self.registry.get(id))
            .cloned()
            .ok_or_else(|| {
                debug!("no eligible loot for {} ({} entries)", context.holder(), weights.len());
                LootError::NoEligibleLoot
            })
    }

    /// Draws `iterations` times and tallies the results.
    pub fn run_statistics<'n, R: Rng + ?Sized>(
        &self,
        nodes: impl IntoIterator<Item = &'n ConditionalElement>,
        context: &LootContext,
        effect: &Effect,
        rng: &mut R,
        iterations: u32,
    ) -> LootStatistics {
        let weights = self.effective_weights(nodes, context, effect);
        let mut stats = LootStatistics::new();
        for _ in 0..iterations {
            stats.record(sample(&weights, rng));
        }
        stats
    }
}

/// Adds the resolved weight of each rule to `weights`.
///
/// Plain targets must be registered; combination targets expand to every
/// matching item loot in registration order.
pub(crate) fn accumulate_rules(
    rules: &[WeightRule],
    registry: &LootRegistry,
    weights: &mut IndexMap<String, f64>,
    mut weigh: impl FnMut(&WeightOperation) -> f64,
) {
    for rule in rules {
        let weight = weigh(rule.weight());
        match rule.target() {
            LootTarget::Loot(id) => {
                if registry.contains(id) {
                    *weights.entry(id.clone()).or_insert(0.0) += weight;
                } else {
                    warn!("skipping weight for unregistered loot '{}'", id);
                }
            }
            LootTarget::Combination(tags) => {
                for loot in registry.matching_items(tags.as_slice()) {
                    *weights.entry(loot.id().to_string()).or_insert(0.0) += weight;
                }
            }
        }
    }
}

/// Cumulative-weight draw over the positive entries of `weights`.
///
/// Returns `None` when nothing has positive weight.
pub fn sample<'w, R: Rng + ?Sized>(
    weights: &'w IndexMap<String, f64>,
    rng: &mut R,
) -> Option<&'w str> {
    let positive = || weights.iter().filter(|(_, w)| **w > 0.0);
    let total: f64 = positive().map(|(_, w)| *w).sum();
    if total <= 0.0 {
        return None;
    }
    if !total.is_finite() {
        warn!("weight total overflowed, skipping draw");
        return None;
    }

    let roll = rng.gen_range(0.0..total);
    let mut cumulative = 0.0;
    let mut last = None;
    for (id, weight) in positive() {
        cumulative += *weight;
        if roll < cumulative {
            return Some(id.as_str());
        }
        last = Some(id.as_str());
    }
    // Rounding can leave `roll` a hair above the final running total.
    last
}

/// Tally of a simulated run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LootStatistics {
    /// Draws attempted.
    pub total_rolls: u64,
    /// Draws that produced loot.
    pub total_drops: u64,
    /// Hits per loot id, in first-hit order.
    pub loot_counts: IndexMap<String, u64>,
}

impl LootStatistics {
    /// Creates empty statistics.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one draw.
    pub fn record(&mut self, outcome: Option<&str>) {
        self.total_rolls += 1;
        if let Some(id) = outcome {
            self.total_drops += 1;
            *self.loot_counts.entry(id.to_string()).or_insert(0) += 1;
        }
    }

    /// Share of draws that produced `id`, in `[0, 1]`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn frequency(&self, id: &str) -> f64 {
        if self.total_rolls == 0 {
            return 0.0;
        }
        self.loot_counts.get(id).copied().unwrap_or(0) as f64 / self.total_rolls as f64
    }

    /// Percentage of draws that produced anything.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn drop_rate_percent(&self) -> f64 {
        if self.total_rolls == 0 {
            return 0.0;
        }
        self.total_drops as f64 / self.total_rolls as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::requirement::{ArgIn, Constant};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn registry() -> LootRegistry {
        let mut registry = LootRegistry::new();
        for (id, groups) in [
            ("fish_a", vec!["ocean"]),
            ("fish_b", vec!["ocean", "no_star"]),
            ("fish_c", vec!["no_star"]),
        ] {
            registry.register(Loot::builder(id).groups(groups).build()).unwrap();
        }
        registry
    }

    fn id(s: &str) -> LootTarget {
        LootTarget::Loot(s.to_string())
    }

    #[test]
    fn test_collect_merges_additively_in_order() {
        let registry = registry();
        let aggs = GroupAggregates::empty("&");
        let selector = WeightedSelector::new(&registry, &aggs);

        let root = ConditionalElement::new()
            .with_rule(id("fish_b"), 10.0)
            .with_rule(id("fish_a"), 5.0)
            .with_child(
                "child",
                ConditionalElement::new()
                    .with_rule(id("fish_a"), 7.0)
                    .with_rule(LootTarget::combination("no_star", "&"), 1.0),
            );

        let weights = selector.collect([&root], &LootContext::default());
        let entries: Vec<_> = weights.iter().map(|(k, v)| (k.as_str(), *v)).collect();
        assert_eq!(entries, [("fish_b", 11.0), ("fish_a", 12.0), ("fish_c", 1.0)]);
    }

    #[test]
    fn test_combination_needs_every_tag() {
        let registry = registry();
        let aggs = GroupAggregates::empty("&");
        let selector = WeightedSelector::new(&registry, &aggs);

        let ab = ConditionalElement::new().with_rule(LootTarget::combination("ocean&no_star", "&"), 10.0);
        let ba = ConditionalElement::new().with_rule(LootTarget::combination("no_star&ocean", "&"), 10.0);

        let ctx = LootContext::default();
        let weights = selector.collect([&ab], &ctx);
        assert_eq!(weights.len(), 1);
        assert_eq!(weights["fish_b"], 10.0);
        assert_eq!(weights, selector.collect([&ba], &ctx));
    }

    #[test]
    fn test_failed_requirement_skips_subtree() {
        let registry = registry();
        let aggs = GroupAggregates::empty("&");
        let selector = WeightedSelector::new(&registry, &aggs);

        let lava = ConditionalElement::new()
            .with_requirement(Arc::new(ArgIn::new("environment", vec!["lava".into()])))
            .with_rule(id("fish_c"), 30.0)
            .with_child("deep", ConditionalElement::new().with_rule(id("fish_a"), 3.0));

        assert!(selector.collect([&lava], &LootContext::new("Steve")).is_empty());

        let ctx = LootContext::new("Steve").with_arg("environment", "lava");
        assert_eq!(selector.collect([&lava], &ctx).len(), 2);
    }

    #[test]
    fn test_select_converges_to_ratio() {
        let registry = registry();
        let aggs = GroupAggregates::empty("&");
        let selector = WeightedSelector::new(&registry, &aggs);
        let common = ConditionalElement::new()
            .with_rule(id("fish_a"), 70.0)
            .with_rule(id("fish_b"), 30.0)
            .with_rule(id("fish_c"), 0.0);

        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let stats = selector.run_statistics(
            [&common],
            &LootContext::default(),
            &Effect::none(),
            &mut rng,
            100_000,
        );

        assert_eq!(stats.total_drops, 100_000);
        assert!((stats.frequency("fish_a") - 0.7).abs() < 0.01);
        assert!((stats.frequency("fish_b") - 0.3).abs() < 0.01);
        assert_eq!(stats.frequency("fish_c"), 0.0);
    }

    #[test]
    fn test_seeded_draws_repeat() {
        let registry = registry();
        let aggs = GroupAggregates::empty("&");
        let selector = WeightedSelector::new(&registry, &aggs);
        let node = ConditionalElement::new()
            .with_rule(id("fish_a"), 1.0)
            .with_rule(id("fish_b"), 1.0)
            .with_rule(id("fish_c"), 1.0);
        let ctx = LootContext::default();

        let draw = |seed| {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            (0..50)
                .map(|_| {
                    selector
                        .select([&node], &ctx, &Effect::none(), &mut rng)
                        .unwrap()
                        .id()
                        .to_string()
                })
                .collect::<Vec<_>>()
        };
        assert_eq!(draw(42), draw(42));
    }

    #[test]
    fn test_effect_shapes_selection() {
        let registry = registry();
        let aggs = GroupAggregates::empty("&");
        let selector = WeightedSelector::new(&registry, &aggs);
        let node = ConditionalElement::new()
            .with_rule(id("fish_a"), 50.0)
            .with_rule(id("fish_b"), 50.0);
        let effect = Effect::none().multiply_loot("fish_a", 0.0);

        let mut rng = ChaCha8Rng::seed_from_u64(1);
        for _ in 0..100 {
            let loot = selector
                .select([&node], &LootContext::default(), &effect, &mut rng)
                .unwrap();
            assert_eq!(loot.id(), "fish_b");
        }
    }

    #[test]
    fn test_effect_cannot_revive_excluded_targets() {
        let mut registry = registry();
        registry.register(Loot::builder("boot").groups(["junk"]).build()).unwrap();
        registry.register(Loot::builder("neg").groups(["junk"]).build()).unwrap();
        let aggs = GroupAggregates::empty("&");
        let selector = WeightedSelector::new(&registry, &aggs);
        let node = ConditionalElement::new()
            .with_rule(id("fish_a"), 70.0)
            .with_rule(id("boot"), 0.0)
            .with_rule(id("neg"), -5.0)
            .with_rule(id("fish_c"), WeightOperation::parse("{{group_x&y}} + 3"));
        let effect = Effect::none().add_tag("junk", 100.0).add_tag("no_star", 100.0);
        let ctx = LootContext::default();

        let weights = selector.effective_weights([&node], &ctx, &effect);
        assert_eq!(weights.keys().collect::<Vec<_>>(), ["fish_a"]);

        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for _ in 0..1_000 {
            let loot = selector.select([&node], &ctx, &effect, &mut rng).unwrap();
            assert_eq!(loot.id(), "fish_a");
        }
    }

    #[test]
    fn test_nothing_eligible() {
        let registry = registry();
        let aggs = GroupAggregates::empty("&");
        let selector = WeightedSelector::new(&registry, &aggs);
        let rare = ConditionalElement::new()
            .with_requirement(Arc::new(Constant(false)))
            .with_rule(id("fish_a"), 1.0);
        let zero = ConditionalElement::new().with_rule(id("fish_a"), 0.0);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let ctx = LootContext::default();

        for node in [&rare, &zero] {
            let err = selector.select([node], &ctx, &Effect::none(), &mut rng).unwrap_err();
            assert_eq!(err, LootError::NoEligibleLoot);
        }
    }

    #[test]
    fn test_sample_skips_non_positive() {
        let weights = IndexMap::from([
            ("a".to_string(), 0.0),
            ("b".to_string(), 2.0),
            ("c".to_string(), 0.0),
        ]);
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        for _ in 0..100 {
            assert_eq!(sample(&weights, &mut rng), Some("b"));
        }
        assert_eq!(sample(&IndexMap::new(), &mut rng), None);
    }

    #[test]
    fn test_statistics_empty() {
        let stats = LootStatistics::new();
        assert_eq!(stats.frequency("x"), 0.0);
        assert_eq!(stats.drop_rate_percent(), 0.0);
    }
}
