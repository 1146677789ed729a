//! # Group Probability Analysis
//!
//! Answers "where can this loot drop, and how likely is it there?" for
//! fish finders and admin tooling.
//!
//! ## Per-Group Odds
//!
//! Each group is analysed on its own rule list, without any context:
//!
//! ```text
//! group "common"   fish_a:70  fish_b:30      fish_a -> 70.00%
//! group "lava"     (1 condition)
//!   magma:30 fish_a:10                       fish_a -> 25.00%, "1 conditions"
//! ```
//!
//! Expressions resolve in analysis mode (see [`WeightOperation::resolve_static`]).
//! Requirements are never evaluated; a group whose requirements can
//! statically never hold is left out along with its children.
//!
//! ## Caching
//!
//! Non-empty results are cached per loot id until [`clear_cache`] runs,
//! which every reload does. A result computed against a generation that
//! was replaced mid-computation is returned but not cached.
//!
//! [`WeightOperation::resolve_static`]: crate::weight::WeightOperation::resolve_static
//! [`clear_cache`]: GroupProbabilityCalculator::clear_cache

use indexmap::IndexMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::aggregate::GroupAggregates;
use crate::conditional::ConditionalElement;
use crate::config::LootSettings;
use crate::error::{LootError, LootResult};
use crate::generation::{GenerationCell, LootGeneration};
use crate::loot::LootRegistry;
use crate::selector::accumulate_rules;

/// The odds of one loot within one group.
#[derive(Clone, Debug, PartialEq)]
pub struct GroupProbabilityInfo {
    group_id: String,
    probability: f64,
    conditions: String,
}

impl GroupProbabilityInfo {
    /// Creates an entry.
    #[must_use]
    pub fn new(group_id: impl Into<String>, probability: f64, conditions: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            probability,
            conditions: conditions.into(),
        }
    }

    /// The group.
    #[must_use]
    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    /// Probability in percent, `0..=100`.
    #[must_use]
    pub const fn probability(&self) -> f64 {
        self.probability
    }

    /// Summary of the requirements gating this group and its ancestors.
    /// Empty when the group is ungated.
    #[must_use]
    pub fn conditions(&self) -> &str {
        &self.conditions
    }

    /// Probability with two decimals, e.g. `"15.50%"`.
    #[must_use]
    pub fn formatted_probability(&self) -> String {
        format!("{:.2}%", self.probability)
    }
}

type ProbabilityMap = HashMap<String, GroupProbabilityInfo>;

/// Computes and caches per-group probabilities.
#[derive(Debug)]
pub struct GroupProbabilityCalculator {
    generations: Arc<GenerationCell>,
    cache: RwLock<HashMap<String, ProbabilityMap>>,
}

impl GroupProbabilityCalculator {
    /// Creates a calculator reading from `generations`.
    #[must_use]
    pub fn new(generations: Arc<GenerationCell>) -> Self {
        Self {
            generations,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Probability of `loot_id` in every group that can produce it.
    ///
    /// Unknown loot, and loot of a type not listed in
    /// `analyzable-types`, yields an empty map.
    #[must_use]
    pub fn calculate_group_probabilities(&self, loot_id: &str) -> ProbabilityMap {
        if let Some(hit) = self.cache.read().get(loot_id) {
            return hit.clone();
        }

        let generation = self.generations.load();
        let result = analyze(&generation, loot_id);

        if !result.is_empty() {
            let mut cache = self.cache.write();
            if self.generations.number() == generation.number() {
                cache.insert(loot_id.to_string(), result.clone());
            } else {
                debug!("generation changed while analysing {}, not caching", loot_id);
            }
        }
        result
    }

    /// Tags declared on `loot_id`; empty if unknown.
    #[must_use]
    pub fn get_loot_groups(&self, loot_id: &str) -> Vec<String> {
        self.generations
            .load()
            .registry()
            .get(loot_id)
            .map(|loot| loot.groups().to_vec())
            .unwrap_or_default()
    }

    /// Probability of `loot_id` in one group.
    #[must_use]
    pub fn get_group_probability(&self, loot_id: &str, group_id: &str) -> Option<GroupProbabilityInfo> {
        self.calculate_group_probabilities(loot_id).remove(group_id)
    }

    /// Drops every cached result.
    pub fn clear_cache(&self) {
        let mut cache = self.cache.write();
        debug!("clearing {} cached probability results", cache.len());
        cache.clear();
    }

    /// Whether a result for `loot_id` is cached.
    #[must_use]
    pub fn is_cached(&self, loot_id: &str) -> bool {
        self.cache.read().contains_key(loot_id)
    }
}

fn analyze(generation: &LootGeneration, loot_id: &str) -> ProbabilityMap {
    let settings = generation.settings();
    let Some(loot) = generation.registry().get(loot_id) else {
        return ProbabilityMap::new();
    };
    if !settings.analyzable_types.contains(&loot.loot_type()) {
        return ProbabilityMap::new();
    }

    let aggregates = generation.aggregates();
    let analysis = Analysis {
        loot_id,
        registry: generation.registry(),
        aggregates: &aggregates,
        settings,
    };

    let mut result = ProbabilityMap::new();
    for (group_id, node) in generation.tree().roots() {
        analysis.visit(group_id, node, "", &mut result);
    }
    result.retain(|group_id, _| aggregates.is_actual_group(group_id));
    result
}

struct Analysis<'a> {
    loot_id: &'a str,
    registry: &'a LootRegistry,
    aggregates: &'a GroupAggregates,
    settings: &'a LootSettings,
}

impl Analysis<'_> {
    fn visit(
        &self,
        group_id: &str,
        node: &ConditionalElement,
        parent_conditions: &str,
        result: &mut ProbabilityMap,
    ) {
        if node.statically_blocked() {
            debug!("group {} can never be reached, skipping", group_id);
            return;
        }

        let conditions = match self.analyze_node(group_id, node, parent_conditions) {
            Ok((info, conditions)) => {
                if let Some(info) = info {
                    result.insert(group_id.to_string(), info);
                }
                conditions
            }
            Err(err) => {
                warn!("skipping group {} in probability analysis: {}", group_id, err);
                return;
            }
        };

        for (child_id, child) in node.children() {
            self.visit(child_id, child, &conditions, result);
        }
    }

    fn analyze_node(
        &self,
        group_id: &str,
        node: &ConditionalElement,
        parent_conditions: &str,
    ) -> LootResult<(Option<GroupProbabilityInfo>, String)> {
        let own = self.describe(node)?;
        let conditions = match (parent_conditions.is_empty(), own.is_empty()) {
            (true, _) => own,
            (false, true) => parent_conditions.to_string(),
            (false, false) => {
                format!("{parent_conditions}{}{own}", self.settings.condition_joiner)
            }
        };

        let fallback = self.settings.analysis_fallback_weight;
        let mut weights = IndexMap::new();
        accumulate_rules(node.element(), self.registry, &mut weights, |op| {
            op.resolve_static(self.aggregates, fallback)
        });

        let info = match weights.get(self.loot_id) {
            Some(&weight) if weight > 0.0 => {
                let total: f64 = weights.values().sum();
                if !total.is_finite() {
                    return Err(LootError::NonFiniteWeight {
                        group: group_id.to_string(),
                    });
                }
                Some(GroupProbabilityInfo::new(
                    group_id,
                    weight / total * 100.0,
                    conditions.clone(),
                ))
            }
            _ => None,
        };

        Ok((info, conditions))
    }

    /// `condition-format` with `{count}` and `{labels}` filled in; empty for
    /// an ungated group.
    fn describe(&self, node: &ConditionalElement) -> LootResult<String> {
        let requirements = node.requirements();
        if requirements.is_empty() {
            return Ok(String::new());
        }

        let mut text = self
            .settings
            .condition_format
            .replace("{count}", &requirements.len().to_string());
        if text.contains("{labels}") {
            let labels = requirements
                .iter()
                .map(|r| r.describe())
                .collect::<LootResult<Vec<_>>>()?;
            text = text.replace("{labels}", &labels.join(", "));
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditional::{LootTarget, LootTree};
    use crate::loot::{Loot, LootType};
    use crate::requirement::{ArgIn, Constant, LootContext, Requirement};

    fn id(s: &str) -> LootTarget {
        LootTarget::Loot(s.to_string())
    }

    fn registry() -> LootRegistry {
        let mut registry = LootRegistry::new();
        for (id, groups) in [
            ("fish_a", vec!["ocean"]),
            ("fish_b", vec!["ocean", "no_star"]),
            ("magma", vec!["lava"]),
            ("gold", vec!["rare"]),
        ] {
            registry.register(Loot::builder(id).groups(groups).build()).unwrap();
        }
        registry
            .register(Loot::builder("drowned").loot_type(LootType::Entity).build())
            .unwrap();
        registry
    }

    fn tree() -> LootTree {
        LootTree::new(IndexMap::from([
            (
                "common".to_string(),
                ConditionalElement::new()
                    .with_rule(id("fish_a"), 70.0)
                    .with_rule(id("fish_b"), 30.0)
                    .with_rule(id("drowned"), 10.0)
                    .with_child(
                        "lava",
                        ConditionalElement::new()
                            .with_requirement(Arc::new(ArgIn::new("environment", vec!["lava".into()])))
                            .with_rule(id("magma"), 30.0)
                            .with_rule(id("fish_a"), 10.0)
                            .with_child(
                                "deep_lava",
                                ConditionalElement::new()
                                    .with_requirement(Arc::new(Constant(true)))
                                    .with_rule(id("fish_a"), 1.0),
                            ),
                    ),
            ),
            (
                "rare".to_string(),
                ConditionalElement::new()
                    .with_requirement(Arc::new(Constant(false)))
                    .with_rule(id("gold"), 1.0),
            ),
        ]))
        .unwrap()
    }

    fn calculator(tree: LootTree) -> (Arc<GenerationCell>, GroupProbabilityCalculator) {
        let cell = Arc::new(GenerationCell::new(LootGeneration::new(
            1,
            registry(),
            tree,
            LootSettings::default(),
        )));
        let calculator = GroupProbabilityCalculator::new(Arc::clone(&cell));
        (cell, calculator)
    }

    #[test]
    fn test_probabilities_per_group() {
        let (_, calc) = calculator(tree());
        let result = calc.calculate_group_probabilities("fish_a");

        assert_eq!(result.len(), 3);
        let common = &result["common"];
        assert!((common.probability() - 63.636_363).abs() < 1e-4);
        assert_eq!(common.conditions(), "");

        let lava = &result["lava"];
        assert_eq!(lava.probability(), 25.0);
        assert_eq!(lava.formatted_probability(), "25.00%");
        assert_eq!(lava.conditions(), "1 conditions");

        let deep = &result["deep_lava"];
        assert_eq!(deep.probability(), 100.0);
        assert_eq!(deep.conditions(), "1 conditions, 1 conditions");
    }

    #[test]
    fn test_simple_ratio() {
        let tree = LootTree::new(IndexMap::from([(
            "common".to_string(),
            ConditionalElement::new()
                .with_rule(id("fish_a"), 70.0)
                .with_rule(id("fish_b"), 30.0),
        )]))
        .unwrap();
        let (_, calc) = calculator(tree);

        let info = calc.get_group_probability("fish_a", "common").unwrap();
        assert_eq!(info.group_id(), "common");
        assert_eq!(info.probability(), 70.0);
        assert_eq!(info.conditions(), "");
    }

    #[test]
    fn test_unreachable_and_unknown() {
        let (_, calc) = calculator(tree());
        assert!(calc.calculate_group_probabilities("gold").is_empty());
        assert!(calc.calculate_group_probabilities("nope").is_empty());
        assert!(calc.calculate_group_probabilities("drowned").is_empty());
        assert!(!calc.is_cached("gold"));
    }

    #[test]
    fn test_combination_rules_in_analysis() {
        let tree = LootTree::new(IndexMap::from([(
            "ocean".to_string(),
            ConditionalElement::new()
                .with_rule(id("fish_a"), 50.0)
                .with_rule(LootTarget::combination("no_star&ocean", "&"), 50.0)
                .with_rule(id("magma"), crate::weight::WeightOperation::parse("{depth} * 3")),
        )]))
        .unwrap();
        let (_, calc) = calculator(tree);

        // {depth} falls back to 1.0 in analysis
        let info = calc.get_group_probability("fish_b", "ocean").unwrap();
        assert!((info.probability() - 50.0 / 101.0 * 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_cache_until_cleared() {
        let (cell, calc) = calculator(tree());
        let first = calc.calculate_group_probabilities("fish_a");
        assert!(calc.is_cached("fish_a"));
        assert_eq!(first, calc.calculate_group_probabilities("fish_a"));

        let replacement = LootTree::new(IndexMap::from([(
            "solo".to_string(),
            ConditionalElement::new().with_rule(id("fish_a"), 5.0),
        )]))
        .unwrap();
        cell.swap(LootGeneration::new(2, registry(), replacement, LootSettings::default()));

        assert_eq!(calc.calculate_group_probabilities("fish_a"), first);
        calc.clear_cache();
        let fresh = calc.calculate_group_probabilities("fish_a");
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh["solo"].probability(), 100.0);
    }

    #[derive(Debug)]
    struct Unlabelled;

    impl Requirement for Unlabelled {
        fn is_satisfied(&self, _: &LootContext) -> bool {
            true
        }

        fn describe(&self) -> LootResult<String> {
            Err(LootError::Requirement("no label".into()))
        }
    }

    #[test]
    fn test_failing_node_is_skipped_with_subtree() {
        let tree = LootTree::new(IndexMap::from([
            (
                "broken".to_string(),
                ConditionalElement::new()
                    .with_requirement(Arc::new(Unlabelled))
                    .with_rule(id("fish_a"), 1.0)
                    .with_child("inner", ConditionalElement::new().with_rule(id("fish_a"), 1.0)),
            ),
            ("fine".to_string(), ConditionalElement::new().with_rule(id("fish_a"), 1.0)),
        ]))
        .unwrap();
        let settings = LootSettings {
            condition_format: "{labels}".to_string(),
            ..LootSettings::default()
        };
        let cell = Arc::new(GenerationCell::new(LootGeneration::new(1, registry(), tree, settings)));
        let calc = GroupProbabilityCalculator::new(cell);

        let result = calc.calculate_group_probabilities("fish_a");
        assert_eq!(result.keys().collect::<Vec<_>>(), ["fine"]);
    }

    #[test]
    fn test_labels_format() {
        let tree = LootTree::new(IndexMap::from([(
            "lava".to_string(),
            ConditionalElement::new()
                .with_requirement(Arc::new(ArgIn::new("environment", vec!["lava".into()])))
                .with_rule(id("magma"), 1.0),
        )]))
        .unwrap();
        let settings = LootSettings {
            condition_format: "{count}: {labels}".to_string(),
            ..LootSettings::default()
        };
        let cell = Arc::new(GenerationCell::new(LootGeneration::new(1, registry(), tree, settings)));
        let calc = GroupProbabilityCalculator::new(cell);

        let info = calc.get_group_probability("magma", "lava").unwrap();
        assert_eq!(info.conditions(), "1: environment in [lava]");
    }

    #[test]
    fn test_loot_groups() {
        let (_, calc) = calculator(tree());
        assert_eq!(calc.get_loot_groups("fish_b"), ["ocean", "no_star"]);
        assert!(calc.get_loot_groups("nope").is_empty());
    }
}
