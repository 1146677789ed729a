//! # Group Aggregates
//!
//! Precomputed totals behind the `{{group_<a>&<b>}}` placeholders.
//!
//! ## What Gets Counted
//!
//! For every constant rule whose target is an item loot, the rule's weight
//! is added to every 2-tag combination of that loot's tags:
//!
//! ```text
//! tuna  tags [ocean, no_star]         weight 100
//! cod   tags [ocean, no_star, cold]   weight  50
//!
//! no_star&ocean  = 150
//! cold&no_star   =  50
//! cold&ocean     =  50
//! ```
//!
//! Expression weights contribute nothing: they cannot be resolved without a
//! context, and a table that depended on one context would be wrong for
//! every other.
//!
//! The table is built at most once per generation. Once built,
//! [`AggregateMemo`] hands it out under a shared read lock. Only the first
//! callers contend: one builds under an upgradable lock while the rest wait
//! for it, and nobody sees a half-built table.

use parking_lot::{RwLock, RwLockUpgradableReadGuard};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

use crate::conditional::{canonical_tags, LootTarget, LootTree};
use crate::loot::{LootRegistry, LootType};

/// Combination totals and the set of real group ids for one generation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GroupAggregates {
    separator: String,
    totals: HashMap<String, f64>,
    actual_groups: HashSet<String>,
}

impl GroupAggregates {
    /// A table with no entries.
    #[must_use]
    pub fn empty(separator: &str) -> Self {
        Self {
            separator: separator.to_string(),
            ..Self::default()
        }
    }

    /// A table with the given totals and no known groups.
    #[must_use]
    pub fn from_totals(separator: &str, totals: HashMap<String, f64>) -> Self {
        Self {
            separator: separator.to_string(),
            totals,
            actual_groups: HashSet::new(),
        }
    }

    /// Walks the tree and builds the table.
    #[must_use]
    pub fn compute(tree: &LootTree, registry: &LootRegistry, separator: &str) -> Self {
        let mut actual_groups = HashSet::new();
        let mut totals: HashMap<String, f64> = HashMap::new();

        tree.walk(|name, node| {
            actual_groups.insert(name.to_string());

            for rule in node.element() {
                let LootTarget::Loot(id) = rule.target() else {
                    continue;
                };
                let Some(weight) = rule.weight().as_constant().filter(|w| *w > 0.0) else {
                    continue;
                };
                let Some(loot) = registry.get(id) else {
                    continue;
                };
                if loot.loot_type() != LootType::Item {
                    continue;
                }

                let tags = loot.groups();
                for (i, first) in tags.iter().enumerate() {
                    for second in &tags[i + 1..] {
                        let key = pair_key(first, second, separator);
                        *totals.entry(key).or_insert(0.0) += weight;
                    }
                }
            }
        });

        debug!(
            "aggregated {} combinations across {} groups",
            totals.len(),
            actual_groups.len()
        );

        Self {
            separator: separator.to_string(),
            totals,
            actual_groups,
        }
    }

    /// Canonical key for a combination name: tags sorted and re-joined.
    #[must_use]
    pub fn canonical_key(&self, combination: &str) -> String {
        canonical_tags(combination, &self.separator).join(&self.separator)
    }

    /// Total for a combination; `B&A` and `A&B` resolve identically.
    #[must_use]
    pub fn total(&self, combination: &str) -> Option<f64> {
        self.totals
            .get(combination)
            .or_else(|| self.totals.get(&self.canonical_key(combination)))
            .copied()
    }

    /// Whether `group_id` names a group in the tree, as opposed to a tag
    /// that only ever appears inside combinations.
    #[must_use]
    pub fn is_actual_group(&self, group_id: &str) -> bool {
        self.actual_groups.contains(group_id)
    }

    /// Every group id found in the tree.
    #[must_use]
    pub const fn actual_groups(&self) -> &HashSet<String> {
        &self.actual_groups
    }

    /// Number of combination entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.totals.len()
    }

    /// Whether there are no combination entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.totals.is_empty()
    }
}

fn pair_key(first: &str, second: &str, separator: &str) -> String {
    if first <= second {
        format!("{first}{separator}{second}")
    } else {
        format!("{second}{separator}{first}")
    }
}

/// Compute-once slot for a generation's aggregate table.
#[derive(Debug, Default)]
pub struct AggregateMemo {
    slot: RwLock<Option<Arc<GroupAggregates>>>,
}

impl AggregateMemo {
    /// Creates an empty memo.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the table, building it on first use.
    pub fn get_or_compute(&self, build: impl FnOnce() -> GroupAggregates) -> Arc<GroupAggregates> {
        if let Some(table) = self.slot.read().as_ref() {
            return Arc::clone(table);
        }

        // Upgradable reads exclude each other, so exactly one caller builds
        let slot = self.slot.upgradable_read();
        if let Some(table) = slot.as_ref() {
            return Arc::clone(table);
        }
        let table = Arc::new(build());
        let mut slot = RwLockUpgradableReadGuard::upgrade(slot);
        *slot = Some(Arc::clone(&table));
        table
    }

    /// Whether the table has been built.
    #[must_use]
    pub fn is_computed(&self) -> bool {
        self.slot.read().is_some()
    }
}
