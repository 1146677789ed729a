//! # Conditional Group Tree
//!
//! Groups are nested, requirement-gated lists of weight rules:
//!
//! ```text
//! LootTree
//! ├── "global"            requirements: []
//! │   ├── tuna:15
//! │   ├── group_for_each:ocean&no_star:+5
//! │   └── "lava"          requirements: [environment in [lava]]
//! │       └── magma_fish:30
//! └── "rare"              requirements: [never]
//!     └── golden_fish:1
//! ```
//!
//! Every node owns its children outright, so the tree cannot contain a
//! cycle. What it can contain is a group named after one of its own
//! ancestors, which would make group ids ambiguous; [`LootTree::new`]
//! rejects that as a cyclic reference.

use indexmap::IndexMap;

use crate::error::{LootError, LootResult};
use crate::requirement::{self, LootContext, RequirementRef};
use crate::weight::WeightOperation;

/// What a weight rule points at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LootTarget {
    /// A single loot id.
    Loot(String),
    /// Every item loot carrying all of these tags (sorted, deduplicated).
    Combination(Vec<String>),
}

impl LootTarget {
    /// Parses a rule target.
    ///
    /// A target carrying `for_each_prefix`, or containing `separator`, is a
    /// combination; anything else is a loot id. An empty prefix matches
    /// nothing.
    #[must_use]
    pub fn parse(raw: &str, separator: &str, for_each_prefix: &str) -> Self {
        let raw = raw.trim();
        if !for_each_prefix.is_empty() {
            if let Some(list) = raw.strip_prefix(for_each_prefix) {
                return Self::combination(list, separator);
            }
        }
        if !separator.is_empty() && raw.contains(separator) {
            return Self::combination(raw, separator);
        }
        Self::Loot(raw.to_string())
    }

    /// Builds a combination from a separator-joined tag list.
    #[must_use]
    pub fn combination(list: &str, separator: &str) -> Self {
        Self::Combination(canonical_tags(list, separator))
    }

    /// Canonical display form: the loot id, or the sorted tags joined.
    #[must_use]
    pub fn key(&self, separator: &str) -> String {
        match self {
            Self::Loot(id) => id.clone(),
            Self::Combination(tags) => tags.join(separator),
        }
    }
}

/// Splits, trims, sorts and deduplicates a tag list.
#[must_use]
pub fn canonical_tags(list: &str, separator: &str) -> Vec<String> {
    let mut tags: Vec<String> = if separator.is_empty() {
        vec![list.trim().to_string()]
    } else {
        list.split(separator).map(|t| t.trim().to_string()).collect()
    };
    tags.retain(|t| !t.is_empty());
    tags.sort_unstable();
    tags.dedup();
    tags
}

/// One `(target, weight)` pair.
#[derive(Clone, Debug, PartialEq)]
pub struct WeightRule {
    target: LootTarget,
    weight: WeightOperation,
}

impl WeightRule {
    /// Creates a rule.
    #[must_use]
    pub const fn new(target: LootTarget, weight: WeightOperation) -> Self {
        Self { target, weight }
    }

    /// The target.
    #[must_use]
    pub const fn target(&self) -> &LootTarget {
        &self.target
    }

    /// The weight.
    #[must_use]
    pub const fn weight(&self) -> &WeightOperation {
        &self.weight
    }
}

/// A group node.
#[derive(Clone, Debug, Default)]
pub struct ConditionalElement {
    requirements: Vec<RequirementRef>,
    element: Vec<WeightRule>,
    children: IndexMap<String, ConditionalElement>,
}

impl ConditionalElement {
    /// Creates an empty, ungated group.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a requirement.
    #[must_use]
    pub fn with_requirement(mut self, requirement: RequirementRef) -> Self {
        self.requirements.push(requirement);
        self
    }

    /// Appends a weight rule.
    #[must_use]
    pub fn with_rule(mut self, target: LootTarget, weight: impl Into<WeightOperation>) -> Self {
        self.element.push(WeightRule::new(target, weight.into()));
        self
    }

    /// Adds a child group, replacing any child of the same name.
    #[must_use]
    pub fn with_child(mut self, name: impl Into<String>, child: Self) -> Self {
        self.children.insert(name.into(), child);
        self
    }

    /// Gating requirements, in evaluation order.
    #[must_use]
    pub fn requirements(&self) -> &[RequirementRef] {
        &self.requirements
    }

    /// Weight rules, in configuration order.
    #[must_use]
    pub fn element(&self) -> &[WeightRule] {
        &self.element
    }

    /// Child groups, in configuration order.
    #[must_use]
    pub const fn children(&self) -> &IndexMap<String, Self> {
        &self.children
    }

    /// Whether every requirement holds, stopping at the first failure.
    #[must_use]
    pub fn requirements_met(&self, context: &LootContext) -> bool {
        requirement::all_satisfied(&self.requirements, context)
    }

    /// Whether some requirement can never hold, whatever the context.
    #[must_use]
    pub fn statically_blocked(&self) -> bool {
        self.requirements
            .iter()
            .any(|r| r.static_outcome() == Some(false))
    }
}

/// The top-level groups of one generation.
#[derive(Clone, Debug, Default)]
pub struct LootTree {
    roots: IndexMap<String, ConditionalElement>,
}

impl LootTree {
    /// Wraps the top-level groups.
    ///
    /// # Errors
    ///
    /// Returns [`LootError::CyclicGroup`] if a group is named after one of
    /// its ancestors.
    pub fn new(roots: IndexMap<String, ConditionalElement>) -> LootResult<Self> {
        let mut path = Vec::new();
        for (name, node) in &roots {
            check_ancestry(name, node, &mut path)?;
        }
        Ok(Self { roots })
    }

    /// Top-level groups, in configuration order.
    #[must_use]
    pub const fn roots(&self) -> &IndexMap<String, ConditionalElement> {
        &self.roots
    }

    /// Whether the tree has no groups.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// First group with this name, depth-first.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&ConditionalElement> {
        fn search<'a>(
            nodes: &'a IndexMap<String, ConditionalElement>,
            name: &str,
        ) -> Option<&'a ConditionalElement> {
            nodes.iter().find_map(|(id, node)| {
                if id == name {
                    Some(node)
                } else {
                    search(node.children(), name)
                }
            })
        }
        search(&self.roots, name)
    }

    /// Visits every group depth-first, parents before children.
    pub fn walk<'a>(&'a self, mut visit: impl FnMut(&'a str, &'a ConditionalElement)) {
        fn descend<'a>(
            nodes: &'a IndexMap<String, ConditionalElement>,
            visit: &mut impl FnMut(&'a str, &'a ConditionalElement),
        ) {
            for (name, node) in nodes {
                visit(name, node);
                descend(node.children(), visit);
            }
        }
        descend(&self.roots, &mut visit);
    }

    /// Every group id, depth-first.
    #[must_use]
    pub fn group_ids(&self) -> Vec<&str> {
        let mut ids = Vec::new();
        self.walk(|name, _| ids.push(name));
        ids
    }
}

fn check_ancestry<'a>(
    name: &'a str,
    node: &'a ConditionalElement,
    path: &mut Vec<&'a str>,
) -> LootResult<()> {
    if path.contains(&name) {
        let mut chain = path.join(" -> ");
        chain.push_str(" -> ");
        chain.push_str(name);
        return Err(LootError::CyclicGroup(chain));
    }

    path.push(name);
    for (child_name, child) in node.children() {
        check_ancestry(child_name, child, path)?;
    }
    path.pop();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::requirement::Constant;
    use std::sync::Arc;

    fn loot(id: &str) -> LootTarget {
        LootTarget::Loot(id.to_string())
    }

    #[test]
    fn test_target_parsing() {
        assert_eq!(LootTarget::parse(" tuna ", "&", "group_for_each:"), loot("tuna"));
        assert_eq!(
            LootTarget::parse("ocean&no_star", "&", "group_for_each:"),
            LootTarget::Combination(vec!["no_star".into(), "ocean".into()])
        );
        assert_eq!(
            LootTarget::parse("group_for_each:ocean", "&", "group_for_each:"),
            LootTarget::Combination(vec!["ocean".into()])
        );
        assert_eq!(
            LootTarget::parse("group_for_each: b & a & b", "&", "group_for_each:"),
            LootTarget::Combination(vec!["a".into(), "b".into()])
        );
    }

    #[test]
    fn test_empty_prefix_keeps_plain_targets() {
        assert_eq!(LootTarget::parse("tuna", "&", ""), loot("tuna"));
        assert_eq!(
            LootTarget::parse("ocean&cold", "&", ""),
            LootTarget::Combination(vec!["cold".into(), "ocean".into()])
        );
    }

    #[test]
    fn test_combination_key_is_order_independent() {
        let ab = LootTarget::parse("A&B", "&", "group_for_each:");
        let ba = LootTarget::parse("B&A", "&", "group_for_each:");
        assert_eq!(ab, ba);
        assert_eq!(ab.key("&"), "A&B");
    }

    #[test]
    fn test_walk_is_depth_first() {
        let tree = LootTree::new(IndexMap::from([
            (
                "a".to_string(),
                ConditionalElement::new()
                    .with_child("a1", ConditionalElement::new().with_child("a1x", ConditionalElement::new()))
                    .with_child("a2", ConditionalElement::new()),
            ),
            ("b".to_string(), ConditionalElement::new()),
        ]))
        .unwrap();

        assert_eq!(tree.group_ids(), ["a", "a1", "a1x", "a2", "b"]);
        assert!(tree.find("a1x").is_some());
        assert!(tree.find("zzz").is_none());
    }

    #[test]
    fn test_ancestor_name_is_cyclic() {
        let err = LootTree::new(IndexMap::from([(
            "a".to_string(),
            ConditionalElement::new().with_child(
                "b",
                ConditionalElement::new().with_child("a", ConditionalElement::new()),
            ),
        )]))
        .unwrap_err();
        assert_eq!(err, LootError::CyclicGroup("a -> b -> a".into()));
    }

    #[test]
    fn test_sibling_reuse_is_allowed() {
        let tree = LootTree::new(IndexMap::from([
            (
                "a".to_string(),
                ConditionalElement::new().with_child("shared", ConditionalElement::new()),
            ),
            (
                "b".to_string(),
                ConditionalElement::new().with_child("shared", ConditionalElement::new()),
            ),
        ]));
        assert!(tree.is_ok());
    }

    #[test]
    fn test_requirements() {
        let ctx = LootContext::default();
        let open = ConditionalElement::new().with_rule(loot("tuna"), 10.0);
        let closed = open.clone().with_requirement(Arc::new(Constant(false)));

        assert!(open.requirements_met(&ctx));
        assert!(!open.statically_blocked());
        assert!(!closed.requirements_met(&ctx));
        assert!(closed.statically_blocked());
        assert_eq!(closed.element().len(), 1);
    }
}
