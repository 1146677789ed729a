//! # Configuration Loading
//!
//! Turns a pre-parsed configuration tree into a [`LootGeneration`]. File
//! formats are the loader's business; this module only sees the ordered
//! [`toml::Table`] it produced.
//!
//! ## Layout
//!
//! ```toml
//! [settings]
//! combination-separator = "&"
//!
//! [loots.tuna]
//! type = "item"
//! nick = "Tuna"
//! group = ["ocean", "no_star"]
//! score = 12
//!
//! [groups.global]
//! list = ["tuna:15", "group_for_each:ocean&no_star:{{group_ocean&no_star}} * 0.1"]
//!
//! [groups.global.sub-groups.lava]
//! conditions = { arg = { environment = ["lava"] } }
//! list = ["magma_fish:30"]
//! ```
//!
//! Structural problems (duplicate ids, malformed loot sections, a group
//! named after its ancestor, unknown conditions) fail the whole load. A
//! rule pointing at an unknown loot, or one that cannot be parsed, is
//! skipped with a warning.

use indexmap::IndexMap;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::conditional::{ConditionalElement, LootTarget, LootTree, WeightRule};
use crate::error::{LootError, LootResult};
use crate::generation::LootGeneration;
use crate::loot::{Loot, LootRegistry, LootType};
use crate::requirement::RequirementFactory;
use crate::weight::WeightOperation;

/// Engine settings, read from the optional `settings` section.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct LootSettings {
    /// Joins tags in combination targets and aggregate keys.
    pub combination_separator: String,
    /// Marks a target as "expand for every matching loot". Empty disables
    /// the prefix form.
    pub for_each_prefix: String,
    /// Analysis weight for expressions that cannot be resolved context-free.
    pub analysis_fallback_weight: f64,
    /// Per-group condition summary; `{count}` is the requirement count.
    pub condition_format: String,
    /// Joins ancestor condition summaries.
    pub condition_joiner: String,
    /// Loot types the probability calculator reports on.
    pub analyzable_types: Vec<LootType>,
}

impl Default for LootSettings {
    fn default() -> Self {
        Self {
            combination_separator: "&".to_string(),
            for_each_prefix: "group_for_each:".to_string(),
            analysis_fallback_weight: 1.0,
            condition_format: "{count} conditions".to_string(),
            condition_joiner: ", ".to_string(),
            analyzable_types: vec![LootType::Item],
        }
    }
}

impl LootSettings {
    /// Reads settings from a table; missing keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`LootError::InvalidConfig`] for wrongly typed values.
    pub fn from_table(table: &toml::Table) -> LootResult<Self> {
        toml::Value::Table(table.clone())
            .try_into()
            .map_err(|e| LootError::InvalidConfig(format!("settings: {e}")))
    }
}

/// Builds a complete generation from a configuration tree.
///
/// # Errors
///
/// Returns an error for any structural problem; see the module docs.
pub fn build_generation(
    config: &toml::Table,
    factory: &dyn RequirementFactory,
    number: u64,
) -> LootResult<LootGeneration> {
    let settings = match config.get("settings") {
        Some(value) => LootSettings::from_table(section(value, "settings")?)?,
        None => LootSettings::default(),
    };

    let registry = match config.get("loots") {
        Some(value) => parse_loots(section(value, "loots")?)?,
        None => LootRegistry::new(),
    };

    let tree = match config.get("groups") {
        Some(value) => parse_groups(section(value, "groups")?, &registry, &settings, factory)?,
        None => LootTree::default(),
    };

    debug!(
        "built generation {}: {} loot, {} groups",
        number,
        registry.len(),
        tree.group_ids().len()
    );

    Ok(LootGeneration::new(number, registry, tree, settings))
}

/// Parses the `loots` section.
///
/// # Errors
///
/// Returns [`LootError::DuplicateLoot`] or [`LootError::InvalidConfig`].
pub fn parse_loots(section_table: &toml::Table) -> LootResult<LootRegistry> {
    let mut registry = LootRegistry::new();
    for (id, value) in section_table {
        let table = section(value, id)?;
        registry.register(parse_loot(id, table)?)?;
    }
    Ok(registry)
}

fn parse_loot(id: &str, table: &toml::Table) -> LootResult<Loot> {
    let mut builder = Loot::builder(id);

    for (key, value) in table {
        let field = || format!("loot {id}: {key}");
        builder = match key.as_str() {
            "type" => builder.loot_type(expect_str(value, &field)?.parse()?),
            "nick" => builder.nick(expect_str(value, &field)?),
            "lore" => builder.lore(string_list(value, &field)?),
            "group" | "groups" => builder.groups(string_list(value, &field)?),
            "score" => builder.score(number_or_expression(value, &field)?),
            "statistics-key" => builder.statistics_key(expect_str(value, &field)?),
            "instant-game" => builder.instant_game(expect_bool(value, &field)?),
            "disable-game" => builder.disable_game(expect_bool(value, &field)?),
            "disable-stat" | "disable-stats" => builder.disable_stats(expect_bool(value, &field)?),
            "show-in-fishfinder" | "show-in-finder" => {
                builder.show_in_finder(expect_bool(value, &field)?)
            }
            "prevent-grabbing" => builder.prevent_grabbing(expect_bool(value, &field)?),
            "custom-data" => {
                let mut builder = builder;
                for (data_key, data_value) in section(value, &field())? {
                    let text = match data_value {
                        toml::Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    builder = builder.custom_data(data_key.clone(), text);
                }
                builder
            }
            _ => {
                debug!("loot {}: ignoring unknown key {}", id, key);
                builder
            }
        };
    }

    Ok(builder.build())
}

/// Parses the `groups` section into a tree.
///
/// # Errors
///
/// Returns [`LootError::CyclicGroup`], [`LootError::InvalidConfig`] or a
/// requirement factory error.
pub fn parse_groups(
    section_table: &toml::Table,
    registry: &LootRegistry,
    settings: &LootSettings,
    factory: &dyn RequirementFactory,
) -> LootResult<LootTree> {
    let roots = parse_group_level(section_table, registry, settings, factory)?;
    LootTree::new(roots)
}

fn parse_group_level(
    level: &toml::Table,
    registry: &LootRegistry,
    settings: &LootSettings,
    factory: &dyn RequirementFactory,
) -> LootResult<IndexMap<String, ConditionalElement>> {
    let mut nodes = IndexMap::with_capacity(level.len());
    for (name, value) in level {
        let table = section(value, name)?;
        nodes.insert(
            name.clone(),
            parse_group(name, table, registry, settings, factory)?,
        );
    }
    Ok(nodes)
}

fn parse_group(
    name: &str,
    table: &toml::Table,
    registry: &LootRegistry,
    settings: &LootSettings,
    factory: &dyn RequirementFactory,
) -> LootResult<ConditionalElement> {
    let mut node = ConditionalElement::new();

    if let Some(conditions) = table.get("conditions") {
        for requirement in factory.build(section(conditions, name)?)? {
            node = node.with_requirement(requirement);
        }
    }

    if let Some(list) = table.get("list") {
        let entries = list.as_array().ok_or_else(|| {
            LootError::InvalidConfig(format!("group {name}: list must be an array"))
        })?;
        for entry in entries {
            let Some(raw) = entry.as_str() else {
                warn!("group {}: skipping non-string rule {}", name, entry);
                continue;
            };
            match parse_rule(name, raw, registry, settings) {
                Ok(rule) => {
                    node = node.with_rule(rule.target().clone(), rule.weight().clone());
                }
                Err(err) => warn!("group {}: skipping rule '{}': {}", name, raw, err),
            }
        }
    }

    if let Some(children) = table.get("sub-groups") {
        let children = parse_group_level(section(children, name)?, registry, settings, factory)?;
        for (child_name, child) in children {
            node = node.with_child(child_name, child);
        }
    }

    Ok(node)
}

/// Parses one `target:weight` rule.
///
/// # Errors
///
/// Returns [`LootError::ConfigurationReference`] when the target names no
/// registered loot and is not a combination, or [`LootError::InvalidConfig`]
/// when the rule has no weight.
pub fn parse_rule(
    group: &str,
    raw: &str,
    registry: &LootRegistry,
    settings: &LootSettings,
) -> LootResult<WeightRule> {
    let raw = raw.trim();
    let prefix = settings.for_each_prefix.as_str();
    let (is_for_each, body) = match raw.strip_prefix(prefix) {
        Some(rest) if !prefix.is_empty() => (true, rest),
        _ => (false, raw),
    };

    let Some((target_raw, weight_raw)) = body.split_once(':') else {
        return Err(LootError::InvalidConfig(format!(
            "rule '{raw}' has no ':weight' part"
        )));
    };
    if weight_raw.trim().is_empty() {
        return Err(LootError::InvalidConfig(format!("rule '{raw}' has an empty weight")));
    }

    let separator = settings.combination_separator.as_str();
    let target = if is_for_each {
        LootTarget::combination(target_raw, separator)
    } else {
        LootTarget::parse(target_raw, separator, &settings.for_each_prefix)
    };

    let unresolved = match &target {
        LootTarget::Loot(id) => !registry.contains(id),
        LootTarget::Combination(tags) => tags.is_empty(),
    };
    if unresolved {
        return Err(LootError::ConfigurationReference {
            group: group.to_string(),
            target: target_raw.trim().to_string(),
        });
    }

    Ok(WeightRule::new(target, WeightOperation::parse(weight_raw)))
}

fn section<'a>(value: &'a toml::Value, name: &str) -> LootResult<&'a toml::Table> {
    value
        .as_table()
        .ok_or_else(|| LootError::InvalidConfig(format!("{name} must be a table")))
}

fn expect_str<'a>(value: &'a toml::Value, field: &impl Fn() -> String) -> LootResult<&'a str> {
    value
        .as_str()
        .ok_or_else(|| LootError::InvalidConfig(format!("{} must be a string", field())))
}

fn expect_bool(value: &toml::Value, field: &impl Fn() -> String) -> LootResult<bool> {
    value
        .as_bool()
        .ok_or_else(|| LootError::InvalidConfig(format!("{} must be a boolean", field())))
}

fn string_list(value: &toml::Value, field: &impl Fn() -> String) -> LootResult<Vec<String>> {
    match value {
        toml::Value::String(s) => Ok(vec![s.clone()]),
        toml::Value::Array(items) => items
            .iter()
            .map(|item| expect_str(item, field).map(str::to_string))
            .collect(),
        _ => Err(LootError::InvalidConfig(format!(
            "{} must be a string or list of strings",
            field()
        ))),
    }
}

fn number_or_expression(
    value: &toml::Value,
    field: &impl Fn() -> String,
) -> LootResult<WeightOperation> {
    match value {
        #[allow(clippy::cast_precision_loss)]
        toml::Value::Integer(i) => Ok(WeightOperation::Constant(*i as f64)),
        toml::Value::Float(f) => Ok(WeightOperation::Constant(*f)),
        toml::Value::String(s) => Ok(WeightOperation::parse(s)),
        _ => Err(LootError::InvalidConfig(format!(
            "{} must be a number or expression",
            field()
        ))),
    }
}
