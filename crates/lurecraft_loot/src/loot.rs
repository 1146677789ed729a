//! # Loot Data Model
//!
//! One [`Loot`] per obtainable outcome, collected into a [`LootRegistry`]
//! for a single configuration generation.
//!
//! Loot is immutable once built. A reload builds a fresh registry and the
//! old one is dropped when its last reader finishes.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{LootError, LootResult};
use crate::requirement::LootContext;
use crate::weight::WeightOperation;

/// What kind of thing a loot produces.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LootType {
    /// An item stack.
    #[default]
    Item,
    /// A spawned entity.
    Entity,
    /// A placed or thrown block.
    Block,
    /// Score only, nothing physical.
    Score,
    /// Handled entirely by a custom integration.
    Custom,
}

impl LootType {
    /// Lowercase configuration name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Item => "item",
            Self::Entity => "entity",
            Self::Block => "block",
            Self::Score => "score",
            Self::Custom => "custom",
        }
    }
}

impl FromStr for LootType {
    type Err = LootError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "item" => Ok(Self::Item),
            "entity" => Ok(Self::Entity),
            "block" => Ok(Self::Block),
            "score" => Ok(Self::Score),
            "custom" => Ok(Self::Custom),
            other => Err(LootError::InvalidConfig(format!("unknown loot type '{other}'"))),
        }
    }
}

impl fmt::Display for LootType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single obtainable reward.
#[derive(Clone, Debug, PartialEq)]
pub struct Loot {
    id: String,
    loot_type: LootType,
    groups: Vec<String>,
    nick: String,
    lore: Vec<String>,
    score: WeightOperation,
    statistics_key: String,
    instant_game: bool,
    disable_game: bool,
    disable_stats: bool,
    show_in_finder: bool,
    prevent_grabbing: bool,
    custom_data: IndexMap<String, String>,
}

impl Loot {
    /// Starts building a loot with the given id.
    #[must_use]
    pub fn builder(id: impl Into<String>) -> LootBuilder {
        LootBuilder::new(id)
    }

    /// Unique id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Loot type.
    #[must_use]
    pub const fn loot_type(&self) -> LootType {
        self.loot_type
    }

    /// Group tags, in configuration order.
    #[must_use]
    pub fn groups(&self) -> &[String] {
        &self.groups
    }

    /// Whether this loot carries every tag in `tags`.
    #[must_use]
    pub fn has_all_tags<S: AsRef<str>>(&self, tags: &[S]) -> bool {
        tags.iter()
            .all(|tag| self.groups.iter().any(|g| g == tag.as_ref()))
    }

    /// Display name; the id when no nickname is configured.
    #[must_use]
    pub fn nick(&self) -> &str {
        if self.nick.is_empty() {
            &self.id
        } else {
            &self.nick
        }
    }

    /// Lore lines.
    #[must_use]
    pub fn lore(&self) -> &[String] {
        &self.lore
    }

    /// Score awarded for this loot under the given context.
    ///
    /// Expression scores that fail to resolve count as zero.
    #[must_use]
    pub fn score(&self, context: &LootContext) -> f64 {
        self.score.resolve_value(context)
    }

    /// Key used by the statistics subsystem.
    #[must_use]
    pub fn statistics_key(&self) -> &str {
        &self.statistics_key
    }

    /// Skip the mini-game and grant immediately.
    #[must_use]
    pub const fn instant_game(&self) -> bool {
        self.instant_game
    }

    /// Never start a mini-game for this loot.
    #[must_use]
    pub const fn disable_game(&self) -> bool {
        self.disable_game
    }

    /// Exclude from catch statistics.
    #[must_use]
    pub const fn disable_stats(&self) -> bool {
        self.disable_stats
    }

    /// Listed by the fish finder.
    #[must_use]
    pub const fn show_in_finder(&self) -> bool {
        self.show_in_finder
    }

    /// Other players cannot pick the drop up.
    #[must_use]
    pub const fn prevent_grabbing(&self) -> bool {
        self.prevent_grabbing
    }

    /// Free-form text data for integrations.
    #[must_use]
    pub fn custom_data(&self) -> &IndexMap<String, String> {
        &self.custom_data
    }
}

/// Builder for [`Loot`].
#[derive(Clone, Debug)]
pub struct LootBuilder {
    loot: Loot,
}

impl LootBuilder {
    fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            loot: Loot {
                statistics_key: id.clone(),
                id,
                loot_type: LootType::Item,
                groups: Vec::new(),
                nick: String::new(),
                lore: Vec::new(),
                score: WeightOperation::Constant(0.0),
                instant_game: false,
                disable_game: false,
                disable_stats: false,
                show_in_finder: true,
                prevent_grabbing: false,
                custom_data: IndexMap::new(),
            },
        }
    }

    /// Sets the loot type.
    #[must_use]
    pub fn loot_type(mut self, loot_type: LootType) -> Self {
        self.loot.loot_type = loot_type;
        self
    }

    /// Sets the group tags. Duplicates are dropped, order is kept.
    #[must_use]
    pub fn groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.loot.groups.clear();
        for group in groups {
            let group = group.into();
            if !self.loot.groups.contains(&group) {
                self.loot.groups.push(group);
            }
        }
        self
    }

    /// Sets the display name.
    #[must_use]
    pub fn nick(mut self, nick: impl Into<String>) -> Self {
        self.loot.nick = nick.into();
        self
    }

    /// Sets the lore lines.
    #[must_use]
    pub fn lore(mut self, lore: Vec<String>) -> Self {
        self.loot.lore = lore;
        self
    }

    /// Sets the score value.
    #[must_use]
    pub fn score(mut self, score: WeightOperation) -> Self {
        self.loot.score = score;
        self
    }

    /// Sets the statistics key.
    #[must_use]
    pub fn statistics_key(mut self, key: impl Into<String>) -> Self {
        self.loot.statistics_key = key.into();
        self
    }

    /// Sets the instant-game flag.
    #[must_use]
    pub const fn instant_game(mut self, value: bool) -> Self {
        self.loot.instant_game = value;
        self
    }

    /// Sets the disable-game flag.
    #[must_use]
    pub const fn disable_game(mut self, value: bool) -> Self {
        self.loot.disable_game = value;
        self
    }

    /// Sets the disable-stats flag.
    #[must_use]
    pub const fn disable_stats(mut self, value: bool) -> Self {
        self.loot.disable_stats = value;
        self
    }

    /// Sets the show-in-finder flag.
    #[must_use]
    pub const fn show_in_finder(mut self, value: bool) -> Self {
        self.loot.show_in_finder = value;
        self
    }

    /// Sets the prevent-grabbing flag.
    #[must_use]
    pub const fn prevent_grabbing(mut self, value: bool) -> Self {
        self.loot.prevent_grabbing = value;
        self
    }

    /// Adds one custom data entry.
    #[must_use]
    pub fn custom_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.loot.custom_data.insert(key.into(), value.into());
        self
    }

    /// Finishes the loot.
    #[must_use]
    pub fn build(self) -> Loot {
        self.loot
    }
}

/// All loot of one generation, in registration order.
///
/// Registration order is what makes weight maps, and therefore seeded
/// draws, reproducible.
#[derive(Clone, Debug, Default)]
pub struct LootRegistry {
    loots: IndexMap<String, Arc<Loot>>,
}

impl LootRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a loot.
    ///
    /// # Errors
    ///
    /// Returns [`LootError::DuplicateLoot`] if the id is already taken.
    pub fn register(&mut self, loot: Loot) -> LootResult<()> {
        if self.loots.contains_key(loot.id()) {
            return Err(LootError::DuplicateLoot(loot.id().to_string()));
        }
        self.loots.insert(loot.id().to_string(), Arc::new(loot));
        Ok(())
    }

    /// Looks up a loot by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Arc<Loot>> {
        self.loots.get(id)
    }

    /// Whether `id` is registered.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.loots.contains_key(id)
    }

    /// All loot in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Loot>> {
        self.loots.values()
    }

    /// Item loot carrying every tag in `tags`, in registration order.
    ///
    /// Only [`LootType::Item`] takes part in tag combinations.
    pub fn matching_items<'a, S: AsRef<str>>(
        &'a self,
        tags: &'a [S],
    ) -> impl Iterator<Item = &'a Arc<Loot>> + 'a {
        self.loots
            .values()
            .filter(move |loot| loot.loot_type() == LootType::Item && loot.has_all_tags(tags))
    }

    /// Number of registered loot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.loots.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.loots.is_empty()
    }
}
