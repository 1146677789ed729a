//! # Lurecraft Loot Engine
//!
//! Loot selection and probability analysis for the Lurecraft fishing plugin.
//!
//! ## Design Principles
//!
//! 1. **Immutable generations** - a reload builds a new table and swaps one pointer
//! 2. **Ordered weights** - every weight map iterates in configuration order
//! 3. **Soft failures** - a bad rule costs that rule, never the whole table
//! 4. **Injected game state** - requirements and context come from the caller
//!
//! ## Thread Safety
//!
//! [`LootManager`] is `Send + Sync`. Draws and probability queries run
//! concurrently with each other and with reloads.
//!
//! ## Example
//!
//! ```rust,ignore
//! use lurecraft_loot::{BuiltinRequirements, Effect, LootContext, LootManager};
//!
//! let manager = LootManager::new(BuiltinRequirements);
//! manager.reload(&std::fs::read_to_string("loot.toml")?.parse()?)?;
//!
//! let context = LootContext::new("Steve").with_arg("environment", "ocean");
//! let loot = manager.get_next_loot(&Effect::none().multiply_tag("ocean", 1.5), &context)?;
//!
//! for (group, info) in manager.calculate_group_probabilities(loot.id()) {
//!     println!("{group}: {}", info.formatted_probability());
//! }
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod aggregate;
pub mod conditional;
pub mod config;
pub mod effect;
pub mod error;
pub mod expression;
pub mod generation;
pub mod loot;
pub mod manager;
pub mod probability;
pub mod requirement;
pub mod selector;
pub mod weight;

pub use aggregate::GroupAggregates;
pub use conditional::{ConditionalElement, LootTarget, LootTree, WeightRule};
pub use config::{build_generation, LootSettings};
pub use effect::{Effect, ModifierOp, ModifierTarget};
pub use error::{LootError, LootResult};
pub use generation::{GenerationCell, LootGeneration};
pub use loot::{Loot, LootBuilder, LootRegistry, LootType};
pub use manager::LootManager;
pub use probability::{GroupProbabilityCalculator, GroupProbabilityInfo};
pub use requirement::{BuiltinRequirements, LootContext, Requirement, RequirementFactory};
pub use selector::{LootStatistics, WeightedSelector};
pub use weight::WeightOperation;
