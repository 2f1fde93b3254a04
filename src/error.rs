//! Error taxonomy for the calculation core.

use crate::models::{ItemId, RecipeId};

/// Errors raised by the allocation, aggregation and analysis passes.
///
/// Every failure is an explicit value; nothing is silently defaulted.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CalcError {
    /// A request value was negative or not finite.
    #[error("invalid input: {detail}")]
    InvalidInput { detail: String },

    /// The chosen fuel does not burn in the chosen generator.
    #[error("fuel '{fuel}' cannot be used in generator '{generator}'")]
    IncompatibleFuel { generator: String, fuel: String },

    /// No power-generation or settings template with this name exists.
    #[error("unknown template '{name}'")]
    UnknownTemplate { name: String },

    #[error("unknown generator '{key}'")]
    UnknownGenerator { key: String },

    #[error("unknown fuel '{key}'")]
    UnknownFuel { key: String },

    /// A setting was requested on a recipe that does not support it.
    #[error("recipe {recipe} does not allow {capability}")]
    CapabilityViolation {
        recipe: RecipeId,
        capability: &'static str,
    },

    /// A value left the representable range and could not be clamped.
    #[error("value out of range: {detail}")]
    OutOfRange { detail: String },

    #[error("recipe {id} not found in game data")]
    UnknownRecipe { id: RecipeId },

    /// The catalog has no machine for the recipe's category.
    #[error("no machine available for category '{category}' (recipe {recipe})")]
    MissingMachine { recipe: RecipeId, category: String },

    #[error("maximum recursion depth exceeded while expanding item {item}")]
    RecursionLimit { item: ItemId },

    /// A batch of settings fixes could not be applied as a unit.
    #[error("{} fix(es) could not be applied: {}", .0.len(), .0.join("; "))]
    FixesRejected(Vec<String>),
}

pub type CalcResult<T> = Result<T, CalcError>;
