//! Domain types for the evaluation engine.

pub mod bar;
pub mod combination;
pub mod direction;
pub mod trade;

pub use bar::PriceBar;
pub use combination::{CombinationError, ComboHash, WeightedCombination};
pub use direction::{Direction, DirectionParseError, Side};
pub use trade::{ExitReason, Trade};
