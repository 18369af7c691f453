//! Strategy layer: which side to back, and how much.
//!
//! Everything here is pure. The engine owns the mutable session and calls
//! into these modules once per resolved round.

pub mod pattern;
pub mod resolver;
pub mod table;

pub use pattern::{Pattern, PatternCursor};
pub use resolver::resolve;
pub use table::{next_stake_after_loss, StakeRule, StrategyRegistry, StrategyTable};
