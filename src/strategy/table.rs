//! Stake escalation tables.
//!
//! Each named strategy is an ordered list of multipliers indexed by the
//! escalation level the session is leaving. The Banker-streak override is
//! evaluated before any table lookup.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{debug, warn};

use super::pattern::Pattern;
use crate::types::{SessionError, Side};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

pub const DEFAULT_STRATEGY: &str = "Standard";

/// Multiplier used past the end of a table.
pub const FALLBACK_MULTIPLIER: Decimal = dec!(2);

/// Override multiplier for a lost Banker bet in a Banker-streak pattern.
pub const OVERRIDE_MULTIPLIER: Decimal = dec!(2.11);

/// Override stakes are rounded up to a multiple of this.
pub const OVERRIDE_ROUNDING: Decimal = dec!(10);

// ---------------------------------------------------------------------------
// Tables
// ---------------------------------------------------------------------------

/// One named multiplier table.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyTable {
    name: String,
    multipliers: Vec<Decimal>,
    /// When set, the table is only allowed while the session's max
    /// escalation level is strictly below this value.
    max_level_below: Option<u32>,
}

impl StrategyTable {
    pub fn new(
        name: &str,
        multipliers: Vec<Decimal>,
        max_level_below: Option<u32>,
    ) -> Result<Self, SessionError> {
        if multipliers.iter().any(|m| *m <= Decimal::ZERO) {
            return Err(SessionError::Config(format!(
                "strategy '{name}' has a non-positive multiplier"
            )));
        }
        Ok(Self {
            name: name.to_string(),
            multipliers,
            max_level_below,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn multipliers(&self) -> &[Decimal] {
        &self.multipliers
    }

    /// Multiplier applied when leaving `level`; ×2 past the table end.
    pub fn multiplier(&self, level: u32) -> Decimal {
        self.multipliers
            .get(level as usize)
            .copied()
            .unwrap_or(FALLBACK_MULTIPLIER)
    }

    /// Whether this table may be used with the given max escalation level.
    pub fn permits(&self, max_level: u32) -> bool {
        self.max_level_below.map_or(true, |limit| max_level < limit)
    }

    pub fn is_restricted(&self) -> bool {
        self.max_level_below.is_some()
    }
}

/// The registry of known tables, keyed by case-insensitive name.
#[derive(Debug, Clone)]
pub struct StrategyRegistry {
    tables: Vec<StrategyTable>,
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        let builtin = |name: &str, m: Vec<Decimal>, limit: Option<u32>| StrategyTable {
            name: name.to_string(),
            multipliers: m,
            max_level_below: limit,
        };
        Self {
            tables: vec![
                builtin(DEFAULT_STRATEGY, vec![dec!(2); 20], None),
                builtin(
                    "Sweeper",
                    vec![
                        dec!(3), dec!(3), dec!(3), dec!(2), dec!(2),
                        dec!(2), dec!(2), dec!(2), dec!(2), dec!(2),
                    ],
                    None,
                ),
                builtin("Tank", vec![dec!(3), dec!(3), dec!(2.5)], Some(4)),
            ],
        }
    }
}

impl StrategyRegistry {
    /// Look up a table by name (case-insensitive).
    pub fn get(&self, name: &str) -> Option<&StrategyTable> {
        self.tables
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(name.trim()))
    }

    /// Look up a table, degrading to the default table when unknown.
    pub fn resolve(&self, name: &str) -> &StrategyTable {
        match self.get(name) {
            Some(t) => t,
            None => {
                warn!(
                    strategy = name,
                    fallback = DEFAULT_STRATEGY,
                    "Unknown strategy, using default"
                );
                self.default_table()
            }
        }
    }

    pub fn default_table(&self) -> &StrategyTable {
        self.get(DEFAULT_STRATEGY).unwrap_or(&self.tables[0])
    }

    /// Add or replace a table.
    pub fn register(&mut self, table: StrategyTable) {
        debug!(strategy = %table.name, levels = table.multipliers.len(), "Strategy registered");
        match self
            .tables
            .iter_mut()
            .find(|t| t.name.eq_ignore_ascii_case(&table.name))
        {
            Some(existing) => *existing = table,
            None => self.tables.push(table),
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.tables.iter().map(|t| t.name.as_str()).collect()
    }
}

// ---------------------------------------------------------------------------
// Stake computation
// ---------------------------------------------------------------------------

/// Which rule produced a stake after a loss.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StakeRule {
    BankerStreakOverride,
    Table { multiplier: Decimal },
}

/// Stake to use after losing `current` at escalation `level`.
///
/// Override first: a lost Banker bet in a pattern with two adjacent Banker
/// steps goes to `ceil(current × 2.11 / 10) × 10`. Otherwise the table
/// multiplier for `level` is applied and the result truncated.
pub fn next_stake_after_loss(
    current: u64,
    level: u32,
    targeted: Side,
    pattern: &Pattern,
    table: &StrategyTable,
) -> (u64, StakeRule) {
    let stake = Decimal::from(current);

    if targeted == Side::Banker && pattern.has_consecutive_banker() {
        let next = (stake * OVERRIDE_MULTIPLIER / OVERRIDE_ROUNDING).ceil() * OVERRIDE_ROUNDING;
        return (to_stake(next), StakeRule::BankerStreakOverride);
    }

    let multiplier = table.multiplier(level);
    let next = (stake * multiplier).trunc();
    (to_stake(next), StakeRule::Table { multiplier })
}

fn to_stake(value: Decimal) -> u64 {
    value.to_u64().unwrap_or(u64::MAX)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
