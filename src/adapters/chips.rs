//! Chip rack: turns a stake into a stack of chips.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// Chip denominations used when none are configured.
pub const DEFAULT_DENOMINATIONS: [u64; 6] = [1000, 500, 100, 50, 20, 10];

/// How a stake is built from chips.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChipPlan {
    /// `(denomination, count)` in descending denomination order.
    pub chips: Vec<(u64, u64)>,
    /// Part of the stake no chip could cover.
    pub remainder: u64,
}

impl ChipPlan {
    pub fn total(&self) -> u64 {
        self.chips.iter().map(|(d, n)| d * n).sum()
    }

    pub fn clicks(&self) -> u64 {
        self.chips.iter().map(|(_, n)| n).sum()
    }

    pub fn is_exact(&self) -> bool {
        self.remainder == 0
    }
}

impl fmt::Display for ChipPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .chips
            .iter()
            .map(|(d, n)| format!("{n}x{d}"))
            .collect();
        if parts.is_empty() {
            write!(f, "(none)")?;
        } else {
            write!(f, "{}", parts.join(" + "))?;
        }
        if self.remainder > 0 {
            write!(f, " (short {})", self.remainder)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChipRack {
    denominations: Vec<u64>,
}

impl ChipRack {
    /// Zero denominations are dropped; duplicates collapse.
    pub fn new(mut denominations: Vec<u64>) -> Self {
        denominations.retain(|d| *d > 0);
        denominations.sort_unstable_by(|a, b| b.cmp(a));
        denominations.dedup();
        Self { denominations }
    }

    pub fn denominations(&self) -> &[u64] {
        &self.denominations
    }

    /// Greedy largest-first decomposition.
    pub fn decompose(&self, amount: u64) -> ChipPlan {
        let mut left = amount;
        let mut chips = Vec::new();
        for &d in &self.denominations {
            let n = left / d;
            if n > 0 {
                chips.push((d, n));
                left -= n * d;
            }
        }
        if left > 0 {
            warn!(amount, remainder = left, "Stake cannot be matched exactly with available chips");
        }
        ChipPlan {
            chips,
            remainder: left,
        }
    }
}

impl Default for ChipRack {
    fn default() -> Self {
        Self::new(DEFAULT_DENOMINATIONS.to_vec())
    }
}
