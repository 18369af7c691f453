//! Session state: the single mutable record of a betting session.
//!
//! Only the controller and the remote reconciler mutate it. A fresh
//! session is an explicit re-initialisation (`reinitialize`), never an
//! implicit side effect.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::strategy::pattern::PatternCursor;
use crate::strategy::table::DEFAULT_STRATEGY;
use crate::types::{Heartbeat, RoundResult, SessionStatus, StopReason};

// ---------------------------------------------------------------------------
// Seed
// ---------------------------------------------------------------------------

/// Initial values a session is created from (supplied by configuration).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSeed {
    pub table_id: String,
    pub pattern: String,
    pub base_stake: u64,
    pub strategy: String,
    pub max_escalation_level: u32,
    /// 0 disables the profit gate.
    pub target_profit_pct: Decimal,
    /// 0 means unlimited.
    pub target_duration_minutes: u64,
}

impl Default for SessionSeed {
    fn default() -> Self {
        Self {
            table_id: "table-1".to_string(),
            pattern: "B".to_string(),
            base_stake: 10,
            strategy: DEFAULT_STRATEGY.to_string(),
            max_escalation_level: 6,
            target_profit_pct: Decimal::ZERO,
            target_duration_minutes: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SessionState {
    pub session_id: Uuid,
    pub table_id: String,
    pub base_stake: u64,
    pub current_stake: u64,
    pub escalation_level: u32,
    pub cursor: PatternCursor,
    pub last_result: Option<RoundResult>,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub starting_balance: Option<Decimal>,
    pub target_balance: Option<Decimal>,
    pub target_profit_pct: Decimal,
    pub target_duration_secs: u64,
    pub max_escalation_level: u32,
    pub strategy: String,
    pub stop_reason: Option<StopReason>,
    /// Rounds resolved this session (baseline and pushes included).
    pub rounds_resolved: u64,
    /// Most recent balance reading.
    pub last_balance: Option<Decimal>,
    /// Balance reading when the wager now in play was issued.
    pub balance_at_bet: Option<Decimal>,
}

impl SessionState {
    /// Build an idle session from seed values.
    pub fn from_seed(seed: &SessionSeed, now: DateTime<Utc>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            table_id: seed.table_id.clone(),
            base_stake: seed.base_stake.max(1),
            current_stake: seed.base_stake.max(1),
            escalation_level: 0,
            cursor: PatternCursor::from_text(&seed.pattern),
            last_result: None,
            status: SessionStatus::Idle,
            started_at: now,
            starting_balance: None,
            target_balance: None,
            target_profit_pct: seed.target_profit_pct.max(Decimal::ZERO),
            target_duration_secs: seed.target_duration_minutes.saturating_mul(60),
            max_escalation_level: seed.max_escalation_level,
            strategy: seed.strategy.clone(),
            stop_reason: None,
            rounds_resolved: 0,
            last_balance: None,
            balance_at_bet: None,
        }
    }

    /// Start over: keep configuration, drop all betting progress.
    pub fn reinitialize(&mut self, now: DateTime<Utc>) {
        self.session_id = Uuid::new_v4();
        self.current_stake = self.base_stake;
        self.escalation_level = 0;
        self.cursor.rewind();
        self.last_result = None;
        self.started_at = now;
        self.starting_balance = None;
        self.target_balance = None;
        self.stop_reason = None;
        self.rounds_resolved = 0;
        self.balance_at_bet = None;
    }

    /// Back to the base stake at level 0.
    pub fn reset_progression(&mut self) {
        self.current_stake = self.base_stake;
        self.escalation_level = 0;
    }

    pub fn is_running(&self) -> bool {
        self.status == SessionStatus::Running
    }

    pub fn elapsed_secs(&self, now: DateTime<Utc>) -> u64 {
        (now - self.started_at).num_seconds().max(0) as u64
    }

    /// Anchor the starting balance on the first reading; later readings
    /// only update `last_balance`.
    pub fn observe_balance(&mut self, balance: Decimal) {
        self.last_balance = Some(balance);
        if self.starting_balance.is_none() {
            self.starting_balance = Some(balance);
            self.recompute_target();
        }
    }

    /// Derive the target balance from the anchor and profit percentage.
    pub fn recompute_target(&mut self) {
        self.target_balance = match self.starting_balance {
            Some(start) if self.target_profit_pct > Decimal::ZERO => {
                Some(start * (Decimal::ONE + self.target_profit_pct / dec!(100)))
            }
            _ => None,
        };
    }

    pub fn heartbeat(&self, now: DateTime<Utc>) -> Heartbeat {
        Heartbeat {
            id: self.table_id.clone(),
            status: self.status.to_string(),
            balance: self.last_balance.unwrap_or(Decimal::ZERO),
            escalation_level: self.escalation_level,
            elapsed_minutes: (self.elapsed_secs(now) / 60) as i64,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} | pattern={} [{}/{}] | stake={} (base {}) | level={}/{} | strategy={} | rounds={}",
            self.table_id,
            self.status,
            self.cursor.pattern(),
            self.cursor.position() + 1,
            self.cursor.len(),
            self.current_stake,
            self.base_stake,
            self.escalation_level,
            self.max_escalation_level,
            self.strategy,
            self.rounds_resolved,
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
