//! Shared types for the STAKELINE engine.
//!
//! These types form the data model used across all modules.
//! They are kept free of behaviour beyond small helpers so that the
//! strategy, engine, adapter, and remote modules can depend on them
//! without circular references.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Sides and symbols
// ---------------------------------------------------------------------------

/// The side a wager is placed on.
///
/// `Banker` is the "side A" of the game and the one the stake override rule
/// keys on; `Player` is "side B".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Banker,
    Player,
}

impl Side {
    /// The opposite side.
    pub fn opposite(&self) -> Self {
        match self {
            Side::Banker => Side::Player,
            Side::Player => Side::Banker,
        }
    }

    /// Single-letter pattern code.
    pub fn code(&self) -> char {
        match self {
            Side::Banker => 'B',
            Side::Player => 'P',
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Banker => write!(f, "BANKER"),
            Side::Player => write!(f, "PLAYER"),
        }
    }
}

/// One step of a betting pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Symbol {
    Banker,
    Player,
    /// Bet the most recent concrete side that precedes this step.
    Repeat,
}

impl Symbol {
    /// Parse a pattern letter (`B`, `P`, `T`), case-insensitive.
    pub fn from_code(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'B' => Some(Symbol::Banker),
            'P' => Some(Symbol::Player),
            'T' => Some(Symbol::Repeat),
            _ => None,
        }
    }

    pub fn code(&self) -> char {
        match self {
            Symbol::Banker => 'B',
            Symbol::Player => 'P',
            Symbol::Repeat => 'T',
        }
    }

    /// The concrete side this symbol names, if any.
    pub fn side(&self) -> Option<Side> {
        match self {
            Symbol::Banker => Some(Side::Banker),
            Symbol::Player => Some(Side::Player),
            Symbol::Repeat => None,
        }
    }
}

impl From<Side> for Symbol {
    fn from(side: Side) -> Self {
        match side {
            Side::Banker => Symbol::Banker,
            Side::Player => Symbol::Player,
        }
    }
}

// ---------------------------------------------------------------------------
// Outcomes and results
// ---------------------------------------------------------------------------

/// What the perception layer saw on the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DetectedOutcome {
    BankerWin,
    PlayerWin,
    Tie,
    /// A win banner with no readable side name.
    GenericWin,
    /// Nothing recognisable yet (round in progress, banner cleared).
    Unknown,
}

impl DetectedOutcome {
    /// The side this outcome names, if it names one.
    pub fn winning_side(&self) -> Option<Side> {
        match self {
            DetectedOutcome::BankerWin => Some(Side::Banker),
            DetectedOutcome::PlayerWin => Some(Side::Player),
            _ => None,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, DetectedOutcome::Unknown)
    }
}

impl fmt::Display for DetectedOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectedOutcome::BankerWin => write!(f, "BANKER"),
            DetectedOutcome::PlayerWin => write!(f, "PLAYER"),
            DetectedOutcome::Tie => write!(f, "TIE"),
            DetectedOutcome::GenericWin => write!(f, "GENERIC_WIN"),
            DetectedOutcome::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Parse an outcome label (as written by scripted feeds), case-insensitive.
impl std::str::FromStr for DetectedOutcome {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "banker" | "b" => Ok(DetectedOutcome::BankerWin),
            "player" | "p" => Ok(DetectedOutcome::PlayerWin),
            "tie" | "t" => Ok(DetectedOutcome::Tie),
            "win" | "generic_win" => Ok(DetectedOutcome::GenericWin),
            "unknown" | "-" | "" => Ok(DetectedOutcome::Unknown),
            other => Err(SessionError::Perception(format!(
                "Unknown outcome label: {other}"
            ))),
        }
    }
}

/// Scored result of a round from the session's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoundResult {
    /// First observed round of a session, used only to synchronise.
    Baseline,
    Win,
    Loss,
    Push,
}

impl fmt::Display for RoundResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoundResult::Baseline => write!(f, "BASELINE"),
            RoundResult::Win => write!(f, "WIN"),
            RoundResult::Loss => write!(f, "LOSS"),
            RoundResult::Push => write!(f, "PUSH"),
        }
    }
}

// ---------------------------------------------------------------------------
// Session lifecycle
// ---------------------------------------------------------------------------

/// Session lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    Idle,
    Running,
    /// A safety limit tripped; no further wagers this session.
    Stopping,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Idle => write!(f, "Idle"),
            SessionStatus::Running => write!(f, "Running"),
            SessionStatus::Stopping => write!(f, "Stopped"),
        }
    }
}

/// Why a session stopped placing wagers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    MaxLevelReached { level: u32, max: u32 },
    DurationReached { elapsed_secs: u64 },
    ProfitTargetReached { balance: Decimal, target: Decimal },
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::MaxLevelReached { level, max } => {
                write!(f, "max escalation level exceeded ({level} > {max})")
            }
            StopReason::DurationReached { elapsed_secs } => {
                write!(f, "session time budget used ({elapsed_secs}s)")
            }
            StopReason::ProfitTargetReached { balance, target } => {
                write!(f, "profit target reached ({balance} >= {target})")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Per-tick input and output
// ---------------------------------------------------------------------------

/// One perception reading handed to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    pub outcome: DetectedOutcome,
    pub balance: Option<Decimal>,
}

impl Observation {
    pub fn new(outcome: DetectedOutcome, balance: Option<Decimal>) -> Self {
        Self { outcome, balance }
    }

    /// A reading with nothing on the table.
    pub fn idle(balance: Option<Decimal>) -> Self {
        Self::new(DetectedOutcome::Unknown, balance)
    }
}

/// A request for the actuator to stake `amount` on `side`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WagerRequest {
    pub table_id: String,
    pub side: Side,
    pub amount: u64,
    pub escalation_level: u32,
    /// Zero-based pattern position the wager was issued for.
    pub pattern_index: usize,
    pub pattern_len: usize,
}

impl fmt::Display for WagerRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} on {} (level {}) [{}/{}]",
            self.table_id,
            self.amount,
            self.side,
            self.escalation_level,
            self.pattern_index + 1,
            self.pattern_len,
        )
    }
}

/// Telemetry entry for a resolved round that had a wager at stake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundRecord {
    pub table_id: String,
    pub round: u64,
    pub side: Side,
    pub result: RoundResult,
    pub balance_before: Option<Decimal>,
    pub balance_after: Option<Decimal>,
    pub escalation_level_at_bet: u32,
    pub stake_at_bet: u64,
    pub timestamp: DateTime<Utc>,
}

impl fmt::Display for RoundRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fmt_bal = |b: Option<Decimal>| b.map(|v| v.to_string()).unwrap_or_else(|| "?".into());
        write!(
            f,
            "[{}] round #{} {} {} stake={} level={} balance {} -> {}",
            self.table_id,
            self.round,
            self.side,
            self.result,
            self.stake_at_bet,
            self.escalation_level_at_bet,
            fmt_bal(self.balance_before),
            fmt_bal(self.balance_after),
        )
    }
}

/// Everything the controller decided on one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickOutcome {
    pub result: Option<RoundResult>,
    pub wager: Option<WagerRequest>,
    pub record: Option<RoundRecord>,
    pub stopped: Option<StopReason>,
}

impl TickOutcome {
    /// Nothing happened (heartbeat tick or session not running).
    pub fn is_noop(&self) -> bool {
        self.result.is_none() && self.wager.is_none() && self.stopped.is_none()
    }
}

/// Outbound status payload for the remote control channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub id: String,
    pub status: String,
    pub balance: Decimal,
    pub escalation_level: u32,
    pub elapsed_minutes: i64,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for STAKELINE.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Remote channel error: {0}")]
    Remote(String),

    #[error("Perception error: {0}")]
    Perception(String),

    #[error("Actuator error ({table}): {message}")]
    Actuator { table: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
