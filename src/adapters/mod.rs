//! Adapters to the world outside the session engine.
//!
//! Defines the `Perception`, `Actuator` and `TelemetrySink` traits and
//! provides implementations for:
//! - Scripted perception: replays a shoe of outcomes from a text file
//! - Dry-run actuator: logs the chip plan for each wager instead of clicking
//! - Chip rack: greedy stake decomposition shared by actuators
//!
//! The JSON-lines telemetry sink lives in `storage`.

pub mod chips;
pub mod dry_run;
pub mod scripted;

use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::types::{DetectedOutcome, RoundRecord, WagerRequest};

/// Reads the table: the latest round outcome and the account balance.
///
/// `Unknown` is the normal answer while a round is in progress; callers
/// treat errors the same way.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Perception: Send + Sync {
    async fn classify_outcome(&self) -> Result<DetectedOutcome>;

    async fn read_balance(&self) -> Result<Option<Decimal>>;

    /// Finite feeds report when they have nothing left to show.
    fn is_exhausted(&self) -> bool {
        false
    }
}

/// Places wagers. Fire-and-forget from the engine's point of view.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Actuator: Send + Sync {
    async fn place_wager(&self, wager: &WagerRequest) -> Result<()>;
}

/// Receives one record per resolved, non-push round.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    async fn record_round(&self, record: &RoundRecord) -> Result<()>;
}
