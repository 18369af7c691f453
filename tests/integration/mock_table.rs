//! Mock table for integration testing.
//!
//! A deterministic in-memory table that plays both sides of the engine's
//! adapters: it shows a queued shoe of outcomes (each followed by a clear
//! reading), accepts wagers, and settles them against its own balance.
//! A companion sink and remote channel record everything they are given.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use stakeline::adapters::{Actuator, Perception, TelemetrySink};
use stakeline::config::RunnerConfig;
use stakeline::engine::{SessionController, SessionSeed, TableRunner};
use stakeline::engine::reconciler::RemoteSnapshot;
use stakeline::remote::RemoteChannel;
use stakeline::strategy::StrategyRegistry;
use stakeline::types::*;

/// Banker wins pay 0.95 to 1.
const BANKER_PAYOUT: Decimal = dec!(0.95);

struct TableState {
    shoe: VecDeque<DetectedOutcome>,
    showing: bool,
    balance: Decimal,
    open_wager: Option<WagerRequest>,
    wagers: Vec<WagerRequest>,
}

/// A mock baccarat table.
pub struct MockTable {
    state: Arc<Mutex<TableState>>,
    /// If set, perception calls return this error.
    force_error: Arc<Mutex<Option<String>>>,
}

impl MockTable {
    pub fn new(shoe: Vec<DetectedOutcome>, balance: Decimal) -> Self {
        Self {
            state: Arc::new(Mutex::new(TableState {
                shoe: shoe.into(),
                showing: false,
                balance,
                open_wager: None,
                wagers: Vec::new(),
            })),
            force_error: Arc::new(Mutex::new(None)),
        }
    }

    /// Shoe from pattern-style letters: `B`, `P`, `T`.
    pub fn from_letters(letters: &str, balance: Decimal) -> Self {
        let shoe = letters
            .chars()
            .filter_map(|c| match c {
                'B' => Some(DetectedOutcome::BankerWin),
                'P' => Some(DetectedOutcome::PlayerWin),
                'T' => Some(DetectedOutcome::Tie),
                _ => None,
            })
            .collect();
        Self::new(shoe, balance)
    }

    pub fn set_error(&self, msg: &str) {
        *self.force_error.lock().unwrap() = Some(msg.to_string());
    }

    pub fn clear_error(&self) {
        *self.force_error.lock().unwrap() = None;
    }

    pub fn wagers(&self) -> Vec<WagerRequest> {
        self.state.lock().unwrap().wagers.clone()
    }

    pub fn stakes(&self) -> Vec<u64> {
        self.wagers().iter().map(|w| w.amount).collect()
    }

    pub fn balance(&self) -> Decimal {
        self.state.lock().unwrap().balance
    }

    fn settle(state: &mut TableState, outcome: DetectedOutcome) {
        let Some(wager) = state.open_wager.take() else {
            return;
        };
        let amount = Decimal::from(wager.amount);
        match outcome.winning_side() {
            Some(side) if side == wager.side => {
                state.balance += match side {
                    Side::Banker => amount * BANKER_PAYOUT,
                    Side::Player => amount,
                };
            }
            Some(_) => state.balance -= amount,
            None => {}
        }
    }
}

#[async_trait]
impl Perception for MockTable {
    async fn classify_outcome(&self) -> Result<DetectedOutcome> {
        if let Some(msg) = self.force_error.lock().unwrap().clone() {
            return Err(anyhow!(msg));
        }
        let mut state = self.state.lock().unwrap();
        if state.showing {
            state.showing = false;
            return Ok(DetectedOutcome::Unknown);
        }
        match state.shoe.pop_front() {
            Some(outcome) => {
                Self::settle(&mut state, outcome);
                state.showing = true;
                Ok(outcome)
            }
            None => Ok(DetectedOutcome::Unknown),
        }
    }

    async fn read_balance(&self) -> Result<Option<Decimal>> {
        Ok(Some(self.state.lock().unwrap().balance))
    }

    fn is_exhausted(&self) -> bool {
        let state = self.state.lock().unwrap();
        state.shoe.is_empty() && !state.showing
    }
}

#[async_trait]
impl Actuator for MockTable {
    async fn place_wager(&self, wager: &WagerRequest) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.open_wager = Some(wager.clone());
        state.wagers.push(wager.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Sink
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemorySink {
    records: Mutex<Vec<RoundRecord>>,
}

impl MemorySink {
    pub fn records(&self) -> Vec<RoundRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl TelemetrySink for MemorySink {
    async fn record_round(&self, record: &RoundRecord) -> Result<()> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Remote
// ---------------------------------------------------------------------------

/// Remote channel whose stored row is set by the test.
#[derive(Default)]
pub struct MockRemote {
    row: Mutex<Option<RemoteSnapshot>>,
    heartbeats: Mutex<Vec<Heartbeat>>,
    force_error: Mutex<Option<String>>,
}

impl MockRemote {
    pub fn set_row(&self, json: serde_json::Value) {
        *self.row.lock().unwrap() = Some(RemoteSnapshot::from_value(json));
    }

    pub fn set_error(&self, msg: &str) {
        *self.force_error.lock().unwrap() = Some(msg.to_string());
    }

    pub fn heartbeats(&self) -> Vec<Heartbeat> {
        self.heartbeats.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteChannel for MockRemote {
    async fn exchange(&self, heartbeat: &Heartbeat) -> Result<Option<RemoteSnapshot>> {
        if let Some(msg) = self.force_error.lock().unwrap().clone() {
            return Err(anyhow!(msg));
        }
        self.heartbeats.lock().unwrap().push(heartbeat.clone());
        Ok(self.row.lock().unwrap().clone())
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

/// Runner timings that keep tests fast.
pub fn fast_timing() -> RunnerConfig {
    RunnerConfig {
        poll_interval_ms: 1,
        bet_delay_ms: 0,
        sync_interval_secs: 1,
    }
}

pub fn seed(pattern: &str, strategy: &str, max_level: u32) -> SessionSeed {
    SessionSeed {
        table_id: "mock-1".to_string(),
        pattern: pattern.to_string(),
        strategy: strategy.to_string(),
        max_escalation_level: max_level,
        ..SessionSeed::default()
    }
}

/// A controller that is already running.
pub fn started(seed: &SessionSeed) -> SessionController {
    let now = Utc::now();
    let mut c = SessionController::new(seed, StrategyRegistry::default(), now);
    c.start(now);
    c
}

/// A runner wired to a mock table and a memory sink.
pub fn runner_for(
    seed: &SessionSeed,
    table: &Arc<MockTable>,
    sink: &Arc<MemorySink>,
) -> TableRunner {
    TableRunner::new(
        started(seed),
        table.clone(),
        table.clone(),
        sink.clone(),
        fast_timing(),
    )
}
