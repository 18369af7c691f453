//! Table runner: the async driver for one table.
//!
//! Polls perception on a fixed period, edge-detects round completion,
//! ticks the controller, and hands the results to the actuator and the
//! telemetry sink. Remote reconciliation runs as a separate task on its
//! own timer; it shares the controller through an async mutex and only
//! holds the lock for the heartbeat snapshot and the merge.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::controller::SessionController;
use super::reconciler::{ReconcileReport, RemoteReconciler};
use crate::adapters::{Actuator, Perception, TelemetrySink};
use crate::config::RunnerConfig;
use crate::remote::RemoteChannel;
use crate::types::{DetectedOutcome, Observation, SessionStatus, StopReason, TickOutcome};

pub type SharedSession = Arc<Mutex<SessionController>>;

// ---------------------------------------------------------------------------
// Round gate
// ---------------------------------------------------------------------------

/// A result stays on screen for several polls. The gate passes the first
/// reading of a result through and masks the rest until the table shows
/// nothing again.
#[derive(Debug, Default)]
pub struct RoundGate {
    awaiting_clear: bool,
}

impl RoundGate {
    pub fn admit(&mut self, outcome: DetectedOutcome) -> DetectedOutcome {
        if !outcome.is_known() {
            self.awaiting_clear = false;
            return DetectedOutcome::Unknown;
        }
        if self.awaiting_clear {
            return DetectedOutcome::Unknown;
        }
        self.awaiting_clear = true;
        outcome
    }
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub table_id: String,
    pub status: SessionStatus,
    pub stop_reason: Option<StopReason>,
    pub rounds_resolved: u64,
    pub records_written: u64,
    pub wagers_placed: u64,
    pub escalation_level: u32,
    pub last_balance: Option<Decimal>,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} | rounds={} records={} wagers={} level={}",
            self.table_id,
            self.status,
            self.rounds_resolved,
            self.records_written,
            self.wagers_placed,
            self.escalation_level,
        )?;
        if let Some(reason) = &self.stop_reason {
            write!(f, " | stopped: {reason}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Remote sync task
// ---------------------------------------------------------------------------

pub struct RemoteSync {
    table_id: String,
    session: SharedSession,
    remote: Arc<dyn RemoteChannel>,
    reconciler: RemoteReconciler,
}

impl RemoteSync {
    pub fn new(table_id: &str, session: SharedSession, remote: Arc<dyn RemoteChannel>) -> Self {
        Self {
            table_id: table_id.to_string(),
            session,
            remote,
            reconciler: RemoteReconciler::new(),
        }
    }

    /// One heartbeat/merge round trip. The exchange happens without the
    /// session lock held.
    pub async fn sync_once(&mut self, now: DateTime<Utc>) -> anyhow::Result<ReconcileReport> {
        let heartbeat = self.session.lock().await.heartbeat(now);
        let Some(snapshot) = self.remote.exchange(&heartbeat).await? else {
            debug!(table = %self.table_id, "No remote row yet");
            return Ok(ReconcileReport::default());
        };
        let mut session = self.session.lock().await;
        Ok(self.reconciler.apply(&mut session, &snapshot, now))
    }

    pub async fn run(mut self, period: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(period);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.sync_once(Utc::now()).await {
                        Ok(report) if !report.is_empty() => {
                            info!(
                                table = %self.table_id,
                                changes = report.changes.len(),
                                summary = %report,
                                "Remote sync applied"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => {
                            warn!(
                                table = %self.table_id,
                                error = %e,
                                "Remote sync failed, keeping local configuration"
                            );
                        }
                    }
                }
                res = shutdown.changed() => {
                    if res.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        debug!(table = %self.table_id, "Remote sync stopped");
    }
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

pub struct TableRunner {
    table_id: String,
    session: SharedSession,
    perception: Arc<dyn Perception>,
    actuator: Arc<dyn Actuator>,
    sink: Arc<dyn TelemetrySink>,
    remote: Option<Arc<dyn RemoteChannel>>,
    timing: RunnerConfig,
    gate: RoundGate,
    records_written: u64,
    wagers_placed: u64,
}

impl TableRunner {
    pub fn new(
        session: SessionController,
        perception: Arc<dyn Perception>,
        actuator: Arc<dyn Actuator>,
        sink: Arc<dyn TelemetrySink>,
        timing: RunnerConfig,
    ) -> Self {
        Self {
            table_id: session.state().table_id.clone(),
            session: Arc::new(Mutex::new(session)),
            perception,
            actuator,
            sink,
            remote: None,
            timing,
            gate: RoundGate::default(),
            records_written: 0,
            wagers_placed: 0,
        }
    }

    pub fn with_remote(mut self, remote: Arc<dyn RemoteChannel>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn session(&self) -> SharedSession {
        Arc::clone(&self.session)
    }

    pub fn table_id(&self) -> &str {
        &self.table_id
    }

    /// Read the table once and act on whatever the controller decides.
    /// Adapter failures are logged; nothing here feeds an error back into
    /// the session.
    pub async fn poll_once(&mut self, now: DateTime<Utc>) -> TickOutcome {
        let raw = match self.perception.classify_outcome().await {
            Ok(o) => o,
            Err(e) => {
                debug!(table = %self.table_id, error = %e, "Outcome unreadable");
                DetectedOutcome::Unknown
            }
        };
        let outcome = self.gate.admit(raw);
        let balance = match self.perception.read_balance().await {
            Ok(b) => b,
            Err(e) => {
                debug!(table = %self.table_id, error = %e, "Balance unreadable");
                None
            }
        };

        let tick = self
            .session
            .lock()
            .await
            .tick(Observation::new(outcome, balance), now);

        if let Some(record) = &tick.record {
            match self.sink.record_round(record).await {
                Ok(()) => self.records_written += 1,
                Err(e) => error!(table = %self.table_id, error = %e, "Failed to record round"),
            }
        }

        if let Some(wager) = &tick.wager {
            if self.timing.bet_delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.timing.bet_delay_ms)).await;
            }
            match self.actuator.place_wager(wager).await {
                Ok(()) => self.wagers_placed += 1,
                Err(e) => error!(
                    table = %self.table_id,
                    wager = %wager,
                    error = %e,
                    "Wager not placed"
                ),
            }
        }

        tick
    }

    /// Drive the table until shutdown, until a finite feed runs dry, or
    /// until a safety stop occurs with no remote channel to restart it.
    pub async fn run(mut self, shutdown: watch::Receiver<bool>) -> RunSummary {
        let sync_task: Option<JoinHandle<()>> = self.remote.clone().map(|remote| {
            let sync = RemoteSync::new(&self.table_id, self.session(), remote);
            let period = Duration::from_secs(self.timing.sync_interval_secs.max(1));
            tokio::spawn(sync.run(period, shutdown.clone()))
        });

        let mut shutdown = shutdown;
        let mut interval =
            tokio::time::interval(Duration::from_millis(self.timing.poll_interval_ms.max(1)));
        info!(table = %self.table_id, remote = self.remote.is_some(), "Runner started");

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let tick = self.poll_once(Utc::now()).await;
                    if tick.is_noop() && self.perception.is_exhausted() {
                        info!(table = %self.table_id, "Outcome feed exhausted");
                        break;
                    }
                    let stopped = self.session.lock().await.status() == SessionStatus::Stopping;
                    if self.remote.is_none() && stopped {
                        info!(
                            table = %self.table_id,
                            "Session stopped with no remote channel to restart it"
                        );
                        break;
                    }
                }
                res = shutdown.changed() => {
                    if res.is_err() || *shutdown.borrow() {
                        info!(table = %self.table_id, "Shutdown requested");
                        break;
                    }
                }
            }
        }

        if let Some(task) = sync_task {
            task.abort();
        }
        self.summary().await
    }

    pub async fn summary(&self) -> RunSummary {
        let session = self.session.lock().await;
        let state = session.state();
        RunSummary {
            table_id: self.table_id.clone(),
            status: state.status,
            stop_reason: state.stop_reason.clone(),
            rounds_resolved: state.rounds_resolved,
            records_written: self.records_written,
            wagers_placed: self.wagers_placed,
            escalation_level: state.escalation_level,
            last_balance: state.last_balance,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
