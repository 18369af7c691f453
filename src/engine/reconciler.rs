//! Remote reconciliation.
//!
//! Merges a snapshot of remotely pushed settings into a live session. Only
//! fields that differ from the current values are applied, and each applied
//! change is reported as a `ChangeEvent`. Malformed values are skipped; the
//! merge itself never fails.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

use super::controller::SessionController;
use crate::strategy::pattern::{normalize, Pattern};
use crate::strategy::table::DEFAULT_STRATEGY;
use crate::types::SessionStatus;

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Remote intent for one table. Every field is optional; `None` means "no
/// change requested". Values are kept as raw JSON so a bad field never
/// poisons the rest of the snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteSnapshot {
    #[serde(default)]
    pub pattern: Option<Value>,
    #[serde(default, alias = "level")]
    pub base_stake: Option<Value>,
    #[serde(default)]
    pub strategy: Option<Value>,
    #[serde(default)]
    pub max_level: Option<Value>,
    #[serde(default)]
    pub target_profit_pct: Option<Value>,
    #[serde(default)]
    pub target_duration_minutes: Option<Value>,
    #[serde(default)]
    pub command: Option<Value>,
}

impl RemoteSnapshot {
    /// Interpret an arbitrary JSON row as a snapshot. Anything that isn't an
    /// object yields an empty snapshot.
    pub fn from_value(value: Value) -> Self {
        serde_json::from_value(value).unwrap_or_default()
    }

    pub fn command(&self) -> Command {
        self.command.as_ref().map_or(Command::Run, Command::parse)
    }
}

// ---------------------------------------------------------------------------
// Command
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    Run,
    Stop,
}

impl Command {
    /// Normalise the remote command encoding. Only a boolean or a string
    /// can stop the table; anything else, numbers included, is treated as
    /// run.
    pub fn parse(value: &Value) -> Self {
        match value {
            Value::Bool(true) => Command::Run,
            Value::Bool(false) => Command::Stop,
            Value::String(s) => match s.trim().to_lowercase().as_str() {
                "false" | "stop" | "0" => Command::Stop,
                _ => Command::Run,
            },
            _ => Command::Run,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Run => write!(f, "RUN"),
            Command::Stop => write!(f, "STOP"),
        }
    }
}

// ---------------------------------------------------------------------------
// Change events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    Pattern { from: String, to: String },
    PatternRejected { requested: String, reason: String },
    BaseStake { from: u64, to: u64 },
    Strategy { from: String, to: String },
    StrategyRejected { requested: String, reason: String },
    MaxLevel { from: u32, to: u32 },
    MaxLevelClamped { requested: u32, ceiling: u32, base_stake: u64 },
    TargetProfit { from: Decimal, to: Decimal },
    TargetDuration { from_minutes: u64, to_minutes: u64 },
    Started,
    Resumed,
    Paused,
    StopAcknowledged,
}

impl fmt::Display for ChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeEvent::Pattern { from, to } => write!(f, "pattern {from} -> {to}"),
            ChangeEvent::PatternRejected { requested, reason } => {
                write!(f, "pattern '{requested}' rejected: {reason}")
            }
            ChangeEvent::BaseStake { from, to } => write!(f, "base stake {from} -> {to}"),
            ChangeEvent::Strategy { from, to } => write!(f, "strategy {from} -> {to}"),
            ChangeEvent::StrategyRejected { requested, reason } => {
                write!(f, "strategy '{requested}' rejected: {reason}")
            }
            ChangeEvent::MaxLevel { from, to } => write!(f, "max level {from} -> {to}"),
            ChangeEvent::MaxLevelClamped { requested, ceiling, base_stake } => write!(
                f,
                "max level {requested} clamped to {ceiling} for base stake {base_stake}"
            ),
            ChangeEvent::TargetProfit { from, to } => write!(f, "profit target {from}% -> {to}%"),
            ChangeEvent::TargetDuration { from_minutes, to_minutes } => {
                write!(f, "duration {from_minutes}m -> {to_minutes}m")
            }
            ChangeEvent::Started => write!(f, "fresh session started"),
            ChangeEvent::Resumed => write!(f, "session resumed"),
            ChangeEvent::Paused => write!(f, "session paused"),
            ChangeEvent::StopAcknowledged => write!(f, "safety stop acknowledged"),
        }
    }
}

// ---------------------------------------------------------------------------
// Constraints
// ---------------------------------------------------------------------------

/// Highest max escalation level allowed for a base stake. Small stakes
/// have no ceiling.
pub fn max_level_ceiling(base_stake: u64) -> Option<u32> {
    match base_stake {
        s if s >= 200 => Some(10),
        s if s >= 100 => Some(11),
        s if s >= 50 => Some(12),
        s if s >= 10 => Some(14),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Field parsing
// ---------------------------------------------------------------------------

fn as_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .map(Decimal::from)
            .or_else(|| n.as_f64().and_then(Decimal::from_f64)),
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        _ => None,
    }
}

/// Non-negative whole number; fractional input is truncated.
fn as_count(value: &Value) -> Option<u64> {
    as_decimal(value)
        .filter(|d| !d.is_sign_negative())
        .and_then(|d| d.trunc().to_u64())
}

fn as_text(value: &Value) -> Option<&str> {
    match value {
        Value::String(s) => Some(s.as_str()),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileReport {
    pub changes: Vec<ChangeEvent>,
}

impl ReconcileReport {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Merges remote snapshots into a session. Remembers values it already
/// rejected so a stale bad value is not re-applied on every pass.
#[derive(Debug, Default)]
pub struct RemoteReconciler {
    rejected_pattern: Option<String>,
    rejected_strategy: Option<String>,
}

impl RemoteReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one snapshot. Settings first, then the command, then the
    /// cross-setting constraints.
    pub fn apply(
        &mut self,
        session: &mut SessionController,
        snapshot: &RemoteSnapshot,
        now: DateTime<Utc>,
    ) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let table_id = session.state().table_id.clone();

        self.apply_pattern(session, snapshot.pattern.as_ref(), &mut report);
        apply_base_stake(session, snapshot.base_stake.as_ref(), &mut report);
        apply_max_level(session, snapshot.max_level.as_ref(), &mut report);
        apply_target_profit(session, snapshot.target_profit_pct.as_ref(), &mut report);
        apply_target_duration(session, snapshot.target_duration_minutes.as_ref(), &mut report);
        self.apply_strategy(session, snapshot.strategy.as_ref(), &mut report);
        apply_command(session, snapshot.command(), now, &mut report);
        self.enforce_constraints(session, &mut report);

        for change in &report.changes {
            warn!(table = %table_id, change = %change, "Remote change applied");
        }
        report
    }

    fn apply_pattern(
        &mut self,
        session: &mut SessionController,
        value: Option<&Value>,
        report: &mut ReconcileReport,
    ) {
        let Some(value) = value else { return };
        let Some(raw) = as_text(value) else {
            debug!(value = %value, "Ignoring non-text pattern");
            return;
        };

        let requested = normalize(raw);
        if requested.is_empty() {
            // A cleared dashboard field means no change.
            debug!("Ignoring blank pattern");
            return;
        }
        let cursor = &mut session.state_mut().cursor;
        let current = cursor.pattern().as_text();
        if requested == current || self.rejected_pattern.as_deref() == Some(requested.as_str()) {
            return;
        }

        match Pattern::parse(&requested) {
            Ok(pattern) => {
                cursor.set_pattern(pattern);
                self.rejected_pattern = None;
                report.changes.push(ChangeEvent::Pattern {
                    from: current,
                    to: requested,
                });
            }
            Err(e) => {
                // An invalid pattern degrades to the default once, then stays
                // remembered so the cursor isn't rewound on every pass.
                let _ = cursor.set_text(&requested);
                let installed = cursor.pattern().as_text();
                self.rejected_pattern = Some(requested.clone());
                report.changes.push(ChangeEvent::PatternRejected {
                    requested,
                    reason: e.to_string(),
                });
                if installed != current {
                    report.changes.push(ChangeEvent::Pattern {
                        from: current,
                        to: installed,
                    });
                }
            }
        }
    }

    fn apply_strategy(
        &mut self,
        session: &mut SessionController,
        value: Option<&Value>,
        report: &mut ReconcileReport,
    ) {
        let Some(value) = value else { return };
        let Some(raw) = as_text(value) else {
            debug!(value = %value, "Ignoring non-text strategy");
            return;
        };
        let requested = raw.trim();
        if requested.eq_ignore_ascii_case(&session.state().strategy) {
            self.rejected_strategy = None;
            return;
        }

        let max_level = session.state().max_escalation_level;
        let lookup = session
            .registry()
            .get(requested)
            .map(|t| (t.name().to_string(), t.permits(max_level)));

        let reason = match lookup {
            None => Some("unknown strategy".to_string()),
            Some((_, false)) => Some(format!("not permitted with max level {max_level}")),
            Some((to, true)) => {
                let from = std::mem::replace(&mut session.state_mut().strategy, to.clone());
                self.rejected_strategy = None;
                report.changes.push(ChangeEvent::Strategy { from, to });
                None
            }
        };

        if let Some(reason) = reason {
            let repeated = self
                .rejected_strategy
                .as_deref()
                .is_some_and(|r| r.eq_ignore_ascii_case(requested));
            if repeated {
                debug!(strategy = requested, reason = %reason, "Strategy still rejected");
            } else {
                self.rejected_strategy = Some(requested.to_string());
                report.changes.push(ChangeEvent::StrategyRejected {
                    requested: requested.to_string(),
                    reason,
                });
            }
        }
    }

    fn enforce_constraints(
        &mut self,
        session: &mut SessionController,
        report: &mut ReconcileReport,
    ) {
        let state = session.state_mut();
        if let Some(ceiling) = max_level_ceiling(state.base_stake) {
            if state.max_escalation_level > ceiling {
                report.changes.push(ChangeEvent::MaxLevelClamped {
                    requested: state.max_escalation_level,
                    ceiling,
                    base_stake: state.base_stake,
                });
                state.max_escalation_level = ceiling;
            }
        }

        let max_level = session.state().max_escalation_level;
        let current = session.state().strategy.clone();
        let permitted = session
            .registry()
            .get(&current)
            .map_or(true, |t| t.permits(max_level));
        if !permitted {
            session.state_mut().strategy = DEFAULT_STRATEGY.to_string();
            self.rejected_strategy = Some(current.clone());
            report.changes.push(ChangeEvent::StrategyRejected {
                requested: current.clone(),
                reason: format!("not permitted with max level {max_level}"),
            });
            report.changes.push(ChangeEvent::Strategy {
                from: current,
                to: DEFAULT_STRATEGY.to_string(),
            });
        }
    }
}

fn apply_base_stake(
    session: &mut SessionController,
    value: Option<&Value>,
    report: &mut ReconcileReport,
) {
    let Some(value) = value else { return };
    let Some(stake) = as_count(value).filter(|s| *s > 0) else {
        debug!(value = %value, "Ignoring unparsable base stake");
        return;
    };
    let state = session.state_mut();
    if stake == state.base_stake {
        return;
    }
    report.changes.push(ChangeEvent::BaseStake {
        from: state.base_stake,
        to: stake,
    });
    state.base_stake = stake;
    state.reset_progression();
}

fn apply_max_level(
    session: &mut SessionController,
    value: Option<&Value>,
    report: &mut ReconcileReport,
) {
    let Some(value) = value else { return };
    let Some(level) = as_count(value).and_then(|l| u32::try_from(l).ok()) else {
        debug!(value = %value, "Ignoring unparsable max level");
        return;
    };
    let state = session.state_mut();
    // A value equal to the clamped ceiling would otherwise be re-reported.
    let effective = max_level_ceiling(state.base_stake).map_or(level, |c| level.min(c));
    if effective == state.max_escalation_level {
        return;
    }
    report.changes.push(ChangeEvent::MaxLevel {
        from: state.max_escalation_level,
        to: level,
    });
    state.max_escalation_level = level;
}

fn apply_target_profit(
    session: &mut SessionController,
    value: Option<&Value>,
    report: &mut ReconcileReport,
) {
    let Some(value) = value else { return };
    let Some(pct) = as_decimal(value).filter(|p| !p.is_sign_negative()) else {
        debug!(value = %value, "Ignoring unparsable profit target");
        return;
    };
    let state = session.state_mut();
    if pct == state.target_profit_pct {
        return;
    }
    report.changes.push(ChangeEvent::TargetProfit {
        from: state.target_profit_pct,
        to: pct,
    });
    state.target_profit_pct = pct;
    state.recompute_target();
}

fn apply_target_duration(
    session: &mut SessionController,
    value: Option<&Value>,
    report: &mut ReconcileReport,
) {
    let Some(value) = value else { return };
    let Some(minutes) = as_count(value) else {
        debug!(value = %value, "Ignoring unparsable duration");
        return;
    };
    let state = session.state_mut();
    let secs = minutes.saturating_mul(60);
    if secs == state.target_duration_secs {
        return;
    }
    report.changes.push(ChangeEvent::TargetDuration {
        from_minutes: state.target_duration_secs / 60,
        to_minutes: minutes,
    });
    state.target_duration_secs = secs;
}

fn apply_command(
    session: &mut SessionController,
    command: Command,
    now: DateTime<Utc>,
    report: &mut ReconcileReport,
) {
    match (command, session.status()) {
        (Command::Run, SessionStatus::Idle) => {
            if session.state().stop_reason.is_some() {
                session.start(now);
                report.changes.push(ChangeEvent::Started);
            } else {
                session.resume(now);
                report.changes.push(ChangeEvent::Resumed);
            }
        }
        (Command::Run, SessionStatus::Stopping) => {
            debug!(
                table = %session.state().table_id,
                "Run ignored until the safety stop is acknowledged"
            );
        }
        (Command::Stop, SessionStatus::Running) => {
            session.pause();
            report.changes.push(ChangeEvent::Paused);
        }
        (Command::Stop, SessionStatus::Stopping) => {
            session.acknowledge_stop();
            report.changes.push(ChangeEvent::StopAcknowledged);
        }
        (Command::Run, SessionStatus::Running) | (Command::Stop, SessionStatus::Idle) => {}
    }
}

impl fmt::Display for ReconcileReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.changes.is_empty() {
            return write!(f, "no changes");
        }
        let parts: Vec<String> = self.changes.iter().map(|c| c.to_string()).collect();
        write!(f, "{}", parts.join("; "))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
