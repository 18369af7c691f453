//! Session controller: the per-tick state machine.
//!
//! One `tick` per perception reading. A tick checks the safety gates,
//! scores any resolved round, moves the pattern cursor and stake, and
//! returns what the outer loop should do next (place a wager, record a
//! round, report a stop). The controller never performs I/O itself.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::session::{SessionSeed, SessionState};
use crate::strategy::resolver;
use crate::strategy::table::{next_stake_after_loss, StakeRule, StrategyRegistry};
use crate::types::{
    Heartbeat, Observation, RoundRecord, RoundResult, SessionStatus, StopReason, TickOutcome,
    WagerRequest,
};

pub struct SessionController {
    state: SessionState,
    registry: StrategyRegistry,
}

impl SessionController {
    /// New idle controller.
    pub fn new(seed: &SessionSeed, registry: StrategyRegistry, now: DateTime<Utc>) -> Self {
        Self {
            state: SessionState::from_seed(seed, now),
            registry,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut SessionState {
        &mut self.state
    }

    pub fn registry(&self) -> &StrategyRegistry {
        &self.registry
    }

    pub fn status(&self) -> SessionStatus {
        self.state.status
    }

    pub fn heartbeat(&self, now: DateTime<Utc>) -> Heartbeat {
        self.state.heartbeat(now)
    }

    // -- Lifecycle ----------------------------------------------------------

    /// Begin a fresh session: progress is discarded, configuration kept.
    pub fn start(&mut self, now: DateTime<Utc>) {
        self.state.reinitialize(now);
        self.state.status = SessionStatus::Running;
        info!(
            table = %self.state.table_id,
            session = %self.state.session_id,
            pattern = %self.state.cursor.pattern(),
            base_stake = self.state.base_stake,
            strategy = %self.state.strategy,
            "Session started"
        );
    }

    /// Idle -> Running without discarding escalation state. The session
    /// clock restarts.
    pub fn resume(&mut self, now: DateTime<Utc>) {
        if self.state.status != SessionStatus::Idle {
            return;
        }
        self.state.status = SessionStatus::Running;
        self.state.started_at = now;
        info!(
            table = %self.state.table_id,
            stake = self.state.current_stake,
            level = self.state.escalation_level,
            "Session resumed"
        );
    }

    /// Running -> Idle, keeping stake, level and cursor.
    pub fn pause(&mut self) {
        if self.state.status != SessionStatus::Running {
            return;
        }
        self.state.status = SessionStatus::Idle;
        info!(
            table = %self.state.table_id,
            stake = self.state.current_stake,
            level = self.state.escalation_level,
            "Session paused"
        );
    }

    /// Stopping -> Idle. The stop reason is kept so the next run starts a
    /// fresh session.
    pub fn acknowledge_stop(&mut self) {
        if self.state.status != SessionStatus::Stopping {
            return;
        }
        self.state.status = SessionStatus::Idle;
        info!(table = %self.state.table_id, "Safety stop acknowledged");
    }

    fn halt(&mut self, reason: StopReason) -> StopReason {
        warn!(table = %self.state.table_id, reason = %reason, "Session stopped");
        self.state.status = SessionStatus::Stopping;
        self.state.stop_reason = Some(reason.clone());
        reason
    }

    // -- Tick ---------------------------------------------------------------

    /// Process one perception reading.
    pub fn tick(&mut self, obs: Observation, now: DateTime<Utc>) -> TickOutcome {
        let mut out = TickOutcome::default();
        if !self.state.is_running() {
            return out;
        }

        // Duration gate
        let elapsed_secs = self.state.elapsed_secs(now);
        if self.state.target_duration_secs > 0 && elapsed_secs >= self.state.target_duration_secs {
            out.stopped = Some(self.halt(StopReason::DurationReached { elapsed_secs }));
            return out;
        }

        // Profit gate
        if let Some(balance) = obs.balance {
            self.state.observe_balance(balance);
            if let Some(target) = self.state.target_balance {
                if balance >= target {
                    let reason = StopReason::ProfitTargetReached { balance, target };
                    out.stopped = Some(self.halt(reason));
                    return out;
                }
            }
        }

        let targeted = self.state.cursor.current_side();
        let Some(scored) = resolver::resolve(obs.outcome, targeted) else {
            debug!(table = %self.state.table_id, "No outcome yet");
            return out;
        };

        let stake_at_bet = self.state.current_stake;
        let level_at_bet = self.state.escalation_level;
        let balance_before = self.state.balance_at_bet;

        let result = if self.state.last_result.is_none() {
            RoundResult::Baseline
        } else {
            scored
        };
        self.state.rounds_resolved += 1;
        out.result = Some(result);

        match result {
            RoundResult::Baseline => {
                self.state.reset_progression();
                info!(
                    table = %self.state.table_id,
                    observed = %obs.outcome,
                    "Baseline round observed"
                );
            }
            RoundResult::Win => {
                self.state.reset_progression();
                self.state.cursor.advance();
                info!(
                    table = %self.state.table_id,
                    side = %targeted,
                    stake = stake_at_bet,
                    "Round won"
                );
            }
            RoundResult::Push => {
                info!(
                    table = %self.state.table_id,
                    side = %targeted,
                    stake = stake_at_bet,
                    "Push, retrying same side"
                );
            }
            RoundResult::Loss => {
                let table = self.registry.resolve(&self.state.strategy);
                let (next, rule) = next_stake_after_loss(
                    stake_at_bet,
                    level_at_bet,
                    targeted,
                    self.state.cursor.pattern(),
                    table,
                );
                if rule == StakeRule::BankerStreakOverride {
                    debug!(
                        table = %self.state.table_id,
                        from = stake_at_bet,
                        to = next,
                        "Banker streak override applied"
                    );
                }
                self.state.current_stake = next;
                self.state.cursor.advance();
                self.state.escalation_level += 1;
                info!(
                    table = %self.state.table_id,
                    side = %targeted,
                    stake = stake_at_bet,
                    next_stake = next,
                    level = self.state.escalation_level,
                    "Round lost"
                );
            }
        }
        self.state.last_result = Some(result);

        if matches!(result, RoundResult::Win | RoundResult::Loss) {
            out.record = Some(RoundRecord {
                table_id: self.state.table_id.clone(),
                round: self.state.rounds_resolved,
                side: targeted,
                result,
                balance_before,
                balance_after: obs.balance,
                escalation_level_at_bet: level_at_bet,
                stake_at_bet,
                timestamp: now,
            });
        }

        // Only a loss can trip the level limit; a push retries even if the
        // limit was lowered remotely below the current level.
        if result == RoundResult::Loss
            && self.state.escalation_level > self.state.max_escalation_level
        {
            out.stopped = Some(self.halt(StopReason::MaxLevelReached {
                level: self.state.escalation_level,
                max: self.state.max_escalation_level,
            }));
            return out;
        }

        out.wager = Some(self.issue_wager(obs));
        out
    }

    fn issue_wager(&mut self, obs: Observation) -> WagerRequest {
        self.state.balance_at_bet = obs.balance.or(self.state.last_balance);
        let wager = WagerRequest {
            table_id: self.state.table_id.clone(),
            side: self.state.cursor.current_side(),
            amount: self.state.current_stake,
            escalation_level: self.state.escalation_level,
            pattern_index: self.state.cursor.position(),
            pattern_len: self.state.cursor.len(),
        };
        info!(
            table = %wager.table_id,
            side = %wager.side,
            amount = wager.amount,
            level = wager.escalation_level,
            "Wager issued"
        );
        wager
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
