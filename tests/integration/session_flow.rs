//! End-to-end session runs against the mock table.

use rust_decimal_macros::dec;
use std::sync::Arc;
use tokio::sync::watch;

use stakeline::adapters::chips::ChipRack;
use stakeline::adapters::dry_run::DryRunActuator;
use stakeline::adapters::scripted::ScriptedPerception;
use stakeline::engine::{RunSummary, SessionSeed, TableRunner};
use stakeline::storage::{self, RoundLog};
use stakeline::types::*;

use crate::mock_table::{fast_timing, runner_for, seed, started, MemorySink, MockTable};

async fn play(seed: &SessionSeed, shoe: &str) -> (Arc<MockTable>, Arc<MemorySink>, RunSummary) {
    let table = Arc::new(MockTable::from_letters(shoe, dec!(1000)));
    let sink = Arc::new(MemorySink::default());
    let runner = runner_for(seed, &table, &sink);
    let (_tx, rx) = watch::channel(false);
    let summary = runner.run(rx).await;
    (table, sink, summary)
}

#[tokio::test]
async fn test_banker_streak_override_sequence() {
    let (table, sink, summary) = play(&seed("BBBP", "Standard", 8), "TPPPP").await;

    assert_eq!(table.stakes(), vec![10, 30, 70, 150, 10]);

    let records = sink.records();
    let results: Vec<_> = records.iter().map(|r| r.result).collect();
    assert_eq!(
        results,
        vec![RoundResult::Loss, RoundResult::Loss, RoundResult::Loss, RoundResult::Win]
    );
    let levels: Vec<_> = records.iter().map(|r| r.escalation_level_at_bet).collect();
    assert_eq!(levels, vec![0, 1, 2, 3]);
    assert_eq!(summary.escalation_level, 0);
    assert_eq!(summary.status, SessionStatus::Running);
}

#[tokio::test]
async fn test_sweeper_five_losses() {
    let (table, _sink, _summary) = play(&seed("PPPB", "Sweeper", 10), "TBBBPB").await;
    assert_eq!(table.stakes(), vec![10, 30, 90, 270, 540, 1080]);
}

#[tokio::test]
async fn test_max_level_halts_exactly_once() {
    let (table, sink, summary) = play(&seed("P", "Standard", 3), "TBBBBBB").await;

    assert_eq!(table.stakes(), vec![10, 20, 40, 80]);
    assert_eq!(summary.status, SessionStatus::Stopping);
    assert_eq!(summary.stop_reason, Some(StopReason::MaxLevelReached { level: 4, max: 3 }));

    let records = sink.records();
    assert_eq!(records.len(), 4);
    assert!(records.iter().all(|r| r.escalation_level_at_bet <= 3));
    assert_eq!(records.last().unwrap().result, RoundResult::Loss);
}

#[tokio::test]
async fn test_push_retries_same_side() {
    let (table, sink, _summary) = play(&seed("BP", "Standard", 8), "TTP").await;

    let wagers = table.wagers();
    let sides: Vec<_> = wagers.iter().map(|w| w.side).collect();
    assert_eq!(sides, vec![Side::Banker, Side::Banker, Side::Player]);
    assert_eq!(table.stakes(), vec![10, 10, 20]);
    // the push itself is never recorded
    assert_eq!(sink.records().len(), 1);
}

#[tokio::test]
async fn test_profit_target_stops_session() {
    let seed = SessionSeed {
        target_profit_pct: dec!(2),
        ..seed("P", "Standard", 8)
    };
    let (table, sink, summary) = play(&seed, "TPPPP").await;

    assert_eq!(table.balance(), dec!(1020));
    assert_eq!(
        summary.stop_reason,
        Some(StopReason::ProfitTargetReached {
            balance: dec!(1020),
            target: dec!(1020),
        })
    );
    // The round that reached the target was never scored.
    assert_eq!(sink.records().len(), 1);
    assert_eq!(table.wagers().len(), 2);
}

#[tokio::test]
async fn test_records_carry_balances() {
    let (_table, sink, _summary) = play(&seed("P", "Standard", 8), "TPB").await;
    let records = sink.records();
    assert_eq!(records.len(), 2);

    assert_eq!(records[0].result, RoundResult::Win);
    assert_eq!(records[0].balance_before, Some(dec!(1000)));
    assert_eq!(records[0].balance_after, Some(dec!(1010)));

    assert_eq!(records[1].result, RoundResult::Loss);
    assert_eq!(records[1].balance_before, Some(dec!(1010)));
    assert_eq!(records[1].balance_after, Some(dec!(1000)));
}

#[tokio::test]
async fn test_perception_outage_is_a_gap() {
    let table = Arc::new(MockTable::from_letters("TP", dec!(1000)));
    let sink = Arc::new(MemorySink::default());
    let mut runner = runner_for(&seed("P", "Standard", 8), &table, &sink);
    let now = chrono::Utc::now();

    table.set_error("capture device lost");
    for _ in 0..3 {
        assert!(runner.poll_once(now).await.is_noop());
    }
    table.clear_error();

    let baseline = runner.poll_once(now).await;
    assert_eq!(baseline.result, Some(RoundResult::Baseline));
    runner.poll_once(now).await;
    let win = runner.poll_once(now).await;
    assert_eq!(win.result, Some(RoundResult::Win));
}

#[tokio::test]
async fn test_scripted_dry_run_writes_round_log() {
    let dir = std::env::temp_dir();
    let script = dir.join(format!("stakeline_it_script_{}.txt", uuid::Uuid::new_v4()));
    let log = dir.join(format!("stakeline_it_rounds_{}.jsonl", uuid::Uuid::new_v4()));
    std::fs::write(&script, "tie 1000\nplayer 990\nbanker 1009.5\n").unwrap();
    let log_path = log.to_string_lossy().to_string();

    let perception = ScriptedPerception::load(&script, Some(dec!(1000))).unwrap();
    let actuator = Arc::new(DryRunActuator::new(ChipRack::default()));
    let runner = TableRunner::new(
        started(&seed("B", "Standard", 8)),
        Arc::new(perception),
        actuator.clone(),
        Arc::new(RoundLog::new(Some(&log_path))),
        fast_timing(),
    );
    let (_tx, rx) = watch::channel(false);
    let summary = runner.run(rx).await;

    assert_eq!(summary.rounds_resolved, 3);
    let stakes: Vec<_> = actuator.placed().iter().map(|w| w.amount).collect();
    assert_eq!(stakes, vec![10, 20, 10]);

    let rounds = storage::load_rounds(&log_path).unwrap();
    assert_eq!(rounds.len(), 2);
    assert_eq!(rounds[0].result, RoundResult::Loss);
    assert_eq!(rounds[1].result, RoundResult::Win);
    assert_eq!(rounds[1].stake_at_bet, 20);

    storage::delete_log(&log_path).unwrap();
    let _ = std::fs::remove_file(&script);
}
