//! Remote control over a live table: settings pushed mid-session, stop and
//! run commands, and channel failures.

use chrono::Utc;
use rust_decimal_macros::dec;
use serde_json::json;
use std::sync::Arc;

use stakeline::engine::reconciler::ChangeEvent;
use stakeline::engine::runner::RemoteSync;
use stakeline::types::*;

use crate::mock_table::{runner_for, seed, MemorySink, MockRemote, MockTable};

#[tokio::test]
async fn test_remote_stop_keeps_progression() {
    let table = Arc::new(MockTable::from_letters("TBB", dec!(1000)));
    let sink = Arc::new(MemorySink::default());
    let mut runner = runner_for(&seed("P", "Standard", 8), &table, &sink);
    let remote = Arc::new(MockRemote::default());
    let mut sync = RemoteSync::new("mock-1", runner.session(), remote.clone());
    let now = Utc::now();

    // baseline, clear, loss
    for _ in 0..3 {
        runner.poll_once(now).await;
    }
    assert_eq!(table.stakes(), vec![10, 20]);

    remote.set_row(json!({"id": "mock-1", "command": "STOP"}));
    let report = sync.sync_once(now).await.unwrap();
    assert_eq!(report.changes, vec![ChangeEvent::Paused]);

    // Idle: the next loss on the table is ignored.
    runner.poll_once(now).await;
    runner.poll_once(now).await;
    assert_eq!(table.stakes(), vec![10, 20]);

    let session = runner.session();
    let s = session.lock().await;
    assert_eq!(s.status(), SessionStatus::Idle);
    assert_eq!(s.state().current_stake, 20);
    assert_eq!(s.state().escalation_level, 1);

    let heartbeats = remote.heartbeats();
    assert_eq!(heartbeats[0].status, "Running");
    assert_eq!(heartbeats[0].escalation_level, 1);
}

#[tokio::test]
async fn test_remote_settings_merge_mid_session() {
    let table = Arc::new(MockTable::from_letters("TPB", dec!(1000)));
    let sink = Arc::new(MemorySink::default());
    let mut runner = runner_for(&seed("B", "Standard", 8), &table, &sink);
    let remote = Arc::new(MockRemote::default());
    let mut sync = RemoteSync::new("mock-1", runner.session(), remote.clone());
    let now = Utc::now();

    runner.poll_once(now).await; // baseline, wager B 10

    remote.set_row(json!({
        "pattern": "P-P-B",
        "level": "200",
        "max_level": 15,
        "strategy": "Sweeper",
        "command": true,
    }));
    let report = sync.sync_once(now).await.unwrap();
    assert!(report.changes.contains(&ChangeEvent::MaxLevelClamped {
        requested: 15,
        ceiling: 10,
        base_stake: 200,
    }));

    {
        let session = runner.session();
        let s = session.lock().await;
        assert_eq!(s.state().cursor.pattern().as_text(), "PPB");
        assert_eq!(s.state().cursor.position(), 0);
        assert_eq!(s.state().base_stake, 200);
        assert_eq!(s.state().current_stake, 200);
        assert_eq!(s.state().max_escalation_level, 10);
        assert_eq!(s.state().strategy, "Sweeper");
    }

    // The next round is scored against the new pattern: P wins on P.
    runner.poll_once(now).await;
    let out = runner.poll_once(now).await;
    assert_eq!(out.result, Some(RoundResult::Win));
    assert_eq!(out.wager.unwrap().amount, 200);

    // Same row again: nothing to do.
    assert!(sync.sync_once(now).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_fail_open_command_keeps_running() {
    let table = Arc::new(MockTable::from_letters("", dec!(1000)));
    let sink = Arc::new(MemorySink::default());
    let runner = runner_for(&seed("B", "Standard", 8), &table, &sink);
    let remote = Arc::new(MockRemote::default());
    let mut sync = RemoteSync::new("mock-1", runner.session(), remote.clone());

    remote.set_row(json!({"command": "maybe later"}));
    assert!(sync.sync_once(Utc::now()).await.unwrap().is_empty());
    assert_eq!(runner.session().lock().await.status(), SessionStatus::Running);
}

#[tokio::test]
async fn test_channel_failure_keeps_local_configuration() {
    let table = Arc::new(MockTable::from_letters("TP", dec!(1000)));
    let sink = Arc::new(MemorySink::default());
    let mut runner = runner_for(&seed("BP", "Standard", 8), &table, &sink);
    let remote = Arc::new(MockRemote::default());
    let mut sync = RemoteSync::new("mock-1", runner.session(), remote.clone());
    let now = Utc::now();

    remote.set_error("503 Service Unavailable");
    assert!(sync.sync_once(now).await.is_err());

    runner.poll_once(now).await;
    runner.poll_once(now).await;
    let out = runner.poll_once(now).await;
    assert_eq!(out.result, Some(RoundResult::Loss));
    assert_eq!(runner.session().lock().await.state().cursor.pattern().as_text(), "BP");
}

#[tokio::test]
async fn test_restart_after_safety_stop_needs_acknowledgement() {
    let table = Arc::new(MockTable::from_letters("TBBP", dec!(1000)));
    let sink = Arc::new(MemorySink::default());
    let mut runner = runner_for(&seed("P", "Standard", 1), &table, &sink);
    let remote = Arc::new(MockRemote::default());
    let mut sync = RemoteSync::new("mock-1", runner.session(), remote.clone());
    let now = Utc::now();

    // baseline, clear, loss (level 1), clear, loss (level 2 > 1)
    for _ in 0..5 {
        runner.poll_once(now).await;
    }
    assert_eq!(runner.session().lock().await.status(), SessionStatus::Stopping);

    // The dashboard still says run: the stop holds.
    remote.set_row(json!({"command": "run"}));
    assert!(sync.sync_once(now).await.unwrap().is_empty());
    assert_eq!(runner.session().lock().await.status(), SessionStatus::Stopping);

    remote.set_row(json!({"command": "stop"}));
    let report = sync.sync_once(now).await.unwrap();
    assert_eq!(report.changes, vec![ChangeEvent::StopAcknowledged]);

    remote.set_row(json!({"command": "run"}));
    let report = sync.sync_once(now).await.unwrap();
    assert_eq!(report.changes, vec![ChangeEvent::Started]);

    // A fresh session: the next round is a baseline again.
    runner.poll_once(now).await; // clear
    let out = runner.poll_once(now).await;
    assert_eq!(out.result, Some(RoundResult::Baseline));
    assert_eq!(out.wager.unwrap().amount, 10);
}
