//! Persistence layer.
//!
//! Appends round records to a JSON-lines file, one object per line. The
//! engine never reads the log back; `load_rounds` exists for reporting and
//! tests.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::adapters::TelemetrySink;
use crate::types::RoundRecord;

/// Default round log path.
pub const DEFAULT_ROUND_LOG: &str = "stakeline_rounds.jsonl";

/// Append-only JSON-lines round log.
pub struct RoundLog {
    path: PathBuf,
    // Serialises appends from several tables sharing one file.
    write_lock: Mutex<()>,
}

impl RoundLog {
    pub fn new(path: Option<&str>) -> Self {
        let path = PathBuf::from(path.unwrap_or(DEFAULT_ROUND_LOG));
        info!(path = %path.display(), "Round log ready");
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record.
    pub async fn append(&self, record: &RoundRecord) -> Result<()> {
        let mut line = serde_json::to_string(record).context("Failed to serialise round record")?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("Failed to open round log {}", self.path.display()))?;
        file.write_all(line.as_bytes())
            .await
            .with_context(|| format!("Failed to append to round log {}", self.path.display()))?;

        debug!(
            table = %record.table_id,
            round = record.round,
            result = %record.result,
            "Round logged"
        );
        Ok(())
    }
}

#[async_trait]
impl TelemetrySink for RoundLog {
    async fn record_round(&self, record: &RoundRecord) -> Result<()> {
        self.append(record).await
    }
}

/// Read every record from a round log. Returns an empty list when the file
/// doesn't exist.
pub fn load_rounds(path: &str) -> Result<Vec<RoundRecord>> {
    if !Path::new(path).exists() {
        return Ok(Vec::new());
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read round log {path}"))?;

    text.lines()
        .filter(|l| !l.trim().is_empty())
        .enumerate()
        .map(|(n, l)| {
            serde_json::from_str(l)
                .with_context(|| format!("Failed to parse round log {path}, record {}", n + 1))
        })
        .collect()
}

/// Delete a round log (for testing or reset).
pub fn delete_log(path: &str) -> Result<()> {
    if Path::new(path).exists() {
        std::fs::remove_file(path).with_context(|| format!("Failed to delete round log {path}"))?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RoundResult, Side};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn temp_path() -> String {
        let mut p = std::env::temp_dir();
        p.push(format!("stakeline_test_rounds_{}.jsonl", uuid::Uuid::new_v4()));
        p.to_string_lossy().to_string()
    }

    fn record(round: u64, result: RoundResult) -> RoundRecord {
        RoundRecord {
            table_id: "t1".into(),
            round,
            side: Side::Banker,
            result,
            balance_before: Some(dec!(1000)),
            balance_after: Some(dec!(990)),
            escalation_level_at_bet: 0,
            stake_at_bet: 10,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_append_and_load() {
        let path = temp_path();
        let log = RoundLog::new(Some(&path));
        log.record_round(&record(2, RoundResult::Loss)).await.unwrap();
        log.record_round(&record(3, RoundResult::Win)).await.unwrap();

        let rounds = load_rounds(&path).unwrap();
        assert_eq!(rounds.len(), 2);
        assert_eq!(rounds[0].round, 2);
        assert_eq!(rounds[1].result, RoundResult::Win);
        assert_eq!(rounds[0].balance_after, Some(dec!(990)));

        delete_log(&path).unwrap();
    }

    #[test]
    fn test_load_nonexistent() {
        let rounds = load_rounds("/tmp/stakeline_nonexistent_rounds_12345.jsonl").unwrap();
        assert!(rounds.is_empty());
    }

    #[test]
    fn test_load_corrupt_line() {
        let path = temp_path();
        std::fs::write(&path, "{not json}\n").unwrap();
        assert!(load_rounds(&path).is_err());
        delete_log(&path).unwrap();
    }

    #[test]
    fn test_delete_nonexistent_ok() {
        assert!(delete_log("/tmp/stakeline_does_not_exist_xyz.jsonl").is_ok());
    }
}
