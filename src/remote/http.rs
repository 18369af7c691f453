//! REST upsert channel.
//!
//! POSTs the heartbeat to `{base}/rest/v1/{table}?on_conflict=id` with
//! merge-duplicates resolution and asks for the stored row back. The
//! returned row carries the dashboard's settings for this table.
//!
//! Auth: `apikey` header plus `Authorization: Bearer {key}`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::RemoteChannel;
use crate::engine::reconciler::RemoteSnapshot;
use crate::types::{Heartbeat, SessionError};

const DEFAULT_TIMEOUT_SECS: u64 = 5;

pub struct HttpRemoteChannel {
    http: Client,
    endpoint: String,
    api_key: SecretString,
}

impl HttpRemoteChannel {
    pub fn new(
        base_url: &str,
        table: &str,
        api_key: SecretString,
        timeout_secs: Option<u64>,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)))
            .user_agent("STAKELINE/0.1.0")
            .build()
            .context("Failed to build HTTP client for remote channel")?;

        Ok(Self {
            http,
            endpoint: endpoint_url(base_url, table),
            api_key,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Upsert endpoint for a table.
pub fn endpoint_url(base_url: &str, table: &str) -> String {
    format!(
        "{}/rest/v1/{}?on_conflict=id",
        base_url.trim_end_matches('/'),
        urlencoding::encode(table)
    )
}

/// Pick the stored row out of a representation response. The service
/// answers with an array; a bare object is accepted too.
pub fn parse_rows(body: &str) -> Result<Option<RemoteSnapshot>> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| SessionError::Remote(format!("response is not JSON: {e}")))?;
    let row = match value {
        Value::Array(mut rows) => {
            if rows.is_empty() {
                return Ok(None);
            }
            rows.swap_remove(0)
        }
        obj @ Value::Object(_) => obj,
        Value::Null => return Ok(None),
        other => {
            return Err(SessionError::Remote(format!("unexpected response shape: {other}")).into());
        }
    };
    Ok(Some(RemoteSnapshot::from_value(row)))
}

#[async_trait]
impl RemoteChannel for HttpRemoteChannel {
    async fn exchange(&self, heartbeat: &Heartbeat) -> Result<Option<RemoteSnapshot>> {
        let key = self.api_key.expose_secret();
        debug!(id = %heartbeat.id, status = %heartbeat.status, "Remote exchange");

        let resp = self
            .http
            .post(&self.endpoint)
            .header("apikey", key.as_str())
            .bearer_auth(key)
            .header("Prefer", "resolution=merge-duplicates,return=representation")
            .json(heartbeat)
            .send()
            .await
            .context("Remote channel request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(SessionError::Remote(format!("HTTP {status}: {body}")).into());
        }

        let body = resp
            .text()
            .await
            .context("Failed to read remote channel response")?;
        parse_rows(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_endpoint_url() {
        assert_eq!(
            endpoint_url("https://x.example.co/", "bot monitoring"),
            "https://x.example.co/rest/v1/bot%20monitoring?on_conflict=id"
        );
    }

    #[test]
    fn test_parse_rows_array() {
        let snap = parse_rows(r#"[{"id":"t1","pattern":"BBP","command":"stop"}]"#)
            .unwrap()
            .unwrap();
        assert_eq!(snap.pattern, Some(json!("BBP")));
        assert_eq!(snap.command, Some(json!("stop")));
    }

    #[test]
    fn test_parse_rows_empty_and_null() {
        assert!(parse_rows("[]").unwrap().is_none());
        assert!(parse_rows("null").unwrap().is_none());
    }

    #[test]
    fn test_parse_rows_object() {
        let snap = parse_rows(r#"{"level": 50}"#).unwrap().unwrap();
        assert_eq!(snap.base_stake, Some(json!(50)));
    }

    #[test]
    fn test_parse_rows_rejects_garbage() {
        assert!(parse_rows("<html>").is_err());
        assert!(parse_rows("42").is_err());
    }

    #[test]
    fn test_heartbeat_wire_shape() {
        let hb = Heartbeat {
            id: "t1".into(),
            status: "Running".into(),
            balance: rust_decimal_macros::dec!(1000),
            escalation_level: 2,
            elapsed_minutes: 7,
        };
        let v = serde_json::to_value(&hb).unwrap();
        assert_eq!(v["id"], "t1");
        assert_eq!(v["escalation_level"], 2);
        assert_eq!(v["elapsed_minutes"], 7);
    }

    #[test]
    fn test_new_builds_endpoint() {
        let ch = HttpRemoteChannel::new(
            "https://x.example.co",
            "bot_monitoring",
            SecretString::new("k".to_string()),
            None,
        )
        .unwrap();
        assert!(ch.endpoint().ends_with("/rest/v1/bot_monitoring?on_conflict=id"));
    }
}
