//! Remote control channel.
//!
//! Each exchange sends a heartbeat and receives the table's stored row,
//! which is interpreted as a `RemoteSnapshot`.

pub mod http;

use anyhow::Result;
use async_trait::async_trait;

use crate::engine::reconciler::RemoteSnapshot;
use crate::types::Heartbeat;

/// One round trip with the control plane.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteChannel: Send + Sync {
    /// Publish `heartbeat`; returns the current remote intent, or `None`
    /// when the remote has no row for this table.
    async fn exchange(&self, heartbeat: &Heartbeat) -> Result<Option<RemoteSnapshot>>;
}

pub use http::HttpRemoteChannel;
