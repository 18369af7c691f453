//! Dry-run actuator.
//!
//! Logs what would be clicked for each wager and keeps the wagers in
//! memory. Used for headless replays and for validating a configuration
//! before pointing it at a live table.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Mutex;
use tracing::info;

use super::chips::ChipRack;
use super::Actuator;
use crate::types::{SessionError, WagerRequest};

pub struct DryRunActuator {
    rack: ChipRack,
    placed: Mutex<Vec<WagerRequest>>,
}

impl DryRunActuator {
    pub fn new(rack: ChipRack) -> Self {
        Self {
            rack,
            placed: Mutex::new(Vec::new()),
        }
    }

    /// Every wager accepted so far.
    pub fn placed(&self) -> Vec<WagerRequest> {
        self.placed.lock().map(|p| p.clone()).unwrap_or_default()
    }

    /// Sum of all stakes accepted so far.
    pub fn total_staked(&self) -> u64 {
        self.placed().iter().map(|w| w.amount).sum()
    }
}

#[async_trait]
impl Actuator for DryRunActuator {
    async fn place_wager(&self, wager: &WagerRequest) -> Result<()> {
        let plan = self.rack.decompose(wager.amount);
        info!(
            table = %wager.table_id,
            side = %wager.side,
            amount = wager.amount,
            chips = %plan,
            clicks = plan.clicks(),
            "[DRY RUN] Would place wager"
        );
        match self.placed.lock() {
            Ok(mut placed) => placed.push(wager.clone()),
            Err(_) => {
                return Err(SessionError::Actuator {
                    table: wager.table_id.clone(),
                    message: "dry-run ledger poisoned".into(),
                }
                .into());
            }
        }
        Ok(())
    }
}
