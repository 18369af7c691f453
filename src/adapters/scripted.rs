//! Scripted perception feed.
//!
//! Replays a shoe of outcomes from a text file, one round per line:
//!
//! ```text
//! # outcome [balance]
//! banker 1000
//! player 990
//! tie
//! ```
//!
//! Each round is shown once and then cleared (an `Unknown` reading), the
//! way a result banner appears and disappears on a live table. Blank lines
//! and `#` comments are skipped.

use anyhow::{Context, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::VecDeque;
use std::path::Path;
use std::str::FromStr;
use std::sync::Mutex;
use tracing::{debug, info};

use super::Perception;
use crate::types::DetectedOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptStep {
    pub outcome: DetectedOutcome,
    pub balance: Option<Decimal>,
}

#[derive(Debug)]
struct Feed {
    steps: VecDeque<ScriptStep>,
    showing: bool,
    balance: Option<Decimal>,
}

#[derive(Debug)]
pub struct ScriptedPerception {
    feed: Mutex<Feed>,
}

impl ScriptedPerception {
    pub fn new(steps: Vec<ScriptStep>, opening_balance: Option<Decimal>) -> Self {
        Self {
            feed: Mutex::new(Feed {
                steps: steps.into(),
                showing: false,
                balance: opening_balance,
            }),
        }
    }

    /// Load a script file.
    pub fn load(path: impl AsRef<Path>, opening_balance: Option<Decimal>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read outcome script: {}", path.display()))?;
        let steps = parse_script(&text)
            .with_context(|| format!("Failed to parse outcome script: {}", path.display()))?;
        info!(path = %path.display(), rounds = steps.len(), "Outcome script loaded");
        Ok(Self::new(steps, opening_balance))
    }
}

/// Parse script text into steps.
pub fn parse_script(text: &str) -> Result<Vec<ScriptStep>> {
    let mut steps = Vec::new();
    for (n, line) in text.lines().enumerate() {
        let line = line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let mut fields = line.split_whitespace();
        let label = fields.next().unwrap_or("");
        let outcome = DetectedOutcome::from_str(label).with_context(|| format!("line {}", n + 1))?;
        let balance = fields
            .next()
            .map(Decimal::from_str)
            .transpose()
            .with_context(|| format!("line {}: bad balance", n + 1))?;
        steps.push(ScriptStep { outcome, balance });
    }
    Ok(steps)
}

#[async_trait]
impl Perception for ScriptedPerception {
    async fn classify_outcome(&self) -> Result<DetectedOutcome> {
        let mut feed = self
            .feed
            .lock()
            .map_err(|_| anyhow::anyhow!("scripted feed poisoned"))?;

        if feed.showing {
            feed.showing = false;
            return Ok(DetectedOutcome::Unknown);
        }
        match feed.steps.pop_front() {
            Some(step) => {
                if step.balance.is_some() {
                    feed.balance = step.balance;
                }
                feed.showing = true;
                debug!(outcome = %step.outcome, left = feed.steps.len(), "Scripted round shown");
                Ok(step.outcome)
            }
            None => Ok(DetectedOutcome::Unknown),
        }
    }

    async fn read_balance(&self) -> Result<Option<Decimal>> {
        let feed = self
            .feed
            .lock()
            .map_err(|_| anyhow::anyhow!("scripted feed poisoned"))?;
        Ok(feed.balance)
    }

    fn is_exhausted(&self) -> bool {
        self.feed
            .lock()
            .map(|f| f.steps.is_empty() && !f.showing)
            .unwrap_or(true)
    }
}
