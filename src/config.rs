//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (the remote channel key) are referenced by env-var name in the
//! config and resolved at runtime.

use anyhow::{Context, Result};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use tracing::warn;

use crate::engine::session::SessionSeed;
use crate::strategy::table::{StrategyRegistry, StrategyTable, DEFAULT_STRATEGY};
use crate::types::SessionError;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub agent: AgentConfig,
    #[serde(default)]
    pub runner: RunnerConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    /// Extra multiplier tables, added to (or replacing) the built-in ones.
    #[serde(default)]
    pub strategies: Vec<StrategyConfig>,
    #[serde(default)]
    pub tables: Vec<TableConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    pub name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RunnerConfig {
    /// Perception poll period.
    pub poll_interval_ms: u64,
    /// Wait between issuing a wager and handing it to the actuator, so the
    /// betting window has time to open.
    pub bet_delay_ms: u64,
    /// Remote reconciliation period.
    pub sync_interval_secs: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            bet_delay_ms: 1000,
            sync_interval_secs: 5,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RemoteConfig {
    pub enabled: bool,
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_remote_table")]
    pub table: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_remote_table() -> String {
    "bot_monitoring".to_string()
}

fn default_api_key_env() -> String {
    "STAKELINE_REMOTE_KEY".to_string()
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: String::new(),
            table: default_remote_table(),
            api_key_env: default_api_key_env(),
            timeout_secs: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct TelemetryConfig {
    /// JSON-lines round log; `None` uses the default path.
    #[serde(default)]
    pub round_log: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StrategyConfig {
    pub name: String,
    pub multipliers: Vec<f64>,
    #[serde(default)]
    pub max_level_below: Option<u32>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TableConfig {
    pub id: String,
    #[serde(default = "default_pattern")]
    pub pattern: String,
    #[serde(default = "default_base_stake")]
    pub base_stake: u64,
    #[serde(default = "default_strategy")]
    pub strategy: String,
    #[serde(default = "default_max_level")]
    pub max_level: u32,
    #[serde(default)]
    pub target_profit_pct: f64,
    #[serde(default)]
    pub target_duration_minutes: u64,
    /// Start betting immediately instead of waiting for a remote run.
    #[serde(default = "default_true")]
    pub autostart: bool,
    /// Outcome script replayed by the scripted perception feed.
    #[serde(default)]
    pub script: Option<String>,
    #[serde(default)]
    pub opening_balance: Option<f64>,
    /// Chip denominations on this table.
    #[serde(default)]
    pub chips: Vec<u64>,
}

fn default_pattern() -> String {
    "B".to_string()
}

fn default_base_stake() -> u64 {
    10
}

fn default_strategy() -> String {
    DEFAULT_STRATEGY.to_string()
}

fn default_max_level() -> u32 {
    10
}

fn default_true() -> bool {
    true
}

impl TableConfig {
    /// Session seed for this table. A bad profit target degrades to 0.
    pub fn seed(&self) -> SessionSeed {
        let target_profit_pct = Decimal::from_f64(self.target_profit_pct)
            .filter(|p| !p.is_sign_negative())
            .unwrap_or_else(|| {
                warn!(
                    table = %self.id,
                    value = self.target_profit_pct,
                    "Invalid profit target, disabled"
                );
                Decimal::ZERO
            });
        SessionSeed {
            table_id: self.id.clone(),
            pattern: self.pattern.clone(),
            base_stake: self.base_stake,
            strategy: self.strategy.clone(),
            max_escalation_level: self.max_level,
            target_profit_pct,
            target_duration_minutes: self.target_duration_minutes,
        }
    }

    pub fn opening_balance(&self) -> Option<Decimal> {
        self.opening_balance.and_then(Decimal::from_f64)
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Structural checks that would otherwise surface as confusing runtime
    /// behaviour.
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.tables.is_empty() {
            return Err(SessionError::Config("no [[tables]] configured".into()));
        }
        let mut seen = HashSet::new();
        for t in &self.tables {
            if t.id.trim().is_empty() {
                return Err(SessionError::Config("table id must not be empty".into()));
            }
            if !seen.insert(t.id.as_str()) {
                return Err(SessionError::Config(format!("duplicate table id '{}'", t.id)));
            }
        }
        if self.remote.enabled && self.remote.url.trim().is_empty() {
            return Err(SessionError::Config("remote.enabled requires remote.url".into()));
        }
        Ok(())
    }

    /// Built-in tables plus any configured ones.
    pub fn strategy_registry(&self) -> Result<StrategyRegistry, SessionError> {
        let mut registry = StrategyRegistry::default();
        for s in &self.strategies {
            let multipliers = s
                .multipliers
                .iter()
                .map(|m| {
                    Decimal::from_f64(*m).ok_or_else(|| {
                        SessionError::Config(format!("strategy '{}': bad multiplier {m}", s.name))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            registry.register(StrategyTable::new(&s.name, multipliers, s.max_level_below)?);
        }
        Ok(registry)
    }

    /// Resolve an environment variable name to its value.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }

    /// The remote channel key, kept out of logs and debug output.
    pub fn remote_api_key(&self) -> Result<SecretString> {
        Self::resolve_env(&self.remote.api_key_env).map(SecretString::new)
    }
}
