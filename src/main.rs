//! STAKELINE: pattern-driven martingale session engine
//!
//! Entry point. Loads configuration, initialises structured logging,
//! builds one runner per configured table, and drives them until every
//! table finishes or Ctrl+C is pressed.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

use stakeline::adapters::chips::ChipRack;
use stakeline::adapters::dry_run::DryRunActuator;
use stakeline::adapters::scripted::ScriptedPerception;
use stakeline::adapters::TelemetrySink;
use stakeline::config::{self, AppConfig, TableConfig};
use stakeline::engine::{SessionController, TableRunner};
use stakeline::remote::{HttpRemoteChannel, RemoteChannel};
use stakeline::storage::RoundLog;
use stakeline::strategy::StrategyRegistry;

const BANNER: &str = r#"
 ____ _____  _    _  _______ _     ___ _   _ _____
/ ___|_   _|/ \  | |/ / ____| |   |_ _| \ | | ____|
\___ \ | | / _ \ | ' /|  _| | |    | ||  \| |  _|
 ___) || |/ ___ \| . \| |___| |___ | || |\  | |___
|____/ |_/_/   \_\_|\_\_____|_____|___|_| \_|_____|

  Pattern-driven martingale session engine
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.toml".to_string());
    let cfg = config::AppConfig::load(&config_path)?;

    init_logging();

    println!("{BANNER}");
    info!(
        agent_name = %cfg.agent.name,
        tables = cfg.tables.len(),
        remote = cfg.remote.enabled,
        "STAKELINE starting up"
    );

    // -- Shared components -----------------------------------------------

    let registry = cfg.strategy_registry()?;
    info!(strategies = ?registry.names(), "Strategy tables loaded");

    let sink: Arc<dyn TelemetrySink> = Arc::new(RoundLog::new(cfg.telemetry.round_log.as_deref()));
    let remote = build_remote(&cfg)?;

    // -- Runners ---------------------------------------------------------

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut handles = Vec::with_capacity(cfg.tables.len());

    for table in &cfg.tables {
        let runner = build_runner(&cfg, table, &registry, Arc::clone(&sink), remote.clone())?;
        handles.push(tokio::spawn(runner.run(shutdown_rx.clone())));
    }

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received.");
            let _ = shutdown_tx.send(true);
        }
    });

    info!("Runners started. Press Ctrl+C to stop.");

    for result in join_all(handles).await {
        match result {
            Ok(summary) => info!(summary = %summary, "Table finished"),
            Err(e) => error!(error = %e, "Runner task failed"),
        }
    }

    info!("STAKELINE shut down cleanly.");
    Ok(())
}

/// Build the remote channel when enabled. A missing key disables the
/// channel rather than aborting: tables keep their local configuration.
fn build_remote(cfg: &AppConfig) -> Result<Option<Arc<dyn RemoteChannel>>> {
    if !cfg.remote.enabled {
        return Ok(None);
    }
    let key = match cfg.remote_api_key() {
        Ok(k) => k,
        Err(e) => {
            warn!(error = %e, "Remote channel key missing, running on local configuration only");
            return Ok(None);
        }
    };
    let channel = HttpRemoteChannel::new(
        &cfg.remote.url,
        &cfg.remote.table,
        key,
        cfg.remote.timeout_secs,
    )?;
    info!(endpoint = channel.endpoint(), "Remote channel configured");
    Ok(Some(Arc::new(channel)))
}

fn build_runner(
    cfg: &AppConfig,
    table: &TableConfig,
    registry: &StrategyRegistry,
    sink: Arc<dyn TelemetrySink>,
    remote: Option<Arc<dyn RemoteChannel>>,
) -> Result<TableRunner> {
    let Some(script) = &table.script else {
        bail!(
            "table '{}' has no outcome script; live perception is supplied by an external adapter",
            table.id
        );
    };
    let perception = ScriptedPerception::load(script, table.opening_balance())
        .with_context(|| format!("table '{}'", table.id))?;

    let rack = if table.chips.is_empty() {
        ChipRack::default()
    } else {
        ChipRack::new(table.chips.clone())
    };

    let now = Utc::now();
    let mut controller = SessionController::new(&table.seed(), registry.clone(), now);
    if table.autostart {
        controller.start(now);
    }
    info!(session = %controller.state(), "Table configured");

    let runner = TableRunner::new(
        controller,
        Arc::new(perception),
        Arc::new(DryRunActuator::new(rack)),
        sink,
        cfg.runner.clone(),
    );
    Ok(match remote {
        Some(r) => runner.with_remote(r),
        None => runner,
    })
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("stakeline=info"));

    let json_logging = std::env::var("STAKELINE_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
