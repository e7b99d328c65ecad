// src/main.rs
use crate::config::AppConfig;
use crate::connectors::gateway::GatewayClient;
use crate::connectors::simulated::SimulatedAuction;
use crate::connectors::traits::AuctionService;
use crate::core::engine::{Command, EngineOptions, TerminalEngine};
use crate::core::store::Action;
use crate::storage::{PreferenceStore, KEY_ENDPOINT};
use crate::types::Instrument;
use anyhow::Context;
use dotenvy::dotenv;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

mod config;
mod connectors;
mod core;
mod error;
mod storage;
mod tui;
mod types;
mod utils;

/// The TUI owns stdout, so logs go to a daily file.
fn init_logging(log_dir: &str) -> WorkerGuard {
    let file_appender = tracing_appender::rolling::daily(log_dir, "terminal.log");
    let (writer, guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(writer)
        .with_ansi(false)
        .init();
    guard
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    // 1. Load Configuration
    let config = AppConfig::new().context("failed to load configuration")?;
    let _log_guard = init_logging(&config.log_dir);
    let preferences = PreferenceStore::load_or_default(&config.preferences_file).await;
    let endpoint = preferences
        .get(KEY_ENDPOINT)
        .unwrap_or(config.endpoint.as_str())
        .to_string();

    info!(
        "Auction Terminal v{} starting in {} mode against {}",
        env!("CARGO_PKG_VERSION"),
        if config.paper_mode { "paper" } else { "live" },
        endpoint
    );

    // 2. Initialize Components
    let service: Arc<dyn AuctionService> = if config.paper_mode {
        Arc::new(SimulatedAuction::demo()?)
    } else {
        Arc::new(GatewayClient::new(&endpoint, config.owner.clone())?)
    };

    // 3. Create Channels
    let (command_tx, command_rx) = mpsc::channel(64);
    let (ui_tx, ui_rx) = mpsc::channel(256);

    let options = EngineOptions {
        history_limit: config.history_limit,
        extra_digits: config.display.extra_digits(),
        refresh_interval: Duration::from_secs(config.refresh_interval_secs),
    };
    let mut engine = TerminalEngine::new(service, command_rx, ui_tx, options)
        .with_action(Action::EndpointSelected(config.endpoint.clone()))
        .with_action(Action::LanguageSelected(config.language.clone()));
    match Instrument::parse(&config.default_pair) {
        Some(pair) => engine = engine.with_action(Action::PairSelected(pair)),
        None => warn!("Ignoring malformed default pair {:?}", config.default_pair),
    }
    let mut engine = engine.with_preferences(preferences);

    // 4. Run Engine and UI
    let engine_task = tokio::spawn(async move {
        if let Err(e) = engine.run().await {
            error!("Fatal Engine Error: {}", e);
        }
    });

    let ui_result = tui::run(ui_rx, command_tx.clone()).await;
    let _ = command_tx.send(Command::Shutdown).await;
    engine_task.await?;

    ui_result
}
