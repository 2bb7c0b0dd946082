// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Verdant - workspace environment monitor
//!
//! Polls greenery, noise and air quality sensors (or simulates them), streams
//! live snapshots over WebSocket and keeps history for wellness scoring.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use verdant::{Config, Engine, VERSION};

/// Verdant - workspace environment monitor
#[derive(Parser, Debug)]
#[command(name = "verdant")]
#[command(version = VERSION)]
#[command(about = "Sensor orchestration, live streaming and wellness insight for your workspace")]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run a simulation scenario instead of reading hardware (calm, stress, dynamic)
    #[arg(long, value_name = "SCENARIO")]
    simulate: Option<String>,

    /// Serve live snapshots over WebSocket on this port
    #[arg(long)]
    ws_port: Option<u16>,

    /// Data directory; the database is kept here
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Enable trace-level logging
    #[arg(long)]
    trace: bool,
}

const REPORT_INTERVAL: Duration = Duration::from_secs(60);

fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args.config.clone().unwrap_or_else(Config::default_path);
    let mut config = Config::load_or_create(&config_path)?;

    let log_level = if args.trace {
        Level::TRACE
    } else if args.debug {
        Level::DEBUG
    } else {
        config.log_level.parse().unwrap_or(Level::INFO)
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(args.debug)
        .with_line_number(args.debug)
        .with_ansi(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Verdant v{}", VERSION);
    info!("Configuration loaded from {:?}", config_path);

    // Command line overrides
    if let Some(scenario) = args.simulate {
        config.simulation.start_scenario = Some(scenario);
    }
    if let Some(port) = args.ws_port {
        config.streaming.websocket_enabled = true;
        config.streaming.websocket_port = port;
    }
    if let Some(data_dir) = args.data_dir {
        config.database.path = data_dir.join("verdant.db");
        config.data_dir = data_dir;
    }

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run_headless(config))
}

async fn run_headless(config: Config) -> Result<()> {
    let mut engine = Engine::new(config)?;
    let report = engine.start().await?;
    for (id, status) in &report.statuses {
        info!("  {} -> {:?}", id, status);
    }
    if let Some(addr) = engine.websocket_addr() {
        info!("Streaming on ws://{}", addr);
    }

    info!("Verdant running, press Ctrl+C to shut down");

    let mut report_tick = tokio::time::interval(REPORT_INTERVAL);
    report_tick.tick().await;

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                break;
            }
            _ = report_tick.tick() => {
                let health = engine.manager().health();
                let state = engine.state();
                info!(
                    "Health {} ({:?}), {} ticks, {} consumers, CPU {:.1}%",
                    health.score, health.level, state.ticks, state.consumers, state.cpu_usage
                );
                for issue in &health.issues {
                    warn!("  {}", issue);
                }

                let snapshot = engine.manager().latest_snapshot();
                match engine.context().evaluate(&snapshot, Utc::now()) {
                    Ok(evaluation) => {
                        info!("{}", evaluation.wellness.message);
                        if let Some(top) = evaluation.recommendations.first() {
                            info!("  [{}] {}", top.priority, top.title);
                        }
                    }
                    Err(e) => warn!("Evaluation failed: {}", e),
                }
            }
        }
    }

    info!("Shutdown signal received, cleaning up...");
    engine.stop().await?;
    info!("Verdant shutdown complete");
    Ok(())
}
