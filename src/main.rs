// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Cosva - stall presence simulator
//!
//! Commands:
//! - `simulate`: publish synthetic RFID detections and presence transitions
//! - `sync`: record published events into the farm database
//! - `status`: print cows, stalls and recent detections
//! - `seed` / `clear`: load or remove the demo herd

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use cosva::config::Config;
use cosva::db::Database;
use cosva::herd::{demo_records, Herd, DEMO_COW_IDS};
use cosva::stalls::StallRegistry;
use cosva::streaming::{EventPublisher, MemoryPublisher, MqttPublisher};
use cosva::{status, sync, Simulation, VERSION};

/// Cosva - stall presence simulator
#[derive(Parser, Debug)]
#[command(name = "cosva")]
#[command(version = VERSION)]
#[command(about = "RFID stall presence simulator and recorder")]
struct Args {
    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Enable trace-level logging
    #[arg(long, global = true)]
    trace: bool,

    /// Farm id override
    #[arg(long, global = true)]
    farm: Option<String>,

    /// MQTT broker address
    #[arg(long, global = true)]
    mqtt_broker: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the sensor simulation (default)
    Simulate {
        /// Fixed RNG seed
        #[arg(long)]
        seed: Option<u64>,

        /// Publish into memory instead of MQTT
        #[arg(long)]
        dry_run: bool,
    },
    /// Record published detections and presence events
    Sync,
    /// Show cows, stalls and recent detections
    Status,
    /// Load the demo herd
    Seed,
    /// Remove the demo herd
    Clear,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging; the configured level is applied after loading
    let builder = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::new(log_filter(args.trace, args.debug, None)))
        .with_filter_reloading()
        .with_target(false)
        .with_file(args.debug)
        .with_line_number(args.debug);
    let log_handle = builder.reload_handle();
    tracing::subscriber::set_global_default(builder.finish())?;

    info!("Cosva IoT sensor simulator v{}", VERSION);

    let config_path = args.config.clone().unwrap_or_else(Config::default_path);
    let mut config = Config::load_or_create(&config_path)?;
    let level = log_filter(args.trace, args.debug, Some(config.log_level.as_str()));
    log_handle.reload(EnvFilter::new(level))?;

    if let Some(farm) = args.farm {
        config.farm.id = farm;
    }
    if let Some(broker) = args.mqtt_broker {
        config.mqtt.broker = broker;
    }
    config
        .simulation
        .apply_env(|name| std::env::var(name).ok())?;
    config.validate()?;

    let rt = tokio::runtime::Runtime::new()?;
    match args.command.unwrap_or(Command::Simulate { seed: None, dry_run: false }) {
        Command::Simulate { seed, dry_run } => {
            if seed.is_some() {
                config.simulation.seed = seed;
            }
            rt.block_on(run_simulation(config, dry_run))
        }
        Command::Sync => rt.block_on(run_sync(config)),
        Command::Status => show_status(&config),
        Command::Seed => seed_demo(&config),
        Command::Clear => clear_demo(&config),
    }
}

/// Level directive for the log filter. `--trace` and `--debug` win over
/// the configured level; an unparsable configured level falls back to info.
fn log_filter(trace: bool, debug: bool, configured: Option<&str>) -> String {
    let level = if trace {
        Level::TRACE
    } else if debug {
        Level::DEBUG
    } else {
        configured
            .and_then(|level| level.parse().ok())
            .unwrap_or(Level::INFO)
    };
    level.as_str().to_ascii_lowercase()
}

/// Broadcast a stop signal on Ctrl+C
fn shutdown_on_ctrl_c() -> broadcast::Receiver<()> {
    let (tx, rx) = broadcast::channel(1);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received, cleaning up...");
        }
        let _ = tx.send(());
    });
    rx
}

async fn run_simulation(config: Config, dry_run: bool) -> Result<()> {
    let db = Database::open(&config.database).context("opening farm database")?;

    info!("Loading cows for farm {}...", config.farm.id);
    let herd = Herd::from_records(&db.cows_for_farm(&config.farm.id)?);
    if herd.is_empty() {
        warn!("No cows found for farm {}", config.farm.id);
    } else {
        info!("Loaded {} cows", herd.len());
    }

    let stalls = StallRegistry::initialize(&config.stalls, &db, &config.farm.id, &herd)
        .context("initializing stall registry")?;
    stalls.check_herd(&herd)?;

    let publisher: Arc<dyn EventPublisher> = if dry_run {
        info!("Dry run: events stay in memory");
        Arc::new(MemoryPublisher::bounded(1000))
    } else {
        Arc::new(
            MqttPublisher::connect(&config.mqtt)
                .await
                .context("connecting to MQTT broker")?,
        )
    };

    let mut simulation = Simulation::new(herd, &config.simulation, publisher);
    info!(
        "Detection probability: {:.0}%, exit probability: {:.0}%",
        config.simulation.detection_probability * 100.0,
        config.simulation.exit_probability * 100.0
    );
    info!("Press Ctrl+C to stop");

    let outcome = simulation.run(shutdown_on_ctrl_c()).await;
    simulation.finish(config.simulation.shutdown_timeout()).await?;
    drop(db);
    info!("Database connection closed");

    outcome?;
    Ok(())
}

async fn run_sync(config: Config) -> Result<()> {
    let db = Arc::new(Database::open(&config.database).context("opening farm database")?);
    let recorder = sync::Recorder::new(db, &config.farm.id);
    sync::run(&config.mqtt, recorder, shutdown_on_ctrl_c()).await?;
    Ok(())
}

fn show_status(config: &Config) -> Result<()> {
    let db = Database::open(&config.database).context("opening farm database")?;
    let report = status::render(&db, &config.farm.id, &config.stalls, Utc::now())?;
    println!("{}", report);
    Ok(())
}

fn seed_demo(config: &Config) -> Result<()> {
    let db = Database::open(&config.database).context("opening farm database")?;
    let mut created = 0;
    for cow in demo_records(&config.farm.id) {
        if db.upsert_cow(&cow)? {
            created += 1;
        }
    }
    info!("Demo herd loaded: {} new cows for farm {}", created, config.farm.id);
    Ok(())
}

fn clear_demo(config: &Config) -> Result<()> {
    let db = Database::open(&config.database).context("opening farm database")?;
    let removed = db.delete_cows(&DEMO_COW_IDS)?;
    info!("Removed {} demo cows", removed);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_filter_precedence() {
        assert_eq!(log_filter(true, true, Some("warn")), "trace");
        assert_eq!(log_filter(false, true, Some("warn")), "debug");
        assert_eq!(log_filter(false, false, Some("warn")), "warn");
        assert_eq!(log_filter(false, false, Some("loud")), "info");
        assert_eq!(log_filter(false, false, None), "info");
    }
}
