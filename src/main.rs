//! SensorNet demo
//!
//! Spins up a fleet, simulates a few devices recording readings, then runs
//! collect-all queries and prints the aggregates as JSON.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use rand::Rng;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use sensornet::messages::DeviceMsg;
use sensornet::{Fleet, Settings};

/// SensorNet demo fleet
#[derive(Parser, Debug)]
#[command(name = "sensornet")]
#[command(about = "Device registry with scatter/gather reading collection", long_about = None)]
struct Args {
    /// Path to a settings.toml (defaults apply if omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the collect-all deadline in milliseconds
    #[arg(long)]
    deadline_ms: Option<u64>,
}

fn main() -> Result<()> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main())
}

async fn async_main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sensornet=info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let mut settings = match &args.config {
        Some(path) => Settings::load(path).await?,
        None => Settings::default(),
    };
    if let Some(deadline_ms) = args.deadline_ms {
        settings.query.deadline_ms = deadline_ms;
    }
    info!(deadline_ms = settings.query.deadline_ms, "starting fleet");

    let fleet = Fleet::new(settings);

    // A small simulated installation: two rooms of thermostats.
    let rooms = [
        ("kitchen", vec!["thermostat-1", "thermostat-2"]),
        ("bedroom", vec!["thermostat-1"]),
    ];
    let mut rng = rand::thread_rng();
    let mut request_id = 1u64;
    for (room, devices) in &rooms {
        for device in devices {
            let value = 18.0 + rng.gen::<f64>() * 6.0;
            let ack = fleet.record(room, device, request_id, value).await?;
            info!(room, device, value, request_id = ack, "reading recorded");
            request_id += 1;
        }
    }

    // One device is tracked but never reports; it shows up as unavailable.
    fleet.track("kitchen", "thermostat-3").await?;

    for (room, _) in &rooms {
        let ids = fleet.list_devices(room, request_id).await?;
        info!(room, devices = ?ids, "active devices");
        request_id += 1;

        let response = fleet.collect_readings(room, request_id).await?;
        println!("{room}: {}", serde_json::to_string_pretty(&response.readings)?);
        request_id += 1;
    }

    // Tear one device down and collect again; after the group prunes it,
    // the aggregate simply no longer includes it.
    let doomed = fleet.track("kitchen", "thermostat-2").await?;
    doomed.send(DeviceMsg::Stop);
    doomed.lifecycle().stopped().await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let response = fleet.collect_readings("kitchen", request_id).await?;
    println!("kitchen after teardown: {}", serde_json::to_string_pretty(&response.readings)?);

    fleet.shutdown();
    Ok(())
}
