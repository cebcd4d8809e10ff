// SPDX-License-Identifier: Apache-2.0
// © Wayline Works <https://github.com/wayline-works/wayline>

//! Schedule node entry point.
//!
//! Hosts the node on an in-process bus. Deployments that bridge to a real
//! broker embed [`ScheduleNode`] as a library instead; this binary exists
//! for single-process setups and soak testing.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use wayline_schedule_service::{InProcBus, NodeConfig, ScheduleNode};

#[derive(Debug, Parser)]
#[command(name = "wayline-schedule-node", about = "Wayline traffic schedule node")]
struct Args {
    /// Period between heartbeat beacons, in milliseconds.
    #[arg(long, default_value_t = wayline_schedule_service::config::DEFAULT_HEARTBEAT_PERIOD_MS)]
    heartbeat_period_ms: u64,

    /// Location of the durable participant registry log.
    #[arg(long, default_value = wayline_schedule_service::config::DEFAULT_LOG_FILE)]
    log_file: PathBuf,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = NodeConfig {
        heartbeat_period_ms: args.heartbeat_period_ms,
        log_file_location: args.log_file,
    };

    let bus = Arc::new(InProcBus::new());
    let node = ScheduleNode::start(bus, &config)?;
    info!(
        heartbeat_period_ms = config.heartbeat_period_ms,
        log_file = %config.log_file_location.display(),
        "schedule node running, ctrl-c to stop"
    );

    let stop = Arc::new(AtomicBool::new(false));
    let handler_stop = Arc::clone(&stop);
    ctrlc::set_handler(move || handler_stop.store(true, Ordering::SeqCst))?;
    while !stop.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(100));
    }

    drop(node);
    info!("schedule node stopped");
    Ok(())
}
