//! ospf-engine daemon binary
//!
//! Loads configuration, starts one task per area and runs until Ctrl+C.
//! Packet I/O is supplied by an external transport; without one the
//! daemon logs what it would send.

use clap::Parser;
use ospf_engine::{Config, Instance};
use std::path::PathBuf;
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::{fmt, EnvFilter};

/// OSPF-style link-state routing engine
#[derive(Parser, Debug)]
#[command(name = "ospf-engine", version, about)]
struct Args {
    /// Path to configuration file (overrides default search paths)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print the effective configuration as YAML and exit
    #[arg(long)]
    show_config: bool,
}

#[tokio::main]
async fn main() {
    // Initialize logging
    let filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    let args = Args::parse();

    info!("ospf-engine starting");

    let (config, loaded_paths) = if let Some(config_path) = &args.config {
        // Explicit config file specified - load only that file
        match Config::load_file(config_path) {
            Ok(config) => (config, vec![config_path.clone()]),
            Err(e) => {
                error!("Failed to load configuration from {}: {}", config_path.display(), e);
                std::process::exit(1);
            }
        }
    } else {
        match Config::load() {
            Ok(result) => result,
            Err(e) => {
                error!("Failed to load configuration: {}", e);
                std::process::exit(1);
            }
        }
    };

    if loaded_paths.is_empty() {
        info!("No config files found, using defaults");
    } else {
        for path in &loaded_paths {
            info!(path = %path.display(), "Loaded config file");
        }
    }

    if args.show_config {
        match config.to_yaml() {
            Ok(yaml) => print!("{}", yaml),
            Err(e) => {
                error!("Failed to serialize configuration: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    let mut instance = match Instance::start(&config) {
        Ok(instance) => instance,
        Err(e) => {
            error!("Failed to start: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        router_id = %instance.router_id(),
        areas = instance.area_ids().count(),
        "ospf-engine running, press Ctrl+C to exit"
    );

    if let Some(mut outbound) = instance.take_outbound() {
        tokio::spawn(async move {
            while let Some(out) = outbound.recv().await {
                debug!(
                    interface = %out.interface,
                    destination = %out.destination,
                    packet_type = %out.packet_type(),
                    "No transport attached, dropping outbound packet"
                );
            }
        });
    }

    if let Some(mut events) = instance.take_events() {
        tokio::spawn(async move {
            while let Some((area, event)) = events.recv().await {
                debug!(area = %area, event = %event, "Topology event");
            }
        });
    }

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => warn!("Failed to listen for shutdown signal: {}", e),
    }

    instance.shutdown().await;
    info!("ospf-engine shutdown complete");
}
