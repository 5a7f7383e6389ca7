//! ss-cluster
//!
//! Runs one proxy worker per configured remote server and load balances
//! client TCP connections across the healthy ones.
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌──────────────────────────────────────────────┐
//!                      │                  SS-CLUSTER                  │
//!                      │                                              │
//!   Client ────────────┼─▶ listener ─▶ relay ─▶ healthy subset        │
//!                      │                 │        (random pick)       │
//!                      │                 ▼                            │
//!                      │          worker i relay address ─────────────┼──▶ remote server i
//!                      │                 ▲                            │
//!                      │   failure signal│        health tracker      │
//!                      │   (worker i) ───┴──────▶ (cooldown, lazy     │
//!                      │                          recovery)           │
//!                      └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{CommandFactory, Parser};

use ss_cluster::config::{load_config, ConfigError};
use ss_cluster::lifecycle::signals::spawn_signal_handler;
use ss_cluster::observability::{logging, metrics};
use ss_cluster::{Cluster, Shutdown};

#[derive(Parser)]
#[command(name = "ss-cluster")]
#[command(about = "Load balance TCP connections across a pool of proxy workers", long_about = None)]
struct Cli {
    /// Path to the config file (.toml or .json). Required.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Validate the config, print the backends and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Without a config there is nothing to run: show usage and fail.
    let Some(config_path) = cli.config.as_deref() else {
        let _ = Cli::command().print_help();
        return ExitCode::FAILURE;
    };

    let loaded = match load_config(config_path) {
        Ok(loaded) => loaded,
        Err(e) => {
            report_config_error(&e);
            return ExitCode::from(2);
        }
    };

    if let Err(e) = logging::init_logging(&loaded.config.observability) {
        eprintln!("Failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    tracing::info!(
        config = %config_path.display(),
        bind_address = %loaded.config.listener.bind_address,
        backends = loaded.backends.len(),
        "ss-cluster v{} starting",
        env!("CARGO_PKG_VERSION")
    );

    if cli.check {
        for backend in &loaded.backends {
            println!("{backend}");
        }
        return ExitCode::SUCCESS;
    }

    let observability = &loaded.config.observability;
    if observability.metrics_enabled {
        match observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics exporter");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let cluster = match Cluster::start(&loaded.config, loaded.backends).await {
        Ok(cluster) => cluster,
        Err(e) => {
            tracing::error!(error = %e, "Startup failed");
            return ExitCode::FAILURE;
        }
    };

    let shutdown = Shutdown::new();
    spawn_signal_handler(shutdown.clone());

    if let Err(e) = cluster.run(&shutdown).await {
        tracing::error!(error = %e, "Relay stopped with error");
        return ExitCode::FAILURE;
    }

    tracing::info!("Shutdown complete");
    ExitCode::SUCCESS
}

fn report_config_error(error: &ConfigError) {
    eprintln!("Failed to start ss-cluster, errors:");
    match error {
        ConfigError::Validation(errors) => {
            for e in errors {
                eprintln!("  * {e}");
            }
        }
        other => eprintln!("  * {other}"),
    }
}
