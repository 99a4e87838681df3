// Copyright 2026 QSim Gateway Contributors
// SPDX-License-Identifier: Apache-2.0

//! QSim Gateway Server
//!
//! HTTP front end for quantum circuit simulation.
//!
//! # Usage
//!
//! The server needs the `python` feature (`--features python`); without it
//! `serve` exits with a configuration error.
//!
//! ```bash
//! # Start with default configuration
//! qsim-gateway serve
//!
//! # Start with custom config
//! qsim-gateway --config /path/to/config.yaml serve --port 8080
//!
//! # Probe the remote service
//! qsim-gateway backends
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use qsim_gateway::{
    config::{Config, LoggingConfig},
    engine::SimulationEngine,
    remote::{ibm::IbmRuntimeService, RemoteService},
    selector::RemoteAvailability,
    server::{self, AppState},
    Result, VERSION,
};

#[cfg(feature = "python")]
use qsim_gateway::engine::qiskit::QiskitEngine;

/// QSim Gateway
#[derive(Parser)]
#[command(name = "qsim-gateway")]
#[command(author = "QSim Gateway Contributors")]
#[command(version = VERSION)]
#[command(about = "HTTP gateway for quantum circuit simulation")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// HTTP port
        #[arg(long)]
        port: Option<u16>,
    },

    /// Probe the remote service and list operational simulators
    Backends,

    /// Show effective configuration
    Config,

    /// Validate configuration file
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }

    init_logging(&config.logging);

    match cli.command {
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }

            config.validate()?;

            let engine = create_engine(&config)?;
            let remote = connect_remote(&config).await;
            let availability = RemoteAvailability::probe(remote.as_deref()).await;

            info!(
                version = VERSION,
                host = %config.server.host,
                port = config.server.port,
                engine = engine.name(),
                remote_service_configured = availability.remote_service_configured(),
                remote_simulators_available = availability.remote_simulators_available(),
                "Starting QSim Gateway"
            );

            let state = Arc::new(AppState::new(engine, remote, availability, &config));
            server::run_server(&config.server, state).await?;
        }

        Commands::Backends => {
            config.validate()?;

            let remote = connect_remote(&config).await;
            let availability = RemoteAvailability::probe(remote.as_deref()).await;

            println!(
                "Remote service configured: {}",
                availability.remote_service_configured()
            );
            println!("Operational simulators:");
            for backend in availability.simulators() {
                let default_marker = if backend.name == config.remote.default_backend {
                    " (default)"
                } else {
                    ""
                };
                println!(
                    "  {} [{} qubits]{}",
                    backend.name, backend.num_qubits, default_marker
                );
            }
            if availability.simulators().is_empty() {
                println!("  (none, requests run on {})", config.local.engine_name);
            }
        }

        Commands::Config => {
            println!("{}", serde_yaml::to_string(&config)?);
        }

        Commands::Validate => match config.validate() {
            Ok(()) => {
                println!("Configuration is valid");
            }
            Err(e) => {
                eprintln!("Configuration error: {}", e);
                std::process::exit(1);
            }
        },
    }

    Ok(())
}

/// Initialize logging with tracing.
///
/// `RUST_LOG` takes precedence over the configured level.
fn init_logging(config: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let registry = tracing_subscriber::registry().with(filter);
    if config.format == "json" {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry.with(fmt::layer().with_target(true)).init();
    }
}

/// Create the local simulation engine.
#[cfg(feature = "python")]
fn create_engine(config: &Config) -> Result<Arc<dyn SimulationEngine>> {
    let engine = QiskitEngine::new(&config.local)?;
    Ok(Arc::new(engine))
}

/// Create the local simulation engine.
#[cfg(not(feature = "python"))]
fn create_engine(_config: &Config) -> Result<Arc<dyn SimulationEngine>> {
    Err(qsim_gateway::Error::Config(
        "No simulation engine compiled in. Rebuild with --features python".to_string(),
    ))
}

/// Connect to the remote service if credentials are configured.
///
/// Connection failures are logged and leave the gateway in local-only mode.
async fn connect_remote(config: &Config) -> Option<Arc<dyn RemoteService>> {
    if !config.remote.is_configured() {
        info!("No IBM Quantum credentials or remote disabled, running in local-only mode");
        return None;
    }

    match IbmRuntimeService::connect(&config.remote).await {
        Ok(service) => Some(Arc::new(service) as Arc<dyn RemoteService>),
        Err(e) => {
            warn!(error = %e, "Failed to connect to IBM Quantum, running in local-only mode");
            None
        }
    }
}
