// Copyright 2026 QSim Gateway Contributors
// SPDX-License-Identifier: Apache-2.0

//! HTTP server.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                REST (axum)                   │
//! │  /simulate  /get_statevector  /get_probabilities
//! ├──────────────────────┬───────────────────────┤
//! │  Circuit Normalizer  │   Backend Selector    │
//! ├──────────────────────┼───────────┬───────────┤
//! │  SimulationEngine    │  Remote   │  Result   │
//! │  (PyO3 / Qiskit)     │  Service  │  Shaper   │
//! └──────────────────────┴───────────┴───────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use qsim_gateway::server::{run_server, AppState};
//!
//! let availability = RemoteAvailability::probe(remote.as_deref()).await;
//! let state = Arc::new(AppState::new(engine, remote, availability, &config));
//! run_server(&config.server, state).await?;
//! ```

pub mod rest;

pub use rest::{build_router, RestServer};

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::{Config, LimitsConfig, ServerConfig};
use crate::engine::SimulationEngine;
use crate::error::Result;
use crate::remote::RemoteService;
use crate::selector::{BackendSelector, RemoteAvailability};

/// Shared, read-only request handler state.
pub struct AppState {
    /// Remote/local execution pipeline
    pub selector: BackendSelector,

    /// Local engine, for parsing and amplitude requests
    pub engine: Arc<dyn SimulationEngine>,

    /// Request limits
    pub limits: LimitsConfig,

    /// Remote backend used when a request does not name one
    pub default_backend: String,

    /// Shutdown signal sender
    shutdown_tx: watch::Sender<bool>,

    /// Shutdown signal receiver
    shutdown_rx: watch::Receiver<bool>,
}

impl AppState {
    /// Create handler state.
    pub fn new(
        engine: Arc<dyn SimulationEngine>,
        remote: Option<Arc<dyn RemoteService>>,
        availability: RemoteAvailability,
        config: &Config,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            selector: BackendSelector::new(engine.clone(), remote, availability),
            engine,
            limits: config.limits.clone(),
            default_backend: config.remote.default_backend.clone(),
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// Startup remote availability.
    pub fn availability(&self) -> &RemoteAvailability {
        self.selector.availability()
    }

    /// Get a shutdown receiver.
    pub fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

/// Run the HTTP server until Ctrl-C.
///
/// In-flight requests get `shutdown_timeout_sec` to finish after the signal.
pub async fn run_server(config: &ServerConfig, state: Arc<AppState>) -> Result<()> {
    let server = RestServer::new(state.clone());

    let state_for_signal = state.clone();
    tokio::spawn(async move {
        if let Ok(()) = tokio::signal::ctrl_c().await {
            info!("Received shutdown signal, initiating graceful shutdown");
            state_for_signal.shutdown();
        }
    });

    let shutdown_timeout = Duration::from_secs(config.shutdown_timeout_sec);
    let mut shutdown_rx = state.shutdown_receiver();
    let drain_deadline = async move {
        let _ = shutdown_rx.changed().await;
        tokio::time::sleep(shutdown_timeout).await;
    };

    tokio::select! {
        result = server.serve(config) => result,
        _ = drain_deadline => {
            warn!(
                timeout_secs = config.shutdown_timeout_sec,
                "Graceful shutdown timed out, dropping in-flight requests"
            );
            Ok(())
        }
    }
}
