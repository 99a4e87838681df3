// Copyright 2026 QSim Gateway Contributors
// SPDX-License-Identifier: Apache-2.0

//! REST API server implementation using axum.
//!
//! # Endpoints
//!
//! - `POST /simulate` - Sample a circuit, remotely if possible
//! - `POST /get_statevector` - Statevector of a circuit
//! - `POST /get_probabilities` - Basis-state probabilities of a circuit
//! - `GET /health` - Engine health and remote availability
//! - `GET /version` - Server version

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{HeaderName, HeaderValue, Method},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::AppState;
use crate::circuit::normalize::{prepare_for_amplitudes, prepare_for_sampling};
use crate::config::{CorsConfig, ServerConfig};
use crate::engine::{Counts, HealthStatus, Probabilities};
use crate::error::{Error, Result, ValidationError};
use crate::selector::ExecutionTarget;
use crate::shaper;
use crate::validation;

const REMOTE_SUCCESS_MESSAGE: &str = "Simulation successful (IBM Quantum)!";
const LOCAL_SUCCESS_MESSAGE: &str = "Simulation successful (Local Aer)!";
const STATEVECTOR_MESSAGE: &str = "Statevector computed successfully (Local Aer)!";
const PROBABILITIES_MESSAGE: &str = "Probabilities computed successfully (Local Aer)!";

/// REST server for the gateway.
pub struct RestServer {
    state: Arc<AppState>,
}

impl RestServer {
    /// Create a new REST server.
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Start the REST server.
    pub async fn serve(self, config: &ServerConfig) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", config.host, config.port)
            .parse()
            .map_err(|e| Error::Config(format!("Invalid listen address: {}", e)))?;

        info!(address = %addr, "Starting REST server");

        let app = build_router(self.state.clone(), &config.cors);

        let mut shutdown_rx = self.state.shutdown_receiver();

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Server(format!("Failed to bind REST server: {}", e)))?;

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.changed().await;
                info!("REST server shutting down");
            })
            .await
            .map_err(|e| Error::Server(format!("REST server error: {}", e)))?;

        Ok(())
    }
}

/// Build the application router.
pub fn build_router(state: Arc<AppState>, cors: &CorsConfig) -> Router {
    Router::new()
        .route("/simulate", post(simulate))
        .route("/get_statevector", post(get_statevector))
        .route("/get_probabilities", post(get_probabilities))
        .route("/health", get(health_check))
        .route("/version", get(get_version))
        .layer(cors_layer(cors))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(config: &CorsConfig) -> CorsLayer {
    if config.allow_all {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    let methods: Vec<Method> = config
        .allowed_methods
        .iter()
        .filter_map(|m| Method::from_bytes(m.as_bytes()).ok())
        .collect();
    let headers: Vec<HeaderName> = config
        .allowed_headers
        .iter()
        .filter_map(|h| HeaderName::from_bytes(h.as_bytes()).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(methods)
        .allow_headers(headers)
}

// =============================================================================
// Request/Response types
// =============================================================================

/// Sampling request.
#[derive(Debug, Deserialize)]
struct SimulateRequest {
    qasm: Option<String>,
    shots: Option<i64>,
    backend: Option<String>,
}

/// Statevector or probability request.
#[derive(Debug, Deserialize)]
struct AmplitudeRequest {
    qasm: Option<String>,
}

/// Sampling response.
#[derive(Debug, Serialize)]
struct SimulateResponse {
    message: &'static str,
    backend_used: String,
    shots: u32,
    counts: Counts,
    #[serde(skip_serializing_if = "Option::is_none")]
    job_id: Option<String>,
}

/// Statevector response.
#[derive(Debug, Serialize)]
struct StatevectorResponse {
    message: &'static str,
    backend_used: String,
    num_qubits: usize,
    statevector: Vec<[f64; 2]>,
}

/// Probabilities response.
#[derive(Debug, Serialize)]
struct ProbabilitiesResponse {
    message: &'static str,
    backend_used: String,
    num_qubits: usize,
    probabilities: Probabilities,
}

/// Health check response.
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    engine: EngineHealth,
    remote_service_configured: bool,
    remote_simulators_available: bool,
    remote_simulators: Vec<String>,
}

/// Local engine health.
#[derive(Debug, Serialize)]
struct EngineHealth {
    name: String,
    status: String,
}

/// Version response.
#[derive(Debug, Serialize)]
struct VersionResponse {
    version: String,
    name: String,
}

fn body_error(rejection: JsonRejection) -> Error {
    ValidationError::Body(rejection.body_text()).into()
}

// =============================================================================
// Handlers
// =============================================================================

/// Sample a circuit.
async fn simulate(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<SimulateRequest>, JsonRejection>,
) -> Result<Json<SimulateResponse>> {
    let Json(req) = payload.map_err(body_error)?;
    let request_id = Uuid::new_v4().to_string();

    let qasm = validation::require_qasm(req.qasm)?;
    let shots = validation::validate_shots(req.shots, &state.limits)?;
    let backend = validation::backend_or_default(req.backend, &state.default_backend);

    debug!(
        request_id = %request_id,
        shots,
        backend = %backend,
        "REST simulate request"
    );

    let circuit = state.engine.parse(&qasm).await?;
    let plan = prepare_for_sampling(circuit);
    if !plan.diagnostics.is_empty() {
        debug!(request_id = %request_id, diagnostics = ?plan.diagnostics, "Circuit diagnostics");
    }

    let outcome = state
        .selector
        .execute(&plan.circuit, shots, &backend)
        .await
        .map_err(|e| {
            error!(request_id = %request_id, error = %e, "Local simulation failed");
            Error::from(e)
        })?;

    let message = match outcome.target {
        ExecutionTarget::Remote => REMOTE_SUCCESS_MESSAGE,
        ExecutionTarget::Local => LOCAL_SUCCESS_MESSAGE,
    };

    Ok(Json(SimulateResponse {
        message,
        backend_used: outcome.backend_used,
        shots,
        counts: outcome.counts,
        job_id: outcome.job_id,
    }))
}

/// Statevector of a circuit.
async fn get_statevector(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<AmplitudeRequest>, JsonRejection>,
) -> Result<Json<StatevectorResponse>> {
    let Json(req) = payload.map_err(body_error)?;
    let qasm = validation::require_qasm(req.qasm)?;

    let circuit = state.engine.parse(&qasm).await?;
    let circuit = prepare_for_amplitudes(circuit, state.limits.max_amplitude_qubits)?;
    let num_qubits = circuit.num_qubits();
    debug!(num_qubits, "REST statevector request");

    let amplitudes = state.engine.statevector(&circuit).await.map_err(|e| {
        error!(error = %e, "Statevector computation failed");
        Error::from(e)
    })?;

    Ok(Json(StatevectorResponse {
        message: STATEVECTOR_MESSAGE,
        backend_used: state.engine.name().to_string(),
        num_qubits,
        statevector: shaper::statevector_pairs(&amplitudes),
    }))
}

/// Basis-state probabilities of a circuit.
async fn get_probabilities(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<AmplitudeRequest>, JsonRejection>,
) -> Result<Json<ProbabilitiesResponse>> {
    let Json(req) = payload.map_err(body_error)?;
    let qasm = validation::require_qasm(req.qasm)?;

    let circuit = state.engine.parse(&qasm).await?;
    let circuit = prepare_for_amplitudes(circuit, state.limits.max_amplitude_qubits)?;
    let num_qubits = circuit.num_qubits();
    debug!(num_qubits, "REST probabilities request");

    let probabilities = state.engine.probabilities(&circuit).await.map_err(|e| {
        error!(error = %e, "Probability computation failed");
        Error::from(e)
    })?;

    Ok(Json(ProbabilitiesResponse {
        message: PROBABILITIES_MESSAGE,
        backend_used: state.engine.name().to_string(),
        num_qubits,
        probabilities,
    }))
}

/// Health check endpoint.
async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let (healthy, engine_status) = match state.engine.health_check().await {
        Ok(HealthStatus::Healthy) => (true, HealthStatus::Healthy.to_string()),
        Ok(s) => (false, s.to_string()),
        Err(e) => (false, format!("error: {}", e)),
    };
    let availability = state.availability();

    Json(HealthResponse {
        status: if healthy { "healthy" } else { "degraded" },
        engine: EngineHealth {
            name: state.engine.name().to_string(),
            status: engine_status,
        },
        remote_service_configured: availability.remote_service_configured(),
        remote_simulators_available: availability.remote_simulators_available(),
        remote_simulators: availability
            .simulators()
            .iter()
            .map(|b| b.name.clone())
            .collect(),
    })
}

/// Get version endpoint.
async fn get_version() -> Json<VersionResponse> {
    Json(VersionResponse {
        version: crate::VERSION.to_string(),
        name: env!("CARGO_PKG_NAME").to_string(),
    })
}
