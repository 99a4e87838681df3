// Copyright 2026 QSim Gateway Contributors
// SPDX-License-Identifier: Apache-2.0

//! Error types for the gateway.
//!
//! [`Error`] is the top-level error returned by request handlers and the CLI.
//! It converts into an HTTP response with a `{ "error", "code" }` body, which
//! is the only error shape clients ever see.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Result type alias for gateway operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Gateway error types.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Local engine error (parser, transpiler, simulator)
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// Remote simulation service error
    #[error("Remote service error: {0}")]
    Remote(#[from] RemoteError),

    /// Request validation error
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Server error
    #[error("Server error: {0}")]
    Server(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

/// Errors raised by the simulation engine.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// The circuit description could not be parsed or is not supported
    #[error("Invalid circuit: {0}")]
    InvalidCircuit(String),

    /// The engine (or its runtime) is not available
    #[error("Engine unavailable: {0}")]
    Unavailable(String),

    /// Simulation failed
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    /// Transpilation for a remote target failed
    #[error("Transpilation failed: {0}")]
    Transpilation(String),

    /// The engine did not answer in time
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Python interop error
    #[error("Python error: {0}")]
    Python(String),
}

/// Errors raised while talking to the remote simulation service.
#[derive(Debug, Clone, Error)]
pub enum RemoteError {
    /// No credentials were configured
    #[error("Remote service not configured: {0}")]
    NotConfigured(String),

    /// Credentials were rejected
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The named backend does not exist
    #[error("Backend not found: {0}")]
    BackendNotFound(String),

    /// The backend exists but is not accepting jobs
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Transport or HTTP status error
    #[error("HTTP error: {0}")]
    Http(String),

    /// The job reached a failed or cancelled state
    #[error("Job {job_id} failed: {reason}")]
    JobFailed {
        /// Remote job identifier
        job_id: String,
        /// Failure reason reported by the service
        reason: String,
    },

    /// The job did not finish in time
    #[error("Timeout: {0}")]
    Timeout(String),

    /// The result payload could not be interpreted
    #[error("Malformed result: {0}")]
    MalformedResult(String),
}

/// Request validation errors.
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    /// A required field is absent
    #[error("Missing '{0}' in request body")]
    MissingField(String),

    /// Field validation failed
    #[error("Field '{field}': {message}")]
    Field { field: String, message: String },

    /// The request body is not valid JSON for this endpoint
    #[error("Invalid request body: {0}")]
    Body(String),

    /// Resource limit exceeded
    #[error("Resource limit exceeded for {resource}: limit={limit}, requested={requested}")]
    ResourceLimit {
        resource: String,
        limit: u64,
        requested: u64,
    },
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Human-readable message
    pub error: String,
    /// Machine-readable code
    pub code: String,
}

impl Error {
    /// HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::Engine(EngineError::InvalidCircuit(_)) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Validation(ValidationError::MissingField(_)) => "MISSING_FIELD",
            Error::Validation(ValidationError::Body(_)) => "INVALID_BODY",
            Error::Validation(ValidationError::ResourceLimit { .. }) => "LIMIT_EXCEEDED",
            Error::Validation(ValidationError::Field { .. }) => "INVALID_FIELD",
            Error::Engine(EngineError::InvalidCircuit(_)) => "INVALID_QASM",
            Error::Engine(EngineError::Timeout(_)) => "ENGINE_TIMEOUT",
            Error::Engine(_) => "EXECUTION_ERROR",
            Error::Remote(_) => "REMOTE_ERROR",
            Error::Config(_) => "CONFIG_ERROR",
            Error::Server(_) | Error::Io(_) | Error::Serialization(_) => "INTERNAL_ERROR",
        }
    }

    /// Message reported to HTTP clients.
    ///
    /// Request and engine failures carry their own message without the
    /// category prefix.
    pub fn client_message(&self) -> String {
        match self {
            Error::Validation(e) => e.to_string(),
            Error::Engine(EngineError::InvalidCircuit(m) | EngineError::ExecutionFailed(m)) => {
                m.clone()
            }
            other => other.to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: self.client_message(),
            code: self.code().to_string(),
        };
        (status, Json(body)).into_response()
    }
}
