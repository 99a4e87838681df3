// Copyright 2026 QSim Gateway Contributors
// SPDX-License-Identifier: Apache-2.0

//! Backend selection for sampling requests.
//!
//! Execution is a two-stage pipeline. [`BackendSelector::try_remote`] either
//! completes on the remote service or returns the [`FallbackReason`] it gave
//! up for; [`BackendSelector::run_local`] is the path of last resort. Remote
//! failures never reach the caller.
//!
//! Whether the remote stage is attempted at all depends on
//! [`RemoteAvailability`], established once at startup.

use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::circuit::Circuit;
use crate::engine::{Counts, SimulationEngine};
use crate::error::{EngineError, RemoteError};
use crate::remote::{RemoteBackend, RemoteService};
use crate::shaper;

/// Remote availability, probed once at startup and read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteAvailability {
    remote_service_configured: bool,
    remote_simulators_available: bool,
    simulators: Vec<RemoteBackend>,
}

impl RemoteAvailability {
    /// Local-only mode.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Availability with a configured service and the given operational
    /// simulators.
    pub fn with_simulators(simulators: Vec<RemoteBackend>) -> Self {
        Self {
            remote_service_configured: true,
            remote_simulators_available: !simulators.is_empty(),
            simulators,
        }
    }

    /// List operational simulators on `service`.
    ///
    /// Never fails: a missing service or a listing error yields
    /// [`RemoteAvailability::disabled`].
    pub async fn probe(service: Option<&dyn RemoteService>) -> Self {
        let Some(service) = service else {
            info!("No remote service configured, running in local-only mode");
            return Self::disabled();
        };

        match service.operational_simulators().await {
            Ok(simulators) => {
                if simulators.is_empty() {
                    warn!(
                        service = service.name(),
                        "Remote service reachable but no operational simulators found"
                    );
                } else {
                    let names: Vec<&str> =
                        simulators.iter().take(3).map(|b| b.name.as_str()).collect();
                    info!(
                        service = service.name(),
                        count = simulators.len(),
                        sample = ?names,
                        "Remote simulators available"
                    );
                }
                Self::with_simulators(simulators)
            }
            Err(e) => {
                warn!(
                    service = service.name(),
                    error = %e,
                    "Remote availability probe failed, running in local-only mode"
                );
                Self::disabled()
            }
        }
    }

    /// Whether a remote service was configured and reachable at startup.
    pub fn remote_service_configured(&self) -> bool {
        self.remote_service_configured
    }

    /// Whether at least one operational remote simulator was found.
    pub fn remote_simulators_available(&self) -> bool {
        self.remote_simulators_available
    }

    /// Operational simulators, in service order.
    pub fn simulators(&self) -> &[RemoteBackend] {
        &self.simulators
    }

    /// Whether the remote stage should be attempted.
    pub fn remote_enabled(&self) -> bool {
        self.remote_service_configured && self.remote_simulators_available
    }
}

/// Why a request did not complete remotely.
#[derive(Debug, Clone, Error)]
pub enum FallbackReason {
    /// No remote service, or none reachable at startup
    #[error("remote service not configured")]
    NotConfigured,

    /// The startup probe found no operational simulators
    #[error("no remote simulators available")]
    NoSimulators,

    /// Neither the requested backend nor any operational simulator could be used
    #[error("no operational backend for '{requested}'")]
    NoOperationalBackend {
        /// Backend name from the request
        requested: String,
    },

    /// The circuit could not be transpiled for the resolved backend
    #[error("transpilation for '{backend}' failed: {source}")]
    Transpilation {
        /// Resolved backend
        backend: String,
        /// Engine error
        source: EngineError,
    },

    /// Submission, job execution or polling failed
    #[error("remote execution on '{backend}' failed: {source}")]
    Remote {
        /// Resolved backend
        backend: String,
        /// Remote error
        source: RemoteError,
    },

    /// The job finished but its result could not be shaped into counts
    #[error("result of job {job_id} could not be read: {source}")]
    Shaping {
        /// Remote job identifier
        job_id: String,
        /// Shaping error
        source: RemoteError,
    },
}

impl FallbackReason {
    /// Whether the remote stage was skipped without contacting the service.
    pub fn is_skip(&self) -> bool {
        matches!(self, FallbackReason::NotConfigured | FallbackReason::NoSimulators)
    }
}

/// Where a sampling request ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionTarget {
    /// Remote service
    Remote,
    /// Local engine
    Local,
}

/// Result of a sampling request.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingOutcome {
    /// Where the circuit ran
    pub target: ExecutionTarget,
    /// Remote backend name or local engine identifier
    pub backend_used: String,
    /// Remote job identifier
    pub job_id: Option<String>,
    /// Measurement counts
    pub counts: Counts,
}

/// Outcome of the remote stage.
#[derive(Debug)]
pub enum RemoteAttempt {
    /// The job ran remotely
    Completed(SamplingOutcome),
    /// The request must run locally
    Fallback(FallbackReason),
}

/// Chooses between the remote service and the local engine.
#[derive(Clone)]
pub struct BackendSelector {
    engine: Arc<dyn SimulationEngine>,
    remote: Option<Arc<dyn RemoteService>>,
    availability: Arc<RemoteAvailability>,
}

impl BackendSelector {
    /// Create a selector.
    pub fn new(
        engine: Arc<dyn SimulationEngine>,
        remote: Option<Arc<dyn RemoteService>>,
        availability: RemoteAvailability,
    ) -> Self {
        Self {
            engine,
            remote,
            availability: Arc::new(availability),
        }
    }

    /// Startup availability.
    pub fn availability(&self) -> &RemoteAvailability {
        &self.availability
    }

    /// Run a sampling circuit, remotely if possible.
    ///
    /// Only local execution errors are returned.
    pub async fn execute(
        &self,
        circuit: &Circuit,
        shots: u32,
        requested_backend: &str,
    ) -> Result<SamplingOutcome, EngineError> {
        match self.try_remote(circuit, shots, requested_backend).await {
            RemoteAttempt::Completed(outcome) => Ok(outcome),
            RemoteAttempt::Fallback(reason) => {
                if reason.is_skip() {
                    debug!(reason = %reason, "Running locally");
                } else {
                    warn!(
                        reason = %reason,
                        "Remote execution failed, falling back to local engine"
                    );
                }
                self.run_local(circuit, shots).await
            }
        }
    }

    /// Remote stage: resolve, transpile, submit, wait, shape.
    pub async fn try_remote(
        &self,
        circuit: &Circuit,
        shots: u32,
        requested_backend: &str,
    ) -> RemoteAttempt {
        let service = match self.remote.as_deref() {
            Some(service) if self.availability.remote_service_configured() => service,
            _ => return RemoteAttempt::Fallback(FallbackReason::NotConfigured),
        };
        if !self.availability.remote_simulators_available() {
            return RemoteAttempt::Fallback(FallbackReason::NoSimulators);
        }

        let backend = match resolve(service, requested_backend).await {
            Ok(backend) => backend,
            Err(reason) => return RemoteAttempt::Fallback(reason),
        };

        info!(backend = %backend.name, "Transpiling for remote backend");
        let transpiled = match self.engine.transpile(circuit, &backend).await {
            Ok(t) => t,
            Err(source) => {
                return RemoteAttempt::Fallback(FallbackReason::Transpilation {
                    backend: backend.name,
                    source,
                })
            }
        };

        info!(backend = %backend.name, shots, "Submitting remote job");
        let result = match service.run(&backend, &transpiled, shots).await {
            Ok(result) => result,
            Err(source) => {
                return RemoteAttempt::Fallback(FallbackReason::Remote {
                    backend: backend.name,
                    source,
                })
            }
        };

        match shaper::remote_counts(result.payload, shots, &transpiled) {
            Ok(counts) => {
                info!(backend = %backend.name, job_id = %result.job_id, "Remote job completed");
                RemoteAttempt::Completed(SamplingOutcome {
                    target: ExecutionTarget::Remote,
                    backend_used: backend.name,
                    job_id: Some(result.job_id),
                    counts,
                })
            }
            Err(source) => RemoteAttempt::Fallback(FallbackReason::Shaping {
                job_id: result.job_id,
                source,
            }),
        }
    }

    /// Local stage.
    pub async fn run_local(
        &self,
        circuit: &Circuit,
        shots: u32,
    ) -> Result<SamplingOutcome, EngineError> {
        info!(engine = self.engine.name(), shots, "Running on local engine");
        let counts = self.engine.sample_counts(circuit, shots).await?;
        Ok(SamplingOutcome {
            target: ExecutionTarget::Local,
            backend_used: self.engine.name().to_string(),
            job_id: None,
            counts,
        })
    }
}

/// Requested backend first, then the first operational simulator.
async fn resolve(
    service: &dyn RemoteService,
    requested: &str,
) -> Result<RemoteBackend, FallbackReason> {
    let error = match service.resolve_backend(requested).await {
        Ok(backend) => return Ok(backend),
        Err(e) => e,
    };
    warn!(
        requested,
        error = %error,
        "Requested backend not usable, looking for an operational simulator"
    );

    match service.operational_simulators().await {
        Ok(simulators) => simulators.into_iter().next().ok_or_else(|| {
            FallbackReason::NoOperationalBackend {
                requested: requested.to_string(),
            }
        }),
        Err(source) => Err(FallbackReason::Remote {
            backend: requested.to_string(),
            source,
        }),
    }
}
