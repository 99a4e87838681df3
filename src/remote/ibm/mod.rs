// Copyright 2026 QSim Gateway Contributors
// SPDX-License-Identifier: Apache-2.0

//! IBM Quantum remote service via the Qiskit Runtime REST API.
//!
//! # Architecture
//!
//! The service is generic over [`IbmHttpClient`], enabling deterministic
//! testing with a mock client while using [`ReqwestIbmClient`] in production.
//!
//! A run is: submit one sampler job, poll its status until it reaches a
//! terminal state or the job timeout elapses, fetch the results and hand
//! back the raw payload. Quasi-distributions (V1 sampler), per-register
//! samples (V2 sampler) and plain counts are all accepted.

pub mod client;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{RemoteBackend, RemoteJobResult, RemotePayload, RemoteService};
use crate::config::RemoteConfig;
use crate::engine::TranspiledCircuit;
use crate::error::RemoteError;

use client::{IbmHttpClient, ReqwestIbmClient};

/// Sampler job submitted to the runtime.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SamplerJob {
    /// Target backend name
    pub backend: String,
    /// OpenQASM 3 program
    pub qasm: String,
    /// Number of shots
    pub shots: u32,
}

/// Backend configuration from `/v1/backends/{name}/configuration`.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfiguration {
    /// Backend name
    pub backend_name: String,
    /// Number of qubits
    #[serde(default)]
    pub n_qubits: usize,
    /// Basis gates
    #[serde(default)]
    pub basis_gates: Vec<String>,
    /// Coupling map (pairs of connected qubits)
    #[serde(default)]
    pub coupling_map: Option<Vec<[usize; 2]>>,
    /// Whether this is a simulator
    #[serde(default)]
    pub simulator: bool,
}

/// Backend status from `/v1/backends/{name}/status`.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendStatus {
    /// Whether the backend is operational
    #[serde(alias = "operational")]
    pub state: bool,
    /// Status string (e.g. "active")
    #[serde(default)]
    pub status: String,
    /// Status message
    #[serde(default, alias = "status_msg")]
    pub message: String,
}

/// Job status from `/v1/jobs/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct JobStatus {
    /// Job ID
    pub id: String,
    /// Job status (mixed case on the cloud API)
    pub status: String,
    /// State object with reason (cloud API)
    #[serde(default)]
    pub state: Option<JobState>,
    /// Error information (legacy API)
    #[serde(default)]
    pub error: Option<JobError>,
}

/// Job state with reason (cloud API).
#[derive(Debug, Clone, Deserialize)]
pub struct JobState {
    /// Status string
    #[serde(default)]
    pub status: String,
    /// Reason for failure
    #[serde(default)]
    pub reason: Option<String>,
}

/// Job error information (legacy API).
#[derive(Debug, Clone, Deserialize)]
pub struct JobError {
    /// Error message
    pub message: String,
}

impl JobStatus {
    /// Status with no failure details.
    pub fn with_status(id: &str, status: &str) -> Self {
        Self {
            id: id.to_string(),
            status: status.to_string(),
            state: None,
            error: None,
        }
    }

    /// Failed status carrying a reason.
    pub fn failed(id: &str, reason: &str) -> Self {
        Self {
            state: Some(JobState {
                status: "Failed".to_string(),
                reason: Some(reason.to_string()),
            }),
            ..Self::with_status(id, "Failed")
        }
    }

    fn normalized_status(&self) -> String {
        self.status.to_uppercase()
    }

    /// Check if job completed successfully.
    pub fn is_completed(&self) -> bool {
        matches!(self.normalized_status().as_str(), "COMPLETED" | "DONE")
    }

    /// Check if job failed or was cancelled.
    pub fn is_failed(&self) -> bool {
        matches!(
            self.normalized_status().as_str(),
            "FAILED" | "ERROR" | "CANCELLED"
        )
    }

    /// Failure reason, falling back to the raw status.
    pub fn error_message(&self) -> String {
        if let Some(reason) = self.state.as_ref().and_then(|s| s.reason.clone()) {
            return reason;
        }
        if let Some(error) = &self.error {
            return error.message.clone();
        }
        format!("job ended with status {}", self.status)
    }
}

/// Job results from `/v1/jobs/{id}/results`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobResults {
    /// V2 sampler: one entry per PUB
    #[serde(default)]
    pub results: Vec<SamplerResult>,
    /// V1 sampler: one quasi-distribution per circuit
    #[serde(default)]
    pub quasi_dists: Option<Vec<BTreeMap<String, f64>>>,
}

/// Sampler result for one circuit.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SamplerResult {
    /// V2 sampler data: classical register name to samples
    #[serde(default)]
    pub data: Option<BTreeMap<String, RegisterData>>,
    /// Quasi-probability distributions
    #[serde(default)]
    pub quasi_dists: Option<Vec<BTreeMap<String, f64>>>,
    /// Measurement counts
    #[serde(default)]
    pub counts: Option<BTreeMap<String, u64>>,
}

/// Classical register data from V2 sampler results.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterData {
    /// Hex-encoded samples, one per shot (e.g. `["0x0", "0x3"]`)
    pub samples: Vec<String>,
}

impl JobResults {
    /// V1-style results holding one quasi-distribution.
    pub fn quasi(entries: &[(&str, f64)]) -> Self {
        let dist = entries.iter().map(|(k, v)| (k.to_string(), *v)).collect();
        Self {
            results: Vec::new(),
            quasi_dists: Some(vec![dist]),
        }
    }

    /// V2-style results holding samples for one register.
    pub fn samples(register: &str, samples: &[&str]) -> Self {
        let data = BTreeMap::from([(
            register.to_string(),
            RegisterData {
                samples: samples.iter().map(|s| s.to_string()).collect(),
            },
        )]);
        Self {
            results: vec![SamplerResult {
                data: Some(data),
                ..Default::default()
            }],
            quasi_dists: None,
        }
    }

    /// Pick the payload for the first (only) circuit.
    pub fn into_payload(self) -> Result<RemotePayload, RemoteError> {
        if let Some(dist) = self.quasi_dists.and_then(|d| d.into_iter().next()) {
            return Ok(RemotePayload::QuasiDistribution(dist));
        }

        let first = self.results.into_iter().next().ok_or_else(|| {
            RemoteError::MalformedResult("no circuit results in response".to_string())
        })?;

        if let Some(dist) = first.quasi_dists.and_then(|d| d.into_iter().next()) {
            return Ok(RemotePayload::QuasiDistribution(dist));
        }
        if let Some(data) = first.data.filter(|d| !d.is_empty()) {
            let samples = data
                .into_iter()
                .map(|(register, d)| (register, d.samples))
                .collect();
            return Ok(RemotePayload::Samples(samples));
        }
        if let Some(counts) = first.counts {
            return Ok(RemotePayload::Counts(counts));
        }

        Err(RemoteError::MalformedResult(
            "result has no quasi_dists, samples or counts".to_string(),
        ))
    }
}

/// IBM Quantum runtime service.
pub struct IbmRuntimeService<C: IbmHttpClient = ReqwestIbmClient> {
    client: C,
    poll_interval: Duration,
    job_timeout: Duration,
}

impl IbmRuntimeService<ReqwestIbmClient> {
    /// Authenticate and create the service from configuration.
    pub async fn connect(config: &RemoteConfig) -> Result<Self, RemoteError> {
        let client = ReqwestIbmClient::connect(config).await?;
        info!(channel = %config.channel, "Connected to IBM Quantum runtime");
        Ok(Self::with_client(config, client))
    }
}

impl<C: IbmHttpClient> IbmRuntimeService<C> {
    /// Create with a custom HTTP client (for testing).
    pub fn with_client(config: &RemoteConfig, client: C) -> Self {
        Self {
            client,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            job_timeout: Duration::from_secs(config.job_timeout_sec),
        }
    }

    /// Access the underlying HTTP client.
    pub fn client(&self) -> &C {
        &self.client
    }

    async fn describe(&self, name: &str) -> Result<RemoteBackend, RemoteError> {
        let config = self.client.backend_configuration(name).await?;
        let status = self.client.backend_status(name).await?;
        Ok(RemoteBackend {
            name: config.backend_name,
            num_qubits: config.n_qubits,
            basis_gates: config.basis_gates,
            coupling_map: config.coupling_map.unwrap_or_default(),
            simulator: config.simulator,
            operational: status.state,
        })
    }

    /// Poll until the job completes.
    async fn wait_for_job(&self, job_id: &str) -> Result<(), RemoteError> {
        let start = Instant::now();

        loop {
            if start.elapsed() > self.job_timeout {
                return Err(RemoteError::Timeout(format!(
                    "job {job_id} did not finish within {}s",
                    self.job_timeout.as_secs()
                )));
            }

            let status = self.client.job_status(job_id).await?;
            if status.is_completed() {
                return Ok(());
            }
            if status.is_failed() {
                return Err(RemoteError::JobFailed {
                    job_id: job_id.to_string(),
                    reason: status.error_message(),
                });
            }

            debug!(job_id = %job_id, status = %status.status, "IBM job still running");
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[async_trait]
impl<C: IbmHttpClient> RemoteService for IbmRuntimeService<C> {
    fn name(&self) -> &str {
        "ibm_quantum"
    }

    async fn operational_simulators(&self) -> Result<Vec<RemoteBackend>, RemoteError> {
        let names = self.client.list_backends().await?;
        let mut simulators = Vec::new();

        for name in &names {
            match self.describe(name).await {
                Ok(backend) if backend.simulator && backend.operational => simulators.push(backend),
                Ok(_) => {}
                Err(e) => warn!(backend = %name, error = %e, "Skipping backend"),
            }
        }

        debug!(
            listed = names.len(),
            simulators = simulators.len(),
            "Listed operational IBM simulators"
        );
        Ok(simulators)
    }

    async fn resolve_backend(&self, name: &str) -> Result<RemoteBackend, RemoteError> {
        let backend = self.describe(name).await?;
        if !backend.operational {
            return Err(RemoteError::BackendUnavailable(name.to_string()));
        }
        Ok(backend)
    }

    async fn run(
        &self,
        backend: &RemoteBackend,
        circuit: &TranspiledCircuit,
        shots: u32,
    ) -> Result<RemoteJobResult, RemoteError> {
        let job = SamplerJob {
            backend: backend.name.clone(),
            qasm: circuit.qasm.clone(),
            shots,
        };

        let job_id = self.client.submit_job(&job).await?;
        info!(job_id = %job_id, backend = %backend.name, shots, "IBM job submitted");

        self.wait_for_job(&job_id).await?;

        let payload = self.client.job_results(&job_id).await?.into_payload()?;
        info!(job_id = %job_id, "IBM job completed");

        Ok(RemoteJobResult { job_id, payload })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use client::MockIbmClient;

    fn test_config() -> RemoteConfig {
        RemoteConfig {
            api_key: Some("token".into()),
            poll_interval_ms: 100,
            job_timeout_sec: 5,
            ..Default::default()
        }
    }

    fn transpiled() -> TranspiledCircuit {
        TranspiledCircuit {
            qasm: "OPENQASM 3.0;".into(),
            num_qubits: 2,
            num_clbits: 2,
            cregs: vec![crate::circuit::Register::new("c", 2)],
        }
    }

    #[test]
    fn test_job_status_mixed_case() {
        assert!(JobStatus::with_status("j", "Completed").is_completed());
        assert!(JobStatus::with_status("j", "DONE").is_completed());
        assert!(JobStatus::with_status("j", "cancelled").is_failed());
        assert!(!JobStatus::with_status("j", "Running").is_failed());
    }

    #[test]
    fn test_job_error_message_sources() {
        assert_eq!(JobStatus::failed("j", "too deep").error_message(), "too deep");

        let legacy: JobStatus = serde_json::from_str(
            r#"{"id": "j", "status": "ERROR", "error": {"message": "bad qasm"}}"#,
        )
        .unwrap();
        assert_eq!(legacy.error_message(), "bad qasm");

        assert_eq!(
            JobStatus::with_status("j", "Cancelled").error_message(),
            "job ended with status Cancelled"
        );
    }

    #[test]
    fn test_backend_status_legacy_alias() {
        let status: BackendStatus =
            serde_json::from_str(r#"{"operational": true, "status_msg": "active"}"#).unwrap();
        assert!(status.state);
        assert_eq!(status.message, "active");
    }

    #[test]
    fn test_payload_v1_quasi() {
        let results: JobResults =
            serde_json::from_str(r#"{"quasi_dists": [{"0": 0.25, "3": 0.75}], "metadata": []}"#)
                .unwrap();
        match results.into_payload().unwrap() {
            RemotePayload::QuasiDistribution(d) => assert_eq!(d["3"], 0.75),
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn test_payload_v2_samples() {
        let results: JobResults = serde_json::from_str(
            r#"{"results": [{"data": {"c": {"samples": ["0x0", "0x3"], "num_bits": 2}}}]}"#,
        )
        .unwrap();
        match results.into_payload().unwrap() {
            RemotePayload::Samples(s) => assert_eq!(s["c"], vec!["0x0", "0x3"]),
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn test_payload_counts() {
        let results: JobResults =
            serde_json::from_str(r#"{"results": [{"counts": {"00": 10, "11": 6}}]}"#).unwrap();
        assert!(matches!(
            results.into_payload().unwrap(),
            RemotePayload::Counts(_)
        ));
    }

    #[test]
    fn test_payload_empty_is_malformed() {
        let err = JobResults::default().into_payload().unwrap_err();
        assert!(matches!(err, RemoteError::MalformedResult(_)));

        let results: JobResults = serde_json::from_str(r#"{"results": [{}]}"#).unwrap();
        assert!(matches!(
            results.into_payload(),
            Err(RemoteError::MalformedResult(_))
        ));
    }

    #[tokio::test]
    async fn test_operational_simulators_filters_and_keeps_order() {
        let client = MockIbmClient {
            backends: vec![
                MockIbmClient::backend("ibm_torino", false, true),
                MockIbmClient::backend("simulator_mps", true, false),
                MockIbmClient::backend("simulator_stabilizer", true, true),
                MockIbmClient::backend("ibmq_qasm_simulator", true, true),
            ],
            ..Default::default()
        };
        let service = IbmRuntimeService::with_client(&test_config(), client);

        let sims = service.operational_simulators().await.unwrap();
        let names: Vec<_> = sims.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["simulator_stabilizer", "ibmq_qasm_simulator"]);
    }

    #[tokio::test]
    async fn test_operational_simulators_list_error() {
        let client = MockIbmClient {
            list_error: Some(RemoteError::AuthenticationFailed("bad key".into())),
            ..Default::default()
        };
        let service = IbmRuntimeService::with_client(&test_config(), client);
        assert!(matches!(
            service.operational_simulators().await,
            Err(RemoteError::AuthenticationFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_resolve_backend() {
        let client = MockIbmClient {
            backends: vec![
                MockIbmClient::backend("ibmq_qasm_simulator", true, true),
                MockIbmClient::backend("simulator_mps", true, false),
            ],
            ..Default::default()
        };
        let service = IbmRuntimeService::with_client(&test_config(), client);

        let backend = service.resolve_backend("ibmq_qasm_simulator").await.unwrap();
        assert!(backend.simulator);
        assert_eq!(backend.basis_gates, vec!["u", "cx"]);

        assert!(matches!(
            service.resolve_backend("simulator_mps").await,
            Err(RemoteError::BackendUnavailable(_))
        ));
        assert!(matches!(
            service.resolve_backend("nope").await,
            Err(RemoteError::BackendNotFound(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_polls_until_completed() {
        let client = MockIbmClient::default().with_statuses(vec![
            JobStatus::with_status("mock-job-id", "Queued"),
            JobStatus::with_status("mock-job-id", "Running"),
            JobStatus::with_status("mock-job-id", "Completed"),
        ]);
        let service = IbmRuntimeService::with_client(&test_config(), client);
        let backend = service.resolve_backend("ibmq_qasm_simulator").await.unwrap();

        let result = service.run(&backend, &transpiled(), 1000).await.unwrap();
        assert_eq!(result.job_id, "mock-job-id");
        assert!(matches!(result.payload, RemotePayload::QuasiDistribution(_)));

        let jobs = service.client().submitted_jobs();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].shots, 1000);
        assert_eq!(jobs[0].backend, "ibmq_qasm_simulator");
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_job_failed() {
        let client = MockIbmClient::default()
            .with_statuses(vec![JobStatus::failed("mock-job-id", "circuit too deep")]);
        let service = IbmRuntimeService::with_client(&test_config(), client);
        let backend = service.resolve_backend("ibmq_qasm_simulator").await.unwrap();

        let err = service.run(&backend, &transpiled(), 100).await.unwrap_err();
        match err {
            RemoteError::JobFailed { job_id, reason } => {
                assert_eq!(job_id, "mock-job-id");
                assert_eq!(reason, "circuit too deep");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_times_out() {
        let client = MockIbmClient::default()
            .with_statuses(vec![JobStatus::with_status("mock-job-id", "Queued")]);
        let service = IbmRuntimeService::with_client(&test_config(), client);
        let backend = service.resolve_backend("ibmq_qasm_simulator").await.unwrap();

        let err = service.run(&backend, &transpiled(), 100).await.unwrap_err();
        assert!(matches!(err, RemoteError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_run_submit_error() {
        let client = MockIbmClient {
            submit_response: Err(RemoteError::Http("503".into())),
            ..Default::default()
        };
        let service = IbmRuntimeService::with_client(&test_config(), client);
        let backend = service.resolve_backend("ibmq_qasm_simulator").await.unwrap();
        assert!(service.run(&backend, &transpiled(), 100).await.is_err());
    }
}
