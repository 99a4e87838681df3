// Copyright 2026 QSim Gateway Contributors
// SPDX-License-Identifier: Apache-2.0

//! HTTP client abstraction for the Qiskit Runtime REST API.
//!
//! Provides [`IbmHttpClient`] trait for abstracting HTTP operations and
//! [`ReqwestIbmClient`] for production use, plus [`MockIbmClient`] for testing.

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::RemoteConfig;
use crate::error::RemoteError;
use crate::remote::RemoteChannel;

use super::{BackendConfiguration, BackendStatus, JobResults, JobStatus, SamplerJob};

/// Qiskit Runtime endpoint for the `ibm_cloud` channel.
pub const CLOUD_API_URL: &str = "https://quantum.cloud.ibm.com/api";

/// Qiskit Runtime endpoint for the legacy `ibm_quantum` channel.
pub const LEGACY_API_URL: &str = "https://api.quantum-computing.ibm.com";

const IAM_TOKEN_URL: &str = "https://iam.cloud.ibm.com/identity/token";
const IBM_API_VERSION: &str = "2025-05-01";
const USER_AGENT: &str = concat!("qsim-gateway/", env!("CARGO_PKG_VERSION"));

/// Trait for Qiskit Runtime HTTP operations.
///
/// This trait enables testing the service without real HTTP calls.
#[async_trait]
pub trait IbmHttpClient: Send + Sync {
    /// Names of all backends visible to the account, in service order.
    async fn list_backends(&self) -> Result<Vec<String>, RemoteError>;

    /// Static configuration of a backend.
    async fn backend_configuration(&self, name: &str) -> Result<BackendConfiguration, RemoteError>;

    /// Current status of a backend.
    async fn backend_status(&self, name: &str) -> Result<BackendStatus, RemoteError>;

    /// Submit a sampler job and return its ID.
    async fn submit_job(&self, job: &SamplerJob) -> Result<String, RemoteError>;

    /// Status of a previously submitted job.
    async fn job_status(&self, job_id: &str) -> Result<JobStatus, RemoteError>;

    /// Results of a completed job.
    async fn job_results(&self, job_id: &str) -> Result<JobResults, RemoteError>;
}

#[derive(Deserialize)]
struct IamTokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct SubmitResponse {
    id: String,
}

/// Backend listing. The cloud API answers `{"devices": [...]}`, the legacy
/// API `{"backends": [...]}`; entries are names or objects with a name.
#[derive(Deserialize)]
#[serde(untagged)]
enum BackendList {
    Devices { devices: Vec<BackendEntry> },
    Backends { backends: Vec<BackendEntry> },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BackendEntry {
    Name(String),
    Object { name: String },
}

impl BackendList {
    fn into_names(self) -> Vec<String> {
        let entries = match self {
            BackendList::Devices { devices } => devices,
            BackendList::Backends { backends } => backends,
        };
        entries
            .into_iter()
            .map(|e| match e {
                BackendEntry::Name(name) | BackendEntry::Object { name } => name,
            })
            .collect()
    }
}

/// Production HTTP client using reqwest with retry logic.
pub struct ReqwestIbmClient {
    client: reqwest::Client,
    base_url: String,
    bearer_token: SecretString,
    channel: RemoteChannel,
    instance: Option<String>,
    max_retries: u32,
    retry_base_delay_ms: u64,
}

impl std::fmt::Debug for ReqwestIbmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqwestIbmClient")
            .field("base_url", &self.base_url)
            .field("bearer_token", &"[REDACTED]")
            .field("channel", &self.channel)
            .field("instance", &self.instance)
            .field("max_retries", &self.max_retries)
            .field("retry_base_delay_ms", &self.retry_base_delay_ms)
            .finish()
    }
}

impl ReqwestIbmClient {
    /// Create a client from configuration, authenticating as the channel
    /// requires.
    ///
    /// On `ibm_cloud` the API key is exchanged for an IAM bearer token. On
    /// `ibm_quantum` the token is used as the bearer token directly.
    pub async fn connect(config: &RemoteConfig) -> Result<Self, RemoteError> {
        let api_key = config.api_key.as_deref().ok_or_else(|| {
            RemoteError::NotConfigured(
                "API key not configured. Set IBM_QUANTUM_API_KEY or remote.api_key".to_string(),
            )
        })?;
        let channel = config
            .channel()
            .map_err(|e| RemoteError::NotConfigured(e.to_string()))?;

        let client = build_http_client(config.request_timeout_sec)?;
        let bearer_token = match channel {
            RemoteChannel::IbmCloud => exchange_iam_token(&client, api_key).await?,
            RemoteChannel::IbmQuantum => SecretString::from(api_key.to_string()),
        };

        let base_url = config.api_url.clone().unwrap_or_else(|| match channel {
            RemoteChannel::IbmCloud => CLOUD_API_URL.to_string(),
            RemoteChannel::IbmQuantum => LEGACY_API_URL.to_string(),
        });

        Ok(Self::with_token(config, client, base_url, bearer_token, channel))
    }

    fn with_token(
        config: &RemoteConfig,
        client: reqwest::Client,
        base_url: String,
        bearer_token: SecretString,
        channel: RemoteChannel,
    ) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            bearer_token,
            channel,
            instance: config.instance.clone(),
            max_retries: config.max_retries,
            retry_base_delay_ms: config.retry_base_delay_ms,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Build a URL from path segments, percent-encoding each one.
    ///
    /// Backend names and job ids come from clients and may contain `/`.
    fn segment_url(&self, segments: &[&str]) -> Result<reqwest::Url, RemoteError> {
        let invalid = || RemoteError::Http(format!("Invalid API URL '{}'", self.base_url));
        let mut url = reqwest::Url::parse(&self.base_url).map_err(|_| invalid())?;
        url.path_segments_mut()
            .map_err(|_| invalid())?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Attach credentials and channel-specific headers.
    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let builder = builder.bearer_auth(self.bearer_token.expose_secret());
        match (self.channel, &self.instance) {
            (RemoteChannel::IbmCloud, Some(crn)) => builder
                .header("Service-CRN", crn)
                .header("IBM-API-Version", IBM_API_VERSION),
            (RemoteChannel::IbmCloud, None) => builder.header("IBM-API-Version", IBM_API_VERSION),
            (RemoteChannel::IbmQuantum, _) => builder,
        }
    }

    /// Sampler request body. The cloud API takes V2 PUBs, the legacy API the
    /// V1 circuit list.
    fn sampler_body(&self, job: &SamplerJob) -> serde_json::Value {
        match self.channel {
            RemoteChannel::IbmCloud => json!({
                "program_id": "sampler",
                "backend": job.backend,
                "params": {
                    "version": 2,
                    "pubs": [[job.qasm, {}, job.shots]],
                },
            }),
            RemoteChannel::IbmQuantum => {
                let mut body = json!({
                    "program_id": "sampler",
                    "backend": job.backend,
                    "params": {
                        "circuits": [job.qasm],
                        "run_options": { "shots": job.shots },
                    },
                });
                if let Some(hub) = &self.instance {
                    body["hub"] = json!(hub);
                }
                body
            }
        }
    }

    /// Execute an HTTP request with exponential backoff retry.
    ///
    /// Retries on: 429 (rate limit), 503/504 (server errors), connect/timeout errors.
    /// Does not retry: 400, 401, 403, 404. A 404 is mapped with `not_found`.
    /// Backoff: `min(base_delay * 2^attempt, 30_000ms)` + 0-25% jitter.
    async fn request_with_retry<F, T>(
        &self,
        operation: &str,
        not_found: fn(String) -> RemoteError,
        make_request: F,
    ) -> Result<T, RemoteError>
    where
        F: Fn() -> reqwest::RequestBuilder,
        T: serde::de::DeserializeOwned,
    {
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            match self.authorize(make_request()).send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return response.json::<T>().await.map_err(|e| {
                            RemoteError::MalformedResult(format!(
                                "Failed to parse {operation} response: {e}"
                            ))
                        });
                    }

                    // Non-retryable status codes
                    if matches!(
                        status,
                        StatusCode::BAD_REQUEST
                            | StatusCode::UNAUTHORIZED
                            | StatusCode::FORBIDDEN
                            | StatusCode::NOT_FOUND
                    ) {
                        let body = response.text().await.unwrap_or_default();
                        return Err(match status {
                            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                                RemoteError::AuthenticationFailed(format!(
                                    "{operation} auth failed ({status}): {body}"
                                ))
                            }
                            StatusCode::NOT_FOUND => {
                                not_found(format!("{operation} failed ({status}): {body}"))
                            }
                            _ => RemoteError::Http(format!(
                                "{operation} failed ({status}): {body}"
                            )),
                        });
                    }

                    // Retryable status codes (429, 5xx)
                    let body = response.text().await.unwrap_or_default();
                    last_error = Some(RemoteError::Http(format!(
                        "{operation} failed ({status}): {body}"
                    )));
                }
                Err(e) => {
                    // Retryable: connect/timeout errors
                    if e.is_connect() || e.is_timeout() {
                        last_error =
                            Some(RemoteError::Http(format!("{operation} request error: {e}")));
                    } else {
                        return Err(RemoteError::Http(format!("{operation} request error: {e}")));
                    }
                }
            }

            if attempt < self.max_retries {
                let base = self.retry_base_delay_ms * 2u64.saturating_pow(attempt);
                let capped = base.min(30_000);
                let jitter = capped / 4 * (attempt as u64 % 2);
                let delay = capped + jitter;
                warn!(
                    attempt = attempt + 1,
                    max = self.max_retries,
                    delay_ms = delay,
                    "{operation} failed, retrying"
                );
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
        }

        Err(last_error.unwrap_or_else(|| {
            RemoteError::Http(format!(
                "{operation} failed after {} retries",
                self.max_retries
            ))
        }))
    }
}

fn build_http_client(timeout_sec: u64) -> Result<reqwest::Client, RemoteError> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(timeout_sec))
        .connect_timeout(Duration::from_secs(10))
        .build()
        .map_err(|e| RemoteError::Http(format!("Failed to create HTTP client: {e}")))
}

/// Exchange an IBM Cloud API key for an IAM bearer token.
async fn exchange_iam_token(
    client: &reqwest::Client,
    api_key: &str,
) -> Result<SecretString, RemoteError> {
    let response = client
        .post(IAM_TOKEN_URL)
        .header(reqwest::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .header(reqwest::header::ACCEPT, "application/json")
        .body(format!(
            "grant_type=urn:ibm:params:oauth:grant-type:apikey&apikey={api_key}"
        ))
        .send()
        .await
        .map_err(|e| RemoteError::Http(format!("IAM token request failed: {e}")))?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(RemoteError::AuthenticationFailed(format!(
            "IAM returned {status}: {body}"
        )));
    }

    let token: IamTokenResponse = response.json().await.map_err(|e| {
        RemoteError::AuthenticationFailed(format!("Failed to parse IAM response: {e}"))
    })?;
    debug!("IAM token exchange succeeded");
    Ok(SecretString::from(token.access_token))
}

#[async_trait]
impl IbmHttpClient for ReqwestIbmClient {
    async fn list_backends(&self) -> Result<Vec<String>, RemoteError> {
        let url = self.url("/v1/backends");
        let list: BackendList = self
            .request_with_retry("list_backends", RemoteError::Http, || self.client.get(&url))
            .await?;
        Ok(list.into_names())
    }

    async fn backend_configuration(&self, name: &str) -> Result<BackendConfiguration, RemoteError> {
        let url = self.segment_url(&["v1", "backends", name, "configuration"])?;
        self.request_with_retry("backend_configuration", RemoteError::BackendNotFound, || {
            self.client.get(url.clone())
        })
        .await
    }

    async fn backend_status(&self, name: &str) -> Result<BackendStatus, RemoteError> {
        let url = self.segment_url(&["v1", "backends", name, "status"])?;
        self.request_with_retry("backend_status", RemoteError::BackendNotFound, || {
            self.client.get(url.clone())
        })
        .await
    }

    async fn submit_job(&self, job: &SamplerJob) -> Result<String, RemoteError> {
        let url = self.url("/v1/jobs");
        let body = self.sampler_body(job);
        let response: SubmitResponse = self
            .request_with_retry("submit_job", RemoteError::BackendNotFound, || {
                self.client.post(&url).json(&body)
            })
            .await?;
        Ok(response.id)
    }

    async fn job_status(&self, job_id: &str) -> Result<JobStatus, RemoteError> {
        let url = self.segment_url(&["v1", "jobs", job_id])?;
        self.request_with_retry("job_status", RemoteError::Http, || self.client.get(url.clone()))
            .await
    }

    async fn job_results(&self, job_id: &str) -> Result<JobResults, RemoteError> {
        let url = self.segment_url(&["v1", "jobs", job_id, "results"])?;
        self.request_with_retry("job_results", RemoteError::Http, || self.client.get(url.clone()))
            .await
    }
}

/// Mock IBM client for testing.
///
/// Job statuses are handed out in order; the last one repeats.
pub struct MockIbmClient {
    pub backends: Vec<(BackendConfiguration, BackendStatus)>,
    pub list_error: Option<RemoteError>,
    pub submit_response: Result<String, RemoteError>,
    pub statuses: Mutex<VecDeque<JobStatus>>,
    pub results_response: Result<JobResults, RemoteError>,
    pub submitted: Mutex<Vec<SamplerJob>>,
}

impl MockIbmClient {
    /// Backend entry for the mock listing.
    pub fn backend(
        name: &str,
        simulator: bool,
        operational: bool,
    ) -> (BackendConfiguration, BackendStatus) {
        (
            BackendConfiguration {
                backend_name: name.to_string(),
                n_qubits: 32,
                basis_gates: vec!["u".into(), "cx".into()],
                coupling_map: None,
                simulator,
            },
            BackendStatus {
                state: operational,
                status: if operational { "active" } else { "maintenance" }.to_string(),
                message: String::new(),
            },
        )
    }

    /// Replace the job status sequence.
    pub fn with_statuses(self, statuses: Vec<JobStatus>) -> Self {
        Self {
            statuses: Mutex::new(statuses.into()),
            ..self
        }
    }

    /// Replace the job results.
    pub fn with_results(self, results: Result<JobResults, RemoteError>) -> Self {
        Self {
            results_response: results,
            ..self
        }
    }

    /// Jobs submitted so far.
    pub fn submitted_jobs(&self) -> Vec<SamplerJob> {
        self.submitted.lock().map(|jobs| jobs.clone()).unwrap_or_default()
    }
}

impl Default for MockIbmClient {
    fn default() -> Self {
        Self {
            backends: vec![Self::backend("ibmq_qasm_simulator", true, true)],
            list_error: None,
            submit_response: Ok("mock-job-id".to_string()),
            statuses: Mutex::new(VecDeque::from([JobStatus::with_status(
                "mock-job-id",
                "Completed",
            )])),
            results_response: Ok(JobResults::quasi(&[("0", 0.5), ("3", 0.5)])),
            submitted: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl IbmHttpClient for MockIbmClient {
    async fn list_backends(&self) -> Result<Vec<String>, RemoteError> {
        if let Some(e) = &self.list_error {
            return Err(e.clone());
        }
        Ok(self
            .backends
            .iter()
            .map(|(c, _)| c.backend_name.clone())
            .collect())
    }

    async fn backend_configuration(&self, name: &str) -> Result<BackendConfiguration, RemoteError> {
        self.backends
            .iter()
            .find(|(c, _)| c.backend_name == name)
            .map(|(c, _)| c.clone())
            .ok_or_else(|| RemoteError::BackendNotFound(name.to_string()))
    }

    async fn backend_status(&self, name: &str) -> Result<BackendStatus, RemoteError> {
        self.backends
            .iter()
            .find(|(c, _)| c.backend_name == name)
            .map(|(_, s)| s.clone())
            .ok_or_else(|| RemoteError::BackendNotFound(name.to_string()))
    }

    async fn submit_job(&self, job: &SamplerJob) -> Result<String, RemoteError> {
        if let Ok(mut submitted) = self.submitted.lock() {
            submitted.push(job.clone());
        }
        self.submit_response.clone()
    }

    async fn job_status(&self, job_id: &str) -> Result<JobStatus, RemoteError> {
        let mut statuses = self
            .statuses
            .lock()
            .map_err(|_| RemoteError::Http("mock status lock poisoned".into()))?;
        let status = if statuses.len() > 1 {
            statuses.pop_front()
        } else {
            statuses.front().cloned()
        };
        status.ok_or_else(|| RemoteError::Http(format!("no status for job {job_id}")))
    }

    async fn job_results(&self, _job_id: &str) -> Result<JobResults, RemoteError> {
        self.results_response.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(channel: &str, instance: Option<&str>) -> RemoteConfig {
        RemoteConfig {
            api_key: Some("token".to_string()),
            channel: channel.to_string(),
            instance: instance.map(str::to_string),
            max_retries: 5,
            retry_base_delay_ms: 100,
            ..Default::default()
        }
    }

    fn client(config: &RemoteConfig) -> ReqwestIbmClient {
        let channel = config.channel().unwrap();
        ReqwestIbmClient::with_token(
            config,
            build_http_client(config.request_timeout_sec).unwrap(),
            "https://example.ibm.test/api/".to_string(),
            SecretString::from("bearer".to_string()),
            channel,
        )
    }

    fn job() -> SamplerJob {
        SamplerJob {
            backend: "ibmq_qasm_simulator".into(),
            qasm: "OPENQASM 3.0;".into(),
            shots: 100,
        }
    }

    #[tokio::test]
    async fn test_connect_requires_api_key() {
        let config = RemoteConfig::default();
        let result = ReqwestIbmClient::connect(&config).await;
        assert!(matches!(result, Err(RemoteError::NotConfigured(_))));
    }

    #[tokio::test]
    async fn test_connect_rejects_unknown_channel() {
        let config = config("aws", None);
        let result = ReqwestIbmClient::connect(&config).await;
        assert!(matches!(result, Err(RemoteError::NotConfigured(_))));
    }

    #[test]
    fn test_client_settings() {
        let client = client(&config("ibm_quantum", Some("ibm-q/open/main")));
        assert_eq!(client.base_url, "https://example.ibm.test/api");
        assert_eq!(client.max_retries, 5);
        assert_eq!(client.retry_base_delay_ms, 100);
        assert_eq!(client.url("/v1/jobs"), "https://example.ibm.test/api/v1/jobs");
    }

    #[test]
    fn test_backend_names_are_encoded_as_one_segment() {
        let client = client(&config("ibm_cloud", None));
        let url = client
            .segment_url(&["v1", "backends", "ibm sim/1", "status"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://example.ibm.test/api/v1/backends/ibm%20sim%2F1/status"
        );

        let url = client.segment_url(&["v1", "jobs", "../admin"]).unwrap();
        assert_eq!(url.as_str(), "https://example.ibm.test/api/v1/jobs/..%2Fadmin");
    }

    #[test]
    fn test_debug_redacts_token() {
        let client = client(&config("ibm_cloud", None));
        let debug = format!("{client:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("\"bearer\""));
    }

    #[test]
    fn test_cloud_sampler_body_uses_pubs() {
        let client = client(&config("ibm_cloud", Some("crn:v1:test")));
        let body = client.sampler_body(&job());
        assert_eq!(body["program_id"], "sampler");
        assert_eq!(body["params"]["version"], 2);
        assert_eq!(body["params"]["pubs"][0][0], "OPENQASM 3.0;");
        assert_eq!(body["params"]["pubs"][0][2], 100);
        assert!(body.get("hub").is_none());
    }

    #[test]
    fn test_legacy_sampler_body_uses_circuits_and_hub() {
        let client = client(&config("ibm_quantum", Some("ibm-q/open/main")));
        let body = client.sampler_body(&job());
        assert_eq!(body["params"]["circuits"][0], "OPENQASM 3.0;");
        assert_eq!(body["params"]["run_options"]["shots"], 100);
        assert_eq!(body["hub"], "ibm-q/open/main");
    }

    #[test]
    fn test_backend_list_shapes() {
        let cloud: BackendList =
            serde_json::from_str(r#"{"devices": [{"name": "ibm_torino"}, "ibm_kyiv"]}"#).unwrap();
        assert_eq!(cloud.into_names(), vec!["ibm_torino", "ibm_kyiv"]);

        let legacy: BackendList =
            serde_json::from_str(r#"{"backends": [{"name": "ibmq_qasm_simulator", "extra": 1}]}"#)
                .unwrap();
        assert_eq!(legacy.into_names(), vec!["ibmq_qasm_simulator"]);
    }

    #[tokio::test]
    async fn test_mock_status_sequence_repeats_last() {
        let mock = MockIbmClient::default().with_statuses(vec![
            JobStatus::with_status("j", "Queued"),
            JobStatus::with_status("j", "Completed"),
        ]);
        assert_eq!(mock.job_status("j").await.unwrap().status, "Queued");
        assert_eq!(mock.job_status("j").await.unwrap().status, "Completed");
        assert_eq!(mock.job_status("j").await.unwrap().status, "Completed");
    }
}
