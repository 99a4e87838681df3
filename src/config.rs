// Copyright 2026 QSim Gateway Contributors
// SPDX-License-Identifier: Apache-2.0

//! Configuration management for the gateway.
//!
//! Configuration is loaded from multiple sources with the following priority
//! (later sources override earlier ones):
//!
//! 1. Built-in defaults
//! 2. config.yaml file
//! 3. Environment variables (`QSIM_*`, `IBM_QUANTUM_*`), `.env` included
//! 4. CLI arguments

use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

use crate::engine::DEFAULT_LOCAL_ENGINE_NAME;
use crate::error::{Error, Result};
use crate::remote::RemoteChannel;

/// Hard ceiling for `limits.max_amplitude_qubits`.
pub const MAX_AMPLITUDE_QUBITS_CEILING: usize = 24;

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Remote simulation service
    #[serde(default)]
    pub remote: RemoteConfig,

    /// Local simulation engine
    #[serde(default)]
    pub local: LocalConfig,

    /// Request limits
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from file and environment.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut config = Config::default();

        // Load from file if specified
        if let Some(path) = config_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                config = serde_yaml::from_str(&content)?;
            }
        } else {
            // Try default locations
            for path in &["config.yaml", "config.yml", "/etc/qsim-gateway/config.yaml"] {
                let path = Path::new(path);
                if path.exists() {
                    let content = std::fs::read_to_string(path)?;
                    config = serde_yaml::from_str(&content)?;
                    break;
                }
            }
        }

        // Override with environment variables
        config.apply_env_overrides();

        Ok(config)
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(val) = lookup("QSIM_HOST") {
            self.server.host = val;
        }
        if let Some(val) = lookup("QSIM_PORT") {
            if let Ok(port) = val.parse() {
                self.server.port = port;
            }
        }
        if let Some(val) = lookup("QSIM_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Some(val) = lookup("QSIM_LOG_FORMAT") {
            self.logging.format = val;
        }
        if let Some(val) = lookup("QSIM_CORS_ALLOW_ALL") {
            self.server.cors.allow_all = val.to_lowercase() == "true" || val == "1";
        }
        if let Some(val) = lookup("QSIM_CORS_ALLOWED_ORIGINS") {
            self.server.cors.allowed_origins =
                val.split(',').map(|s| s.trim().to_string()).collect();
        }
        if let Some(val) = lookup("QSIM_MAX_SHOTS") {
            if let Ok(n) = val.parse() {
                self.limits.max_shots = n;
            }
        }
        if let Some(val) = lookup("QSIM_MAX_AMPLITUDE_QUBITS") {
            if let Ok(n) = val.parse() {
                self.limits.max_amplitude_qubits = n;
            }
        }
        if let Some(val) = lookup("QSIM_DEFAULT_BACKEND") {
            self.remote.default_backend = val;
        }

        // IBM Quantum credentials
        if let Some(val) = lookup("IBM_QUANTUM_API_KEY") {
            self.remote.api_key = non_empty(val);
        }
        if let Some(val) = lookup("IBM_QUANTUM_CHANNEL") {
            self.remote.channel = val.trim().to_lowercase();
        }
        if let Some(val) = lookup("IBM_QUANTUM_INSTANCE") {
            self.remote.instance = non_empty(val);
        }
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(Error::Config("port cannot be 0".into()));
        }
        if self.limits.max_shots == 0 {
            return Err(Error::Config("limits.max_shots must be at least 1".into()));
        }
        if self.limits.default_shots == 0 || self.limits.default_shots > self.limits.max_shots {
            return Err(Error::Config(format!(
                "limits.default_shots must be between 1 and {}",
                self.limits.max_shots
            )));
        }
        if self.limits.max_amplitude_qubits == 0
            || self.limits.max_amplitude_qubits > MAX_AMPLITUDE_QUBITS_CEILING
        {
            return Err(Error::Config(format!(
                "limits.max_amplitude_qubits must be between 1 and {}",
                MAX_AMPLITUDE_QUBITS_CEILING
            )));
        }
        if self.local.timeout_sec == 0 {
            return Err(Error::Config("local.timeout_sec must be at least 1".into()));
        }
        if self.remote.poll_interval_ms == 0 || self.remote.job_timeout_sec == 0 {
            return Err(Error::Config(
                "remote.poll_interval_ms and remote.job_timeout_sec must be non-zero".into(),
            ));
        }
        self.remote.channel()?;
        if !matches!(self.logging.format.as_str(), "json" | "pretty") {
            return Err(Error::Config(format!(
                "unknown log format '{}' (expected 'json' or 'pretty')",
                self.logging.format
            )));
        }
        // Any origin is accepted unless origins are configured
        if self.server.cors.allow_all {
            tracing::warn!(
                "CORS is set to allow all origins. \
                 Set QSIM_CORS_ALLOW_ALL=false or configure specific origins for production use."
            );
        }
        Ok(())
    }
}

fn non_empty(val: String) -> Option<String> {
    if val.trim().is_empty() {
        None
    } else {
        Some(val)
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP port
    #[serde(default = "default_port")]
    pub port: u16,

    /// CORS configuration
    #[serde(default)]
    pub cors: CorsConfig,

    /// Graceful shutdown timeout in seconds
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_sec: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors: CorsConfig::default(),
            shutdown_timeout_sec: default_shutdown_timeout(),
        }
    }
}

/// CORS configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Allow all origins
    #[serde(default = "default_true")]
    pub allow_all: bool,

    /// Allowed origins when allow_all is false
    #[serde(default)]
    pub allowed_origins: Vec<String>,

    /// Allowed methods
    #[serde(default = "default_cors_methods")]
    pub allowed_methods: Vec<String>,

    /// Allowed headers
    #[serde(default = "default_cors_headers")]
    pub allowed_headers: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            // Browser front-ends call the gateway directly
            allow_all: true,
            allowed_origins: vec![
                "http://localhost:3000".into(),
                "http://127.0.0.1:3000".into(),
            ],
            allowed_methods: default_cors_methods(),
            allowed_headers: default_cors_headers(),
        }
    }
}

fn default_cors_methods() -> Vec<String> {
    vec!["GET".into(), "POST".into(), "OPTIONS".into()]
}

fn default_cors_headers() -> Vec<String> {
    vec![
        "Content-Type".into(),
        "Authorization".into(),
        "X-Request-ID".into(),
    ]
}

fn default_host() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    5000
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

/// Remote simulation service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Whether to probe the remote service at startup
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// API key or token (usually from IBM_QUANTUM_API_KEY)
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    /// Authentication channel (`ibm_cloud` or `ibm_quantum`)
    #[serde(default = "default_channel")]
    pub channel: String,

    /// Instance: a service CRN on `ibm_cloud`, `hub/group/project` on `ibm_quantum`
    #[serde(default)]
    pub instance: Option<String>,

    /// API base URL override
    #[serde(default)]
    pub api_url: Option<String>,

    /// Backend used when a request does not name one
    #[serde(default = "default_backend")]
    pub default_backend: String,

    /// Maximum time to wait for a remote job, in seconds
    #[serde(default = "default_job_timeout")]
    pub job_timeout_sec: u64,

    /// Interval between job status polls, in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Per-request HTTP timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_sec: u64,

    /// Maximum number of retries for transient errors
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay between retries in milliseconds
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
}

impl RemoteConfig {
    /// Parsed authentication channel.
    pub fn channel(&self) -> Result<RemoteChannel> {
        self.channel.parse().map_err(Error::Config)
    }

    /// Whether credentials are present and the service is enabled.
    pub fn is_configured(&self) -> bool {
        self.enabled && self.api_key.is_some()
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: None,
            channel: default_channel(),
            instance: None,
            api_url: None,
            default_backend: default_backend(),
            job_timeout_sec: default_job_timeout(),
            poll_interval_ms: default_poll_interval_ms(),
            request_timeout_sec: default_request_timeout(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
        }
    }
}

fn default_channel() -> String {
    RemoteChannel::IbmCloud.as_str().into()
}

fn default_backend() -> String {
    "ibmq_qasm_simulator".into()
}

fn default_job_timeout() -> u64 {
    300
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_request_timeout() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    500
}

/// Local engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalConfig {
    /// Identifier reported as `backend_used`
    #[serde(default = "default_engine_name")]
    pub engine_name: String,

    /// Timeout for a single engine call in seconds
    #[serde(default = "default_local_timeout")]
    pub timeout_sec: u64,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            engine_name: default_engine_name(),
            timeout_sec: default_local_timeout(),
        }
    }
}

fn default_engine_name() -> String {
    DEFAULT_LOCAL_ENGINE_NAME.into()
}

fn default_local_timeout() -> u64 {
    300
}

/// Request limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Largest circuit accepted by the statevector and probability endpoints
    #[serde(default = "default_max_amplitude_qubits")]
    pub max_amplitude_qubits: usize,

    /// Maximum shots per request
    #[serde(default = "default_max_shots")]
    pub max_shots: u32,

    /// Shots used when a request omits them
    #[serde(default = "default_shots")]
    pub default_shots: u32,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_amplitude_qubits: default_max_amplitude_qubits(),
            max_shots: default_max_shots(),
            default_shots: default_shots(),
        }
    }
}

fn default_max_amplitude_qubits() -> usize {
    16
}

fn default_max_shots() -> u32 {
    100_000
}

fn default_shots() -> u32 {
    1024
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}
