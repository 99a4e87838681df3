// Copyright 2026 QSim Gateway Contributors
// SPDX-License-Identifier: Apache-2.0

//! Remote simulation service abstraction.
//!
//! [`RemoteService`] is the seam between the backend selector and a cloud
//! job-submission API. [`ibm::IbmRuntimeService`] implements it over the
//! Qiskit Runtime REST API.

pub mod ibm;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::engine::TranspiledCircuit;
use crate::error::RemoteError;

/// Authentication channel for the remote service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteChannel {
    /// IBM Cloud: API key exchanged for an IAM token, instance is a CRN
    #[default]
    IbmCloud,
    /// Legacy IBM Quantum platform: token used directly, instance is
    /// `hub/group/project`
    IbmQuantum,
}

impl RemoteChannel {
    /// Wire name of the channel.
    pub fn as_str(&self) -> &'static str {
        match self {
            RemoteChannel::IbmCloud => "ibm_cloud",
            RemoteChannel::IbmQuantum => "ibm_quantum",
        }
    }
}

impl fmt::Display for RemoteChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RemoteChannel {
    type Err = String;

    /// Case-insensitive.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ibm_cloud" => Ok(RemoteChannel::IbmCloud),
            "ibm_quantum" => Ok(RemoteChannel::IbmQuantum),
            other => Err(format!(
                "unknown channel '{other}' (expected 'ibm_cloud' or 'ibm_quantum')"
            )),
        }
    }
}

/// A remote execution target.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RemoteBackend {
    /// Backend name (e.g. `ibmq_qasm_simulator`)
    pub name: String,
    /// Number of qubits
    pub num_qubits: usize,
    /// Native gate set
    pub basis_gates: Vec<String>,
    /// Connected qubit pairs; empty means all-to-all
    pub coupling_map: Vec<[usize; 2]>,
    /// Whether the backend is a simulator
    pub simulator: bool,
    /// Whether the backend currently accepts jobs
    pub operational: bool,
}

/// Raw result of a remote job, before shaping.
#[derive(Debug, Clone, PartialEq)]
pub enum RemotePayload {
    /// Integer-encoded basis state (decimal or `0x` hex) to quasi-probability
    QuasiDistribution(BTreeMap<String, f64>),
    /// Per-register hex samples, one entry per shot
    Samples(BTreeMap<String, Vec<String>>),
    /// Bitstring counts
    Counts(BTreeMap<String, u64>),
}

/// A finished remote job.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteJobResult {
    /// Job identifier assigned by the service
    pub job_id: String,
    /// Result data
    pub payload: RemotePayload,
}

/// A cloud simulation service.
#[async_trait]
pub trait RemoteService: Send + Sync {
    /// Service name for logs.
    fn name(&self) -> &str;

    /// Operational simulators, in the order the service lists them.
    async fn operational_simulators(&self) -> Result<Vec<RemoteBackend>, RemoteError>;

    /// Look up a backend by name. Fails if it is unknown or not operational.
    async fn resolve_backend(&self, name: &str) -> Result<RemoteBackend, RemoteError>;

    /// Submit a transpiled circuit and wait for its result.
    async fn run(
        &self,
        backend: &RemoteBackend,
        circuit: &TranspiledCircuit,
        shots: u32,
    ) -> Result<RemoteJobResult, RemoteError>;
}
