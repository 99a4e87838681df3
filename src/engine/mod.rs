// Copyright 2026 QSim Gateway Contributors
// SPDX-License-Identifier: Apache-2.0

//! Simulation engine abstraction.
//!
//! The gateway never parses, transpiles or simulates circuits itself. Those
//! jobs belong to an external toolkit reached through [`SimulationEngine`].
//! The production engine ([`qiskit::QiskitEngine`], feature `python`) embeds
//! a Python interpreter and drives Qiskit and Qiskit Aer.

#[cfg(feature = "python")]
pub mod qiskit;

use async_trait::async_trait;
use num_complex::Complex64;
use std::collections::BTreeMap;

use crate::circuit::{Circuit, Register};
use crate::error::EngineError;
use crate::remote::RemoteBackend;

/// Default identifier reported for local execution.
pub const DEFAULT_LOCAL_ENGINE_NAME: &str = "local_aer_simulator";

/// Measurement counts keyed by bitstring.
pub type Counts = BTreeMap<String, u64>;

/// Basis-state probabilities keyed by bitstring. Zero entries may be omitted.
pub type Probabilities = BTreeMap<String, f64>;

/// Health of the engine runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    /// Engine can run circuits
    Healthy,
    /// Engine runtime is missing or broken
    Unavailable,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Unavailable => write!(f, "unavailable"),
        }
    }
}

/// A circuit rewritten for a remote backend, in the form the remote service
/// accepts.
#[derive(Debug, Clone, PartialEq)]
pub struct TranspiledCircuit {
    /// OpenQASM 3 program text
    pub qasm: String,
    /// Qubit count after layout
    pub num_qubits: usize,
    /// Classical-bit count
    pub num_clbits: usize,
    /// Classical registers in declaration order
    pub cregs: Vec<Register>,
}

impl TranspiledCircuit {
    /// Bitstring width used when decoding integer-keyed results.
    ///
    /// Falls back to the qubit count when the circuit has no classical bits.
    pub fn result_width(&self) -> usize {
        if self.num_clbits > 0 {
            self.num_clbits
        } else {
            self.num_qubits
        }
    }
}

/// Parser, transpiler and local simulator.
#[async_trait]
pub trait SimulationEngine: Send + Sync {
    /// Identifier reported as `backend_used` for local runs.
    fn name(&self) -> &str;

    /// Parse OpenQASM 2.0 source into a circuit.
    ///
    /// Syntax errors and unsupported constructs map to
    /// [`EngineError::InvalidCircuit`].
    async fn parse(&self, source: &str) -> Result<Circuit, EngineError>;

    /// Run `circuit` for `shots` shots and return measurement counts.
    async fn sample_counts(&self, circuit: &Circuit, shots: u32) -> Result<Counts, EngineError>;

    /// Dense statevector of a measurement-free circuit, in basis-index order.
    async fn statevector(&self, circuit: &Circuit) -> Result<Vec<Complex64>, EngineError>;

    /// Basis-state probabilities of a measurement-free circuit.
    async fn probabilities(&self, circuit: &Circuit) -> Result<Probabilities, EngineError>;

    /// Rewrite `circuit` for the gate set and connectivity of `backend`.
    async fn transpile(
        &self,
        circuit: &Circuit,
        backend: &RemoteBackend,
    ) -> Result<TranspiledCircuit, EngineError>;

    /// Check that the engine runtime is usable.
    async fn health_check(&self) -> Result<HealthStatus, EngineError>;
}
