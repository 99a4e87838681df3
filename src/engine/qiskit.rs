// Copyright 2026 QSim Gateway Contributors
// SPDX-License-Identifier: Apache-2.0

//! Qiskit engine using PyO3.
//!
//! Parsing, transpilation and local simulation are delegated to Qiskit and
//! Qiskit Aer running in an embedded Python interpreter.
//!
//! # Requirements
//!
//! - Python 3.9+ with `qiskit` (1.x) and `qiskit-aer` installed
//!
//! # Architecture
//!
//! Every operation runs a short Python script with a single `inputs_json`
//! global and reads back a single `output` global, both JSON strings.
//! Circuits cross the boundary in the serde form of [`Circuit`], so the
//! scripts rebuild a `QuantumCircuit` from registers and flat bit indices
//! and never see the original source text after parsing.
//!
//! Python runs on the blocking pool under a timeout (default 300 seconds).

use async_trait::async_trait;
use num_complex::Complex64;
use pyo3::prelude::*;
use pyo3::types::PyDict;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::ffi::CString;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::{Counts, HealthStatus, Probabilities, SimulationEngine, TranspiledCircuit};
use crate::circuit::{Circuit, Register};
use crate::config::LocalConfig;
use crate::error::EngineError;
use crate::remote::RemoteBackend;

static QISKIT_AVAILABLE: AtomicBool = AtomicBool::new(false);
static QISKIT_CHECKED: AtomicBool = AtomicBool::new(false);

/// Shared by every script: decodes inputs and rebuilds circuits.
const PRELUDE: &str = r#"
import json
from qiskit import QuantumCircuit, QuantumRegister, ClassicalRegister
from qiskit.circuit import Clbit
from qiskit.circuit.library import get_standard_gate_name_mapping

inputs = json.loads(inputs_json)
_STANDARD_GATES = get_standard_gate_name_mapping()
_STRUCTURAL = {"measure", "barrier", "reset"}

def _append(qc, inst):
    op = inst["operation"]
    qubits = inst["qubits"]
    clbits = inst.get("clbits", [])
    kind = op["kind"]
    if kind == "measure":
        qc.measure(qubits[0], clbits[0])
    elif kind == "barrier":
        qc.barrier(*qubits)
    elif kind == "reset":
        qc.reset(qubits[0])
    else:
        name = op["name"]
        if name not in _STANDARD_GATES:
            raise ValueError(f"unsupported gate '{name}'")
        qc.append(type(_STANDARD_GATES[name])(*op["params"]), qubits)

def _condition_target(qc, clbits):
    for reg in qc.cregs:
        if [qc.find_bit(b).index for b in reg] == clbits:
            return reg
    if len(clbits) == 1:
        return qc.clbits[clbits[0]]
    raise ValueError(f"condition bits {clbits} do not form a classical register")

def build_circuit(desc):
    regs = [QuantumRegister(r["size"], r["name"]) for r in desc["qregs"]]
    regs += [ClassicalRegister(r["size"], r["name"]) for r in desc["cregs"]]
    qc = QuantumCircuit(*regs)
    for inst in desc["instructions"]:
        cond = inst.get("condition")
        if cond is None:
            _append(qc, inst)
        else:
            with qc.if_test((_condition_target(qc, cond["clbits"]), cond["value"])):
                _append(qc, inst)
    return qc
"#;

const PARSE_SCRIPT: &str = r#"
from qiskit import transpile

qc = QuantumCircuit.from_qasm_str(inputs["source"])
if any(
    i.operation.name not in _STANDARD_GATES
    and i.operation.name not in _STRUCTURAL
    and i.operation.name != "if_else"
    for i in qc.data
):
    basis = [
        n for n, g in _STANDARD_GATES.items()
        if n not in _STRUCTURAL and n != "delay" and g.num_qubits > 0
    ]
    qc = transpile(qc, basis_gates=basis, optimization_level=0)

def _condition(condition):
    if condition is None:
        return None
    target, value = condition
    if isinstance(target, Clbit):
        bits = [qc.find_bit(target).index]
    elif isinstance(target, ClassicalRegister):
        bits = [qc.find_bit(b).index for b in target]
    else:
        raise ValueError("only register or bit equality conditions are supported")
    return {"clbits": bits, "value": int(value)}

def _emit(op, qubits, clbits, condition):
    if op.name in _STRUCTURAL:
        operation = {"kind": op.name}
    else:
        operation = {"kind": "gate", "name": op.name, "params": [float(p) for p in op.params]}
    inst = {"operation": operation, "qubits": qubits, "clbits": clbits}
    if condition is not None:
        inst["condition"] = condition
    instructions.append(inst)

instructions = []
for inst in qc.data:
    op = inst.operation
    qubits = [qc.find_bit(q).index for q in inst.qubits]
    clbits = [qc.find_bit(c).index for c in inst.clbits]
    if op.name == "if_else":
        true_body, false_body = op.params
        if false_body is not None:
            raise ValueError("'else' branches are not supported")
        condition = _condition(op.condition)
        for body_inst in true_body.data:
            _emit(
                body_inst.operation,
                [qubits[true_body.find_bit(q).index] for q in body_inst.qubits],
                [clbits[true_body.find_bit(c).index] for c in body_inst.clbits],
                condition,
            )
    else:
        _emit(op, qubits, clbits, _condition(getattr(op, "condition", None)))

output = json.dumps({
    "qregs": [{"name": r.name, "size": r.size} for r in qc.qregs],
    "cregs": [{"name": r.name, "size": r.size} for r in qc.cregs],
    "instructions": instructions,
})
"#;

const SAMPLE_SCRIPT: &str = r#"
from qiskit import transpile
from qiskit_aer import AerSimulator

qc = build_circuit(inputs["circuit"])
counts = {}
if qc.num_clbits > 0:
    simulator = AerSimulator()
    result = simulator.run(transpile(qc, simulator), shots=inputs["shots"]).result()
    counts = result.get_counts()
output = json.dumps({k: int(v) for k, v in counts.items()})
"#;

const STATEVECTOR_SCRIPT: &str = r#"
from qiskit.quantum_info import Statevector

qc = build_circuit(inputs["circuit"])
output = json.dumps([[float(a.real), float(a.imag)] for a in Statevector(qc).data])
"#;

const PROBABILITIES_SCRIPT: &str = r#"
from qiskit.quantum_info import Statevector

qc = build_circuit(inputs["circuit"])
output = json.dumps({k: float(v) for k, v in Statevector(qc).probabilities_dict().items()})
"#;

const TRANSPILE_SCRIPT: &str = r#"
from qiskit import transpile, qasm3

qc = build_circuit(inputs["circuit"])
options = {"optimization_level": 1}
if inputs["basis_gates"]:
    options["basis_gates"] = inputs["basis_gates"]
if inputs["coupling_map"]:
    options["coupling_map"] = inputs["coupling_map"]
tqc = transpile(qc, **options)
output = json.dumps({
    "qasm": qasm3.dumps(tqc),
    "num_qubits": tqc.num_qubits,
    "num_clbits": tqc.num_clbits,
    "cregs": [{"name": r.name, "size": r.size} for r in tqc.cregs],
})
"#;

#[derive(Deserialize)]
struct TranspileOutput {
    qasm: String,
    num_qubits: usize,
    num_clbits: usize,
    cregs: Vec<Register>,
}

/// Local engine backed by Qiskit and Qiskit Aer.
pub struct QiskitEngine {
    /// Identifier reported for local runs
    name: String,

    /// Timeout for a single Python call
    timeout: Duration,
}

impl QiskitEngine {
    /// Create a new engine, failing if Qiskit cannot be imported.
    pub fn new(config: &LocalConfig) -> Result<Self, EngineError> {
        if !Self::check_qiskit_available() {
            return Err(EngineError::Unavailable(
                "Qiskit is not available. Install with: pip install qiskit qiskit-aer".to_string(),
            ));
        }

        info!(
            name = %config.engine_name,
            timeout_sec = config.timeout_sec,
            "Initializing Qiskit engine"
        );

        Ok(Self {
            name: config.engine_name.clone(),
            timeout: Duration::from_secs(config.timeout_sec),
        })
    }

    /// Set the per-call timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Check if Qiskit and Qiskit Aer can be imported.
    pub fn check_qiskit_available() -> bool {
        if QISKIT_CHECKED.load(Ordering::Relaxed) {
            return QISKIT_AVAILABLE.load(Ordering::Relaxed);
        }

        let available = Python::with_gil(|py| {
            for module in ["qiskit", "qiskit_aer"] {
                if let Err(e) = py.import(module) {
                    warn!("{} not available: {}", module, e);
                    return false;
                }
            }
            info!("Qiskit and Qiskit Aer are available");
            true
        });

        QISKIT_CHECKED.store(true, Ordering::Relaxed);
        QISKIT_AVAILABLE.store(available, Ordering::Relaxed);
        available
    }

    /// Run `script` on the blocking pool and decode its `output`.
    ///
    /// Python exceptions raised by the script are mapped with `on_error`.
    async fn run_script<T>(
        &self,
        script: &'static str,
        inputs: serde_json::Value,
        on_error: fn(String) -> EngineError,
    ) -> Result<T, EngineError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let inputs_json = inputs.to_string();
        let timeout = self.timeout;

        let result = tokio::time::timeout(
            timeout,
            tokio::task::spawn_blocking(move || {
                Python::with_gil(|py| execute_script(py, script, &inputs_json, on_error))
            }),
        )
        .await;

        let output = match result {
            Ok(Ok(inner)) => inner?,
            Ok(Err(join_error)) => {
                return Err(EngineError::ExecutionFailed(format!(
                    "Task join error: {}",
                    join_error
                )))
            }
            Err(_elapsed) => {
                error!(timeout_secs = timeout.as_secs(), "Python execution timed out");
                return Err(EngineError::Timeout(format!(
                    "Python execution timed out after {} seconds",
                    timeout.as_secs()
                )));
            }
        };

        serde_json::from_str(&output)
            .map_err(|e| EngineError::Python(format!("Malformed engine output: {}", e)))
    }
}

fn execute_script(
    py: Python<'_>,
    script: &str,
    inputs_json: &str,
    on_error: fn(String) -> EngineError,
) -> Result<String, EngineError> {
    let globals = PyDict::new(py);
    globals
        .set_item("inputs_json", inputs_json)
        .map_err(|e| EngineError::Python(format!("Failed to set inputs_json: {}", e)))?;

    let code = CString::new(format!("{}\n{}", PRELUDE, script))
        .map_err(|e| EngineError::Python(format!("Failed to create CString: {}", e)))?;

    // Same dict for globals and locals so helper functions see module names.
    py.run(&code, Some(&globals), Some(&globals)).map_err(|e| {
        if e.is_instance_of::<pyo3::exceptions::PyImportError>(py) {
            return EngineError::Unavailable(e.to_string());
        }
        on_error(e.to_string())
    })?;

    globals
        .get_item("output")
        .map_err(|e| EngineError::Python(format!("Failed to get output: {}", e)))?
        .ok_or_else(|| EngineError::Python("output not found".to_string()))?
        .extract::<String>()
        .map_err(|e| EngineError::Python(format!("Failed to extract output: {}", e)))
}

#[async_trait]
impl SimulationEngine for QiskitEngine {
    fn name(&self) -> &str {
        &self.name
    }

    async fn parse(&self, source: &str) -> Result<Circuit, EngineError> {
        let circuit: Circuit = self
            .run_script(PARSE_SCRIPT, json!({ "source": source }), |e| {
                EngineError::InvalidCircuit(format!("Invalid QASM input: {}", e))
            })
            .await?;
        debug!(
            num_qubits = circuit.num_qubits(),
            num_clbits = circuit.num_clbits(),
            instructions = circuit.len(),
            "Parsed circuit"
        );
        Ok(circuit)
    }

    async fn sample_counts(&self, circuit: &Circuit, shots: u32) -> Result<Counts, EngineError> {
        self.run_script(
            SAMPLE_SCRIPT,
            json!({ "circuit": circuit, "shots": shots }),
            |e| EngineError::ExecutionFailed(format!("Error during local Aer simulation: {}", e)),
        )
        .await
    }

    async fn statevector(&self, circuit: &Circuit) -> Result<Vec<Complex64>, EngineError> {
        let pairs: Vec<[f64; 2]> = self
            .run_script(
                STATEVECTOR_SCRIPT,
                json!({ "circuit": circuit }),
                EngineError::ExecutionFailed,
            )
            .await?;
        Ok(pairs.into_iter().map(|[re, im]| Complex64::new(re, im)).collect())
    }

    async fn probabilities(&self, circuit: &Circuit) -> Result<Probabilities, EngineError> {
        self.run_script(
            PROBABILITIES_SCRIPT,
            json!({ "circuit": circuit }),
            EngineError::ExecutionFailed,
        )
        .await
    }

    async fn transpile(
        &self,
        circuit: &Circuit,
        backend: &RemoteBackend,
    ) -> Result<TranspiledCircuit, EngineError> {
        let out: TranspileOutput = self
            .run_script(
                TRANSPILE_SCRIPT,
                json!({
                    "circuit": circuit,
                    "basis_gates": backend.basis_gates,
                    "coupling_map": backend.coupling_map,
                }),
                EngineError::Transpilation,
            )
            .await?;
        debug!(
            backend = %backend.name,
            num_qubits = out.num_qubits,
            num_clbits = out.num_clbits,
            "Transpiled circuit"
        );
        Ok(TranspiledCircuit {
            qasm: out.qasm,
            num_qubits: out.num_qubits,
            num_clbits: out.num_clbits,
            cregs: out.cregs,
        })
    }

    async fn health_check(&self) -> Result<HealthStatus, EngineError> {
        if Self::check_qiskit_available() {
            Ok(HealthStatus::Healthy)
        } else {
            Ok(HealthStatus::Unavailable)
        }
    }
}
