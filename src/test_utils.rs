// Copyright 2026 QSim Gateway Contributors
// SPDX-License-Identifier: Apache-2.0

//! Shared test utilities for gateway tests.

use std::io;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use num_complex::Complex64;

use crate::circuit::{Circuit, Condition, Instruction, Register};
use crate::engine::{Counts, HealthStatus, Probabilities, SimulationEngine, TranspiledCircuit};
use crate::error::{EngineError, RemoteError};
use crate::remote::{RemoteBackend, RemoteJobResult, RemotePayload, RemoteService};

/// An operational remote simulator descriptor.
pub fn remote_simulator(name: &str) -> RemoteBackend {
    RemoteBackend {
        name: name.to_string(),
        num_qubits: 32,
        basis_gates: vec!["cx".into(), "rz".into(), "sx".into(), "x".into()],
        coupling_map: Vec::new(),
        simulator: true,
        operational: true,
    }
}

/// Log output captured from a scoped `tracing` subscriber.
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    /// Everything written so far.
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Run `f` with a debug-level subscriber and return its log output.
pub fn capture_logs<T>(f: impl FnOnce() -> T) -> (T, String) {
    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    let out = tracing::subscriber::with_default(subscriber, f);
    (out, logs.contents())
}

/// Line-oriented reader for the small OpenQASM 2.0 subset used in tests:
/// `qreg`, `creg`, gates, `measure`, `barrier`, `reset` and `if(c==v)`
/// prefixes.
pub fn parse_test_qasm(source: &str) -> Result<Circuit, EngineError> {
    let invalid = |msg: String| EngineError::InvalidCircuit(format!("Invalid QASM input: {msg}"));

    let mut statements = source
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty() && !s.starts_with("//"));
    match statements.next() {
        Some(header) if header.starts_with("OPENQASM") => {}
        _ => return Err(invalid("missing OPENQASM header".into())),
    }

    let mut qregs: Vec<Register> = Vec::new();
    let mut cregs: Vec<Register> = Vec::new();
    let mut instructions = Vec::new();

    for stmt in statements {
        if stmt.starts_with("include") {
            continue;
        }
        let (condition, stmt) = match stmt.strip_prefix("if") {
            Some(rest) => {
                let (test, body) = rest
                    .trim_start()
                    .strip_prefix('(')
                    .and_then(|r| r.split_once(')'))
                    .ok_or_else(|| invalid(format!("bad condition '{stmt}'")))?;
                let (reg, value) = test
                    .split_once("==")
                    .ok_or_else(|| invalid(format!("bad condition '{stmt}'")))?;
                let clbits = resolve(&cregs, reg.trim())
                    .ok_or_else(|| invalid(format!("unknown register '{reg}'")))?;
                let value: u64 = value
                    .trim()
                    .parse()
                    .map_err(|_| invalid(format!("bad condition value in '{stmt}'")))?;
                (Some((clbits, value)), body.trim())
            }
            None => (None, stmt),
        };
        let first_new = instructions.len();

        let (head, rest) = stmt.split_once(char::is_whitespace).unwrap_or((stmt, ""));
        let rest = rest.trim();
        match head {
            "qreg" | "creg" => {
                let (name, size) = parse_operand(rest)
                    .ok_or_else(|| invalid(format!("bad declaration '{stmt}'")))?;
                let size =
                    size.ok_or_else(|| invalid(format!("register '{name}' needs a size")))?;
                let reg = Register::new(name, size);
                if head == "qreg" {
                    qregs.push(reg);
                } else {
                    cregs.push(reg);
                }
            }
            "measure" => {
                let (src, dst) = rest
                    .split_once("->")
                    .ok_or_else(|| invalid(format!("bad measure '{stmt}'")))?;
                let qubits = resolve(&qregs, src.trim())
                    .ok_or_else(|| invalid(format!("unknown operand '{src}'")))?;
                let clbits = resolve(&cregs, dst.trim())
                    .ok_or_else(|| invalid(format!("unknown operand '{dst}'")))?;
                for (q, c) in qubits.into_iter().zip(clbits) {
                    instructions.push(Instruction::measure(q, c));
                }
            }
            "barrier" => {
                let qubits = resolve_all(&qregs, rest)
                    .ok_or_else(|| invalid(format!("bad barrier '{stmt}'")))?;
                instructions.push(Instruction::barrier(qubits));
            }
            "reset" => {
                let qubits =
                    resolve(&qregs, rest).ok_or_else(|| invalid(format!("bad reset '{stmt}'")))?;
                for q in qubits {
                    instructions.push(Instruction::reset(q));
                }
            }
            _ => {
                // Gate application: name[(params)] operands
                let (name, params) = match head.split_once('(') {
                    Some((name, params)) => {
                        let params: Vec<f64> = params
                            .trim_end_matches(')')
                            .split(',')
                            .filter_map(|p| p.trim().parse().ok())
                            .collect();
                        (name, params)
                    }
                    None => (head, Vec::new()),
                };
                let valid_name = name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
                if !valid_name || rest.is_empty() {
                    return Err(invalid(format!("cannot parse '{stmt}'")));
                }
                let qubits = resolve_all(&qregs, rest)
                    .ok_or_else(|| invalid(format!("unknown operands in '{stmt}'")))?;
                instructions.push(Instruction::gate(name, qubits, params));
            }
        }

        if let Some((clbits, value)) = condition {
            for inst in &mut instructions[first_new..] {
                inst.condition = Some(Condition {
                    clbits: clbits.clone(),
                    value,
                });
            }
        }
    }

    Ok(Circuit::from_parts(qregs, cregs, instructions))
}

fn parse_operand(operand: &str) -> Option<(&str, Option<usize>)> {
    match operand.split_once('[') {
        Some((name, idx)) => {
            let index = idx.trim_end_matches(']').trim().parse().ok()?;
            Some((name.trim(), Some(index)))
        }
        None if !operand.is_empty() => Some((operand, None)),
        None => None,
    }
}

/// Global bit indices of one operand (`r[i]` or a whole register `r`).
fn resolve(registers: &[Register], operand: &str) -> Option<Vec<usize>> {
    let (name, index) = parse_operand(operand)?;
    let mut offset = 0;
    for reg in registers {
        if reg.name == name {
            return Some(match index {
                Some(i) => vec![offset + i],
                None => (offset..offset + reg.size).collect(),
            });
        }
        offset += reg.size;
    }
    None
}

fn resolve_all(registers: &[Register], operands: &str) -> Option<Vec<usize>> {
    let mut bits = Vec::new();
    for operand in operands.split(',') {
        bits.extend(resolve(registers, operand.trim())?);
    }
    Some(bits)
}

/// Engine that answers deterministically without any simulator.
///
/// Counts split the shots between the all-zeros and all-ones outcomes; the
/// statevector is the uniform superposition.
pub struct MockEngine {
    pub name: String,
    transpiled: Mutex<Vec<String>>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::named("mock_local")
    }

    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            transpiled: Mutex::new(Vec::new()),
        }
    }

    /// Backends the engine transpiled for, in call order.
    pub fn transpiled_for(&self) -> Vec<String> {
        self.transpiled.lock().unwrap().clone()
    }
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn reject_measurements(circuit: &Circuit) -> Result<(), EngineError> {
    if circuit.instructions().iter().any(|i| i.operation.is_measure()) {
        return Err(EngineError::ExecutionFailed(
            "cannot compute amplitudes of a circuit with measurements".into(),
        ));
    }
    Ok(())
}

#[async_trait]
impl SimulationEngine for MockEngine {
    fn name(&self) -> &str {
        &self.name
    }

    async fn parse(&self, source: &str) -> Result<Circuit, EngineError> {
        parse_test_qasm(source)
    }

    async fn sample_counts(&self, circuit: &Circuit, shots: u32) -> Result<Counts, EngineError> {
        let width = circuit.num_clbits();
        let mut counts = Counts::new();
        if width == 0 {
            return Ok(counts);
        }
        let zeros = u64::from(shots / 2);
        let ones = u64::from(shots) - zeros;
        if zeros > 0 {
            counts.insert("0".repeat(width), zeros);
        }
        if ones > 0 {
            counts.insert("1".repeat(width), ones);
        }
        Ok(counts)
    }

    async fn statevector(&self, circuit: &Circuit) -> Result<Vec<Complex64>, EngineError> {
        reject_measurements(circuit)?;
        let dim = 1usize << circuit.num_qubits();
        let amp = 1.0 / (dim as f64).sqrt();
        Ok(vec![Complex64::new(amp, 0.0); dim])
    }

    async fn probabilities(&self, circuit: &Circuit) -> Result<Probabilities, EngineError> {
        reject_measurements(circuit)?;
        let n = circuit.num_qubits();
        let dim = 1usize << n;
        let p = 1.0 / dim as f64;
        Ok((0..dim).map(|i| (format!("{i:0n$b}"), p)).collect())
    }

    async fn transpile(
        &self,
        circuit: &Circuit,
        backend: &RemoteBackend,
    ) -> Result<TranspiledCircuit, EngineError> {
        self.transpiled.lock().unwrap().push(backend.name.clone());
        Ok(TranspiledCircuit {
            qasm: "OPENQASM 3.0;".to_string(),
            num_qubits: circuit.num_qubits(),
            num_clbits: circuit.num_clbits(),
            cregs: circuit.cregs().to_vec(),
        })
    }

    async fn health_check(&self) -> Result<HealthStatus, EngineError> {
        Ok(HealthStatus::Healthy)
    }
}

/// Engine that parses but fails every execution.
pub struct FailingEngine;

#[async_trait]
impl SimulationEngine for FailingEngine {
    fn name(&self) -> &str {
        "failing_engine"
    }

    async fn parse(&self, source: &str) -> Result<Circuit, EngineError> {
        parse_test_qasm(source)
    }

    async fn sample_counts(&self, _circuit: &Circuit, _shots: u32) -> Result<Counts, EngineError> {
        Err(EngineError::ExecutionFailed(
            "Error during local Aer simulation: mock failure".to_string(),
        ))
    }

    async fn statevector(&self, _circuit: &Circuit) -> Result<Vec<Complex64>, EngineError> {
        Err(EngineError::ExecutionFailed("mock failure".to_string()))
    }

    async fn probabilities(&self, _circuit: &Circuit) -> Result<Probabilities, EngineError> {
        Err(EngineError::ExecutionFailed("mock failure".to_string()))
    }

    async fn transpile(
        &self,
        _circuit: &Circuit,
        _backend: &RemoteBackend,
    ) -> Result<TranspiledCircuit, EngineError> {
        Err(EngineError::Transpilation("mock failure".to_string()))
    }

    async fn health_check(&self) -> Result<HealthStatus, EngineError> {
        Err(EngineError::Unavailable("mock engine unavailable".to_string()))
    }
}

/// In-memory remote service.
pub struct MockRemoteService {
    backends: Vec<RemoteBackend>,
    list_error: Option<RemoteError>,
    run_error: Option<RemoteError>,
    payload: RemotePayload,
    runs: Mutex<Vec<String>>,
}

impl MockRemoteService {
    /// Service listing `backends`; jobs return an even split of `0` and `3`.
    pub fn new(backends: Vec<RemoteBackend>) -> Self {
        Self {
            backends,
            list_error: None,
            run_error: None,
            payload: RemotePayload::QuasiDistribution(
                [("0".to_string(), 0.5), ("3".to_string(), 0.5)].into(),
            ),
            runs: Mutex::new(Vec::new()),
        }
    }

    pub fn with_list_error(mut self, error: RemoteError) -> Self {
        self.list_error = Some(error);
        self
    }

    pub fn with_run_error(mut self, error: RemoteError) -> Self {
        self.run_error = Some(error);
        self
    }

    pub fn with_payload(mut self, payload: RemotePayload) -> Self {
        self.payload = payload;
        self
    }

    /// Backends jobs were submitted to, in call order.
    pub fn runs(&self) -> Vec<String> {
        self.runs.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteService for MockRemoteService {
    fn name(&self) -> &str {
        "mock_remote"
    }

    async fn operational_simulators(&self) -> Result<Vec<RemoteBackend>, RemoteError> {
        if let Some(e) = &self.list_error {
            return Err(e.clone());
        }
        Ok(self
            .backends
            .iter()
            .filter(|b| b.simulator && b.operational)
            .cloned()
            .collect())
    }

    async fn resolve_backend(&self, name: &str) -> Result<RemoteBackend, RemoteError> {
        let backend = self
            .backends
            .iter()
            .find(|b| b.name == name)
            .ok_or_else(|| RemoteError::BackendNotFound(name.to_string()))?;
        if !backend.operational {
            return Err(RemoteError::BackendUnavailable(name.to_string()));
        }
        Ok(backend.clone())
    }

    async fn run(
        &self,
        backend: &RemoteBackend,
        _circuit: &TranspiledCircuit,
        _shots: u32,
    ) -> Result<RemoteJobResult, RemoteError> {
        self.runs.lock().unwrap().push(backend.name.clone());
        if let Some(e) = &self.run_error {
            return Err(e.clone());
        }
        Ok(RemoteJobResult {
            job_id: "mock-remote-job".to_string(),
            payload: self.payload.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_test_qasm_registers() {
        let c = parse_test_qasm(
            "OPENQASM 2.0; include \"qelib1.inc\"; qreg a[2]; qreg b[1]; creg c[3]; \
             h a[0]; cx a[1],b[0]; rz(0.5) b[0]; measure b[0] -> c[2];",
        )
        .unwrap();
        assert_eq!(c.num_qubits(), 3);
        assert_eq!(c.num_clbits(), 3);
        let m = c.measurements();
        assert_eq!((m[0].qubit, m[0].clbit), (2, 2));
        assert_eq!(c.instructions()[1].qubits, vec![1, 2]);
    }

    #[test]
    fn test_parse_test_qasm_whole_register_measure() {
        let c = parse_test_qasm("OPENQASM 2.0; qreg q[2]; creg c[2]; measure q -> c;").unwrap();
        assert_eq!(c.measurements().len(), 2);
    }

    #[test]
    fn test_parse_test_qasm_condition() {
        let c = parse_test_qasm(
            "OPENQASM 2.0; qreg q[2]; creg c[2]; measure q[0] -> c[0]; if(c==1) x q[1];",
        )
        .unwrap();
        let cond = c.instructions()[1].condition.as_ref().unwrap();
        assert_eq!(cond.clbits, vec![0, 1]);
        assert_eq!(cond.value, 1);
        assert!(c.instructions()[0].condition.is_none());
    }

    #[test]
    fn test_capture_logs() {
        let (value, logs) = capture_logs(|| {
            tracing::warn!(answer = 42, "captured");
            7
        });
        assert_eq!(value, 7);
        assert!(logs.contains("captured"));
        assert!(logs.contains("answer=42"));
    }

    #[test]
    fn test_parse_test_qasm_rejects_garbage() {
        assert!(matches!(
            parse_test_qasm("this is not qasm"),
            Err(EngineError::InvalidCircuit(_))
        ));
        assert!(parse_test_qasm("OPENQASM 2.0; qreg q[1]; h r[0];").is_err());
    }
}
