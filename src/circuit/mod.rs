// Copyright 2026 QSim Gateway Contributors
// SPDX-License-Identifier: Apache-2.0

//! Register-level circuit model.
//!
//! A [`Circuit`] is what the gateway sees of a parsed program: named quantum
//! and classical registers and an ordered list of instructions over flat,
//! circuit-global qubit and classical-bit indices. The simulation engine
//! builds it from source text and consumes it again for execution; the
//! [`normalize`] module is the only place that edits it.
//!
//! Gate semantics are opaque here. A gate is a name plus numeric
//! parameters, interpreted only by the engine.

pub mod normalize;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::EngineError;

/// Circuit construction errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CircuitError {
    /// Qubit index out of range
    #[error("qubit index {index} out of range for {num_qubits} qubits")]
    QubitOutOfRange { index: usize, num_qubits: usize },

    /// Classical bit index out of range
    #[error("classical bit index {index} out of range for {num_clbits} classical bits")]
    ClbitOutOfRange { index: usize, num_clbits: usize },

    /// Register declared twice
    #[error("duplicate register name '{0}'")]
    DuplicateRegister(String),
}

impl From<CircuitError> for EngineError {
    fn from(e: CircuitError) -> Self {
        EngineError::InvalidCircuit(e.to_string())
    }
}

/// A named register of qubits or classical bits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Register {
    /// Register name as declared in the source
    pub name: String,
    /// Number of bits
    pub size: usize,
}

impl Register {
    /// Create a register.
    pub fn new(name: impl Into<String>, size: usize) -> Self {
        Self {
            name: name.into(),
            size,
        }
    }
}

/// An operation applied by an instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Operation {
    /// Unitary gate, identified by its standard name (e.g. `h`, `cx`, `rz`)
    Gate { name: String, params: Vec<f64> },
    /// Computational-basis measurement of one qubit into one classical bit
    Measure,
    /// Scheduling barrier
    Barrier,
    /// Reset to |0>
    Reset,
}

impl Operation {
    /// Standard name of the operation.
    pub fn name(&self) -> &str {
        match self {
            Operation::Gate { name, .. } => name,
            Operation::Measure => "measure",
            Operation::Barrier => "barrier",
            Operation::Reset => "reset",
        }
    }

    /// Whether this is a measurement.
    pub fn is_measure(&self) -> bool {
        matches!(self, Operation::Measure)
    }
}

/// Classical control: the instruction runs only when the bits read as
/// `value` (little-endian, first bit least significant).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    /// Circuit-global classical-bit indices compared against `value`
    pub clbits: Vec<usize>,
    /// Compared value
    pub value: u64,
}

/// One operation with its qubit and classical-bit operands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    /// The operation
    pub operation: Operation,
    /// Circuit-global qubit indices
    pub qubits: Vec<usize>,
    /// Circuit-global classical-bit indices
    #[serde(default)]
    pub clbits: Vec<usize>,
    /// Classical condition (`if (c == v)`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
}

impl Instruction {
    /// Gate instruction.
    pub fn gate(name: impl Into<String>, qubits: Vec<usize>, params: Vec<f64>) -> Self {
        Self {
            operation: Operation::Gate {
                name: name.into(),
                params,
            },
            qubits,
            clbits: Vec::new(),
            condition: None,
        }
    }

    /// Measurement instruction.
    pub fn measure(qubit: usize, clbit: usize) -> Self {
        Self {
            operation: Operation::Measure,
            qubits: vec![qubit],
            clbits: vec![clbit],
            condition: None,
        }
    }

    /// Barrier instruction.
    pub fn barrier(qubits: Vec<usize>) -> Self {
        Self {
            operation: Operation::Barrier,
            qubits,
            clbits: Vec::new(),
            condition: None,
        }
    }

    /// Reset instruction.
    pub fn reset(qubit: usize) -> Self {
        Self {
            operation: Operation::Reset,
            qubits: vec![qubit],
            clbits: Vec::new(),
            condition: None,
        }
    }

    /// Make the instruction conditional on `clbits` reading `value`.
    pub fn with_condition(mut self, clbits: Vec<usize>, value: u64) -> Self {
        self.condition = Some(Condition { clbits, value });
        self
    }

    /// Classical bits the instruction reads through its condition.
    pub fn condition_clbits(&self) -> &[usize] {
        self.condition
            .as_ref()
            .map(|c| c.clbits.as_slice())
            .unwrap_or(&[])
    }
}

/// A measurement found in a circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Measurement {
    /// Position in the instruction list
    pub position: usize,
    /// Measured qubit
    pub qubit: usize,
    /// Target classical bit
    pub clbit: usize,
}

/// Parsed quantum circuit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Circuit {
    qregs: Vec<Register>,
    cregs: Vec<Register>,
    instructions: Vec<Instruction>,
}

impl Circuit {
    /// Create an empty circuit with no registers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a circuit with one quantum register `q` and, if `num_clbits`
    /// is non-zero, one classical register `c`.
    pub fn with_size(num_qubits: usize, num_clbits: usize) -> Self {
        let mut circuit = Self::new();
        if num_qubits > 0 {
            circuit.qregs.push(Register::new("q", num_qubits));
        }
        if num_clbits > 0 {
            circuit.cregs.push(Register::new("c", num_clbits));
        }
        circuit
    }

    /// Assemble a circuit from parser output.
    ///
    /// Operand indices are taken as given. In particular the classical-bit
    /// invariant is not enforced here: a parser may hand back measurements
    /// that target bits beyond the declared registers, and
    /// [`normalize::prepare_for_sampling`] reports those.
    pub fn from_parts(
        qregs: Vec<Register>,
        cregs: Vec<Register>,
        instructions: Vec<Instruction>,
    ) -> Self {
        Self {
            qregs,
            cregs,
            instructions,
        }
    }

    /// Append a quantum register.
    pub fn add_qreg(
        &mut self,
        name: impl Into<String>,
        size: usize,
    ) -> Result<&mut Self, CircuitError> {
        let name = name.into();
        if self.qregs.iter().any(|r| r.name == name) {
            return Err(CircuitError::DuplicateRegister(name));
        }
        self.qregs.push(Register::new(name, size));
        Ok(self)
    }

    /// Append a classical register.
    pub fn add_creg(
        &mut self,
        name: impl Into<String>,
        size: usize,
    ) -> Result<&mut Self, CircuitError> {
        let name = name.into();
        if self.cregs.iter().any(|r| r.name == name) {
            return Err(CircuitError::DuplicateRegister(name));
        }
        self.cregs.push(Register::new(name, size));
        Ok(self)
    }

    /// Append a gate.
    pub fn gate(
        &mut self,
        name: impl Into<String>,
        qubits: &[usize],
        params: &[f64],
    ) -> Result<&mut Self, CircuitError> {
        self.check_qubits(qubits)?;
        self.instructions
            .push(Instruction::gate(name, qubits.to_vec(), params.to_vec()));
        Ok(self)
    }

    /// Append a measurement of `qubit` into `clbit`.
    pub fn measure(&mut self, qubit: usize, clbit: usize) -> Result<&mut Self, CircuitError> {
        self.check_qubits(&[qubit])?;
        let num_clbits = self.num_clbits();
        if clbit >= num_clbits {
            return Err(CircuitError::ClbitOutOfRange {
                index: clbit,
                num_clbits,
            });
        }
        self.instructions.push(Instruction::measure(qubit, clbit));
        Ok(self)
    }

    /// Append a barrier over `qubits`.
    pub fn barrier(&mut self, qubits: &[usize]) -> Result<&mut Self, CircuitError> {
        self.check_qubits(qubits)?;
        self.instructions.push(Instruction::barrier(qubits.to_vec()));
        Ok(self)
    }

    /// Append a reset of `qubit`.
    pub fn reset(&mut self, qubit: usize) -> Result<&mut Self, CircuitError> {
        self.check_qubits(&[qubit])?;
        self.instructions.push(Instruction::reset(qubit));
        Ok(self)
    }

    fn check_qubits(&self, qubits: &[usize]) -> Result<(), CircuitError> {
        let num_qubits = self.num_qubits();
        match qubits.iter().find(|&&q| q >= num_qubits) {
            Some(&index) => Err(CircuitError::QubitOutOfRange { index, num_qubits }),
            None => Ok(()),
        }
    }

    /// Total number of qubits.
    pub fn num_qubits(&self) -> usize {
        self.qregs.iter().map(|r| r.size).sum()
    }

    /// Total number of classical bits.
    pub fn num_clbits(&self) -> usize {
        self.cregs.iter().map(|r| r.size).sum()
    }

    /// Quantum registers in declaration order.
    pub fn qregs(&self) -> &[Register] {
        &self.qregs
    }

    /// Classical registers in declaration order.
    pub fn cregs(&self) -> &[Register] {
        &self.cregs
    }

    /// Instructions in program order.
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Number of instructions.
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Whether the circuit has no instructions.
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// All measurements in program order.
    pub fn measurements(&self) -> Vec<Measurement> {
        self.instructions
            .iter()
            .enumerate()
            .filter(|(_, inst)| inst.operation.is_measure())
            .filter_map(|(position, inst)| {
                Some(Measurement {
                    position,
                    qubit: *inst.qubits.first()?,
                    clbit: *inst.clbits.first()?,
                })
            })
            .collect()
    }

    /// Whether any measurement is present.
    pub fn has_measurements(&self) -> bool {
        self.instructions.iter().any(|i| i.operation.is_measure())
    }

    /// Highest classical-bit index targeted by a measurement.
    pub fn max_measured_clbit(&self) -> Option<usize> {
        self.measurements().iter().map(|m| m.clbit).max()
    }

    /// Replace every classical register with a single register of `size`
    /// bits. Instructions are left untouched.
    pub(crate) fn replace_classical_registers(&mut self, name: &str, size: usize) {
        self.cregs.clear();
        self.cregs.push(Register::new(name, size));
    }

    /// Drop all classical registers.
    pub(crate) fn clear_classical_registers(&mut self) {
        self.cregs.clear();
    }

    /// Mutable access to the instruction list.
    pub(crate) fn instructions_mut(&mut self) -> &mut Vec<Instruction> {
        &mut self.instructions
    }
}
