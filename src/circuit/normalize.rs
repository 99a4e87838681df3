// Copyright 2026 QSim Gateway Contributors
// SPDX-License-Identifier: Apache-2.0

//! Circuit normalization.
//!
//! Two entry points, one per request family:
//!
//! - [`prepare_for_sampling`]: makes sure a circuit yields classical
//!   outcomes. Circuits without any measurement get a fresh `c_auto`
//!   register and a measurement of every qubit. Circuits that already
//!   measure are left exactly as written.
//! - [`prepare_for_amplitudes`]: strips final measurements so the engine can
//!   compute a statevector, and enforces the qubit ceiling.

use std::collections::HashSet;

use tracing::{debug, info, warn};

use super::{Circuit, Operation};
use crate::error::ValidationError;

/// Name of the classical register allocated for implicit measurements.
pub const AUTO_CREG_NAME: &str = "c_auto";

/// Non-fatal findings reported while preparing a circuit for sampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Diagnostic {
    /// A measurement targets a classical bit at or beyond the declared
    /// classical-bit count.
    ClbitMismatch {
        /// Highest classical-bit index targeted by a measurement
        max_measured_clbit: usize,
        /// Declared classical-bit count
        num_clbits: usize,
    },
    /// The circuit has no qubits, so no measurements could be added.
    NoQubits,
}

/// What the sampling normalizer did to the circuit.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingPlan {
    /// Circuit ready for execution
    pub circuit: Circuit,
    /// Whether measurements were appended
    pub measurements_added: bool,
    /// Non-fatal findings
    pub diagnostics: Vec<Diagnostic>,
}

/// Prepare a circuit for a counts-producing run.
pub fn prepare_for_sampling(mut circuit: Circuit) -> SamplingPlan {
    let mut diagnostics = Vec::new();

    if circuit.has_measurements() {
        debug!("Circuit already contains measurement operations");
        if let Some(max_measured_clbit) = circuit.max_measured_clbit() {
            let num_clbits = circuit.num_clbits();
            if num_clbits <= max_measured_clbit {
                warn!(
                    max_measured_clbit,
                    num_clbits, "Circuit measures beyond its declared classical bits"
                );
                diagnostics.push(Diagnostic::ClbitMismatch {
                    max_measured_clbit,
                    num_clbits,
                });
            }
        }
        return SamplingPlan {
            circuit,
            measurements_added: false,
            diagnostics,
        };
    }

    let num_qubits = circuit.num_qubits();
    if num_qubits == 0 {
        info!("Circuit has no qubits, cannot add measurements");
        diagnostics.push(Diagnostic::NoQubits);
        return SamplingPlan {
            circuit,
            measurements_added: false,
            diagnostics,
        };
    }

    debug!(
        num_qubits,
        previous_clbits = circuit.num_clbits(),
        "No measurements found, measuring every qubit into '{AUTO_CREG_NAME}'"
    );
    circuit.replace_classical_registers(AUTO_CREG_NAME, num_qubits);
    let instructions = circuit.instructions_mut();
    instructions.reserve(num_qubits);
    for qubit in 0..num_qubits {
        instructions.push(super::Instruction::measure(qubit, qubit));
    }

    SamplingPlan {
        circuit,
        measurements_added: true,
        diagnostics,
    }
}

/// Prepare a circuit for statevector or probability computation.
///
/// Final measurements and final barriers are removed. A measurement is final
/// when no later operation (other than another final measurement or barrier)
/// touches its qubit and no later condition reads its classical bit.
/// Classical registers are dropped once nothing writes or reads them any more.
pub fn prepare_for_amplitudes(
    mut circuit: Circuit,
    max_qubits: usize,
) -> Result<Circuit, ValidationError> {
    let num_qubits = circuit.num_qubits();
    if num_qubits == 0 {
        return Err(ValidationError::Field {
            field: "qasm".into(),
            message: "circuit has no qubits".into(),
        });
    }
    if num_qubits > max_qubits {
        return Err(ValidationError::ResourceLimit {
            resource: "num_qubits".into(),
            limit: max_qubits as u64,
            requested: num_qubits as u64,
        });
    }

    let removed = remove_final_measurements(&mut circuit);
    if removed > 0 {
        debug!(removed, "Stripped final measurements");
    }
    Ok(circuit)
}

fn remove_final_measurements(circuit: &mut Circuit) -> usize {
    let num_qubits = circuit.num_qubits();
    let instructions = circuit.instructions_mut();

    // busy[q]: some kept operation follows on qubit q.
    let mut busy = vec![false; num_qubits];
    // Classical bits read by a later kept condition.
    let mut read: HashSet<usize> = HashSet::new();
    let mut keep = vec![true; instructions.len()];

    for (idx, inst) in instructions.iter().enumerate().rev() {
        let trailing = inst.qubits.iter().all(|&q| !busy.get(q).copied().unwrap_or(true))
            && inst.clbits.iter().all(|c| !read.contains(c));
        match inst.operation {
            Operation::Measure | Operation::Barrier if trailing && inst.condition.is_none() => {
                keep[idx] = false
            }
            _ => {
                for &q in &inst.qubits {
                    if let Some(slot) = busy.get_mut(q) {
                        *slot = true;
                    }
                }
                read.extend(inst.condition_clbits());
            }
        }
    }

    let before = instructions.len();
    let mut flags = keep.into_iter();
    instructions.retain(|_| flags.next().unwrap_or(true));
    let removed_measures = before - instructions.len();

    if instructions
        .iter()
        .all(|inst| inst.clbits.is_empty() && inst.condition.is_none())
    {
        circuit.clear_classical_registers();
    }
    removed_measures
}
