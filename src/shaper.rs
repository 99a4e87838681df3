// Copyright 2026 QSim Gateway Contributors
// SPDX-License-Identifier: Apache-2.0

//! Result shaping.
//!
//! Converts whatever a backend hands back into the JSON contract of the
//! HTTP API: bitstring counts, `[re, im]` statevector pairs and sparse
//! probability maps.

use num_complex::Complex64;
use std::collections::BTreeMap;

use crate::engine::{Counts, TranspiledCircuit};
use crate::error::RemoteError;
use crate::remote::RemotePayload;

/// Turn a remote payload into bitstring counts.
pub fn remote_counts(
    payload: RemotePayload,
    shots: u32,
    circuit: &TranspiledCircuit,
) -> Result<Counts, RemoteError> {
    match payload {
        RemotePayload::QuasiDistribution(dist) => {
            quasi_to_counts(&dist, shots, circuit.result_width())
        }
        RemotePayload::Samples(samples) => samples_to_counts(&samples, circuit),
        RemotePayload::Counts(counts) => Ok(counts),
    }
}

/// Scale a quasi-distribution to counts.
///
/// Keys are integer-encoded basis states, decimal or `0x` hex. Each becomes
/// a binary string zero-padded to `width`; each value becomes
/// `round(value * shots)`. Non-positive counts (quasi-probabilities may be
/// slightly negative) are dropped.
pub fn quasi_to_counts(
    dist: &BTreeMap<String, f64>,
    shots: u32,
    width: usize,
) -> Result<Counts, RemoteError> {
    let mut counts = Counts::new();
    for (key, &value) in dist {
        let index = parse_basis_index(key).ok_or_else(|| {
            RemoteError::MalformedResult(format!(
                "quasi-distribution key '{key}' is not an integer"
            ))
        })?;
        let count = (value * f64::from(shots)).round();
        if count >= 1.0 {
            *counts.entry(to_bitstring(index, width)).or_insert(0) += count as u64;
        }
    }
    Ok(counts)
}

/// Tally per-shot hex samples into counts.
///
/// Registers are ordered as declared in the transpiled circuit and joined
/// with spaces, last register first.
pub fn samples_to_counts(
    samples: &BTreeMap<String, Vec<String>>,
    circuit: &TranspiledCircuit,
) -> Result<Counts, RemoteError> {
    let layout: Vec<(&str, usize)> = if circuit.cregs.is_empty() {
        match samples.keys().next() {
            Some(name) if samples.len() == 1 => vec![(name.as_str(), circuit.result_width())],
            _ => {
                return Err(RemoteError::MalformedResult(
                    "cannot attribute samples to classical registers".to_string(),
                ))
            }
        }
    } else {
        circuit
            .cregs
            .iter()
            .rev()
            .map(|r| (r.name.as_str(), r.size))
            .collect()
    };

    let mut columns = Vec::with_capacity(layout.len());
    for (name, width) in &layout {
        let column = samples.get(*name).ok_or_else(|| {
            RemoteError::MalformedResult(format!("no samples for register '{name}'"))
        })?;
        columns.push((column, *width));
    }

    let num_shots = columns.first().map(|(c, _)| c.len()).unwrap_or(0);
    if columns.iter().any(|(c, _)| c.len() != num_shots) {
        return Err(RemoteError::MalformedResult(
            "registers report different shot counts".to_string(),
        ));
    }

    let mut counts = Counts::new();
    for shot in 0..num_shots {
        let mut parts = Vec::with_capacity(columns.len());
        for (column, width) in &columns {
            let sample = &column[shot];
            let index = parse_hex(sample).ok_or_else(|| {
                RemoteError::MalformedResult(format!("sample '{sample}' is not hexadecimal"))
            })?;
            parts.push(to_bitstring(index, *width));
        }
        *counts.entry(parts.join(" ")).or_insert(0) += 1;
    }
    Ok(counts)
}

/// Serialize amplitudes as `[re, im]` pairs in index order.
pub fn statevector_pairs(amplitudes: &[Complex64]) -> Vec<[f64; 2]> {
    amplitudes.iter().map(|a| [a.re, a.im]).collect()
}

fn parse_basis_index(key: &str) -> Option<u128> {
    let key = key.trim();
    match key.strip_prefix("0x").or_else(|| key.strip_prefix("0X")) {
        Some(hex) => u128::from_str_radix(hex, 16).ok(),
        None => key.parse().ok(),
    }
}

fn parse_hex(sample: &str) -> Option<u128> {
    let sample = sample.trim();
    let hex = sample
        .strip_prefix("0x")
        .or_else(|| sample.strip_prefix("0X"))
        .unwrap_or(sample);
    u128::from_str_radix(hex, 16).ok()
}

fn to_bitstring(index: u128, width: usize) -> String {
    format!("{index:0width$b}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::Register;

    fn transpiled(num_qubits: usize, cregs: &[(&str, usize)]) -> TranspiledCircuit {
        let cregs: Vec<Register> = cregs.iter().map(|(n, s)| Register::new(*n, *s)).collect();
        TranspiledCircuit {
            qasm: String::new(),
            num_qubits,
            num_clbits: cregs.iter().map(|r| r.size).sum(),
            cregs,
        }
    }

    fn dist(entries: &[(&str, f64)]) -> BTreeMap<String, f64> {
        entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_quasi_decimal_keys() {
        let counts = quasi_to_counts(&dist(&[("0", 0.5), ("3", 0.5)]), 1024, 2).unwrap();
        assert_eq!(counts["00"], 512);
        assert_eq!(counts["11"], 512);
    }

    #[test]
    fn test_quasi_hex_keys_and_padding() {
        let counts = quasi_to_counts(&dist(&[("0x1", 0.25), ("0x4", 0.75)]), 100, 5).unwrap();
        assert_eq!(counts["00001"], 25);
        assert_eq!(counts["00100"], 75);
    }

    #[test]
    fn test_quasi_rounds_to_nearest() {
        let counts = quasi_to_counts(&dist(&[("0", 0.3337), ("1", 0.6663)]), 1000, 1).unwrap();
        assert_eq!(counts["0"], 334);
        assert_eq!(counts["1"], 666);
    }

    #[test]
    fn test_quasi_drops_negative_and_zero() {
        let counts =
            quasi_to_counts(&dist(&[("0", 1.0002), ("1", -0.0002), ("2", 0.0001)]), 100, 2)
                .unwrap();
        assert_eq!(counts.len(), 1);
        assert_eq!(counts["00"], 100);
    }

    #[test]
    fn test_quasi_rejects_non_integer_keys() {
        let err = quasi_to_counts(&dist(&[("01", 0.5), ("ab", 0.5)]), 10, 2).unwrap_err();
        assert!(matches!(err, RemoteError::MalformedResult(_)));
    }

    #[test]
    fn test_remote_counts_width_falls_back_to_qubits() {
        let circuit = transpiled(3, &[]);
        let counts = remote_counts(
            RemotePayload::QuasiDistribution(dist(&[("5", 1.0)])),
            10,
            &circuit,
        )
        .unwrap();
        assert_eq!(counts["101"], 10);
    }

    #[test]
    fn test_samples_single_register() {
        let circuit = transpiled(2, &[("c", 2)]);
        let samples = BTreeMap::from([(
            "c".to_string(),
            vec!["0x0".to_string(), "0x3".to_string(), "0x3".to_string()],
        )]);
        let counts = samples_to_counts(&samples, &circuit).unwrap();
        assert_eq!(counts["00"], 1);
        assert_eq!(counts["11"], 2);
    }

    #[test]
    fn test_samples_multiple_registers_last_first() {
        let circuit = transpiled(3, &[("a", 1), ("b", 2)]);
        let samples = BTreeMap::from([
            ("a".to_string(), vec!["0x1".to_string()]),
            ("b".to_string(), vec!["0x2".to_string()]),
        ]);
        let counts = samples_to_counts(&samples, &circuit).unwrap();
        assert_eq!(counts["10 1"], 1);
    }

    #[test]
    fn test_samples_missing_register() {
        let circuit = transpiled(2, &[("c", 2)]);
        let samples = BTreeMap::from([("meas".to_string(), vec!["0x0".to_string()])]);
        assert!(samples_to_counts(&samples, &circuit).is_err());
    }

    #[test]
    fn test_samples_without_declared_registers() {
        let circuit = transpiled(2, &[]);
        let samples = BTreeMap::from([("meas".to_string(), vec!["0x2".to_string()])]);
        let counts = samples_to_counts(&samples, &circuit).unwrap();
        assert_eq!(counts["10"], 1);
    }

    #[test]
    fn test_counts_pass_through() {
        let circuit = transpiled(2, &[("c", 2)]);
        let raw = Counts::from([("01".to_string(), 7)]);
        let counts = remote_counts(RemotePayload::Counts(raw.clone()), 7, &circuit).unwrap();
        assert_eq!(counts, raw);
    }

    #[test]
    fn test_statevector_pairs() {
        let sv = vec![
            Complex64::new(std::f64::consts::FRAC_1_SQRT_2, 0.0),
            Complex64::new(0.0, -std::f64::consts::FRAC_1_SQRT_2),
        ];
        let pairs = statevector_pairs(&sv);
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[1], [0.0, -std::f64::consts::FRAC_1_SQRT_2]);
    }
}
