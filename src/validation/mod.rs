// Copyright 2026 QSim Gateway Contributors
// SPDX-License-Identifier: Apache-2.0

//! Input validation for simulation requests.

use crate::config::LimitsConfig;
use crate::error::{Result, ValidationError};

/// Require a non-blank circuit description.
pub fn require_qasm(qasm: Option<String>) -> Result<String> {
    match qasm {
        Some(q) if !q.trim().is_empty() => Ok(q),
        _ => Err(ValidationError::MissingField("qasm".into()).into()),
    }
}

/// Validate the requested shot count, applying the configured default.
pub fn validate_shots(shots: Option<i64>, limits: &LimitsConfig) -> Result<u32> {
    let Some(shots) = shots else {
        return Ok(limits.default_shots);
    };

    if shots <= 0 {
        return Err(ValidationError::Field {
            field: "shots".into(),
            message: "must be greater than 0".into(),
        }
        .into());
    }

    if shots > i64::from(limits.max_shots) {
        return Err(ValidationError::ResourceLimit {
            resource: "shots".into(),
            limit: limits.max_shots as u64,
            requested: shots as u64,
        }
        .into());
    }

    Ok(shots as u32)
}

/// Requested remote backend name, or the configured default when absent or
/// blank.
///
/// Any other string is accepted. A name the remote service does not know
/// fails resolution later and falls back to an operational simulator.
pub fn backend_or_default(backend: Option<String>, default_backend: &str) -> String {
    match backend {
        Some(name) if !name.trim().is_empty() => name.trim().to_string(),
        _ => default_backend.to_string(),
    }
}
