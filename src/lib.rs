// Copyright 2026 QSim Gateway Contributors
// SPDX-License-Identifier: Apache-2.0

//! QSim Gateway
//!
//! An HTTP gateway for quantum circuit simulation. Clients post OpenQASM 2.0
//! circuits and get back measurement counts, a statevector or basis-state
//! probabilities. Sampling requests run on IBM Qiskit Runtime when it is
//! configured and reachable, and on a local Aer simulator otherwise.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │            REST API (axum)              │
//! ├──────────────────┬──────────────────────┤
//! │   Normalizer     │   Backend Selector   │
//! ├──────────────────┼──────────────────────┤
//! │ Qiskit / Aer     │  Qiskit Runtime      │
//! │ (PyO3)           │  (reqwest)           │
//! └──────────────────┴──────────────────────┘
//! ```
//!
//! # Features
//!
//! - `python`: the Qiskit/Aer engine in [`engine::qiskit`]. It is off by
//!   default so the library builds without a Python toolchain, but the
//!   `qsim-gateway serve` binary needs it: build with
//!   `cargo build --release --features python`.
//!
//! # Modules
//!
//! - [`circuit`]: Circuit model and normalization
//! - [`engine`]: Parser, transpiler and local simulator trait
//! - [`remote`]: Remote simulation service trait and IBM client
//! - [`selector`]: Remote/local backend selection
//! - [`shaper`]: Result shaping for JSON transport
//! - [`server`]: REST server
//! - [`config`]: Configuration management
//! - [`validation`]: Input validation utilities
//! - [`error`]: Error types

pub mod circuit;
pub mod config;
pub mod engine;
pub mod error;
pub mod remote;
pub mod selector;
pub mod server;
pub mod shaper;
pub mod validation;

pub use config::Config;
pub use error::{Error, Result};

#[cfg(test)]
pub mod test_utils;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
