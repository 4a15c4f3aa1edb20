// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Modnet - Modular Neural Networks with Structural Constraints
//!
//! Modnet models a neural network as neurons, synapses and neuron groups,
//! where modules nest into a tree. Groups carry constraints (symmetry,
//! mirrored connectivity, neuron count, weight range, tag synchronisation,
//! randomization) and a resolver repairs the network until every constraint
//! holds.
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! modnet = "0.1"
//! ```
//!
//! ```rust,no_run
//! use modnet::prelude::*;
//!
//! let mut net = ModularNetwork::new();
//! let left = net.create_module("left", Vector3::ZERO, Size2::new(10.0, 10.0));
//! let right = net.create_module("right", Vector3::new(20.0, 0.0, 0.0), Size2::new(10.0, 10.0));
//! net.create_constraint(right, ConstraintKind::Symmetry(SymmetryConstraint::new(left)))?;
//!
//! let config = modnet::config::load_config_or_default(None)?;
//! let mut session = Session::new(net, &config);
//! let report = session.resolve_all();
//! println!("resolved in {} passes: {}", report.iterations, report.success);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Feature Flags
//!
//! - **`file-logging`**: per-run JSON log files with retention cleanup
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  Foundation: modnet-config                              │
//! │  (TOML file, MODNET_* env and CLI overrides)            │
//! └─────────────────────────────────────────────────────────┘
//!                         ↓
//! ┌─────────────────────────────────────────────────────────┐
//! │  Infrastructure: modnet-observability                   │
//! │  (tracing subscriber, per-crate debug flags)            │
//! └─────────────────────────────────────────────────────────┘
//!                         ↓
//! ┌─────────────────────────────────────────────────────────┐
//! │  Algorithms: modnet-engine                              │
//! │  (network graph, constraints, fixpoint resolver)        │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## License
//!
//! Apache-2.0

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Re-export foundation
pub use modnet_config as config;

// Re-export infrastructure
pub use modnet_observability as observability;

// Re-export algorithms
pub use modnet_engine as engine;

/// Prelude - commonly used types and traits
pub mod prelude {
    pub use crate::engine::prelude::*;
    pub use crate::engine::{ConstraintRule, Properties, Trashcan};
    pub use crate::config::ModnetConfig;
}

/// Install the console subscriber described by `config.logging`
///
/// Debug flags come from the process arguments and `MODNET_DEBUG`.
///
/// # Errors
///
/// Fails when the level is not a valid filter directive or a global
/// subscriber is already installed.
pub fn init_logging_from_config(config: &config::ModnetConfig) -> anyhow::Result<()> {
    let flags = observability::parse_debug_flags();
    let logging = observability::LoggingConfig::from_parts(&config.logging.level, &config.logging.format);
    observability::init_logging(&flags, &logging)?;
    tracing::debug!(
        target: "modnet",
        "Logging initialised (level {}, format {})",
        logging.level,
        logging.format
    );
    Ok(())
}
