// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # modnet-observability
//!
//! Logging setup shared by the modnet crates, with per-crate debug flags.
//!
//! ## Features
//! - `file-logging`: per-run JSON log files with retention cleanup

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod cli;
pub mod config;
pub mod init;

pub use cli::*;
pub use config::*;
pub use init::*;

/// Crate names usable as log targets and debug flags
pub const KNOWN_CRATES: &[&str] = &[
    "modnet",
    "modnet-engine",
    "modnet-config",
    "modnet-observability",
];
