// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration type definitions
//!
//! Each struct maps to one section of `modnet_configuration.toml`. Every
//! section is optional; missing keys take the defaults below.

use serde::{Deserialize, Serialize};

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ModnetConfig {
    pub resolver: ResolverConfig,
    pub geometry: GeometryConfig,
    pub logging: LoggingConfig,
}

/// Fixpoint driver settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Upper bound on outer resolver passes
    pub max_iterations: usize,
    /// Inner retries per group and pass
    pub group_retry_budget: usize,
    /// Keep only the diagnostics of the final pass
    pub collect_only_last_run: bool,
    /// Refuse to run when any constraint fails its validity check
    pub verify_before_run: bool,
    /// Seed for random sign decisions, 0 = seed from entropy
    pub random_seed: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            group_retry_budget: 1,
            collect_only_last_run: false,
            verify_before_run: true,
            random_seed: 0,
        }
    }
}

/// Geometric comparison settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct GeometryConfig {
    /// Coordinates closer than this are considered equal
    pub position_tolerance: f64,
}

impl Default for GeometryConfig {
    fn default() -> Self {
        Self {
            position_tolerance: 0.1,
        }
    }
}

/// Log output settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}
