// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Per-crate debug flags
//!
//! Understands `--debug-modnet-engine`, `--debug-all` and the `MODNET_DEBUG`
//! environment variable.

use std::collections::BTreeSet;
use std::env;

use crate::KNOWN_CRATES;

/// Environment variable holding `all` or a comma-separated crate list
pub const DEBUG_ENV: &str = "MODNET_DEBUG";

/// Crates whose logs should be raised to debug level
///
/// # Example
/// ```rust
/// use modnet_observability::CrateDebugFlags;
///
/// let flags = CrateDebugFlags::from_args(vec!["--debug-modnet-engine".to_string()]);
/// assert!(flags.is_enabled("modnet-engine"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrateDebugFlags {
    enabled: BTreeSet<String>,
}

impl CrateDebugFlags {
    /// Collect `--debug-{crate}` arguments; `--debug-all` enables every known crate
    pub fn from_args<I>(args: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut flags = Self::default();
        for arg in args {
            if arg == "--debug-all" {
                flags.enable_all();
            } else if let Some(crate_name) = arg.strip_prefix("--debug-") {
                flags.enable(crate_name);
            }
        }
        flags
    }

    /// Merge an environment-style value (`all` or `a,b,c`)
    pub fn merge_env_value(&mut self, value: &str) {
        if value.trim() == "all" {
            self.enable_all();
            return;
        }
        for crate_name in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            self.enable(crate_name);
        }
    }

    pub fn enable(&mut self, crate_name: &str) {
        self.enabled.insert(crate_name.to_string());
    }

    pub fn enable_all(&mut self) {
        for crate_name in KNOWN_CRATES {
            self.enable(crate_name);
        }
    }

    pub fn is_enabled(&self, crate_name: &str) -> bool {
        self.enabled.contains(crate_name)
    }

    pub fn enabled_crates(&self) -> impl Iterator<Item = &str> {
        self.enabled.iter().map(String::as_str)
    }

    pub fn any_enabled(&self) -> bool {
        !self.enabled.is_empty()
    }

    /// `DEBUG` for flagged crates, `INFO` otherwise
    pub fn log_level(&self, crate_name: &str) -> tracing::Level {
        if self.is_enabled(crate_name) {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }

    /// `EnvFilter` directive with `info` as the base level
    pub fn to_filter_string(&self) -> String {
        self.to_filter_string_with_base("info")
    }

    /// `EnvFilter` directive, e.g. `modnet-engine=debug,warn`
    pub fn to_filter_string_with_base(&self, base_level: &str) -> String {
        let mut filters: Vec<String> = self
            .enabled
            .iter()
            .map(|crate_name| format!("{}=debug", crate_name))
            .collect();
        filters.push(base_level.to_string());
        filters.join(",")
    }
}

/// Debug flags from the process arguments plus `MODNET_DEBUG`
pub fn parse_debug_flags() -> CrateDebugFlags {
    let mut flags = CrateDebugFlags::from_args(env::args());
    if let Ok(value) = env::var(DEBUG_ENV) {
        flags.merge_env_value(&value);
    }
    flags
}

/// Help text for the debug flags
pub fn debug_flags_help() -> String {
    format!(
        r#"Debug Flags:
  --debug-all                    Enable debug logging for all crates
  --debug-{{crate-name}}          Enable debug logging for one crate

Available crates:
  {}

Environment Variable:
  {env}={{crate-name}}[,{{crate-name}}]
  {env}=all
"#,
        KNOWN_CRATES.join(", "),
        env = DEBUG_ENV
    )
}
