// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration file loading with override support
//!
//! Values are layered in three tiers, later tiers winning:
//! 1. TOML file
//! 2. Environment variables (`MODNET_*`)
//! 3. CLI arguments

use crate::{ConfigError, ConfigResult, ModnetConfig};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// File name searched for when no explicit path is given
pub const CONFIG_FILE_NAME: &str = "modnet_configuration.toml";

/// Environment variable naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "MODNET_CONFIG_PATH";

/// Find the configuration file
///
/// Search order:
/// 1. `MODNET_CONFIG_PATH` environment variable
/// 2. Current working directory
/// 3. Up to 5 parent directories
///
/// # Errors
///
/// Returns `ConfigError::FileNotFound` if no config file exists in any location
pub fn find_config_file() -> ConfigResult<PathBuf> {
    if let Ok(env_path) = env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
        return Err(ConfigError::FileNotFound(format!(
            "Config file specified by {} not found: {}",
            CONFIG_PATH_ENV,
            path.display()
        )));
    }

    let mut search_paths = Vec::new();
    if let Ok(cwd) = env::current_dir() {
        search_paths.push(cwd.join(CONFIG_FILE_NAME));
        let mut current = cwd.as_path();
        for _ in 0..5 {
            match current.parent() {
                Some(parent) => {
                    search_paths.push(parent.join(CONFIG_FILE_NAME));
                    current = parent;
                }
                None => break,
            }
        }
    }

    if let Some(found) = search_paths.iter().find(|p| p.exists()) {
        return Ok(found.clone());
    }

    let search_list = search_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    Err(ConfigError::FileNotFound(format!(
        "'{}' not found in any of these locations:\n{}\n\nSet {} to specify a custom location.",
        CONFIG_FILE_NAME, search_list, CONFIG_PATH_ENV
    )))
}

/// Load configuration from a TOML file
///
/// # Arguments
///
/// * `config_path` - Optional path to the config file. If `None`, the file is searched for.
/// * `cli_args` - Optional CLI argument overrides
///
/// # Errors
///
/// Returns an error if the file cannot be found or read, or contains invalid TOML
pub fn load_config(
    config_path: Option<&Path>,
    cli_args: Option<&HashMap<String, String>>,
) -> ConfigResult<ModnetConfig> {
    let config_file = match config_path {
        Some(path) => path.to_path_buf(),
        None => find_config_file()?,
    };

    let content = fs::read_to_string(&config_file)?;
    let mut config: ModnetConfig = toml::from_str(&content)?;

    apply_environment_overrides(&mut config);
    if let Some(cli) = cli_args {
        apply_cli_overrides(&mut config, cli);
    }

    Ok(config)
}

/// Like [`load_config`], but starts from defaults when no file is found
///
/// Read and parse errors of an existing file are still reported.
pub fn load_config_or_default(
    cli_args: Option<&HashMap<String, String>>,
) -> ConfigResult<ModnetConfig> {
    match load_config(None, cli_args) {
        Err(ConfigError::FileNotFound(_)) => {
            let mut config = ModnetConfig::default();
            apply_environment_overrides(&mut config);
            if let Some(cli) = cli_args {
                apply_cli_overrides(&mut config, cli);
            }
            Ok(config)
        }
        other => other,
    }
}

fn parse_flag(value: &str) -> bool {
    let lower = value.to_lowercase();
    lower == "true" || lower == "1" || lower == "yes"
}

fn set_parsed<T: FromStr>(target: &mut T, value: &str) {
    if let Ok(parsed) = value.parse::<T>() {
        *target = parsed;
    }
}

/// Apply environment variable overrides
///
/// Supported variables:
/// - `MODNET_MAX_ITERATIONS` -> `resolver.max_iterations`
/// - `MODNET_GROUP_RETRY_BUDGET` -> `resolver.group_retry_budget`
/// - `MODNET_COLLECT_ONLY_LAST_RUN` -> `resolver.collect_only_last_run`
/// - `MODNET_RANDOM_SEED` -> `resolver.random_seed`
/// - `MODNET_POSITION_TOLERANCE` -> `geometry.position_tolerance`
/// - `MODNET_LOG_LEVEL` -> `logging.level`
///
/// Unparseable numeric values are ignored.
pub fn apply_environment_overrides(config: &mut ModnetConfig) {
    if let Ok(value) = env::var("MODNET_MAX_ITERATIONS") {
        set_parsed(&mut config.resolver.max_iterations, &value);
    }
    if let Ok(value) = env::var("MODNET_GROUP_RETRY_BUDGET") {
        set_parsed(&mut config.resolver.group_retry_budget, &value);
    }
    if let Ok(value) = env::var("MODNET_COLLECT_ONLY_LAST_RUN") {
        config.resolver.collect_only_last_run = parse_flag(&value);
    }
    if let Ok(value) = env::var("MODNET_RANDOM_SEED") {
        set_parsed(&mut config.resolver.random_seed, &value);
    }
    if let Ok(value) = env::var("MODNET_POSITION_TOLERANCE") {
        set_parsed(&mut config.geometry.position_tolerance, &value);
    }
    if let Ok(value) = env::var("MODNET_LOG_LEVEL") {
        config.logging.level = value;
    }
}

/// Apply CLI argument overrides
///
/// # Arguments
///
/// * `config` - Configuration to modify
/// * `cli_args` - Map of CLI arguments, e.g. `{"max_iterations": "10"}`
pub fn apply_cli_overrides(config: &mut ModnetConfig, cli_args: &HashMap<String, String>) {
    if let Some(value) = cli_args.get("max_iterations") {
        set_parsed(&mut config.resolver.max_iterations, value);
    }
    if let Some(value) = cli_args.get("group_retry_budget") {
        set_parsed(&mut config.resolver.group_retry_budget, value);
    }
    if let Some(value) = cli_args.get("collect_only_last_run") {
        config.resolver.collect_only_last_run = parse_flag(value);
    }
    if let Some(value) = cli_args.get("random_seed") {
        set_parsed(&mut config.resolver.random_seed, value);
    }
    if let Some(value) = cli_args.get("position_tolerance") {
        set_parsed(&mut config.geometry.position_tolerance, value);
    }
    if let Some(value) = cli_args.get("log_level") {
        config.logging.level = value.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flag_variants() {
        assert!(parse_flag("TRUE"));
        assert!(parse_flag("1"));
        assert!(parse_flag("yes"));
        assert!(!parse_flag("off"));
    }

    #[test]
    fn test_cli_overrides() {
        let mut config = ModnetConfig::default();
        let mut cli_args = HashMap::new();
        cli_args.insert("max_iterations".to_string(), "12".to_string());
        cli_args.insert("position_tolerance".to_string(), "0.5".to_string());
        cli_args.insert("group_retry_budget".to_string(), "not-a-number".to_string());

        apply_cli_overrides(&mut config, &cli_args);

        assert_eq!(config.resolver.max_iterations, 12);
        assert_eq!(config.geometry.position_tolerance, 0.5);
        assert_eq!(config.resolver.group_retry_budget, 1);
    }
}
