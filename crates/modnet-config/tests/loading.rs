// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Config file discovery and override layering
//!
//! These tests touch process environment variables, so each one holds
//! `ENV_LOCK` for its whole duration.

use modnet_config::{
    apply_environment_overrides, find_config_file, load_config, ModnetConfig, CONFIG_PATH_ENV,
};
use std::collections::HashMap;
use std::env;
use std::fs::File;
use std::io::Write;
use std::sync::Mutex;
use tempfile::tempdir;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_overrides() {
    for key in [
        "MODNET_MAX_ITERATIONS",
        "MODNET_GROUP_RETRY_BUDGET",
        "MODNET_COLLECT_ONLY_LAST_RUN",
        "MODNET_RANDOM_SEED",
        "MODNET_POSITION_TOLERANCE",
        "MODNET_LOG_LEVEL",
    ] {
        env::remove_var(key);
    }
}

#[test]
fn test_find_config_file_env_var() {
    let _env_lock = ENV_LOCK.lock().unwrap();
    let dir = tempdir().unwrap();
    let config_path = dir.path().join("custom.toml");
    File::create(&config_path).unwrap();

    env::set_var(CONFIG_PATH_ENV, config_path.to_str().unwrap());
    let result = find_config_file();
    env::remove_var(CONFIG_PATH_ENV);

    assert_eq!(result.unwrap(), config_path);
}

#[test]
fn test_missing_env_path_is_reported() {
    let _env_lock = ENV_LOCK.lock().unwrap();
    let dir = tempdir().unwrap();
    let missing = dir.path().join("nope.toml");

    env::set_var(CONFIG_PATH_ENV, missing.to_str().unwrap());
    let result = find_config_file();
    env::remove_var(CONFIG_PATH_ENV);

    let message = result.unwrap_err().to_string();
    assert!(message.contains("nope.toml"));
}

#[test]
fn test_load_minimal_config() {
    let _env_lock = ENV_LOCK.lock().unwrap();
    clear_overrides();
    let dir = tempdir().unwrap();
    let config_path = dir.path().join("modnet_configuration.toml");

    let mut file = File::create(&config_path).unwrap();
    writeln!(file, "[resolver]").unwrap();
    writeln!(file, "max_iterations = 4").unwrap();
    writeln!(file, "[geometry]").unwrap();
    writeln!(file, "position_tolerance = 0.25").unwrap();

    let config = load_config(Some(&config_path), None).unwrap();

    assert_eq!(config.resolver.max_iterations, 4);
    assert_eq!(config.geometry.position_tolerance, 0.25);
    assert_eq!(config.resolver.group_retry_budget, 1);
}

#[test]
fn test_environment_overrides() {
    let _env_lock = ENV_LOCK.lock().unwrap();
    let mut config = ModnetConfig::default();

    env::set_var("MODNET_MAX_ITERATIONS", "9");
    env::set_var("MODNET_COLLECT_ONLY_LAST_RUN", "yes");
    env::set_var("MODNET_LOG_LEVEL", "debug");
    apply_environment_overrides(&mut config);
    clear_overrides();

    assert_eq!(config.resolver.max_iterations, 9);
    assert!(config.resolver.collect_only_last_run);
    assert_eq!(config.logging.level, "debug");
}

#[test]
fn test_override_precedence() {
    let _env_lock = ENV_LOCK.lock().unwrap();
    clear_overrides();
    let dir = tempdir().unwrap();
    let config_path = dir.path().join("modnet_configuration.toml");

    let mut file = File::create(&config_path).unwrap();
    writeln!(file, "[resolver]").unwrap();
    writeln!(file, "max_iterations = 3").unwrap();
    writeln!(file, "random_seed = 11").unwrap();

    env::set_var("MODNET_MAX_ITERATIONS", "5");
    env::set_var("MODNET_RANDOM_SEED", "22");

    let mut cli_args = HashMap::new();
    cli_args.insert("max_iterations".to_string(), "8".to_string());

    let config = load_config(Some(&config_path), Some(&cli_args)).unwrap();
    clear_overrides();

    // CLI wins for iterations, env wins for the seed
    assert_eq!(config.resolver.max_iterations, 8);
    assert_eq!(config.resolver.random_seed, 22);
}

#[test]
fn test_invalid_toml_is_parse_error() {
    let _env_lock = ENV_LOCK.lock().unwrap();
    let dir = tempdir().unwrap();
    let config_path = dir.path().join("broken.toml");
    let mut file = File::create(&config_path).unwrap();
    writeln!(file, "[resolver").unwrap();

    let err = load_config(Some(&config_path), None).unwrap_err();
    assert!(matches!(err, modnet_config::ConfigError::ParseError(_)));
}
