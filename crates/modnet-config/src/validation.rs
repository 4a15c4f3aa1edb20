// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration validation

use crate::{ConfigError, ConfigResult, ModnetConfig};

const KNOWN_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
const KNOWN_FORMATS: &[&str] = &["text", "json"];

/// Validation errors that can occur during config validation
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValidationError {
    OutOfRange { field: String, value: String, reason: String },
    InvalidValue { field: String, reason: String },
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OutOfRange { field, value, reason } => {
                write!(f, "{} = {} is out of range: {}", field, value, reason)
            }
            Self::InvalidValue { field, reason } => {
                write!(f, "Invalid configuration value for {}: {}", field, reason)
            }
        }
    }
}

/// Validate the complete configuration
///
/// # Errors
///
/// Returns `ConfigError::ValidationError` listing every problem found
pub fn validate_config(config: &ModnetConfig) -> ConfigResult<()> {
    let errors = collect_validation_errors(config);
    if errors.is_empty() {
        return Ok(());
    }

    let error_messages = errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n");

    Err(ConfigError::ValidationError(format!(
        "Configuration validation failed:\n{}",
        error_messages
    )))
}

/// Every validation problem of `config`, in section order
pub fn collect_validation_errors(config: &ModnetConfig) -> Vec<ConfigValidationError> {
    let mut errors = Vec::new();
    validate_resolver(config, &mut errors);
    validate_geometry(config, &mut errors);
    validate_logging(config, &mut errors);
    errors
}

fn validate_resolver(config: &ModnetConfig, errors: &mut Vec<ConfigValidationError>) {
    if config.resolver.max_iterations == 0 {
        errors.push(ConfigValidationError::OutOfRange {
            field: "resolver.max_iterations".to_string(),
            value: "0".to_string(),
            reason: "at least one pass is required".to_string(),
        });
    }
    if config.resolver.group_retry_budget == 0 {
        errors.push(ConfigValidationError::OutOfRange {
            field: "resolver.group_retry_budget".to_string(),
            value: "0".to_string(),
            reason: "at least one attempt per group is required".to_string(),
        });
    }
}

fn validate_geometry(config: &ModnetConfig, errors: &mut Vec<ConfigValidationError>) {
    let tolerance = config.geometry.position_tolerance;
    if !tolerance.is_finite() || tolerance <= 0.0 {
        errors.push(ConfigValidationError::OutOfRange {
            field: "geometry.position_tolerance".to_string(),
            value: tolerance.to_string(),
            reason: "must be a positive finite number".to_string(),
        });
    }
}

fn validate_logging(config: &ModnetConfig, errors: &mut Vec<ConfigValidationError>) {
    if !KNOWN_LEVELS.contains(&config.logging.level.to_lowercase().as_str()) {
        errors.push(ConfigValidationError::InvalidValue {
            field: "logging.level".to_string(),
            reason: format!("expected one of {}", KNOWN_LEVELS.join(", ")),
        });
    }
    if !KNOWN_FORMATS.contains(&config.logging.format.to_lowercase().as_str()) {
        errors.push(ConfigValidationError::InvalidValue {
            field: "logging.format".to_string(),
            reason: format!("expected one of {}", KNOWN_FORMATS.join(", ")),
        });
    }
}
