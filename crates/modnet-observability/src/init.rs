// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Logging initialization
//!
//! Console logging is always available. With the `file-logging` feature a
//! timestamped run folder receives one JSON file per crate plus a combined
//! file, and old runs are pruned.

use anyhow::{Context, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::cli::CrateDebugFlags;
use crate::config::{LogFormat, LoggingConfig};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn console_layer(debug_flags: &CrateDebugFlags, config: &LoggingConfig) -> Result<BoxedLayer> {
    let directive = debug_flags.to_filter_string_with_base(&config.level);
    let filter = EnvFilter::try_new(&directive)
        .with_context(|| format!("Invalid log filter directive: {}", directive))?;

    let layer = match config.format {
        LogFormat::Text => tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_file(false)
            .with_line_number(false)
            .with_filter(filter)
            .boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_filter(filter)
            .boxed(),
    };
    Ok(layer)
}

/// Install a console subscriber
///
/// # Errors
///
/// Fails when the level is not a valid filter directive or a global
/// subscriber is already installed.
pub fn init_logging(debug_flags: &CrateDebugFlags, config: &LoggingConfig) -> Result<()> {
    let layers = vec![console_layer(debug_flags, config)?];
    Registry::default()
        .with(layers)
        .try_init()
        .context("A global tracing subscriber is already installed")?;
    Ok(())
}

#[cfg(feature = "file-logging")]
pub use file::{cleanup_old_logs, init_file_logging, LoggingGuard};

#[cfg(feature = "file-logging")]
mod file {
    use super::*;
    use chrono::{NaiveDateTime, TimeZone, Utc};
    use std::path::{Path, PathBuf};
    use tracing_appender::non_blocking::WorkerGuard;
    use tracing_appender::rolling;

    const RUN_PREFIX: &str = "run_";
    const RUN_FORMAT: &str = "%Y%m%d_%H%M%S";

    /// Keeps the background log writers alive; logs flush on drop
    pub struct LoggingGuard {
        _file_guards: Vec<WorkerGuard>,
        run_dir: PathBuf,
    }

    impl LoggingGuard {
        /// Folder of the current run
        pub fn log_dir(&self) -> &Path {
            &self.run_dir
        }
    }

    /// Install console plus per-run file logging
    ///
    /// ```text
    /// <log_dir>/
    ///   run_20250101_120000/
    ///     modnet-engine.log
    ///     modnet-config.log
    ///     modnet.log        (combined)
    /// ```
    ///
    /// # Arguments
    /// * `log_dir` - Base directory (default `./logs`)
    /// * `retention_days` - Drop runs older than N days (default 30)
    /// * `retention_runs` - Keep at most N runs (default 10)
    pub fn init_file_logging(
        debug_flags: &CrateDebugFlags,
        config: &LoggingConfig,
        log_dir: Option<PathBuf>,
        retention_days: Option<u64>,
        retention_runs: Option<usize>,
    ) -> Result<LoggingGuard> {
        let base_dir = log_dir.unwrap_or_else(|| PathBuf::from("./logs"));
        let run_dir = base_dir.join(format!("{}{}", RUN_PREFIX, Utc::now().format(RUN_FORMAT)));
        std::fs::create_dir_all(&run_dir)
            .with_context(|| format!("Failed to create log directory: {}", run_dir.display()))?;

        cleanup_old_logs(&base_dir, retention_days.unwrap_or(30), retention_runs.unwrap_or(10))?;

        let mut layers = vec![console_layer(debug_flags, config)?];
        let mut guards = Vec::new();

        for crate_name in crate::KNOWN_CRATES {
            let appender = rolling::never(&run_dir, format!("{}.log", crate_name));
            let (writer, guard) = tracing_appender::non_blocking(appender);
            guards.push(guard);
            let filter = EnvFilter::try_new(format!("{}=debug,off", crate_name))?;
            layers.push(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(writer)
                    .with_target(true)
                    .with_filter(filter)
                    .boxed(),
            );
        }

        let (combined, combined_guard) =
            tracing_appender::non_blocking(rolling::never(&run_dir, "modnet.log"));
        guards.push(combined_guard);
        let directive = debug_flags.to_filter_string_with_base(&config.level);
        layers.push(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(combined)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_filter(EnvFilter::try_new(&directive)?)
                .boxed(),
        );

        Registry::default()
            .with(layers)
            .try_init()
            .context("A global tracing subscriber is already installed")?;

        Ok(LoggingGuard {
            _file_guards: guards,
            run_dir,
        })
    }

    /// Remove run folders older than `retention_days`, then trim to `retention_runs`
    ///
    /// Returns the number of folders removed.
    pub fn cleanup_old_logs(
        base_dir: &Path,
        retention_days: u64,
        retention_runs: usize,
    ) -> Result<usize> {
        if !base_dir.exists() {
            return Ok(0);
        }

        let cutoff = Utc::now() - chrono::Duration::days(retention_days as i64);
        let mut runs = Vec::new();
        for entry in std::fs::read_dir(base_dir)? {
            let path = entry?.path();
            if !path.is_dir() {
                continue;
            }
            let stamp = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_prefix(RUN_PREFIX))
                .and_then(|s| NaiveDateTime::parse_from_str(s, RUN_FORMAT).ok());
            if let Some(naive) = stamp {
                runs.push((path, Utc.from_utc_datetime(&naive)));
            }
        }

        // newest first
        runs.sort_by(|a, b| b.1.cmp(&a.1));

        let mut removed = 0;
        for (index, (path, stamp)) in runs.iter().enumerate() {
            if *stamp < cutoff || index >= retention_runs {
                match std::fs::remove_dir_all(path) {
                    Ok(()) => removed += 1,
                    Err(e) => tracing::warn!(
                        target: "modnet-observability",
                        "Failed to remove old log directory {}: {}",
                        path.display(),
                        e
                    ),
                }
            }
        }
        Ok(removed)
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_cleanup_keeps_newest_runs() {
            let dir = tempfile::tempdir().unwrap();
            let now = Utc::now();
            for offset in 0..4 {
                let stamp = now - chrono::Duration::minutes(offset);
                let name = format!("{}{}", RUN_PREFIX, stamp.format(RUN_FORMAT));
                std::fs::create_dir_all(dir.path().join(name)).unwrap();
            }
            std::fs::create_dir_all(dir.path().join("unrelated")).unwrap();

            let removed = cleanup_old_logs(dir.path(), 30, 2).unwrap();

            assert_eq!(removed, 2);
            assert!(dir.path().join("unrelated").exists());
        }

        #[test]
        fn test_cleanup_drops_expired_runs() {
            let dir = tempfile::tempdir().unwrap();
            let old = Utc::now() - chrono::Duration::days(40);
            let name = format!("{}{}", RUN_PREFIX, old.format(RUN_FORMAT));
            std::fs::create_dir_all(dir.path().join(&name)).unwrap();

            assert_eq!(cleanup_old_logs(dir.path(), 30, 10).unwrap(), 1);
            assert!(!dir.path().join(name).exists());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_level_is_rejected() {
        let config = LoggingConfig {
            level: "modnet-engine=[".to_string(),
            format: LogFormat::Text,
        };
        assert!(console_layer(&CrateDebugFlags::default(), &config).is_err());
    }

    #[test]
    fn test_console_layer_builds_for_json() {
        let config = LoggingConfig {
            level: "debug".to_string(),
            format: LogFormat::Json,
        };
        assert!(console_layer(&CrateDebugFlags::default(), &config).is_ok());
    }
}
