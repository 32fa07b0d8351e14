// src/logging.rs

//! Logging setup for `watchrun` using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the log level:
//! 1. `--log-level` CLI flag (if provided)
//! 2. `WATCHRUN_LOG` environment variable (e.g. "info", "debug")
//! 3. `log_level` from the config file
//! 4. default to `info`
//!
//! Logs are sent to STDERR so that stdout carries only the pipeline's own
//! output. Each configured log file gets an additional plain-text sink.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use tracing::warn;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, Layer, Registry};

use crate::cli::LogLevel;

/// Environment variable consulted when no `--log-level` flag is given.
pub const LOG_LEVEL_ENV: &str = "WATCHRUN_LOG";

/// Open file sinks of the global subscriber.
///
/// Returned by [`init_logging`]; the supervisor calls [`LogHandle::close`]
/// once during teardown so buffered records reach disk before exit.
#[derive(Debug, Default)]
pub struct LogHandle {
    files: Vec<(PathBuf, Arc<File>)>,
}

impl LogHandle {
    /// Handle without file sinks (stderr only, or logging set up elsewhere).
    pub fn stderr_only() -> Self {
        Self::default()
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Flush and sync every file sink, returning the errors encountered.
    pub fn close(self) -> Vec<io::Error> {
        self.files
            .into_iter()
            .filter_map(|(_, file)| file.sync_all().err())
            .collect()
    }
}

/// Initialise the global logging subscriber.
///
/// Safe to call once at startup. A log file that cannot be opened is skipped
/// with a warning rather than failing startup.
pub fn init_logging(
    cli_level: Option<LogLevel>,
    config_level: Option<&str>,
    log_files: &[PathBuf],
) -> Result<LogHandle> {
    let level = resolve_level(
        cli_level,
        std::env::var(LOG_LEVEL_ENV).ok().as_deref(),
        config_level,
    );

    let mut handle = LogHandle::default();
    let mut failures = Vec::new();
    for path in log_files {
        match open_log_file(path) {
            Ok(file) => handle.files.push((path.clone(), Arc::new(file))),
            Err(err) => failures.push((path.clone(), err)),
        }
    }

    let file_layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = handle
        .files
        .iter()
        .map(|(_, file)| {
            fmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_writer(Arc::clone(file))
                .boxed()
        })
        .collect();

    // Send logs to stderr; keep stdout free for pipeline output.
    tracing_subscriber::registry()
        .with(file_layers)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_thread_names(false)
                .with_writer(io::stderr),
        )
        .with(LevelFilter::from_level(level))
        .try_init()?;

    for (path, err) in failures {
        warn!(file = ?path, error = %err, "unable to open log file, skipping");
    }

    Ok(handle)
}

fn open_log_file(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    OpenOptions::new().create(true).append(true).open(path)
}

fn resolve_level(
    cli_level: Option<LogLevel>,
    env_level: Option<&str>,
    config_level: Option<&str>,
) -> tracing::Level {
    if let Some(lvl) = cli_level {
        return level_from_log_level(lvl);
    }
    env_level
        .and_then(parse_level_str)
        .or_else(|| config_level.and_then(parse_level_str))
        .unwrap_or(tracing::Level::INFO)
}

fn level_from_log_level(lvl: LogLevel) -> tracing::Level {
    match lvl {
        LogLevel::Error => tracing::Level::ERROR,
        LogLevel::Warn => tracing::Level::WARN,
        LogLevel::Info => tracing::Level::INFO,
        LogLevel::Debug => tracing::Level::DEBUG,
        LogLevel::Trace => tracing::Level::TRACE,
    }
}

pub(crate) fn parse_level_str(s: &str) -> Option<tracing::Level> {
    match s.trim().to_lowercase().as_str() {
        "error" => Some(tracing::Level::ERROR),
        "warn" | "warning" => Some(tracing::Level::WARN),
        "info" => Some(tracing::Level::INFO),
        "debug" => Some(tracing::Level::DEBUG),
        "trace" => Some(tracing::Level::TRACE),
        _ => None,
    }
}
