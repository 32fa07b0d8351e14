// src/errors.rs

//! Crate-wide error aliases and helpers.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WatchrunError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("File watcher error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Cannot read watch root {path:?}: {source}")]
    RootUnreadable {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("{component} task failed: {reason}")]
    ComponentFailed {
        component: &'static str,
        reason: String,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Why a single pipeline step did not complete successfully.
#[derive(Error, Debug)]
pub enum StepError {
    #[error("failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed waiting for `{command}`: {source}")]
    Wait {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {}", describe_code(.code))]
    ExitStatus { command: String, code: Option<i32> },

    #[error("`{command}` was cancelled")]
    Cancelled { command: String },
}

impl StepError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, StepError::Cancelled { .. })
    }
}

fn describe_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "no exit code (terminated by signal)".to_string(),
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, WatchrunError>;
