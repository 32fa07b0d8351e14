// src/exec/pipeline.rs

use std::fmt;

use crate::errors::{Result, WatchrunError};

/// One command of the pipeline: a program plus its arguments.
///
/// Built by splitting a command line on whitespace. There is no shell in
/// between, so quotes, pipes and redirections are passed through literally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineStep {
    program: String,
    args: Vec<String>,
    command_line: String,
}

impl PipelineStep {
    /// Returns `None` for a blank line.
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
            command_line: line.trim().to_string(),
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn command_line(&self) -> &str {
        &self.command_line
    }
}

impl fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command_line)
    }
}

/// Ordered, immutable sequence of steps executed on every run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandPipeline {
    steps: Vec<PipelineStep>,
}

impl CommandPipeline {
    pub fn from_commands<S: AsRef<str>>(commands: &[S]) -> Result<Self> {
        if commands.is_empty() {
            return Err(WatchrunError::ConfigError(
                "command pipeline must contain at least one command".to_string(),
            ));
        }

        let steps = commands
            .iter()
            .enumerate()
            .map(|(index, line)| {
                PipelineStep::parse(line.as_ref()).ok_or_else(|| {
                    WatchrunError::ConfigError(format!("commands[{index}] is empty"))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { steps })
    }

    pub fn steps(&self) -> &[PipelineStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
