// src/exec/backend.rs

//! Pluggable step executor abstraction.
//!
//! The runner talks to a `StepBackend` instead of spawning processes itself.
//! This makes it easy to swap in a fake backend in tests while keeping the
//! production implementation in [`ProcessBackend`].

use std::future::Future;
use std::pin::Pin;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::errors::StepError;
use crate::exec::pipeline::PipelineStep;
use crate::exec::process::ProcessGroup;

/// Boxed future returned by [`StepBackend::run_step`].
pub type StepFuture<'a> = Pin<Box<dyn Future<Output = Result<(), StepError>> + Send + 'a>>;

/// Trait abstracting how a single pipeline step is executed.
///
/// Production code uses [`ProcessBackend`]; tests can provide their own
/// implementation that doesn't spawn real processes.
pub trait StepBackend: Send + Sync {
    /// Run `step` to completion.
    ///
    /// When `cancel` fires, the implementation must stop everything the step
    /// started and only resolve once that has fully finished, returning
    /// [`StepError::Cancelled`].
    fn run_step<'a>(&'a self, step: &'a PipelineStep, cancel: CancellationToken) -> StepFuture<'a>;
}

/// Real backend: every step is an OS process group.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessBackend;

impl StepBackend for ProcessBackend {
    fn run_step<'a>(&'a self, step: &'a PipelineStep, cancel: CancellationToken) -> StepFuture<'a> {
        Box::pin(run_process_step(step, cancel))
    }
}

async fn run_process_step(step: &PipelineStep, cancel: CancellationToken) -> Result<(), StepError> {
    let command = step.command_line().to_string();
    if cancel.is_cancelled() {
        return Err(StepError::Cancelled { command });
    }

    let mut group = ProcessGroup::spawn(step).map_err(|source| StepError::Spawn {
        command: command.clone(),
        source,
    })?;

    // Either the process exits on its own (normal case), or the run is
    // cancelled: the whole group is terminated, the leader reaped, and every
    // other member waited for.
    let (status, cancelled) = tokio::select! {
        status = group.join() => (status, false),
        _ = cancel.cancelled() => {
            if let Err(err) = group.terminate_group() {
                warn!(command = %command, error = %err, "failed to terminate process group");
            }
            let status = group.join().await;
            group.wait_group_exit().await;
            (status, true)
        }
    };

    let status = status.map_err(|source| StepError::Wait {
        command: command.clone(),
        source,
    })?;

    debug!(
        command = %command,
        code = ?status.code(),
        cancelled,
        "process exited"
    );

    if cancelled {
        Err(StepError::Cancelled { command })
    } else if status.success() {
        Ok(())
    } else {
        Err(StepError::ExitStatus {
            command,
            code: status.code(),
        })
    }
}
