// src/exec/runner.rs

//! Cancel-and-restart scheduler over the command pipeline.
//!
//! Every rerun signal retires the current run (cancel its scope, then wait
//! until its task has reaped every process) before a new run is started, so
//! processes from two runs never coexist. Errors from a step that was cut
//! short by a restart are not reported as failures.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::errors::Result;
use crate::exec::backend::StepBackend;
use crate::exec::pipeline::CommandPipeline;

/// Internal handle for the run currently in flight.
///
/// - `cancel` is a child of the supervisor's scope; cancelling it terminates
///   the active step.
/// - `suppress_errors` is raised before a deliberate cancel so the run does
///   not log the interrupted step as a failure.
/// - `handle` is the Tokio task executing the steps.
#[derive(Debug)]
struct ActiveRun {
    run_id: u64,
    cancel: CancellationToken,
    suppress_errors: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

#[derive(Debug)]
enum RunState {
    Idle,
    Running(ActiveRun),
}

pub struct CommandRunner<B: StepBackend + 'static> {
    pipeline: Arc<CommandPipeline>,
    backend: Arc<B>,
    rerun_rx: mpsc::Receiver<()>,
    run_delay: Duration,
    state: RunState,
    runs_started: u64,
}

impl<B: StepBackend + 'static> std::fmt::Debug for CommandRunner<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRunner")
            .field("pipeline", &self.pipeline)
            .field("run_delay", &self.run_delay)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl<B: StepBackend + 'static> CommandRunner<B> {
    pub fn new(
        pipeline: CommandPipeline,
        backend: Arc<B>,
        rerun_rx: mpsc::Receiver<()>,
        run_delay: Duration,
    ) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            backend,
            rerun_rx,
            run_delay,
            state: RunState::Idle,
            runs_started: 0,
        }
    }

    /// Main scheduling loop.
    ///
    /// Runs until `scope` is cancelled or every rerun sender is dropped, then
    /// retires the in-flight run once more before returning.
    pub async fn run(mut self, scope: CancellationToken) -> Result<()> {
        debug!("runner started");

        loop {
            tokio::select! {
                biased;

                _ = scope.cancelled() => break,

                signal = self.rerun_rx.recv() => {
                    if signal.is_none() {
                        debug!("rerun channel closed");
                        break;
                    }

                    self.retire_current_run().await;

                    if self.runs_started > 0 && !self.run_delay.is_zero() {
                        tokio::select! {
                            biased;
                            _ = scope.cancelled() => break,
                            _ = tokio::time::sleep(self.run_delay) => {}
                        }
                    }

                    self.start_run(&scope);
                }
            }
        }

        self.retire_current_run().await;
        debug!("runner shutting down");
        Ok(())
    }

    /// Cancel the in-flight run (if any) and wait for its task to finish.
    async fn retire_current_run(&mut self) {
        let RunState::Running(active) = std::mem::replace(&mut self.state, RunState::Idle) else {
            return;
        };

        active.suppress_errors.store(true, Ordering::SeqCst);
        active.cancel.cancel();

        if let Err(err) = active.handle.await {
            error!(run_id = active.run_id, error = %err, "run task ended abnormally");
        }

        active.suppress_errors.store(false, Ordering::SeqCst);
        debug!(run_id = active.run_id, "previous run retired");
    }

    fn start_run(&mut self, scope: &CancellationToken) {
        self.runs_started += 1;
        let run_id = self.runs_started;

        let ctx = RunContext {
            run_id,
            cancel: scope.child_token(),
            scope: scope.clone(),
            suppress_errors: Arc::new(AtomicBool::new(false)),
        };
        let cancel = ctx.cancel.clone();
        let suppress_errors = Arc::clone(&ctx.suppress_errors);

        let handle = tokio::spawn(execute_pipeline(
            Arc::clone(&self.pipeline),
            Arc::clone(&self.backend),
            ctx,
        ));

        debug!(run_id, "run started");
        self.state = RunState::Running(ActiveRun {
            run_id,
            cancel,
            suppress_errors,
            handle,
        });
    }
}

struct RunContext {
    run_id: u64,
    cancel: CancellationToken,
    scope: CancellationToken,
    suppress_errors: Arc<AtomicBool>,
}

/// Execute every step in order, stopping at the first failure.
async fn execute_pipeline<B: StepBackend>(
    pipeline: Arc<CommandPipeline>,
    backend: Arc<B>,
    ctx: RunContext,
) {
    let start = Instant::now();

    for step in pipeline.steps() {
        let Err(err) = backend.run_step(step, ctx.cancel.clone()).await else {
            continue;
        };

        // A restart raises the flag; a shutdown cancels the whole scope.
        let interrupted = ctx.suppress_errors.load(Ordering::SeqCst)
            || (err.is_cancelled() && ctx.scope.is_cancelled());
        if interrupted {
            debug!(run_id = ctx.run_id, command = %step, error = %err, "run interrupted");
        } else {
            error!(
                run_id = ctx.run_id,
                command = %step,
                error = %err,
                "error occurred running command"
            );
        }
        return;
    }

    info!(run_id = ctx.run_id, duration = ?start.elapsed(), "end of execution");
}
