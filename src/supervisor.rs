// src/supervisor.rs

//! Top-level wiring of the watcher and the runner.
//!
//! The supervisor owns the root cancellation scope and the one-slot rerun
//! channel, runs both components as concurrent tasks and tears everything
//! down when shutdown is requested or either component stops on its own.
//! Shutdown always waits for *both* tasks before returning.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ConfigFile;
use crate::errors::{Result, WatchrunError};
use crate::exec::{CommandPipeline, CommandRunner, ProcessBackend, StepBackend};
use crate::logging::LogHandle;
use crate::watch::{ChangeWatcher, PathFilter, WatchSettings};

/// Capacity of the rerun channel: at most one pending signal.
pub const RERUN_CHANNEL_CAPACITY: usize = 1;

/// Single entry point for requesting shutdown.
///
/// `shutdown` consumes the handle, so it can be invoked at most once.
/// Dropping the handle without calling it leaves the supervisor running
/// until a component stops on its own.
#[derive(Debug)]
pub struct ShutdownHandle {
    tx: oneshot::Sender<()>,
}

impl ShutdownHandle {
    pub fn shutdown(self) {
        if self.tx.send(()).is_err() {
            debug!("supervisor already finished; shutdown request ignored");
        }
    }
}

pub struct Supervisor<B: StepBackend + 'static = ProcessBackend> {
    watcher: ChangeWatcher,
    runner: CommandRunner<B>,
    root_scope: CancellationToken,
    shutdown_rx: oneshot::Receiver<()>,
    log_handle: LogHandle,
}

impl<B: StepBackend + 'static> std::fmt::Debug for Supervisor<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("watcher", &self.watcher)
            .field("runner", &self.runner)
            .finish_non_exhaustive()
    }
}

/// The rerun channel shared by watcher and runner.
pub fn rerun_channel() -> (mpsc::Sender<()>, mpsc::Receiver<()>) {
    mpsc::channel(RERUN_CHANNEL_CAPACITY)
}

impl Supervisor<ProcessBackend> {
    /// Build the production setup from a validated config.
    ///
    /// Setup failures (watch root unreadable, no notification backend) are
    /// returned here, before anything runs. The log sinks are closed on that
    /// path too, since there will be no teardown.
    pub fn from_config(cfg: &ConfigFile, log_handle: LogHandle) -> Result<(Self, ShutdownHandle)> {
        match build_components(cfg) {
            Ok((watcher, runner)) => Ok(Self::new(watcher, runner, log_handle)),
            Err(err) => {
                close_log_handle(log_handle);
                Err(err)
            }
        }
    }
}

fn build_components(cfg: &ConfigFile) -> Result<(ChangeWatcher, CommandRunner<ProcessBackend>)> {
    let pipeline = CommandPipeline::from_commands(cfg.commands())?;
    let filter = PathFilter::new(cfg.effective_ignore());
    let (rerun_tx, rerun_rx) = rerun_channel();

    let watcher = ChangeWatcher::new(
        WatchSettings {
            root: cfg.root().clone(),
            debounce: cfg.debounce_timeout(),
            clear_screen: cfg.clear_screen(),
        },
        filter,
        rerun_tx,
    )?;
    let runner = CommandRunner::new(pipeline, Arc::new(ProcessBackend), rerun_rx, cfg.run_delay());
    Ok((watcher, runner))
}

impl<B: StepBackend + 'static> Supervisor<B> {
    pub fn new(
        watcher: ChangeWatcher,
        runner: CommandRunner<B>,
        log_handle: LogHandle,
    ) -> (Self, ShutdownHandle) {
        let (tx, shutdown_rx) = oneshot::channel();
        let supervisor = Self {
            watcher,
            runner,
            root_scope: CancellationToken::new(),
            shutdown_rx,
            log_handle,
        };
        (supervisor, ShutdownHandle { tx })
    }

    /// Run both components until shutdown, then tear down.
    ///
    /// Returns the first component error, if any.
    pub async fn run(self) -> Result<()> {
        let Self {
            watcher,
            runner,
            root_scope,
            shutdown_rx,
            log_handle,
        } = self;

        let mut watcher_task = tokio::spawn(watcher.run(root_scope.clone()));
        let mut runner_task = tokio::spawn(runner.run(root_scope.clone()));

        let shutdown_requested = async {
            if shutdown_rx.await.is_err() {
                // Handle dropped: nobody will ask, so wait for the components.
                std::future::pending::<()>().await;
            }
        };

        let mut watcher_done = None;
        let mut runner_done = None;

        tokio::select! {
            () = shutdown_requested => {
                info!("shutdown requested");
            }
            res = &mut watcher_task => {
                warn!("watcher stopped before shutdown; tearing down");
                watcher_done = Some(res);
            }
            res = &mut runner_task => {
                warn!("runner stopped before shutdown; tearing down");
                runner_done = Some(res);
            }
        }

        root_scope.cancel();

        let watcher_result = match watcher_done {
            Some(res) => res,
            None => watcher_task.await,
        };
        let runner_result = match runner_done {
            Some(res) => res,
            None => runner_task.await,
        };
        debug!("watcher and runner finished");

        let result = component_result("watcher", watcher_result)
            .and(component_result("runner", runner_result));

        close_log_handle(log_handle);
        result
    }
}

/// Flush and release the log sinks. Called exactly once per handle.
fn close_log_handle(log_handle: LogHandle) {
    let files = log_handle.file_count();
    for err in log_handle.close() {
        warn!(error = %err, "failed to flush log file");
    }
    debug!(files, "log sinks closed");
}

fn component_result(
    component: &'static str,
    joined: std::result::Result<Result<()>, tokio::task::JoinError>,
) -> Result<()> {
    match joined {
        Ok(res) => res,
        Err(err) => Err(WatchrunError::ComponentFailed {
            component,
            reason: err.to_string(),
        }),
    }
}
