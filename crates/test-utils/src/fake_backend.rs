use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use watchrun::errors::StepError;
use watchrun::exec::{PipelineStep, StepBackend, StepFuture};

/// Scripted behaviour of a fake step, keyed by command line.
#[derive(Debug, Clone)]
pub enum FakeStep {
    Succeed,
    Fail(i32),
    /// Succeed after the given (virtual) time.
    Sleep(Duration),
    /// Never finish on its own; only cancellation ends it.
    Hang,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepEvent {
    Started(String),
    Finished(String),
    Failed(String),
    Cancelled(String),
}

/// A fake backend that:
/// - records when each step starts and how it ended
/// - tracks how many steps are in flight at once.
#[derive(Debug, Default)]
pub struct FakeBackend {
    behaviours: HashMap<String, FakeStep>,
    events: Arc<Mutex<Vec<StepEvent>>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_step(mut self, command: &str, behaviour: FakeStep) -> Self {
        self.behaviours.insert(command.to_string(), behaviour);
        self
    }

    pub fn events(&self) -> Vec<StepEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn started(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                StepEvent::Started(c) => Some(c),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, event: &StepEvent) -> usize {
        self.events().iter().filter(|e| *e == event).count()
    }

    /// Highest number of steps that were ever running at the same time.
    pub fn max_concurrent(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    fn push(&self, event: StepEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl StepBackend for FakeBackend {
    fn run_step<'a>(&'a self, step: &'a PipelineStep, cancel: CancellationToken) -> StepFuture<'a> {
        Box::pin(async move {
            let command = step.command_line().to_string();
            if cancel.is_cancelled() {
                return Err(StepError::Cancelled { command });
            }

            self.push(StepEvent::Started(command.clone()));
            let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now_active, Ordering::SeqCst);

            let behaviour = self
                .behaviours
                .get(&command)
                .cloned()
                .unwrap_or(FakeStep::Succeed);

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(StepError::Cancelled { command: command.clone() }),
                res = simulate(&command, behaviour) => res,
            };

            self.active.fetch_sub(1, Ordering::SeqCst);
            self.push(match &result {
                Ok(()) => StepEvent::Finished(command),
                Err(StepError::Cancelled { .. }) => StepEvent::Cancelled(command),
                Err(_) => StepEvent::Failed(command),
            });
            result
        })
    }
}

async fn simulate(command: &str, behaviour: FakeStep) -> Result<(), StepError> {
    match behaviour {
        FakeStep::Succeed => Ok(()),
        FakeStep::Fail(code) => Err(StepError::ExitStatus {
            command: command.to_string(),
            code: Some(code),
        }),
        FakeStep::Sleep(duration) => {
            tokio::time::sleep(duration).await;
            Ok(())
        }
        FakeStep::Hang => std::future::pending().await,
    }
}
