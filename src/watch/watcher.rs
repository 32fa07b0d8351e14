// src/watch/watcher.rs

//! Debounce reactor turning raw filesystem events into rerun signals.
//!
//! One loop multiplexes shutdown, the debounce timer and the notification
//! stream. The timer starts armed with a zero delay so the pipeline runs once
//! at startup. Every qualifying event re-arms it to `debounce` from now, and
//! when it fires a single token is offered to the runner over a one-slot
//! channel. A full slot means a run is already pending, so the token is
//! dropped.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Config, Event, EventKind, RecommendedWatcher, Watcher};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::errors::Result;
use crate::fs::{FileSystem, RealFileSystem};
use crate::watch::crawler::{DirectoryCrawler, WatchRegistrar};
use crate::watch::filter::PathFilter;
use crate::watch::path_utils::normalize_path;

/// Raw notification results as delivered by the backend.
pub type RawEventReceiver = mpsc::UnboundedReceiver<notify::Result<Event>>;

/// Static knobs for the reactor.
#[derive(Debug, Clone)]
pub struct WatchSettings {
    pub root: PathBuf,
    pub debounce: Duration,
    /// Clear the terminal before announcing a reload.
    pub clear_screen: bool,
}

pub struct ChangeWatcher {
    settings: WatchSettings,
    filter: PathFilter,
    fs: Arc<dyn FileSystem>,
    registrar: Box<dyn WatchRegistrar>,
    event_rx: RawEventReceiver,
    rerun_tx: mpsc::Sender<()>,
}

impl std::fmt::Debug for ChangeWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeWatcher")
            .field("settings", &self.settings)
            .field("filter", &self.filter)
            .finish_non_exhaustive()
    }
}

impl ChangeWatcher {
    /// Create a watcher backed by the platform's notification primitive and
    /// register the whole tree under `settings.root`.
    ///
    /// Fails if the primitive is unavailable or the root cannot be read.
    pub fn new(
        settings: WatchSettings,
        filter: PathFilter,
        rerun_tx: mpsc::Sender<()>,
    ) -> Result<Self> {
        // Channel from the blocking notify callback into the async world.
        let (event_tx, event_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();

        let watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                // Only fails once the reactor has gone away.
                let _ = event_tx.send(res);
            },
            Config::default(),
        )?;

        Self::with_parts(
            settings,
            filter,
            Arc::new(RealFileSystem),
            Box::new(watcher),
            event_rx,
            rerun_tx,
        )
    }

    /// Assemble a watcher from explicit parts and run the initial crawl.
    ///
    /// `registrar` receives every directory to watch and is kept alive for
    /// the reactor's lifetime; `event_rx` is the stream it feeds.
    pub fn with_parts(
        mut settings: WatchSettings,
        filter: PathFilter,
        fs: Arc<dyn FileSystem>,
        mut registrar: Box<dyn WatchRegistrar>,
        event_rx: RawEventReceiver,
        rerun_tx: mpsc::Sender<()>,
    ) -> Result<Self> {
        // Canonicalize once so we have a stable base path.
        settings.root = fs
            .canonicalize(&settings.root)
            .unwrap_or_else(|_| settings.root.clone());

        let report = DirectoryCrawler::new(fs.as_ref(), &filter, &settings.root)
            .crawl(&settings.root, registrar.as_mut())?;
        info!(
            root = ?settings.root,
            directories = report.registered,
            "file watcher started"
        );

        Ok(Self {
            settings,
            filter,
            fs,
            registrar,
            event_rx,
            rerun_tx,
        })
    }

    pub fn root(&self) -> &Path {
        &self.settings.root
    }

    /// Run the reactor until `shutdown` is cancelled, the event source
    /// closes, or the runner side of the rerun channel is dropped.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<()> {
        debug!("watcher started");
        let debounce = self.settings.debounce;

        // Armed from the start with no delay: the first run is unconditional.
        let timer = tokio::time::sleep(Duration::ZERO);
        tokio::pin!(timer);
        let mut armed = true;

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    debug!("watcher shutting down");
                    return Ok(());
                }

                () = &mut timer, if armed => {
                    armed = false;
                    if !self.fire() {
                        debug!("rerun channel closed; watcher stopping");
                        return Ok(());
                    }
                }

                received = self.event_rx.recv() => match received {
                    Some(Ok(event)) => {
                        if self.is_relevant(&event) {
                            timer.as_mut().reset(Instant::now() + debounce);
                            armed = true;
                            debug!(timeout = ?debounce, "watcher timer started");
                        }
                    }
                    Some(Err(err)) => {
                        error!(error = %err, "error occurred while watching");
                    }
                    None => {
                        debug!("watch event source closed; watcher stopping");
                        return Ok(());
                    }
                },
            }
        }
    }

    /// Offer one rerun token. Returns false once the runner is gone.
    fn fire(&self) -> bool {
        if self.settings.clear_screen {
            if let Err(err) = clear_terminal(&mut std::io::stdout()) {
                trace!(error = %err, "unable to clear terminal");
            }
        }
        info!("watchrun reloading...");

        match self.rerun_tx.try_send(()) {
            Ok(()) => true,
            Err(TrySendError::Full(())) => {
                debug!("rerun already pending; coalescing");
                true
            }
            Err(TrySendError::Closed(())) => false,
        }
    }

    /// Whether `event` should (re)arm the debounce timer.
    ///
    /// Also registers directories created after startup.
    fn is_relevant(&mut self, event: &Event) -> bool {
        if matches!(event.kind, EventKind::Access(_)) {
            trace!(?event, "ignoring access event");
            return false;
        }

        let mut relevant = false;
        for path in &event.paths {
            let rel = normalize_path(&self.settings.root, path);
            if let Some(pattern) = self.filter.matching_pattern(&rel) {
                debug!(path = %rel, pattern, "skipping event");
                continue;
            }

            debug!(path = %rel, kind = ?event.kind, "change event");
            relevant = true;

            if matches!(event.kind, EventKind::Create(_)) && self.fs.is_dir(path) {
                self.watch_new_directory(path, &rel);
            }
        }
        relevant
    }

    fn watch_new_directory(&mut self, path: &Path, rel: &str) {
        let crawler = DirectoryCrawler::new(self.fs.as_ref(), &self.filter, &self.settings.root);
        match crawler.crawl(path, self.registrar.as_mut()) {
            Ok(report) => {
                debug!(directory = %rel, registered = report.registered, "watching new directory");
            }
            Err(err) => {
                warn!(directory = %rel, error = %err, "unable to watch new directory");
            }
        }
    }
}

/// Move the cursor home and erase the screen.
fn clear_terminal(out: &mut impl Write) -> io::Result<()> {
    out.write_all(b"\x1b[H\x1b[2J")?;
    out.flush()
}
