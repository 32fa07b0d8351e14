use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use notify::event::{AccessKind, CreateKind, ModifyKind};
use notify::{Event, EventKind};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tokio_util::sync::CancellationToken;

use watchrun::fs::mock::MockFileSystem;
use watchrun::supervisor::rerun_channel;
use watchrun::watch::{ChangeWatcher, PathFilter, WatchSettings};
use watchrun_test_utils::{init_tracing, with_timeout, RecordingRegistrar};

type TestResult = Result<(), Box<dyn Error>>;

const DEBOUNCE: Duration = Duration::from_millis(100);

/// A reactor running on a mock tree, fed by a hand-driven event stream.
struct Harness {
    events: mpsc::UnboundedSender<notify::Result<Event>>,
    rerun_rx: mpsc::Receiver<()>,
    registrar: RecordingRegistrar,
    fs: MockFileSystem,
    shutdown: CancellationToken,
    task: JoinHandle<watchrun::errors::Result<()>>,
}

fn start(ignore: &[&str]) -> Harness {
    init_tracing();

    let fs = MockFileSystem::new();
    fs.add_file("./src/main.rs");
    fs.add_file("./build.log");

    let registrar = RecordingRegistrar::new();
    let (events, event_rx) = mpsc::unbounded_channel();
    let (rerun_tx, rerun_rx) = rerun_channel();
    let shutdown = CancellationToken::new();

    let watcher = ChangeWatcher::with_parts(
        WatchSettings {
            root: PathBuf::from("."),
            debounce: DEBOUNCE,
            clear_screen: false,
        },
        PathFilter::new(ignore.iter().copied()),
        Arc::new(fs.clone()),
        Box::new(registrar.clone()),
        event_rx,
        rerun_tx,
    )
    .expect("watcher setup");

    let task = tokio::spawn(watcher.run(shutdown.clone()));

    Harness {
        events,
        rerun_rx,
        registrar,
        fs,
        shutdown,
        task,
    }
}

impl Harness {
    fn send(&self, kind: EventKind, path: &str) {
        self.events
            .send(Ok(Event::new(kind).add_path(PathBuf::from(path))))
            .expect("reactor alive");
    }

    fn modify(&self, path: &str) {
        self.send(EventKind::Modify(ModifyKind::Any), path);
    }

    async fn expect_signal(&mut self) {
        with_timeout(self.rerun_rx.recv())
            .await
            .expect("rerun channel open");
    }

    async fn no_signal_within(&mut self, window: Duration) -> bool {
        timeout(window, self.rerun_rx.recv()).await.is_err()
    }
}

#[tokio::test(start_paused = true)]
async fn first_run_is_signalled_at_startup() -> TestResult {
    let mut h = start(&[]);
    let started = Instant::now();

    h.expect_signal().await;

    assert!(started.elapsed() < Duration::from_millis(5));
    assert!(h.no_signal_within(Duration::from_secs(1)).await);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn startup_registers_the_tree() -> TestResult {
    let mut h = start(&[]);
    h.expect_signal().await;

    assert_eq!(
        h.registrar.registered(),
        vec![PathBuf::from("."), PathBuf::from("./src")]
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn burst_of_events_yields_one_signal_after_quiet_period() -> TestResult {
    let mut h = start(&[]);
    h.expect_signal().await;

    h.modify("./src/main.rs");
    sleep(Duration::from_millis(10)).await;
    h.modify("./src/main.rs");
    let last_event = Instant::now();

    h.expect_signal().await;
    let waited = last_event.elapsed();

    assert!(waited >= DEBOUNCE, "fired early after {waited:?}");
    assert!(waited < DEBOUNCE + Duration::from_millis(5), "fired late after {waited:?}");
    assert!(h.no_signal_within(Duration::from_secs(1)).await);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn steady_trickle_keeps_postponing_the_run() -> TestResult {
    let mut h = start(&[]);
    h.expect_signal().await;

    for _ in 0..10 {
        h.modify("./src/main.rs");
        // Shorter than the debounce window, so it never gets to fire.
        assert!(h.no_signal_within(Duration::from_millis(60)).await);
    }

    h.expect_signal().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn ignored_paths_do_not_trigger() -> TestResult {
    let mut h = start(&["*.log"]);
    h.expect_signal().await;

    h.modify("./build.log");

    assert!(h.no_signal_within(Duration::from_secs(1)).await);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn one_relevant_path_is_enough() -> TestResult {
    let mut h = start(&["*.log"]);
    h.expect_signal().await;

    let event = Event::new(EventKind::Modify(ModifyKind::Any))
        .add_path(PathBuf::from("./build.log"))
        .add_path(PathBuf::from("./src/main.rs"));
    h.events.send(Ok(event))?;

    h.expect_signal().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn access_events_are_ignored() -> TestResult {
    let mut h = start(&[]);
    h.expect_signal().await;

    h.send(EventKind::Access(AccessKind::Any), "./src/main.rs");

    assert!(h.no_signal_within(Duration::from_secs(1)).await);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn new_directories_are_registered() -> TestResult {
    let mut h = start(&["*.log"]);
    h.expect_signal().await;

    h.fs.add_dir("./assets/icons");
    h.send(EventKind::Create(CreateKind::Folder), "./assets");

    h.expect_signal().await;
    assert!(h.registrar.is_registered("./assets"));
    assert!(h.registrar.is_registered("./assets/icons"));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn backend_errors_do_not_stop_the_reactor() -> TestResult {
    let mut h = start(&[]);
    h.expect_signal().await;

    h.events.send(Err(notify::Error::generic("queue overflow")))?;
    h.modify("./src/main.rs");

    h.expect_signal().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn pending_signal_absorbs_later_fires() -> TestResult {
    let mut h = start(&[]);
    // Leave the startup token unconsumed so the slot stays full.
    sleep(Duration::from_millis(10)).await;

    h.modify("./src/main.rs");
    sleep(DEBOUNCE * 2).await;
    h.modify("./src/main.rs");
    sleep(DEBOUNCE * 2).await;

    h.expect_signal().await;
    assert!(h.no_signal_within(Duration::from_secs(1)).await);
    assert!(!h.task.is_finished());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_the_reactor() -> TestResult {
    let mut h = start(&[]);
    h.expect_signal().await;
    h.modify("./src/main.rs");

    h.shutdown.cancel();

    with_timeout(h.task).await??;
    // The armed timer is abandoned with the reactor.
    assert!(h.rerun_rx.recv().await.is_none());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn closed_event_source_stops_the_reactor() -> TestResult {
    let h = start(&[]);
    let Harness { events, task, .. } = h;

    drop(events);

    with_timeout(task).await??;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn dropped_runner_stops_the_reactor_on_next_fire() -> TestResult {
    let h = start(&[]);
    let Harness {
        events,
        rerun_rx,
        task,
        ..
    } = h;

    drop(rerun_rx);
    // The startup fire already sees the closed channel.
    with_timeout(task).await??;
    drop(events);
    Ok(())
}
