use std::error::Error;
use std::fs;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

use watchrun::supervisor::rerun_channel;
use watchrun::watch::{ChangeWatcher, PathFilter, WatchSettings};
use watchrun_test_utils::builders::ConfigFileBuilder;
use watchrun_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

const SETTLE: Duration = Duration::from_millis(300);

/// Discard anything already queued once the tree has gone quiet.
async fn settle(rx: &mut mpsc::Receiver<()>) {
    sleep(SETTLE).await;
    while rx.try_recv().is_ok() {}
}

#[tokio::test]
async fn file_changes_on_disk_trigger_a_rerun() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    fs::create_dir_all(dir.path().join("src"))?;
    fs::write(dir.path().join("src/main.rs"), "fn main() {}")?;

    let (rerun_tx, mut rerun_rx) = rerun_channel();
    let watcher = ChangeWatcher::new(
        WatchSettings {
            root: dir.path().to_path_buf(),
            debounce: Duration::from_millis(50),
            clear_screen: false,
        },
        PathFilter::new(["*.log"]),
        rerun_tx,
    )?;
    let shutdown = CancellationToken::new();
    let task = tokio::spawn(watcher.run(shutdown.clone()));

    // Startup run.
    with_timeout(rerun_rx.recv()).await;
    settle(&mut rerun_rx).await;

    fs::write(dir.path().join("src/main.rs"), "fn main() { println!(); }")?;
    with_timeout(rerun_rx.recv()).await;
    settle(&mut rerun_rx).await;

    fs::write(dir.path().join("build.log"), "noise")?;
    assert!(
        timeout(Duration::from_millis(500), rerun_rx.recv()).await.is_err(),
        "ignored file triggered a rerun"
    );

    shutdown.cancel();
    with_timeout(task).await??;
    Ok(())
}

#[tokio::test]
async fn directories_created_later_are_watched() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;

    let (rerun_tx, mut rerun_rx) = rerun_channel();
    let watcher = ChangeWatcher::new(
        WatchSettings {
            root: dir.path().to_path_buf(),
            debounce: Duration::from_millis(50),
            clear_screen: false,
        },
        PathFilter::new(Vec::<String>::new()),
        rerun_tx,
    )?;
    let shutdown = CancellationToken::new();
    let task = tokio::spawn(watcher.run(shutdown.clone()));

    with_timeout(rerun_rx.recv()).await;

    fs::create_dir(dir.path().join("pkg"))?;
    with_timeout(rerun_rx.recv()).await;
    settle(&mut rerun_rx).await;

    // Only seen if the new directory was registered.
    fs::write(dir.path().join("pkg/mod.rs"), "pub fn f() {}")?;
    with_timeout(rerun_rx.recv()).await;

    shutdown.cancel();
    with_timeout(task).await??;
    Ok(())
}

#[tokio::test]
async fn writes_to_own_log_file_do_not_retrigger() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let log = dir.path().join("watchrun.log");
    fs::write(&log, "")?;
    let cfg = ConfigFileBuilder::new()
        .root(dir.path())
        .command("true")
        .log_file(&log)
        .build();

    let (rerun_tx, mut rerun_rx) = rerun_channel();
    let watcher = ChangeWatcher::new(
        WatchSettings {
            root: cfg.root().clone(),
            debounce: Duration::from_millis(50),
            clear_screen: false,
        },
        PathFilter::new(cfg.effective_ignore()),
        rerun_tx,
    )?;
    let shutdown = CancellationToken::new();
    let task = tokio::spawn(watcher.run(shutdown.clone()));

    with_timeout(rerun_rx.recv()).await;
    settle(&mut rerun_rx).await;

    fs::write(&log, "INFO end of execution\n")?;
    assert!(
        timeout(Duration::from_millis(500), rerun_rx.recv()).await.is_err(),
        "log write triggered a rerun"
    );

    shutdown.cancel();
    with_timeout(task).await??;
    Ok(())
}

#[test]
fn unreadable_root_fails_at_construction() {
    let (rerun_tx, _rerun_rx) = rerun_channel();
    let result = ChangeWatcher::new(
        WatchSettings {
            root: "/definitely/not/a/watchrun/root".into(),
            debounce: Duration::from_millis(50),
            clear_screen: false,
        },
        PathFilter::new(Vec::<String>::new()),
        rerun_tx,
    );

    assert!(result.is_err());
}
