// src/lib.rs

pub mod cli;
pub mod config;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod supervisor;
pub mod watch;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::ConfigFile;
use crate::exec::CommandPipeline;
use crate::supervisor::{ShutdownHandle, Supervisor};
use crate::watch::PathFilter;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - logging
/// - the supervisor (watcher + runner)
/// - Ctrl-C / SIGTERM handling
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = args.config_path();
    let mut cfg = load_and_validate(&config_path)
        .with_context(|| format!("loading config from {}", config_path.display()))?;

    match &args.root {
        Some(root) => cfg.set_root(root.clone()),
        None => {
            let root = resolve_root(&config_path, cfg.root());
            cfg.set_root(root);
        }
    }

    if args.dry_run {
        print_dry_run(&cfg)?;
        return Ok(());
    }

    let log_handle = logging::init_logging(args.log_level, cfg.log_level(), cfg.log_files())?;
    info!(
        config = %config_path.display(),
        root = %cfg.root().display(),
        commands = cfg.commands().len(),
        "configuration loaded"
    );

    let (supervisor, shutdown) = Supervisor::<exec::ProcessBackend>::from_config(&cfg, log_handle)?;
    tokio::spawn(forward_os_signal(shutdown));

    supervisor.run().await?;
    info!("watchrun exiting");
    Ok(())
}

/// Figure out the directory to watch.
///
/// A relative `root` from the config file is taken relative to the directory
/// containing that file. If the config path is a bare filename like
/// "Watchrun.toml" (parent = ""), the root is used as given.
fn resolve_root(config_path: &Path, root: &Path) -> PathBuf {
    if root.is_absolute() {
        return root.to_path_buf();
    }
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.join(root),
        _ => root.to_path_buf(),
    }
}

/// Wait for Ctrl-C (or SIGTERM on Unix) and request shutdown once.
async fn forward_os_signal(shutdown: ShutdownHandle) {
    match wait_for_os_signal().await {
        Ok(signal) => info!(signal, "received OS signal to shut down"),
        Err(err) => {
            // Without a signal listener the user can't stop us cleanly.
            warn!(error = %err, "failed to listen for shutdown signals; shutting down");
        }
    }
    shutdown.shutdown();
}

#[cfg(unix)]
async fn wait_for_os_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res.map(|()| "SIGINT"),
        _ = terminate.recv() => Ok("SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn wait_for_os_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await.map(|()| "ctrl-c")
}

/// Simple dry-run output: print root, ignore list and pipeline.
fn print_dry_run(cfg: &ConfigFile) -> Result<()> {
    let pipeline = CommandPipeline::from_commands(cfg.commands())?;
    let filter = PathFilter::new(cfg.effective_ignore());

    println!("watchrun dry-run");
    println!("  root = {}", cfg.root().display());
    println!("  timeout = {:?}", cfg.debounce_timeout());
    println!("  delay = {:?}", cfg.run_delay());
    println!();

    println!("ignore ({}):", filter.patterns().len());
    for pattern in filter.patterns() {
        if pattern.enabled() {
            println!("  - {}", pattern.pattern());
        } else {
            println!("  - {} (invalid, disabled)", pattern.pattern());
        }
    }
    println!();

    println!("commands ({}):", pipeline.len());
    for (index, step) in pipeline.steps().iter().enumerate() {
        println!("  {}. {}", index + 1, step.program());
        if !step.args().is_empty() {
            println!("      args: {:?}", step.args());
        }
    }

    debug!("dry-run complete (no execution)");
    Ok(())
}
