// src/watch/mod.rs

//! File watching and change detection.
//!
//! This module is responsible for:
//! - Compiling ignore globs (`filter`).
//! - Registering every non-ignored directory with the notification backend
//!   (`crawler`).
//! - Debouncing raw events into rerun signals (`watcher`).
//!
//! It does **not** know about commands; it only tells the runner that
//! something relevant changed.

pub mod crawler;
pub mod filter;
pub mod path_utils;
pub mod watcher;

pub use crawler::{CrawlReport, DirectoryCrawler, WatchRegistrar};
pub use filter::{IgnorePattern, PathFilter};
pub use path_utils::normalize_path;
pub use watcher::{ChangeWatcher, RawEventReceiver, WatchSettings};
