// src/exec/mod.rs

//! Process execution layer.
//!
//! This module is responsible for actually running the configured commands
//! and for making sure runs never overlap.
//!
//! - [`pipeline`] parses command lines into ordered steps.
//! - [`process`] owns a spawned step as a whole process group.
//! - [`backend`] provides the `StepBackend` trait and the real
//!   `ProcessBackend`; tests replace it with a fake implementation.
//! - [`runner`] is the cancel-and-restart scheduler driven by rerun signals.

pub mod backend;
pub mod pipeline;
pub mod process;
pub mod runner;

pub use backend::{ProcessBackend, StepBackend, StepFuture};
pub use pipeline::{CommandPipeline, PipelineStep};
pub use process::ProcessGroup;
pub use runner::CommandRunner;
