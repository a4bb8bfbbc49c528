// src/lib.rs

pub mod array; // Lazy selections and chunk materialization
pub mod config;
pub mod constants;
pub mod coordinator; // Worker pool and run lifecycle
pub mod discovery;
pub mod error;
pub mod executor;
pub mod metrics; // Per-trial metrics and per-strategy rows
pub mod partition;
pub mod profiler;
pub mod report; // TSV export for machine-readable results
pub mod store;
pub mod strategy;
pub mod task;

pub use coordinator::{CancellationToken, RunCoordinator, RunOptions, RunReport, RunState};
pub use error::{BenchError, Result};
pub use strategy::StrategyDescriptor;
pub use task::SelectionTask;
