//! Error taxonomy for benchmark runs
//!
//! Errors fall in two classes:
//! - per-strategy errors, caught at the worker boundary and turned into a skip
//! - run-level errors, which abort the run and reach the caller

use thiserror::Error;

pub type Result<T> = std::result::Result<T, BenchError>;

#[derive(Debug, Error)]
pub enum BenchError {
    /// Invalid worker count, trial count or other option (fatal, before dispatch)
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Layout label could not be parsed into chunk sizes
    #[error("cannot parse layout label '{label}': {reason}")]
    StrategyParse { label: String, reason: String },

    /// Store unreachable, path missing or metadata unreadable
    #[error("cannot open '{locator}': {reason}")]
    AccessorOpen { locator: String, reason: String },

    /// Selection out of bounds, exact match miss, or chunk read failure
    #[error("selection failed: {0}")]
    Selection(String),

    /// Zero chunk count, nothing to divide by
    #[error("degenerate chunk geometry: {0}")]
    DegenerateGeometry(String),

    /// A worker terminated without reporting its batch
    #[error("worker {worker_id} did not finish its batch: {reason}")]
    PartitionJoin { worker_id: usize, reason: String },

    /// Memory or CPU clock could not be sampled
    #[error("profiler error: {0}")]
    Profiler(String),

    /// Local filesystem failure outside a strategy (report, fixtures)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BenchError {
    /// Per-strategy errors are recovered by skipping the strategy.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            BenchError::StrategyParse { .. }
                | BenchError::AccessorOpen { .. }
                | BenchError::Selection(_)
                | BenchError::DegenerateGeometry(_)
                | BenchError::Profiler(_)
        )
    }

    pub fn open(locator: impl Into<String>, reason: impl ToString) -> Self {
        BenchError::AccessorOpen {
            locator: locator.into(),
            reason: reason.to_string(),
        }
    }

    pub fn parse(label: impl Into<String>, reason: impl ToString) -> Self {
        BenchError::StrategyParse {
            label: label.into(),
            reason: reason.to_string(),
        }
    }
}
