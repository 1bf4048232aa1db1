use crate::import::stats::RunSummary;
use std::path::PathBuf;
use thiserror::Error;

/// Errors reported by a storage backend for a single call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    /// Transient rate limiting (retry quota or throughput exceeded).
    #[error("throttled: {0}")]
    Throttled(String),
    /// Any other failure of the request.
    #[error("request rejected: {0}")]
    Rejected(String),
    /// An item could not be encoded for the backend.
    #[error("invalid item: {0}")]
    InvalidItem(String),
}

impl BackendError {
    pub fn throttled(msg: impl Into<String>) -> Self {
        Self::Throttled(msg.into())
    }

    pub fn rejected(msg: impl Into<String>) -> Self {
        Self::Rejected(msg.into())
    }

    /// Only throttling is worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Throttled(_))
    }
}

/// Terminal failure of one batch. Never fatal for the run.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BatchError {
    #[error("backend error: {0}")]
    Backend(BackendError),
    #[error("gave up after {attempts} attempts ({unprocessed} unprocessed): {cause}")]
    RetriesExhausted {
        attempts: u32,
        unprocessed: usize,
        cause: String,
    },
    /// The task writing the batch panicked or was cancelled.
    #[error("batch task aborted: {0}")]
    Aborted(String),
}

/// Errors that abort a whole import run.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("failed to open {}: {source}", .path.display())]
    OpenInput {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Reading stopped partway. `summary` covers the batches that ran.
    #[error(
        "failed to read input after {} records were submitted: {source}",
        .summary.totals.total_items
    )]
    Read {
        source: std::io::Error,
        summary: Box<RunSummary>,
    },
    #[error("check table failed: {0}")]
    TableCheck(BackendError),
    #[error("table '{0}' does not exist")]
    TableNotFound(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("batch task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl ImportError {
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}
