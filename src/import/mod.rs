//! Bulk record import.
//!
//! This module provides the pipeline that loads newline-delimited JSON
//! records into a table:
//!
//! 1. **Parsing** (`record`) - Turns one line into a flat string record
//! 2. **Packing** (`packer`) - Groups records into batches of at most 25 puts
//! 3. **Writing** (`writer`, `backoff`) - Submits a batch, retrying throttling
//!    and partial writes with exponential backoff
//! 4. **Coordination** (`orchestrator`) - Dispatches batches concurrently and
//!    aggregates their outcomes
//! 5. **Reporting** (`stats`, `reporter`) - Tracks totals, progress and
//!    elapsed time
//!
//! # Concurrency
//!
//! Each batch runs on its own tokio task. A semaphore keeps at most
//! `parallelism` batches in flight, and every batch whose index is a multiple
//! of `parallelism` waits `parallelism * throttle_step` before its first
//! write. Outcomes flow over a channel to one aggregator task, which owns
//! the run totals. Batches complete in any order. A run cannot be cancelled
//! once started.
//!
//! # Accounting
//!
//! A retried batch is resubmitted whole, and the leftovers reported by every
//! attempt are summed, so `unprocessed_items` can overstate what was lost.
//! The count is capped per batch at the batch size.
//!
//! # Example Usage
//!
//! ```rust,ignore
//! use ddbimport::import::ImportOrchestrator;
//! use ddbimport::ImportConfig;
//!
//! let orchestrator = ImportOrchestrator::new(backend, ImportConfig::from_env("records"));
//! let summary = orchestrator.import_file("records.json").await?;
//!
//! println!("{}", summary.message());
//! ```

pub mod backoff;
pub mod orchestrator;
pub mod packer;
pub mod record;
pub mod reporter;
pub mod stats;
pub mod writer;

// Re-export main types
pub use orchestrator::ImportOrchestrator;
pub use packer::{Batch, RecordPacker};
pub use record::{Record, RecordError, WriteItem};
pub use stats::{RunSummary, RunTotals};
pub use writer::{BatchWriteResult, BatchWriter};
