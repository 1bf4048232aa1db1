//! Import statistics tracking.
//!
//! Tracks records submitted and left unprocessed across all batches of a run.

use crate::import::writer::BatchWriteResult;
use serde::Serialize;
use std::time::Duration;

/// Result of one dispatched batch, as seen by the aggregator.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub index: usize,
    /// Items in the batch.
    pub items: usize,
    pub result: BatchWriteResult,
}

impl BatchOutcome {
    /// Unprocessed items this batch adds to the run.
    ///
    /// A failed batch counts in full. A successful one counts its
    /// accumulated leftovers, capped at the batch size so the run total
    /// never exceeds the records submitted.
    pub fn charged_unprocessed(&self) -> usize {
        if self.result.error.is_some() {
            self.items
        } else {
            self.result.unprocessed.min(self.items)
        }
    }
}

/// Counters for a single import run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunTotals {
    /// Records parsed and placed in some batch
    pub total_items: usize,
    /// Records reported as not durably written
    pub unprocessed_items: usize,
    /// Batches that finished, successfully or not
    pub batches: usize,
    /// Batches that ended with a fatal error
    pub failed_batches: usize,
    /// Input lines dropped as malformed
    pub skipped_lines: usize,
}

impl RunTotals {
    pub fn record(&mut self, outcome: &BatchOutcome) {
        self.batches += 1;
        self.unprocessed_items += outcome.charged_unprocessed();
        if outcome.result.error.is_some() {
            self.failed_batches += 1;
        }
    }

    /// Merge another RunTotals into this one by summing all counts.
    pub fn merge(&mut self, other: RunTotals) {
        self.total_items += other.total_items;
        self.unprocessed_items += other.unprocessed_items;
        self.batches += other.batches;
        self.failed_batches += other.failed_batches;
        self.skipped_lines += other.skipped_lines;
    }

    /// Records confirmed written.
    pub fn written(&self) -> usize {
        self.total_items.saturating_sub(self.unprocessed_items)
    }
}

/// Final report of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    #[serde(flatten)]
    pub totals: RunTotals,
    pub written: usize,
    pub elapsed_seconds: f64,
    #[serde(skip)]
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn new(totals: RunTotals, elapsed: Duration) -> Self {
        Self {
            written: totals.written(),
            totals,
            elapsed_seconds: elapsed.as_secs_f64(),
            elapsed,
        }
    }

    /// One-line human-readable summary.
    pub fn message(&self) -> String {
        format!(
            "All batches finished, updated {} records in {:.3} seconds",
            self.written, self.elapsed_seconds
        )
    }
}
