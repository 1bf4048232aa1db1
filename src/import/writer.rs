//! Per-batch writes with retry.

use crate::backend::StorageBackend;
use crate::config::BackoffConfig;
use crate::error::BatchError;
use crate::import::backoff::ExponentialBackoff;
use crate::import::packer::Batch;
use std::sync::Arc;
use tokio::time::sleep;

/// Outcome of writing one batch.
///
/// `unprocessed` sums the leftovers reported by every attempt, so a batch
/// that needed a retry reports more than the backend finally dropped. A
/// fatal attempt adds nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchWriteResult {
    pub unprocessed: usize,
    pub attempts: u32,
    pub error: Option<BatchError>,
}

impl BatchWriteResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Submits batches to one table, retrying throttling and partial writes.
#[derive(Clone)]
pub struct BatchWriter {
    backend: Arc<dyn StorageBackend>,
    table_name: String,
    backoff: BackoffConfig,
}

impl BatchWriter {
    pub fn new(
        backend: Arc<dyn StorageBackend>,
        table_name: impl Into<String>,
        backoff: BackoffConfig,
    ) -> Self {
        Self {
            backend,
            table_name: table_name.into(),
            backoff,
        }
    }

    /// Write `batch`, resubmitting the whole batch after each partial
    /// success or throttling error until it goes through, a fatal error
    /// occurs, or the backoff policy gives up.
    pub async fn write(&self, batch: &Batch) -> BatchWriteResult {
        let mut backoff = ExponentialBackoff::new(self.backoff.clone());
        let mut unprocessed = 0usize;
        let mut attempts = 0u32;

        loop {
            attempts += 1;

            let cause = match self.backend.batch_put(&self.table_name, &batch.items).await {
                Ok(0) => {
                    log::trace!("batch {}: written on attempt {}", batch.index, attempts);
                    return BatchWriteResult {
                        unprocessed,
                        attempts,
                        error: None,
                    };
                }
                Ok(left) => {
                    unprocessed += left;
                    log::debug!(
                        "batch {}: attempt {} left {} of {} items unprocessed",
                        batch.index,
                        attempts,
                        left,
                        batch.len()
                    );
                    format!("{} items unprocessed", left)
                }
                Err(e) if e.is_retryable() => {
                    log::debug!("batch {}: attempt {} throttled: {}", batch.index, attempts, e);
                    e.to_string()
                }
                Err(e) => {
                    return BatchWriteResult {
                        unprocessed,
                        attempts,
                        error: Some(BatchError::Backend(e)),
                    };
                }
            };

            match backoff.next_backoff() {
                Some(delay) => {
                    log::debug!(
                        "batch {}: retrying after {:?} (attempt {})",
                        batch.index,
                        delay,
                        attempts + 1
                    );
                    sleep(delay).await;
                }
                None => {
                    log::warn!(
                        "batch {}: backoff exhausted after {} attempts over {:?}",
                        batch.index,
                        attempts,
                        backoff.elapsed()
                    );
                    return BatchWriteResult {
                        unprocessed,
                        attempts,
                        error: Some(BatchError::RetriesExhausted {
                            attempts,
                            unprocessed,
                            cause,
                        }),
                    };
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BackendError;
    use crate::import::record::{Record, WriteItem};
    use crate::test_support::{MemoryBackend, ScriptedPut};
    use std::time::Duration;

    const TABLE: &str = "records";

    fn batch(n: usize) -> Batch {
        let items = (0..n)
            .map(|i| {
                let mut record = Record::new();
                record.insert("pk".into(), format!("foo{i}"));
                record.insert("val1".into(), format!("bar{i}"));
                WriteItem::put(record)
            })
            .collect();
        Batch { index: 0, items }
    }

    fn fast_backoff() -> BackoffConfig {
        BackoffConfig {
            initial_interval: Duration::from_millis(10),
            multiplier: 1.5,
            randomization_factor: 0.0,
            max_interval: Duration::from_millis(100),
            max_elapsed_time: Duration::from_secs(60),
            max_retries: None,
        }
    }

    fn writer(backend: &Arc<MemoryBackend>, backoff: BackoffConfig) -> BatchWriter {
        BatchWriter::new(backend.clone(), TABLE, backoff)
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_attempt_success() {
        let backend = Arc::new(MemoryBackend::with_table(TABLE, "pk"));
        let result = writer(&backend, fast_backoff()).write(&batch(25)).await;

        assert_eq!(result.unprocessed, 0);
        assert_eq!(result.attempts, 1);
        assert!(result.is_success());
        assert_eq!(backend.put_calls(), 1);
        assert_eq!(backend.len(TABLE), 25);
    }

    // Leftovers from every attempt are summed even though the retry
    // succeeded, so the report overcounts what was finally lost.
    #[tokio::test(start_paused = true)]
    async fn test_partial_success_accumulates_unprocessed_across_attempts() {
        let backend = Arc::new(MemoryBackend::with_table(TABLE, "pk"));
        backend.script([ScriptedPut::Partial(3), ScriptedPut::Apply]);

        let result = writer(&backend, fast_backoff()).write(&batch(25)).await;

        assert_eq!(result.unprocessed, 3);
        assert_eq!(result.attempts, 2);
        assert_eq!(result.error, None);
        assert_eq!(backend.put_calls(), 2);
        assert_eq!(backend.items_submitted(), 50, "whole batch is resubmitted");
        assert_eq!(backend.len(TABLE), 25);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resubmission_is_idempotent() {
        let backend = Arc::new(MemoryBackend::with_table(TABLE, "pk"));
        backend.script([
            ScriptedPut::Partial(10),
            ScriptedPut::Partial(2),
            ScriptedPut::Apply,
        ]);

        let input = batch(25);
        let result = writer(&backend, fast_backoff()).write(&input).await;
        assert!(result.is_success());
        assert_eq!(result.unprocessed, 12);

        let rewrite = writer(&backend, fast_backoff()).write(&input).await;
        assert!(rewrite.is_success());

        assert_eq!(backend.len(TABLE), 25);
        for item in &input.items {
            let key = item.get("pk").unwrap();
            assert_eq!(backend.get(TABLE, key).as_ref(), Some(item.attributes()));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_stops_without_retry() {
        let backend = Arc::new(MemoryBackend::with_table(TABLE, "pk"));
        backend.script([ScriptedPut::Fail(BackendError::rejected(
            "ValidationException",
        ))]);

        let result = writer(&backend, fast_backoff()).write(&batch(25)).await;

        assert_eq!(result.unprocessed, 0);
        assert_eq!(result.attempts, 1);
        assert_eq!(
            result.error,
            Some(BatchError::Backend(BackendError::rejected(
                "ValidationException"
            )))
        );
        assert_eq!(backend.put_calls(), 1);
        assert_eq!(backend.len(TABLE), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_after_partial_keeps_accumulated_count() {
        let backend = Arc::new(MemoryBackend::with_table(TABLE, "pk"));
        backend.script([
            ScriptedPut::Partial(4),
            ScriptedPut::Fail(BackendError::rejected("AccessDenied")),
        ]);

        let result = writer(&backend, fast_backoff()).write(&batch(25)).await;

        assert_eq!(result.unprocessed, 4);
        assert_eq!(result.attempts, 2);
        assert!(matches!(result.error, Some(BatchError::Backend(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttling_is_retried() {
        let backend = Arc::new(MemoryBackend::with_table(TABLE, "pk"));
        backend.script([
            ScriptedPut::Fail(BackendError::throttled("retry quota exceeded")),
            ScriptedPut::Fail(BackendError::throttled("retry quota exceeded")),
            ScriptedPut::Apply,
        ]);

        let result = writer(&backend, fast_backoff()).write(&batch(5)).await;

        assert!(result.is_success());
        assert_eq!(result.attempts, 3);
        assert_eq!(result.unprocessed, 0);
        assert_eq!(backend.len(TABLE), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_backoff_degrades_to_batch_error() {
        let backend = Arc::new(MemoryBackend::with_table(TABLE, "pk"));
        backend.script((0..10).map(|_| ScriptedPut::Partial(1)));

        let mut backoff = fast_backoff();
        backoff.max_retries = Some(2);
        let result = writer(&backend, backoff).write(&batch(5)).await;

        assert_eq!(result.attempts, 3);
        assert_eq!(result.unprocessed, 3);
        assert_eq!(
            result.error,
            Some(BatchError::RetriesExhausted {
                attempts: 3,
                unprocessed: 3,
                cause: "1 items unprocessed".to_string(),
            })
        );
        assert_eq!(backend.put_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttling_exhausts_on_elapsed_time() {
        let backend = Arc::new(MemoryBackend::with_table(TABLE, "pk"));
        backend.script((0..100).map(|_| ScriptedPut::Fail(BackendError::throttled("slow down"))));

        let mut backoff = fast_backoff();
        backoff.max_elapsed_time = Duration::from_millis(200);
        let result = writer(&backend, backoff).write(&batch(5)).await;

        let Some(BatchError::RetriesExhausted { cause, .. }) = result.error else {
            panic!("expected exhausted retries, got {:?}", result.error);
        };
        assert_eq!(cause, "throttled: slow down");
        assert!(result.attempts > 1);
        assert_eq!(result.unprocessed, 0);
    }
}
