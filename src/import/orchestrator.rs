//! Import coordination.
//!
//! The ImportOrchestrator drives one run:
//! 1. Check the target table
//! 2. Pack input lines into batches
//! 3. Spawn one task per batch, at most `parallelism` in flight
//! 4. Aggregate outcomes on a single task
//! 5. Report totals once every task has finished

use crate::backend::StorageBackend;
use crate::config::ImportConfig;
use crate::error::{BatchError, ImportError};
use crate::import::packer::{Batch, RecordPacker};
use crate::import::reporter::RunReporter;
use crate::import::stats::{BatchOutcome, RunSummary, RunTotals};
use crate::import::writer::{BatchWriteResult, BatchWriter};
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, BufReader};
use tokio::sync::{Semaphore, mpsc};
use tokio::task::{JoinHandle, JoinSet};

/// Messages from the dispatch loop and batch tasks to the aggregator.
enum RunEvent {
    Dispatched,
    Finished(BatchOutcome),
}

/// Runs a bulk import into one table.
pub struct ImportOrchestrator {
    backend: Arc<dyn StorageBackend>,
    config: ImportConfig,
}

impl ImportOrchestrator {
    pub fn new(backend: Arc<dyn StorageBackend>, config: ImportConfig) -> Self {
        Self { backend, config }
    }

    /// Import every record of the newline-delimited JSON file at `path`.
    pub async fn import_file(&self, path: impl AsRef<Path>) -> Result<RunSummary, ImportError> {
        let path = path.as_ref();
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|source| ImportError::OpenInput {
                path: path.to_path_buf(),
                source,
            })?;

        log::info!(
            "importing {} into table '{}' (parallelism {})",
            path.display(),
            self.config.table_name,
            self.config.parallelism
        );
        self.run(BufReader::new(file)).await
    }

    /// Import every record read from `source`.
    ///
    /// Fails only when the configuration is invalid, the table check fails,
    /// or reading the source fails. Batch failures, panics included, are
    /// counted in the summary instead.
    pub async fn run<R>(&self, source: R) -> Result<RunSummary, ImportError>
    where
        R: AsyncBufRead + Unpin,
    {
        self.config.validate()?;
        self.check_table().await?;

        let writer = Arc::new(BatchWriter::new(
            self.backend.clone(),
            self.config.table_name.clone(),
            self.config.backoff.clone(),
        ));
        let permits = Arc::new(Semaphore::new(self.config.parallelism));
        let (events, receiver) = mpsc::unbounded_channel();
        let reporter = RunReporter::start(self.config.progress_every, self.config.show_progress);
        let aggregator = spawn_aggregator(receiver, reporter);

        let mut packer = RecordPacker::new(source);
        let mut tasks = JoinSet::new();

        let read_result = loop {
            let batch = match packer.pack().await {
                Ok(Some(batch)) => batch,
                Ok(None) => break Ok(()),
                Err(e) => break Err(e),
            };

            // The semaphore is never closed, so acquisition only waits.
            let Ok(permit) = permits.clone().acquire_owned().await else {
                break Ok(());
            };

            let _ = events.send(RunEvent::Dispatched);
            let throttle = self
                .config
                .is_throttled(batch.index)
                .then(|| self.config.throttle_delay());
            let writer = writer.clone();
            let events = events.clone();

            tasks.spawn(async move {
                let outcome = isolate_batch(writer, batch, throttle).await;
                drop(permit);
                let _ = events.send(RunEvent::Finished(outcome));
            });

            while let Some(joined) = tasks.try_join_next() {
                log_join_error(joined);
            }
        };

        while let Some(joined) = tasks.join_next().await {
            log_join_error(joined);
        }
        drop(events);

        let (mut totals, reporter) = aggregator.await?;
        totals.merge(RunTotals {
            total_items: packer.total_items(),
            skipped_lines: packer.skipped_lines(),
            ..Default::default()
        });
        let summary = reporter.finish(totals);

        if let Err(source) = read_result {
            log::error!(
                "input read failed after {} batches, remaining input not imported",
                summary.totals.batches
            );
            return Err(ImportError::Read {
                source,
                summary: Box::new(summary),
            });
        }

        Ok(summary)
    }

    async fn check_table(&self) -> Result<(), ImportError> {
        let table = &self.config.table_name;
        match self.backend.table_exists(table).await {
            Ok(true) => {
                log::debug!("table '{}' exists", table);
                Ok(())
            }
            Ok(false) => Err(ImportError::TableNotFound(table.clone())),
            Err(e) => Err(ImportError::TableCheck(e)),
        }
    }
}

/// Run the write on its own task so a panic fails only this batch.
async fn isolate_batch(
    writer: Arc<BatchWriter>,
    batch: Batch,
    throttle: Option<std::time::Duration>,
) -> BatchOutcome {
    let (index, items) = (batch.index, batch.len());
    match tokio::spawn(async move { write_batch(&writer, batch, throttle).await }).await {
        Ok(outcome) => outcome,
        Err(e) => BatchOutcome {
            index,
            items,
            result: BatchWriteResult {
                unprocessed: 0,
                attempts: 0,
                error: Some(BatchError::Aborted(e.to_string())),
            },
        },
    }
}

fn log_join_error(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        log::error!("batch task ended abnormally: {}", e);
    }
}

async fn write_batch(
    writer: &BatchWriter,
    batch: Batch,
    throttle: Option<std::time::Duration>,
) -> BatchOutcome {
    if let Some(delay) = throttle {
        log::trace!("batch {}: throttling for {:?}", batch.index, delay);
        tokio::time::sleep(delay).await;
    }

    let result = writer.write(&batch).await;
    BatchOutcome {
        index: batch.index,
        items: batch.len(),
        result,
    }
}

fn spawn_aggregator(
    mut receiver: mpsc::UnboundedReceiver<RunEvent>,
    mut reporter: RunReporter,
) -> JoinHandle<(RunTotals, RunReporter)> {
    tokio::spawn(async move {
        let mut totals = RunTotals::default();
        while let Some(event) = receiver.recv().await {
            match event {
                RunEvent::Dispatched => reporter.batch_dispatched(),
                RunEvent::Finished(outcome) => {
                    totals.record(&outcome);
                    reporter.batch_finished(&outcome, &totals);
                }
            }
        }
        (totals, reporter)
    })
}
