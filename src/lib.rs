pub mod backend;
pub mod config;
pub mod error;
pub mod import;

use env_logger::Env;
use std::sync::Once;

pub use config::{BackoffConfig, ImportConfig, MAX_BATCH_SIZE};
pub use error::{BackendError, BatchError, ImportError};
pub use import::{ImportOrchestrator, RunSummary};

static LOGGER: Once = Once::new();

/// Initialise `env_logger` once; `RUST_LOG` overrides the default filter.
pub fn init_logger() {
    LOGGER.call_once(|| {
        env_logger::Builder::from_env(Env::default().default_filter_or(
            "info,aws_config=warn,aws_smithy_runtime=warn,hyper=warn",
        ))
        .init();
    });
}

pub mod test_support {
    //! In-memory backend with scripted responses for tests.

    use crate::backend::StorageBackend;
    use crate::error::BackendError;
    use crate::import::record::{Record, WriteItem};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::{HashMap, HashSet, VecDeque};
    use std::io;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::task::{Context, Poll};
    use std::time::Duration;
    use tokio::io::{AsyncRead, ReadBuf};

    /// Response for the next `batch_put` call.
    #[derive(Debug, Clone)]
    pub enum ScriptedPut {
        /// Apply every item.
        Apply,
        /// Apply all but the last `n` items and report them unprocessed.
        Partial(usize),
        Fail(BackendError),
        /// Panic inside the call.
        Panic,
    }

    /// A reader whose every read fails, for chaining after good input.
    pub struct FailingReader {
        message: String,
    }

    impl FailingReader {
        pub fn new(message: impl Into<String>) -> Self {
            Self {
                message: message.into(),
            }
        }
    }

    impl AsyncRead for FailingReader {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Poll::Ready(Err(io::Error::other(self.message.clone())))
        }
    }

    /// Keyed table store. Puts overwrite by the configured key field.
    ///
    /// Calls follow the script first and apply everything once it runs out.
    /// Batches holding a key registered with [`MemoryBackend::fail_key`] fail
    /// regardless of the script.
    pub struct MemoryBackend {
        key_field: String,
        tables: Mutex<HashMap<String, HashMap<String, Record>>>,
        script: Mutex<VecDeque<ScriptedPut>>,
        poisoned_keys: Mutex<HashMap<String, BackendError>>,
        table_check_error: Mutex<Option<BackendError>>,
        put_delay: Duration,
        put_calls: AtomicUsize,
        items_submitted: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl MemoryBackend {
        pub fn new(key_field: impl Into<String>) -> Self {
            Self {
                key_field: key_field.into(),
                tables: Mutex::new(HashMap::new()),
                script: Mutex::new(VecDeque::new()),
                poisoned_keys: Mutex::new(HashMap::new()),
                table_check_error: Mutex::new(None),
                put_delay: Duration::ZERO,
                put_calls: AtomicUsize::new(0),
                items_submitted: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }
        }

        pub fn with_table(table: &str, key_field: impl Into<String>) -> Self {
            let backend = Self::new(key_field);
            backend.create_table(table);
            backend
        }

        /// Hold every put for `delay`, so overlapping calls can be observed.
        pub fn with_put_delay(mut self, delay: Duration) -> Self {
            self.put_delay = delay;
            self
        }

        pub fn create_table(&self, table: &str) {
            self.tables.lock().entry(table.to_string()).or_default();
        }

        pub fn script(&self, responses: impl IntoIterator<Item = ScriptedPut>) {
            self.script.lock().extend(responses);
        }

        pub fn fail_key(&self, key: impl Into<String>, error: BackendError) {
            self.poisoned_keys.lock().insert(key.into(), error);
        }

        pub fn fail_table_check(&self, error: BackendError) {
            *self.table_check_error.lock() = Some(error);
        }

        pub fn put_calls(&self) -> usize {
            self.put_calls.load(Ordering::SeqCst)
        }

        /// Items across all calls, resubmissions included.
        pub fn items_submitted(&self) -> usize {
            self.items_submitted.load(Ordering::SeqCst)
        }

        pub fn max_in_flight(&self) -> usize {
            self.max_in_flight.load(Ordering::SeqCst)
        }

        /// Distinct keys stored in `table`.
        pub fn len(&self, table: &str) -> usize {
            self.tables.lock().get(table).map(HashMap::len).unwrap_or(0)
        }

        pub fn get(&self, table: &str, key: &str) -> Option<Record> {
            self.tables.lock().get(table)?.get(key).cloned()
        }

        pub fn keys(&self, table: &str) -> HashSet<String> {
            self.tables
                .lock()
                .get(table)
                .map(|rows| rows.keys().cloned().collect())
                .unwrap_or_default()
        }

        fn next_response(&self, items: &[WriteItem]) -> ScriptedPut {
            let poisoned = self.poisoned_keys.lock();
            let hit = items
                .iter()
                .filter_map(|item| item.get(&self.key_field))
                .find_map(|key| poisoned.get(key).cloned());
            if let Some(error) = hit {
                return ScriptedPut::Fail(error);
            }
            drop(poisoned);

            self.script.lock().pop_front().unwrap_or(ScriptedPut::Apply)
        }

        fn apply(&self, table: &str, items: &[WriteItem]) -> Result<(), BackendError> {
            let mut tables = self.tables.lock();
            let rows = tables
                .get_mut(table)
                .ok_or_else(|| BackendError::rejected(format!("table '{table}' not found")))?;
            for item in items {
                let key = item.get(&self.key_field).ok_or_else(|| {
                    BackendError::rejected(format!("item is missing key '{}'", self.key_field))
                })?;
                rows.insert(key.to_string(), item.attributes().clone());
            }
            Ok(())
        }

        async fn put(&self, table: &str, items: &[WriteItem]) -> Result<usize, BackendError> {
            if !self.put_delay.is_zero() {
                tokio::time::sleep(self.put_delay).await;
            }

            match self.next_response(items) {
                ScriptedPut::Apply => {
                    self.apply(table, items)?;
                    Ok(0)
                }
                ScriptedPut::Partial(left) => {
                    let left = left.min(items.len());
                    self.apply(table, &items[..items.len() - left])?;
                    Ok(left)
                }
                ScriptedPut::Fail(error) => Err(error),
                ScriptedPut::Panic => panic!("scripted panic in batch_put"),
            }
        }
    }

    #[async_trait]
    impl StorageBackend for MemoryBackend {
        async fn table_exists(&self, table: &str) -> Result<bool, BackendError> {
            if let Some(error) = self.table_check_error.lock().clone() {
                return Err(error);
            }
            Ok(self.tables.lock().contains_key(table))
        }

        async fn batch_put(&self, table: &str, items: &[WriteItem]) -> Result<usize, BackendError> {
            self.put_calls.fetch_add(1, Ordering::SeqCst);
            self.items_submitted.fetch_add(items.len(), Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            let result = self.put(table, items).await;

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            result
        }
    }
}
