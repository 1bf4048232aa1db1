//! Storage backends the importer writes to.
//!
//! The pipeline only needs two capabilities from a backend: checking that the
//! target table exists, and submitting a batch of puts while learning how many
//! of them were left unapplied.

pub mod dynamodb;

use crate::error::BackendError;
use crate::import::record::WriteItem;
use async_trait::async_trait;

pub use dynamodb::{DynamoDbBackend, DynamoDbConfig};

#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn table_exists(&self, table: &str) -> Result<bool, BackendError>;

    /// Submit `items` as one bulk put.
    ///
    /// `Ok(n)` means the request was accepted and `n` items were not applied.
    async fn batch_put(&self, table: &str, items: &[WriteItem]) -> Result<usize, BackendError>;
}
