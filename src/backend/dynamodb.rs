//! DynamoDB backend
//!
//! Writes batches with `BatchWriteItem` and checks the target table with
//! `DescribeTable`. Every record field is stored as a string attribute.

use crate::backend::StorageBackend;
use crate::error::BackendError;
use crate::import::record::WriteItem;
use async_trait::async_trait;
use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_dynamodb::operation::describe_table::DescribeTableError;
use aws_sdk_dynamodb::types::{AttributeValue, PutRequest, WriteRequest};
use aws_smithy_types::timeout::TimeoutConfig;
use std::collections::HashMap;
use std::time::Duration;

/// Message the SDK uses when its client-side retry budget is spent.
const RETRY_QUOTA_EXCEEDED: &str = "retry quota exceeded";

/// Service error codes that signal throughput limits rather than bad requests.
const THROTTLING_CODES: &[&str] = &[
    "ProvisionedThroughputExceededException",
    "RequestLimitExceeded",
    "ThrottlingException",
];

/// DynamoDB client configuration
#[derive(Debug, Clone, Default)]
pub struct DynamoDbConfig {
    /// Optional endpoint override (e.g. LocalStack)
    pub endpoint: Option<String>,
    /// Timeout in milliseconds
    pub timeout_ms: Option<u64>,
}

#[derive(Clone)]
pub struct DynamoDbBackend {
    client: Client,
}

impl std::fmt::Debug for DynamoDbBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamoDbBackend").finish_non_exhaustive()
    }
}

impl DynamoDbBackend {
    /// Build a client from the shared SDK config, then apply overrides.
    pub fn new(sdk_config: &aws_config::SdkConfig, config: DynamoDbConfig) -> Self {
        let mut builder = aws_sdk_dynamodb::config::Builder::from(sdk_config);

        if let Some(endpoint) = config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        if let Some(timeout_ms) = config.timeout_ms {
            let timeout_config = TimeoutConfig::builder()
                .operation_timeout(Duration::from_millis(timeout_ms))
                .build();
            builder = builder.timeout_config(timeout_config);
        }

        Self {
            client: Client::from_conf(builder.build()),
        }
    }

    fn to_write_request(item: &WriteItem) -> Result<WriteRequest, BackendError> {
        let attributes: HashMap<String, AttributeValue> = item
            .attributes()
            .iter()
            .map(|(k, v)| (k.clone(), AttributeValue::S(v.clone())))
            .collect();

        let put = PutRequest::builder()
            .set_item(Some(attributes))
            .build()
            .map_err(|e| BackendError::InvalidItem(e.to_string()))?;

        Ok(WriteRequest::builder().put_request(put).build())
    }
}

#[async_trait]
impl StorageBackend for DynamoDbBackend {
    async fn table_exists(&self, table: &str) -> Result<bool, BackendError> {
        match self.client.describe_table().table_name(table).send().await {
            Ok(_) => Ok(true),
            Err(SdkError::ServiceError(service_err))
                if matches!(
                    service_err.err(),
                    DescribeTableError::ResourceNotFoundException(_)
                ) =>
            {
                Ok(false)
            }
            Err(e) => Err(classify_sdk_error("DescribeTable", &e)),
        }
    }

    async fn batch_put(&self, table: &str, items: &[WriteItem]) -> Result<usize, BackendError> {
        let requests = items
            .iter()
            .map(Self::to_write_request)
            .collect::<Result<Vec<_>, _>>()?;

        let output = self
            .client
            .batch_write_item()
            .request_items(table, requests)
            .send()
            .await
            .map_err(|e| classify_sdk_error("BatchWriteItem", &e))?;

        let unprocessed = output
            .unprocessed_items()
            .map(|tables| tables.values().map(Vec::len).sum())
            .unwrap_or(0);
        Ok(unprocessed)
    }
}

fn classify_sdk_error<E, R>(operation: &str, err: &SdkError<E, R>) -> BackendError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug + 'static,
{
    let code = err.as_service_error().and_then(|e| e.code());
    let message = format!("DynamoDB {} failed: {}", operation, DisplayErrorContext(err));
    classify(code, message)
}

/// Separate throttling from every other failure.
fn classify(code: Option<&str>, message: String) -> BackendError {
    let throttled = code.is_some_and(|code| THROTTLING_CODES.contains(&code))
        || message.to_ascii_lowercase().contains(RETRY_QUOTA_EXCEEDED);

    if throttled {
        BackendError::Throttled(message)
    } else {
        BackendError::Rejected(message)
    }
}
