//! Record parsing.
//!
//! Each input line holds one flat JSON object. Field values are stored as
//! strings: numbers and booleans keep their JSON text, anything else makes
//! the line unusable.

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors raised while turning one input line into a record.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("expected a JSON object")]
    NotAnObject,
    #[error("field '{field}' is not a scalar value")]
    UnsupportedValue { field: String },
}

/// A single input record: field name to string value.
pub type Record = BTreeMap<String, String>;

/// One put operation, created from a record and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteItem {
    attributes: Record,
}

impl WriteItem {
    pub fn put(attributes: Record) -> Self {
        Self { attributes }
    }

    pub fn attributes(&self) -> &Record {
        &self.attributes
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.attributes.get(field).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

/// Parse one line of input into a record.
pub fn parse_record(line: &[u8]) -> Result<Record, RecordError> {
    let value: Value = serde_json::from_slice(line)?;
    let Value::Object(object) = value else {
        return Err(RecordError::NotAnObject);
    };
    flatten_object(object)
}

fn flatten_object(object: Map<String, Value>) -> Result<Record, RecordError> {
    let mut record = Record::new();
    for (field, value) in object {
        let text = match value {
            Value::String(s) => s,
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Null | Value::Array(_) | Value::Object(_) => {
                return Err(RecordError::UnsupportedValue { field });
            }
        };
        record.insert(field, text);
    }
    Ok(record)
}
