//! Record store port.
//! The attendance recorder talks to the hosted table database only through
//! [`RecordStore`], so the Airtable adapter can be swapped for an in-memory
//! store in tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Field values keyed by column name.
pub type Fields = Map<String, Value>;

/// One row of a table.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Record {
    pub id: String,
    /// Airtable drops empty fields from responses entirely
    #[serde(default)]
    pub fields: Fields,
}

impl Record {
    /// Reads a multi-record link field as a list of record ids.
    /// A missing field is an empty link list. Anything other than an array of
    /// id strings is rejected, since the list is written back whole.
    pub fn linked_ids(&self, field: &str) -> Result<Vec<String>, StoreError> {
        let values = match self.fields.get(field) {
            None | Some(Value::Null) => return Ok(Vec::new()),
            Some(Value::Array(values)) => values,
            Some(other) => {
                return Err(StoreError::Decode(format!(
                    "{field} on {} is not a link list: {other}",
                    self.id
                )));
            }
        };
        values
            .iter()
            .map(|value| {
                value.as_str().map(str::to_string).ok_or_else(|| {
                    StoreError::Decode(format!(
                        "{field} on {} holds a non-id entry: {value}",
                        self.id
                    ))
                })
            })
            .collect()
    }
}

/// Filtered single-record query restricted to a view.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Query {
    pub filter_formula: String,
    pub view: String,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("store returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("record {id} not found in {table}")]
    NotFound { table: String, id: String },
    #[error("could not decode store response: {0}")]
    Decode(String),
    #[error("invalid store url: {0}")]
    InvalidUrl(String),
}

/// The four access patterns the recorder needs from a table store.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Returns the first record in `view` matching `filter_formula`, if any.
    async fn select_first(&self, table: &str, query: &Query)
    -> Result<Option<Record>, StoreError>;

    async fn find(&self, table: &str, id: &str) -> Result<Record, StoreError>;

    async fn create(&self, table: &str, fields: Fields) -> Result<Record, StoreError>;

    /// Replaces the named fields of a record, leaving the others untouched.
    async fn update(&self, table: &str, id: &str, fields: Fields)
    -> Result<Record, StoreError>;
}
