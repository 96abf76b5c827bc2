//! The contract every document database backend fulfils.
//!
//! A [`DocumentStore`](crate::store::DocumentStore) never talks to a database
//! directly. It resolves an address into a [`DocumentRef`] or
//! [`CollectionRef`] and hands it to a `DocumentBackend`, which performs a
//! single call and reports the result.

use crate::store::path::{CollectionRef, DocumentRef, PathError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use thiserror::Error;

/// A document's contents: field name to arbitrary JSON value.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Errors reported by a backend.
#[derive(Error, Debug)]
pub enum BackendError {
    /// Wrapper for `reqwest::Error`.
    #[error("HTTP Request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// Wrapper for `reqwest_middleware::Error`.
    #[error("Middleware error: {0}")]
    Middleware(#[from] reqwest_middleware::Error),
    /// The backend answered but declined the operation.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },
    /// The targeted document does not exist.
    #[error("{0}")]
    NotFound(String),
    /// Wrapper for `serde_json::Error`.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// A stored document could not be represented as a [`Record`].
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
    #[error("Invalid path: {0}")]
    InvalidPath(#[from] PathError),
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Data read from a document at a point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentSnapshot {
    reference: DocumentRef,
    record: Option<Record>,
    create_time: Option<DateTime<Utc>>,
    update_time: Option<DateTime<Utc>>,
}

impl DocumentSnapshot {
    /// A snapshot of a document that does not exist.
    pub fn missing(reference: DocumentRef) -> Self {
        Self {
            reference,
            record: None,
            create_time: None,
            update_time: None,
        }
    }

    pub fn found(reference: DocumentRef, record: Record) -> Self {
        Self {
            reference,
            record: Some(record),
            create_time: None,
            update_time: None,
        }
    }

    pub fn with_times(
        mut self,
        create_time: Option<DateTime<Utc>>,
        update_time: Option<DateTime<Utc>>,
    ) -> Self {
        self.create_time = create_time;
        self.update_time = update_time;
        self
    }

    /// The id of the document.
    pub fn id(&self) -> &str {
        self.reference.id()
    }

    pub fn reference(&self) -> &DocumentRef {
        &self.reference
    }

    /// Returns `true` if the document exists.
    pub fn exists(&self) -> bool {
        self.record.is_some()
    }

    pub fn record(&self) -> Option<&Record> {
        self.record.as_ref()
    }

    pub fn into_record(self) -> Option<Record> {
        self.record
    }

    /// The time the document was created, when the backend reports it.
    pub fn create_time(&self) -> Option<DateTime<Utc>> {
        self.create_time
    }

    /// The time the document was last written, when the backend reports it.
    pub fn update_time(&self) -> Option<DateTime<Utc>> {
        self.update_time
    }

    /// Retrieves all fields in the document as a specific type.
    ///
    /// Returns `Ok(None)` if the document does not exist.
    pub fn data<T: DeserializeOwned>(&self) -> Result<Option<T>, serde_json::Error> {
        match &self.record {
            Some(record) => {
                serde_json::from_value(serde_json::Value::Object(record.clone())).map(Some)
            }
            None => Ok(None),
        }
    }
}

/// A document database with nested sub-collections.
///
/// Implementations perform exactly one database call per method and never
/// retry on their own behalf.
#[async_trait]
pub trait DocumentBackend: Send + Sync {
    /// Writes `record` as the full contents of `document`, creating it if needed.
    async fn set(&self, document: &DocumentRef, record: &Record) -> BackendResult<()>;

    /// Reads `document`. A missing document is a successful, empty snapshot.
    async fn get(&self, document: &DocumentRef) -> BackendResult<DocumentSnapshot>;

    /// Overwrites only the given top-level fields of an existing document.
    ///
    /// Fails with [`BackendError::NotFound`] when the document does not exist.
    async fn update(&self, document: &DocumentRef, fields: &Record) -> BackendResult<()>;

    /// Removes `document`. Removing an absent document is not an error.
    async fn delete(&self, document: &DocumentRef) -> BackendResult<()>;

    /// Lists the documents directly under `collection`, in no particular order.
    ///
    /// Only documents that exist are listed. A parent that only holds
    /// sub-collections has no contents of its own and is left out.
    async fn list_documents(&self, collection: &CollectionRef) -> BackendResult<Vec<DocumentRef>>;
}
