//! Hierarchical document store.
//!
//! A [`DocumentStore`] is bound to a root collection, an optional document
//! key and a nested path of alternating document/collection segments. Every
//! operation resolves that address from scratch, performs one backend call
//! (or a list followed by reads for [`DocumentStore::read_all`]) and reports
//! an [`Outcome`]. Backend errors never escape as their own type.
//!
//! # Examples
//!
//! ```rust,ignore
//! # use nested_docstore::{memory::MemoryBackend, store::DocumentStore};
//! # use std::sync::Arc;
//! # async fn run() {
//! let backend = Arc::new(MemoryBackend::new());
//! let members = DocumentStore::new(backend, "orgs", Some("u42"), ["org1", "members"]).unwrap();
//!
//! // Resolves to orgs/org1/members/u42
//! let mut fields = serde_json::Map::new();
//! fields.insert("role".into(), "admin".into());
//! let _ = members.update(&fields).await;
//! # }
//! ```

pub mod path;


use self::path::{validate_segment, CollectionRef, DocumentRef, PathError, ResolvedPath};
use crate::backend::{BackendError, DocumentBackend, DocumentSnapshot, Record};
use futures::stream::{self, StreamExt};
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

/// Upper bound on reads `read_all` keeps in flight at once.
pub const READ_ALL_CONCURRENCY: usize = 16;

/// The result of every store operation.
pub type Outcome<T> = Result<T, Failure>;

/// Broad classification of a [`Failure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The targeted document does not exist.
    NotFound,
    /// The backend declined the operation (permissions, validation, conflict).
    Rejected,
    /// Network or availability problem. Not retried by the store.
    Transient,
    /// The store's address cannot serve the operation.
    InvalidTarget,
}

/// Why a store operation did not succeed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct Failure {
    kind: FailureKind,
    message: String,
}

impl Failure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub(crate) fn does_not_exist() -> Self {
        Self::new(FailureKind::NotFound, "Document does not exist")
    }

    pub fn kind(&self) -> FailureKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<BackendError> for Failure {
    fn from(err: BackendError) -> Self {
        let kind = match &err {
            BackendError::NotFound(_) => FailureKind::NotFound,
            BackendError::Request(_) | BackendError::Middleware(_) => FailureKind::Transient,
            BackendError::Api { status, .. } if is_transient_status(*status) => {
                FailureKind::Transient
            }
            BackendError::InvalidPath(_) => FailureKind::InvalidTarget,
            BackendError::Api { .. }
            | BackendError::Serialization(_)
            | BackendError::InvalidDocument(_) => FailureKind::Rejected,
        };
        Self::new(kind, err.to_string())
    }
}

impl From<PathError> for Failure {
    fn from(err: PathError) -> Self {
        Self::new(FailureKind::InvalidTarget, err.to_string())
    }
}

fn is_transient_status(status: u16) -> bool {
    matches!(status, 408 | 429) || status >= 500
}

/// CRUD access to documents addressed by a nested collection/document path.
pub struct DocumentStore<B: ?Sized> {
    backend: Arc<B>,
    collection: String,
    key: Option<String>,
    nested: Vec<String>,
}

impl<B: ?Sized> Clone for DocumentStore<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            collection: self.collection.clone(),
            key: self.key.clone(),
            nested: self.nested.clone(),
        }
    }
}

impl<B: ?Sized> std::fmt::Debug for DocumentStore<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentStore")
            .field("collection", &self.collection)
            .field("key", &self.key)
            .field("nested", &self.nested)
            .finish()
    }
}

impl<B: DocumentBackend + ?Sized> DocumentStore<B> {
    /// Creates a store over `collection`, optionally bound to document `key`,
    /// nested under the alternating `nested` segments.
    ///
    /// With an even number of nested segments the key names a document in the
    /// deepest collection; with an odd number the last segment is itself the
    /// document, so passing a key as well is rejected.
    pub fn new<I, S>(
        backend: Arc<B>,
        collection: &str,
        key: Option<&str>,
        nested: I,
    ) -> Result<Self, PathError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if collection.is_empty() {
            return Err(PathError::EmptyCollection);
        }
        validate_segment(collection)?;

        let nested: Vec<String> = nested.into_iter().map(Into::into).collect();
        for segment in &nested {
            validate_segment(segment)?;
        }

        if let Some(key) = key {
            validate_segment(key)?;
            if nested.len() % 2 == 1 {
                return Err(PathError::AmbiguousKey {
                    key: key.to_string(),
                    terminal: nested[nested.len() - 1].clone(),
                });
            }
        }

        Ok(Self {
            backend,
            collection: collection.to_string(),
            key: key.map(str::to_string),
            nested,
        })
    }

    /// A store over the same path bound to document `key`.
    pub fn with_key(&self, key: &str) -> Result<Self, PathError> {
        Self::new(
            Arc::clone(&self.backend),
            &self.collection,
            Some(key),
            self.nested.iter().cloned(),
        )
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn nested(&self) -> &[String] {
        &self.nested
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Walks the nested path. Done on every call, never cached.
    pub fn resolve(&self) -> Result<ResolvedPath, PathError> {
        path::resolve(&self.collection, &self.nested)
    }

    fn target(&self) -> Outcome<DocumentRef> {
        match self.resolve()? {
            ResolvedPath::Document(document) => Ok(document),
            ResolvedPath::Collection(collection) => match &self.key {
                Some(key) => Ok(collection.doc(key)?),
                None => Err(Failure::new(
                    FailureKind::InvalidTarget,
                    format!("A document key is required to address a document in '{}'", collection),
                )),
            },
        }
    }

    fn target_collection(&self) -> Outcome<CollectionRef> {
        match self.resolve()? {
            ResolvedPath::Collection(collection) => Ok(collection),
            ResolvedPath::Document(document) => Err(Failure::new(
                FailureKind::InvalidTarget,
                format!("'{}' is a document, not a collection", document),
            )),
        }
    }

    /// Writes `record` as the full contents of the document and returns its id.
    ///
    /// Without a document key a new id is generated before the write, so the
    /// returned id is always the one that was written.
    pub async fn create(&self, record: &Record) -> Outcome<String> {
        let document = match self.resolve()? {
            ResolvedPath::Document(document) => document,
            ResolvedPath::Collection(collection) => match &self.key {
                Some(key) => collection.doc(key)?,
                None => collection.new_doc(),
            },
        };

        debug!("creating document {}", document);
        self.backend
            .set(&document, record)
            .await
            .map_err(|e| backend_failure("create", &document, e))?;

        Ok(document.id().to_string())
    }

    /// Serializes `value` and creates a document from it.
    pub async fn create_as<T: Serialize + ?Sized>(&self, value: &T) -> Outcome<String> {
        let record = to_record(value)?;
        self.create(&record).await
    }

    /// Reads the document, including its timestamps.
    pub async fn snapshot(&self) -> Outcome<DocumentSnapshot> {
        let document = self.target()?;
        debug!("reading document {}", document);
        let snapshot = self
            .backend
            .get(&document)
            .await
            .map_err(|e| backend_failure("read", &document, e))?;
        Ok(snapshot)
    }

    /// Reads the document's fields.
    pub async fn read(&self) -> Outcome<Record> {
        self.snapshot()
            .await?
            .into_record()
            .ok_or_else(Failure::does_not_exist)
    }

    /// Reads the document and deserializes it into `T`.
    pub async fn read_as<T: DeserializeOwned>(&self) -> Outcome<T> {
        let record = self.read().await?;
        serde_json::from_value(Value::Object(record)).map_err(|e| {
            Failure::new(
                FailureKind::Rejected,
                format!("Failed to decode document: {}", e),
            )
        })
    }

    pub async fn exists(&self) -> Outcome<bool> {
        Ok(self.snapshot().await?.exists())
    }

    /// Merges `fields` into the existing document. Fields not named are untouched.
    pub async fn update(&self, fields: &Record) -> Outcome<()> {
        if fields.is_empty() {
            return Err(Failure::new(
                FailureKind::Rejected,
                "An update must name at least one field",
            ));
        }

        let document = self.target()?;
        debug!("updating {} field(s) of {}", fields.len(), document);
        self.backend
            .update(&document, fields)
            .await
            .map_err(|e| backend_failure("update", &document, e))
    }

    /// Serializes `value` and merges its top-level fields into the document.
    pub async fn update_as<T: Serialize + ?Sized>(&self, value: &T) -> Outcome<()> {
        let record = to_record(value)?;
        self.update(&record).await
    }

    /// Deletes the document. Deleting an absent document succeeds.
    pub async fn delete(&self) -> Outcome<()> {
        let document = self.target()?;
        debug!("deleting document {}", document);
        self.backend
            .delete(&document)
            .await
            .map_err(|e| backend_failure("delete", &document, e))
    }

    /// Lists the ids of the documents directly under the resolved collection.
    pub async fn list_keys(&self) -> Outcome<Vec<String>> {
        let collection = self.target_collection()?;
        debug!("listing documents in {}", collection);
        let documents = self.backend.list_documents(&collection).await.map_err(|e| {
            let failure = Failure::from(e);
            warn!("list of {} failed: {}", collection, failure);
            failure
        })?;

        Ok(documents
            .into_iter()
            .map(|document| document.id().to_string())
            .collect())
    }

    /// Reads every document in the resolved collection.
    ///
    /// Documents that fail to read are left out of the result rather than
    /// failing the whole call. At most [`READ_ALL_CONCURRENCY`] reads run at once.
    pub async fn read_all(&self) -> Outcome<BTreeMap<String, Record>> {
        let keys = self.list_keys().await?;

        let reads = stream::iter(keys).map(|key| async move {
            let outcome = match self.with_key(&key) {
                Ok(store) => store.read().await,
                Err(e) => Err(Failure::from(e)),
            };
            (key, outcome)
        });

        let mut records = BTreeMap::new();
        let results: Vec<_> = reads.buffer_unordered(READ_ALL_CONCURRENCY).collect().await;
        for (key, outcome) in results {
            match outcome {
                Ok(record) => {
                    records.insert(key, record);
                }
                Err(failure) => warn!("skipping document '{}': {}", key, failure),
            }
        }

        Ok(records)
    }
}

fn backend_failure(operation: &str, document: &DocumentRef, err: BackendError) -> Failure {
    let failure = Failure::from(err);
    if failure.kind() != FailureKind::NotFound {
        warn!("{} of {} failed: {}", operation, document, failure);
    }
    failure
}

fn to_record<T: Serialize + ?Sized>(value: &T) -> Outcome<Record> {
    match serde_json::to_value(value) {
        Ok(Value::Object(record)) => Ok(record),
        Ok(_) => Err(Failure::new(
            FailureKind::Rejected,
            "Can only store objects as documents",
        )),
        Err(e) => Err(Failure::new(
            FailureKind::Rejected,
            format!("Failed to encode document: {}", e),
        )),
    }
}
