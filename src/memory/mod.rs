//! In-memory document backend.
//!
//! Holds every collection in a map keyed by collection path. Intended for
//! tests and embedding. Failures can be injected per operation and path to
//! exercise error handling without a network.

use crate::backend::{BackendError, BackendResult, DocumentBackend, DocumentSnapshot, Record};
use crate::store::path::{CollectionRef, DocumentRef};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;


/// Backend operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Set,
    Get,
    Update,
    Delete,
    List,
}

#[derive(Debug, Clone)]
struct StoredDocument {
    record: Record,
    create_time: DateTime<Utc>,
    update_time: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct Fault {
    status: u16,
    message: String,
}

/// A [`DocumentBackend`] that keeps documents in process memory.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    collections: RwLock<HashMap<String, BTreeMap<String, StoredDocument>>>,
    faults: RwLock<HashMap<(Operation, String), Fault>>,
}

impl MemoryBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `operation` on `path` fail with the given status and message
    /// until [`clear_failures`](Self::clear_failures) is called.
    ///
    /// `path` is a document path for single-document operations and a
    /// collection path for [`Operation::List`].
    pub async fn inject_failure(&self, operation: Operation, path: &str, status: u16, message: &str) {
        self.faults.write().await.insert(
            (operation, path.to_string()),
            Fault {
                status,
                message: message.to_string(),
            },
        );
    }

    pub async fn clear_failures(&self) {
        self.faults.write().await.clear();
    }

    /// Number of documents across all collections.
    pub async fn len(&self) -> usize {
        self.collections
            .read()
            .await
            .values()
            .map(BTreeMap::len)
            .sum()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn check_fault(&self, operation: Operation, path: &str) -> BackendResult<()> {
        match self.faults.read().await.get(&(operation, path.to_string())) {
            Some(fault) if fault.status == 404 => Err(BackendError::NotFound(fault.message.clone())),
            Some(fault) => Err(BackendError::Api {
                status: fault.status,
                message: fault.message.clone(),
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl DocumentBackend for MemoryBackend {
    async fn set(&self, document: &DocumentRef, record: &Record) -> BackendResult<()> {
        self.check_fault(Operation::Set, &document.path()).await?;

        let now = Utc::now();
        let mut collections = self.collections.write().await;
        let documents = collections.entry(document.parent().path()).or_default();
        let create_time = documents
            .get(document.id())
            .map(|existing| existing.create_time)
            .unwrap_or(now);

        documents.insert(
            document.id().to_string(),
            StoredDocument {
                record: record.clone(),
                create_time,
                update_time: now,
            },
        );
        Ok(())
    }

    async fn get(&self, document: &DocumentRef) -> BackendResult<DocumentSnapshot> {
        self.check_fault(Operation::Get, &document.path()).await?;

        let collections = self.collections.read().await;
        let stored = collections
            .get(&document.parent().path())
            .and_then(|documents| documents.get(document.id()));

        Ok(match stored {
            Some(stored) => DocumentSnapshot::found(document.clone(), stored.record.clone())
                .with_times(Some(stored.create_time), Some(stored.update_time)),
            None => DocumentSnapshot::missing(document.clone()),
        })
    }

    async fn update(&self, document: &DocumentRef, fields: &Record) -> BackendResult<()> {
        self.check_fault(Operation::Update, &document.path()).await?;

        let mut collections = self.collections.write().await;
        let stored = collections
            .get_mut(&document.parent().path())
            .and_then(|documents| documents.get_mut(document.id()))
            .ok_or_else(|| BackendError::NotFound(format!("No document to update: {}", document)))?;

        for (field, value) in fields {
            stored.record.insert(field.clone(), value.clone());
        }
        stored.update_time = Utc::now();
        Ok(())
    }

    async fn delete(&self, document: &DocumentRef) -> BackendResult<()> {
        self.check_fault(Operation::Delete, &document.path()).await?;

        let mut collections = self.collections.write().await;
        if let Some(documents) = collections.get_mut(&document.parent().path()) {
            documents.remove(document.id());
            if documents.is_empty() {
                collections.remove(&document.parent().path());
            }
        }
        Ok(())
    }

    async fn list_documents(&self, collection: &CollectionRef) -> BackendResult<Vec<DocumentRef>> {
        self.check_fault(Operation::List, &collection.path()).await?;

        let collections = self.collections.read().await;
        let Some(documents) = collections.get(&collection.path()) else {
            return Ok(Vec::new());
        };

        documents
            .keys()
            .map(|id| collection.doc(id).map_err(BackendError::from))
            .collect()
    }
}
