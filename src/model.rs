//! Records that know where they live.
//!
//! Implement [`StoredModel`] for a type that owns a [`DocumentStore`] and can
//! describe what to write on create and on update; the CRUD methods come for
//! free.

use crate::backend::{DocumentBackend, Record};
use crate::store::{DocumentStore, Outcome};
use async_trait::async_trait;
use std::collections::BTreeMap;

#[async_trait]
pub trait StoredModel: Sync {
    type Backend: DocumentBackend + ?Sized;

    /// The store addressing this model's document.
    fn store(&self) -> &DocumentStore<Self::Backend>;

    /// Fields written by [`create`](Self::create).
    fn create_structure(&self) -> Record;

    /// Fields merged by [`update`](Self::update).
    fn update_structure(&self) -> Record;

    async fn create(&self) -> Outcome<String> {
        self.store().create(&self.create_structure()).await
    }

    async fn read(&self) -> Outcome<Record> {
        self.store().read().await
    }

    async fn update(&self) -> Outcome<()> {
        self.store().update(&self.update_structure()).await
    }

    async fn delete(&self) -> Outcome<()> {
        self.store().delete().await
    }

    async fn read_all(&self) -> Outcome<BTreeMap<String, Record>> {
        self.store().read_all().await
    }
}
