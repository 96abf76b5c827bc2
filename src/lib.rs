//! Hierarchical document store over nested collection/document paths.
//!
//! A [`DocumentStore`](store::DocumentStore) addresses documents through a
//! root collection, an optional document key and alternating nested
//! segments, and exposes create / read / update / delete / list operations
//! that always report an [`Outcome`](store::Outcome). The database itself is
//! an injected [`DocumentBackend`](backend::DocumentBackend):
//!
//! - [`memory::MemoryBackend`] keeps documents in process memory;
//! - [`firestore::FirestoreBackend`] talks to Cloud Firestore over REST.
//!
//! # Examples
//!
//! ```rust,ignore
//! # use nested_docstore::{store::DocumentStore, DocstoreApp};
//! # async fn run(key: yup_oauth2::ServiceAccountKey) {
//! let app = DocstoreApp::new(key);
//! let backend = app.firestore().unwrap();
//! let users = DocumentStore::new(backend, "users", None, Vec::<String>::new()).unwrap();
//!
//! let mut fields = serde_json::Map::new();
//! fields.insert("name".into(), "Ann".into());
//! let id = users.create(&fields).await.unwrap();
//! let ann = users.with_key(&id).unwrap().read().await.unwrap();
//! # }
//! ```

pub mod backend;
pub mod config;
pub mod core;
pub mod firestore;
pub mod memory;
pub mod model;
pub mod store;

pub use yup_oauth2;

use crate::config::{ConfigError, FirestoreConfig};
use crate::core::middleware::AuthMiddleware;
use crate::firestore::FirestoreBackend;
use std::path::Path;
use std::sync::Arc;
use yup_oauth2::ServiceAccountKey;

/// Entry point holding credentials and connection settings.
///
/// Backends are built on request and owned by the caller; nothing is global.
pub struct DocstoreApp {
    key: Option<ServiceAccountKey>,
    config: FirestoreConfig,
}

impl DocstoreApp {
    /// Creates an app for the project named in the service account key.
    pub fn new(service_account_key: ServiceAccountKey) -> Self {
        let config = FirestoreConfig {
            project_id: service_account_key.project_id.clone(),
            ..FirestoreConfig::default()
        };
        Self {
            key: Some(service_account_key),
            config,
        }
    }

    /// Creates an app from explicit settings. `key` may be `None` for the emulator.
    pub fn with_config(key: Option<ServiceAccountKey>, config: FirestoreConfig) -> Self {
        Self { key, config }
    }

    /// Loads a service account JSON key file, taking the rest from the environment.
    pub async fn from_key_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let key = yup_oauth2::read_service_account_key(path).await?;
        let mut config = FirestoreConfig::from_env();
        if config.project_id.is_none() {
            config.project_id = key.project_id.clone();
        }
        Ok(Self::with_config(Some(key), config))
    }

    pub fn config(&self) -> &FirestoreConfig {
        &self.config
    }

    /// Builds a Firestore backend, pointed at the emulator when one is configured.
    pub fn firestore(&self) -> Result<Arc<FirestoreBackend>, ConfigError> {
        let backend = if self.config.is_emulator() {
            FirestoreBackend::emulator(&self.config)?
        } else {
            let key = self.key.clone().ok_or(ConfigError::CredentialsMissing)?;
            FirestoreBackend::new(AuthMiddleware::new(key), &self.config)?
        };
        Ok(Arc::new(backend))
    }
}
