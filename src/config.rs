//! Connection settings for the Firestore backend.

use serde::Deserialize;
use std::env;
use thiserror::Error;

const DEFAULT_BASE_URL: &str = "https://firestore.googleapis.com/v1";
const DEFAULT_DATABASE_ID: &str = "(default)";
const DEFAULT_PAGE_SIZE: u32 = 300;

/// Errors raised while configuring a backend.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Neither the config nor the service account key names a project.
    #[error("Project ID is missing from configuration and service account key")]
    ProjectIdMissing,
    /// Production mode needs a service account key.
    #[error("Service account credentials are required outside the emulator")]
    CredentialsMissing,
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
    #[error("Failed to read service account key: {0}")]
    KeyFile(#[from] std::io::Error),
}

/// Firestore connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FirestoreConfig {
    pub project_id: Option<String>,
    pub database_id: String,
    pub base_url: String,
    /// `host:port` of a local Firestore emulator. Replaces `base_url` and auth when set.
    pub emulator_host: Option<String>,
    pub page_size: u32,
    /// Transient-failure retries performed by the HTTP client. Zero disables them.
    pub max_retries: u32,
}

impl Default for FirestoreConfig {
    fn default() -> Self {
        Self {
            project_id: None,
            database_id: DEFAULT_DATABASE_ID.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            emulator_host: None,
            page_size: DEFAULT_PAGE_SIZE,
            max_retries: 0,
        }
    }
}

impl FirestoreConfig {
    /// Reads `FIREBASE_PROJECT_ID` (or `GOOGLE_CLOUD_PROJECT`),
    /// `FIRESTORE_DATABASE_ID` and `FIRESTORE_EMULATOR_HOST`.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.is_empty());
        let defaults = Self::default();

        Self {
            project_id: non_empty("FIREBASE_PROJECT_ID").or_else(|| non_empty("GOOGLE_CLOUD_PROJECT")),
            database_id: non_empty("FIRESTORE_DATABASE_ID").unwrap_or(defaults.database_id),
            emulator_host: non_empty("FIRESTORE_EMULATOR_HOST"),
            ..defaults
        }
    }

    pub fn with_project_id(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn is_emulator(&self) -> bool {
        self.emulator_host.is_some()
    }

    /// The `.../documents` root URL every document path is appended to.
    pub fn documents_url(&self) -> Result<String, ConfigError> {
        let project_id = self
            .project_id
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or(ConfigError::ProjectIdMissing)?;

        let base = match &self.emulator_host {
            Some(host) => format!("http://{}/v1", host),
            None => self.base_url.trim_end_matches('/').to_string(),
        };

        Ok(format!(
            "{}/projects/{}/databases/{}/documents",
            base, project_id, self.database_id
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_documents_url() {
        let config = FirestoreConfig::default().with_project_id("demo");
        assert_eq!(
            config.documents_url().unwrap(),
            "https://firestore.googleapis.com/v1/projects/demo/databases/(default)/documents"
        );
    }

    #[test]
    fn test_documents_url_requires_project() {
        assert!(matches!(
            FirestoreConfig::default().documents_url(),
            Err(ConfigError::ProjectIdMissing)
        ));
    }

    #[test]
    fn test_from_lookup() {
        let vars = HashMap::from([
            ("GOOGLE_CLOUD_PROJECT", "gcp-project"),
            ("FIRESTORE_DATABASE_ID", "analytics"),
            ("FIRESTORE_EMULATOR_HOST", "localhost:8080"),
        ]);
        let config = FirestoreConfig::from_lookup(|name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(config.project_id.as_deref(), Some("gcp-project"));
        assert!(config.is_emulator());
        assert_eq!(
            config.documents_url().unwrap(),
            "http://localhost:8080/v1/projects/gcp-project/databases/analytics/documents"
        );
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: FirestoreConfig =
            serde_json::from_str(r#"{"project_id": "demo", "max_retries": 2}"#).unwrap();
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(config.database_id, DEFAULT_DATABASE_ID);
    }
}
