//! Cloud Firestore backend.
//!
//! Implements [`DocumentBackend`] on top of the Firestore v1 REST API. Each
//! trait method maps onto exactly one endpoint (listing follows page tokens):
//!
//! | operation        | request                                                        |
//! |------------------|----------------------------------------------------------------|
//! | `get`            | `GET {doc}`                                                    |
//! | `set`            | `PATCH {doc}`                                                  |
//! | `update`         | `PATCH {doc}?updateMask.fieldPaths=..&currentDocument.exists=true` |
//! | `delete`         | `DELETE {doc}`                                                 |
//! | `list_documents` | `GET {collection}?pageSize=..`                                   |

pub mod models;
mod value;

#[cfg(test)]
mod tests;

use self::models::{Document, ListDocumentsResponse, WriteBody};
use self::value::{decode_fields, encode_record, field_path};
use crate::backend::{BackendError, BackendResult, DocumentBackend, DocumentSnapshot, Record};
use crate::config::{ConfigError, FirestoreConfig};
use crate::core::middleware::AuthMiddleware;
use crate::core::parse_error_response;
use crate::store::path::{CollectionRef, DocumentRef};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::debug;
use reqwest::{header, Client, Response, StatusCode};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use url::Url;

/// Client for a single Cloud Firestore database.
#[derive(Clone)]
pub struct FirestoreBackend {
    client: ClientWithMiddleware,
    documents_url: Url,
    page_size: u32,
}

impl FirestoreBackend {
    /// Creates a backend that authenticates with a service account.
    ///
    /// The project id is taken from `config`, falling back to the key's.
    pub fn new(middleware: AuthMiddleware, config: &FirestoreConfig) -> Result<Self, ConfigError> {
        let config = match (&config.project_id, middleware.project_id()) {
            (None, Some(project_id)) => config.clone().with_project_id(project_id),
            _ => config.clone(),
        };

        let client = with_retries(ClientBuilder::new(Client::new()), &config)
            .with(middleware)
            .build();

        Self::with_client(client, &config.documents_url()?, config.page_size)
    }

    /// Creates a backend for the local emulator, which accepts the `owner` token.
    pub fn emulator(config: &FirestoreConfig) -> Result<Self, ConfigError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            header::HeaderValue::from_static("Bearer owner"),
        );
        let inner = Client::builder().default_headers(headers).build()?;
        let client = with_retries(ClientBuilder::new(inner), config).build();

        Self::with_client(client, &config.documents_url()?, config.page_size)
    }

    /// Creates a backend from a prepared client and a `.../documents` URL.
    pub fn with_client(
        client: ClientWithMiddleware,
        documents_url: &str,
        page_size: u32,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            client,
            documents_url: Url::parse(documents_url.trim_end_matches('/'))?,
            page_size,
        })
    }

    fn url_for(&self, segments: &[String]) -> Url {
        let mut url = self.documents_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn document_url(&self, document: &DocumentRef) -> Url {
        self.url_for(document.segments())
    }

    fn collection_url(&self, collection: &CollectionRef) -> Url {
        self.url_for(collection.segments())
    }
}

fn with_retries(builder: ClientBuilder, config: &FirestoreConfig) -> ClientBuilder {
    if config.max_retries == 0 {
        return builder;
    }
    let retry_policy = ExponentialBackoff::builder().build_with_max_retries(config.max_retries);
    builder.with(RetryTransientMiddleware::new_with_policy(retry_policy))
}

async fn check(response: Response, context: &str) -> BackendResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = parse_error_response(response, context).await;
    if status == StatusCode::NOT_FOUND {
        Err(BackendError::NotFound(message))
    } else {
        Err(BackendError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

fn parse_time(value: Option<&str>) -> Option<DateTime<Utc>> {
    value
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
}

fn write_body(record: &Record) -> BackendResult<Vec<u8>> {
    let body = WriteBody {
        fields: encode_record(record)?,
    };
    Ok(serde_json::to_vec(&body)?)
}

#[async_trait]
impl DocumentBackend for FirestoreBackend {
    async fn set(&self, document: &DocumentRef, record: &Record) -> BackendResult<()> {
        let url = self.document_url(document);
        debug!("PATCH {}", url);

        let response = self
            .client
            .patch(url)
            .header(header::CONTENT_TYPE, "application/json")
            .body(write_body(record)?)
            .send()
            .await?;

        check(response, "Set document failed").await?;
        Ok(())
    }

    async fn get(&self, document: &DocumentRef) -> BackendResult<DocumentSnapshot> {
        let url = self.document_url(document);
        debug!("GET {}", url);

        let response = self.client.get(url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(DocumentSnapshot::missing(document.clone()));
        }

        let doc: Document = check(response, "Get document failed").await?.json().await?;
        let create_time = parse_time(doc.create_time.as_deref());
        let update_time = parse_time(doc.update_time.as_deref());
        let record = decode_fields(doc.fields)?;

        Ok(DocumentSnapshot::found(document.clone(), record).with_times(create_time, update_time))
    }

    async fn update(&self, document: &DocumentRef, fields: &Record) -> BackendResult<()> {
        let mut url = self.document_url(document);
        {
            let mut query = url.query_pairs_mut();
            for field in fields.keys() {
                query.append_pair("updateMask.fieldPaths", &field_path(field));
            }
            query.append_pair("currentDocument.exists", "true");
        }
        debug!("PATCH {}", url);

        let response = self
            .client
            .patch(url)
            .header(header::CONTENT_TYPE, "application/json")
            .body(write_body(fields)?)
            .send()
            .await?;

        check(response, "Update document failed").await?;
        Ok(())
    }

    async fn delete(&self, document: &DocumentRef) -> BackendResult<()> {
        let url = self.document_url(document);
        debug!("DELETE {}", url);

        let response = self.client.delete(url).send().await?;
        check(response, "Delete document failed").await?;
        Ok(())
    }

    async fn list_documents(&self, collection: &CollectionRef) -> BackendResult<Vec<DocumentRef>> {
        let mut documents = Vec::new();
        let mut next_page_token: Option<String> = None;

        loop {
            let mut url = self.collection_url(collection);
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("pageSize", &self.page_size.to_string());
                if let Some(token) = next_page_token.take() {
                    query.append_pair("pageToken", &token);
                }
            }
            debug!("GET {}", url);

            let response = self.client.get(url).send().await?;
            let page: ListDocumentsResponse =
                check(response, "List documents failed").await?.json().await?;

            for doc in page.documents {
                let id = doc.name.rsplit('/').next().unwrap_or_default();
                documents.push(collection.doc(id)?);
            }

            match page.next_page_token {
                Some(token) if !token.is_empty() => next_page_token = Some(token),
                _ => break,
            }
        }

        Ok(documents)
    }
}
