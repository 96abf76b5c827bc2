use super::*;
use crate::store::path::PathError;
use crate::store::{DocumentStore, FailureKind};
use httpmock::prelude::*;
use reqwest_middleware::ClientBuilder;
use serde_json::json;
use std::sync::Arc;

const DOCUMENTS: &str = "/v1/projects/p/databases/(default)/documents";

fn create_backend(server: &MockServer) -> FirestoreBackend {
    let client = ClientBuilder::new(Client::new()).build();
    FirestoreBackend::with_client(client, &server.url(DOCUMENTS), 2).unwrap()
}

fn doc_path(path: &str) -> String {
    format!("{}/{}", DOCUMENTS, path)
}

fn users() -> CollectionRef {
    CollectionRef::root("users").unwrap()
}

fn record(value: serde_json::Value) -> Record {
    match value {
        serde_json::Value::Object(map) => map,
        other => panic!("expected an object, got {}", other),
    }
}

fn wire_document(path: &str, fields: serde_json::Value) -> serde_json::Value {
    json!({
        "name": format!("projects/p/databases/(default)/documents/{}", path),
        "fields": fields,
        "createTime": "2021-01-01T00:00:00Z",
        "updateTime": "2021-01-02T00:00:00Z"
    })
}

#[tokio::test]
async fn test_get_document() {
    let server = MockServer::start_async().await;
    let backend = create_backend(&server);

    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path(doc_path("users/alice"));
            then.status(200).json_body(wire_document(
                "users/alice",
                json!({
                    "name": { "stringValue": "Alice" },
                    "age": { "integerValue": "30" }
                }),
            ));
        })
        .await;

    let snapshot = backend.get(&users().doc("alice").unwrap()).await.unwrap();

    mock.assert_async().await;
    assert!(snapshot.exists());
    assert_eq!(
        snapshot.record(),
        Some(&record(json!({ "name": "Alice", "age": 30 })))
    );
    assert_eq!(
        snapshot.create_time().unwrap().to_rfc3339(),
        "2021-01-01T00:00:00+00:00"
    );
    assert!(snapshot.update_time() > snapshot.create_time());
}

#[tokio::test]
async fn test_get_missing_document() {
    let server = MockServer::start_async().await;
    let backend = create_backend(&server);

    server
        .mock_async(|when, then| {
            when.method(GET).path(doc_path("users/ghost"));
            then.status(404).json_body(json!({
                "error": { "code": 404, "message": "Document not found", "status": "NOT_FOUND" }
            }));
        })
        .await;

    let snapshot = backend.get(&users().doc("ghost").unwrap()).await.unwrap();
    assert!(!snapshot.exists());
}

#[tokio::test]
async fn test_set_document() {
    let server = MockServer::start_async().await;
    let backend = create_backend(&server);

    let mock = server
        .mock_async(|when, then| {
            when.method(PATCH)
                .path(doc_path("users/alice"))
                .header("content-type", "application/json")
                .json_body(json!({ "fields": { "name": { "stringValue": "Alice" } } }));
            then.status(200).json_body(wire_document(
                "users/alice",
                json!({ "name": { "stringValue": "Alice" } }),
            ));
        })
        .await;

    backend
        .set(&users().doc("alice").unwrap(), &record(json!({ "name": "Alice" })))
        .await
        .unwrap();

    mock.assert_async().await;
}

#[tokio::test]
async fn test_update_sends_mask_and_precondition() {
    let server = MockServer::start_async().await;
    let backend = create_backend(&server);

    let mock = server
        .mock_async(|when, then| {
            when.method(PATCH)
                .path(doc_path("orgs/org1/members/u42"))
                .query_param("updateMask.fieldPaths", "role")
                .query_param("currentDocument.exists", "true")
                .json_body(json!({ "fields": { "role": { "stringValue": "admin" } } }));
            then.status(200).json_body(wire_document(
                "orgs/org1/members/u42",
                json!({ "role": { "stringValue": "admin" } }),
            ));
        })
        .await;

    let store = DocumentStore::new(
        Arc::new(backend),
        "orgs",
        Some("u42"),
        ["org1", "members"],
    )
    .unwrap();
    store.update(&record(json!({ "role": "admin" }))).await.unwrap();

    mock.assert_async().await;
}

#[tokio::test]
async fn test_update_missing_document() {
    let server = MockServer::start_async().await;
    let backend = create_backend(&server);

    server
        .mock_async(|when, then| {
            when.method(PATCH).path(doc_path("users/ghost"));
            then.status(404).json_body(json!({
                "error": {
                    "code": 404,
                    "message": "No document to update: users/ghost",
                    "status": "NOT_FOUND"
                }
            }));
        })
        .await;

    let result = backend
        .update(&users().doc("ghost").unwrap(), &record(json!({ "a": 1 })))
        .await;

    match result {
        Err(BackendError::NotFound(message)) => assert!(message.contains("No document to update")),
        other => panic!("unexpected result: {:?}", other),
    }
}

#[tokio::test]
async fn test_delete_document() {
    let server = MockServer::start_async().await;
    let backend = create_backend(&server);

    let mock = server
        .mock_async(|when, then| {
            when.method(DELETE).path(doc_path("users/alice"));
            then.status(200).json_body(json!({}));
        })
        .await;

    backend.delete(&users().doc("alice").unwrap()).await.unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn test_list_documents_follows_page_tokens() {
    let server = MockServer::start_async().await;
    let backend = create_backend(&server);

    let first = server
        .mock_async(|when, then| {
            when.method(GET)
                .path(doc_path("users"))
                .query_param("pageSize", "2")
                .query_param_missing("showMissing")
                .query_param_missing("pageToken");
            then.status(200).json_body(json!({
                "documents": [
                    wire_document("users/a", json!({})),
                    wire_document("users/b", json!({}))
                ],
                "nextPageToken": "page2"
            }));
        })
        .await;

    let second = server
        .mock_async(|when, then| {
            when.method(GET)
                .path(doc_path("users"))
                .query_param("pageToken", "page2");
            then.status(200).json_body(json!({
                "documents": [{ "name": "projects/p/databases/(default)/documents/users/c" }]
            }));
        })
        .await;

    let documents = backend.list_documents(&users()).await.unwrap();
    let ids: Vec<&str> = documents.iter().map(DocumentRef::id).collect();

    first.assert_async().await;
    second.assert_async().await;
    assert_eq!(ids, vec!["a", "b", "c"]);
    assert_eq!(documents[2].path(), "users/c");
}

#[tokio::test]
async fn test_list_empty_collection() {
    let server = MockServer::start_async().await;
    let backend = create_backend(&server);

    server
        .mock_async(|when, then| {
            when.method(GET).path(doc_path("users"));
            then.status(200).json_body(json!({}));
        })
        .await;

    assert!(backend.list_documents(&users()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_api_error_is_parsed() {
    let server = MockServer::start_async().await;
    let backend = create_backend(&server);

    server
        .mock_async(|when, then| {
            when.method(DELETE).path(doc_path("users/alice"));
            then.status(403).json_body(json!({
                "error": {
                    "code": 403,
                    "message": "Missing or insufficient permissions.",
                    "status": "PERMISSION_DENIED"
                }
            }));
        })
        .await;

    match backend.delete(&users().doc("alice").unwrap()).await {
        Err(BackendError::Api { status, message }) => {
            assert_eq!(status, 403);
            assert!(message.contains("PERMISSION_DENIED"));
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[tokio::test]
async fn test_store_read_all_over_rest() {
    let server = MockServer::start_async().await;
    let backend = create_backend(&server);

    server
        .mock_async(|when, then| {
            when.method(GET).path(doc_path("orgs/org1/members"));
            then.status(200).json_body(json!({
                "documents": [
                    { "name": "projects/p/databases/(default)/documents/orgs/org1/members/u1" },
                    { "name": "projects/p/databases/(default)/documents/orgs/org1/members/u2" }
                ]
            }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path(doc_path("orgs/org1/members/u1"));
            then.status(200).json_body(wire_document(
                "orgs/org1/members/u1",
                json!({ "role": { "stringValue": "admin" } }),
            ));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path(doc_path("orgs/org1/members/u2"));
            then.status(500).json_body(json!({
                "error": { "code": 500, "message": "Internal error", "status": "INTERNAL" }
            }));
        })
        .await;

    let store = DocumentStore::new(Arc::new(backend), "orgs", None, ["org1", "members"]).unwrap();
    let all = store.read_all().await.unwrap();

    assert_eq!(all.len(), 1);
    assert_eq!(all["u1"], record(json!({ "role": "admin" })));

    let failure = store.with_key("u2").unwrap().read().await.unwrap_err();
    assert_eq!(failure.kind(), FailureKind::Transient);
}

#[tokio::test]
async fn test_dot_segments_rejected_before_any_request() {
    let server = MockServer::start_async().await;
    let backend = Arc::new(create_backend(&server));

    let result = DocumentStore::new(Arc::clone(&backend), "users", Some("alice"), [".", ".."]);
    assert_eq!(
        result.unwrap_err(),
        PathError::RelativeSegment(".".to_string())
    );
    assert!(users().doc("..").is_err());
}

#[tokio::test]
async fn test_list_skips_documents_that_only_hold_sub_collections() {
    let server = MockServer::start_async().await;
    let backend = create_backend(&server);

    // Without showMissing Firestore only returns stored documents.
    let mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path(doc_path("users"))
                .query_param_missing("showMissing");
            then.status(200).json_body(json!({}));
        })
        .await;

    let store = DocumentStore::new(Arc::new(backend), "users", None, Vec::<String>::new()).unwrap();
    assert!(store.list_keys().await.unwrap().is_empty());
    mock.assert_async().await;
}
