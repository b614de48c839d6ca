//! History integration tests

use crate::common::{add_shape, create_body, shape_order, single_instance, state_with, test_user};
use axum::http::StatusCode;
use diagramsync::shared::{Diagram, HistoryEntry, HistoryOperation};
use pretty_assertions::assert_eq;
use serde_json::json;

#[tokio::test]
async fn test_history_records_every_commit() {
    let app = single_instance();
    let server = app.server();
    let owner = test_user();

    let created: Diagram = server
        .post("/diagrams")
        .authorization_bearer(&owner.token)
        .json(&create_body(&state_with("s1", &[])))
        .await
        .json();
    let path = format!("/diagrams/{}", created.id);

    server
        .patch(&path)
        .authorization_bearer(&owner.token)
        .json(&json!({ "state": add_shape("s1", "a") }))
        .await
        .assert_status_ok();
    server
        .put(&path)
        .authorization_bearer(&owner.token)
        .json(&create_body(&state_with("s1", &["z"])))
        .await
        .assert_status_ok();

    let entries: Vec<HistoryEntry> = server
        .get(&format!("{path}/history"))
        .authorization_bearer(&owner.token)
        .await
        .json();

    let summary: Vec<(i64, HistoryOperation)> = entries.iter().map(|e| (e.version, e.operation)).collect();
    assert_eq!(
        summary,
        vec![
            (3, HistoryOperation::Replace),
            (2, HistoryOperation::Patch),
            (1, HistoryOperation::Create),
        ]
    );
    assert!(entries.iter().all(|e| e.state.is_none()));
    assert!(entries.iter().all(|e| e.actor_id == Some(owner.id())));
}

#[tokio::test]
async fn test_history_paging_and_state() {
    let app = single_instance();
    let server = app.server();
    let owner = test_user();

    let created: Diagram = server
        .post("/diagrams")
        .authorization_bearer(&owner.token)
        .json(&create_body(&state_with("s1", &[])))
        .await
        .json();
    let path = format!("/diagrams/{}", created.id);
    for shape in ["a", "b", "c"] {
        server
            .patch(&path)
            .authorization_bearer(&owner.token)
            .json(&json!({ "state": add_shape("s1", shape) }))
            .await
            .assert_status_ok();
    }

    let page: Vec<HistoryEntry> = server
        .get(&format!("{path}/history"))
        .add_query_param("limit", 2)
        .add_query_param("offset", 1)
        .add_query_param("includeState", true)
        .authorization_bearer(&owner.token)
        .await
        .json();
    let versions: Vec<i64> = page.iter().map(|e| e.version).collect();
    assert_eq!(versions, vec![3, 2]);
    let state = page[0].state.as_ref().expect("state requested");
    assert_eq!(shape_order(state, "s1"), vec!["a", "b"]);
}

#[tokio::test]
async fn test_restore_appends_restore_entry() {
    let app = single_instance();
    let server = app.server();
    let owner = test_user();

    let created: Diagram = server
        .post("/diagrams")
        .authorization_bearer(&owner.token)
        .json(&create_body(&state_with("s1", &["a"])))
        .await
        .json();
    let path = format!("/diagrams/{}", created.id);

    server
        .put(&path)
        .authorization_bearer(&owner.token)
        .json(&create_body(&state_with("s1", &[])))
        .await
        .assert_status_ok();

    let entries: Vec<HistoryEntry> = server
        .get(&format!("{path}/history"))
        .authorization_bearer(&owner.token)
        .await
        .json();
    let first = entries.last().expect("create entry");
    assert_eq!(first.operation, HistoryOperation::Create);

    let entry: HistoryEntry = server
        .get(&format!("{path}/history/{}", first.id))
        .authorization_bearer(&owner.token)
        .await
        .json();
    assert_eq!(entry.state.as_ref().map(|s| shape_order(s, "s1")), Some(vec!["a".to_string()]));

    let restored: Diagram = server
        .post(&format!("{path}/history/{}/restore", first.id))
        .authorization_bearer(&owner.token)
        .await
        .json();
    assert_eq!(restored.version, 3);
    assert_eq!(shape_order(&restored.state, "s1"), vec!["a"]);

    let entries: Vec<HistoryEntry> = server
        .get(&format!("{path}/history"))
        .add_query_param("limit", 1)
        .authorization_bearer(&owner.token)
        .await
        .json();
    assert_eq!(entries[0].operation, HistoryOperation::Restore);
    assert_eq!(entries[0].metadata, Some(json!({ "restoredFrom": first.id })));
}

#[tokio::test]
async fn test_history_requires_read_access() {
    let app = single_instance();
    let server = app.server();
    let owner = test_user();

    let created: Diagram = server
        .post("/diagrams")
        .authorization_bearer(&owner.token)
        .json(&create_body(&state_with("s1", &[])))
        .await
        .json();

    server
        .get(&format!("/diagrams/{}/history", created.id))
        .authorization_bearer(&test_user().token)
        .await
        .assert_status(StatusCode::FORBIDDEN);
    server
        .get(&format!("/diagrams/{}/history/not-an-id", created.id))
        .authorization_bearer(&owner.token)
        .await
        .assert_status(StatusCode::NOT_FOUND);
}
