//! Share grant integration tests
//!
//! Grant, revoke and the access each permission gives.

use crate::common::{add_shape, create_body, single_instance, state_with, test_user, TestUser};
use axum::http::StatusCode;
use axum_test::TestServer;
use diagramsync::shared::{Diagram, Permission, ShareGrant, SharedDiagramSummary};
use pretty_assertions::assert_eq;
use serde_json::json;

async fn create_owned(server: &TestServer, owner: &TestUser) -> Diagram {
    server
        .post("/diagrams")
        .authorization_bearer(&owner.token)
        .json(&create_body(&state_with("s1", &["a"])))
        .await
        .json()
}

async fn grant(server: &TestServer, owner: &TestUser, diagram: &Diagram, grantee: &TestUser, permission: &str) {
    server
        .post(&format!("/diagrams/{}/shares", diagram.id))
        .authorization_bearer(&owner.token)
        .json(&json!({ "granteeIds": [grantee.id()], "permission": permission }))
        .await
        .assert_status_ok();
}

#[tokio::test]
async fn test_view_grant_gates_writes() {
    let app = single_instance();
    let server = app.server();
    let owner = test_user();
    let viewer = test_user();
    let diagram = create_owned(&server, &owner).await;
    let path = format!("/diagrams/{}", diagram.id);

    grant(&server, &owner, &diagram, &viewer, "view").await;

    server
        .get(&path)
        .authorization_bearer(&viewer.token)
        .await
        .assert_status_ok();
    server
        .put(&path)
        .authorization_bearer(&viewer.token)
        .json(&create_body(&state_with("s1", &[])))
        .await
        .assert_status(StatusCode::FORBIDDEN);
    server
        .patch(&path)
        .authorization_bearer(&viewer.token)
        .json(&json!({ "state": add_shape("s1", "b") }))
        .await
        .assert_status(StatusCode::FORBIDDEN);
    server
        .post(&format!("{path}/shares"))
        .authorization_bearer(&viewer.token)
        .json(&json!({ "granteeIds": [test_user().id()], "permission": "view" }))
        .await
        .assert_status(StatusCode::FORBIDDEN);
    server
        .delete(&path)
        .authorization_bearer(&viewer.token)
        .await
        .assert_status(StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_edit_grant_allows_writes_but_not_management() {
    let app = single_instance();
    let server = app.server();
    let owner = test_user();
    let editor = test_user();
    let diagram = create_owned(&server, &owner).await;
    let path = format!("/diagrams/{}", diagram.id);

    grant(&server, &owner, &diagram, &editor, "edit").await;

    let patched: Diagram = server
        .patch(&path)
        .authorization_bearer(&editor.token)
        .json(&json!({ "state": add_shape("s1", "b") }))
        .await
        .json();
    assert_eq!(patched.version, 2);

    server
        .get(&format!("{path}/shares"))
        .authorization_bearer(&editor.token)
        .await
        .assert_status(StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_regrant_updates_in_place() {
    let app = single_instance();
    let server = app.server();
    let owner = test_user();
    let grantee = test_user();
    let diagram = create_owned(&server, &owner).await;
    let shares = format!("/diagrams/{}/shares", diagram.id);

    grant(&server, &owner, &diagram, &grantee, "view").await;
    let updated: Vec<ShareGrant> = server
        .post(&shares)
        .authorization_bearer(&owner.token)
        .json(&json!({ "granteeIds": [grantee.id(), grantee.id()], "permission": "edit", "canCopy": true }))
        .await
        .json();
    assert_eq!(updated.len(), 1);

    let listed: Vec<ShareGrant> = server
        .get(&shares)
        .authorization_bearer(&owner.token)
        .await
        .json();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].grantee_id, grantee.id());
    assert_eq!(listed[0].permission, Permission::Edit);
    assert!(listed[0].can_copy);
}

#[tokio::test]
async fn test_shared_with_me_listing() {
    let app = single_instance();
    let server = app.server();
    let owner = test_user();
    let grantee = test_user();
    let diagram = create_owned(&server, &owner).await;
    create_owned(&server, &owner).await;

    grant(&server, &owner, &diagram, &grantee, "view").await;

    let shared: Vec<SharedDiagramSummary> = server
        .get("/diagrams/shared")
        .authorization_bearer(&grantee.token)
        .await
        .json();
    assert_eq!(shared.len(), 1);
    assert_eq!(shared[0].diagram.id, diagram.id);
    assert_eq!(shared[0].permission, Permission::View);
    assert!(!shared[0].can_copy);

    server
        .get("/diagrams/shared")
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_revoke_removes_access() {
    let app = single_instance();
    let server = app.server();
    let owner = test_user();
    let grantee = test_user();
    let diagram = create_owned(&server, &owner).await;
    let path = format!("/diagrams/{}", diagram.id);
    let revoke = format!("{path}/shares/{}", grantee.id());

    grant(&server, &owner, &diagram, &grantee, "edit").await;

    server
        .delete(&revoke)
        .authorization_bearer(&owner.token)
        .await
        .assert_status(StatusCode::NO_CONTENT);
    server
        .get(&path)
        .authorization_bearer(&grantee.token)
        .await
        .assert_status(StatusCode::FORBIDDEN);
    server
        .delete(&revoke)
        .authorization_bearer(&owner.token)
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_grant_validation() {
    let app = single_instance();
    let server = app.server();
    let owner = test_user();
    let diagram = create_owned(&server, &owner).await;
    let shares = format!("/diagrams/{}/shares", diagram.id);

    server
        .post(&shares)
        .authorization_bearer(&owner.token)
        .json(&json!({ "granteeIds": [owner.id()], "permission": "view" }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
    server
        .post(&shares)
        .authorization_bearer(&owner.token)
        .json(&json!({ "granteeIds": [], "permission": "view" }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
    server
        .post(&shares)
        .authorization_bearer(&owner.token)
        .json(&json!({ "granteeIds": [test_user().id()], "permission": "admin" }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_malformed_grantee_ids() {
    let app = single_instance();
    let server = app.server();
    let owner = test_user();
    let diagram = create_owned(&server, &owner).await;

    // In the body the id is part of the payload shape
    let response = server
        .post(&format!("/diagrams/{}/shares", diagram.id))
        .authorization_bearer(&owner.token)
        .json(&json!({ "granteeIds": ["not-a-uuid"], "permission": "view" }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "validation");

    // In the path it names a resource that cannot exist
    server
        .delete(&format!("/diagrams/{}/shares/not-a-uuid", diagram.id))
        .authorization_bearer(&owner.token)
        .await
        .assert_status(StatusCode::NOT_FOUND);
}
