//! Fanout integration tests
//!
//! Writes go through the HTTP API; subscriptions are taken directly from
//! each instance's fanout.

use crate::common::{add_shape, cluster, create_body, single_instance, state_with, test_user, TestUser};
use axum_test::TestServer;
use diagramsync::backend::error::BackendError;
use diagramsync::backend::realtime::{Eviction, FanoutSnapshot, Subscription};
use diagramsync::shared::{Diagram, FrameKind, UpdateFrame};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(2);

async fn create(server: &TestServer, owner: &TestUser) -> Diagram {
    server
        .post("/diagrams")
        .authorization_bearer(&owner.token)
        .json(&create_body(&state_with("s1", &[])))
        .await
        .json()
}

async fn next_frame(subscription: &mut Subscription) -> UpdateFrame {
    let text = tokio::time::timeout(WAIT, subscription.recv())
        .await
        .expect("frame within timeout")
        .expect("subscription open");
    serde_json::from_str(&text).expect("frame decodes")
}

/// Give the bus pumps a moment to drain
async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}

#[tokio::test]
async fn test_single_instance_fanout() {
    let app = single_instance();
    let server = app.server();
    let owner = test_user();
    let target = create(&server, &owner).await;
    let other = create(&server, &owner).await;

    let fanout = app.state.fanout();
    let mut first = fanout.subscribe(target.id);
    let mut second = fanout.subscribe(target.id);
    let mut unrelated = fanout.subscribe(other.id);

    server
        .patch(&format!("/diagrams/{}", target.id))
        .authorization_bearer(&owner.token)
        .json(&json!({ "state": add_shape("s1", "a") }))
        .await
        .assert_status_ok();

    for subscription in [&mut first, &mut second] {
        let frame = next_frame(subscription).await;
        assert_eq!(frame.kind, FrameKind::Update);
        assert_eq!(frame.document_id, target.id);
        let diagram: Diagram = serde_json::from_value(frame.payload).expect("payload is a diagram");
        assert_eq!(diagram.version, 2);
        assert!(diagram.state.sheets["s1"].shapes_by_id.contains_key("a"));
        assert!(subscription.try_recv().is_none());
    }
    assert!(unrelated.try_recv().is_none());
}

#[tokio::test]
async fn test_cross_instance_delivery_without_echo() {
    let (nodes, _) = cluster(2);
    let (node_a, node_b) = (&nodes[0], &nodes[1]);
    let server_a = node_a.server();
    let owner = test_user();
    let diagram = create(&server_a, &owner).await;

    let mut on_a = node_a.state.fanout().subscribe(diagram.id);
    let mut on_b = node_b.state.fanout().subscribe(diagram.id);

    server_a
        .patch(&format!("/diagrams/{}", diagram.id))
        .authorization_bearer(&owner.token)
        .json(&json!({ "state": add_shape("s1", "a") }))
        .await
        .assert_status_ok();

    let remote = next_frame(&mut on_b).await;
    assert_eq!(remote.payload["version"], 2);
    let local = next_frame(&mut on_a).await;
    assert_eq!(local.payload["version"], 2);

    settle().await;
    assert!(on_a.try_recv().is_none());
    assert!(on_b.try_recv().is_none());

    let stats_a: FanoutSnapshot = node_a.state.fanout().stats();
    assert_eq!(stats_a.bus_published, 1);
    assert_eq!(stats_a.bus_own_skipped, 1);
    assert_eq!(stats_a.bus_received, 0);
    let stats_b = node_b.state.fanout().stats();
    assert_eq!(stats_b.bus_received, 1);
    assert_eq!(stats_b.published, 0);
}

#[tokio::test]
async fn test_writes_on_either_instance_reach_both() {
    let (nodes, _) = cluster(2);
    let owner = test_user();
    let diagram = create(&nodes[0].server(), &owner).await;

    let mut on_a = nodes[0].state.fanout().subscribe(diagram.id);
    let mut on_b = nodes[1].state.fanout().subscribe(diagram.id);

    for (n, shape) in [(0, "a"), (1, "b")] {
        nodes[n]
            .server()
            .patch(&format!("/diagrams/{}", diagram.id))
            .authorization_bearer(&owner.token)
            .json(&json!({ "state": add_shape("s1", shape) }))
            .await
            .assert_status_ok();
    }

    for subscription in [&mut on_a, &mut on_b] {
        let first = next_frame(subscription).await;
        let second = next_frame(subscription).await;
        let mut versions = vec![first.payload["version"].clone(), second.payload["version"].clone()];
        versions.sort_by_key(|v| v.as_i64());
        assert_eq!(versions, vec![json!(2), json!(3)]);
    }
}

#[tokio::test]
async fn test_delete_closes_subscriptions_everywhere() {
    let (nodes, _) = cluster(2);
    let owner = test_user();
    let server_a = nodes[0].server();
    let diagram = create(&server_a, &owner).await;

    let mut on_a = nodes[0].state.fanout().subscribe(diagram.id);
    let mut on_b = nodes[1].state.fanout().subscribe(diagram.id);

    server_a
        .delete(&format!("/diagrams/{}", diagram.id))
        .authorization_bearer(&owner.token)
        .await
        .assert_status_ok();

    for subscription in [&mut on_a, &mut on_b] {
        let frame = next_frame(subscription).await;
        assert!(frame.is_deletion());
        let end = tokio::time::timeout(WAIT, subscription.recv())
            .await
            .expect("closed within timeout");
        assert!(end.is_none());
        assert_eq!(subscription.eviction(), Some(Eviction::Deleted));
    }

    settle().await;
    assert_eq!(nodes[0].state.fanout().registry().subscriber_count(diagram.id), 0);
    assert_eq!(nodes[1].state.fanout().registry().subscriber_count(diagram.id), 0);
}

#[tokio::test]
async fn test_stats_endpoint() {
    let app = single_instance();
    let server = app.server();
    let owner = test_user();
    let diagram = create(&server, &owner).await;
    let _subscription = app.state.fanout().subscribe(diagram.id);

    let stats: serde_json::Value = server.get("/realtime/stats").await.json();
    assert_eq!(stats["instanceId"], "solo");
    assert_eq!(stats["activeSubscribers"], 1);
    assert_eq!(stats["bus"], serde_json::Value::Null);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_subscribe_racing_delete_never_outlives_the_diagram() {
    let app = single_instance();
    let server = app.server();
    let owner = test_user();

    for _ in 0..25 {
        let diagram = create(&server, &owner).await;
        let id = diagram.id.to_string();

        let subscriber = {
            let service = app.state.service.clone();
            let identity = owner.identity.clone();
            let id = id.clone();
            tokio::spawn(async move { service.subscribe(Some(&identity), &id).await })
        };
        let remover = {
            let service = app.state.service.clone();
            let identity = owner.identity.clone();
            let id = id.clone();
            tokio::spawn(async move { service.remove(Some(&identity), &id).await })
        };

        remover.await.expect("remove task").expect("remove succeeds");
        match subscriber.await.expect("subscribe task") {
            Ok(mut subscription) => {
                tokio::time::timeout(WAIT, async { while subscription.recv().await.is_some() {} })
                    .await
                    .expect("subscription closed after delete");
                assert_eq!(subscription.eviction(), Some(Eviction::Deleted));
            }
            Err(e) => assert!(matches!(e, BackendError::NotFound), "unexpected error: {e}"),
        }
        assert_eq!(app.state.fanout().registry().subscriber_count(diagram.id), 0);
    }
}
