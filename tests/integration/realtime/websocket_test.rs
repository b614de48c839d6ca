//! WebSocket subscription tests
//!
//! Each test serves an instance on a real socket and connects with
//! tokio-tungstenite.

use crate::common::{add_shape, cluster, single_instance, state_with, test_user, TestInstance, TestUser};
use diagramsync::shared::{Diagram, FrameKind, UpdateFrame};
use futures_util::{SinkExt, StreamExt};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use uuid::Uuid;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(2);

async fn connect(addr: SocketAddr, query: &str, user: Option<&TestUser>) -> Socket {
    let mut request = format!("ws://{addr}/ws{query}")
        .into_client_request()
        .expect("valid request");
    if let Some(user) = user {
        request.headers_mut().insert(
            "authorization",
            HeaderValue::from_str(&user.bearer()).expect("header value"),
        );
    }
    let (socket, _) = connect_async(request).await.expect("upgrade");
    socket
}

async fn create(app: &TestInstance, owner: &TestUser) -> Diagram {
    app.state
        .service
        .create(Some(&owner.identity), Some(state_with("s1", &[])), None)
        .await
        .expect("create")
}

/// Wait until the instance has registered `count` subscribers for the diagram
async fn wait_for_subscribers(app: &TestInstance, diagram: &Diagram, count: usize) {
    let registry = app.state.fanout().registry();
    tokio::time::timeout(WAIT, async {
        while registry.subscriber_count(diagram.id) < count {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("subscriber registered");
}

async fn next_frame(socket: &mut Socket) -> UpdateFrame {
    loop {
        let message = tokio::time::timeout(WAIT, socket.next())
            .await
            .expect("message within timeout")
            .expect("socket open")
            .expect("valid message");
        match message {
            Message::Text(text) => return serde_json::from_str(text.as_str()).expect("frame decodes"),
            Message::Close(frame) => panic!("closed unexpectedly: {frame:?}"),
            _ => continue,
        }
    }
}

async fn close_code(socket: &mut Socket) -> u16 {
    loop {
        let message = tokio::time::timeout(WAIT, socket.next())
            .await
            .expect("message within timeout")
            .expect("socket open")
            .expect("valid message");
        if let Message::Close(frame) = message {
            return frame.map(|f| u16::from(f.code)).expect("close frame carries a code");
        }
    }
}

#[tokio::test]
async fn test_subscribe_by_query_receives_updates() {
    let app = single_instance();
    let addr = app.serve().await;
    let owner = test_user();
    let diagram = create(&app, &owner).await;

    let mut socket = connect(addr, &format!("?diagramId={}", diagram.id), Some(&owner)).await;
    wait_for_subscribers(&app, &diagram, 1).await;

    app.state
        .service
        .apply(Some(&owner.identity), &diagram.id.to_string(), Some(add_shape("s1", "a")), None)
        .await
        .expect("apply");

    let frame = next_frame(&mut socket).await;
    assert_eq!(frame.kind, FrameKind::Update);
    assert_eq!(frame.document_id, diagram.id);
    assert_eq!(frame.payload["version"], 2);
}

#[tokio::test]
async fn test_subscribe_by_message() {
    let app = single_instance();
    let addr = app.serve().await;
    let owner = test_user();
    let diagram = create(&app, &owner).await;

    let mut socket = connect(addr, "", Some(&owner)).await;
    let request = json!({ "type": "subscribe", "documentId": diagram.id }).to_string();
    socket.send(Message::Text(request.into())).await.expect("send");
    wait_for_subscribers(&app, &diagram, 1).await;

    app.state
        .service
        .replace(Some(&owner.identity), &diagram.id.to_string(), Some(state_with("s1", &["x"])), None)
        .await
        .expect("replace");

    let frame = next_frame(&mut socket).await;
    assert_eq!(frame.payload["version"], 2);
}

#[tokio::test]
async fn test_rejections_use_distinct_close_codes() {
    let app = single_instance();
    let addr = app.serve().await;
    let owner = test_user();
    let diagram = create(&app, &owner).await;
    let query = format!("?diagramId={}", diagram.id);

    let mut unknown = connect(addr, &format!("?diagramId={}", Uuid::new_v4()), Some(&owner)).await;
    assert_eq!(close_code(&mut unknown).await, 4404);

    let mut malformed = connect(addr, "?diagramId=nope", Some(&owner)).await;
    assert_eq!(close_code(&mut malformed).await, 4404);

    let mut anonymous = connect(addr, &query, None).await;
    assert_eq!(close_code(&mut anonymous).await, 4401);

    let stranger = test_user();
    let mut forbidden = connect(addr, &query, Some(&stranger)).await;
    assert_eq!(close_code(&mut forbidden).await, 4403);

    let mut garbled = connect(addr, "", Some(&owner)).await;
    garbled
        .send(Message::Text("{\"type\":\"hello\"}".into()))
        .await
        .expect("send");
    assert_eq!(close_code(&mut garbled).await, 4400);
}

#[tokio::test]
async fn test_view_grant_may_subscribe() {
    let app = single_instance();
    let addr = app.serve().await;
    let owner = test_user();
    let viewer = test_user();
    let diagram = create(&app, &owner).await;

    app.state
        .service
        .grant(
            Some(&owner.identity),
            &diagram.id.to_string(),
            vec![viewer.id()],
            diagramsync::shared::Permission::View,
            false,
        )
        .await
        .expect("grant");

    let mut socket = connect(addr, &format!("?diagramId={}", diagram.id), Some(&viewer)).await;
    wait_for_subscribers(&app, &diagram, 1).await;

    app.state
        .service
        .apply(Some(&owner.identity), &diagram.id.to_string(), Some(add_shape("s1", "a")), None)
        .await
        .expect("apply");
    assert_eq!(next_frame(&mut socket).await.payload["version"], 2);
}

#[tokio::test]
async fn test_delete_closes_with_gone_code() {
    let app = single_instance();
    let addr = app.serve().await;
    let owner = test_user();
    let diagram = create(&app, &owner).await;

    let mut socket = connect(addr, &format!("?diagramId={}", diagram.id), Some(&owner)).await;
    wait_for_subscribers(&app, &diagram, 1).await;

    app.state
        .service
        .remove(Some(&owner.identity), &diagram.id.to_string())
        .await
        .expect("remove");

    let frame = next_frame(&mut socket).await;
    assert_eq!(frame.kind, FrameKind::Deleted);
    assert_eq!(close_code(&mut socket).await, 4410);
}

#[tokio::test]
async fn test_shutdown_closes_with_going_away() {
    let app = single_instance();
    let addr = app.serve().await;
    let owner = test_user();
    let diagram = create(&app, &owner).await;

    let mut socket = connect(addr, &format!("?diagramId={}", diagram.id), Some(&owner)).await;
    wait_for_subscribers(&app, &diagram, 1).await;

    assert_eq!(app.state.fanout().shutdown(), 1);
    assert_eq!(close_code(&mut socket).await, 1001);
}

#[tokio::test]
async fn test_cross_instance_sockets() {
    let (nodes, _) = cluster(2);
    let addr_b = nodes[1].serve().await;
    let owner = test_user();
    let diagram = create(&nodes[0], &owner).await;

    let mut socket = connect(addr_b, &format!("?diagramId={}", diagram.id), Some(&owner)).await;
    wait_for_subscribers(&nodes[1], &diagram, 1).await;

    nodes[0]
        .state
        .service
        .apply(Some(&owner.identity), &diagram.id.to_string(), Some(add_shape("s1", "a")), None)
        .await
        .expect("apply");

    let frame = next_frame(&mut socket).await;
    assert_eq!(frame.payload["version"], 2);
    assert!(
        tokio::time::timeout(Duration::from_millis(200), socket.next())
            .await
            .is_err(),
        "exactly one frame per commit"
    );
}
