/**
 * WebSocket Subscription Handler
 *
 * `GET /ws?diagramId=<id>` upgrades to a WebSocket that receives every
 * committed change of one diagram.
 *
 * # Connection States
 *
 * `Connecting -> Authorizing -> Subscribed -> Closed`
 *
 * Without `diagramId` in the query the first text message must be
 * `{"type": "subscribe", "documentId": "<id>"}`, sent within 10 seconds.
 * Access is checked at subscribe time, so grant changes apply to new
 * connections immediately.
 *
 * # Close Codes
 *
 * | Code | Cause |
 * |------|-------|
 * | 4400 | missing or invalid subscribe request |
 * | 4401 | unauthenticated |
 * | 4403 | forbidden |
 * | 4404 | diagram not found |
 * | 4408 | dropped as a slow consumer |
 * | 4410 | diagram deleted |
 * | 1001 | server shutting down |
 * | 1011 | server error |
 */

use crate::backend::diagrams::DiagramService;
use crate::backend::error::BackendError;
use crate::backend::middleware::MaybeIdentity;
use crate::backend::realtime::registry::{Eviction, Subscription};
use crate::shared::SubscribeRequest;
use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::time::Duration;

/// How long to wait for the subscribe message
pub const SUBSCRIBE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SocketParams {
    pub diagram_id: Option<String>,
}

/// Why the server closed a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    BadRequest,
    Unauthenticated,
    Forbidden,
    NotFound,
    SlowConsumer,
    Deleted,
    Shutdown,
    ServerError,
}

impl CloseReason {
    pub fn code(self) -> u16 {
        match self {
            CloseReason::BadRequest => 4400,
            CloseReason::Unauthenticated => 4401,
            CloseReason::Forbidden => 4403,
            CloseReason::NotFound => 4404,
            CloseReason::SlowConsumer => 4408,
            CloseReason::Deleted => 4410,
            CloseReason::Shutdown => 1001,
            CloseReason::ServerError => 1011,
        }
    }

    pub fn text(self) -> &'static str {
        match self {
            CloseReason::BadRequest => "invalid subscribe request",
            CloseReason::Unauthenticated => "authentication required",
            CloseReason::Forbidden => "forbidden",
            CloseReason::NotFound => "diagram not found",
            CloseReason::SlowConsumer => "subscriber too slow",
            CloseReason::Deleted => "diagram deleted",
            CloseReason::Shutdown => "server shutting down",
            CloseReason::ServerError => "server error",
        }
    }

    /// Close reason for a rejected subscription
    pub fn for_error(err: &BackendError) -> Self {
        match err {
            BackendError::NotFound => CloseReason::NotFound,
            BackendError::Forbidden { .. } => CloseReason::Forbidden,
            BackendError::Unauthenticated => CloseReason::Unauthenticated,
            BackendError::Validation(_) => CloseReason::BadRequest,
            _ => CloseReason::ServerError,
        }
    }
}

impl From<Eviction> for CloseReason {
    fn from(eviction: Eviction) -> Self {
        match eviction {
            Eviction::SlowConsumer => CloseReason::SlowConsumer,
            Eviction::Deleted => CloseReason::Deleted,
            Eviction::Shutdown => CloseReason::Shutdown,
        }
    }
}

/// Handle `GET /ws`
pub async fn handle_socket_upgrade(
    ws: WebSocketUpgrade,
    State(service): State<DiagramService>,
    identity: MaybeIdentity,
    Query(params): Query<SocketParams>,
) -> Response {
    ws.on_upgrade(move |socket| run_socket(socket, service, identity, params.diagram_id))
}

async fn run_socket(
    mut socket: WebSocket,
    service: DiagramService,
    identity: MaybeIdentity,
    diagram_id: Option<String>,
) {
    let raw_id = match diagram_id {
        Some(id) => id,
        None => match await_subscribe(&mut socket).await {
            Some(id) => id,
            None => {
                close(socket, CloseReason::BadRequest).await;
                return;
            }
        },
    };

    let subscription = match service.subscribe(identity.identity(), &raw_id).await {
        Ok(subscription) => subscription,
        Err(e) => {
            let reason = CloseReason::for_error(&e);
            tracing::info!("[Realtime] Subscription to {} rejected: {}", raw_id, e);
            close(socket, reason).await;
            return;
        }
    };
    tracing::info!(
        "[Realtime] Subscriber {} attached to {}",
        subscription.id(),
        subscription.document_id()
    );
    forward(socket, subscription).await;
}

/// Wait for `{"type": "subscribe", "documentId": ...}`
async fn await_subscribe(socket: &mut WebSocket) -> Option<String> {
    let first = tokio::time::timeout(SUBSCRIBE_TIMEOUT, async {
        while let Some(Ok(message)) = socket.recv().await {
            match message {
                Message::Text(text) => return Some(text),
                Message::Close(_) => return None,
                _ => continue,
            }
        }
        None
    })
    .await
    .ok()
    .flatten()?;

    match serde_json::from_str::<SubscribeRequest>(first.as_str()) {
        Ok(SubscribeRequest::Subscribe { document_id }) => Some(document_id),
        Err(e) => {
            tracing::debug!("[Realtime] Bad subscribe message: {}", e);
            None
        }
    }
}

/// Pump frames to the client until either side ends the subscription
async fn forward(socket: WebSocket, mut subscription: Subscription) {
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            frame = subscription.recv() => {
                match frame {
                    Some(text) => {
                        if sink.send(Message::Text(text.as_ref().into())).await.is_err() {
                            break;
                        }
                    }
                    None => {
                        let reason = subscription
                            .eviction()
                            .map(CloseReason::from)
                            .unwrap_or(CloseReason::ServerError);
                        tracing::info!(
                            "[Realtime] Closing subscriber {}: {}",
                            subscription.id(),
                            reason.text()
                        );
                        let _ = sink.send(close_message(reason)).await;
                        break;
                    }
                }
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    subscription.close();
}

fn close_message(reason: CloseReason) -> Message {
    Message::Close(Some(CloseFrame {
        code: reason.code(),
        reason: reason.text().into(),
    }))
}

async fn close(mut socket: WebSocket, reason: CloseReason) {
    if let Err(e) = socket.send(close_message(reason)).await {
        tracing::debug!("[Realtime] Failed to send close frame: {}", e);
    }
}
