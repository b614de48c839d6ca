/**
 * Realtime Frames
 *
 * This module defines the frames pushed to live diagram subscribers and the
 * request a client sends to open a subscription.
 *
 * # Wire Format
 *
 * ```json
 * {"type": "update", "documentId": "6f1c...", "payload": {"id": "...", "version": 4, "state": {...}}}
 * {"type": "deleted", "documentId": "6f1c...", "payload": null}
 * ```
 */
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of realtime frame
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FrameKind {
    /// A committed change; the payload is the new document
    Update,
    /// The document was deleted; subscriptions close after this frame
    Deleted,
}

/// Frame delivered to every subscriber of a document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UpdateFrame {
    #[serde(rename = "type")]
    pub kind: FrameKind,
    pub document_id: Uuid,
    pub payload: serde_json::Value,
}

impl UpdateFrame {
    /// Create an update frame
    pub fn update(document_id: Uuid, payload: serde_json::Value) -> Self {
        Self {
            kind: FrameKind::Update,
            document_id,
            payload,
        }
    }

    /// Create a deletion frame
    pub fn deleted(document_id: Uuid) -> Self {
        Self {
            kind: FrameKind::Deleted,
            document_id,
            payload: serde_json::Value::Null,
        }
    }

    pub fn is_deletion(&self) -> bool {
        self.kind == FrameKind::Deleted
    }
}

/// First message of a subscription when the document is not given in the URL
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SubscribeRequest {
    #[serde(rename_all = "camelCase")]
    Subscribe { document_id: String },
}
