/**
 * Message Bus
 *
 * Cross-instance transport for realtime frames. Each document has its own
 * channel (`diagram_updates:<id>`); an instance listens only on channels of
 * documents it has local subscribers for.
 *
 * The trait is synchronous so it can be called from the registry's interest
 * callbacks. Implementations queue the work and perform it on their own task.
 *
 * # Implementations
 *
 * - `PgBus` - PostgreSQL `LISTEN/NOTIFY` (see `pg_bus.rs`)
 * - `LocalBus` - in-process hub, for tests and single-binary simulations
 */

use crate::shared::UpdateFrame;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Prefix of per-document bus channels
pub const CHANNEL_PREFIX: &str = "diagram_updates:";

pub fn channel_for(document_id: Uuid) -> String {
    format!("{CHANNEL_PREFIX}{document_id}")
}

/// What travels over the bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusEnvelope {
    /// Instance that committed the change
    pub origin: String,
    pub document_id: Uuid,
    pub payload: UpdateFrame,
}

/// Raw message received from the bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    pub channel: String,
    pub payload: String,
}

#[derive(Debug, Error)]
pub enum BusError {
    #[error("bus is closed")]
    Closed,

    #[error("bus failure: {0}")]
    Backend(String),
}

/// Publish/subscribe transport between instances
pub trait MessageBus: Send + Sync {
    /// Queue a payload for `channel`; does not wait for delivery
    fn publish(&self, channel: &str, payload: String) -> Result<(), BusError>;

    fn subscribe(&self, channel: &str);

    fn unsubscribe(&self, channel: &str);

    /// Incoming message stream; `Some` only on the first call
    fn take_incoming(&self) -> Option<mpsc::UnboundedReceiver<BusMessage>>;

    fn name(&self) -> &'static str;
}

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Member {
    channels: Arc<Mutex<HashSet<String>>>,
    tx: mpsc::UnboundedSender<BusMessage>,
}

/// In-process hub connecting several [`LocalBus`] endpoints
///
/// Like `NOTIFY`, a publish reaches every endpoint listening on the channel,
/// including the publisher's own.
#[derive(Clone, Default)]
pub struct LocalBusHub {
    members: Arc<Mutex<Vec<Member>>>,
}

impl LocalBusHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// New endpoint attached to this hub
    pub fn connect(&self) -> Arc<LocalBus> {
        let (tx, rx) = mpsc::unbounded_channel();
        let channels = Arc::new(Mutex::new(HashSet::new()));
        locked(&self.members).push(Member {
            channels: channels.clone(),
            tx,
        });
        Arc::new(LocalBus {
            hub: self.clone(),
            channels,
            incoming: Mutex::new(Some(rx)),
        })
    }

    fn route(&self, channel: &str, payload: &str) -> usize {
        let mut members = locked(&self.members);
        members.retain(|member| !member.tx.is_closed());
        let mut routed = 0;
        for member in members.iter() {
            if !locked(&member.channels).contains(channel) {
                continue;
            }
            let message = BusMessage {
                channel: channel.to_string(),
                payload: payload.to_string(),
            };
            if member.tx.send(message).is_ok() {
                routed += 1;
            }
        }
        routed
    }
}

/// One endpoint of a [`LocalBusHub`]
pub struct LocalBus {
    hub: LocalBusHub,
    channels: Arc<Mutex<HashSet<String>>>,
    incoming: Mutex<Option<mpsc::UnboundedReceiver<BusMessage>>>,
}

impl LocalBus {
    pub fn is_listening(&self, channel: &str) -> bool {
        locked(&self.channels).contains(channel)
    }

    pub fn channel_count(&self) -> usize {
        locked(&self.channels).len()
    }
}

impl MessageBus for LocalBus {
    fn publish(&self, channel: &str, payload: String) -> Result<(), BusError> {
        self.hub.route(channel, &payload);
        Ok(())
    }

    fn subscribe(&self, channel: &str) {
        locked(&self.channels).insert(channel.to_string());
    }

    fn unsubscribe(&self, channel: &str) {
        locked(&self.channels).remove(channel);
    }

    fn take_incoming(&self) -> Option<mpsc::UnboundedReceiver<BusMessage>> {
        locked(&self.incoming).take()
    }

    fn name(&self) -> &'static str {
        "local"
    }
}
