/**
 * Fanout
 *
 * Delivers committed changes to live subscribers, locally and through the
 * optional message bus.
 *
 * # Publish
 *
 * 1. Serialize the frame once and deliver it to local subscribers
 * 2. Publish `{origin, documentId, payload}` on the document's bus channel
 *
 * Bus failures never reach the writer; they are logged and counted.
 *
 * # Receive
 *
 * The pump started by [`Fanout::start`] reads the bus. Envelopes from this
 * instance are skipped (already delivered locally) and nothing received is
 * ever republished.
 *
 * A `deleted` frame closes every local subscription to the document after
 * it has been delivered.
 */

use crate::backend::realtime::bus::{channel_for, BusEnvelope, MessageBus};
use crate::backend::realtime::registry::{Eviction, InterestObserver, Subscription, SubscriptionRegistry};
use crate::shared::UpdateFrame;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Counters for degraded or busy fanout; lock-free on the hot path
#[derive(Default)]
struct FanoutStats {
    published: AtomicU64,
    delivered: AtomicU64,
    evicted_slow: AtomicU64,
    bus_published: AtomicU64,
    bus_publish_failures: AtomicU64,
    bus_received: AtomicU64,
    bus_own_skipped: AtomicU64,
    bus_decode_failures: AtomicU64,
}

/// Point-in-time copy of the fanout counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FanoutSnapshot {
    pub instance_id: String,
    pub bus: Option<&'static str>,
    pub active_documents: usize,
    pub active_subscribers: usize,
    pub published: u64,
    pub delivered: u64,
    pub evicted_slow: u64,
    pub bus_published: u64,
    pub bus_publish_failures: u64,
    pub bus_received: u64,
    pub bus_own_skipped: u64,
    pub bus_decode_failures: u64,
}

/// Subscribes the bus to a document's channel while it has local subscribers
struct BusInterest {
    bus: Arc<dyn MessageBus>,
}

impl InterestObserver for BusInterest {
    fn interest_gained(&self, document_id: Uuid) {
        self.bus.subscribe(&channel_for(document_id));
    }

    fn interest_lost(&self, document_id: Uuid) {
        self.bus.unsubscribe(&channel_for(document_id));
    }
}

struct FanoutInner {
    instance_id: String,
    registry: SubscriptionRegistry,
    bus: Option<Arc<dyn MessageBus>>,
    stats: FanoutStats,
}

#[derive(Clone)]
pub struct Fanout {
    inner: Arc<FanoutInner>,
}

impl Fanout {
    pub fn new(instance_id: impl Into<String>, buffer: usize, bus: Option<Arc<dyn MessageBus>>) -> Self {
        let registry = match &bus {
            Some(bus) => SubscriptionRegistry::with_observer(
                buffer,
                Arc::new(BusInterest { bus: bus.clone() }),
            ),
            None => SubscriptionRegistry::new(buffer),
        };

        Self {
            inner: Arc::new(FanoutInner {
                instance_id: instance_id.into(),
                registry,
                bus,
                stats: FanoutStats::default(),
            }),
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.inner.instance_id
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.inner.registry
    }

    pub fn subscribe(&self, document_id: Uuid) -> Subscription {
        self.inner.registry.subscribe(document_id)
    }

    /// Start the bus pump; `None` without a bus or if already started
    pub fn start(&self) -> Option<JoinHandle<()>> {
        let bus = self.inner.bus.as_ref()?;
        let mut incoming = bus.take_incoming()?;
        let fanout = self.clone();

        Some(tokio::spawn(async move {
            while let Some(message) = incoming.recv().await {
                fanout.receive(&message.payload);
            }
            tracing::info!("[Fanout] Bus stream ended");
        }))
    }

    /// Deliver a committed change locally and to other instances
    pub fn publish(&self, frame: &UpdateFrame) {
        let stats = &self.inner.stats;
        stats.published.fetch_add(1, Ordering::Relaxed);
        self.deliver_local(frame);

        let Some(bus) = &self.inner.bus else {
            return;
        };

        let envelope = BusEnvelope {
            origin: self.inner.instance_id.clone(),
            document_id: frame.document_id,
            payload: frame.clone(),
        };
        let payload = match serde_json::to_string(&envelope) {
            Ok(payload) => payload,
            Err(e) => {
                stats.bus_publish_failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("[Fanout] Failed to encode envelope: {}", e);
                return;
            }
        };

        match bus.publish(&channel_for(frame.document_id), payload) {
            Ok(()) => {
                stats.bus_published.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                stats.bus_publish_failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    "[Fanout] Cross-instance publish for {} failed: {}",
                    frame.document_id,
                    e
                );
            }
        }
    }

    /// Handle one raw bus payload
    fn receive(&self, payload: &str) {
        let stats = &self.inner.stats;
        let envelope: BusEnvelope = match serde_json::from_str(payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                stats.bus_decode_failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("[Fanout] Undecodable bus message: {}", e);
                return;
            }
        };

        if envelope.origin == self.inner.instance_id {
            stats.bus_own_skipped.fetch_add(1, Ordering::Relaxed);
            return;
        }

        stats.bus_received.fetch_add(1, Ordering::Relaxed);
        self.deliver_local(&envelope.payload);
    }

    fn deliver_local(&self, frame: &UpdateFrame) {
        let text: Arc<str> = match serde_json::to_string(frame) {
            Ok(text) => text.into(),
            Err(e) => {
                tracing::error!("[Fanout] Failed to encode frame: {}", e);
                return;
            }
        };

        let registry = &self.inner.registry;
        let stats = &self.inner.stats;
        let report = registry.deliver(frame.document_id, text);
        stats
            .delivered
            .fetch_add(report.delivered as u64, Ordering::Relaxed);

        if report.evicted > 0 {
            stats
                .evicted_slow
                .fetch_add(report.evicted as u64, Ordering::Relaxed);
            tracing::warn!(
                "[Fanout] Dropped {} slow subscriber(s) of {}",
                report.evicted,
                frame.document_id
            );
        }

        if frame.is_deletion() {
            let closed = registry.close_document(frame.document_id, Eviction::Deleted);
            tracing::debug!("[Fanout] Closed {} subscription(s) of deleted {}", closed, frame.document_id);
        }
    }

    /// Close every local subscription
    pub fn shutdown(&self) -> usize {
        self.inner.registry.close_all(Eviction::Shutdown)
    }

    pub fn stats(&self) -> FanoutSnapshot {
        let stats = &self.inner.stats;
        let registry = &self.inner.registry;
        FanoutSnapshot {
            instance_id: self.inner.instance_id.clone(),
            bus: self.inner.bus.as_ref().map(|bus| bus.name()),
            active_documents: registry.document_count(),
            active_subscribers: registry.total_subscribers(),
            published: stats.published.load(Ordering::Relaxed),
            delivered: stats.delivered.load(Ordering::Relaxed),
            evicted_slow: stats.evicted_slow.load(Ordering::Relaxed),
            bus_published: stats.bus_published.load(Ordering::Relaxed),
            bus_publish_failures: stats.bus_publish_failures.load(Ordering::Relaxed),
            bus_received: stats.bus_received.load(Ordering::Relaxed),
            bus_own_skipped: stats.bus_own_skipped.load(Ordering::Relaxed),
            bus_decode_failures: stats.bus_decode_failures.load(Ordering::Relaxed),
        }
    }
}
