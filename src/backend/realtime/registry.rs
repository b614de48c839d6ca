/**
 * Subscription Registry
 *
 * Per-process table of live subscribers keyed by document id.
 *
 * # Delivery
 *
 * Each subscriber owns a bounded channel. Delivery uses `try_send`, so a
 * slow subscriber never blocks the writer or the other subscribers: a full
 * buffer evicts that subscriber (close reason `SlowConsumer`) and a closed
 * channel is removed silently.
 *
 * # Interest
 *
 * An optional [`InterestObserver`] is told when a document gains its first
 * subscriber and loses its last one. It is called while the registry lock
 * is held, so gained/lost notifications for one document never reorder.
 */

use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Why the server ended a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Eviction {
    /// The subscriber's buffer filled up
    SlowConsumer,
    /// The document was deleted
    Deleted,
    /// The server is shutting down
    Shutdown,
}

/// Callback for 0 -> 1 and 1 -> 0 subscriber transitions
pub trait InterestObserver: Send + Sync {
    fn interest_gained(&self, document_id: Uuid);
    fn interest_lost(&self, document_id: Uuid);
}

/// Result of delivering one frame locally
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    /// Subscribers evicted for a full buffer
    pub evicted: usize,
    /// Subscribers whose receiving side was already gone
    pub stale: usize,
}

struct Subscriber {
    id: u64,
    tx: mpsc::Sender<Arc<str>>,
    eviction: Arc<OnceLock<Eviction>>,
}

struct Inner {
    documents: Mutex<HashMap<Uuid, Vec<Subscriber>>>,
    next_id: AtomicU64,
    buffer: usize,
    observer: Option<Arc<dyn InterestObserver>>,
}

/// Shared handle to the registry
#[derive(Clone)]
pub struct SubscriptionRegistry {
    inner: Arc<Inner>,
}

impl SubscriptionRegistry {
    pub fn new(buffer: usize) -> Self {
        Self::build(buffer, None)
    }

    pub fn with_observer(buffer: usize, observer: Arc<dyn InterestObserver>) -> Self {
        Self::build(buffer, Some(observer))
    }

    fn build(buffer: usize, observer: Option<Arc<dyn InterestObserver>>) -> Self {
        Self {
            inner: Arc::new(Inner {
                documents: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                buffer: buffer.max(1),
                observer,
            }),
        }
    }

    fn documents(&self) -> MutexGuard<'_, HashMap<Uuid, Vec<Subscriber>>> {
        self.inner
            .documents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new subscriber for `document_id`
    pub fn subscribe(&self, document_id: Uuid) -> Subscription {
        let (tx, rx) = mpsc::channel(self.inner.buffer);
        let eviction = Arc::new(OnceLock::new());
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);

        let mut documents = self.documents();
        let subscribers = documents.entry(document_id).or_default();
        subscribers.push(Subscriber {
            id,
            tx,
            eviction: eviction.clone(),
        });
        if subscribers.len() == 1 {
            if let Some(observer) = &self.inner.observer {
                observer.interest_gained(document_id);
            }
        }
        drop(documents);

        tracing::debug!("[Realtime] Subscriber {} joined {}", id, document_id);

        Subscription {
            id,
            document_id,
            rx,
            eviction,
            registry: self.clone(),
            closed: false,
        }
    }

    /// Push a serialized frame to every subscriber of `document_id`
    pub fn deliver(&self, document_id: Uuid, frame: Arc<str>) -> Delivery {
        let mut report = Delivery::default();
        let mut documents = self.documents();
        let Some(subscribers) = documents.get_mut(&document_id) else {
            return report;
        };

        subscribers.retain(|subscriber| match subscriber.tx.try_send(frame.clone()) {
            Ok(()) => {
                report.delivered += 1;
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                let _ = subscriber.eviction.set(Eviction::SlowConsumer);
                report.evicted += 1;
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                report.stale += 1;
                false
            }
        });

        if subscribers.is_empty() {
            documents.remove(&document_id);
            self.notify_lost(document_id);
        }
        report
    }

    /// End every subscription to `document_id`; returns how many were closed
    pub fn close_document(&self, document_id: Uuid, reason: Eviction) -> usize {
        let mut documents = self.documents();
        let Some(subscribers) = documents.remove(&document_id) else {
            return 0;
        };
        for subscriber in &subscribers {
            let _ = subscriber.eviction.set(reason);
        }
        self.notify_lost(document_id);
        subscribers.len()
    }

    /// End every subscription in the process
    pub fn close_all(&self, reason: Eviction) -> usize {
        let mut documents = self.documents();
        let mut closed = 0;
        for (document_id, subscribers) in documents.drain() {
            for subscriber in &subscribers {
                let _ = subscriber.eviction.set(reason);
            }
            closed += subscribers.len();
            self.notify_lost(document_id);
        }
        closed
    }

    pub fn subscriber_count(&self, document_id: Uuid) -> usize {
        self.documents().get(&document_id).map_or(0, Vec::len)
    }

    pub fn document_count(&self) -> usize {
        self.documents().len()
    }

    pub fn total_subscribers(&self) -> usize {
        self.documents().values().map(Vec::len).sum()
    }

    fn remove(&self, document_id: Uuid, subscriber_id: u64) {
        let mut documents = self.documents();
        let Some(subscribers) = documents.get_mut(&document_id) else {
            return;
        };
        let before = subscribers.len();
        subscribers.retain(|s| s.id != subscriber_id);
        if subscribers.len() == before {
            return;
        }
        if subscribers.is_empty() {
            documents.remove(&document_id);
            self.notify_lost(document_id);
        }
    }

    fn notify_lost(&self, document_id: Uuid) {
        if let Some(observer) = &self.inner.observer {
            observer.interest_lost(document_id);
        }
    }
}

/// One live subscription
///
/// Dropping the handle detaches it from the registry. `close` is idempotent.
pub struct Subscription {
    id: u64,
    document_id: Uuid,
    rx: mpsc::Receiver<Arc<str>>,
    eviction: Arc<OnceLock<Eviction>>,
    registry: SubscriptionRegistry,
    closed: bool,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("document_id", &self.document_id)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn document_id(&self) -> Uuid {
        self.document_id
    }

    /// Next serialized frame
    ///
    /// Returns `None` once the registry has dropped this subscriber and the
    /// buffer is drained; `eviction()` then says why.
    pub async fn recv(&mut self) -> Option<Arc<str>> {
        self.rx.recv().await
    }

    /// Frame already buffered, if any
    pub fn try_recv(&mut self) -> Option<Arc<str>> {
        self.rx.try_recv().ok()
    }

    pub fn eviction(&self) -> Option<Eviction> {
        self.eviction.get().copied()
    }

    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.rx.close();
        self.registry.remove(self.document_id, self.id);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.close();
    }
}
