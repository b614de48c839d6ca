//! Real-time Update Module
//!
//! Pushes every committed diagram change to the WebSocket subscribers of
//! that diagram, on this instance and on every other instance sharing the
//! message bus.
//!
//! # Module Structure
//!
//! ```text
//! realtime/
//! ├── mod.rs       - Module exports and documentation
//! ├── registry.rs  - Per-document subscriber sets with bounded queues
//! ├── bus.rs       - Cross-instance bus trait and the in-process hub
//! ├── pg_bus.rs    - Postgres LISTEN/NOTIFY bus
//! ├── fanout.rs    - Local delivery plus bus relay
//! └── socket.rs    - `GET /ws` handler
//! ```
//!
//! # Delivery Guarantees
//!
//! Delivery is at-most-once. A subscriber whose queue is full is closed
//! (4408) instead of slowing down the writer; clients re-fetch the document
//! after reconnecting. A failing bus never fails the write that triggered
//! the publish, it is only logged and counted.

/// Per-document subscriber registry
pub mod registry;

/// Message bus abstraction
pub mod bus;

/// Postgres-backed message bus
pub mod pg_bus;

/// Local fanout and bus relay
pub mod fanout;

/// WebSocket subscription handler
pub mod socket;

pub use bus::{BusEnvelope, BusError, LocalBus, LocalBusHub, MessageBus};
pub use fanout::{Fanout, FanoutSnapshot};
pub use pg_bus::PgBus;
pub use registry::{Eviction, Subscription, SubscriptionRegistry};
pub use socket::handle_socket_upgrade;
