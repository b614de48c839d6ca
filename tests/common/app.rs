//! Application instances for integration tests
//!
//! Every instance runs on the in-memory store. A cluster shares one store
//! and one `LocalBusHub`, which is how several server processes look when
//! they share a database and the Postgres bus.

use axum::Router;
use axum_test::TestServer;
use diagramsync::backend::realtime::{LocalBusHub, MessageBus};
use diagramsync::backend::routes::create_router;
use diagramsync::backend::server::{build_state, AppState};
use diagramsync::backend::store::{DiagramStore, MemoryStore};
use diagramsync::shared::{AppConfig, HistoryRetention};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

pub const TEST_SECRET: &str = "diagramsync-test-secret";

pub fn test_config(instance_id: &str) -> AppConfig {
    AppConfig::builder()
        .jwt_secret(TEST_SECRET)
        .instance_id(instance_id)
        .subscriber_buffer(16)
        .build()
        .expect("valid test config")
}

pub fn memory_store(tables: &MemoryStore) -> DiagramStore {
    DiagramStore::with_memory(tables.clone(), Duration::from_secs(5), HistoryRetention::Retain)
}

/// One application instance with its state
pub struct TestInstance {
    pub state: AppState,
}

impl TestInstance {
    pub fn router(&self) -> Router {
        create_router(self.state.clone())
    }

    /// In-process HTTP client for this instance
    pub fn server(&self) -> TestServer {
        TestServer::new(self.router()).expect("test server")
    }

    /// Serve over a real socket, for WebSocket clients
    pub async fn serve(&self) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("local addr");
        let router = self.router();
        tokio::spawn(async move {
            axum::serve(listener, router).await.expect("serve");
        });
        addr
    }
}

/// A single instance without a bus
pub fn single_instance() -> TestInstance {
    let tables = MemoryStore::default();
    TestInstance {
        state: build_state(test_config("solo"), memory_store(&tables), None),
    }
}

/// `count` instances sharing one store and one local bus
pub fn cluster(count: usize) -> (Vec<TestInstance>, MemoryStore) {
    let tables = MemoryStore::default();
    let hub = LocalBusHub::new();
    let instances = (0..count)
        .map(|n| {
            let bus = hub.connect() as Arc<dyn MessageBus>;
            TestInstance {
                state: build_state(
                    test_config(&format!("node-{n}")),
                    memory_store(&tables),
                    Some(bus),
                ),
            }
        })
        .collect();
    (instances, tables)
}
