/**
 * Server Initialization
 *
 * Builds the Axum application from an [`AppConfig`].
 *
 * # Initialization Process
 *
 * 1. Load the optional database (falls back to the in-memory store)
 * 2. Start the optional message bus
 * 3. Create the fanout and start its bus pump
 * 4. Create the diagram service and the router
 * 5. Start the overflow pruning task when the Postgres bus is running
 *
 * [`build_state`] takes an already built store and bus, which is how
 * tests run several instances against one in-memory store and one
 * `LocalBusHub`.
 */

use crate::backend::auth::SessionKeys;
use crate::backend::diagrams::DiagramService;
use crate::backend::realtime::pg_bus::{prune_overflow, OVERFLOW_MAX_AGE};
use crate::backend::realtime::{Fanout, MessageBus};
use crate::backend::routes::router::create_router;
use crate::backend::server::config::{instance_id, load_bus, load_database};
use crate::backend::server::state::AppState;
use crate::backend::store::DiagramStore;
use crate::shared::AppConfig;
use axum::Router;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

const OVERFLOW_PRUNE_INTERVAL: Duration = Duration::from_secs(60);

/// Create the application from configuration
///
/// Returns the router and the fanout, so the caller can close every
/// subscription on shutdown.
pub async fn create_app(config: AppConfig) -> (Router<()>, Fanout) {
    tracing::info!("Initializing diagramsync backend server");

    let db_pool = load_database(&config).await;

    let store = match &db_pool {
        Some(pool) => DiagramStore::postgres(pool.clone(), config.store_timeout(), config.history_on_delete),
        None => DiagramStore::memory(config.store_timeout(), config.history_on_delete),
    };
    tracing::info!("[Store] Using the {} backend", store.backend_name());

    let bus = load_bus(&config, db_pool.as_ref()).await;

    if let (Some(pool), Some(_)) = (&db_pool, &bus) {
        spawn_overflow_pruning(pool.clone());
    }

    let state = build_state(config, store, bus);
    let fanout = state.fanout().clone();
    (create_router(state), fanout)
}

/// Wire the service, fanout and keys; starts the fanout bus pump
pub fn build_state(config: AppConfig, store: DiagramStore, bus: Option<Arc<dyn MessageBus>>) -> AppState {
    let fanout = Fanout::new(instance_id(&config), config.subscriber_buffer, bus);
    if fanout.start().is_some() {
        tracing::info!("[Fanout] Instance {} relaying through the bus", fanout.instance_id());
    }

    let service = DiagramService::new(store, fanout, config.store_retries);
    let keys = SessionKeys::new(&config.jwt_secret);
    AppState::new(service, keys, config)
}

fn spawn_overflow_pruning(pool: PgPool) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(OVERFLOW_PRUNE_INTERVAL);
        loop {
            interval.tick().await;
            match prune_overflow(&pool, OVERFLOW_MAX_AGE).await {
                Ok(0) => {}
                Ok(removed) => tracing::debug!("[Bus] Pruned {} overflow envelopes", removed),
                Err(e) => tracing::warn!("[Bus] Failed to prune overflow envelopes: {}", e),
            }
        }
    });
}
