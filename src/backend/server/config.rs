/**
 * Server Configuration
 *
 * Turns an [`AppConfig`] into live services: the optional PostgreSQL pool
 * and the optional cross-instance bus.
 *
 * # Error Handling
 *
 * Failures are logged but never prevent startup. Without a database the
 * server runs on the in-memory store; without a bus it serves only its own
 * subscribers.
 */

use crate::backend::realtime::{MessageBus, PgBus};
use crate::shared::{AppConfig, BusKind};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

/// Database configuration result
///
/// `None` when `DATABASE_URL` is unset or the connection failed.
pub type DatabaseConfig = Option<PgPool>;

/// Connect to PostgreSQL and run migrations
///
/// # Returns
///
/// - `Some(PgPool)` if the database is reachable
/// - `None` if `DATABASE_URL` is not set or the connection fails
pub async fn load_database(config: &AppConfig) -> DatabaseConfig {
    let Some(database_url) = config.database_url.as_deref() else {
        tracing::warn!("[Store] DATABASE_URL not set. Using the in-memory store.");
        return None;
    };

    tracing::info!("[Store] Connecting to database...");

    let pool = match PgPool::connect(database_url).await {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!("[Store] Failed to create database connection pool: {:?}", e);
            tracing::warn!("[Store] Falling back to the in-memory store.");
            return None;
        }
    };

    tracing::info!("[Store] Running database migrations...");
    match sqlx::migrate!().run(&pool).await {
        Ok(()) => tracing::info!("[Store] Database migrations completed"),
        Err(e) => {
            tracing::error!("[Store] Failed to run database migrations: {}", e);
            tracing::warn!("[Store] Continuing; the schema might not be up to date");
        }
    }

    Some(pool)
}

/// Start the configured message bus
///
/// The Postgres bus needs a pool; asking for it without a database logs a
/// warning and runs without a bus.
pub async fn load_bus(config: &AppConfig, pool: Option<&PgPool>) -> Option<Arc<dyn MessageBus>> {
    match (config.effective_bus(), pool) {
        (BusKind::None, _) => {
            tracing::info!("[Bus] No message bus configured; fanout is local only");
            None
        }
        (BusKind::Postgres, None) => {
            tracing::warn!("[Bus] Postgres bus requested without a database; fanout is local only");
            None
        }
        (BusKind::Postgres, Some(pool)) => match PgBus::connect(pool.clone()).await {
            Ok(bus) => Some(Arc::new(bus)),
            Err(e) => {
                tracing::error!("[Bus] Failed to start LISTEN/NOTIFY bus: {}", e);
                tracing::warn!("[Bus] Fanout is local only");
                None
            }
        },
    }
}

/// Configured instance id, or a random one for this process
pub fn instance_id(config: &AppConfig) -> String {
    config
        .instance_id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}
