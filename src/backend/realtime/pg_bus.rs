/**
 * PostgreSQL Message Bus
 *
 * `LISTEN/NOTIFY` transport with two background tasks:
 *
 * - the publisher runs `pg_notify(channel, payload)` on the pool, in
 *   publish order
 * - the listener owns a `PgListener`, applies `Listen` / `Unlisten`
 *   commands and forwards incoming notifications to the fanout pump
 *
 * A stalled NOTIFY never delays incoming notifications.
 *
 * # Payload Limit
 *
 * NOTIFY payloads are limited to just under 8000 bytes. Larger envelopes
 * are written to `bus_overflow` and announced as `@overflow:<uuid>`; the
 * receiver loads the envelope by id. [`prune_overflow`] removes rows that
 * every listener has had time to read.
 */

use crate::backend::realtime::bus::{BusError, BusMessage, MessageBus};
use sqlx::postgres::{PgListener, PgNotification};
use sqlx::PgPool;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Largest payload sent inline
pub const NOTIFY_PAYLOAD_LIMIT: usize = 7900;

/// Marker of an envelope stored in `bus_overflow`
pub const OVERFLOW_PREFIX: &str = "@overflow:";

/// Overflow rows older than this are pruned
pub const OVERFLOW_MAX_AGE: Duration = Duration::from_secs(5 * 60);

enum Command {
    Listen(String),
    Unlisten(String),
}

struct Outgoing {
    channel: String,
    payload: String,
}

pub struct PgBus {
    commands: mpsc::UnboundedSender<Command>,
    outgoing: mpsc::UnboundedSender<Outgoing>,
    incoming: Mutex<Option<mpsc::UnboundedReceiver<BusMessage>>>,
}

impl PgBus {
    /// Open the listener connection and start the bus task
    pub async fn connect(pool: PgPool) -> Result<Self, sqlx::Error> {
        let listener = PgListener::connect_with(&pool).await?;
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();

        tokio::spawn(publish_loop(pool.clone(), outgoing_rx));
        tokio::spawn(listen_loop(pool, listener, command_rx, incoming_tx));
        tracing::info!("[Bus] PostgreSQL LISTEN/NOTIFY bus started");

        Ok(Self {
            commands,
            outgoing,
            incoming: Mutex::new(Some(incoming_rx)),
        })
    }

    fn send(&self, command: Command) -> Result<(), BusError> {
        self.commands.send(command).map_err(|_| BusError::Closed)
    }
}

impl MessageBus for PgBus {
    fn publish(&self, channel: &str, payload: String) -> Result<(), BusError> {
        self.outgoing
            .send(Outgoing {
                channel: channel.to_string(),
                payload,
            })
            .map_err(|_| BusError::Closed)
    }

    fn subscribe(&self, channel: &str) {
        if self.send(Command::Listen(channel.to_string())).is_err() {
            tracing::warn!("[Bus] Cannot listen on {}: bus task stopped", channel);
        }
    }

    fn unsubscribe(&self, channel: &str) {
        if self.send(Command::Unlisten(channel.to_string())).is_err() {
            tracing::warn!("[Bus] Cannot unlisten {}: bus task stopped", channel);
        }
    }

    fn take_incoming(&self) -> Option<mpsc::UnboundedReceiver<BusMessage>> {
        self.incoming
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take()
    }

    fn name(&self) -> &'static str {
        "postgres"
    }
}

async fn publish_loop(pool: PgPool, mut outgoing: mpsc::UnboundedReceiver<Outgoing>) {
    while let Some(Outgoing { channel, payload }) = outgoing.recv().await {
        if let Err(e) = notify(&pool, &channel, &payload).await {
            tracing::warn!("[Bus] Publish on {} failed: {}", channel, e);
        }
    }
    tracing::info!("[Bus] Publisher stopped");
}

async fn listen_loop(
    pool: PgPool,
    mut listener: PgListener,
    mut commands: mpsc::UnboundedReceiver<Command>,
    incoming: mpsc::UnboundedSender<BusMessage>,
) {
    loop {
        tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else {
                    break;
                };
                match command {
                    Command::Listen(channel) => {
                        if let Err(e) = listener.listen(&channel).await {
                            tracing::warn!("[Bus] LISTEN {} failed: {}", channel, e);
                        }
                    }
                    Command::Unlisten(channel) => {
                        if let Err(e) = listener.unlisten(&channel).await {
                            tracing::warn!("[Bus] UNLISTEN {} failed: {}", channel, e);
                        }
                    }
                }
            }
            notification = listener.recv() => {
                match notification {
                    Ok(notification) => {
                        let Some(message) = resolve(&pool, notification).await else {
                            continue;
                        };
                        if incoming.send(message).is_err() {
                            tracing::debug!("[Bus] Incoming pump gone; stopping listener");
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!("[Bus] Listener error: {}", e);
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        }
    }
    tracing::info!("[Bus] Listener stopped");
}

async fn notify(pool: &PgPool, channel: &str, payload: &str) -> Result<(), sqlx::Error> {
    let inline = if payload.len() > NOTIFY_PAYLOAD_LIMIT {
        let id = Uuid::new_v4();
        sqlx::query("INSERT INTO bus_overflow (id, channel, envelope) VALUES ($1, $2, $3)")
            .bind(id)
            .bind(channel)
            .bind(payload)
            .execute(pool)
            .await?;
        tracing::debug!("[Bus] Envelope of {} bytes stored as overflow {}", payload.len(), id);
        format!("{OVERFLOW_PREFIX}{id}")
    } else {
        payload.to_string()
    };

    sqlx::query("SELECT pg_notify($1, $2)")
        .bind(channel)
        .bind(inline)
        .execute(pool)
        .await?;
    Ok(())
}

async fn resolve(pool: &PgPool, notification: PgNotification) -> Option<BusMessage> {
    let channel = notification.channel().to_string();
    let payload = notification.payload();

    let Some(reference) = payload.strip_prefix(OVERFLOW_PREFIX) else {
        return Some(BusMessage {
            channel,
            payload: payload.to_string(),
        });
    };

    let id = match Uuid::parse_str(reference) {
        Ok(id) => id,
        Err(e) => {
            tracing::warn!("[Bus] Bad overflow reference on {}: {}", channel, e);
            return None;
        }
    };

    let envelope: Result<Option<String>, sqlx::Error> =
        sqlx::query_scalar("SELECT envelope FROM bus_overflow WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await;

    match envelope {
        Ok(Some(payload)) => Some(BusMessage { channel, payload }),
        Ok(None) => {
            tracing::warn!("[Bus] Overflow envelope {} already pruned", id);
            None
        }
        Err(e) => {
            tracing::warn!("[Bus] Failed to load overflow envelope {}: {}", id, e);
            None
        }
    }
}

/// Delete overflow rows older than `max_age`; returns the number removed
pub async fn prune_overflow(pool: &PgPool, max_age: Duration) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "DELETE FROM bus_overflow WHERE created_at < NOW() - ($1::bigint * INTERVAL '1 second')",
    )
    .bind(max_age.as_secs() as i64)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}
