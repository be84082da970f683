//! `PostgreSQL` storage backend.
//!
//! Values live in `storage_entries` (see `crates/storefront/migrations/`).
//! Every effective write issues `pg_notify` on [`NOTIFY_CHANNEL`] with the
//! key and writer origin; a listener task re-reads the value and fans it out
//! to local subscribers, so storefront instances sharing a database see each
//! other's writes.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use sqlx::postgres::PgListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use super::{OriginId, StorageBackend, StorageChange, StorageError};

/// Notification channel used for storage changes.
pub const NOTIFY_CHANNEL: &str = "vitrine_storage";

const CHANGE_CHANNEL_CAPACITY: usize = 1024;
const LISTENER_RETRY_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Serialize, Deserialize)]
struct ChangePayload {
    key: String,
    origin: OriginId,
}

/// Storage backend over a `PostgreSQL` table.
pub struct PgBackend {
    pool: PgPool,
    changes: broadcast::Sender<StorageChange>,
    listener: JoinHandle<()>,
}

impl PgBackend {
    /// Start listening for changes and return the backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the notification listener cannot connect.
    pub async fn connect(pool: PgPool) -> Result<Self, StorageError> {
        let mut listener = PgListener::connect_with(&pool).await?;
        listener.listen(NOTIFY_CHANNEL).await?;
        info!(channel = NOTIFY_CHANNEL, "Listening for storage changes");

        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        let task = tokio::spawn(fan_out(listener, pool.clone(), changes.clone()));

        Ok(Self {
            pool,
            changes,
            listener: task,
        })
    }
}

impl Drop for PgBackend {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

async fn fan_out(
    mut listener: PgListener,
    pool: PgPool,
    changes: broadcast::Sender<StorageChange>,
) {
    loop {
        let notification = match listener.recv().await {
            Ok(notification) => notification,
            Err(e) => {
                // PgListener reconnects on the next recv; back off briefly.
                error!(error = %e, "Storage listener error");
                tokio::time::sleep(LISTENER_RETRY_DELAY).await;
                continue;
            }
        };

        let payload: ChangePayload = match serde_json::from_str(notification.payload()) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Ignoring malformed storage notification");
                continue;
            }
        };

        match read_value(&pool, &payload.key).await {
            Ok(value) => {
                debug!(key = %payload.key, "Fanning out storage change");
                let _ = changes.send(StorageChange {
                    key: payload.key,
                    value,
                    origin: payload.origin,
                });
            }
            Err(e) => warn!(error = %e, key = %payload.key, "Failed to re-read changed key"),
        }
    }
}

async fn read_value(pool: &PgPool, key: &str) -> Result<Option<serde_json::Value>, StorageError> {
    let value = sqlx::query_scalar::<_, serde_json::Value>(
        "SELECT value FROM storage_entries WHERE key = $1",
    )
    .bind(key)
    .fetch_optional(pool)
    .await?;
    Ok(value)
}

#[async_trait]
impl StorageBackend for PgBackend {
    #[instrument(skip(self))]
    async fn read(&self, key: &str) -> Result<Option<serde_json::Value>, StorageError> {
        read_value(&self.pool, key).await
    }

    #[instrument(skip(self, value))]
    async fn write(
        &self,
        key: &str,
        value: serde_json::Value,
        origin: OriginId,
    ) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;

        // The WHERE clause on the update leaves unchanged rows alone, so
        // RETURNING yields nothing and no notification goes out.
        let changed: Option<String> = sqlx::query_scalar(
            r"
            INSERT INTO storage_entries (key, value, updated_at)
            VALUES ($1, $2, now())
            ON CONFLICT (key) DO UPDATE
                SET value = EXCLUDED.value, updated_at = now()
                WHERE storage_entries.value IS DISTINCT FROM EXCLUDED.value
            RETURNING key
            ",
        )
        .bind(key)
        .bind(&value)
        .fetch_optional(&mut *tx)
        .await?;

        if changed.is_some() {
            let payload = serde_json::to_string(&ChangePayload {
                key: key.to_string(),
                origin,
            })?;
            sqlx::query("SELECT pg_notify($1, $2)")
                .bind(NOTIFY_CHANNEL)
                .bind(payload)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    fn changes(&self) -> broadcast::Receiver<StorageChange> {
        self.changes.subscribe()
    }
}
