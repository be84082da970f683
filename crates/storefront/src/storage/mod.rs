//! Namespaced key-value persistence for cart and favorites.
//!
//! # Architecture
//!
//! - [`StorageBackend`] is the raw key-value store plus a change feed. Two
//!   backends exist: [`MemoryBackend`] (process-local, the default) and
//!   [`PgBackend`] (`PostgreSQL` table with `LISTEN/NOTIFY` fan-out).
//! - [`NamespacedStorage`] is the per-context adapter the cart container
//!   talks to. It scopes keys by the signed-in user (or the guest
//!   namespace), decodes values tolerantly, and filters change
//!   notifications so a context never hears about its own writes.
//!
//! # Key layout
//!
//! ```text
//! vitrine_guest_cart
//! vitrine_guest_favorites
//! vitrine_user_<id>_cart
//! vitrine_user_<id>_favorites
//! ```
//!
//! When a device scope is set (one scope per browser-equivalent), physical
//! keys are prefixed with `<scope>/`.

mod memory;
mod postgres;

pub use memory::MemoryBackend;
pub use postgres::{NOTIFY_CHANNEL, PgBackend};

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};
use uuid::Uuid;
use vitrine_core::{CartItem, ProductId, UserId};

/// Prefix shared by every storage key.
pub const KEY_PREFIX: &str = "vitrine";
/// Logical name of the cart key.
pub const CART_KEY: &str = "cart";
/// Logical name of the favorites key.
pub const FAVORITES_KEY: &str = "favorites";

/// Errors raised by storage backends.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Value could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Backend refused the operation.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Identifies the execution context that performed a write.
///
/// Change notifications carry the writer's origin so subscribers can skip
/// their own writes, the way browser storage events only reach other tabs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OriginId(Uuid);

impl OriginId {
    /// Create a fresh origin.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for OriginId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OriginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A value changed in the backend.
#[derive(Debug, Clone)]
pub struct StorageChange {
    /// Physical key that changed.
    pub key: String,
    /// New value, or `None` if the key was removed.
    pub value: Option<serde_json::Value>,
    /// Context that wrote it.
    pub origin: OriginId,
}

/// Raw key-value store with change notifications.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Read the value stored under `key`.
    async fn read(&self, key: &str) -> Result<Option<serde_json::Value>, StorageError>;

    /// Store `value` under `key` on behalf of `origin`.
    ///
    /// Implementations must not emit a change notification when the stored
    /// value is unchanged.
    async fn write(
        &self,
        key: &str,
        value: serde_json::Value,
        origin: OriginId,
    ) -> Result<(), StorageError>;

    /// Subscribe to every change written to this backend.
    fn changes(&self) -> broadcast::Receiver<StorageChange>;
}

/// Whose cart and favorites are in play.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "user_id", rename_all = "snake_case")]
pub enum Namespace {
    /// Nobody is signed in.
    #[default]
    Guest,
    /// A signed-in user.
    User(UserId),
}

impl Namespace {
    /// Namespace for an optional signed-in user.
    #[must_use]
    pub fn from_user(user: Option<UserId>) -> Self {
        user.map_or(Self::Guest, Self::User)
    }

    /// Key segment for this namespace.
    #[must_use]
    pub fn segment(&self) -> String {
        match self {
            Self::Guest => "guest".to_string(),
            Self::User(id) => format!("user_{id}"),
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segment())
    }
}

/// Teardown handle for [`NamespacedStorage::on_storage_change`].
///
/// Dropping the handle unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    key: String,
    task: JoinHandle<()>,
}

impl Subscription {
    /// Physical key this subscription listens to.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Stop listening.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Storage adapter for one cart/favorites context.
pub struct NamespacedStorage {
    backend: Arc<dyn StorageBackend>,
    scope: Option<String>,
    namespace: RwLock<Namespace>,
    origin: OriginId,
}

impl NamespacedStorage {
    /// Create an adapter over `backend`, starting in the guest namespace.
    ///
    /// `scope` partitions the backend between devices; pass `None` when the
    /// backend already belongs to a single device.
    #[must_use]
    pub fn new(backend: Arc<dyn StorageBackend>, scope: Option<String>) -> Self {
        Self {
            backend,
            scope,
            namespace: RwLock::new(Namespace::Guest),
            origin: OriginId::new(),
        }
    }

    /// Origin stamped on this adapter's writes.
    #[must_use]
    pub const fn origin(&self) -> OriginId {
        self.origin
    }

    /// Scope subsequent key lookups to `user` (or the guest namespace).
    pub fn set_namespace(&self, user: Option<UserId>) {
        self.set_namespace_to(Namespace::from_user(user));
    }

    pub(crate) fn set_namespace_to(&self, namespace: Namespace) {
        debug!(namespace = %namespace, "Storage namespace set");
        *self
            .namespace
            .write()
            .unwrap_or_else(PoisonError::into_inner) = namespace;
    }

    /// Current namespace.
    #[must_use]
    pub fn namespace(&self) -> Namespace {
        self.namespace
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Deterministic key for `logical_name` in the current namespace.
    #[must_use]
    pub fn get_key(&self, logical_name: &str) -> String {
        key_for(&self.namespace(), logical_name)
    }

    fn physical_key(&self, namespace: &Namespace, logical_name: &str) -> String {
        let key = key_for(namespace, logical_name);
        match &self.scope {
            Some(scope) => format!("{scope}/{key}"),
            None => key,
        }
    }

    /// Persisted cart for the current namespace; empty on any failure.
    pub async fn get_cart(&self) -> Vec<CartItem> {
        self.try_get_cart().await.unwrap_or_else(|e| {
            warn!(error = %e, "Failed to read cart, using empty cart");
            Vec::new()
        })
    }

    /// Persisted favorites for the current namespace; empty on any failure.
    pub async fn get_favorites(&self) -> Vec<ProductId> {
        self.try_get_favorites().await.unwrap_or_else(|e| {
            warn!(error = %e, "Failed to read favorites, using empty list");
            Vec::new()
        })
    }

    /// Persisted cart, distinguishing backend failures from missing data.
    ///
    /// Missing or corrupt values yield an empty cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails.
    pub async fn try_get_cart(&self) -> Result<Vec<CartItem>, StorageError> {
        self.read_list(&self.namespace(), CART_KEY).await
    }

    /// Persisted favorites, distinguishing backend failures from missing data.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails.
    pub async fn try_get_favorites(&self) -> Result<Vec<ProductId>, StorageError> {
        self.read_list(&self.namespace(), FAVORITES_KEY).await
    }

    /// Persist the cart for the current namespace.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or the backend write fails.
    pub async fn set_cart(&self, items: &[CartItem]) -> Result<(), StorageError> {
        self.set_cart_in(&self.namespace(), items).await
    }

    /// Persist favorites for the current namespace.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or the backend write fails.
    pub async fn set_favorites(&self, ids: &[ProductId]) -> Result<(), StorageError> {
        self.set_favorites_in(&self.namespace(), ids).await
    }

    /// Persist the cart for an explicit namespace.
    ///
    /// The debounced writer uses this so a write scheduled before a
    /// namespace switch lands in the namespace it was computed for.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or the backend write fails.
    pub async fn set_cart_in(
        &self,
        namespace: &Namespace,
        items: &[CartItem],
    ) -> Result<(), StorageError> {
        self.write_list(namespace, CART_KEY, items).await
    }

    /// Persist favorites for an explicit namespace.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or the backend write fails.
    pub async fn set_favorites_in(
        &self,
        namespace: &Namespace,
        ids: &[ProductId],
    ) -> Result<(), StorageError> {
        self.write_list(namespace, FAVORITES_KEY, ids).await
    }

    #[instrument(skip(self, namespace), fields(namespace = %namespace))]
    async fn read_list<T: DeserializeOwned>(
        &self,
        namespace: &Namespace,
        logical_name: &str,
    ) -> Result<Vec<T>, StorageError> {
        let key = self.physical_key(namespace, logical_name);
        let Some(value) = self.backend.read(&key).await? else {
            return Ok(Vec::new());
        };
        Ok(decode_list(&key, value))
    }

    #[instrument(skip(self, namespace, values), fields(namespace = %namespace, len = values.len()))]
    async fn write_list<T: Serialize + Sync>(
        &self,
        namespace: &Namespace,
        logical_name: &str,
        values: &[T],
    ) -> Result<(), StorageError> {
        let key = self.physical_key(namespace, logical_name);
        let value = serde_json::to_value(values)?;
        self.backend.write(&key, value, self.origin).await
    }

    /// Invoke `callback` whenever another context changes `logical_name` in
    /// the current namespace.
    ///
    /// The callback receives the new raw value. The subscription is bound to
    /// the namespace at call time; subscribe again after switching.
    pub fn on_storage_change<F>(&self, logical_name: &str, callback: F) -> Subscription
    where
        F: Fn(Option<serde_json::Value>) + Send + Sync + 'static,
    {
        let key = self.physical_key(&self.namespace(), logical_name);
        let mut changes = self.backend.changes();
        let origin = self.origin;
        let watched = key.clone();

        let task = tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(change) => {
                        if change.key == watched && change.origin != origin {
                            debug!(key = %watched, from = %change.origin, "External storage change");
                            callback(change.value);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(key = %watched, skipped, "Storage change feed lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Subscription { key, task }
    }
}

/// Key for `logical_name` in `namespace`, without any device scope.
#[must_use]
pub fn key_for(namespace: &Namespace, logical_name: &str) -> String {
    format!("{KEY_PREFIX}_{}_{logical_name}", namespace.segment())
}

/// Decode a JSON array, skipping elements that do not fit `T`.
///
/// A value that is not an array at all decodes as empty.
pub fn decode_list<T: DeserializeOwned>(key: &str, value: serde_json::Value) -> Vec<T> {
    let serde_json::Value::Array(elements) = value else {
        warn!(key, "Stored value is not a list, ignoring it");
        return Vec::new();
    };

    let total = elements.len();
    let decoded: Vec<T> = elements
        .into_iter()
        .filter_map(|element| serde_json::from_value(element).ok())
        .collect();

    if decoded.len() < total {
        warn!(key, skipped = total - decoded.len(), "Skipped corrupt stored entries");
    }
    decoded
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn item(id: &str, quantity: u32) -> CartItem {
        CartItem {
            id: ProductId::new(id),
            name: "Speed".to_string(),
            price: "R$ 100,00".to_string(),
            image: "x".to_string(),
            brand: "Omega".to_string(),
            quantity,
        }
    }

    struct BrokenBackend {
        changes: broadcast::Sender<StorageChange>,
    }

    #[async_trait]
    impl StorageBackend for BrokenBackend {
        async fn read(&self, _key: &str) -> Result<Option<serde_json::Value>, StorageError> {
            Err(StorageError::Unavailable("disk on fire".to_string()))
        }

        async fn write(
            &self,
            _key: &str,
            _value: serde_json::Value,
            _origin: OriginId,
        ) -> Result<(), StorageError> {
            Err(StorageError::Unavailable("disk on fire".to_string()))
        }

        fn changes(&self) -> broadcast::Receiver<StorageChange> {
            self.changes.subscribe()
        }
    }

    #[test]
    fn test_key_layout() {
        let storage = NamespacedStorage::new(Arc::new(MemoryBackend::new()), None);
        assert_eq!(storage.get_key(CART_KEY), "vitrine_guest_cart");

        storage.set_namespace(Some(UserId::new("42")));
        assert_eq!(storage.get_key(FAVORITES_KEY), "vitrine_user_42_favorites");

        storage.set_namespace(None);
        assert_eq!(storage.namespace(), Namespace::Guest);
    }

    #[tokio::test]
    async fn test_round_trip_is_namespaced() {
        let storage = NamespacedStorage::new(Arc::new(MemoryBackend::new()), None);
        storage.set_cart(&[item("w1", 2)]).await.unwrap();

        storage.set_namespace(Some(UserId::new("42")));
        assert!(storage.get_cart().await.is_empty());

        storage.set_namespace(None);
        assert_eq!(storage.get_cart().await, vec![item("w1", 2)]);
    }

    #[tokio::test]
    async fn test_device_scopes_are_isolated() {
        let backend: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
        let phone = NamespacedStorage::new(Arc::clone(&backend), Some("phone".to_string()));
        let laptop = NamespacedStorage::new(backend, Some("laptop".to_string()));

        phone.set_favorites(&[ProductId::new("p1")]).await.unwrap();
        assert!(laptop.get_favorites().await.is_empty());
        assert_eq!(phone.get_favorites().await, vec![ProductId::new("p1")]);
    }

    #[tokio::test]
    async fn test_corrupt_values_decode_as_empty() {
        let backend = Arc::new(MemoryBackend::new());
        backend
            .write("vitrine_guest_cart", serde_json::json!({"not": "a list"}), OriginId::new())
            .await
            .unwrap();
        backend
            .write(
                "vitrine_guest_favorites",
                serde_json::json!(["p1", 7, "p2"]),
                OriginId::new(),
            )
            .await
            .unwrap();

        let storage = NamespacedStorage::new(backend, None);
        assert!(storage.try_get_cart().await.unwrap().is_empty());
        assert_eq!(
            storage.try_get_favorites().await.unwrap(),
            vec![ProductId::new("p1"), ProductId::new("p2")]
        );
    }

    #[tokio::test]
    async fn test_read_failures_are_swallowed_by_plain_getters() {
        let (changes, _) = broadcast::channel(4);
        let storage = NamespacedStorage::new(Arc::new(BrokenBackend { changes }), None);

        assert!(storage.try_get_cart().await.is_err());
        assert!(storage.get_cart().await.is_empty());
        assert!(storage.get_favorites().await.is_empty());
    }

    #[tokio::test]
    async fn test_change_callbacks_skip_own_writes() {
        let backend: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
        let tab_a = NamespacedStorage::new(Arc::clone(&backend), None);
        let tab_b = NamespacedStorage::new(backend, None);

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let _subscription = tab_a.on_storage_change(CART_KEY, move |value| {
            let _ = tx.send(value);
        });
        tokio::task::yield_now().await;

        tab_a.set_cart(&[item("own", 1)]).await.unwrap();
        tab_b.set_cart(&[item("w1", 1)]).await.unwrap();

        let received = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let items: Vec<CartItem> = decode_list("test", received);
        assert_eq!(items, vec![item("w1", 1)]);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_dropping_subscription_stops_callbacks() {
        let backend: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
        let tab_a = NamespacedStorage::new(Arc::clone(&backend), None);
        let tab_b = NamespacedStorage::new(backend, None);

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let subscription = tab_a.on_storage_change(FAVORITES_KEY, move |value| {
            let _ = tx.send(value);
        });
        subscription.unsubscribe();
        tokio::task::yield_now().await;

        tab_b.set_favorites(&[ProductId::new("p1")]).await.unwrap();
        tokio::task::yield_now().await;

        assert!(rx.try_recv().is_err());
    }
}
