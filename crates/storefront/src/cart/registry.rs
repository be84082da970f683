//! Server-hosted cart containers, one per browser tab.
//!
//! A device id plays the role of one browser's local storage: every tab of a
//! device shares a storage scope, so tabs of the same device see each
//! other's changes. Each tab gets its own container and origin.

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use moka::future::Cache;
use tokio::sync::broadcast;
use tracing::{debug, info, instrument};
use vitrine_core::UserId;

use super::checkout::WhatsAppCheckout;
use super::container::{CartContainer, CartOptions};
use crate::notify::{self, Notification, Notifier};
use crate::storage::{NamespacedStorage, StorageBackend};

/// Idle time after which a tab's container is flushed and dropped.
const TAB_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);
const MAX_TABS: u64 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct TabKey {
    device: String,
    tab: String,
}

/// A container opened for one request, with the notifications it emits.
pub struct TabSession {
    pub container: Arc<CartContainer>,
    notifications: broadcast::Receiver<Notification>,
}

impl TabSession {
    /// Notifications emitted since the session was opened.
    ///
    /// The receiver follows the tab's whole notifier, so sessions open on the
    /// same tab at the same time each see the other's notifications too.
    pub fn drain(&mut self) -> Vec<Notification> {
        notify::drain(&mut self.notifications)
    }
}

/// Registry of live tab containers with idle expiry.
#[derive(Clone)]
pub struct TabRegistry {
    inner: Arc<TabRegistryInner>,
}

struct TabRegistryInner {
    tabs: Cache<TabKey, Arc<CartContainer>>,
    backend: Arc<dyn StorageBackend>,
    checkout: WhatsAppCheckout,
    options: CartOptions,
}

impl TabRegistry {
    #[must_use]
    pub fn new(
        backend: Arc<dyn StorageBackend>,
        checkout: WhatsAppCheckout,
        options: CartOptions,
    ) -> Self {
        let tabs = Cache::builder()
            .max_capacity(MAX_TABS)
            .time_to_idle(TAB_IDLE_TIMEOUT)
            .async_eviction_listener(|key: Arc<TabKey>, container: Arc<CartContainer>, cause| {
                async move {
                    debug!(device = %key.device, tab = %key.tab, ?cause, "Closing tab");
                    container.flush().await;
                }
                .boxed()
            })
            .build();

        Self {
            inner: Arc::new(TabRegistryInner {
                tabs,
                backend,
                checkout,
                options,
            }),
        }
    }

    /// The container for `tab` on `device`, opened (and loaded) on first
    /// use, switched to `user`'s namespace when it differs.
    #[instrument(skip(self, user))]
    pub async fn open(&self, device: &str, tab: &str, user: Option<UserId>) -> TabSession {
        let key = TabKey {
            device: device.to_string(),
            tab: tab.to_string(),
        };

        let notifier = Notifier::new();
        let fresh_notifications = notifier.subscribe();
        let inner = Arc::clone(&self.inner);
        let scope = device.to_string();
        let initial_user = user.clone();

        let entry = self
            .inner
            .tabs
            .entry(key)
            .or_insert_with(async move {
                let storage = Arc::new(NamespacedStorage::new(
                    Arc::clone(&inner.backend),
                    Some(scope),
                ));
                Arc::new(
                    CartContainer::open(
                        storage,
                        inner.checkout.clone(),
                        notifier,
                        inner.options,
                        initial_user,
                    )
                    .await,
                )
            })
            .await;

        if entry.is_fresh() {
            info!("Tab opened");
            return TabSession {
                container: entry.into_value(),
                notifications: fresh_notifications,
            };
        }

        let container = entry.into_value();
        let notifications = container.notifier().subscribe();
        container.switch_namespace(user).await;
        TabSession {
            container,
            notifications,
        }
    }

    /// Close a tab now: its container is flushed and dropped.
    pub async fn close(&self, device: &str, tab: &str) {
        let key = TabKey {
            device: device.to_string(),
            tab: tab.to_string(),
        };
        self.inner.tabs.invalidate(&key).await;
        self.inner.tabs.run_pending_tasks().await;
    }

    /// Flush every open tab (used at shutdown).
    pub async fn flush_all(&self) {
        let open: Vec<Arc<CartContainer>> =
            self.inner.tabs.iter().map(|(_, container)| container).collect();
        for container in &open {
            container.flush().await;
        }
        info!(tabs = open.len(), "Flushed open tabs");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use vitrine_core::{ProductId, ProductInput};

    use super::*;
    use crate::cart::checkout::ReturnLink;
    use crate::storage::MemoryBackend;

    fn registry(backend: &Arc<MemoryBackend>) -> TabRegistry {
        TabRegistry::new(
            Arc::clone(backend) as Arc<dyn StorageBackend>,
            WhatsAppCheckout::new("5511999990000", Arc::new(ReturnLink)),
            CartOptions::default(),
        )
    }

    fn input(id: &str) -> ProductInput {
        ProductInput {
            id: Some(id.to_string()),
            name: Some("Speed".to_string()),
            ..ProductInput::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_tab_reuses_container() {
        let backend = Arc::new(MemoryBackend::new());
        let tabs = registry(&backend);

        let first = tabs.open("d1", "t1", None).await;
        first.container.add_to_cart(input("w1"), 1);

        let second = tabs.open("d1", "t1", None).await;
        assert!(Arc::ptr_eq(&first.container, &second.container));
        assert_eq!(second.container.total_items(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tabs_of_one_device_share_storage() {
        let backend = Arc::new(MemoryBackend::new());
        let tabs = registry(&backend);

        let a = tabs.open("d1", "t1", None).await;
        let b = tabs.open("d1", "t2", None).await;
        let other_device = tabs.open("d2", "t1", None).await;

        a.container.toggle_favorite(&ProductId::new("p1"));
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert!(b.container.is_favorite(&ProductId::new("p1")));
        assert_eq!(other_device.container.favorites_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_collects_its_notifications() {
        let backend = Arc::new(MemoryBackend::new());
        let tabs = registry(&backend);

        let mut session = tabs.open("d1", "t1", None).await;
        session.container.add_to_cart(input("w1"), 1);

        let notes = session.drain();
        assert_eq!(notes.len(), 1);
        assert!(notes[0].message.contains("Speed"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_sessions_share_tab_notifications() {
        let backend = Arc::new(MemoryBackend::new());
        let tabs = registry(&backend);

        let mut first = tabs.open("d1", "t1", None).await;
        let mut second = tabs.open("d1", "t1", None).await;
        first.container.add_to_cart(input("w1"), 1);

        assert_eq!(first.drain().len(), 1);
        assert_eq!(second.drain().len(), 1);

        let mut other_tab = tabs.open("d1", "t2", None).await;
        second.container.clear_cart();
        first.container.toggle_favorite(&ProductId::new("p1"));
        assert!(other_tab.drain().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_flushes_pending_changes() {
        let backend = Arc::new(MemoryBackend::new());
        let tabs = registry(&backend);

        let session = tabs.open("d1", "t1", None).await;
        session.container.add_to_cart(input("w1"), 2);
        drop(session);

        tabs.close("d1", "t1").await;
        assert_eq!(backend.len(), 1);

        let reopened = tabs.open("d1", "t1", None).await;
        assert_eq!(reopened.container.total_items(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_user_header_switches_namespace() {
        let backend = Arc::new(MemoryBackend::new());
        let tabs = registry(&backend);

        let guest = tabs.open("d1", "t1", None).await;
        guest.container.add_to_cart(input("w1"), 1);

        let member = tabs.open("d1", "t1", Some(UserId::new("42"))).await;
        assert_eq!(member.container.total_items(), 0);

        let guest_again = tabs.open("d1", "t1", None).await;
        assert_eq!(guest_again.container.total_items(), 1);
    }
}
