//! The cart/favorites container for one consumer context.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};
use vitrine_core::{CartItem, Price, ProductId, ProductInput, UserId};

use super::checkout::{CheckoutError, WhatsAppCheckout};
use super::persist::{self, Baseline, Writer};
use super::reducer::{self, Action, AppState};
use crate::notify::Notifier;
use crate::storage::{
    CART_KEY, FAVORITES_KEY, Namespace, NamespacedStorage, Subscription, decode_list,
};

const LOAD_FAILED_MESSAGE: &str =
    "Não foi possível carregar seus dados salvos. Começando com um carrinho vazio.";
const EMPTY_CART_MESSAGE: &str = "Seu carrinho está vazio";
const CHECKOUT_OK_MESSAGE: &str = "Redirecionando para o WhatsApp...";
const CHECKOUT_FAILED_MESSAGE: &str = "Erro ao enviar pedido para o WhatsApp";

/// Container tuning.
#[derive(Debug, Clone, Copy)]
pub struct CartOptions {
    /// Quiet period before changes are written back.
    pub persist_debounce: Duration,
}

impl Default for CartOptions {
    fn default() -> Self {
        Self {
            persist_debounce: Duration::from_millis(300),
        }
    }
}

/// Single source of truth for one context's cart and favorites.
///
/// Actions apply synchronously; a background task writes changes back
/// after the debounce window, and storage changes made by other contexts
/// replace the local collections. Dropping the container stops both.
pub struct CartContainer {
    state: Arc<watch::Sender<AppState>>,
    storage: Arc<NamespacedStorage>,
    baseline: Arc<Mutex<Baseline>>,
    writer: Writer,
    checkout: WhatsAppCheckout,
    notifier: Notifier,
    generation: AtomicU64,
    sync: Mutex<Vec<Subscription>>,
    persist_task: JoinHandle<()>,
}

impl CartContainer {
    /// Create an unloaded container. Call [`CartContainer::load`] before use,
    /// or use [`CartContainer::open`].
    #[must_use]
    pub fn new(
        storage: Arc<NamespacedStorage>,
        checkout: WhatsAppCheckout,
        notifier: Notifier,
        options: CartOptions,
    ) -> Self {
        let (state, rx) = watch::channel(AppState {
            namespace: storage.namespace(),
            ..AppState::default()
        });
        let baseline = Arc::new(Mutex::new(Baseline::default()));
        let writer = Writer::new(Arc::clone(&storage), Arc::clone(&baseline));
        let persist_task = tokio::spawn(persist::run(
            rx,
            writer.clone(),
            options.persist_debounce,
        ));

        Self {
            state: Arc::new(state),
            storage,
            baseline,
            writer,
            checkout,
            notifier,
            generation: AtomicU64::new(0),
            sync: Mutex::new(Vec::new()),
            persist_task,
        }
    }

    /// Create a container for `user` and run the initial load.
    pub async fn open(
        storage: Arc<NamespacedStorage>,
        checkout: WhatsAppCheckout,
        notifier: Notifier,
        options: CartOptions,
        user: Option<UserId>,
    ) -> Self {
        storage.set_namespace(user);
        let container = Self::new(storage, checkout, notifier, options);
        container.load().await;
        container
    }

    /// Apply `action`. Returns whether the state changed.
    pub fn dispatch(&self, action: Action) -> bool {
        let now = Utc::now();
        self.state
            .send_if_modified(|state| reducer::reduce(state, action, now))
    }

    /// Load cart and favorites for the storage's current namespace.
    ///
    /// Storage failures fall back to empty collections with a warning
    /// notification; loading always completes. A load overtaken by a newer
    /// one leaves the state to it.
    ///
    /// Sync subscriptions are opened before the reads. Changes that arrive
    /// while reading are held back and win over the values read.
    #[instrument(skip(self), fields(namespace = %self.storage.namespace()))]
    pub async fn load(&self) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let namespace = self.storage.namespace();

        let gate = Arc::new(Mutex::new(LoadGate::default()));
        self.subscribe_sync(&namespace, &gate);
        self.dispatch(Action::BeginLoad(namespace.clone()));

        let (cart, favorites) = tokio::join!(
            self.storage.try_get_cart(),
            self.storage.try_get_favorites()
        );

        if self.generation.load(Ordering::SeqCst) != generation {
            debug!("Load superseded by a newer one");
            return;
        }

        let mut failed = false;
        let mut cart = match cart {
            Ok(items) => reducer::sanitize_cart(items),
            Err(e) => {
                warn!(error = %e, "Failed to load cart, starting empty");
                failed = true;
                Vec::new()
            }
        };
        let mut favorites = match favorites {
            Ok(ids) => reducer::sanitize_favorites(ids),
            Err(e) => {
                warn!(error = %e, "Failed to load favorites, starting empty");
                failed = true;
                Vec::new()
            }
        };

        // Held until loaded, so no change slips between the reads and the
        // subscriptions taking over.
        let mut gate = gate.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(items) = gate.cart.take() {
            debug!(items = items.len(), "Cart changed while loading");
            cart = items;
        }
        if let Some(ids) = gate.favorites.take() {
            debug!(favorites = ids.len(), "Favorites changed while loading");
            favorites = ids;
        }

        *self.lock_baseline() = Baseline {
            namespace: namespace.clone(),
            cart: cart.clone(),
            favorites: favorites.clone(),
        };

        info!(items = cart.len(), favorites = favorites.len(), "Cart loaded");
        self.dispatch(Action::SetCart(cart));
        self.dispatch(Action::SetFavorites(favorites));
        self.dispatch(Action::MarkLoaded);
        gate.open = true;
        drop(gate);

        if failed {
            self.notifier.warning(LOAD_FAILED_MESSAGE);
        }
    }

    fn subscribe_sync(&self, namespace: &Namespace, gate: &Arc<Mutex<LoadGate>>) {
        let cart = {
            let state = Arc::clone(&self.state);
            let baseline = Arc::clone(&self.baseline);
            let gate = Arc::clone(gate);
            let namespace = namespace.clone();
            self.storage.on_storage_change(CART_KEY, move |value| {
                let items = reducer::sanitize_cart(
                    value.map_or_else(Vec::new, |v| decode_list(CART_KEY, v)),
                );
                let mut gate = gate.lock().unwrap_or_else(PoisonError::into_inner);
                if gate.open {
                    apply_external(&state, &baseline, &namespace, External::Cart(items));
                } else {
                    gate.cart = Some(items);
                }
            })
        };

        let favorites = {
            let state = Arc::clone(&self.state);
            let baseline = Arc::clone(&self.baseline);
            let gate = Arc::clone(gate);
            let namespace = namespace.clone();
            self.storage.on_storage_change(FAVORITES_KEY, move |value| {
                let ids = reducer::sanitize_favorites(
                    value.map_or_else(Vec::new, |v| decode_list(FAVORITES_KEY, v)),
                );
                let mut gate = gate.lock().unwrap_or_else(PoisonError::into_inner);
                if gate.open {
                    apply_external(&state, &baseline, &namespace, External::Favorites(ids));
                } else {
                    gate.favorites = Some(ids);
                }
            })
        };

        let mut sync = self.lock_sync();
        sync.clear();
        sync.push(cart);
        sync.push(favorites);
    }

    /// Sign in or out: reload for `user`'s namespace.
    ///
    /// Pending changes are written to the old namespace first. Returns
    /// `false` when the namespace is unchanged.
    pub async fn switch_namespace(&self, user: Option<UserId>) -> bool {
        let namespace = Namespace::from_user(user);
        let current = self.state.borrow().namespace.clone();
        if current == namespace {
            return false;
        }

        info!(from = %current, to = %namespace, "Switching cart namespace");
        self.flush().await;
        self.storage.set_namespace_to(namespace);
        self.load().await;
        true
    }

    /// Write pending changes now instead of waiting for the debounce.
    pub async fn flush(&self) {
        let snapshot = self.snapshot();
        self.writer.write(&snapshot).await;
    }

    /// Add `quantity` units (0 counts as 1) of a loosely-typed product.
    ///
    /// Missing fields fall back to defaults; which ones is logged.
    pub fn add_to_cart(&self, product: ProductInput, quantity: u32) {
        let quantity = quantity.max(1);
        let normalized = product.into_cart_item(quantity);
        if normalized.is_partial() {
            warn!(
                product_id = %normalized.item.id,
                defaulted = ?normalized.defaulted,
                "Product added with defaulted fields"
            );
        }

        let id = normalized.item.id.clone();
        let name = normalized.item.name.clone();
        self.dispatch(Action::AddToCart(normalized.item));
        info!(product_id = %id, quantity, "Added to cart");
        self.notifier.success(format!("{name} adicionado ao carrinho!"));
    }

    pub fn remove_from_cart(&self, id: &ProductId) {
        if self.dispatch(Action::RemoveFromCart(id.clone())) {
            info!(product_id = %id, "Removed from cart");
        }
    }

    /// Set a line's quantity; zero or less removes the line.
    pub fn update_quantity(&self, id: &ProductId, quantity: i64) {
        if self.dispatch(Action::UpdateQuantity {
            id: id.clone(),
            quantity,
        }) {
            debug!(product_id = %id, quantity, "Quantity updated");
        }
    }

    pub fn clear_cart(&self) {
        if self.dispatch(Action::ClearCart) {
            info!("Cart cleared");
        }
    }

    /// Toggle `id` in favorites. Returns whether it is now a favorite.
    pub fn toggle_favorite(&self, id: &ProductId) -> bool {
        let now = Utc::now();
        let mut is_favorite = false;
        self.state.send_modify(|state| {
            reducer::reduce(state, Action::ToggleFavorite(id.clone()), now);
            is_favorite = state.is_favorite(id);
        });

        if is_favorite {
            self.notifier.info("Produto adicionado aos favoritos");
        } else {
            self.notifier.info("Produto removido dos favoritos");
        }
        is_favorite
    }

    /// Send the cart as a WhatsApp order. Returns the deep link.
    ///
    /// # Errors
    ///
    /// Returns [`CheckoutError::EmptyCart`] without side effects when the
    /// cart is empty, or the message/handoff error otherwise. Every failure
    /// also emits an error notification.
    pub async fn send_cart_to_whatsapp(&self) -> Result<String, CheckoutError> {
        let cart = self.state.borrow().cart.clone();
        if cart.is_empty() {
            self.notifier.error(EMPTY_CART_MESSAGE);
            return Err(CheckoutError::EmptyCart);
        }

        match self.checkout.send(&cart).await {
            Ok(url) => {
                info!(lines = cart.len(), "Order handed off to WhatsApp");
                self.notifier.success(CHECKOUT_OK_MESSAGE);
                Ok(url)
            }
            Err(e) => {
                error!(error = %e, "WhatsApp handoff failed");
                self.notifier.error(CHECKOUT_FAILED_MESSAGE);
                Err(e)
            }
        }
    }

    #[must_use]
    pub fn total_items(&self) -> u64 {
        self.state.borrow().total_items()
    }

    /// Cart total, formatted.
    #[must_use]
    pub fn cart_total(&self) -> String {
        self.state.borrow().cart_total().display()
    }

    /// `price` times `quantity`, formatted.
    #[must_use]
    pub fn item_total(&self, price: &str, quantity: u32) -> String {
        (Price::parse_or_zero(price) * quantity).display()
    }

    #[must_use]
    pub fn favorites_count(&self) -> usize {
        self.state.borrow().favorites.len()
    }

    #[must_use]
    pub fn is_favorite(&self, id: &ProductId) -> bool {
        self.state.borrow().is_favorite(id)
    }

    #[must_use]
    pub fn cart(&self) -> Vec<CartItem> {
        self.state.borrow().cart.clone()
    }

    #[must_use]
    pub fn snapshot(&self) -> AppState {
        self.state.borrow().clone()
    }

    /// Receiver that observes every state change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<AppState> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn namespace(&self) -> Namespace {
        self.state.borrow().namespace.clone()
    }

    #[must_use]
    pub const fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    fn lock_sync(&self) -> MutexGuard<'_, Vec<Subscription>> {
        self.sync.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_baseline(&self) -> MutexGuard<'_, Baseline> {
        self.baseline.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for CartContainer {
    fn drop(&mut self) {
        self.persist_task.abort();
    }
}

enum External {
    Cart(Vec<CartItem>),
    Favorites(Vec<ProductId>),
}

/// Apply a value written by another context, if it belongs to the active
/// namespace. The baseline moves with it so the value is not written back.
/// External changes seen by one load's subscriptions before it completed.
#[derive(Debug, Default)]
struct LoadGate {
    open: bool,
    cart: Option<Vec<CartItem>>,
    favorites: Option<Vec<ProductId>>,
}

fn apply_external(
    state: &watch::Sender<AppState>,
    baseline: &Mutex<Baseline>,
    namespace: &Namespace,
    external: External,
) {
    let now = Utc::now();
    state.send_if_modified(|state| {
        if &state.namespace != namespace || !state.is_persistable() {
            return false;
        }

        let mut baseline = baseline.lock().unwrap_or_else(PoisonError::into_inner);
        match external {
            External::Cart(items) => {
                debug!(items = items.len(), "Cart changed in another context");
                baseline.cart.clone_from(&items);
                reducer::reduce(state, Action::SetCart(items), now)
            }
            External::Favorites(ids) => {
                debug!(favorites = ids.len(), "Favorites changed in another context");
                baseline.favorites.clone_from(&ids);
                reducer::reduce(state, Action::SetFavorites(ids), now)
            }
        }
    });
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::AtomicBool;

    use async_trait::async_trait;
    use tokio::sync::{Notify, broadcast};

    use super::*;
    use crate::cart::checkout::Handoff;
    use crate::notify::{self, NotificationKind};
    use crate::storage::{MemoryBackend, OriginId, StorageBackend, StorageChange, StorageError};

    #[derive(Default)]
    struct CountingBackend {
        inner: MemoryBackend,
        writes: Mutex<Vec<String>>,
    }

    impl CountingBackend {
        fn writes(&self) -> Vec<String> {
            self.writes.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl StorageBackend for CountingBackend {
        async fn read(&self, key: &str) -> Result<Option<serde_json::Value>, StorageError> {
            self.inner.read(key).await
        }

        async fn write(
            &self,
            key: &str,
            value: serde_json::Value,
            origin: OriginId,
        ) -> Result<(), StorageError> {
            self.writes.lock().unwrap().push(key.to_string());
            self.inner.write(key, value, origin).await
        }

        fn changes(&self) -> broadcast::Receiver<StorageChange> {
            self.inner.changes()
        }
    }

    struct UnreadableBackend {
        changes: broadcast::Sender<StorageChange>,
    }

    #[async_trait]
    impl StorageBackend for UnreadableBackend {
        async fn read(&self, _key: &str) -> Result<Option<serde_json::Value>, StorageError> {
            Err(StorageError::Unavailable("quota exceeded".to_string()))
        }

        async fn write(
            &self,
            _key: &str,
            _value: serde_json::Value,
            _origin: OriginId,
        ) -> Result<(), StorageError> {
            Ok(())
        }

        fn changes(&self) -> broadcast::Receiver<StorageChange> {
            self.changes.subscribe()
        }
    }

    /// Reads the stored value, then waits for `release` before returning it
    /// while `hold` is set.
    #[derive(Default)]
    struct StallingBackend {
        inner: MemoryBackend,
        hold: AtomicBool,
        release: Notify,
    }

    #[async_trait]
    impl StorageBackend for StallingBackend {
        async fn read(&self, key: &str) -> Result<Option<serde_json::Value>, StorageError> {
            let value = self.inner.read(key).await;
            if self.hold.load(Ordering::SeqCst) {
                self.release.notified().await;
            }
            value
        }

        async fn write(
            &self,
            key: &str,
            value: serde_json::Value,
            origin: OriginId,
        ) -> Result<(), StorageError> {
            self.inner.write(key, value, origin).await
        }

        fn changes(&self) -> broadcast::Receiver<StorageChange> {
            self.inner.changes()
        }
    }

    #[derive(Default)]
    struct RecordingHandoff {
        urls: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl Handoff for RecordingHandoff {
        async fn open(&self, url: &str) -> Result<(), CheckoutError> {
            if self.fail {
                return Err(CheckoutError::Handoff("popup blocked".to_string()));
            }
            self.urls.lock().unwrap().push(url.to_string());
            Ok(())
        }
    }

    fn checkout(handoff: Arc<RecordingHandoff>) -> WhatsAppCheckout {
        WhatsAppCheckout::new("5511999990000", handoff)
    }

    async fn open_on(
        backend: Arc<dyn StorageBackend>,
        notifier: &Notifier,
        handoff: Arc<RecordingHandoff>,
        user: Option<UserId>,
    ) -> CartContainer {
        let storage = Arc::new(NamespacedStorage::new(backend, None));
        CartContainer::open(
            storage,
            checkout(handoff),
            notifier.clone(),
            CartOptions::default(),
            user,
        )
        .await
    }

    async fn open_guest(backend: &Arc<CountingBackend>) -> CartContainer {
        open_on(
            Arc::clone(backend) as Arc<dyn StorageBackend>,
            &Notifier::new(),
            Arc::new(RecordingHandoff::default()),
            None,
        )
        .await
    }

    fn watch_input(id: &str) -> ProductInput {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "name": "Speed",
            "price": "R$ 100,00",
            "image": "x",
            "brand": "Omega",
        }))
        .unwrap()
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    fn ids(cart: &[CartItem]) -> Vec<(&str, u32)> {
        cart.iter().map(|i| (i.id.as_str(), i.quantity)).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_add_update_and_totals() {
        let backend = Arc::new(CountingBackend::default());
        let cart = open_guest(&backend).await;

        cart.add_to_cart(watch_input("w1"), 1);
        assert_eq!(ids(&cart.cart()), vec![("w1", 1)]);
        assert_eq!(cart.total_items(), 1);

        cart.add_to_cart(watch_input("w1"), 2);
        assert_eq!(ids(&cart.cart()), vec![("w1", 3)]);
        assert_eq!(cart.cart_total(), "R$ 300,00");
        assert_eq!(cart.item_total("R$ 100,00", 3), "R$ 300,00");

        cart.update_quantity(&ProductId::new("w1"), 0);
        assert!(cart.cart().is_empty());
        assert_eq!(cart.cart_total(), "R$ 0,00");
    }

    #[tokio::test(start_paused = true)]
    async fn test_totals_survive_extreme_prices() {
        let backend = Arc::new(CountingBackend::default());
        let cart = open_guest(&backend).await;
        let input: ProductInput = serde_json::from_value(serde_json::json!({
            "id": "w1",
            "price": "R$ 79.228.162.514.264.337.593.543.950.335",
        }))
        .unwrap();

        cart.add_to_cart(input, 2);
        assert_eq!(cart.total_items(), 2);
        let max = "R$ 79.228.162.514.264.337.593.543.950.335,00";
        assert_eq!(cart.cart_total(), max);
        assert_eq!(
            cart.item_total("R$ 79.228.162.514.264.337.593.543.950.335", 2),
            max
        );
        assert!(cart.send_cart_to_whatsapp().await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_add_normalizes_partial_input() {
        let backend = Arc::new(CountingBackend::default());
        let notifier = Notifier::new();
        let mut rx = notifier.subscribe();
        let cart = open_on(
            backend,
            &notifier,
            Arc::new(RecordingHandoff::default()),
            None,
        )
        .await;

        let input = ProductInput {
            title: Some("Seamaster".to_string()),
            ..ProductInput::default()
        };
        cart.add_to_cart(input, 0);

        let line = &cart.cart()[0];
        assert!(line.id.is_synthetic());
        assert_eq!(line.name, "Seamaster");
        assert_eq!(line.price, "R$ 0,00");
        assert_eq!(line.brand, "Sem marca");
        assert_eq!(line.quantity, 1);

        let notes = notify::drain(&mut rx);
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].kind, NotificationKind::Success);
        assert!(notes[0].message.contains("Seamaster"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_toggle_favorite() {
        let backend = Arc::new(CountingBackend::default());
        let cart = open_guest(&backend).await;
        let p1 = ProductId::new("p1");

        assert!(cart.toggle_favorite(&p1));
        assert!(cart.is_favorite(&p1));
        assert_eq!(cart.favorites_count(), 1);

        assert!(!cart.toggle_favorite(&p1));
        assert_eq!(cart.favorites_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_of_changes_is_written_once() {
        let backend = Arc::new(CountingBackend::default());
        let cart = open_guest(&backend).await;
        settle().await;
        assert!(backend.writes().is_empty(), "loading never writes back");

        let w1 = ProductId::new("w1");
        cart.add_to_cart(watch_input("w1"), 1);
        tokio::time::sleep(Duration::from_millis(100)).await;
        cart.add_to_cart(watch_input("w1"), 1);
        tokio::time::sleep(Duration::from_millis(100)).await;
        cart.update_quantity(&w1, 5);
        assert!(backend.writes().is_empty());

        settle().await;
        assert_eq!(backend.writes(), vec!["vitrine_guest_cart"]);

        let stored = backend.inner.read("vitrine_guest_cart").await.unwrap().unwrap();
        let stored: Vec<CartItem> = decode_list("test", stored);
        assert_eq!(ids(&stored), vec![("w1", 5)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_writes_immediately() {
        let backend = Arc::new(CountingBackend::default());
        let cart = open_guest(&backend).await;

        cart.toggle_favorite(&ProductId::new("p1"));
        cart.flush().await;
        assert_eq!(backend.writes(), vec!["vitrine_guest_favorites"]);

        settle().await;
        assert_eq!(backend.writes().len(), 1, "nothing left to write");
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_failure_falls_back_to_empty() {
        let (changes, _) = broadcast::channel(4);
        let notifier = Notifier::new();
        let mut rx = notifier.subscribe();
        let cart = open_on(
            Arc::new(UnreadableBackend { changes }),
            &notifier,
            Arc::new(RecordingHandoff::default()),
            None,
        )
        .await;

        let state = cart.snapshot();
        assert!(state.data_loaded);
        assert!(!state.is_loading);
        assert!(state.cart.is_empty());

        let notes = notify::drain(&mut rx);
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].kind, NotificationKind::Warning);
    }

    #[tokio::test(start_paused = true)]
    async fn test_namespaces_are_isolated() {
        let backend = Arc::new(CountingBackend::default());
        let cart = open_guest(&backend).await;

        cart.add_to_cart(watch_input("w1"), 1);
        assert!(cart.switch_namespace(Some(UserId::new("42"))).await);
        assert!(cart.cart().is_empty());
        assert_eq!(cart.namespace(), Namespace::User(UserId::new("42")));

        cart.add_to_cart(watch_input("w2"), 1);
        settle().await;

        assert!(cart.switch_namespace(None).await);
        assert_eq!(ids(&cart.cart()), vec![("w1", 1)]);
        assert!(!cart.switch_namespace(None).await);

        assert!(cart.switch_namespace(Some(UserId::new("42"))).await);
        assert_eq!(ids(&cart.cart()), vec![("w2", 1)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_changes_reach_other_tabs_without_echo() {
        let backend = Arc::new(CountingBackend::default());
        let tab_a = open_guest(&backend).await;
        let tab_b = open_guest(&backend).await;

        tab_a.add_to_cart(watch_input("w1"), 2);
        tab_a.toggle_favorite(&ProductId::new("p1"));
        settle().await;

        assert_eq!(ids(&tab_b.cart()), vec![("w1", 2)]);
        assert!(tab_b.is_favorite(&ProductId::new("p1")));

        settle().await;
        assert_eq!(backend.writes().len(), 2, "tab B must not write the value back");
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_during_load_is_not_lost() {
        let backend = Arc::new(StallingBackend::default());
        backend.hold.store(true, Ordering::SeqCst);
        let other_tab = NamespacedStorage::new(Arc::clone(&backend) as Arc<dyn StorageBackend>, None);
        let w1 = watch_input("w1").into_cart_item(1).item;
        let notifier = Notifier::new();

        let (tab_b, ()) = tokio::join!(
            open_on(
                Arc::clone(&backend) as Arc<dyn StorageBackend>,
                &notifier,
                Arc::new(RecordingHandoff::default()),
                None,
            ),
            async {
                // Both reads already hold the empty value.
                other_tab.set_cart(&[w1.clone()]).await.unwrap();
                other_tab.set_favorites(&[ProductId::new("p1")]).await.unwrap();
                backend.hold.store(false, Ordering::SeqCst);
                backend.release.notify_waiters();
            }
        );
        settle().await;

        assert_eq!(ids(&tab_b.cart()), vec![("w1", 1)]);
        assert!(tab_b.is_favorite(&ProductId::new("p1")));

        tab_b.add_to_cart(watch_input("w2"), 1);
        settle().await;
        let stored = other_tab.get_cart().await;
        assert_eq!(ids(&stored), vec![("w1", 1), ("w2", 1)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_namespaces_do_not_sync() {
        let backend = Arc::new(CountingBackend::default());
        let guest = open_guest(&backend).await;
        let member = open_on(
            Arc::clone(&backend) as Arc<dyn StorageBackend>,
            &Notifier::new(),
            Arc::new(RecordingHandoff::default()),
            Some(UserId::new("42")),
        )
        .await;

        guest.add_to_cart(watch_input("w1"), 1);
        settle().await;
        assert!(member.cart().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_whatsapp_with_empty_cart_does_not_hand_off() {
        let backend = Arc::new(CountingBackend::default());
        let notifier = Notifier::new();
        let mut rx = notifier.subscribe();
        let handoff = Arc::new(RecordingHandoff::default());
        let cart = open_on(backend, &notifier, Arc::clone(&handoff), None).await;

        let result = cart.send_cart_to_whatsapp().await;
        assert!(matches!(result, Err(CheckoutError::EmptyCart)));
        assert!(handoff.urls.lock().unwrap().is_empty());

        let notes = notify::drain(&mut rx);
        assert_eq!(notes[0].kind, NotificationKind::Error);
        assert_eq!(notes[0].message, EMPTY_CART_MESSAGE);
    }

    #[tokio::test(start_paused = true)]
    async fn test_whatsapp_handoff() {
        let backend = Arc::new(CountingBackend::default());
        let handoff = Arc::new(RecordingHandoff::default());
        let cart = open_on(backend, &Notifier::new(), Arc::clone(&handoff), None).await;

        cart.add_to_cart(watch_input("w1"), 2);
        let url = cart.send_cart_to_whatsapp().await.unwrap();

        assert!(url.starts_with("https://wa.me/5511999990000?text=Ol%C3%A1"));
        assert_eq!(*handoff.urls.lock().unwrap(), vec![url]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_whatsapp_handoff_failure_is_reported() {
        let backend = Arc::new(CountingBackend::default());
        let notifier = Notifier::new();
        let handoff = Arc::new(RecordingHandoff {
            fail: true,
            ..RecordingHandoff::default()
        });
        let cart = open_on(backend, &notifier, handoff, None).await;
        cart.add_to_cart(watch_input("w1"), 1);

        let mut rx = notifier.subscribe();
        let result = cart.send_cart_to_whatsapp().await;
        assert!(matches!(result, Err(CheckoutError::Handoff(_))));

        let notes = notify::drain(&mut rx);
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].message, CHECKOUT_FAILED_MESSAGE);
    }
}
