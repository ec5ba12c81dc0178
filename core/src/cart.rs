use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Arc, Mutex, PoisonError,
    },
};

use storefront_proto::{AddToCart, CartItem, ItemId, Money};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::{
    error::{CartError, CheckoutError},
    service::CartService,
};

/// Immutable cart contents.
///
/// The total is derived from the items on every read and is never stored, so it cannot drift
/// from them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cart {
    items: Vec<CartItem>,
}

impl Cart {
    pub fn items(&self) -> &[CartItem] { &self.items }

    pub fn get(&self, id: &ItemId) -> Option<&CartItem> { self.items.iter().find(|item| &item.id == id) }

    pub fn total(&self) -> Money { self.items.iter().map(CartItem::subtotal).sum() }

    /// Number of units across all lines
    pub fn unit_count(&self) -> u64 { self.items.iter().map(|item| item.quantity as u64).sum() }

    pub fn len(&self) -> usize { self.items.len() }

    pub fn is_empty(&self) -> bool { self.items.is_empty() }

    fn position(&self, id: &ItemId) -> Option<usize> { self.items.iter().position(|item| &item.id == id) }
}

#[derive(Debug, Clone)]
enum Mutation {
    Add(CartItem),
    SetQuantity(ItemId, u32),
    Remove(ItemId),
}

impl Mutation {
    fn item_id(&self) -> &ItemId {
        match self {
            Mutation::Add(item) => &item.id,
            Mutation::SetQuantity(id, _) | Mutation::Remove(id) => id,
        }
    }
}

/// The affected line as it was before a mutation: its index and contents, or `None` if absent
type Prior = Option<(usize, CartItem)>;

struct Inner {
    cart: watch::Sender<Arc<Cart>>,
    service: Arc<dyn CartService>,
    /// One FIFO queue per item with a mutation in flight
    queues: Mutex<HashMap<ItemId, Arc<tokio::sync::Mutex<()>>>>,
    pending: AtomicUsize,
    /// Bumped on every submitted mutation; lets `refresh` detect a snapshot that raced one
    generation: AtomicU64,
    /// Set while a checkout owns the cart; mutations are refused until it is released
    checkout: AtomicBool,
}

/// Optimistic cart state.
///
/// Each mutation is applied locally at once, then confirmed with the cart service. If the service
/// refuses, the affected line is restored to exactly what it was before the mutation and the
/// caller gets the error. Mutations on the same item run strictly one after another; mutations on
/// different items proceed concurrently.
#[derive(Clone)]
pub struct CartStore(Arc<Inner>);

impl CartStore {
    pub fn new(service: Arc<dyn CartService>) -> Self {
        let (cart, _) = watch::channel(Arc::new(Cart::default()));
        Self(Arc::new(Inner {
            cart,
            service,
            queues: Mutex::new(HashMap::new()),
            pending: AtomicUsize::new(0),
            generation: AtomicU64::new(0),
            checkout: AtomicBool::new(false),
        }))
    }

    pub fn snapshot(&self) -> Arc<Cart> { self.0.cart.borrow().clone() }

    pub fn subscribe(&self) -> watch::Receiver<Arc<Cart>> { self.0.cart.subscribe() }

    pub fn total(&self) -> Money { self.0.cart.borrow().total() }

    pub fn get(&self, id: &ItemId) -> Option<CartItem> { self.0.cart.borrow().get(id).cloned() }

    /// Mutations submitted but not yet confirmed or rolled back
    pub fn pending(&self) -> usize { self.0.pending.load(Ordering::SeqCst) }

    /// Whether a checkout currently owns the cart
    pub fn checking_out(&self) -> bool { self.0.checkout.load(Ordering::SeqCst) }

    /// Add an item, or raise the quantity of the line that already holds it
    pub async fn add(&self, item: CartItem) -> Result<Arc<Cart>, CartError> { self.submit(Mutation::Add(item)).await }

    pub async fn update_quantity(&self, id: &ItemId, quantity: u32) -> Result<Arc<Cart>, CartError> {
        self.submit(Mutation::SetQuantity(id.clone(), quantity)).await
    }

    pub async fn remove(&self, id: &ItemId) -> Result<Arc<Cart>, CartError> { self.submit(Mutation::Remove(id.clone())).await }

    /// Replace local contents with the cart service's copy.
    ///
    /// Refused while mutations are outstanding, and the response is discarded if a mutation was
    /// submitted while it was in flight: either way the local optimistic state would be clobbered.
    pub async fn refresh(&self) -> Result<Arc<Cart>, CartError> {
        let pending = self.pending();
        if pending > 0 {
            return Err(CartError::Busy(pending));
        }
        let generation = self.0.generation.load(Ordering::Acquire);
        let items = self.0.service.fetch_cart().await.map_err(CartError::Refresh)?;

        if self.0.generation.load(Ordering::Acquire) != generation {
            debug!("discarding cart snapshot that raced a local change");
            return Err(CartError::Superseded);
        }
        info!("loaded cart snapshot with {} line(s)", items.len());
        self.0.cart.send_replace(Arc::new(Cart { items }));
        Ok(self.snapshot())
    }

    /// Claim the cart for a checkout. Fails if another checkout holds it or a mutation is still
    /// awaiting confirmation; while the returned lock is held every new mutation is refused.
    pub(crate) fn lock_for_checkout(&self) -> Result<CheckoutLock, CheckoutError> {
        if self.0.checkout.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_err() {
            return Err(CheckoutError::InProgress);
        }
        let lock = CheckoutLock { inner: self.0.clone() };
        // pairs with the flag check in `submit`: one side always observes the other
        let pending = self.pending();
        if pending > 0 {
            return Err(CheckoutError::CartBusy(pending));
        }
        Ok(lock)
    }

    /// Empty the cart locally once the order service has taken ownership of its contents
    pub(crate) fn clear(&self) {
        self.0.generation.fetch_add(1, Ordering::AcqRel);
        self.0.cart.send_replace(Arc::new(Cart::default()));
    }

    async fn submit(&self, mutation: Mutation) -> Result<Arc<Cart>, CartError> {
        let item = mutation.item_id().clone();
        let pending = PendingGuard::new(self.0.clone());
        if self.checking_out() {
            debug!("refusing cart change for {} during checkout", item);
            return Err(CartError::CheckoutInProgress(item));
        }

        // Run in a task so an abandoned caller cannot strand an unconfirmed optimistic change
        let task = tokio::spawn(async move {
            let inner = pending.inner.clone();
            let result = inner.run(mutation).await;
            drop(pending);
            result
        });

        match task.await {
            Ok(result) => result,
            Err(e) => {
                warn!("cart confirmation task for {} ended abnormally: {}", item, e);
                Err(CartError::Interrupted(item))
            }
        }
    }
}

impl Inner {
    async fn run(self: Arc<Self>, mutation: Mutation) -> Result<Arc<Cart>, CartError> {
        let id = mutation.item_id().clone();
        let queue = self.queue_for(&id);
        let turn = queue.lock().await;

        let result = self.apply_and_confirm(mutation).await;

        drop(turn);
        drop(queue);
        self.release_queue(&id);
        result
    }

    async fn apply_and_confirm(&self, mutation: Mutation) -> Result<Arc<Cart>, CartError> {
        let prior = self.apply_local(&mutation)?;

        let confirmation = match &mutation {
            Mutation::Add(item) => {
                self.service.add_item(&AddToCart { product_id: item.id.clone(), quantity: item.quantity }).await
            }
            Mutation::SetQuantity(id, quantity) => self.service.update_quantity(id, *quantity).await,
            Mutation::Remove(id) => self.service.remove_item(id).await,
        };

        let id = mutation.item_id();
        match confirmation {
            Ok(()) => {
                debug!("cart change for {} confirmed", id);
                Ok(self.cart.borrow().clone())
            }
            Err(source) => {
                warn!("cart change for {} rejected, rolling back: {}", id, source);
                self.restore(id, prior);
                Err(CartError::RolledBack { item: id.clone(), source })
            }
        }
    }

    fn apply_local(&self, mutation: &Mutation) -> Result<Prior, CartError> {
        let mut result = Ok(None);
        self.cart.send_if_modified(|cart| {
            let position = cart.position(mutation.item_id());
            let prior = position.map(|i| (i, cart.items[i].clone()));

            match mutation {
                Mutation::Add(item) => {
                    let items = &mut Arc::make_mut(cart).items;
                    match position {
                        Some(i) => items[i].quantity = items[i].quantity.saturating_add(item.quantity),
                        None => items.push(item.clone()),
                    }
                }
                Mutation::SetQuantity(id, quantity) => {
                    let Some(i) = position else {
                        result = Err(CartError::NotInCart(id.clone()));
                        return false;
                    };
                    Arc::make_mut(cart).items[i].quantity = *quantity;
                }
                Mutation::Remove(id) => {
                    let Some(i) = position else {
                        result = Err(CartError::NotInCart(id.clone()));
                        return false;
                    };
                    Arc::make_mut(cart).items.remove(i);
                }
            }
            result = Ok(prior);
            true
        });
        result
    }

    fn restore(&self, id: &ItemId, prior: Prior) {
        self.cart.send_modify(|cart| {
            let items = &mut Arc::make_mut(cart).items;
            let current = items.iter().position(|item| &item.id == id);
            match (prior, current) {
                (None, Some(i)) => {
                    items.remove(i);
                }
                (Some((_, item)), Some(i)) => items[i] = item,
                (Some((index, item)), None) => items.insert(index.min(items.len()), item),
                (None, None) => {}
            }
        });
    }

    fn queue_for(&self, id: &ItemId) -> Arc<tokio::sync::Mutex<()>> {
        let mut queues = self.queues.lock().unwrap_or_else(PoisonError::into_inner);
        queues.entry(id.clone()).or_default().clone()
    }

    fn release_queue(&self, id: &ItemId) {
        let mut queues = self.queues.lock().unwrap_or_else(PoisonError::into_inner);
        if queues.get(id).is_some_and(|queue| Arc::strong_count(queue) == 1) {
            queues.remove(id);
        }
    }
}

/// Counts a mutation as pending from submission until its task finishes or is dropped
struct PendingGuard {
    inner: Arc<Inner>,
}

impl PendingGuard {
    fn new(inner: Arc<Inner>) -> Self {
        inner.pending.fetch_add(1, Ordering::SeqCst);
        inner.generation.fetch_add(1, Ordering::AcqRel);
        Self { inner }
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) { self.inner.pending.fetch_sub(1, Ordering::SeqCst); }
}

/// Exclusive claim on the cart held by a running checkout, released on drop
pub(crate) struct CheckoutLock {
    inner: Arc<Inner>,
}

impl Drop for CheckoutLock {
    fn drop(&mut self) { self.inner.checkout.store(false, Ordering::SeqCst); }
}
