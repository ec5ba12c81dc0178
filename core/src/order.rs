use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
};

use storefront_proto::{
    chrono::{DateTime, Utc},
    OrderEvent, OrderId, OrderRecord, OrderStatus, Recency,
};
use tokio::sync::watch;
use tracing::{debug, info};

/// Client-side view of one order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub id: OrderId,
    pub status: OrderStatus,
    /// `None` until a snapshot row for this order has been merged
    pub created_at: Option<DateTime<Utc>>,
    pub version: u64,
}

impl Order {
    fn from_record(record: OrderRecord) -> Self {
        Self { id: record.id, status: record.status, created_at: record.created_at, version: record.version }
    }

    fn placeholder(event: &OrderEvent) -> Self {
        Self { id: event.order_id.clone(), status: event.status, created_at: None, version: event.version }
    }

    /// An order first seen through a pushed event (or checkout) whose snapshot row has not arrived yet
    pub fn is_placeholder(&self) -> bool { self.created_at.is_none() }

    pub fn recency(&self) -> Recency { Recency { version: self.version, status: self.status } }
}

/// Immutable point-in-time table of orders, keyed by id
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderTable {
    orders: BTreeMap<OrderId, Order>,
}

impl OrderTable {
    pub fn get(&self, id: &OrderId) -> Option<&Order> { self.orders.get(id) }

    pub fn iter(&self) -> impl Iterator<Item = &Order> { self.orders.values() }

    pub fn len(&self) -> usize { self.orders.len() }

    pub fn is_empty(&self) -> bool { self.orders.is_empty() }

    pub fn status_of(&self, id: &OrderId) -> Option<OrderStatus> { self.orders.get(id).map(|o| o.status) }
}

/// Result of merging one pushed event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The order was unknown; a placeholder now carries the event's fields
    Created,
    /// The event was newer than the stored state and replaced it
    Applied,
    /// The event was not newer than the stored state (late or duplicate) and was ignored
    Stale,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SnapshotReport {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
}

struct Inner {
    table: watch::Sender<Arc<OrderTable>>,
    fetch_epoch: AtomicU64,
}

/// Authoritative in-memory table of orders.
///
/// Snapshots and events are merged under one recency rule: a state replaces the stored one only
/// when its `(version, status)` key is strictly greater. Because that key is a total order, the
/// table converges to the same contents no matter how events and snapshots interleave.
#[derive(Clone)]
pub struct OrderStore(Arc<Inner>);

impl Default for OrderStore {
    fn default() -> Self { Self::new() }
}

impl OrderStore {
    pub fn new() -> Self {
        let (table, _) = watch::channel(Arc::new(OrderTable::default()));
        Self(Arc::new(Inner { table, fetch_epoch: AtomicU64::new(0) }))
    }

    /// Current table. The returned snapshot never changes; later mutations publish a new one.
    pub fn snapshot(&self) -> Arc<OrderTable> { self.0.table.borrow().clone() }

    /// Receiver notified with a fresh snapshot after every effective mutation
    pub fn subscribe(&self) -> watch::Receiver<Arc<OrderTable>> { self.0.table.subscribe() }

    pub fn get(&self, id: &OrderId) -> Option<Order> { self.0.table.borrow().get(id).cloned() }

    pub fn len(&self) -> usize { self.0.table.borrow().len() }

    pub fn is_empty(&self) -> bool { self.0.table.borrow().is_empty() }

    /// Merge a pushed status event.
    ///
    /// Idempotent and order-independent: replaying an event, or applying a set of events in any
    /// permutation, leaves every order at the state of its most recent event.
    pub fn apply_event(&self, event: &OrderEvent) -> ApplyOutcome {
        let mut outcome = ApplyOutcome::Stale;
        self.0.table.send_if_modified(|table| {
            outcome = match table.orders.get(&event.order_id) {
                None => ApplyOutcome::Created,
                Some(current) if event.recency() > current.recency() => ApplyOutcome::Applied,
                Some(_) => ApplyOutcome::Stale,
            };
            let orders = match outcome {
                ApplyOutcome::Stale => return false,
                _ => &mut Arc::make_mut(table).orders,
            };
            match orders.get_mut(&event.order_id) {
                Some(order) => {
                    order.status = event.status;
                    order.version = event.version;
                }
                None => {
                    orders.insert(event.order_id.clone(), Order::placeholder(event));
                }
            }
            true
        });
        debug!("order {} -> {} (v{}): {:?}", event.order_id, event.status, event.version, outcome);
        outcome
    }

    /// Merge a complete `GET /orders` snapshot.
    ///
    /// Unknown orders are inserted. For known ones the snapshot always supplies `created_at`, but
    /// only replaces status and version when it is more recent than what pushed events already
    /// delivered, so a snapshot taken before the latest event cannot regress it.
    pub fn load_snapshot(&self, records: impl IntoIterator<Item = OrderRecord>) -> SnapshotReport {
        let mut report = SnapshotReport::default();
        self.0.table.send_if_modified(|table| {
            for record in records {
                let merged = match table.orders.get(&record.id) {
                    None => None,
                    Some(current) => {
                        let mut next = current.clone();
                        if record.created_at.is_some() {
                            next.created_at = record.created_at;
                        }
                        if record.recency() > current.recency() {
                            next.status = record.status;
                            next.version = record.version;
                        }
                        if &next == current {
                            report.unchanged += 1;
                            continue;
                        }
                        Some(next)
                    }
                };
                let orders = &mut Arc::make_mut(table).orders;
                match merged {
                    Some(next) => {
                        report.updated += 1;
                        orders.insert(next.id.clone(), next);
                    }
                    None => {
                        report.inserted += 1;
                        orders.insert(record.id.clone(), Order::from_record(record));
                    }
                }
            }
            report.inserted + report.updated > 0
        });
        info!("merged order snapshot: {} inserted, {} updated, {} unchanged", report.inserted, report.updated, report.unchanged);
        report
    }

    /// Record an order the client just created through checkout. No-op if the id is already known.
    pub fn record_created(&self, id: OrderId) -> bool {
        self.0.table.send_if_modified(|table| {
            if table.orders.contains_key(&id) {
                return false;
            }
            let order = Order { id: id.clone(), status: OrderStatus::Pending, created_at: None, version: 0 };
            Arc::make_mut(table).orders.insert(id, order);
            true
        })
    }

    /// Start a snapshot request. The response must be handed back through [`PendingFetch::complete`].
    pub fn begin_fetch(&self) -> PendingFetch {
        PendingFetch {
            store: self.clone(),
            epoch: self.0.fetch_epoch.load(Ordering::Acquire),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Invalidate every fetch begun before this call
    pub fn cancel_fetches(&self) { self.0.fetch_epoch.fetch_add(1, Ordering::AcqRel); }
}

/// An in-flight snapshot request.
///
/// The requester may be torn down before the response arrives; in that case the response is
/// discarded on arrival rather than merged into a store that has moved on.
pub struct PendingFetch {
    store: OrderStore,
    epoch: u64,
    cancelled: Arc<AtomicBool>,
}

impl PendingFetch {
    pub fn canceller(&self) -> FetchCanceller { FetchCanceller(self.cancelled.clone()) }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire) || self.store.0.fetch_epoch.load(Ordering::Acquire) != self.epoch
    }

    /// Merge the response, unless the fetch was cancelled meanwhile
    pub fn complete(self, records: Vec<OrderRecord>) -> Option<SnapshotReport> {
        if self.is_cancelled() {
            debug!("discarding {} order rows from a cancelled fetch", records.len());
            return None;
        }
        Some(self.store.load_snapshot(records))
    }
}

/// Handle for cancelling a [`PendingFetch`] from wherever the requester lives
#[derive(Clone)]
pub struct FetchCanceller(Arc<AtomicBool>);

impl FetchCanceller {
    pub fn cancel(&self) { self.0.store(true, Ordering::Release); }

    pub fn is_cancelled(&self) -> bool { self.0.load(Ordering::Acquire) }
}
