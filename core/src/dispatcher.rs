use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use storefront_proto::{DecodeError, OrderId, PushMessage};
use tracing::{debug, warn};

use crate::{
    connector::PushHandler,
    order::{ApplyOutcome, OrderStore},
};

/// Why an inbound frame was not applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    /// The frame did not match the push schema
    Malformed(String),
    /// The frame's `type` has no owning store
    UnknownType(String),
    /// A per-order dispatcher received an event for a different order
    OutOfScope(OrderId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Applied(ApplyOutcome),
    Dropped(DropReason),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Events that changed store state (including placeholders created)
    pub applied: u64,
    /// Events ignored by the recency rule
    pub stale: u64,
    pub dropped: u64,
}

#[derive(Default)]
struct Counters {
    applied: AtomicU64,
    stale: AtomicU64,
    dropped: AtomicU64,
}

struct Inner {
    orders: OrderStore,
    scope: Option<OrderId>,
    counters: Counters,
}

/// Routes inbound push frames by message type to the store that owns the entity.
///
/// A dispatcher is the single consumer of one channel. Nothing it receives is fatal: frames that
/// fail validation or have no owner are logged and dropped, and the channel stays open.
#[derive(Clone)]
pub struct Dispatcher(Arc<Inner>);

impl Dispatcher {
    pub fn new(orders: OrderStore) -> Self { Self(Arc::new(Inner { orders, scope: None, counters: Counters::default() })) }

    /// Dispatcher for a channel that carries a single order's updates
    pub fn scoped(orders: OrderStore, order_id: OrderId) -> Self {
        Self(Arc::new(Inner { orders, scope: Some(order_id), counters: Counters::default() }))
    }

    pub fn scope(&self) -> Option<&OrderId> { self.0.scope.as_ref() }

    /// Validate and route one raw frame
    pub fn dispatch(&self, payload: &str) -> DispatchOutcome {
        match PushMessage::decode(payload) {
            Ok(message) => self.route(message),
            Err(DecodeError::UnknownType(kind)) => {
                warn!("dropping push frame of unknown type `{}`", kind);
                self.drop_with(DropReason::UnknownType(kind))
            }
            Err(e) => {
                warn!("dropping malformed push frame: {}", e);
                debug!("malformed frame: {}", payload);
                self.drop_with(DropReason::Malformed(e.to_string()))
            }
        }
    }

    /// Route an already-validated message
    pub fn route(&self, message: PushMessage) -> DispatchOutcome {
        let kind = message.kind();
        match message {
            PushMessage::OrderStatus(event) => {
                if let Some(scope) = &self.0.scope {
                    if scope != &event.order_id {
                        warn!("dropping {} event for order {} on the channel for order {}", kind, event.order_id, scope);
                        return self.drop_with(DropReason::OutOfScope(event.order_id));
                    }
                }
                let outcome = self.0.orders.apply_event(&event);
                debug!("routed {} event for order {}: {:?}", kind, event.order_id, outcome);
                let counter = match outcome {
                    ApplyOutcome::Stale => &self.0.counters.stale,
                    ApplyOutcome::Created | ApplyOutcome::Applied => &self.0.counters.applied,
                };
                counter.fetch_add(1, Ordering::Relaxed);
                DispatchOutcome::Applied(outcome)
            }
        }
    }

    pub fn stats(&self) -> DispatchStats {
        let c = &self.0.counters;
        DispatchStats {
            applied: c.applied.load(Ordering::Relaxed),
            stale: c.stale.load(Ordering::Relaxed),
            dropped: c.dropped.load(Ordering::Relaxed),
        }
    }

    fn drop_with(&self, reason: DropReason) -> DispatchOutcome {
        self.0.counters.dropped.fetch_add(1, Ordering::Relaxed);
        DispatchOutcome::Dropped(reason)
    }
}

impl PushHandler for Dispatcher {
    fn handle_push(&self, payload: &str) { self.dispatch(payload); }
}
