//! # Storefront core
//!
//! Client-side state for the storefront: an [`OrderStore`] that merges REST snapshots with pushed
//! status events, a [`CartStore`] that applies cart mutations optimistically and rolls them back
//! when the cart service refuses them, and a [`Dispatcher`] that routes inbound push frames to
//! the store that owns them.
//!
//! Stores are cheap to clone handles onto shared state. Every mutation publishes a fresh immutable
//! snapshot; views either read [`OrderStore::snapshot`]/[`CartStore::snapshot`] or hold the
//! `watch` receiver returned by `subscribe()`.

pub mod cart;
pub mod checkout;
pub mod connector;
pub mod dispatcher;
pub mod error;
pub mod order;
pub mod service;

pub use cart::{Cart, CartStore};
pub use checkout::Checkout;
pub use connector::PushHandler;
pub use dispatcher::{DispatchOutcome, DispatchStats, Dispatcher, DropReason};
pub use error::{CartError, CheckoutError, ServiceError};
pub use order::{ApplyOutcome, FetchCanceller, Order, OrderStore, OrderTable, PendingFetch, SnapshotReport};
pub use service::{CartService, OrderService, PaymentService};

pub use storefront_proto as proto;
