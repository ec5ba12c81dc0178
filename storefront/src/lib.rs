//! Order and cart synchronization for storefront clients.
//!
//! [`Session`] wires the pieces together for a client session: the shared [`OrderStore`] and
//! [`CartStore`], the all-orders push channel with its [`Dispatcher`], and a background task that
//! re-fetches the order snapshot after every reconnect and on a fixed interval, healing whatever
//! the channel missed while it was down.

mod config;
mod session;

pub use config::SessionConfig;
pub use session::{OrderWatch, Session};

pub use storefront_core::{
    ApplyOutcome, Cart, CartError, CartService, CartStore, Checkout, CheckoutError, DispatchOutcome, DispatchStats, Dispatcher,
    DropReason, FetchCanceller, Order, OrderService, OrderStore, OrderTable, PaymentService, PendingFetch, PushHandler,
    ServiceError, SnapshotReport,
};
pub use storefront_http_client::{HttpClient, HttpConfig};
pub use storefront_proto as proto;
pub use storefront_websocket_client::{
    Backoff, ChannelConfig, ChannelError, ChannelSender, ConnectionError, ConnectionState, Endpoint, Jitter, SendError, SyncChannel,
};
