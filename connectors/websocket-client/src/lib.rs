//! # Storefront WebSocket client
//!
//! A native WebSocket channel that delivers pushed order updates to a single consumer.
//!
//! ## Automatic reconnection
//!
//!  Reconnects when the connection drops, using exponential backoff with jitter, capped at a
//!  maximum interval. Retries forever unless [`ChannelConfig::max_retries`] bounds them.
//!
//! ## Delivery
//!
//!  At most once, with gaps: frames pushed while the channel is down are never replayed. Consumers
//!  heal the gap by fetching a fresh snapshot after a reconnect (see [`SyncChannel::opened_count`]).
//!
//! ## Basic Usage
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! # use storefront_core::{Dispatcher, OrderStore};
//! # use storefront_websocket_client::{ChannelConfig, Endpoint, SyncChannel};
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let orders = OrderStore::new();
//!     let endpoint = Endpoint::all_orders("http://localhost:8000")?;
//!
//!     let channel = SyncChannel::open(endpoint, ChannelConfig::default())?;
//!     let _subscription = channel.subscribe(Arc::new(Dispatcher::new(orders.clone())))?;
//!     channel.wait_open().await?;
//!
//!     // ... orders now follow pushed status updates
//!
//!     channel.close().await;
//!     Ok(())
//! }
//! ```

pub mod backoff;
pub mod channel;
pub mod config;
pub mod endpoint;
pub mod sender;

pub use backoff::{Backoff, Jitter};
pub use channel::{ChannelError, ChannelSubscription, ConnectionError, ConnectionState, SyncChannel};
pub use config::ChannelConfig;
pub use endpoint::Endpoint;
pub use sender::{ChannelSender, SendError};

pub use tokio_tungstenite::tungstenite::Error as TungsteniteError;
