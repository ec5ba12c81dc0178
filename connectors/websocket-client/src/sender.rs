use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum SendError {
    #[error("channel is not open")]
    NotConnected,
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Slot holding the outbound queue of the current connection, empty while disconnected
pub(crate) type OutboundSlot = Arc<Mutex<Option<mpsc::UnboundedSender<String>>>>;

/// Outbound half of a [`SyncChannel`](crate::SyncChannel).
///
/// Frames go only to the connection that is open right now; nothing is buffered across
/// reconnects.
#[derive(Clone)]
pub struct ChannelSender {
    slot: OutboundSlot,
    url: String,
}

impl ChannelSender {
    pub(crate) fn new(slot: OutboundSlot, url: String) -> Self { Self { slot, url } }

    pub fn send(&self, text: impl Into<String>) -> Result<(), SendError> {
        let slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = slot.as_ref() else {
            debug!("not sending to {}: channel is not open", self.url);
            return Err(SendError::NotConnected);
        };
        tx.send(text.into()).map_err(|_| {
            warn!("failed to queue message for {} - connection closed", self.url);
            SendError::NotConnected
        })
    }

    pub fn send_json<T: Serialize>(&self, message: &T) -> Result<(), SendError> { self.send(serde_json::to_string(message)?) }

    pub fn is_connected(&self) -> bool { self.slot.lock().unwrap_or_else(PoisonError::into_inner).is_some() }
}
