use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    error::DecodeError,
    id::OrderId,
    order::{OrderStatus, Recency},
};

/// Message types understood on the order channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
pub enum PushKind {
    #[strum(serialize = "order_status", serialize = "order-status", serialize = "order.status")]
    OrderStatus,
}

impl PushKind {
    /// The order service does not tag its frames, so an untagged frame is an order status update.
    pub const DEFAULT: PushKind = PushKind::OrderStatus;
}

/// A pushed order status change. The sender's `timestamp` doubles as the event version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderEvent {
    pub order_id: OrderId,
    pub status: OrderStatus,
    #[serde(rename = "timestamp", alias = "version", alias = "sequence")]
    pub version: u64,
}

impl OrderEvent {
    pub fn new(order_id: OrderId, status: OrderStatus, version: u64) -> Self { Self { order_id, status, version } }

    pub fn recency(&self) -> Recency { Recency { version: self.version, status: self.status } }
}

/// A validated inbound push frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushMessage {
    OrderStatus(OrderEvent),
}

impl PushMessage {
    /// Validate a raw frame against the push schema.
    pub fn decode(payload: &str) -> Result<Self, DecodeError> {
        let value: Value = serde_json::from_str(payload).map_err(DecodeError::InvalidJson)?;
        let Value::Object(fields) = &value else {
            return Err(DecodeError::NotAnObject);
        };

        let kind = match fields.get("type") {
            None | Some(Value::Null) => PushKind::DEFAULT,
            Some(Value::String(name)) => name.parse().map_err(|_| DecodeError::UnknownType(name.clone()))?,
            Some(other) => return Err(DecodeError::UnknownType(other.to_string())),
        };

        match kind {
            PushKind::OrderStatus => serde_json::from_value(value)
                .map(PushMessage::OrderStatus)
                .map_err(|source| DecodeError::Schema { kind: "order_status", source }),
        }
    }

    pub fn encode(&self) -> String {
        // an enum of plain structs with string keys cannot fail to serialize
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn kind(&self) -> PushKind {
        match self {
            PushMessage::OrderStatus(_) => PushKind::OrderStatus,
        }
    }
}

impl From<OrderEvent> for PushMessage {
    fn from(event: OrderEvent) -> Self { PushMessage::OrderStatus(event) }
}
