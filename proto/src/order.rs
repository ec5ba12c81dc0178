use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::id::OrderId;

/// Lifecycle status of an order as reported by the order service.
///
/// Transitions are not guaranteed to move forward; the declaration order is only used as a
/// deterministic tie-breaker between two updates that carry the same version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, strum::Display, strum::EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Paid,
    Shipped,
    Delivered,
    Cancelled,
}

/// Recency key of an order state: version first, status rank on ties.
///
/// Comparing these keys gives a total order over updates, so applying a set of updates in any
/// order and keeping the greatest always ends in the same state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Recency {
    pub version: u64,
    pub status: OrderStatus,
}

impl Ord for Recency {
    fn cmp(&self, other: &Self) -> Ordering { self.version.cmp(&other.version).then(self.status.cmp(&other.status)) }
}

impl PartialOrd for Recency {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> { Some(self.cmp(other)) }
}

/// One row of `GET /orders`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub id: OrderId,
    pub status: OrderStatus,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Services that do not version their rows report 0, which every pushed event supersedes.
    #[serde(default)]
    pub version: u64,
}

impl OrderRecord {
    pub fn recency(&self) -> Recency { Recency { version: self.version, status: self.status } }
}

/// Body of a successful `POST /orders`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedOrder {
    pub id: OrderId,
}
