use serde::{Deserialize, Serialize};

use crate::id::ItemId;

/// Body of `POST /cart/add`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddToCart {
    pub product_id: ItemId,
    pub quantity: u32,
}

/// Body of `PUT /cart/items/{id}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateQuantity {
    pub quantity: u32,
}

/// Shipping/billing form forwarded verbatim to `POST /payment/charge`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentDetails {
    pub first_name: String,
    pub last_name: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip: String,
}
