use serde::{Deserialize, Serialize};

use crate::{id::ItemId, money::Money};

/// A line in the cart
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub id: ItemId,
    pub name: String,
    pub price: Money,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

fn default_quantity() -> u32 { 1 }

impl CartItem {
    pub fn new(id: ItemId, name: impl Into<String>, price: Money) -> Self { Self { id, name: name.into(), price, quantity: 1 } }

    pub fn with_quantity(mut self, quantity: u32) -> Self {
        self.quantity = quantity;
        self
    }

    pub fn subtotal(&self) -> Money { self.price.times(self.quantity) }
}

/// Body of `GET /cart`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartContents {
    #[serde(default)]
    pub items: Vec<CartItem>,
}
