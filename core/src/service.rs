//! Boundaries to the external REST services.
//!
//! The core never speaks HTTP itself; a connector crate implements these traits against the real
//! endpoints and tests substitute scripted doubles.

use async_trait::async_trait;
use storefront_proto::{AddToCart, CartItem, CreatedOrder, ItemId, OrderRecord, PaymentDetails};

use crate::error::ServiceError;

#[async_trait]
pub trait CartService: Send + Sync {
    /// `POST /cart/add`
    async fn add_item(&self, request: &AddToCart) -> Result<(), ServiceError>;
    /// `PUT /cart/items/{id}`
    async fn update_quantity(&self, id: &ItemId, quantity: u32) -> Result<(), ServiceError>;
    /// `DELETE /cart/items/{id}`
    async fn remove_item(&self, id: &ItemId) -> Result<(), ServiceError>;
    /// `GET /cart`
    async fn fetch_cart(&self) -> Result<Vec<CartItem>, ServiceError>;
}

#[async_trait]
pub trait OrderService: Send + Sync {
    /// `GET /orders`
    async fn fetch_orders(&self) -> Result<Vec<OrderRecord>, ServiceError>;
    /// `POST /orders`
    async fn create_order(&self) -> Result<CreatedOrder, ServiceError>;
}

#[async_trait]
pub trait PaymentService: Send + Sync {
    /// `POST /payment/charge`
    async fn charge(&self, details: &PaymentDetails) -> Result<(), ServiceError>;
}
