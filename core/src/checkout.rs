use std::sync::Arc;

use storefront_proto::{OrderId, PaymentDetails};
use tracing::{info, warn};

use crate::{
    cart::CartStore,
    error::CheckoutError,
    order::OrderStore,
    service::{OrderService, PaymentService},
};

/// Turns the current cart into an order: charge, create the order, then clear the cart.
pub struct Checkout {
    cart: CartStore,
    orders: OrderStore,
    payments: Arc<dyn PaymentService>,
    order_service: Arc<dyn OrderService>,
}

impl Checkout {
    pub fn new(cart: CartStore, orders: OrderStore, payments: Arc<dyn PaymentService>, order_service: Arc<dyn OrderService>) -> Self {
        Self { cart, orders, payments, order_service }
    }

    /// The cart is only cleared once the order exists. A failed payment or order creation leaves
    /// it exactly as it was. Cart mutations are refused for as long as the checkout runs.
    pub async fn run(&self, details: &PaymentDetails) -> Result<OrderId, CheckoutError> {
        let _lock = self.cart.lock_for_checkout()?;
        let cart = self.cart.snapshot();
        if cart.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }

        info!("checking out {} line(s), total {}", cart.len(), cart.total());
        self.payments.charge(details).await.map_err(|e| {
            warn!("payment failed: {}", e);
            CheckoutError::Payment(e)
        })?;

        let created = self.order_service.create_order().await.map_err(|e| {
            warn!("order creation failed after payment: {}", e);
            CheckoutError::OrderCreation(e)
        })?;

        self.orders.record_created(created.id.clone());
        self.cart.clear();
        info!("order {} created", created.id);
        Ok(created.id)
    }
}
