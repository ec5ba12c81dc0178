use anyhow::Result;
use common::*;
use std::sync::{atomic::Ordering, Arc};
use storefront_core::{CartError, CartStore, Checkout, CheckoutError, OrderStore, ServiceError};
use storefront_proto::{OrderStatus, PaymentDetails};

fn details() -> PaymentDetails {
    PaymentDetails {
        first_name: "Ada".into(),
        last_name: "Lovelace".into(),
        address: "12 Analytical Row".into(),
        city: "London".into(),
        state: "LDN".into(),
        zip: "10001".into(),
    }
}

struct Fixture {
    api: Arc<MockApi>,
    cart: CartStore,
    orders: OrderStore,
    checkout: Checkout,
}

fn fixture() -> Fixture {
    let api = MockApi::new();
    let cart = CartStore::new(api.clone());
    let orders = OrderStore::new();
    let checkout = Checkout::new(cart.clone(), orders.clone(), api.clone(), api.clone());
    Fixture { api, cart, orders, checkout }
}

#[tokio::test]
async fn test_checkout_creates_order_and_clears_cart() -> Result<()> {
    let f = fixture();
    f.cart.add(item("A", 1999)).await?;
    f.cart.add(item("B", 500).with_quantity(2)).await?;

    let id = f.checkout.run(&details()).await?;

    assert_eq!(id, oid(100));
    assert!(f.cart.snapshot().is_empty());
    let order = f.orders.get(&id).unwrap();
    assert_eq!(order.status, OrderStatus::Pending);
    assert!(order.is_placeholder());
    assert_eq!(f.api.charges.lock().unwrap().len(), 1);

    // the next snapshot completes the placeholder
    f.orders.load_snapshot(vec![record(100, OrderStatus::Paid, 1)]);
    assert!(!f.orders.get(&id).unwrap().is_placeholder());
    Ok(())
}

#[tokio::test]
async fn test_empty_cart_is_refused() -> Result<()> {
    let f = fixture();
    assert_eq!(f.checkout.run(&details()).await, Err(CheckoutError::EmptyCart));
    assert!(f.api.charges.lock().unwrap().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_checkout_waits_for_confirmations() -> Result<()> {
    let f = fixture();
    let gate = f.api.hold_cart();
    let add = tokio::spawn({
        let cart = f.cart.clone();
        async move { cart.add(item("A", 10)).await }
    });
    wait_until(|| f.cart.pending() == 1).await;

    assert_eq!(f.checkout.run(&details()).await, Err(CheckoutError::CartBusy(1)));
    gate.add_permits(1);
    add.await??;
    assert!(f.checkout.run(&details()).await.is_ok());
    Ok(())
}

#[tokio::test]
async fn test_declined_payment_leaves_cart() -> Result<()> {
    let f = fixture();
    f.cart.add(item("A", 10)).await?;
    let before = f.cart.snapshot();
    f.api.fail_payment.store(true, Ordering::SeqCst);

    let err = f.checkout.run(&details()).await.unwrap_err();
    assert_eq!(err, CheckoutError::Payment(ServiceError::Rejected { status: 402, reason: "card declined".into() }));
    assert_eq!(f.cart.snapshot(), before);
    assert!(f.orders.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_failed_order_creation_leaves_cart() -> Result<()> {
    let f = fixture();
    f.cart.add(item("A", 10)).await?;
    f.api.fail_order_creation.store(true, Ordering::SeqCst);

    let err = f.checkout.run(&details()).await.unwrap_err();
    assert!(matches!(err, CheckoutError::OrderCreation(ServiceError::Unavailable(_))));
    assert!(err.to_string().starts_with("order creation failed"));
    assert_eq!(f.cart.snapshot().len(), 1);
    assert!(f.orders.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_cart_changes_refused_while_checkout_runs() -> Result<()> {
    let f = fixture();
    f.cart.add(item("A", 10)).await?;

    let payment = f.api.hold_payment();
    let checkout = tokio::spawn({
        let (cart, orders, api) = (f.cart.clone(), f.orders.clone(), f.api.clone());
        async move {
            let checkout = Checkout::new(cart, orders, api.clone(), api);
            checkout.run(&details()).await
        }
    });
    wait_until(|| f.api.charge_attempts.load(Ordering::SeqCst) == 1).await;
    assert!(f.cart.checking_out());

    assert_eq!(f.cart.update_quantity(&iid("A"), 5).await, Err(CartError::CheckoutInProgress(iid("A"))));
    assert_eq!(f.cart.add(item("B", 3)).await, Err(CartError::CheckoutInProgress(iid("B"))));
    assert_eq!(f.cart.get(&iid("A")).unwrap().quantity, 1);
    assert_eq!(f.cart.pending(), 0);

    // a second checkout cannot start alongside
    assert_eq!(f.checkout.run(&details()).await, Err(CheckoutError::InProgress));

    payment.add_permits(1);
    let id = checkout.await??;
    assert!(f.cart.snapshot().is_empty());
    assert!(!f.cart.checking_out());
    assert!(!f.api.calls().iter().any(|call| matches!(call, CartCall::Update(..))));
    assert!(f.orders.get(&id).is_some());

    // the cart is usable again once checkout has released it
    f.cart.add(item("C", 7)).await?;
    assert_eq!(f.cart.snapshot().len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_failed_checkout_releases_cart() -> Result<()> {
    let f = fixture();
    f.cart.add(item("A", 10)).await?;
    f.api.fail_payment.store(true, Ordering::SeqCst);

    assert!(f.checkout.run(&details()).await.is_err());
    assert!(!f.cart.checking_out());
    f.cart.update_quantity(&iid("A"), 2).await?;
    assert_eq!(f.cart.get(&iid("A")).unwrap().quantity, 2);
    Ok(())
}
