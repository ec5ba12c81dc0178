use anyhow::Result;
use common::*;
use std::{sync::atomic::Ordering, time::Duration};
use storefront::{ChannelError, ConnectionState, Session, SessionConfig};
use storefront_proto::{OrderStatus, PaymentDetails};

fn config(server: &TestPushServer) -> SessionConfig {
    SessionConfig::new("http://127.0.0.1:9", &server.base)
        .with_resync_interval(None)
        .with_channel(fast_channel_config().with_backoff(Duration::from_millis(300), Duration::from_millis(300)))
}

/// Channel drops, an event is pushed during the gap, and the snapshot after reconnect recovers it
#[tokio::test]
async fn test_snapshot_after_reconnect_heals_gap() -> Result<()> {
    let server = TestPushServer::start().await;
    let api = MockApi::new();
    api.set_orders(vec![record(1, OrderStatus::Pending, 1)]);

    let session = Session::start(config(&server), api.clone()).await?;
    session.wait_open().await?;
    server.wait_for_live(1).await;
    let mut orders = session.orders().subscribe();
    eventually(&mut orders, |table| table.status_of(&oid(1)) == Some(OrderStatus::Pending)).await;

    server.push(frame(1, OrderStatus::Paid, 2));
    eventually(&mut orders, |table| table.status_of(&oid(1)) == Some(OrderStatus::Paid)).await;

    let mut state = session.channel_state();
    server.drop_connections();
    server.wait_for_live(0).await;
    // the order service has moved on, but the event announcing it reaches nobody
    api.set_orders(vec![record(1, OrderStatus::Shipped, 3)]);
    server.push(frame(1, OrderStatus::Shipped, 3));
    let fetches = api.order_fetches.load(Ordering::SeqCst);

    eventually(&mut state, |state| !matches!(state, ConnectionState::Open { .. })).await;
    eventually(&mut state, |state| matches!(state, ConnectionState::Open { .. })).await;
    eventually(&mut orders, |table| table.status_of(&oid(1)) == Some(OrderStatus::Shipped)).await;

    assert!(api.order_fetches.load(Ordering::SeqCst) > fetches);
    // only the paid event arrived over the channel
    assert_eq!(session.dispatch_stats().applied, 1);
    let order = session.orders().get(&oid(1)).unwrap();
    assert_eq!(order.version, 3);
    assert!(!order.is_placeholder());

    session.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_shutdown_discards_inflight_snapshot() -> Result<()> {
    let server = TestPushServer::start().await;
    let api = MockApi::new();
    api.set_orders(vec![record(1, OrderStatus::Paid, 1)]);
    let gate = api.hold_orders();

    let session = Session::start(config(&server), api.clone()).await?;
    let orders = session.orders().clone();
    session.wait_open().await?;

    tokio::time::timeout(Duration::from_secs(2), session.shutdown()).await?;
    gate.add_permits(10);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(orders.is_empty());
    assert_eq!(api.order_fetches.load(Ordering::SeqCst), 0);
    server.wait_for_live(0).await;
    Ok(())
}

#[tokio::test]
async fn test_cancelled_fetch_does_not_block_refresh() -> Result<()> {
    let server = TestPushServer::start().await;
    let api = MockApi::new();
    let session = Session::start(config(&server), api.clone()).await?;
    let orders = session.orders().clone();

    // a snapshot request started by the session, overtaken by cancellation
    let fetch = orders.begin_fetch();
    orders.cancel_fetches();
    assert_eq!(fetch.complete(vec![record(5, OrderStatus::Paid, 1)]), None);

    api.set_orders(vec![record(5, OrderStatus::Paid, 1)]);
    assert!(session.refresh_orders().await.is_some());
    assert_eq!(orders.snapshot().status_of(&oid(5)), Some(OrderStatus::Paid));

    session.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_periodic_resync() -> Result<()> {
    let server = TestPushServer::start().await;
    let api = MockApi::new();
    let config = config(&server).with_resync_interval(Some(Duration::from_millis(100)));

    let session = Session::start(config, api.clone()).await?;
    session.wait_open().await?;
    // initial load, the first open, then interval ticks
    wait_until(|| api.order_fetches.load(Ordering::SeqCst) >= 4).await;

    session.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_watch_order_scopes_to_one_order() -> Result<()> {
    let server = TestPushServer::start().await;
    let api = MockApi::new();
    let session = Session::start(config(&server), api.clone()).await?;
    session.wait_open().await?;

    let watch = session.watch_order(&oid(9))?;
    assert!(watch.channel().url().ends_with("/ws/orders/9"));
    assert!(matches!(session.watch_order(&oid(9)), Err(ChannelError::AlreadyOpen(_))));
    watch.channel().wait_open().await?;
    server.wait_for_live(2).await;

    // the test server broadcasts to both channels
    server.push(frame(8, OrderStatus::Paid, 1));
    server.push(frame(9, OrderStatus::Shipped, 2));
    let mut orders = session.orders().subscribe();
    eventually(&mut orders, |table| table.len() == 2).await;
    wait_until(|| watch.dispatch_stats().dropped == 1).await;
    assert_eq!(session.orders().snapshot().status_of(&oid(9)), Some(OrderStatus::Shipped));

    watch.close().await;
    let again = session.watch_order(&oid(9))?;
    again.close().await;

    session.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_checkout_through_session() -> Result<()> {
    let server = TestPushServer::start().await;
    let api = MockApi::new();
    *api.cart_contents.lock().unwrap() = vec![item("A", 1250).with_quantity(2)];
    let session = Session::start(config(&server), api.clone()).await?;

    let cart = session.load_cart().await?;
    assert_eq!(cart.total().minor(), 2500);

    let id = session.checkout(&PaymentDetails { zip: "94110".into(), ..Default::default() }).await?;
    assert!(session.cart().snapshot().is_empty());
    assert_eq!(session.orders().get(&id).map(|order| order.status), Some(OrderStatus::Pending));

    // its first status event moves the new order on
    session.wait_open().await?;
    server.wait_for_live(1).await;
    server.push(frame(100, OrderStatus::Paid, 1));
    let mut orders = session.orders().subscribe();
    eventually(&mut orders, |table| table.status_of(&id) == Some(OrderStatus::Paid)).await;

    session.shutdown().await;
    Ok(())
}
