use anyhow::Result;
use common::*;
use itertools::Itertools;
use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};
use std::collections::BTreeMap;
use storefront_core::{ApplyOutcome, OrderStore, SnapshotReport};
use storefront_proto::{OrderEvent, OrderStatus};

/// Snapshot `[{id:1, pending, v1}]` then event `{1, shipped, v5}`: the event wins
#[tokio::test]
async fn test_event_after_snapshot_wins() -> Result<()> {
    let orders = OrderStore::new();
    orders.load_snapshot(vec![record(1, OrderStatus::Pending, 1)]);

    assert_eq!(orders.apply_event(&event(1, OrderStatus::Shipped, 5)), ApplyOutcome::Applied);
    assert_eq!(orders.snapshot().status_of(&oid(1)), Some(OrderStatus::Shipped));
    Ok(())
}

/// Event `{2, paid, v3}` before any snapshot, then a snapshot carrying `{2, pending, v1}`: status stays paid
#[tokio::test]
async fn test_older_snapshot_does_not_regress_event() -> Result<()> {
    let orders = OrderStore::new();
    assert_eq!(orders.apply_event(&event(2, OrderStatus::Paid, 3)), ApplyOutcome::Created);
    assert!(orders.get(&oid(2)).unwrap().is_placeholder());

    let report = orders.load_snapshot(vec![record(2, OrderStatus::Pending, 1)]);
    assert_eq!(report, SnapshotReport { inserted: 0, updated: 1, unchanged: 0 });

    let order = orders.get(&oid(2)).unwrap();
    assert_eq!(order.status, OrderStatus::Paid);
    assert_eq!(order.version, 3);
    // the snapshot still fills in what the event could not carry
    assert!(!order.is_placeholder());
    Ok(())
}

fn event_set() -> Vec<OrderEvent> {
    vec![
        event(1, OrderStatus::Pending, 1),
        event(1, OrderStatus::Paid, 2),
        event(1, OrderStatus::Shipped, 4),
        event(2, OrderStatus::Paid, 3),
        event(2, OrderStatus::Cancelled, 7),
        event(3, OrderStatus::Delivered, 9),
    ]
}

fn expected_final(events: &[OrderEvent]) -> BTreeMap<String, OrderStatus> {
    let mut latest: BTreeMap<String, &OrderEvent> = BTreeMap::new();
    for event in events {
        let entry = latest.entry(event.order_id.to_string()).or_insert(event);
        if event.recency() > entry.recency() {
            *entry = event;
        }
    }
    latest.into_iter().map(|(id, event)| (id, event.status)).collect()
}

fn final_statuses(orders: &OrderStore) -> BTreeMap<String, OrderStatus> {
    orders.snapshot().iter().map(|order| (order.id.to_string(), order.status)).collect()
}

#[tokio::test]
async fn test_convergence_over_all_permutations() -> Result<()> {
    let events = event_set();
    let expected = expected_final(&events);

    for permutation in events.iter().permutations(events.len()) {
        let orders = OrderStore::new();
        for event in permutation {
            orders.apply_event(event);
        }
        assert_eq!(final_statuses(&orders), expected);
    }
    Ok(())
}

#[tokio::test]
async fn test_convergence_with_shuffled_events_and_snapshots() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let statuses = [OrderStatus::Pending, OrderStatus::Paid, OrderStatus::Shipped, OrderStatus::Delivered, OrderStatus::Cancelled];

    for _ in 0..200 {
        let mut events: Vec<OrderEvent> = (0..24)
            .map(|_| {
                let status = *statuses.choose(&mut rng).unwrap();
                event(rng.gen_range(1..=5), status, rng.gen_range(1..=10))
            })
            .collect();
        let expected = expected_final(&events);

        events.shuffle(&mut rng);
        let orders = OrderStore::new();
        for (i, event) in events.iter().enumerate() {
            orders.apply_event(event);
            // interleave a stale snapshot; it may never move an order backwards
            if i % 7 == 0 {
                orders.load_snapshot(vec![record(1, OrderStatus::Pending, 0), record(4, OrderStatus::Pending, 0)]);
            }
        }
        let mut actual = final_statuses(&orders);
        for id in ["1", "4"] {
            if !expected.contains_key(id) {
                actual.remove(id);
            }
        }
        assert_eq!(actual, expected);
    }
    Ok(())
}

#[tokio::test]
async fn test_equal_versions_resolve_by_status_rank() -> Result<()> {
    let forward = OrderStore::new();
    forward.apply_event(&event(1, OrderStatus::Paid, 5));
    forward.apply_event(&event(1, OrderStatus::Shipped, 5));

    let backward = OrderStore::new();
    backward.apply_event(&event(1, OrderStatus::Shipped, 5));
    assert_eq!(backward.apply_event(&event(1, OrderStatus::Paid, 5)), ApplyOutcome::Stale);

    assert_eq!(forward.snapshot(), backward.snapshot());
    assert_eq!(forward.snapshot().status_of(&oid(1)), Some(OrderStatus::Shipped));
    Ok(())
}

#[tokio::test]
async fn test_duplicate_event_is_idempotent() -> Result<()> {
    let orders = OrderStore::new();
    let shipped = event(7, OrderStatus::Shipped, 4);

    orders.apply_event(&shipped);
    let once = orders.snapshot();
    assert_eq!(orders.apply_event(&shipped), ApplyOutcome::Stale);
    assert_eq!(orders.snapshot(), once);
    Ok(())
}

#[tokio::test]
async fn test_stale_event_does_not_notify() -> Result<()> {
    let orders = OrderStore::new();
    orders.apply_event(&event(1, OrderStatus::Shipped, 4));
    let mut rx = orders.subscribe();
    rx.mark_unchanged();

    orders.apply_event(&event(1, OrderStatus::Paid, 2));
    assert!(!rx.has_changed()?);

    orders.apply_event(&event(1, OrderStatus::Delivered, 6));
    assert!(rx.has_changed()?);
    assert_eq!(rx.borrow_and_update().status_of(&oid(1)), Some(OrderStatus::Delivered));
    Ok(())
}

#[tokio::test]
async fn test_snapshots_are_immutable() -> Result<()> {
    let orders = OrderStore::new();
    orders.apply_event(&event(1, OrderStatus::Paid, 1));
    let before = orders.snapshot();

    orders.apply_event(&event(1, OrderStatus::Shipped, 2));
    orders.apply_event(&event(2, OrderStatus::Paid, 1));

    assert_eq!(before.len(), 1);
    assert_eq!(before.status_of(&oid(1)), Some(OrderStatus::Paid));
    assert_eq!(orders.snapshot().len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_snapshot_inserts_and_reports() -> Result<()> {
    let orders = OrderStore::new();
    let report = orders.load_snapshot(vec![record(1, OrderStatus::Pending, 1), record(2, OrderStatus::Paid, 2)]);
    assert_eq!(report, SnapshotReport { inserted: 2, updated: 0, unchanged: 0 });

    // same rows again: nothing to do
    let report = orders.load_snapshot(vec![record(1, OrderStatus::Pending, 1), record(2, OrderStatus::Paid, 2)]);
    assert_eq!(report, SnapshotReport { inserted: 0, updated: 0, unchanged: 2 });

    let report = orders.load_snapshot(vec![record(1, OrderStatus::Shipped, 3)]);
    assert_eq!(report, SnapshotReport { inserted: 0, updated: 1, unchanged: 0 });
    assert_eq!(orders.snapshot().status_of(&oid(1)), Some(OrderStatus::Shipped));
    // orders absent from a snapshot are kept
    assert_eq!(orders.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_record_created_is_pending_placeholder() -> Result<()> {
    let orders = OrderStore::new();
    assert!(orders.record_created(oid(100)));
    assert!(!orders.record_created(oid(100)));

    let order = orders.get(&oid(100)).unwrap();
    assert_eq!(order.status, OrderStatus::Pending);
    assert!(order.is_placeholder());

    // the first pushed event for the new order moves it on
    assert_eq!(orders.apply_event(&event(100, OrderStatus::Paid, 1)), ApplyOutcome::Applied);
    Ok(())
}

#[tokio::test]
async fn test_record_created_keeps_known_order() -> Result<()> {
    let orders = OrderStore::new();
    orders.apply_event(&event(100, OrderStatus::Paid, 2));
    assert!(!orders.record_created(oid(100)));
    assert_eq!(orders.snapshot().status_of(&oid(100)), Some(OrderStatus::Paid));
    Ok(())
}

#[tokio::test]
async fn test_cancelled_fetch_is_discarded() -> Result<()> {
    let orders = OrderStore::new();
    let fetch = orders.begin_fetch();
    let canceller = fetch.canceller();

    canceller.cancel();
    assert!(fetch.is_cancelled());
    assert_eq!(fetch.complete(vec![record(1, OrderStatus::Paid, 1)]), None);
    assert!(orders.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_cancel_fetches_invalidates_outstanding_requests() -> Result<()> {
    let orders = OrderStore::new();
    let before = orders.begin_fetch();
    orders.cancel_fetches();
    let after = orders.begin_fetch();

    assert_eq!(before.complete(vec![record(1, OrderStatus::Paid, 1)]), None);
    assert_eq!(after.complete(vec![record(2, OrderStatus::Paid, 1)]), Some(SnapshotReport { inserted: 1, updated: 0, unchanged: 0 }));
    assert!(orders.get(&oid(1)).is_none());
    assert!(orders.get(&oid(2)).is_some());
    Ok(())
}
