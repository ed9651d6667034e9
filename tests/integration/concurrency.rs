//! Hub fan-out under many subscribers and slow consumers

use std::time::Duration;

use assert_matches::assert_matches;
use chrono::Utc;
use futures::future::join_all;
use pulsewire::actors::{Broadcaster, Payload, Snapshot};

use crate::helpers::{hub_with_mailbox, next_payload, wait_for_active};

fn empty_snapshot() -> Snapshot {
    Snapshot::from_measurements(Utc::now(), std::iter::empty())
}

#[tokio::test]
async fn test_every_subscriber_gets_exactly_one_copy() {
    let hub = hub_with_mailbox(8);
    let mut subscriptions = join_all((0..25).map(|_| hub.subscribe())).await;
    wait_for_active(&hub, 25).await;

    hub.broadcast(empty_snapshot()).unwrap();

    for subscription in &mut subscriptions {
        let payload = next_payload(subscription).await;
        assert_matches!(payload.as_ref(), Payload::Snapshot(_));
        assert!(subscription.mailbox.try_recv().is_err());
    }

    let stats = hub.stats().await.unwrap();
    assert_eq!(stats.deliveries, 25);
    assert_eq!(stats.evictions, 0);
}

#[tokio::test]
async fn test_slow_subscriber_evicted_others_unaffected() {
    let hub = hub_with_mailbox(1);
    let mut slow = hub.subscribe().await;
    let mut fast = hub.subscribe().await;
    wait_for_active(&hub, 2).await;

    hub.broadcast(empty_snapshot()).unwrap();
    next_payload(&mut fast).await;

    // slow still holds the first payload, its mailbox is full
    hub.broadcast(empty_snapshot()).unwrap();
    next_payload(&mut fast).await;

    wait_for_active(&hub, 1).await;

    assert!(slow.mailbox.recv().await.is_some(), "first payload was delivered");
    assert!(slow.mailbox.recv().await.is_none(), "mailbox closed after eviction");

    let stats = hub.stats().await.unwrap();
    assert_eq!(stats.evictions, 1);
    assert_eq!(stats.active, 1);
}

#[tokio::test]
async fn test_churn_while_broadcasting() {
    let hub = hub_with_mailbox(4);

    let broadcaster = {
        let hub = hub.clone();
        tokio::spawn(async move {
            for _ in 0..200 {
                let _ = hub.broadcast(empty_snapshot());
                tokio::task::yield_now().await;
            }
        })
    };

    let subscribers: Vec<_> = (0..20)
        .map(|_| {
            let hub = hub.clone();
            tokio::spawn(async move {
                let mut subscription = hub.subscribe().await;
                let _ =
                    tokio::time::timeout(Duration::from_millis(50), subscription.mailbox.recv())
                        .await;
                hub.unregister(subscription.id).await;
                // unregister twice, must be a no-op
                hub.unregister(subscription.id).await;
            })
        })
        .collect();

    for subscriber in subscribers {
        subscriber.await.unwrap();
    }
    broadcaster.await.unwrap();

    wait_for_active(&hub, 0).await;
}
