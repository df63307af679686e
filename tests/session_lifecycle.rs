use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::watch;
use tokio::time::timeout;

use farmsync_lib::auth::IdentityGate;
use farmsync_lib::model::FarmData;
use farmsync_lib::store::{collections, Document, FarmStore, MemoryStore, StreamKey};
use farmsync_lib::sync::{spawn_session, SessionHandle};

fn doc(value: serde_json::Value) -> Document {
    value.as_object().expect("object literal").clone()
}

fn start_session(store: &MemoryStore) -> (IdentityGate, SessionHandle) {
    let gate = IdentityGate::new();
    let session = spawn_session(Arc::new(store.clone()), gate.subscribe());
    (gate, session)
}

/// Wait until the merged state satisfies `pred`, or panic after a second.
async fn settle<F>(rx: &mut watch::Receiver<FarmData>, pred: F) -> FarmData
where
    F: Fn(&FarmData) -> bool,
{
    loop {
        let current = rx.borrow_and_update().clone();
        if pred(&current) {
            return current;
        }
        timeout(Duration::from_secs(1), rx.changed())
            .await
            .expect("aggregate state settled in time")
            .expect("session alive");
    }
}

async fn settle_subscriptions(store: &MemoryStore, expected: usize) {
    for _ in 0..100 {
        if store.open_subscriptions() == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "open subscriptions stuck at {} (expected {expected})",
        store.open_subscriptions()
    );
}

#[tokio::test]
async fn sign_in_populates_only_the_delivered_slices() {
    let store = MemoryStore::new();
    store
        .add_doc(
            "u1",
            collections::INVENTORY,
            doc(json!({ "item": "Layer Mash", "stock": 40, "low_stock_threshold": 20 })),
        )
        .await
        .unwrap();

    let (gate, session) = start_session(&store);
    gate.sign_in("u1");

    let mut rx = session.data();
    let data = settle(&mut rx, |d| !d.inventory.is_empty()).await;

    assert_eq!(data.inventory.len(), 1);
    assert_eq!(data.inventory[0].item, "Layer Mash");
    assert_eq!(data.inventory[0].stock, 40);

    // Every other slice is still at its default.
    assert_eq!(data.stats, Default::default());
    assert_eq!(data.daily_summary, Default::default());
    assert!(data.batches.is_empty());
    assert!(data.logs.is_empty());
    assert!(data.expenses.is_empty());
    assert!(data.sales.is_empty());
    assert!(data.notifications.is_empty());

    session.shutdown().await;
}

#[tokio::test]
async fn one_subscription_opens_per_stream() {
    let store = MemoryStore::new();
    let (gate, session) = start_session(&store);

    gate.sign_in("u1");
    settle_subscriptions(&store, StreamKey::ALL.len()).await;

    session.shutdown().await;
    assert_eq!(store.open_subscriptions(), 0);
}

#[tokio::test]
async fn sign_out_resets_state_and_closes_every_subscription() {
    let store = MemoryStore::new();
    store
        .add_doc("u1", collections::EXPENSES, doc(json!({ "category": "Feed", "amount": 100.0 })))
        .await
        .unwrap();

    let (gate, session) = start_session(&store);
    gate.sign_in("u1");

    let mut rx = session.data();
    settle(&mut rx, |d| !d.expenses.is_empty()).await;

    gate.sign_out();
    let data = settle(&mut rx, |d| d.expenses.is_empty()).await;

    assert_eq!(data, FarmData::default());
    settle_subscriptions(&store, 0).await;

    session.shutdown().await;
}

#[tokio::test]
async fn identity_switch_discards_previous_users_data() {
    let store = MemoryStore::new();
    store
        .add_doc("u1", collections::SALES, doc(json!({ "item": "Crates", "amount": 900.0 })))
        .await
        .unwrap();
    store
        .add_doc("u2", collections::SALES, doc(json!({ "item": "Broilers", "amount": 50.0 })))
        .await
        .unwrap();

    let (gate, session) = start_session(&store);
    gate.sign_in("u1");

    let mut rx = session.data();
    settle(&mut rx, |d| !d.sales.is_empty()).await;

    gate.sign_in("u2");
    let data = settle(&mut rx, |d| {
        d.sales.len() == 1 && d.sales[0].item == "Broilers"
    })
    .await;
    assert_eq!(data.sales[0].amount, 50.0);

    // Exactly one set of streams is open, all owned by u2.
    settle_subscriptions(&store, StreamKey::ALL.len()).await;

    session.shutdown().await;
}

#[tokio::test]
async fn rapid_transitions_settle_on_the_last_identity() {
    let store = MemoryStore::new();
    store
        .add_doc("u2", collections::BATCHES, doc(json!({ "id": "B-2", "breed": "Leghorn" })))
        .await
        .unwrap();

    let (gate, session) = start_session(&store);
    gate.sign_in("u1");
    gate.sign_out();
    gate.sign_in("u2");

    let mut rx = session.data();
    let data = settle(&mut rx, |d| !d.batches.is_empty()).await;
    assert_eq!(data.batches[0].breed, "Leghorn");

    settle_subscriptions(&store, StreamKey::ALL.len()).await;
    session.shutdown().await;
}

#[tokio::test]
async fn denied_stream_degrades_only_its_own_slice() {
    let store = MemoryStore::new();
    store.deny_stream("u1", StreamKey::Inventory);
    store
        .add_doc("u1", collections::INVENTORY, doc(json!({ "item": "Grit" })))
        .await
        .unwrap();
    store
        .add_doc("u1", collections::BATCHES, doc(json!({ "id": "B-1", "breed": "Isa Brown" })))
        .await
        .unwrap();

    let (gate, session) = start_session(&store);
    gate.sign_in("u1");

    let mut rx = session.data();
    let data = settle(&mut rx, |d| !d.batches.is_empty()).await;

    // The denied category stays at its default; everything else works.
    assert!(data.inventory.is_empty());
    assert_eq!(store.open_subscriptions(), StreamKey::ALL.len() - 1);

    session.shutdown().await;
}

#[tokio::test]
async fn delivery_errors_retain_last_known_good_data() {
    let store = MemoryStore::new();
    let (gate, session) = start_session(&store);
    gate.sign_in("u1");

    store
        .add_doc("u1", collections::INVENTORY, doc(json!({ "item": "Layer Mash" })))
        .await
        .unwrap();

    let mut rx = session.data();
    settle(&mut rx, |d| !d.inventory.is_empty()).await;

    store.emit_stream_error("u1", StreamKey::Inventory, "backend unavailable");
    tokio::time::sleep(Duration::from_millis(50)).await;

    let data = session.snapshot();
    assert_eq!(data.inventory.len(), 1);
    assert_eq!(store.open_subscriptions(), StreamKey::ALL.len());

    session.shutdown().await;
}

#[tokio::test]
async fn malformed_listing_elements_are_skipped_not_propagated() {
    let store = MemoryStore::new();
    store
        .add_doc("u1", collections::BATCHES, doc(json!({ "id": "B-1", "breed": "Isa Brown" })))
        .await
        .unwrap();
    // Missing the required `breed` field.
    store
        .add_doc("u1", collections::BATCHES, doc(json!({ "quantity": "not-a-number" })))
        .await
        .unwrap();

    let (gate, session) = start_session(&store);
    gate.sign_in("u1");

    let mut rx = session.data();
    let data = settle(&mut rx, |d| !d.batches.is_empty()).await;
    assert_eq!(data.batches.len(), 1);
    assert_eq!(data.batches[0].breed, "Isa Brown");

    session.shutdown().await;
}

#[tokio::test]
async fn shutdown_while_signed_in_closes_everything() {
    let store = MemoryStore::new();
    let (gate, session) = start_session(&store);
    gate.sign_in("u1");
    settle_subscriptions(&store, StreamKey::ALL.len()).await;

    session.shutdown().await;
    assert_eq!(store.open_subscriptions(), 0);
}
