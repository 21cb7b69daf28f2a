//! End-to-end alert behavior through the client and a fake feed.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::time::Duration;

use common::{Dial, FakeFeed, wait_for_state};
use price_feed_client::{AlertCondition, ConnectionState, FeedEvent, NewAlert, PriceFeedClient};
use rust_decimal::Decimal;
use tokio_test::{assert_pending, task};

async fn open_client(feed: &mut FakeFeed) -> PriceFeedClient {
    feed.script([Dial::Accept]);
    let client = feed.client();
    let mut states = client.events().state_changes_rx();

    client.connect().unwrap();
    wait_for_state(&mut states, ConnectionState::Open).await;
    client
}

async fn recv<T: Clone>(rx: &mut tokio::sync::broadcast::Receiver<T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

#[tokio::test]
async fn subscribes_on_open_and_on_add() {
    let mut feed = FakeFeed::new();
    feed.script([Dial::Accept]);
    let client = feed.client();

    // Added while idle: nothing is sent until the stream opens
    client.add_alert(NewAlert::above("ETH", "ethereum", Decimal::from(4_000)));
    client.add_alert(NewAlert::below("ETH", "arbitrum", Decimal::from(3_000)));
    client.connect().unwrap();

    let first = feed.next_subscribe().await;
    assert_eq!(first["apiKey"], "test-key");
    assert_eq!(first["tokens"], serde_json::json!(["ETH"]));

    client.add_alert(NewAlert::below("BTC", "bitcoin", Decimal::from(50_000)));
    let second = feed.next_subscribe().await;
    assert_eq!(second["tokens"], serde_json::json!(["BTC", "ETH"]));

    client.disconnect();
}

#[tokio::test]
async fn empty_store_still_subscribes() {
    let mut feed = FakeFeed::new();
    let client = open_client(&mut feed).await;

    let request = feed.next_subscribe().await;
    assert_eq!(request["tokens"], serde_json::json!([]));

    client.disconnect();
}

#[tokio::test]
async fn crossing_fires_once_and_alert_precedes_price() {
    let mut feed = FakeFeed::new();
    let client = open_client(&mut feed).await;
    feed.next_subscribe().await;

    client.add_alert(NewAlert::above("ETH", "ethereum", Decimal::from(100)));
    feed.next_subscribe().await;
    let mut events = client.events().events_rx();
    let mut prices = client.events().price_updates_rx();

    feed.push(r#"{"token":"ETH","network":"ethereum","price":100}"#);
    feed.push(r#"{"token":"ETH","network":"ethereum","price":150}"#);

    match recv(&mut events).await {
        FeedEvent::AlertTriggered(alert) => {
            assert_eq!(alert.condition, AlertCondition::Above);
            assert_eq!(alert.target_price, Decimal::from(100));
            assert_eq!(alert.current_price, Decimal::from(100));
        }
        other => panic!("expected alert first, got {other:?}"),
    }
    assert!(matches!(recv(&mut events).await, FeedEvent::PriceUpdate(_)));
    // Second tick: price only, no second trigger
    match recv(&mut events).await {
        FeedEvent::PriceUpdate(update) => assert_eq!(update.price, Decimal::from(150)),
        other => panic!("expected price update, got {other:?}"),
    }

    assert_eq!(recv(&mut prices).await.price, Decimal::from(100));
    assert_eq!(recv(&mut prices).await.price, Decimal::from(150));
    assert_eq!(client.alert_stats().triggered, 1);

    client.disconnect();
}

#[tokio::test]
async fn duplicate_alerts_fire_independently() {
    let mut feed = FakeFeed::new();
    let client = open_client(&mut feed).await;

    client.add_alert(NewAlert::below("SOL", "solana", Decimal::from(50)));
    client.add_alert(NewAlert::below("SOL", "solana", Decimal::from(50)));
    let mut alerts = client.events().alerts_triggered_rx();

    feed.push(r#"{"token":"SOL","network":"solana","price":49.999999}"#);

    let first = recv(&mut alerts).await;
    let second = recv(&mut alerts).await;
    assert_eq!(first.current_price, Decimal::new(49_999_999, 6));
    assert_eq!(second.current_price, first.current_price);

    client.disconnect();
}

#[tokio::test]
async fn malformed_frame_is_dropped_without_side_effects() {
    let mut feed = FakeFeed::new();
    let client = open_client(&mut feed).await;
    client.add_alert(NewAlert::above("ETH", "ethereum", Decimal::from(1)));
    let mut states = client.events().state_changes_rx();
    let mut events = client.events().events_rx();

    feed.push(r#"{"token":"ETH","network":"ethereum"}"#);
    feed.push(r#"{"token":"ETH","network":"ethereum","price":"2"}"#);
    feed.push("garbage");
    feed.push(r#"{"token":"BTC","network":"bitcoin","price":1}"#);

    // The first event is from the last, valid frame
    match recv(&mut events).await {
        FeedEvent::PriceUpdate(update) => assert_eq!(update.token, "BTC"),
        other => panic!("malformed frame produced {other:?}"),
    }

    assert_eq!(client.state(), ConnectionState::Open);
    assert!(states.try_recv().is_err());
    assert_eq!(client.alert_stats().pending, 1);
    assert_eq!(feed.dial_count(), 1);

    client.disconnect();
}

#[tokio::test]
async fn cleared_alerts_never_fire() {
    let mut feed = FakeFeed::new();
    let client = open_client(&mut feed).await;
    feed.next_subscribe().await;

    client.add_alert(NewAlert::above("ETH", "ethereum", Decimal::from(100)));
    client.add_alert(NewAlert::below("ETH", "ethereum", Decimal::from(200)));
    feed.next_subscribe().await;
    feed.next_subscribe().await;

    assert_eq!(client.clear_alerts(), 2);
    let resubscribe = feed.next_subscribe().await;
    assert_eq!(resubscribe["tokens"], serde_json::json!([]));

    let mut alerts = client.events().alerts_triggered_rx();
    let mut prices = client.events().price_updates_rx();
    feed.push(r#"{"token":"ETH","network":"ethereum","price":150}"#);
    recv(&mut prices).await;

    let mut next_alert = task::spawn(alerts.recv());
    assert_pending!(next_alert.poll());

    client.disconnect();
}

#[tokio::test]
async fn removing_last_alert_for_token_resubscribes() {
    let mut feed = FakeFeed::new();
    let client = open_client(&mut feed).await;
    feed.next_subscribe().await;

    client.add_alert(NewAlert::above("ETH", "ethereum", Decimal::from(10)));
    client.add_alert(NewAlert::above("BTC", "bitcoin", Decimal::from(10)));
    feed.next_subscribe().await;
    feed.next_subscribe().await;

    let removed = client.remove_alert("BTC", "bitcoin", AlertCondition::Above, Decimal::from(10));
    assert_eq!(removed, 1);

    let request = feed.next_subscribe().await;
    assert_eq!(request["tokens"], serde_json::json!(["ETH"]));

    // Non-matching identity: silent no-op
    assert_eq!(
        client.remove_alert("ETH", "ethereum", AlertCondition::Below, Decimal::from(10)),
        0
    );
    client.disconnect();
}
