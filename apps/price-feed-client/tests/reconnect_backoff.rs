//! Reconnect behavior of the price feed client under a paused Tokio clock.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::time::Duration;

use common::{Dial, FakeFeed, wait_for_state};
use price_feed_client::ConnectionState;

#[tokio::test(start_paused = true)]
async fn five_failures_back_off_then_give_up_once() {
    let feed = FakeFeed::new();
    let client = feed.client();
    let mut exhausted = client.events().max_reconnect_attempts_rx();

    client.connect().unwrap();

    let event = tokio::time::timeout(Duration::from_secs(600), exhausted.recv())
        .await
        .expect("retries never exhausted")
        .unwrap();
    assert_eq!(event.attempts, 5);
    assert_eq!(client.state(), ConnectionState::Failed);

    // Initial dial plus five retries
    let dials = feed.dial_times();
    assert_eq!(dials.len(), 6);
    let gaps: Vec<u128> = dials
        .windows(2)
        .map(|pair| (pair[1] - pair[0]).as_millis())
        .collect();
    assert_eq!(gaps, vec![2_000, 4_000, 8_000, 16_000, 30_000]);

    // Nothing further happens on its own
    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(feed.dial_count(), 6);
    assert!(exhausted.try_recv().is_err());
    assert_eq!(client.state(), ConnectionState::Failed);
}

#[tokio::test(start_paused = true)]
async fn disconnect_cancels_pending_reconnect() {
    let feed = FakeFeed::new();
    let client = feed.client();
    let mut states = client.events().state_changes_rx();

    client.connect().unwrap();
    wait_for_state(&mut states, ConnectionState::Closed).await;

    // Retry is now scheduled two seconds out
    client.disconnect();
    tokio::time::sleep(Duration::from_secs(120)).await;

    assert_eq!(feed.dial_count(), 1);
    assert_eq!(client.state(), ConnectionState::Closed);
    assert!(
        states.try_recv().is_err(),
        "no transition may follow a disconnect"
    );

    // Idempotent
    client.disconnect();
    assert_eq!(client.state(), ConnectionState::Closed);
}

#[tokio::test(start_paused = true)]
async fn successful_open_resets_attempts() {
    let mut feed = FakeFeed::new();
    feed.script([Dial::Fail, Dial::Fail, Dial::Accept, Dial::Accept]);
    let client = feed.client();
    let mut states = client.events().state_changes_rx();

    client.connect().unwrap();
    wait_for_state(&mut states, ConnectionState::Open).await;
    feed.next_subscribe().await;

    assert_eq!(client.reconnect_attempt(), 0);
    assert_eq!(feed.dial_count(), 3);

    // After a drop the sequence starts over at the first delay
    let dropped_at = tokio::time::Instant::now();
    feed.drop_connection();
    wait_for_state(&mut states, ConnectionState::Open).await;

    let last_dial = *feed.dial_times().last().unwrap();
    assert_eq!((last_dial - dropped_at).as_millis(), 2_000);

    // Resubscribed on the new connection
    feed.next_subscribe().await;
    client.disconnect();
}

#[tokio::test(start_paused = true)]
async fn explicit_connect_restarts_after_failure() {
    let feed = FakeFeed::new();
    let client = feed.client();
    let mut states = client.events().state_changes_rx();

    client.connect().unwrap();
    wait_for_state(&mut states, ConnectionState::Failed).await;
    assert_eq!(feed.dial_count(), 6);

    feed.script([Dial::Accept]);
    client.connect().unwrap();

    let seen = wait_for_state(&mut states, ConnectionState::Open).await;
    assert_eq!(seen.first().unwrap().from, ConnectionState::Failed);
    assert_eq!(client.reconnect_attempt(), 0);

    client.disconnect();
}

#[tokio::test(start_paused = true)]
async fn connect_during_backoff_dials_immediately() {
    let feed = FakeFeed::new();
    let client = feed.client();
    let mut states = client.events().state_changes_rx();

    client.connect().unwrap();
    wait_for_state(&mut states, ConnectionState::Closed).await;
    let first = feed.dial_times()[0];

    feed.script([Dial::Accept]);
    client.connect().unwrap();
    wait_for_state(&mut states, ConnectionState::Open).await;

    let dials = feed.dial_times();
    assert_eq!(dials.len(), 2);
    assert_eq!(dials[1], first);

    // The superseded timer must not dial again
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(feed.dial_count(), 2);

    client.disconnect();
}
