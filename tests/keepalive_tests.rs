// SPDX-License-Identifier: MPL-2.0

mod common;

use common::start;
use mqtt5_engine::mqtt_client::MqttClientOptions;
use mqtt5_engine::mqtt_serde::control_packet::MqttPacket;
use mqtt5_engine::mqtt_serde::mqttv5::common::properties::Property;
use mqtt5_engine::mqtt_serde::mqttv5::pingrespv5::MqttPingResp;
use mqtt5_engine::mqtt_serde::mqttv5::reason_code;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

fn with_keep_alive(seconds: u16) -> MqttClientOptions {
    MqttClientOptions::builder()
        .brokers("broker.test")
        .client_id("ka-client")
        .keep_alive(seconds)
        .build()
        .unwrap()
}

fn near(elapsed: Duration, expected: Duration) -> bool {
    elapsed >= expected && elapsed < expected + Duration::from_millis(50)
}

#[tokio::test(start_paused = true)]
async fn test_answered_pings_keep_connection() {
    let (client, mut broker, _run) = start(with_keep_alive(1));
    let (mut conn, connect) = broker.accept(false).await;
    assert_eq!(connect.keep_alive, 1);

    let pings = Arc::new(AtomicUsize::new(0));
    let responder = tokio::spawn({
        let pings = pings.clone();
        async move {
            while let Some(packet) = conn.try_read().await {
                if let MqttPacket::PingReq(_) = packet {
                    pings.fetch_add(1, Ordering::SeqCst);
                    conn.send(&MqttPingResp::new()).await;
                }
            }
        }
    });

    tokio::time::sleep(Duration::from_millis(2700)).await;
    assert_eq!(pings.load(Ordering::SeqCst), 2);
    assert!(!broker.has_pending(), "client must not reconnect");

    client.cancel();
    responder.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_unanswered_ping_reconnects() {
    let (client, mut broker, _run) = start(with_keep_alive(1));
    let (mut conn, _) = broker.accept(false).await;
    let started = Instant::now();

    assert!(matches!(conn.read().await, MqttPacket::PingReq(_)));
    assert!(near(started.elapsed(), Duration::from_secs(1)));

    // keep_alive * 2 without PINGRESP
    let MqttPacket::Disconnect(disconnect) = conn.read().await else {
        panic!("expected DISCONNECT");
    };
    assert_eq!(disconnect.reason_code, reason_code::KEEP_ALIVE_TIMEOUT);
    assert!(near(started.elapsed(), Duration::from_secs(3)));
    assert!(conn.try_read().await.is_none());

    let (_conn, connect) = broker.accept(false).await;
    assert!(!connect.clean_start);
    let gap = started.elapsed().saturating_sub(Duration::from_secs(3));
    assert!(gap >= Duration::from_millis(500), "{:?}", gap);
    assert!(gap <= Duration::from_millis(1550), "{:?}", gap);

    client.cancel();
}

#[tokio::test(start_paused = true)]
async fn test_server_keep_alive_wins() {
    let (client, mut broker, _run) = start(with_keep_alive(30));
    let (mut conn, _) = broker
        .accept_with(false, vec![Property::ServerKeepAlive(5)])
        .await;
    let started = Instant::now();

    assert!(matches!(conn.read().await, MqttPacket::PingReq(_)));
    assert!(near(started.elapsed(), Duration::from_secs(5)));
    client.cancel();
}

#[tokio::test(start_paused = true)]
async fn test_zero_keep_alive_never_pings() {
    let (client, mut broker, _run) = start(with_keep_alive(0));
    let (mut conn, _) = broker.accept(false).await;

    assert!(conn.read_timeout(Duration::from_secs(600)).await.is_none());
    client.cancel();
}
