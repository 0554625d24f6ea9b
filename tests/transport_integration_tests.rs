// SPDX-License-Identifier: MPL-2.0

//! Client over real TCP sockets on the loopback interface.

use mqtt5_engine::mqtt_client::{MqttClient, MqttClientOptions, PublishCommand};
use mqtt5_engine::mqtt_serde::control_packet::{MqttControlPacket, MqttPacket};
use mqtt5_engine::mqtt_serde::mqttv5::connackv5::MqttConnAck;
use mqtt5_engine::mqtt_serde::mqttv5::pubackv5::MqttPubAck;
use mqtt5_engine::mqtt_serde::MqttParser;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

async fn read_packet(stream: &mut TcpStream, parser: &mut MqttParser) -> MqttPacket {
    loop {
        if let Some(packet) = parser.next_packet().unwrap() {
            return packet;
        }
        let n = stream.read_buf(parser.buffer_mut()).await.unwrap();
        assert!(n > 0, "client closed the connection");
    }
}

/// Accepts one client, acknowledges its CONNECT and a single QoS 1 PUBLISH,
/// then waits for DISCONNECT.
async fn serve_one(listener: TcpListener) -> Vec<MqttPacket> {
    let (mut stream, _) = listener.accept().await.unwrap();
    let mut parser = MqttParser::default();
    let mut seen = Vec::new();

    let connect = read_packet(&mut stream, &mut parser).await;
    assert!(matches!(connect, MqttPacket::Connect(_)));
    stream
        .write_all(&MqttConnAck::new(false, 0, vec![]).to_bytes().unwrap())
        .await
        .unwrap();
    seen.push(connect);

    loop {
        let packet = read_packet(&mut stream, &mut parser).await;
        match &packet {
            MqttPacket::Publish(p) => {
                let ack = MqttPubAck::new(p.packet_id.unwrap(), 0, vec![]);
                stream.write_all(&ack.to_bytes().unwrap()).await.unwrap();
            }
            MqttPacket::Disconnect(_) => {
                seen.push(packet);
                return seen;
            }
            _ => {}
        }
        seen.push(packet);
    }
}

#[tokio::test]
async fn test_publish_over_tcp() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let broker = tokio::spawn(serve_one(listener));

    let options = MqttClientOptions::builder()
        .brokers(&addr.to_string())
        .client_id("tcp-client")
        .build()
        .unwrap();
    let client = MqttClient::new(options);
    let run = tokio::spawn({
        let client = client.clone();
        async move { client.async_run().await }
    });

    let result = client
        .async_publish(PublishCommand::simple("tcp/topic", b"over tcp".to_vec(), 1, false))
        .await
        .unwrap();
    assert!(result.is_success());
    assert_eq!(client.client_id().await, "tcp-client");

    client.async_disconnect(0, vec![]).await.unwrap();
    run.await.unwrap().unwrap();

    let seen = broker.await.unwrap();
    assert!(matches!(&seen[1], MqttPacket::Publish(p) if p.payload == b"over tcp"));
    assert!(matches!(seen.last(), Some(MqttPacket::Disconnect(d)) if d.reason_code == 0));
}

#[tokio::test]
async fn test_fails_over_to_next_broker() {
    // Grab a free port and release it so connecting there is refused
    let closed = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let closed_addr = closed.local_addr().unwrap();
    drop(closed);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let broker = tokio::spawn(serve_one(listener));

    let options = MqttClientOptions::builder()
        .brokers(&format!("{}, {}", closed_addr, addr))
        .client_id("failover-client")
        .build()
        .unwrap();
    let client = MqttClient::new(options);
    let started = Instant::now();
    let run = tokio::spawn({
        let client = client.clone();
        async move { client.async_run().await }
    });

    let result = tokio::time::timeout(
        Duration::from_secs(10),
        client.async_publish(PublishCommand::simple("fail/over", b"x".to_vec(), 1, false)),
    )
    .await
    .expect("second broker reached")
    .unwrap();
    assert!(result.is_success());
    // One backed-off retry after the refused endpoint
    assert!(started.elapsed() >= Duration::from_millis(500));

    client.async_disconnect(0, vec![]).await.unwrap();
    run.await.unwrap().unwrap();
    broker.await.unwrap();
}
