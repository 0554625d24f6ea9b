// SPDX-License-Identifier: MPL-2.0

//! In-process broker for integration tests. Every client connect attempt
//! opens a fresh duplex pipe whose far end is handed to the test.

#![allow(dead_code)]

use async_trait::async_trait;
use mqtt5_engine::mqtt_client::{
    BoxedTransport, Connector, Endpoint, MqttClient, MqttClientOptions, Transport, TransportError,
};
use mqtt5_engine::mqtt_serde::control_packet::{MqttControlPacket, MqttPacket};
use mqtt5_engine::mqtt_serde::mqttv5::common::properties::Property;
use mqtt5_engine::mqtt_serde::mqttv5::connackv5::MqttConnAck;
use mqtt5_engine::mqtt_serde::mqttv5::connectv5::MqttConnect;
use mqtt5_engine::mqtt_serde::MqttParser;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream, ReadBuf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub struct PipeConnector {
    peers: mpsc::UnboundedSender<DuplexStream>,
    hang_on_close: bool,
}

#[async_trait]
impl Connector for PipeConnector {
    async fn connect(&self, _endpoint: &Endpoint) -> Result<BoxedTransport, TransportError> {
        let (client, broker) = tokio::io::duplex(64 * 1024);
        self.peers
            .send(broker)
            .map_err(|_| TransportError::ConnectionFailed("broker gone".to_string()))?;
        if self.hang_on_close {
            return Ok(Box::new(StuckClose(client)));
        }
        Ok(Box::new(client))
    }
}

/// Pipe whose orderly close never finishes.
struct StuckClose(DuplexStream);

impl AsyncRead for StuckClose {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.0).poll_read(cx, buf)
    }
}

impl AsyncWrite for StuckClose {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.0).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.0).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.0).poll_shutdown(cx)
    }
}

#[async_trait]
impl Transport for StuckClose {
    async fn close(&mut self) -> Result<(), TransportError> {
        std::future::pending().await
    }
}

/// Listening side: yields one [`BrokerConn`] per client connect attempt.
pub struct MockBroker {
    peers: mpsc::UnboundedReceiver<DuplexStream>,
}

impl MockBroker {
    pub fn new() -> (PipeConnector, MockBroker) {
        Self::pipes(false)
    }

    /// Client transports whose close hangs forever.
    pub fn with_stuck_close() -> (PipeConnector, MockBroker) {
        Self::pipes(true)
    }

    fn pipes(hang_on_close: bool) -> (PipeConnector, MockBroker) {
        let (peers, rx) = mpsc::unbounded_channel();
        (
            PipeConnector {
                peers,
                hang_on_close,
            },
            MockBroker { peers: rx },
        )
    }

    /// Takes the next connection, reads its CONNECT and answers with a
    /// successful CONNACK.
    pub async fn accept(&mut self, session_present: bool) -> (BrokerConn, MqttConnect) {
        self.accept_with(session_present, vec![]).await
    }

    pub async fn accept_with(
        &mut self,
        session_present: bool,
        properties: Vec<Property>,
    ) -> (BrokerConn, MqttConnect) {
        let mut conn = self.raw().await;
        let MqttPacket::Connect(connect) = conn.read().await else {
            panic!("expected CONNECT first");
        };
        conn.send(&MqttConnAck::new(session_present, 0, properties))
            .await;
        (conn, connect)
    }

    pub async fn raw(&mut self) -> BrokerConn {
        let stream = self.peers.recv().await.expect("connector dropped");
        BrokerConn {
            stream,
            parser: MqttParser::default(),
        }
    }

    /// True when a connection attempt is already waiting.
    pub fn has_pending(&mut self) -> bool {
        self.peers.try_recv().is_ok()
    }
}

pub struct BrokerConn {
    stream: DuplexStream,
    parser: MqttParser,
}

impl BrokerConn {
    pub async fn read(&mut self) -> MqttPacket {
        self.try_read().await.expect("client closed the connection")
    }

    /// `None` once the client closed its end.
    pub async fn try_read(&mut self) -> Option<MqttPacket> {
        loop {
            if let Some(packet) = self.parser.next_packet().expect("client sent garbage") {
                return Some(packet);
            }
            let n = self
                .stream
                .read_buf(self.parser.buffer_mut())
                .await
                .ok()?;
            if n == 0 {
                return None;
            }
        }
    }

    pub async fn read_timeout(&mut self, wait: Duration) -> Option<MqttPacket> {
        tokio::time::timeout(wait, self.try_read()).await.ok().flatten()
    }

    pub async fn send<P: MqttControlPacket>(&mut self, packet: &P) {
        self.send_raw(&packet.to_bytes().expect("encodable packet"))
            .await;
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.expect("client gone");
    }
}

/// Keep-alive is off so paused-clock tests see no stray PINGREQ.
pub fn options() -> MqttClientOptions {
    MqttClientOptions::builder()
        .brokers("broker.test:1883")
        .client_id("it-client")
        .keep_alive(0)
        .build()
        .expect("valid options")
}

/// Client wired to a [`MockBroker`] with its session loop running.
pub fn start(options: MqttClientOptions) -> (MqttClient, MockBroker, JoinHandle<()>) {
    launch(options, MockBroker::new())
}

pub fn start_stuck_close(options: MqttClientOptions) -> (MqttClient, MockBroker, JoinHandle<()>) {
    launch(options, MockBroker::with_stuck_close())
}

fn launch(
    options: MqttClientOptions,
    (connector, broker): (PipeConnector, MockBroker),
) -> (MqttClient, MockBroker, JoinHandle<()>) {
    let client = MqttClient::builder(options).connector(connector).build();
    let runner = client.clone();
    let handle = tokio::spawn(async move {
        let _ = runner.async_run().await;
    });
    (client, broker, handle)
}
