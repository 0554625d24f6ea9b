// SPDX-License-Identifier: MPL-2.0

//! Connection establishment
//!
//! One attempt against one endpoint: open the base stream, run the optional
//! TLS and WebSocket layers, then CONNECT / (AUTH)* / CONNACK. Cancellation
//! is observed at every await point.
//!
//! [`ConnectState`] only moves forward, except that each AUTH challenge
//! answered in `AuthContinue` goes back to reading the next fixed header.

use bytes::BytesMut;
use std::convert::TryFrom;
use std::future::Future;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::auth::{self, AuthStep, Authenticator};
use super::client::ClientService;
use super::error::{MqttClientError, MqttClientResult};
use super::transport::{BoxedTransport, Endpoint, StreamLayer, TransportError};
use crate::mqtt_serde::control_packet::{ControlPacketType, MqttControlPacket, MqttPacket};
use crate::mqtt_serde::mqttv5::authv5::MqttAuth;
use crate::mqtt_serde::mqttv5::connackv5::MqttConnAck;
use crate::mqtt_serde::mqttv5::reason_code;
use crate::mqtt_serde::mqttv5::PropertyLookup;
use crate::mqtt_serde::parser::{parse_remaining_length, ParseError, ParseOk};

/// Largest packet the protocol can express.
const MAX_REMAINING_LENGTH: usize = 268_435_455;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum ConnectState {
    Connecting,
    TlsHandshake,
    WsHandshake,
    ClientInitialAuth,
    SendingConnect,
    ReadingFixedHeader,
    ReadingRemaining,
    AuthContinue,
    Done,
}

/// An established MQTT connection.
pub(crate) struct Connection {
    pub(crate) transport: BoxedTransport,
    pub(crate) connack: MqttConnAck,
    /// Bytes read past the CONNACK
    pub(crate) leftover: BytesMut,
}

pub(crate) struct ConnectOp<'a> {
    service: &'a ClientService,
    endpoint: &'a Endpoint,
    cancel: CancellationToken,
    state: ConnectState,
}

impl<'a> ConnectOp<'a> {
    pub(crate) fn new(
        service: &'a ClientService,
        endpoint: &'a Endpoint,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            service,
            endpoint,
            cancel,
            state: ConnectState::Connecting,
        }
    }

    pub(crate) async fn run(mut self) -> MqttClientResult<Connection> {
        debug!("Connecting to {}", self.endpoint);
        let connected = self
            .cancellable(self.service.connector.connect(self.endpoint))
            .await?;
        let mut transport = connected.map_err(|e| self.transport_error(e))?;

        if let Some(tls) = self.service.tls.clone() {
            self.enter(ConnectState::TlsHandshake);
            transport = self.layer(tls.as_ref(), transport).await?;
        }
        if let Some(ws) = self.service.ws.clone() {
            self.enter(ConnectState::WsHandshake);
            transport = self.layer(ws.as_ref(), transport).await?;
        }

        match self.exchange(&mut transport).await {
            Ok((connack, leftover)) => {
                self.enter(ConnectState::Done);
                info!(
                    "Connected to {} (session_present: {})",
                    self.endpoint, connack.session_present
                );
                Ok(Connection {
                    transport,
                    connack,
                    leftover,
                })
            }
            Err(err) if err.is_cancelled() => {
                if self.state >= ConnectState::SendingConnect {
                    tokio::spawn(async move {
                        let _ = transport.close().await;
                    });
                }
                Err(err)
            }
            Err(err) => {
                warn!("MQTT handshake with {} failed: {}", self.endpoint, err);
                let _ = self.cancellable(transport.close()).await;
                Err(err)
            }
        }
    }

    fn enter(&mut self, next: ConnectState) {
        debug_assert!(
            next > self.state
                || (self.state == ConnectState::AuthContinue
                    && next == ConnectState::ReadingFixedHeader),
            "connect state {:?} -> {:?}",
            self.state,
            next
        );
        self.state = next;
    }

    async fn cancellable<F: Future>(&self, fut: F) -> MqttClientResult<F::Output> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(MqttClientError::cancelled("connect")),
            out = fut => Ok(out),
        }
    }

    fn transport_error(&self, error: TransportError) -> MqttClientError {
        match MqttClientError::from(error) {
            MqttClientError::ResolveFailed { reason, .. } => MqttClientError::ResolveFailed {
                endpoint: self.endpoint.to_string(),
                reason,
            },
            other => other,
        }
    }

    async fn layer(
        &self,
        layer: &dyn StreamLayer,
        transport: BoxedTransport,
    ) -> MqttClientResult<BoxedTransport> {
        trace!("{} handshake with {}", layer.name(), self.endpoint);
        self.cancellable(layer.handshake(self.endpoint, transport))
            .await?
            .map_err(|e| self.transport_error(e))
    }

    async fn exchange(
        &mut self,
        transport: &mut BoxedTransport,
    ) -> MqttClientResult<(MqttConnAck, BytesMut)> {
        let (method, authenticator) = {
            let ctx = self.service.context.read().await;
            (ctx.auth_method().map(str::to_owned), ctx.authenticator.clone())
        };
        let mechanism = method.zip(authenticator);

        let mut initial_data = None;
        if let Some((_, authenticator)) = &mechanism {
            self.enter(ConnectState::ClientInitialAuth);
            initial_data = Some(
                self.cancellable(auth::run_step(
                    authenticator.as_ref(),
                    AuthStep::ClientInitial,
                    Vec::new(),
                ))
                .await??,
            );
        }

        self.enter(ConnectState::SendingConnect);
        let connect = self.service.context.read().await.build_connect(initial_data);
        self.send(transport, &connect.to_bytes()?, "CONNECT").await?;

        let mut buffer = BytesMut::with_capacity(1024);
        loop {
            match self.read_packet(transport, &mut buffer).await? {
                MqttPacket::ConnAck(connack) => {
                    self.on_connack(&connack, mechanism.as_ref()).await?;
                    return Ok((connack, buffer));
                }
                MqttPacket::Auth(packet) => {
                    let (method, authenticator) = mechanism.as_ref().ok_or_else(|| {
                        MqttClientError::protocol(
                            reason_code::PROTOCOL_ERROR,
                            "AUTH received without an authentication method",
                        )
                    })?;
                    let answer = self.on_auth_challenge(&packet, method, authenticator).await?;
                    self.enter(ConnectState::AuthContinue);
                    self.send(transport, &answer.to_bytes()?, "AUTH").await?;
                }
                other => {
                    return Err(MqttClientError::protocol(
                        reason_code::PROTOCOL_ERROR,
                        format!("unexpected {} during connect", other.packet_type().name()),
                    ))
                }
            }
        }
    }

    async fn on_connack(
        &self,
        connack: &MqttConnAck,
        mechanism: Option<&(String, Arc<dyn Authenticator>)>,
    ) -> MqttClientResult<()> {
        self.service
            .session
            .set_session_present(connack.session_present);
        if !connack.is_success() {
            let err = MqttClientError::refused(connack.reason_code);
            warn!("{}", err);
            return Err(err);
        }
        if let Some((method, authenticator)) = mechanism {
            if let Some(echoed) = connack.properties.authentication_method() {
                if echoed != method.as_str() {
                    return Err(MqttClientError::MalformedPacket {
                        packet: "CONNACK".to_string(),
                        diagnostic: format!("authentication method mismatch: {}", echoed),
                    });
                }
            }
            let data = connack
                .properties
                .authentication_data()
                .unwrap_or_default()
                .to_vec();
            self.cancellable(auth::run_step(
                authenticator.as_ref(),
                AuthStep::ServerFinal,
                data,
            ))
            .await??;
        }
        Ok(())
    }

    async fn on_auth_challenge(
        &self,
        packet: &MqttAuth,
        method: &str,
        authenticator: &Arc<dyn Authenticator>,
    ) -> MqttClientResult<MqttAuth> {
        if packet.reason_code != reason_code::CONTINUE_AUTHENTICATION {
            return Err(MqttClientError::MalformedPacket {
                packet: "AUTH".to_string(),
                diagnostic: "invalid Reason Code".to_string(),
            });
        }
        if packet.method() != Some(method) {
            return Err(MqttClientError::MalformedPacket {
                packet: "AUTH".to_string(),
                diagnostic: "authentication method mismatch".to_string(),
            });
        }
        let data = packet.data().unwrap_or_default().to_vec();
        let answer = self
            .cancellable(auth::run_step(
                authenticator.as_ref(),
                AuthStep::ServerChallenge,
                data,
            ))
            .await??;
        Ok(MqttAuth::with_method(
            reason_code::CONTINUE_AUTHENTICATION,
            method,
            Some(answer),
        ))
    }

    async fn send(
        &self,
        transport: &mut BoxedTransport,
        bytes: &[u8],
        what: &str,
    ) -> MqttClientResult<()> {
        trace!("Sending {} ({} bytes)", what, bytes.len());
        self.cancellable(async {
            transport.write_all(bytes).await?;
            transport.flush().await
        })
        .await?
        .map_err(|e| MqttClientError::from_io_error(e, &format!("send {}", what)))
    }

    async fn fill(
        &self,
        transport: &mut BoxedTransport,
        buffer: &mut BytesMut,
    ) -> MqttClientResult<()> {
        let n = self
            .cancellable(transport.read_buf(buffer))
            .await?
            .map_err(|e| MqttClientError::from_io_error(e, "read CONNACK"))?;
        if n == 0 {
            return Err(MqttClientError::ConnectionLost {
                reason: "connection closed by broker during connect".to_string(),
            });
        }
        Ok(())
    }

    /// Reads one CONNACK or AUTH, leaving anything after it in `buffer`.
    async fn read_packet(
        &mut self,
        transport: &mut BoxedTransport,
        buffer: &mut BytesMut,
    ) -> MqttClientResult<MqttPacket> {
        self.enter(ConnectState::ReadingFixedHeader);
        while buffer.len() < 2 {
            self.fill(transport, buffer).await?;
        }

        let packet_type = ControlPacketType::try_from(buffer[0] >> 4)
            .ok()
            .filter(|t| matches!(t, ControlPacketType::CONNACK | ControlPacketType::AUTH))
            .ok_or_else(|| {
                MqttClientError::protocol(
                    reason_code::PROTOCOL_ERROR,
                    format!("expected CONNACK or AUTH, got packet type {}", buffer[0] >> 4),
                )
            })?;

        let total = loop {
            match parse_remaining_length(&buffer[1..]) {
                Ok((size, vbi_len)) => break 1 + vbi_len + size,
                Err(ParseError::More(..)) | Err(ParseError::BufferTooShort) => {
                    self.fill(transport, buffer).await?
                }
                Err(e) => {
                    return Err(MqttClientError::protocol(
                        reason_code::PROTOCOL_ERROR,
                        format!("{} remaining length: {}", packet_type.name(), e.diagnostic()),
                    ))
                }
            }
        };
        let limit = self
            .service
            .options
            .maximum_packet_size
            .map_or(MAX_REMAINING_LENGTH, |m| m as usize);
        if total > limit {
            return Err(MqttClientError::protocol(
                reason_code::PROTOCOL_ERROR,
                format!("{} of {} bytes exceeds {}", packet_type.name(), total, limit),
            ));
        }

        self.enter(ConnectState::ReadingRemaining);
        while buffer.len() < total {
            self.fill(transport, buffer).await?;
        }
        let frame = buffer.split_to(total);
        match MqttPacket::from_bytes(&frame) {
            Ok(ParseOk::Packet(packet, _)) => Ok(packet),
            Ok(ParseOk::Continue(..)) => Err(MqttClientError::malformed(
                packet_type.name(),
                &ParseError::InvalidLength,
            )),
            Err(e) => Err(MqttClientError::malformed(packet_type.name(), &e)),
        }
    }
}
