// SPDX-License-Identifier: MPL-2.0

//! Session loop
//!
//! A single task owns the transport, the in-flight table and the outbound
//! queue. Operations reach it through [`Command`]s; acknowledgments are
//! matched by packet identifier plus packet kind and answered on the
//! operation's oneshot channel.

use bytes::BytesMut;
use std::collections::HashMap;
use std::convert::TryFrom;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, trace, warn};

use super::auth::{self, AuthStep};
use super::client::ClientService;
use super::connect_op::Connection;
use super::error::{MqttClientError, MqttClientResult};
use super::inflight::{AckOutcome, AckSender, InflightEntry, InflightState, InflightTable};
use super::ping_op::{PingAction, PingMonitor};
use super::publish_rec_op;
use super::reconnect_op::ReconnectOp;
use super::transport::BoxedTransport;
use crate::mqtt_serde::control_packet::{
    ControlPacketType, EncodedPacket, MqttControlPacket, MqttPacket,
};
use crate::mqtt_serde::mqttv5::authv5::MqttAuth;
use crate::mqtt_serde::mqttv5::common::properties::Property;
use crate::mqtt_serde::mqttv5::disconnectv5::MqttDisconnect;
use crate::mqtt_serde::mqttv5::pingreqv5::MqttPingReq;
use crate::mqtt_serde::mqttv5::pubackv5::MqttPubAck;
use crate::mqtt_serde::mqttv5::pubcompv5::MqttPubComp;
use crate::mqtt_serde::mqttv5::publishv5::MqttPublish;
use crate::mqtt_serde::mqttv5::pubrecv5::MqttPubRec;
use crate::mqtt_serde::mqttv5::pubrelv5::MqttPubRel;
use crate::mqtt_serde::mqttv5::reason_code;
use crate::mqtt_serde::mqttv5::PropertyLookup;
use crate::mqtt_serde::MqttParser;
use crate::priority_queue::PriorityQueue;

const PRIORITY_NORMAL: u8 = 1;
const PRIORITY_DISCONNECT: u8 = 2;

/// A packet an operation wants on the wire.
#[derive(Debug)]
pub(crate) struct OutboundRequest {
    pub(crate) packet_id: Option<u16>,
    /// `None` completes as soon as the packet is written (QoS 0)
    pub(crate) state: Option<InflightState>,
    pub(crate) packet: EncodedPacket,
    pub(crate) expected_codes: usize,
    pub(crate) reply: AckSender,
}

pub(crate) type DoneSender = oneshot::Sender<MqttClientResult<()>>;

#[derive(Debug)]
pub(crate) enum Command {
    Request(OutboundRequest),
    Disconnect {
        packet: EncodedPacket,
        reply: DoneSender,
    },
    ReAuth {
        reply: DoneSender,
    },
    /// A parked QoS 2 receive handed its message over
    PubComp(u16),
}

impl Command {
    fn priority(&self) -> u8 {
        match self {
            Command::Disconnect { .. } => PRIORITY_DISCONNECT,
            _ => PRIORITY_NORMAL,
        }
    }

    fn abort(self, service: &ClientService) {
        match self {
            Command::Request(req) => {
                if let Some(pid) = req.packet_id {
                    service.release_pid(pid);
                }
                let _ = req.reply.send(Err(MqttClientError::cancelled("request")));
            }
            Command::Disconnect { reply, .. } => {
                let _ = reply.send(Err(MqttClientError::cancelled("disconnect")));
            }
            Command::ReAuth { reply } => {
                let _ = reply.send(Err(MqttClientError::cancelled("re-authenticate")));
            }
            Command::PubComp(_) => {}
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    Stopped,
    Reconnect,
}

pub(crate) struct ClientWorker {
    service: Arc<ClientService>,
    cmd_rx: mpsc::UnboundedReceiver<Command>,
    queue: PriorityQueue<u8, Command>,
    inflight: InflightTable,
    /// QoS 2 receives waiting for PUBREL
    parked: HashMap<u16, oneshot::Sender<()>>,
    inbound_aliases: HashMap<u16, String>,
    ping: PingMonitor,
    parser: MqttParser,
    transport: Option<BoxedTransport>,
    reauth: Option<DoneSender>,
    server_receive_maximum: usize,
}

impl ClientWorker {
    pub(crate) fn new(service: Arc<ClientService>, cmd_rx: mpsc::UnboundedReceiver<Command>) -> Self {
        let ping = PingMonitor::new(service.options.ping_timeout_multiplier);
        Self {
            service,
            cmd_rx,
            queue: PriorityQueue::new(),
            inflight: InflightTable::new(),
            parked: HashMap::new(),
            inbound_aliases: HashMap::new(),
            ping,
            parser: MqttParser::default(),
            transport: None,
            reauth: None,
            server_receive_maximum: u16::MAX as usize,
        }
    }

    pub(crate) async fn run(mut self) -> MqttClientResult<()> {
        let result = self.run_sessions().await;
        if let Err(e) = &result {
            error!("MQTT client stopped: {}", e);
        }
        self.shutdown().await;
        result
    }

    async fn run_sessions(&mut self) -> MqttClientResult<()> {
        let mut reconnect = ReconnectOp::new(self.service.options.brokers.clone())?;
        let mut delay = None;
        loop {
            let connection = match self.establish(&mut reconnect, delay.take()).await? {
                Some(connection) => connection,
                None => return Ok(()),
            };
            match self.session(connection).await {
                SessionEnd::Stopped => return Ok(()),
                SessionEnd::Reconnect => {
                    self.close_transport().await;
                    delay = Some(reconnect.next_delay());
                }
            }
        }
    }

    /// Runs the reconnection driver while still accepting commands. `None`
    /// when the client stopped before a connection was made.
    async fn establish(
        &mut self,
        reconnect: &mut ReconnectOp,
        delay: Option<Duration>,
    ) -> MqttClientResult<Option<Connection>> {
        let service = self.service.clone();
        let connecting = reconnect.connect(&service, delay);
        tokio::pin!(connecting);
        loop {
            tokio::select! {
                res = &mut connecting => {
                    return match res {
                        Ok(connection) => Ok(Some(connection)),
                        Err(e) if e.is_cancelled() => Ok(None),
                        Err(e) => Err(e),
                    };
                }
                Some(cmd) = self.cmd_rx.recv() => {
                    if let Command::Disconnect { reply, .. } = cmd {
                        info!("Disconnect requested while not connected");
                        let _ = reply.send(Err(MqttClientError::cancelled("disconnect")));
                        return Ok(None);
                    }
                    self.queue.enqueue(cmd.priority(), cmd);
                }
            }
        }
    }

    async fn session(&mut self, connection: Connection) -> SessionEnd {
        if let Err(e) = self.on_connected(connection).await {
            return self.connection_error(e).await;
        }

        loop {
            match self.flush_queue().await {
                Ok(Some(end)) => return end,
                Ok(None) => {}
                Err(e) => return self.connection_error(e).await,
            }

            let deadline = self.ping.next_deadline();
            tokio::select! {
                biased;
                _ = self.service.root.cancelled() => {
                    debug!("Session loop cancelled");
                    return SessionEnd::Stopped;
                }
                cmd = self.cmd_rx.recv() => {
                    let Some(cmd) = cmd else {
                        return SessionEnd::Stopped;
                    };
                    self.queue.enqueue(cmd.priority(), cmd);
                    // Let a DISCONNECT queued in the same burst jump ahead
                    while let Ok(cmd) = self.cmd_rx.try_recv() {
                        self.queue.enqueue(cmd.priority(), cmd);
                    }
                }
                read = read_into(self.transport.as_mut(), self.parser.buffer_mut()) => {
                    let end = match read {
                        Ok(0) => Err(MqttClientError::ConnectionLost {
                            reason: "connection closed by broker".to_string(),
                        }),
                        Ok(n) => {
                            trace!("Read {} bytes", n);
                            self.process_inbound().await
                        }
                        Err(e) => Err(MqttClientError::from_io_error(e, "read")),
                    };
                    match end {
                        Ok(Some(end)) => return end,
                        Ok(None) => {}
                        Err(e) => return self.connection_error(e).await,
                    }
                }
                _ = sleep_until_deadline(deadline) => {
                    if let Err(e) = self.on_ping_timer().await {
                        return self.connection_error(e).await;
                    }
                }
            }
        }
    }

    async fn on_connected(&mut self, connection: Connection) -> MqttClientResult<()> {
        let Connection {
            transport,
            connack,
            leftover,
        } = connection;

        let (caps, keep_alive) = {
            let mut ctx = self.service.context.write().await;
            let caps = ctx.apply_connack(&connack);
            (caps, ctx.effective_keep_alive())
        };
        self.server_receive_maximum = caps.receive_maximum as usize;
        self.transport = Some(transport);
        self.parser.reset();
        self.parser.feed(&leftover);
        self.inbound_aliases.clear();
        self.ping.start(keep_alive, Instant::now());

        if !connack.session_present {
            self.discard_session();
            return Ok(());
        }

        for pid in self.inflight.purge_abandoned() {
            self.service.release_pid(pid);
        }
        let resend = self.inflight.packet_ids();
        if !resend.is_empty() {
            info!("Session resumed, resending {} in-flight packets", resend.len());
        }
        for pid in resend {
            let bytes = match self.inflight.get_mut(pid) {
                Some(entry) => {
                    entry.packet.set_dup(true);
                    entry.packet.as_bytes().to_vec()
                }
                None => continue,
            };
            self.write(&bytes).await?;
        }
        Ok(())
    }

    fn discard_session(&mut self) {
        let aborted = self.inflight.drain();
        if !aborted.is_empty() {
            warn!(
                "Server has no session, aborting {} in-flight operations",
                aborted.len()
            );
        }
        for mut entry in aborted {
            self.service.release_pid(entry.packet_id);
            entry.complete(Err(MqttClientError::cancelled("request")));
        }
        self.parked.clear();
        self.queue.retain(|cmd| !matches!(cmd, Command::PubComp(_)));
        self.service.session.update_session_state();
    }

    /// Writes queued commands until the queue is empty or the head has to
    /// wait for the server's receive maximum.
    async fn flush_queue(&mut self) -> MqttClientResult<Option<SessionEnd>> {
        while let Some((priority, cmd)) = self.queue.dequeue() {
            match cmd {
                Command::Request(req) => {
                    if req.reply.is_closed() {
                        if let Some(pid) = req.packet_id {
                            self.service.release_pid(pid);
                        }
                        debug!("Dropping request abandoned before send");
                        continue;
                    }
                    let is_publish = req.state.is_some_and(|s| s.is_publish());
                    if is_publish && self.inflight.publish_count() >= self.server_receive_maximum {
                        trace!("Server receive maximum reached, holding publish");
                        self.queue.requeue_front(priority, Command::Request(req));
                        break;
                    }
                    self.send_request(req).await?;
                }
                Command::Disconnect { packet, reply } => {
                    self.disconnect(packet, reply).await;
                    return Ok(Some(SessionEnd::Stopped));
                }
                Command::ReAuth { reply } => self.start_reauth(reply).await?,
                Command::PubComp(pid) => {
                    self.write_packet(&MqttPubComp::new(pid, reason_code::SUCCESS, Vec::new()))
                        .await?
                }
            }
        }
        Ok(None)
    }

    async fn send_request(&mut self, req: OutboundRequest) -> MqttClientResult<()> {
        let OutboundRequest {
            packet_id,
            state,
            packet,
            expected_codes,
            reply,
        } = req;

        match (packet_id, state) {
            (Some(pid), Some(state)) => {
                let bytes = packet.as_bytes().to_vec();
                let entry = InflightEntry::new(pid, state, packet, expected_codes, reply);
                if let Err(e) = self.inflight.insert(entry) {
                    error!("{}", e);
                    return Ok(());
                }
                self.write(&bytes).await
            }
            _ => match self.write(packet.as_bytes()).await {
                Ok(()) => {
                    let _ = reply.send(Ok(AckOutcome {
                        packet_id: None,
                        reason_codes: Vec::new(),
                        properties: Vec::new(),
                    }));
                    Ok(())
                }
                Err(e) => {
                    let _ = reply.send(Err(e.clone()));
                    Err(e)
                }
            },
        }
    }

    async fn disconnect(&mut self, packet: EncodedPacket, reply: DoneSender) {
        for (_, cmd) in self.queue.drain() {
            cmd.abort(&self.service);
        }
        self.abort_inflight();
        let mut result = self.write(packet.as_bytes()).await;
        if !self.close_transport().await && result.is_ok() {
            result = Err(MqttClientError::cancelled("disconnect"));
        }
        match &result {
            Ok(()) => info!("Disconnected"),
            Err(e) if e.is_cancelled() => info!("Disconnect cancelled during transport close"),
            Err(e) => warn!("DISCONNECT not delivered: {}", e),
        }
        let _ = reply.send(result);
    }

    async fn start_reauth(&mut self, reply: DoneSender) -> MqttClientResult<()> {
        let (method, authenticator) = {
            let ctx = self.service.context.read().await;
            (ctx.auth_method().map(str::to_owned), ctx.authenticator.clone())
        };
        let Some((method, authenticator)) = method.zip(authenticator) else {
            let _ = reply.send(Err(MqttClientError::InvalidConfiguration {
                field: "authenticator".to_string(),
                reason: "re-authentication needs an authentication method".to_string(),
            }));
            return Ok(());
        };
        if self.reauth.is_some() {
            let _ = reply.send(Err(MqttClientError::InvalidConfiguration {
                field: "re_authenticate".to_string(),
                reason: "a re-authentication is already running".to_string(),
            }));
            return Ok(());
        }
        match auth::run_step(authenticator.as_ref(), AuthStep::ClientInitial, Vec::new()).await {
            Ok(data) => {
                debug!("Starting re-authentication ({})", method);
                self.write_packet(&MqttAuth::with_method(
                    reason_code::RE_AUTHENTICATE,
                    &method,
                    Some(data),
                ))
                .await?;
                self.reauth = Some(reply);
            }
            Err(e) => {
                let _ = reply.send(Err(e));
            }
        }
        Ok(())
    }

    async fn process_inbound(&mut self) -> MqttClientResult<Option<SessionEnd>> {
        while let Some(packet) = self.next_packet()? {
            trace!("Received {}", packet.packet_type().name());
            if let Some(end) = self.handle_packet(packet).await? {
                return Ok(Some(end));
            }
        }
        Ok(None)
    }

    fn next_packet(&mut self) -> MqttClientResult<Option<MqttPacket>> {
        let name = self
            .parser
            .buffer_mut()
            .first()
            .and_then(|b| ControlPacketType::try_from(b >> 4).ok())
            .map_or("packet", |t| t.name());
        self.parser.next_packet().map_err(|e| {
            warn!("Malformed {} from broker: {}", name, e);
            MqttClientError::malformed(name, &e)
        })
    }

    async fn handle_packet(&mut self, packet: MqttPacket) -> MqttClientResult<Option<SessionEnd>> {
        match packet {
            MqttPacket::PubAck(ack) => self.complete(
                ack.packet_id,
                ControlPacketType::PUBACK,
                vec![ack.reason_code],
                ack.properties,
            ),
            MqttPacket::PubRec(rec) => self.on_pubrec(rec).await?,
            MqttPacket::PubComp(comp) => self.complete(
                comp.packet_id,
                ControlPacketType::PUBCOMP,
                vec![comp.reason_code],
                comp.properties,
            ),
            MqttPacket::SubAck(ack) => self.on_sub_ack(
                ack.packet_id,
                ControlPacketType::SUBACK,
                ack.reason_codes,
                ack.properties,
            )?,
            MqttPacket::UnsubAck(ack) => self.on_sub_ack(
                ack.packet_id,
                ControlPacketType::UNSUBACK,
                ack.reason_codes,
                ack.properties,
            )?,
            MqttPacket::Publish(publish) => self.on_publish(publish).await?,
            MqttPacket::PubRel(rel) => self.on_pubrel(rel.packet_id).await?,
            MqttPacket::PingResp(_) => self.ping.on_pingresp(Instant::now()),
            MqttPacket::Disconnect(disconnect) => {
                warn!(
                    "Server sent DISCONNECT 0x{:02X} ({}){}",
                    disconnect.reason_code,
                    reason_code::describe(disconnect.reason_code),
                    disconnect
                        .properties
                        .reason_string()
                        .map(|s| format!(": {}", s))
                        .unwrap_or_default()
                );
                self.ping.stop();
                return Ok(Some(SessionEnd::Reconnect));
            }
            MqttPacket::Auth(packet) => self.on_auth(packet).await?,
            other => {
                return Err(MqttClientError::protocol(
                    reason_code::PROTOCOL_ERROR,
                    format!("unexpected {} from broker", other.packet_type().name()),
                ))
            }
        }
        Ok(None)
    }

    fn complete(
        &mut self,
        packet_id: u16,
        ack: ControlPacketType,
        reason_codes: Vec<u8>,
        properties: Vec<Property>,
    ) {
        match self.inflight.take_matching(packet_id, ack) {
            Some(mut entry) => {
                self.service.release_pid(packet_id);
                entry.complete(Ok(AckOutcome {
                    packet_id: Some(packet_id),
                    reason_codes,
                    properties,
                }));
            }
            None => debug!("{} for unknown packet id {}", ack.name(), packet_id),
        }
    }

    async fn on_pubrec(&mut self, rec: MqttPubRec) -> MqttClientResult<()> {
        let pid = rec.packet_id;
        let awaiting = self
            .inflight
            .get(pid)
            .is_some_and(|e| e.state == InflightState::AwaitPubRec);
        if !awaiting {
            debug!("PUBREC for unknown packet id {}", pid);
            return self
                .write_packet(&MqttPubRel::new(
                    pid,
                    reason_code::PACKET_IDENTIFIER_NOT_FOUND,
                    Vec::new(),
                ))
                .await;
        }

        if reason_code::is_error(rec.reason_code) {
            self.complete(
                pid,
                ControlPacketType::PUBREC,
                vec![rec.reason_code],
                rec.properties,
            );
            return Ok(());
        }

        let pubrel = MqttPubRel::new(pid, reason_code::SUCCESS, Vec::new()).encode()?;
        let bytes = pubrel.as_bytes().to_vec();
        if let Some(entry) = self.inflight.get_mut(pid) {
            entry.state = InflightState::AwaitPubComp;
            entry.packet = pubrel;
        }
        self.write(&bytes).await
    }

    fn on_sub_ack(
        &mut self,
        packet_id: u16,
        ack: ControlPacketType,
        reason_codes: Vec<u8>,
        properties: Vec<Property>,
    ) -> MqttClientResult<()> {
        let expected = self
            .inflight
            .get(packet_id)
            .filter(|e| e.state.expected_ack() == ack)
            .map(|e| e.expected_codes);
        match expected {
            None => debug!("{} for unknown packet id {}", ack.name(), packet_id),
            Some(n) if n != reason_codes.len() => {
                let err = MqttClientError::MalformedPacket {
                    packet: ack.name().to_string(),
                    diagnostic: format!(
                        "expected {} reason codes, got {}",
                        n,
                        reason_codes.len()
                    ),
                };
                if let Some(mut entry) = self.inflight.remove(packet_id) {
                    self.service.release_pid(packet_id);
                    entry.complete(Err(err.clone()));
                }
                return Err(err);
            }
            Some(_) => {
                if ack == ControlPacketType::SUBACK
                    && reason_codes.iter().any(|c| !reason_code::is_error(*c))
                {
                    self.service.session.set_subscriptions_present(true);
                }
                self.complete(packet_id, ack, reason_codes, properties);
            }
        }
        Ok(())
    }

    async fn on_publish(&mut self, mut publish: MqttPublish) -> MqttClientResult<()> {
        if let Some(alias) = publish.topic_alias() {
            let maximum = self.service.context.read().await.topic_alias_maximum;
            if alias == 0 || alias > maximum {
                return Err(MqttClientError::protocol(
                    reason_code::TOPIC_ALIAS_INVALID,
                    format!("topic alias {} outside 1..={}", alias, maximum),
                ));
            }
            if publish.topic_name.is_empty() {
                match self.inbound_aliases.get(&alias) {
                    Some(topic) => publish.topic_name = topic.clone(),
                    None => {
                        return Err(MqttClientError::protocol(
                            reason_code::PROTOCOL_ERROR,
                            format!("topic alias {} has no mapping", alias),
                        ))
                    }
                }
            } else {
                self.inbound_aliases
                    .insert(alias, publish.topic_name.clone());
            }
        }

        if publish.qos == 0 {
            let _ = self.service.inbound_tx.send(publish);
            return Ok(());
        }
        let Some(pid) = publish.packet_id else {
            return Err(MqttClientError::MalformedPacket {
                packet: "PUBLISH".to_string(),
                diagnostic: "missing Packet Identifier".to_string(),
            });
        };

        if publish.qos == 1 {
            let _ = self.service.inbound_tx.send(publish);
            return self
                .write_packet(&MqttPubAck::new(pid, reason_code::SUCCESS, Vec::new()))
                .await;
        }

        if !self.parked.contains_key(&pid) {
            let receive_maximum = self.service.context.read().await.receive_maximum as usize;
            if self.parked.len() >= receive_maximum {
                return Err(MqttClientError::protocol(
                    reason_code::RECEIVE_MAXIMUM_EXCEEDED,
                    format!("more than {} QoS 2 publishes pending", receive_maximum),
                ));
            }
            let (pubrel_tx, pubrel_rx) = oneshot::channel();
            self.parked.insert(pid, pubrel_tx);
            publish_rec_op::spawn(self.service.clone(), publish, pubrel_rx);
        } else {
            debug!("Duplicate QoS 2 PUBLISH {}", pid);
        }
        self.write_packet(&MqttPubRec::new(pid, reason_code::SUCCESS, Vec::new()))
            .await
    }

    async fn on_pubrel(&mut self, packet_id: u16) -> MqttClientResult<()> {
        let released = self
            .parked
            .remove(&packet_id)
            .is_some_and(|tx| tx.send(()).is_ok());
        if released {
            // The parked task queues the PUBCOMP once the message is delivered
            return Ok(());
        }
        debug!("PUBREL for unknown packet id {}", packet_id);
        self.write_packet(&MqttPubComp::new(
            packet_id,
            reason_code::PACKET_IDENTIFIER_NOT_FOUND,
            Vec::new(),
        ))
        .await
    }

    async fn on_auth(&mut self, packet: MqttAuth) -> MqttClientResult<()> {
        let Some(reply) = self.reauth.take() else {
            return Err(MqttClientError::protocol(
                reason_code::PROTOCOL_ERROR,
                "AUTH without a re-authentication in progress",
            ));
        };
        let (method, authenticator) = {
            let ctx = self.service.context.read().await;
            (ctx.auth_method().map(str::to_owned), ctx.authenticator.clone())
        };
        let Some((method, authenticator)) = method.zip(authenticator) else {
            let _ = reply.send(Err(MqttClientError::cancelled("re-authenticate")));
            return Ok(());
        };
        if packet.method() != Some(method.as_str()) {
            let err = MqttClientError::MalformedPacket {
                packet: "AUTH".to_string(),
                diagnostic: "authentication method mismatch".to_string(),
            };
            let _ = reply.send(Err(err.clone()));
            return Err(err);
        }
        let data = packet.data().unwrap_or_default().to_vec();

        match packet.reason_code {
            reason_code::CONTINUE_AUTHENTICATION => {
                match auth::run_step(authenticator.as_ref(), AuthStep::ServerChallenge, data).await {
                    Ok(answer) => {
                        self.write_packet(&MqttAuth::with_method(
                            reason_code::CONTINUE_AUTHENTICATION,
                            &method,
                            Some(answer),
                        ))
                        .await?;
                        self.reauth = Some(reply);
                    }
                    Err(e) => {
                        let _ = reply.send(Err(e));
                    }
                }
            }
            reason_code::SUCCESS => {
                let result = auth::run_step(authenticator.as_ref(), AuthStep::ServerFinal, data)
                    .await
                    .map(|_| ());
                if result.is_ok() {
                    info!("Re-authentication complete");
                }
                let _ = reply.send(result);
            }
            code => {
                let err = MqttClientError::protocol(
                    reason_code::PROTOCOL_ERROR,
                    format!("AUTH with reason code 0x{:02X} from broker", code),
                );
                let _ = reply.send(Err(err.clone()));
                return Err(err);
            }
        }
        Ok(())
    }

    async fn on_ping_timer(&mut self) -> MqttClientResult<()> {
        match self.ping.poll(Instant::now()) {
            PingAction::SendPingReq => {
                trace!("Sending PINGREQ");
                self.write_packet(&MqttPingReq::new()).await
            }
            PingAction::ResponseTimeout => {
                warn!("PINGRESP not received in time");
                Err(MqttClientError::KeepAliveTimeout)
            }
            PingAction::Nothing => Ok(()),
        }
    }

    /// Ends the current connection: sends the DISCONNECT the error calls
    /// for, if any. The caller reconnects.
    async fn connection_error(&mut self, error: MqttClientError) -> SessionEnd {
        if error.is_cancelled() {
            return SessionEnd::Stopped;
        }
        self.ping.stop();
        if let Some(reply) = self.reauth.take() {
            let _ = reply.send(Err(error.clone()));
        }
        match error.disconnect_reason() {
            Some((code, reason)) => {
                warn!("Disconnecting with 0x{:02X}: {}", code, reason);
                let disconnect = MqttDisconnect::new(code, vec![Property::ReasonString(reason)]);
                let _ = self.write_packet(&disconnect).await;
            }
            None => warn!("Connection lost: {}", error),
        }
        SessionEnd::Reconnect
    }

    async fn write_packet<P: MqttControlPacket>(&mut self, packet: &P) -> MqttClientResult<()> {
        let bytes = packet.to_bytes()?;
        self.write(&bytes).await
    }

    async fn write(&mut self, bytes: &[u8]) -> MqttClientResult<()> {
        let root = &self.service.root;
        let transport = self
            .transport
            .as_mut()
            .ok_or_else(|| MqttClientError::ConnectionLost {
                reason: "not connected".to_string(),
            })?;
        let written = tokio::select! {
            biased;
            _ = root.cancelled() => return Err(MqttClientError::cancelled("write")),
            res = async {
                transport.write_all(bytes).await?;
                transport.flush().await
            } => res,
        };
        written.map_err(|e| MqttClientError::from_io_error(e, "write"))?;
        self.ping.on_outbound(Instant::now());
        Ok(())
    }

    /// Closes and drops the transport. Returns `false` when the client was
    /// cancelled first; the close then carries on in a detached task.
    async fn close_transport(&mut self) -> bool {
        self.parser.reset();
        self.ping.stop();
        let Some(mut transport) = self.transport.take() else {
            return true;
        };
        let closing = tokio::spawn(async move {
            if let Err(e) = transport.close().await {
                debug!("Transport close: {}", e);
            }
        });
        tokio::select! {
            biased;
            _ = closing => true,
            _ = self.service.root.cancelled() => {
                debug!("Cancelled while closing the transport, finishing in background");
                false
            }
        }
    }

    fn abort_inflight(&mut self) {
        for mut entry in self.inflight.drain() {
            self.service.release_pid(entry.packet_id);
            entry.complete(Err(MqttClientError::cancelled("request")));
        }
    }

    async fn shutdown(&mut self) {
        self.close_transport().await;
        self.cmd_rx.close();
        while let Ok(cmd) = self.cmd_rx.try_recv() {
            self.queue.enqueue(cmd.priority(), cmd);
        }
        for (_, cmd) in self.queue.drain() {
            cmd.abort(&self.service);
        }
        self.abort_inflight();
        if let Some(reply) = self.reauth.take() {
            let _ = reply.send(Err(MqttClientError::cancelled("re-authenticate")));
        }
        self.parked.clear();
        self.service.root.cancel();
    }
}

async fn read_into(transport: Option<&mut BoxedTransport>, buffer: &mut BytesMut) -> io::Result<usize> {
    match transport {
        Some(transport) => transport.read_buf(buffer).await,
        None => std::future::pending().await,
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
