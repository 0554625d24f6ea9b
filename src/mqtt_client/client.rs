// SPDX-License-Identifier: MPL-2.0

//! Public client handle
//!
//! [`MqttClient`] is a cheap clone around a shared `ClientService`. One task
//! drives the connection through [`MqttClient::async_run`]; every other
//! method builds a request in the caller's task, hands it to the session loop
//! over a channel and waits for the outcome.

use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::auth::Authenticator;
use super::commands::{PublishCommand, SubscribeCommand, UnsubscribeCommand};
use super::context::{MqttContext, ServerCapabilities};
use super::disconnect_op;
use super::error::{MqttClientError, MqttClientResult};
use super::opts::MqttClientOptions;
use super::packet_id::PacketIdAllocator;
use super::publish_op::{self, PublishResult};
use super::subscribe_op::{self, SubscribeResult};
use super::transport::{Connector, StreamLayer, TcpConnector};
use super::unsubscribe_op::{self, UnsubscribeResult};
use super::worker::{ClientWorker, Command};
use crate::mqtt_serde::mqttv5::common::properties::Property;
use crate::mqtt_serde::mqttv5::publishv5::MqttPublish;
use crate::mqtt_session::SessionState;

/// State shared by the client handles, the session loop and parked receivers.
pub(crate) struct ClientService {
    pub(crate) options: MqttClientOptions,
    pub(crate) context: RwLock<MqttContext>,
    pub(crate) session: SessionState,
    pub(crate) pids: Mutex<PacketIdAllocator>,
    pub(crate) connector: Arc<dyn Connector>,
    pub(crate) tls: Option<Arc<dyn StreamLayer>>,
    pub(crate) ws: Option<Arc<dyn StreamLayer>>,
    pub(crate) root: CancellationToken,
    pub(crate) cmd_tx: mpsc::UnboundedSender<Command>,
    cmd_rx: Mutex<Option<mpsc::UnboundedReceiver<Command>>>,
    /// Unbounded; acknowledgments never wait on the application
    pub(crate) inbound_tx: mpsc::UnboundedSender<MqttPublish>,
    inbound_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<MqttPublish>>,
}

impl ClientService {
    pub(crate) fn new(
        options: MqttClientOptions,
        connector: Arc<dyn Connector>,
        tls: Option<Arc<dyn StreamLayer>>,
        ws: Option<Arc<dyn StreamLayer>>,
        authenticator: Option<Arc<dyn Authenticator>>,
    ) -> Arc<Self> {
        let root = CancellationToken::new();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            context: RwLock::new(MqttContext::new(&options, authenticator)),
            session: SessionState::new(root.clone()),
            pids: Mutex::new(PacketIdAllocator::new()),
            options,
            connector,
            tls,
            ws,
            root,
            cmd_tx,
            cmd_rx: Mutex::new(Some(cmd_rx)),
            inbound_tx,
            inbound_rx: tokio::sync::Mutex::new(inbound_rx),
        })
    }

    pub(crate) fn allocate_pid(&self) -> MqttClientResult<u16> {
        self.pids
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .allocate()
    }

    pub(crate) fn release_pid(&self, packet_id: u16) {
        self.pids
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .release(packet_id);
    }

    pub(crate) fn is_started(&self) -> bool {
        self.cmd_rx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_none()
    }

    pub(crate) fn take_receiver(&self) -> Option<mpsc::UnboundedReceiver<Command>> {
        self.cmd_rx.lock().unwrap_or_else(|e| e.into_inner()).take()
    }

    pub(crate) async fn inbound(&self) -> tokio::sync::MutexGuard<'_, mpsc::UnboundedReceiver<MqttPublish>> {
        self.inbound_rx.lock().await
    }

    pub(crate) fn submit(&self, command: Command, operation: &str) -> MqttClientResult<()> {
        if self.root.is_cancelled() {
            return Err(MqttClientError::cancelled(operation));
        }
        self.cmd_tx
            .send(command)
            .map_err(|_| MqttClientError::cancelled(operation))
    }

    /// Waits for the session loop's answer. Cancelling either token, or the
    /// loop dropping the reply, completes with aborted-operation.
    pub(crate) async fn await_reply<T>(
        &self,
        reply: oneshot::Receiver<MqttClientResult<T>>,
        cancel: Option<&CancellationToken>,
        operation: &str,
    ) -> MqttClientResult<T> {
        let user = cancel.cloned().unwrap_or_default();
        tokio::select! {
            biased;
            _ = self.root.cancelled() => Err(MqttClientError::cancelled(operation)),
            _ = user.cancelled() => {
                debug!("{} cancelled by caller", operation);
                Err(MqttClientError::cancelled(operation))
            }
            res = reply => res.unwrap_or_else(|_| Err(MqttClientError::cancelled(operation))),
        }
    }
}

/// MQTT 5.0 client.
///
/// ```no_run
/// use mqtt5_engine::mqtt_client::{MqttClient, MqttClientOptions};
/// use mqtt5_engine::mqtt_client::commands::PublishCommand;
///
/// # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
/// let options = MqttClientOptions::builder()
///     .brokers("localhost:1883")
///     .client_id("demo")
///     .build()?;
/// let client = MqttClient::new(options);
/// let runner = client.clone();
/// tokio::spawn(async move { runner.async_run().await });
///
/// client
///     .async_publish(PublishCommand::simple("demo/topic", b"hello".to_vec(), 1, false))
///     .await?;
/// client.async_disconnect(0, Vec::new()).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct MqttClient {
    service: Arc<ClientService>,
}

impl MqttClient {
    /// Client over plain TCP.
    pub fn new(options: MqttClientOptions) -> Self {
        Self::builder(options).build()
    }

    pub fn builder(options: MqttClientOptions) -> MqttClientBuilder {
        MqttClientBuilder {
            options,
            connector: None,
            tls: None,
            ws: None,
            authenticator: None,
        }
    }

    /// Drives connection, reconnection and all traffic until the client is
    /// cancelled or disconnected. May be called once.
    ///
    /// Returns `Ok(())` on a client initiated stop and the fatal error
    /// otherwise.
    pub async fn async_run(&self) -> MqttClientResult<()> {
        let cmd_rx = self
            .service
            .take_receiver()
            .ok_or_else(|| MqttClientError::InvalidConfiguration {
                field: "async_run".to_string(),
                reason: "the client is already running or has stopped".to_string(),
            })?;
        info!("MQTT client starting");
        ClientWorker::new(self.service.clone(), cmd_rx).run().await
    }

    pub async fn async_publish(&self, command: PublishCommand) -> MqttClientResult<PublishResult> {
        publish_op::publish(&self.service, command).await
    }

    pub async fn async_subscribe(
        &self,
        command: SubscribeCommand,
    ) -> MqttClientResult<SubscribeResult> {
        subscribe_op::subscribe(&self.service, command).await
    }

    pub async fn async_unsubscribe(
        &self,
        command: UnsubscribeCommand,
    ) -> MqttClientResult<UnsubscribeResult> {
        unsubscribe_op::unsubscribe(&self.service, command).await
    }

    /// Next application message. Dropping this future does not affect the
    /// session loop; after the client stops it fails with aborted-operation.
    ///
    /// Inbound messages are queued without a bound and never hold up the
    /// session loop, so a client with subscriptions has to keep receiving.
    pub async fn async_receive(&self) -> MqttClientResult<MqttPublish> {
        let mut inbound = self.service.inbound().await;
        tokio::select! {
            biased;
            msg = inbound.recv() => msg.ok_or_else(|| MqttClientError::cancelled("receive")),
            _ = self.service.root.cancelled() => Err(MqttClientError::cancelled("receive")),
        }
    }

    /// Sends DISCONNECT ahead of any unsent request and stops the client.
    pub async fn async_disconnect(
        &self,
        reason_code: u8,
        properties: Vec<Property>,
    ) -> MqttClientResult<()> {
        disconnect_op::disconnect(&self.service, reason_code, properties).await
    }

    /// Runs a re-authentication (AUTH 0x19) with the configured authenticator.
    pub async fn re_authenticate(&self) -> MqttClientResult<()> {
        let (reply, rx) = oneshot::channel();
        self.service
            .submit(Command::ReAuth { reply }, "re-authenticate")?;
        self.service.await_reply(rx, None, "re-authenticate").await
    }

    /// Stops the session loop and aborts every pending operation. Idempotent.
    pub fn cancel(&self) {
        if !self.service.root.is_cancelled() {
            info!("MQTT client cancelled");
        }
        self.service.root.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.service.root.is_cancelled()
    }

    pub fn session_present(&self) -> bool {
        self.service.session.session_present()
    }

    pub fn subscriptions_present(&self) -> bool {
        self.service.session.subscriptions_present()
    }

    /// Limits from the last CONNACK.
    pub async fn server_capabilities(&self) -> Option<ServerCapabilities> {
        self.service.context.read().await.capabilities.clone()
    }

    /// Client identifier in use, including one assigned by the server.
    pub async fn client_id(&self) -> String {
        self.service.context.read().await.client_id.clone()
    }
}

/// Assembles an [`MqttClient`] with non-default transport or authentication.
pub struct MqttClientBuilder {
    options: MqttClientOptions,
    connector: Option<Arc<dyn Connector>>,
    tls: Option<Arc<dyn StreamLayer>>,
    ws: Option<Arc<dyn StreamLayer>>,
    authenticator: Option<Arc<dyn Authenticator>>,
}

impl MqttClientBuilder {
    /// Replaces the default TCP connector.
    pub fn connector(mut self, connector: impl Connector + 'static) -> Self {
        self.connector = Some(Arc::new(connector));
        self
    }

    /// Runs right after the connector, e.g. [`RustlsTlsLayer`](crate::mqtt_client::transport::rustls_tls).
    pub fn tls_layer(mut self, layer: impl StreamLayer + 'static) -> Self {
        self.tls = Some(Arc::new(layer));
        self
    }

    /// Runs after the TLS layer, if any.
    pub fn ws_layer(mut self, layer: impl StreamLayer + 'static) -> Self {
        self.ws = Some(Arc::new(layer));
        self
    }

    pub fn authenticator(mut self, authenticator: impl Authenticator + 'static) -> Self {
        self.authenticator = Some(Arc::new(authenticator));
        self
    }

    pub fn build(self) -> MqttClient {
        let connector = self
            .connector
            .unwrap_or_else(|| Arc::new(TcpConnector::default()));
        MqttClient {
            service: ClientService::new(
                self.options,
                connector,
                self.tls,
                self.ws,
                self.authenticator,
            ),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::mqtt_client::transport::{BoxedTransport, Endpoint, TransportError};
    use async_trait::async_trait;
    use tokio::io::DuplexStream;

    /// Hands out one end of a fresh duplex pipe per connect; the other end
    /// goes to the test through the receiver.
    pub(crate) struct PipeConnector {
        peers: mpsc::UnboundedSender<DuplexStream>,
    }

    impl PipeConnector {
        pub(crate) fn new() -> (Self, mpsc::UnboundedReceiver<DuplexStream>) {
            let (peers, rx) = mpsc::unbounded_channel();
            (Self { peers }, rx)
        }
    }

    #[async_trait]
    impl Connector for PipeConnector {
        async fn connect(&self, _endpoint: &Endpoint) -> Result<BoxedTransport, TransportError> {
            let (client, broker) = tokio::io::duplex(64 * 1024);
            self.peers
                .send(broker)
                .map_err(|_| TransportError::ConnectionFailed("no broker".to_string()))?;
            Ok(Box::new(client))
        }
    }

    pub(crate) fn service_with(
        options: MqttClientOptions,
        authenticator: Option<Arc<dyn Authenticator>>,
    ) -> (Arc<ClientService>, mpsc::UnboundedReceiver<DuplexStream>) {
        let (connector, peers) = PipeConnector::new();
        (
            ClientService::new(options, Arc::new(connector), None, None, authenticator),
            peers,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let client = MqttClient::new(MqttClientOptions::default());
        client.cancel();
        client.cancel();
        assert!(client.is_cancelled());
        assert!(client.async_receive().await.unwrap_err().is_cancelled());
        // A stopped client refuses new work
        let err = client
            .async_publish(PublishCommand::simple("t", b"x".to_vec(), 0, false))
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn test_run_only_once() {
        let client = MqttClient::new(MqttClientOptions::default());
        client.cancel();
        assert!(client.async_run().await.is_ok());
        assert!(matches!(
            client.async_run().await,
            Err(MqttClientError::InvalidConfiguration { .. })
        ));
    }

    #[tokio::test]
    async fn test_disconnect_before_run_aborts() {
        let client = MqttClient::new(MqttClientOptions::default());
        let err = client.async_disconnect(0, Vec::new()).await.unwrap_err();
        assert!(err.is_cancelled());
        assert!(client.is_cancelled());
    }

    #[tokio::test]
    async fn test_empty_broker_list_is_fatal() {
        let mut options = MqttClientOptions::default();
        options.brokers.clear();
        let client = MqttClient::new(options);
        assert_eq!(
            client.async_run().await,
            Err(MqttClientError::EmptyBrokerList)
        );
    }
}
