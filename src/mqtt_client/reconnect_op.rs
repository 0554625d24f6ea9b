// SPDX-License-Identifier: MPL-2.0

//! Reconnection driver
//!
//! Walks the broker list from a cursor. A failed attempt moves the cursor to
//! the next endpoint and waits for the backoff delay; endpoints that cannot
//! be resolved are skipped without delay until a whole round failed that way.

use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

use super::backoff::ExponentialBackoff;
use super::client::ClientService;
use super::connect_op::{ConnectOp, Connection};
use super::error::{MqttClientError, MqttClientResult};
use super::transport::Endpoint;

#[derive(Debug)]
pub(crate) struct ReconnectOp {
    endpoints: Vec<Endpoint>,
    cursor: usize,
    backoff: ExponentialBackoff,
}

impl ReconnectOp {
    pub(crate) fn new(endpoints: Vec<Endpoint>) -> MqttClientResult<Self> {
        if endpoints.is_empty() {
            return Err(MqttClientError::EmptyBrokerList);
        }
        Ok(Self {
            endpoints,
            cursor: 0,
            backoff: ExponentialBackoff::new(),
        })
    }

    pub(crate) fn current(&self) -> &Endpoint {
        &self.endpoints[self.cursor]
    }

    fn advance(&mut self) {
        self.cursor = (self.cursor + 1) % self.endpoints.len();
    }

    pub(crate) fn reset(&mut self) {
        self.backoff.reset();
    }

    pub(crate) fn next_delay(&mut self) -> Duration {
        self.backoff.next_delay()
    }

    /// Connects to the first endpoint that accepts, waiting `initial_delay`
    /// before the first attempt. Only cancellation and fatal errors end it.
    pub(crate) async fn connect(
        &mut self,
        service: &ClientService,
        initial_delay: Option<Duration>,
    ) -> MqttClientResult<Connection> {
        if let Some(delay) = initial_delay {
            info!("Reconnecting in {:?}", delay);
            self.wait(service, delay).await?;
        }

        let mut unresolved = 0;
        loop {
            let endpoint = self.current().clone();
            match ConnectOp::new(service, &endpoint, service.root.child_token())
                .run()
                .await
            {
                Ok(connection) => {
                    self.reset();
                    return Ok(connection);
                }
                Err(e) if e.is_cancelled() || e.is_fatal() => return Err(e),
                Err(e @ MqttClientError::ResolveFailed { .. })
                    if unresolved + 1 < self.endpoints.len() =>
                {
                    unresolved += 1;
                    warn!("{}, trying next broker", e);
                    self.advance();
                }
                Err(e) => {
                    unresolved = 0;
                    self.advance();
                    let delay = self.next_delay();
                    if e.is_recoverable() {
                        warn!(
                            "Connection attempt failed: {}. Retrying {} in {:?}",
                            e,
                            self.current(),
                            delay
                        );
                    } else {
                        error!(
                            "Connection attempt failed: {}. Retrying {} in {:?} anyway",
                            e,
                            self.current(),
                            delay
                        );
                    }
                    self.wait(service, delay).await?;
                }
            }
        }
    }

    async fn wait(&self, service: &ClientService, delay: Duration) -> MqttClientResult<()> {
        tokio::select! {
            _ = service.root.cancelled() => Err(MqttClientError::cancelled("reconnect")),
            _ = sleep(delay) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mqtt_client::opts::MqttClientOptions;
    use crate::mqtt_client::transport::{BoxedTransport, Connector, TransportError};
    use crate::mqtt_serde::control_packet::MqttControlPacket;
    use crate::mqtt_serde::mqttv5::connackv5::MqttConnAck;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::time::Instant;
    use tokio_util::sync::CancellationToken;

    /// Hosts starting with "nx" do not resolve, "down" refuses, anything else
    /// answers CONNACK.
    struct ScriptedConnector {
        attempts: Mutex<Vec<(String, Instant)>>,
        stop_after: usize,
        stop: Mutex<Option<CancellationToken>>,
    }

    #[async_trait]
    impl Connector for ScriptedConnector {
        async fn connect(&self, endpoint: &Endpoint) -> Result<BoxedTransport, TransportError> {
            {
                let mut attempts = self.attempts.lock().unwrap();
                attempts.push((endpoint.host.clone(), Instant::now()));
                if attempts.len() >= self.stop_after {
                    if let Some(stop) = self.stop.lock().unwrap().as_ref() {
                        stop.cancel();
                    }
                }
            }
            if endpoint.host.starts_with("nx") {
                return Err(TransportError::Resolve(endpoint.host.clone()));
            }
            if endpoint.host == "down" {
                return Err(TransportError::ConnectionFailed("refused".to_string()));
            }
            let (client, mut broker) = tokio::io::duplex(1024);
            tokio::spawn(async move {
                let mut buf = [0u8; 256];
                let _ = broker.read(&mut buf).await;
                let connack = MqttConnAck::new(false, 0, vec![]).to_bytes().unwrap();
                broker.write_all(&connack).await.unwrap();
                let _ = broker.read(&mut buf).await;
            });
            Ok(Box::new(client))
        }
    }

    fn setup(brokers: &str, stop_after: usize) -> (Arc<ClientService>, Arc<ScriptedConnector>) {
        let options = MqttClientOptions::builder().brokers(brokers).build().unwrap();
        let connector = Arc::new(ScriptedConnector {
            attempts: Mutex::new(Vec::new()),
            stop_after,
            stop: Mutex::new(None),
        });
        let service = ClientService::new(options, connector.clone(), None, None, None);
        *connector.stop.lock().unwrap() = Some(service.root.clone());
        (service, connector)
    }

    #[test]
    fn test_empty_list_is_fatal() {
        assert_eq!(
            ReconnectOp::new(Vec::new()).unwrap_err(),
            MqttClientError::EmptyBrokerList
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_unresolvable_endpoints_skipped_without_delay() {
        let (service, connector) = setup("nx1, nx2, up", usize::MAX);
        let mut op = ReconnectOp::new(service.options.brokers.clone()).unwrap();
        let start = Instant::now();
        op.connect(&service, None).await.unwrap();
        assert_eq!(Instant::now(), start);

        let attempts = connector.attempts.lock().unwrap();
        let hosts: Vec<&str> = attempts.iter().map(|(h, _)| h.as_str()).collect();
        assert_eq!(hosts, vec!["nx1", "nx2", "up"]);
        // Stays on the endpoint that worked
        assert_eq!(op.current().host, "up");
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_back_off_and_rotate() {
        let (service, connector) = setup("down, nx", 4);
        let mut op = ReconnectOp::new(service.options.brokers.clone()).unwrap();
        let err = op.connect(&service, None).await.err().unwrap();
        assert!(err.is_cancelled());

        let attempts = connector.attempts.lock().unwrap();
        let hosts: Vec<&str> = attempts.iter().map(|(h, _)| h.as_str()).collect();
        assert_eq!(hosts, vec!["down", "nx", "down", "nx"]);
        let gaps: Vec<u128> = attempts
            .windows(2)
            .map(|w| (w[1].1 - w[0].1).as_millis())
            .collect();
        assert!((500..1500).contains(&gaps[0]), "gap {}", gaps[0]);
        // "nx" does not resolve, "down" follows at once
        assert_eq!(gaps[1], 0);
        assert!((1500..2500).contains(&gaps[2]), "gap {}", gaps[2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_delay_applies() {
        let (service, _connector) = setup("up", usize::MAX);
        let mut op = ReconnectOp::new(service.options.brokers.clone()).unwrap();
        let start = Instant::now();
        op.connect(&service, Some(Duration::from_millis(800)))
            .await
            .unwrap();
        assert_eq!(Instant::now() - start, Duration::from_millis(800));
    }
}
