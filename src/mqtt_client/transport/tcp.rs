// SPDX-License-Identifier: MPL-2.0

//! TCP transport implementation

use super::{BoxedTransport, Connector, Endpoint, Transport, TransportError};
use async_trait::async_trait;
use std::net::SocketAddr;
use tokio::net::{lookup_host, TcpStream};
use tracing::debug;

impl Transport for TcpStream {
    fn remote_addr(&self) -> Option<String> {
        self.peer_addr().ok().map(|addr| addr.to_string())
    }
}

/// Resolves the endpoint and connects to the first address that accepts.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    nodelay: bool,
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self { nodelay: true }
    }
}

impl TcpConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set TCP_NODELAY on new connections (default: true)
    pub fn nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, endpoint: &Endpoint) -> Result<BoxedTransport, TransportError> {
        let addrs: Vec<SocketAddr> = lookup_host((endpoint.host.as_str(), endpoint.port))
            .await
            .map_err(|e| TransportError::Resolve(format!("{}: {}", endpoint, e)))?
            .collect();
        if addrs.is_empty() {
            return Err(TransportError::Resolve(format!(
                "{}: no addresses",
                endpoint
            )));
        }

        let mut last_error = None;
        for addr in addrs {
            match TcpStream::connect(addr).await {
                Ok(stream) => {
                    stream.set_nodelay(self.nodelay)?;
                    debug!("TCP connected to {} ({})", endpoint, addr);
                    return Ok(Box::new(stream));
                }
                Err(e) => {
                    debug!("TCP connect to {} failed: {}", addr, e);
                    last_error = Some(e);
                }
            }
        }
        Err(TransportError::ConnectionFailed(format!(
            "TCP connection to {} failed: {}",
            endpoint,
            last_error.map(|e| e.to_string()).unwrap_or_default()
        )))
    }
}
