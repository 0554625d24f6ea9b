// SPDX-License-Identifier: MPL-2.0

//! Transport abstraction layer for MQTT connections
//!
//! A [`Connector`] opens the base byte stream to an [`Endpoint`]. Optional
//! [`StreamLayer`]s (TLS, WebSocket) then wrap that stream in order before the
//! MQTT handshake runs on top. The engine only sees a [`BoxedTransport`].

use async_trait::async_trait;
use std::fmt;
use std::io;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

pub mod rustls_tls;
pub mod tcp;

/// Error type for transport operations
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Name resolution failed: {0}")]
    Resolve(String),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("{layer} handshake failed: {reason}")]
    Handshake { layer: &'static str, reason: String },

    #[error("Transport not supported: {0}")]
    NotSupported(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),
}

/// A connected duplex byte stream.
#[async_trait]
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin {
    /// Orderly shutdown of the write half. Errors are reported but the engine
    /// discards them.
    async fn close(&mut self) -> Result<(), TransportError> {
        self.shutdown().await.map_err(TransportError::Io)
    }

    /// Remote address, when the stream has one.
    fn remote_addr(&self) -> Option<String> {
        None
    }
}

/// Boxed transport for dynamic dispatch
pub type BoxedTransport = Box<dyn Transport>;

/// In-memory pipe, used by tests and in-process brokers.
impl Transport for tokio::io::DuplexStream {}

/// Opens the base stream to one broker endpoint.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, endpoint: &Endpoint) -> Result<BoxedTransport, TransportError>;
}

/// Wraps an established stream, e.g. TLS over TCP or WebSocket over TLS.
#[async_trait]
pub trait StreamLayer: Send + Sync {
    fn name(&self) -> &'static str;

    async fn handshake(
        &self,
        endpoint: &Endpoint,
        inner: BoxedTransport,
    ) -> Result<BoxedTransport, TransportError>;
}

pub const DEFAULT_MQTT_PORT: u16 = 1883;

/// One broker address. `path` is only used by WebSocket layers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub path: Option<String>,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            path: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Parses `host`, `host:port`, `[v6]` or `[v6]:port`, with an optional `/path` suffix.
    pub fn parse(input: &str, default_port: u16) -> Result<Self, TransportError> {
        let input = input.trim();
        let (authority, path) = match input.find('/') {
            Some(idx) => (&input[..idx], Some(input[idx..].to_string())),
            None => (input, None),
        };
        if authority.is_empty() {
            return Err(TransportError::InvalidAddress(input.to_string()));
        }

        let (host, port) = if let Some(rest) = authority.strip_prefix('[') {
            let close = rest
                .find(']')
                .ok_or_else(|| TransportError::InvalidAddress(input.to_string()))?;
            let host = &rest[..close];
            let port = match rest[close + 1..].strip_prefix(':') {
                Some(p) => parse_port(p, input)?,
                None if rest[close + 1..].is_empty() => default_port,
                None => return Err(TransportError::InvalidAddress(input.to_string())),
            };
            (host, port)
        } else {
            match authority.rsplit_once(':') {
                Some((host, p)) => (host, parse_port(p, input)?),
                None => (authority, default_port),
            }
        };

        if host.is_empty() {
            return Err(TransportError::InvalidAddress(input.to_string()));
        }
        Ok(Self {
            host: host.to_string(),
            port,
            path,
        })
    }

    /// Splits a comma separated broker list, e.g. `"b1.local:1883, b2.local"`.
    pub fn parse_list(input: &str, default_port: u16) -> Result<Vec<Self>, TransportError> {
        input
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| Self::parse(s, default_port))
            .collect()
    }
}

fn parse_port(port: &str, input: &str) -> Result<u16, TransportError> {
    port.parse::<u16>()
        .map_err(|_| TransportError::InvalidAddress(format!("bad port in {}", input)))
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)?;
        } else {
            write!(f, "{}:{}", self.host, self.port)?;
        }
        if let Some(path) = &self.path {
            write!(f, "{}", path)?;
        }
        Ok(())
    }
}

pub use tcp::TcpConnector;

#[cfg(feature = "rustls-tls")]
pub use rustls_tls::{RustlsTlsConfig, RustlsTlsLayer};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_endpoint() {
        assert_eq!(
            Endpoint::parse("broker.local", 1883).unwrap(),
            Endpoint::new("broker.local", 1883)
        );
        assert_eq!(
            Endpoint::parse("broker.local:8883", 1883).unwrap(),
            Endpoint::new("broker.local", 8883)
        );
        assert_eq!(
            Endpoint::parse("[::1]:1884", 1883).unwrap(),
            Endpoint::new("::1", 1884)
        );
        assert_eq!(
            Endpoint::parse("ws.local:8083/mqtt", 1883).unwrap(),
            Endpoint::new("ws.local", 8083).with_path("/mqtt")
        );
        assert!(Endpoint::parse("broker:notaport", 1883).is_err());
        assert!(Endpoint::parse(":1883", 1883).is_err());
    }

    #[test]
    fn test_parse_list() {
        let list = Endpoint::parse_list("b1:1883, b2 ,", 1883).unwrap();
        assert_eq!(
            list,
            vec![Endpoint::new("b1", 1883), Endpoint::new("b2", 1883)]
        );
        assert!(Endpoint::parse_list("", 1883).unwrap().is_empty());
    }

    #[test]
    fn test_endpoint_display() {
        assert_eq!(Endpoint::new("::1", 1883).to_string(), "[::1]:1883");
        assert_eq!(
            Endpoint::new("h", 80).with_path("/mqtt").to_string(),
            "h:80/mqtt"
        );
    }
}
