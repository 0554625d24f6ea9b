// SPDX-License-Identifier: MPL-2.0

//! Error types for MQTT client operations
//!
//! The variants are grouped by how the engine reacts to them: transport and
//! malformed-packet errors lead to a reconnect, validation errors are returned
//! to the caller before anything is written, and only an empty broker list or
//! an invalid configuration stop the client.

use crate::mqtt_client::transport::TransportError;
use crate::mqtt_serde::mqttv5::reason_code;
use crate::mqtt_serde::parser::ParseError;
use std::fmt;
use std::io;

#[derive(Debug, Clone, PartialEq)]
pub enum MqttClientError {
    // ==================== Connection ====================
    /// CONNACK carried a non-success reason code
    ConnectionRefused { reason_code: u8, description: String },

    /// Connection lost unexpectedly
    ConnectionLost { reason: String },

    /// Transport connect, handshake, read or write failure
    Transport { kind: io::ErrorKind, message: String },

    /// Broker host name did not resolve
    ResolveFailed { endpoint: String, reason: String },

    /// Server went quiet after PINGREQ
    KeepAliveTimeout,

    // ==================== Protocol ====================
    /// Inbound packet failed to decode, DISCONNECT 0x81 follows
    MalformedPacket { packet: String, diagnostic: String },

    /// Well-formed packet that is not allowed here, DISCONNECT with `reason_code` follows
    ProtocolViolation { reason_code: u8, message: String },

    // ==================== Validation (nothing sent) ====================
    InvalidTopic { topic: String, reason: String },

    /// A property failed its range or encoding checks
    MalformedProperty { message: String },

    QosNotSupported { requested: u8, maximum: u8 },

    RetainNotAvailable,

    TopicAliasInvalid { alias: u16, maximum: u16 },

    WildcardNotAvailable,

    SharedSubscriptionNotAvailable,

    SubscriptionIdentifierNotAvailable,

    /// All 65535 packet identifiers are in use
    PidOverrun,

    /// Encoded packet exceeds the server's Maximum Packet Size
    PacketTooLarge { size: usize, maximum: u32 },

    // ==================== Operation ====================
    /// Cancelled by the caller, aborted by a disconnect, or discarded with the session
    OperationCancelled { operation: String },

    // ==================== Authentication ====================
    AuthenticationFailed { method: String, reason: String },

    // ==================== Fatal ====================
    EmptyBrokerList,

    InvalidConfiguration { field: String, reason: String },
}

impl MqttClientError {
    /// Returns true if the error is transient: retrying or reconnecting may succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ConnectionRefused { .. }
                | Self::ConnectionLost { .. }
                | Self::Transport { .. }
                | Self::ResolveFailed { .. }
                | Self::KeepAliveTimeout
                | Self::MalformedPacket { .. }
                | Self::ProtocolViolation { .. }
                | Self::PidOverrun
        )
    }

    /// Returns true if the error means the current connection has to be replaced.
    pub fn should_reconnect(&self) -> bool {
        matches!(
            self,
            Self::ConnectionRefused { .. }
                | Self::ConnectionLost { .. }
                | Self::Transport { .. }
                | Self::ResolveFailed { .. }
                | Self::KeepAliveTimeout
                | Self::MalformedPacket { .. }
                | Self::ProtocolViolation { .. }
                | Self::AuthenticationFailed { .. }
        )
    }

    /// Returns true if the client cannot continue at all.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::EmptyBrokerList | Self::InvalidConfiguration { .. }
        )
    }

    /// Returns true for errors raised by request validation, before any I/O.
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidTopic { .. }
                | Self::MalformedProperty { .. }
                | Self::QosNotSupported { .. }
                | Self::RetainNotAvailable
                | Self::TopicAliasInvalid { .. }
                | Self::WildcardNotAvailable
                | Self::SharedSubscriptionNotAvailable
                | Self::SubscriptionIdentifierNotAvailable
                | Self::PidOverrun
                | Self::PacketTooLarge { .. }
        )
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::OperationCancelled { .. })
    }

    pub(crate) fn cancelled(operation: &str) -> Self {
        Self::OperationCancelled {
            operation: operation.to_string(),
        }
    }

    pub(crate) fn refused(code: u8) -> Self {
        Self::ConnectionRefused {
            reason_code: code,
            description: reason_code::describe(code).to_string(),
        }
    }

    pub(crate) fn malformed(packet: &str, error: &ParseError) -> Self {
        Self::MalformedPacket {
            packet: packet.to_string(),
            diagnostic: error.diagnostic(),
        }
    }

    pub(crate) fn protocol(code: u8, message: impl Into<String>) -> Self {
        Self::ProtocolViolation {
            reason_code: code,
            message: message.into(),
        }
    }

    pub fn from_io_error(error: io::Error, context: &str) -> Self {
        Self::Transport {
            kind: error.kind(),
            message: format!("{}: {}", context, error),
        }
    }

    /// Reason code and Reason String for the DISCONNECT this error should produce, if any.
    pub(crate) fn disconnect_reason(&self) -> Option<(u8, String)> {
        match self {
            Self::MalformedPacket { packet, diagnostic } => Some((
                reason_code::MALFORMED_PACKET,
                format!("Malformed {}: {}", packet, diagnostic),
            )),
            Self::ProtocolViolation {
                reason_code,
                message,
            } => Some((*reason_code, message.clone())),
            Self::KeepAliveTimeout => Some((
                reason_code::KEEP_ALIVE_TIMEOUT,
                "PINGRESP not received".to_string(),
            )),
            _ => None,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            Self::ConnectionRefused {
                reason_code,
                description,
            } => format!(
                "Connection refused by broker: {} (code: 0x{:02X})",
                description, reason_code
            ),
            Self::ConnectionLost { reason } => format!("Connection to broker lost: {}", reason),
            Self::Transport { kind, message } => {
                format!("Transport error ({:?}): {}", kind, message)
            }
            Self::ResolveFailed { endpoint, reason } => {
                format!("Could not resolve {}: {}", endpoint, reason)
            }
            Self::KeepAliveTimeout => "No PINGRESP within the keep-alive timeout".to_string(),
            Self::MalformedPacket { packet, diagnostic } => {
                format!("Malformed {}: {}", packet, diagnostic)
            }
            Self::ProtocolViolation {
                reason_code,
                message,
            } => format!(
                "MQTT protocol violation (code: 0x{:02X}): {}",
                reason_code, message
            ),
            Self::InvalidTopic { topic, reason } => {
                format!("Invalid topic '{}': {}", topic, reason)
            }
            Self::MalformedProperty { message } => format!("Malformed property: {}", message),
            Self::QosNotSupported { requested, maximum } => format!(
                "QoS {} requested but the server supports at most QoS {}",
                requested, maximum
            ),
            Self::RetainNotAvailable => "Server does not support retained messages".to_string(),
            Self::TopicAliasInvalid { alias, maximum } => format!(
                "Topic alias {} is outside the server's range 1..={}",
                alias, maximum
            ),
            Self::WildcardNotAvailable => {
                "Server does not support wildcard subscriptions".to_string()
            }
            Self::SharedSubscriptionNotAvailable => {
                "Server does not support shared subscriptions".to_string()
            }
            Self::SubscriptionIdentifierNotAvailable => {
                "Server does not support subscription identifiers".to_string()
            }
            Self::PidOverrun => {
                "All packet identifiers are in use. Wait for pending operations to complete."
                    .to_string()
            }
            Self::PacketTooLarge { size, maximum } => format!(
                "Packet of {} bytes exceeds the server's maximum packet size {}",
                size, maximum
            ),
            Self::OperationCancelled { operation } => {
                format!("Operation '{}' was cancelled", operation)
            }
            Self::AuthenticationFailed { method, reason } => {
                format!("Authentication failed (method: {}): {}", method, reason)
            }
            Self::EmptyBrokerList => "No broker to connect to".to_string(),
            Self::InvalidConfiguration { field, reason } => {
                format!("Invalid configuration for '{}': {}", field, reason)
            }
        }
    }
}

impl fmt::Display for MqttClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.user_message())
    }
}

impl std::error::Error for MqttClientError {}

impl From<io::Error> for MqttClientError {
    fn from(error: io::Error) -> Self {
        Self::Transport {
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

impl From<TransportError> for MqttClientError {
    fn from(error: TransportError) -> Self {
        match error {
            TransportError::Io(e) => e.into(),
            TransportError::Resolve(reason) => Self::ResolveFailed {
                endpoint: String::new(),
                reason,
            },
            other => Self::Transport {
                kind: io::ErrorKind::Other,
                message: other.to_string(),
            },
        }
    }
}

// Codec errors surfacing from request encoding are property or field violations.
impl From<ParseError> for MqttClientError {
    fn from(error: ParseError) -> Self {
        Self::MalformedProperty {
            message: error.to_string(),
        }
    }
}

pub type MqttClientResult<T> = Result<T, MqttClientError>;
