// SPDX-License-Identifier: MPL-2.0

pub mod auth;
pub mod backoff;
pub mod client;
pub mod commands;
mod connect_op;
pub mod context;
mod disconnect_op;
pub mod error;
pub mod inflight;
pub mod opts;
pub mod packet_id;
pub mod ping_op;
pub mod publish_op;
mod publish_rec_op;
mod reconnect_op;
pub mod subscribe_op;
pub mod transport;
pub mod unsubscribe_op;
mod worker;

pub use auth::{AuthStep, Authenticator};
pub use client::{MqttClient, MqttClientBuilder};
pub use commands::{PublishCommand, SubscribeCommand, UnsubscribeCommand};
pub use context::ServerCapabilities;
pub use error::{MqttClientError, MqttClientResult};
pub use opts::MqttClientOptions;
pub use publish_op::PublishResult;
pub use subscribe_op::SubscribeResult;
pub use transport::{BoxedTransport, Connector, Endpoint, StreamLayer, Transport, TransportError};
pub use unsubscribe_op::UnsubscribeResult;
