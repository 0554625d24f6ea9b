// SPDX-License-Identifier: MPL-2.0

//! Asynchronous MQTT 5.0 client engine.
//!
//! [`mqtt_serde`] is the wire codec, [`mqtt_client`] the tokio based client
//! with connection establishment, reconnection, keep-alive and per-QoS flows.

pub mod mqtt_client;
pub mod mqtt_serde;
pub mod mqtt_session;
pub mod priority_queue;

pub use mqtt_client::{MqttClient, MqttClientError, MqttClientOptions};
