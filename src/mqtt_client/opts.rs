// SPDX-License-Identifier: MPL-2.0

use crate::mqtt_client::error::MqttClientError;
use crate::mqtt_client::transport::{Endpoint, DEFAULT_MQTT_PORT};
use crate::mqtt_serde::mqttv5::common::properties::{validate_properties, Property};
use crate::mqtt_serde::mqttv5::willv5::Will;

/// Connection options for [`MqttClient`](crate::mqtt_client::MqttClient).
#[derive(Debug, Clone)]
pub struct MqttClientOptions {
    pub brokers: Vec<Endpoint>,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<Vec<u8>>,
    pub will: Option<Will>,
    // Applies to the first connection only, reconnects resume the session
    pub clean_start: bool,
    pub keep_alive: u16,
    pub session_expiry_interval: Option<u32>,
    /// Client Receive Maximum, enforced on inbound QoS 2
    pub receive_maximum: Option<u16>,
    pub maximum_packet_size: Option<u32>,
    /// Topic aliases accepted from the server
    pub topic_alias_maximum: Option<u16>,
    pub request_response_information: Option<bool>,
    pub request_problem_information: Option<bool>,
    pub user_properties: Vec<(String, String)>,
    /// PINGRESP must arrive within keep_alive * multiplier
    pub ping_timeout_multiplier: u32,
}

impl Default for MqttClientOptions {
    fn default() -> Self {
        Self {
            brokers: vec![Endpoint::new("localhost", DEFAULT_MQTT_PORT)],
            client_id: String::new(),
            username: None,
            password: None,
            will: None,
            clean_start: true,
            keep_alive: 60,
            session_expiry_interval: None,
            receive_maximum: None,
            maximum_packet_size: None,
            topic_alias_maximum: None,
            request_response_information: None,
            request_problem_information: None,
            user_properties: Vec::new(),
            ping_timeout_multiplier: 2,
        }
    }
}

impl MqttClientOptions {
    pub fn builder() -> MqttClientOptionsBuilder {
        MqttClientOptionsBuilder::default()
    }

    /// CONNECT properties derived from the options.
    pub fn connect_properties(&self) -> Vec<Property> {
        let mut props = Vec::new();
        if let Some(v) = self.session_expiry_interval {
            props.push(Property::SessionExpiryInterval(v));
        }
        if let Some(v) = self.receive_maximum {
            props.push(Property::ReceiveMaximum(v));
        }
        if let Some(v) = self.maximum_packet_size {
            props.push(Property::MaximumPacketSize(v));
        }
        if let Some(v) = self.topic_alias_maximum {
            props.push(Property::TopicAliasMaximum(v));
        }
        if let Some(v) = self.request_response_information {
            props.push(Property::RequestResponseInformation(v as u8));
        }
        if let Some(v) = self.request_problem_information {
            props.push(Property::RequestProblemInformation(v as u8));
        }
        for (k, v) in &self.user_properties {
            props.push(Property::UserProperty(k.clone(), v.clone()));
        }
        props
    }

    pub fn validate(&self) -> Result<(), MqttClientError> {
        if self.ping_timeout_multiplier == 0 {
            return Err(MqttClientError::InvalidConfiguration {
                field: "ping_timeout_multiplier".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if let Some(will) = &self.will {
            will.validate()
                .map_err(|e| MqttClientError::InvalidConfiguration {
                    field: "will".to_string(),
                    reason: e.to_string(),
                })?;
        }
        validate_properties(&self.connect_properties()).map_err(|e| {
            MqttClientError::InvalidConfiguration {
                field: "connect properties".to_string(),
                reason: e.to_string(),
            }
        })
    }
}

#[derive(Debug, Default)]
pub struct MqttClientOptionsBuilder {
    options: MqttClientOptions,
    broker_error: Option<String>,
}

impl MqttClientOptionsBuilder {
    /// Single broker or a comma separated list, `host[:port]` each.
    pub fn brokers(mut self, list: &str) -> Self {
        match Endpoint::parse_list(list, DEFAULT_MQTT_PORT) {
            Ok(brokers) => self.options.brokers = brokers,
            Err(e) => self.broker_error = Some(e.to_string()),
        }
        self
    }

    pub fn broker(mut self, endpoint: Endpoint) -> Self {
        self.options.brokers = vec![endpoint];
        self
    }

    pub fn add_broker(mut self, endpoint: Endpoint) -> Self {
        self.options.brokers.push(endpoint);
        self
    }

    pub fn client_id(mut self, id: impl Into<String>) -> Self {
        self.options.client_id = id.into();
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.options.username = Some(username.into());
        self
    }

    pub fn password(mut self, password: impl Into<Vec<u8>>) -> Self {
        self.options.password = Some(password.into());
        self
    }

    pub fn will(mut self, will: Will) -> Self {
        self.options.will = Some(will);
        self
    }

    pub fn clean_start(mut self, clean_start: bool) -> Self {
        self.options.clean_start = clean_start;
        self
    }

    pub fn keep_alive(mut self, seconds: u16) -> Self {
        self.options.keep_alive = seconds;
        self
    }

    pub fn session_expiry_interval(mut self, seconds: u32) -> Self {
        self.options.session_expiry_interval = Some(seconds);
        self
    }

    pub fn receive_maximum(mut self, max: u16) -> Self {
        self.options.receive_maximum = Some(max);
        self
    }

    pub fn maximum_packet_size(mut self, size: u32) -> Self {
        self.options.maximum_packet_size = Some(size);
        self
    }

    pub fn topic_alias_maximum(mut self, max: u16) -> Self {
        self.options.topic_alias_maximum = Some(max);
        self
    }

    pub fn request_response_information(mut self, request: bool) -> Self {
        self.options.request_response_information = Some(request);
        self
    }

    pub fn request_problem_information(mut self, request: bool) -> Self {
        self.options.request_problem_information = Some(request);
        self
    }

    pub fn user_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options
            .user_properties
            .push((key.into(), value.into()));
        self
    }

    pub fn ping_timeout_multiplier(mut self, multiplier: u32) -> Self {
        self.options.ping_timeout_multiplier = multiplier;
        self
    }

    pub fn build(self) -> Result<MqttClientOptions, MqttClientError> {
        if let Some(reason) = self.broker_error {
            return Err(MqttClientError::InvalidConfiguration {
                field: "brokers".to_string(),
                reason,
            });
        }
        self.options.validate()?;
        Ok(self.options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let opts = MqttClientOptions::builder().build().unwrap();
        assert_eq!(opts.brokers, vec![Endpoint::new("localhost", 1883)]);
        assert!(opts.clean_start);
        assert_eq!(opts.keep_alive, 60);
        assert_eq!(opts.ping_timeout_multiplier, 2);
        assert!(opts.connect_properties().is_empty());
    }

    #[test]
    fn test_broker_list() {
        let opts = MqttClientOptions::builder()
            .brokers("b1.local:1884, b2.local")
            .build()
            .unwrap();
        assert_eq!(
            opts.brokers,
            vec![Endpoint::new("b1.local", 1884), Endpoint::new("b2.local", 1883)]
        );

        let err = MqttClientOptions::builder()
            .brokers("b1.local:xyz")
            .build()
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_connect_properties() {
        let opts = MqttClientOptions::builder()
            .session_expiry_interval(120)
            .receive_maximum(10)
            .request_problem_information(false)
            .user_property("app", "demo")
            .build()
            .unwrap();
        assert_eq!(
            opts.connect_properties(),
            vec![
                Property::SessionExpiryInterval(120),
                Property::ReceiveMaximum(10),
                Property::RequestProblemInformation(0),
                Property::UserProperty("app".to_string(), "demo".to_string()),
            ]
        );
    }

    #[test]
    fn test_invalid_values() {
        assert!(MqttClientOptions::builder()
            .receive_maximum(0)
            .build()
            .is_err());
        assert!(MqttClientOptions::builder()
            .ping_timeout_multiplier(0)
            .build()
            .is_err());
    }
}
