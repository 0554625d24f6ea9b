// SPDX-License-Identifier: MPL-2.0

use std::sync::Arc;
use std::time::Duration;

use super::auth::Authenticator;
use super::opts::MqttClientOptions;
use crate::mqtt_serde::mqttv5::common::properties::Property;
use crate::mqtt_serde::mqttv5::connackv5::MqttConnAck;
use crate::mqtt_serde::mqttv5::connectv5::MqttConnect;
use crate::mqtt_serde::mqttv5::willv5::Will;

/// Limits announced by the server in CONNACK. Absent properties take the
/// protocol defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerCapabilities {
    pub maximum_qos: u8,
    pub retain_available: bool,
    pub wildcard_subscription_available: bool,
    pub shared_subscription_available: bool,
    pub subscription_identifier_available: bool,
    pub topic_alias_maximum: u16,
    pub receive_maximum: u16,
    pub maximum_packet_size: Option<u32>,
    pub server_keep_alive: Option<u16>,
    pub assigned_client_id: Option<String>,
}

impl Default for ServerCapabilities {
    fn default() -> Self {
        Self {
            maximum_qos: 2,
            retain_available: true,
            wildcard_subscription_available: true,
            shared_subscription_available: true,
            subscription_identifier_available: true,
            topic_alias_maximum: 0,
            receive_maximum: u16::MAX,
            maximum_packet_size: None,
            server_keep_alive: None,
            assigned_client_id: None,
        }
    }
}

impl ServerCapabilities {
    pub fn from_connack(connack: &MqttConnAck) -> Self {
        let mut caps = Self::default();
        for p in &connack.properties {
            match p {
                Property::MaximumQoS(v) => caps.maximum_qos = *v,
                Property::RetainAvailable(v) => caps.retain_available = *v == 1,
                Property::WildcardSubscriptionAvailable(v) => {
                    caps.wildcard_subscription_available = *v == 1
                }
                Property::SharedSubscriptionAvailable(v) => {
                    caps.shared_subscription_available = *v == 1
                }
                Property::SubscriptionIdentifierAvailable(v) => {
                    caps.subscription_identifier_available = *v == 1
                }
                Property::TopicAliasMaximum(v) => caps.topic_alias_maximum = *v,
                Property::ReceiveMaximum(v) => caps.receive_maximum = *v,
                Property::MaximumPacketSize(v) => caps.maximum_packet_size = Some(*v),
                Property::ServerKeepAlive(v) => caps.server_keep_alive = Some(*v),
                Property::AssignedClientIdentifier(id) => {
                    caps.assigned_client_id = Some(id.clone())
                }
                _ => {}
            }
        }
        caps
    }
}

/// Everything needed to build a CONNECT plus what the server negotiated.
///
/// Written only by the session loop at connection boundaries; operations take
/// short read locks.
pub struct MqttContext {
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<Vec<u8>>,
    pub will: Option<Will>,
    pub keep_alive: u16,
    pub clean_start: bool,
    pub connect_properties: Vec<Property>,
    /// Client Receive Maximum for inbound QoS 2
    pub receive_maximum: u16,
    pub topic_alias_maximum: u16,
    pub authenticator: Option<Arc<dyn Authenticator>>,
    /// `None` until the first CONNACK
    pub capabilities: Option<ServerCapabilities>,
}

impl std::fmt::Debug for MqttContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttContext")
            .field("client_id", &self.client_id)
            .field("username", &self.username)
            .field("keep_alive", &self.keep_alive)
            .field("clean_start", &self.clean_start)
            .field("auth_method", &self.auth_method())
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

impl MqttContext {
    pub fn new(options: &MqttClientOptions, authenticator: Option<Arc<dyn Authenticator>>) -> Self {
        Self {
            client_id: options.client_id.clone(),
            username: options.username.clone(),
            password: options.password.clone(),
            will: options.will.clone(),
            keep_alive: options.keep_alive,
            clean_start: options.clean_start,
            connect_properties: options.connect_properties(),
            receive_maximum: options.receive_maximum.unwrap_or(u16::MAX),
            topic_alias_maximum: options.topic_alias_maximum.unwrap_or(0),
            authenticator,
            capabilities: None,
        }
    }

    /// Authentication Method when enhanced authentication is configured.
    pub fn auth_method(&self) -> Option<&str> {
        self.authenticator
            .as_deref()
            .map(|a| a.method())
            .filter(|m| !m.is_empty())
    }

    pub fn build_connect(&self, auth_data: Option<Vec<u8>>) -> MqttConnect {
        let mut properties = self.connect_properties.clone();
        if let Some(method) = self.auth_method() {
            properties.push(Property::AuthenticationMethod(method.to_string()));
            if let Some(data) = auth_data {
                properties.push(Property::AuthenticationData(data));
            }
        }
        MqttConnect::new(
            self.client_id.clone(),
            self.username.clone(),
            self.password.clone(),
            self.will.clone(),
            self.keep_alive,
            self.clean_start,
            properties,
        )
    }

    /// Records the CONNACK of a successful connection.
    pub fn apply_connack(&mut self, connack: &MqttConnAck) -> ServerCapabilities {
        let caps = ServerCapabilities::from_connack(connack);
        if let Some(id) = &caps.assigned_client_id {
            self.client_id = id.clone();
        }
        // Reconnects resume whatever session the server now holds
        self.clean_start = false;
        self.capabilities = Some(caps.clone());
        caps
    }

    /// Server Keep Alive overrides the requested value.
    pub fn effective_keep_alive(&self) -> Duration {
        let secs = self
            .capabilities
            .as_ref()
            .and_then(|c| c.server_keep_alive)
            .unwrap_or(self.keep_alive);
        Duration::from_secs(secs as u64)
    }

    pub fn maximum_packet_size(&self) -> Option<u32> {
        self.capabilities
            .as_ref()
            .and_then(|c| c.maximum_packet_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::mqtt_client::auth::AuthStep;
    use crate::mqtt_client::error::MqttClientError;

    struct Plain;

    #[async_trait]
    impl Authenticator for Plain {
        fn method(&self) -> &str {
            "PLAIN"
        }

        async fn async_auth(&self, _step: AuthStep, data: Vec<u8>) -> Result<Vec<u8>, MqttClientError> {
            Ok(data)
        }
    }

    #[test]
    fn test_capabilities_defaults_and_overrides() {
        let connack = MqttConnAck::new(
            false,
            0,
            vec![
                Property::MaximumQoS(1),
                Property::RetainAvailable(0),
                Property::ReceiveMaximum(5),
                Property::ServerKeepAlive(30),
            ],
        );
        let caps = ServerCapabilities::from_connack(&connack);
        assert_eq!(caps.maximum_qos, 1);
        assert!(!caps.retain_available);
        assert!(caps.wildcard_subscription_available);
        assert_eq!(caps.receive_maximum, 5);
        assert_eq!(caps.topic_alias_maximum, 0);
        assert_eq!(caps.server_keep_alive, Some(30));
    }

    #[test]
    fn test_apply_connack() {
        let opts = MqttClientOptions::builder().keep_alive(60).build().unwrap();
        let mut ctx = MqttContext::new(&opts, None);
        assert!(ctx.clean_start);
        assert_eq!(ctx.effective_keep_alive(), Duration::from_secs(60));

        let connack = MqttConnAck::new(
            false,
            0,
            vec![
                Property::AssignedClientIdentifier("auto-1".to_string()),
                Property::ServerKeepAlive(10),
            ],
        );
        ctx.apply_connack(&connack);
        assert_eq!(ctx.client_id, "auto-1");
        assert!(!ctx.clean_start);
        assert_eq!(ctx.effective_keep_alive(), Duration::from_secs(10));
    }

    #[test]
    fn test_build_connect_with_auth() {
        let opts = MqttClientOptions::builder()
            .client_id("c1")
            .build()
            .unwrap();
        let ctx = MqttContext::new(&opts, Some(Arc::new(Plain)));
        let connect = ctx.build_connect(Some(b"init".to_vec()));
        assert_eq!(connect.client_id, "c1");
        assert!(connect.clean_start);
        assert!(connect
            .properties
            .contains(&Property::AuthenticationMethod("PLAIN".to_string())));
        assert!(connect
            .properties
            .contains(&Property::AuthenticationData(b"init".to_vec())));
    }
}
