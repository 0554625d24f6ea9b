// SPDX-License-Identifier: MPL-2.0

use tokio::sync::oneshot;
use tracing::debug;

use super::client::ClientService;
use super::commands::PublishCommand;
use super::error::{MqttClientError, MqttClientResult};
use super::inflight::InflightState;
use super::worker::{Command, OutboundRequest};
use crate::mqtt_serde::control_packet::{EncodedPacket, MqttControlPacket};
use crate::mqtt_serde::mqttv5::common::properties::{validate_properties, Property};
use crate::mqtt_serde::mqttv5::reason_code;
use crate::mqtt_serde::mqttv5::PropertyLookup;
use crate::mqtt_serde::validate_topic_name;

/// Outcome of a publish. QoS 0 has no packet identifier and always reports
/// success once written.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishResult {
    pub packet_id: Option<u16>,
    /// PUBACK, or PUBREC when that already carried an error, or PUBCOMP
    pub reason_code: u8,
    pub properties: Vec<Property>,
}

impl PublishResult {
    pub fn is_success(&self) -> bool {
        !reason_code::is_error(self.reason_code)
    }

    pub fn reason_string(&self) -> Option<&str> {
        self.properties.reason_string()
    }
}

pub(crate) async fn publish(
    service: &ClientService,
    command: PublishCommand,
) -> MqttClientResult<PublishResult> {
    if service.root.is_cancelled() {
        return Err(MqttClientError::cancelled("publish"));
    }
    validate(service, &command).await?;

    let packet_id = match command.qos {
        0 => None,
        _ => Some(service.allocate_pid()?),
    };
    let packet = match encode(service, &command, packet_id).await {
        Ok(packet) => packet,
        Err(e) => {
            if let Some(pid) = packet_id {
                service.release_pid(pid);
            }
            return Err(e);
        }
    };
    let state = match command.qos {
        0 => None,
        1 => Some(InflightState::AwaitPubAck),
        _ => Some(InflightState::AwaitPubRec),
    };

    debug!(
        "Publishing to '{}' (QoS {}, packet id {:?})",
        command.topic_name, command.qos, packet_id
    );
    let (reply, rx) = oneshot::channel();
    let request = Command::Request(OutboundRequest {
        packet_id,
        state,
        packet,
        expected_codes: 0,
        reply,
    });
    if let Err(e) = service.submit(request, "publish") {
        if let Some(pid) = packet_id {
            service.release_pid(pid);
        }
        return Err(e);
    }

    let outcome = service
        .await_reply(rx, command.cancel_token.as_ref(), "publish")
        .await?;
    Ok(PublishResult {
        packet_id: outcome.packet_id,
        reason_code: outcome
            .reason_codes
            .first()
            .copied()
            .unwrap_or(reason_code::SUCCESS),
        properties: outcome.properties,
    })
}

async fn validate(service: &ClientService, command: &PublishCommand) -> MqttClientResult<()> {
    let alias = command.properties.topic_alias();

    // An alias may stand in for the topic
    if !(command.topic_name.is_empty() && alias.is_some()) {
        validate_topic_name(&command.topic_name).map_err(|e| MqttClientError::InvalidTopic {
            topic: command.topic_name.clone(),
            reason: e.diagnostic(),
        })?;
    }

    if command.qos > 2 {
        return Err(MqttClientError::QosNotSupported {
            requested: command.qos,
            maximum: 2,
        });
    }
    validate_properties(&command.properties)?;
    if command.properties.has_subscription_identifier() {
        return Err(MqttClientError::MalformedProperty {
            message: "Subscription Identifier is not allowed in PUBLISH".to_string(),
        });
    }

    let ctx = service.context.read().await;
    let Some(caps) = ctx.capabilities.as_ref() else {
        return Ok(());
    };
    if command.qos > caps.maximum_qos {
        return Err(MqttClientError::QosNotSupported {
            requested: command.qos,
            maximum: caps.maximum_qos,
        });
    }
    if command.retain && !caps.retain_available {
        return Err(MqttClientError::RetainNotAvailable);
    }
    if let Some(alias) = alias {
        if alias == 0 || alias > caps.topic_alias_maximum {
            return Err(MqttClientError::TopicAliasInvalid {
                alias,
                maximum: caps.topic_alias_maximum,
            });
        }
    }
    Ok(())
}

async fn encode(
    service: &ClientService,
    command: &PublishCommand,
    packet_id: Option<u16>,
) -> MqttClientResult<EncodedPacket> {
    let packet = command.to_mqtt_publish(packet_id).encode()?;
    check_size(service, &packet).await?;
    Ok(packet)
}

/// Rejects packets above the server's Maximum Packet Size.
pub(crate) async fn check_size(
    service: &ClientService,
    packet: &EncodedPacket,
) -> MqttClientResult<()> {
    if let Some(maximum) = service.context.read().await.maximum_packet_size() {
        if packet.len() > maximum as usize {
            return Err(MqttClientError::PacketTooLarge {
                size: packet.len(),
                maximum,
            });
        }
    }
    Ok(())
}
