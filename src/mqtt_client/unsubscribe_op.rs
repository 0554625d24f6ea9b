// SPDX-License-Identifier: MPL-2.0

use tokio::sync::oneshot;
use tracing::debug;

use super::client::ClientService;
use super::commands::UnsubscribeCommand;
use super::error::{MqttClientError, MqttClientResult};
use super::inflight::InflightState;
use super::publish_op::check_size;
use super::worker::{Command, OutboundRequest};
use crate::mqtt_serde::control_packet::MqttControlPacket;
use crate::mqtt_serde::mqttv5::common::properties::{validate_properties, Property};
use crate::mqtt_serde::mqttv5::reason_code;
use crate::mqtt_serde::mqttv5::unsubscribev5::MqttUnsubscribe;
use crate::mqtt_serde::validate_topic_filter;

/// UNSUBACK contents, one reason code per filter in request order.
#[derive(Debug, Clone, PartialEq)]
pub struct UnsubscribeResult {
    pub packet_id: u16,
    pub reason_codes: Vec<u8>,
    pub properties: Vec<Property>,
}

impl UnsubscribeResult {
    pub fn is_success(&self) -> bool {
        self.reason_codes.iter().all(|c| !reason_code::is_error(*c))
    }
}

pub(crate) async fn unsubscribe(
    service: &ClientService,
    command: UnsubscribeCommand,
) -> MqttClientResult<UnsubscribeResult> {
    if service.root.is_cancelled() {
        return Err(MqttClientError::cancelled("unsubscribe"));
    }
    if command.topics.is_empty() {
        return Err(MqttClientError::InvalidTopic {
            topic: String::new(),
            reason: "UNSUBSCRIBE needs at least one topic filter".to_string(),
        });
    }
    for topic in &command.topics {
        validate_topic_filter(topic).map_err(|e| MqttClientError::InvalidTopic {
            topic: topic.clone(),
            reason: e.diagnostic(),
        })?;
    }
    validate_properties(&command.properties)?;

    let packet_id = service.allocate_pid()?;
    let packet = MqttUnsubscribe::new(packet_id, command.topics.clone(), command.properties.clone())
        .encode()
        .map_err(MqttClientError::from);
    let packet = match packet {
        Ok(packet) => packet,
        Err(e) => {
            service.release_pid(packet_id);
            return Err(e);
        }
    };
    if let Err(e) = check_size(service, &packet).await {
        service.release_pid(packet_id);
        return Err(e);
    }

    debug!(
        "Unsubscribing from {:?} (packet id {})",
        command.topics, packet_id
    );
    let (reply, rx) = oneshot::channel();
    let request = Command::Request(OutboundRequest {
        packet_id: Some(packet_id),
        state: Some(InflightState::AwaitUnsubAck),
        packet,
        expected_codes: command.topics.len(),
        reply,
    });
    if let Err(e) = service.submit(request, "unsubscribe") {
        service.release_pid(packet_id);
        return Err(e);
    }

    let outcome = service
        .await_reply(rx, command.cancel_token.as_ref(), "unsubscribe")
        .await?;
    Ok(UnsubscribeResult {
        packet_id,
        reason_codes: outcome.reason_codes,
        properties: outcome.properties,
    })
}
