// SPDX-License-Identifier: MPL-2.0

use tokio::sync::oneshot;
use tracing::debug;

use super::client::ClientService;
use super::commands::SubscribeCommand;
use super::error::{MqttClientError, MqttClientResult};
use super::inflight::InflightState;
use super::publish_op::check_size;
use super::worker::{Command, OutboundRequest};
use crate::mqtt_serde::control_packet::MqttControlPacket;
use crate::mqtt_serde::mqttv5::common::properties::{validate_properties, Property};
use crate::mqtt_serde::mqttv5::reason_code;
use crate::mqtt_serde::mqttv5::subscribev5::MqttSubscribe;
use crate::mqtt_serde::mqttv5::PropertyLookup;
use crate::mqtt_serde::{has_wildcard, is_shared_subscription, validate_topic_filter};

/// SUBACK contents, one reason code per requested filter in request order.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscribeResult {
    pub packet_id: u16,
    pub reason_codes: Vec<u8>,
    pub properties: Vec<Property>,
}

impl SubscribeResult {
    /// True when every filter was granted.
    pub fn is_success(&self) -> bool {
        self.reason_codes.iter().all(|c| !reason_code::is_error(*c))
    }
}

pub(crate) async fn subscribe(
    service: &ClientService,
    command: SubscribeCommand,
) -> MqttClientResult<SubscribeResult> {
    if service.root.is_cancelled() {
        return Err(MqttClientError::cancelled("subscribe"));
    }
    validate(service, &command).await?;

    let packet_id = service.allocate_pid()?;
    let encoded = MqttSubscribe::new(
        packet_id,
        command.subscriptions.clone(),
        command.properties.clone(),
    )
    .encode()
    .map_err(MqttClientError::from);
    let packet = match encoded {
        Ok(packet) => match check_size(service, &packet).await {
            Ok(()) => packet,
            Err(e) => {
                service.release_pid(packet_id);
                return Err(e);
            }
        },
        Err(e) => {
            service.release_pid(packet_id);
            return Err(e);
        }
    };

    debug!(
        "Subscribing to {} filter(s) (packet id {})",
        command.subscriptions.len(),
        packet_id
    );
    let (reply, rx) = oneshot::channel();
    let request = Command::Request(OutboundRequest {
        packet_id: Some(packet_id),
        state: Some(InflightState::AwaitSubAck),
        packet,
        expected_codes: command.subscriptions.len(),
        reply,
    });
    if let Err(e) = service.submit(request, "subscribe") {
        service.release_pid(packet_id);
        return Err(e);
    }

    let outcome = service
        .await_reply(rx, command.cancel_token.as_ref(), "subscribe")
        .await?;
    Ok(SubscribeResult {
        packet_id,
        reason_codes: outcome.reason_codes,
        properties: outcome.properties,
    })
}

async fn validate(service: &ClientService, command: &SubscribeCommand) -> MqttClientResult<()> {
    if command.subscriptions.is_empty() {
        return Err(MqttClientError::InvalidTopic {
            topic: String::new(),
            reason: "SUBSCRIBE needs at least one topic filter".to_string(),
        });
    }
    for sub in &command.subscriptions {
        validate_topic_filter(&sub.topic_filter).map_err(|e| MqttClientError::InvalidTopic {
            topic: sub.topic_filter.clone(),
            reason: e.diagnostic(),
        })?;
    }

    validate_properties(&command.properties)?;
    for sub in &command.subscriptions {
        if sub.qos > 2 {
            return Err(MqttClientError::QosNotSupported {
                requested: sub.qos,
                maximum: 2,
            });
        }
        if sub.retain_handling > 2 {
            return Err(MqttClientError::MalformedProperty {
                message: format!("Retain Handling {} out of range", sub.retain_handling),
            });
        }
    }

    let ctx = service.context.read().await;
    let Some(caps) = ctx.capabilities.as_ref() else {
        return Ok(());
    };
    for sub in &command.subscriptions {
        if is_shared_subscription(&sub.topic_filter) {
            if !caps.shared_subscription_available {
                return Err(MqttClientError::SharedSubscriptionNotAvailable);
            }
        } else if has_wildcard(&sub.topic_filter) && !caps.wildcard_subscription_available {
            return Err(MqttClientError::WildcardNotAvailable);
        }
    }
    if command.properties.has_subscription_identifier() && !caps.subscription_identifier_available
    {
        return Err(MqttClientError::SubscriptionIdentifierNotAvailable);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mqtt_client::client::test_support::service_with;
    use crate::mqtt_client::context::ServerCapabilities;
    use crate::mqtt_client::opts::MqttClientOptions;

    #[tokio::test]
    async fn test_filter_syntax() {
        let (service, _peers) = service_with(MqttClientOptions::default(), None);
        for bad in ["a/#/b", "a+", "", "$share//a", "$share/g"] {
            let err = subscribe(&service, SubscribeCommand::single(bad, 0))
                .await
                .unwrap_err();
            assert!(
                matches!(err, MqttClientError::InvalidTopic { .. }),
                "{} gave {:?}",
                bad,
                err
            );
        }
    }

    #[tokio::test]
    async fn test_capabilities() {
        let (service, _peers) = service_with(MqttClientOptions::default(), None);
        service.context.write().await.capabilities = Some(ServerCapabilities {
            wildcard_subscription_available: false,
            shared_subscription_available: false,
            subscription_identifier_available: false,
            ..Default::default()
        });

        let err = subscribe(&service, SubscribeCommand::single("a/+", 1))
            .await
            .unwrap_err();
        assert_eq!(err, MqttClientError::WildcardNotAvailable);

        let err = subscribe(&service, SubscribeCommand::single("$share/g/a", 1))
            .await
            .unwrap_err();
        assert_eq!(err, MqttClientError::SharedSubscriptionNotAvailable);

        let cmd = SubscribeCommand::builder()
            .add_topic("a", 1)
            .with_subscription_id(7)
            .build()
            .unwrap();
        let err = subscribe(&service, cmd).await.unwrap_err();
        assert_eq!(err, MqttClientError::SubscriptionIdentifierNotAvailable);
        assert_eq!(service.pids.lock().unwrap().in_use(), 0);
    }

    #[test]
    fn test_result_success() {
        let granted = SubscribeResult {
            packet_id: 1,
            reason_codes: vec![0, 1, 2],
            properties: vec![],
        };
        assert!(granted.is_success());
        let partial = SubscribeResult {
            reason_codes: vec![1, 0x87],
            ..granted
        };
        assert!(!partial.is_success());
    }
}
