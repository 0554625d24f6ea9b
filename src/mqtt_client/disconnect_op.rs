// SPDX-License-Identifier: MPL-2.0

use tokio::sync::oneshot;
use tracing::{debug, info};

use super::client::ClientService;
use super::error::{MqttClientError, MqttClientResult};
use super::worker::Command;
use crate::mqtt_serde::control_packet::MqttControlPacket;
use crate::mqtt_serde::mqttv5::common::properties::{validate_properties, Property};
use crate::mqtt_serde::mqttv5::disconnectv5::MqttDisconnect;
use crate::mqtt_serde::mqttv5::reason_code;

/// Client initiated DISCONNECT. The session loop sends it ahead of anything
/// still queued, aborts the rest and stops.
pub(crate) async fn disconnect(
    service: &ClientService,
    code: u8,
    properties: Vec<Property>,
) -> MqttClientResult<()> {
    if service.root.is_cancelled() {
        return Err(MqttClientError::cancelled("disconnect"));
    }
    if !service.is_started() {
        info!("Disconnect before the client ran, stopping");
        service.root.cancel();
        return Err(MqttClientError::cancelled("disconnect"));
    }

    reason_code::check(code, reason_code::DISCONNECT_CODES).map_err(|_| {
        MqttClientError::InvalidConfiguration {
            field: "reason_code".to_string(),
            reason: format!("0x{:02X} is not a DISCONNECT reason code", code),
        }
    })?;
    validate_properties(&properties)?;
    let packet = MqttDisconnect::new(code, properties).encode()?;

    debug!("Requesting disconnect with 0x{:02X}", code);
    let (reply, rx) = oneshot::channel();
    service.submit(Command::Disconnect { packet, reply }, "disconnect")?;

    // The loop replies before it cancels the client, so a ready reply wins
    tokio::select! {
        biased;
        res = rx => res.unwrap_or_else(|_| Err(MqttClientError::cancelled("disconnect"))),
        _ = service.root.cancelled() => {
            debug!("Disconnect cancelled, shutdown continues in the background");
            Err(MqttClientError::cancelled("disconnect"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mqtt_client::client::test_support::service_with;
    use crate::mqtt_client::opts::MqttClientOptions;

    #[tokio::test]
    async fn test_never_started() {
        let (service, _peers) = service_with(MqttClientOptions::default(), None);
        let err = disconnect(&service, 0, vec![]).await.unwrap_err();
        assert!(err.is_cancelled());
        assert!(service.root.is_cancelled());
    }

    #[tokio::test]
    async fn test_reason_code_checked() {
        let (service, _peers) = service_with(MqttClientOptions::default(), None);
        let _rx = service.take_receiver();
        let err = disconnect(&service, 0x01, vec![]).await.unwrap_err();
        assert!(matches!(err, MqttClientError::InvalidConfiguration { .. }));
    }

    #[tokio::test]
    async fn test_loop_gone_is_aborted() {
        let (service, _peers) = service_with(MqttClientOptions::default(), None);
        let rx = service.take_receiver();
        let waiter = tokio::spawn({
            let service = service.clone();
            async move { disconnect(&service, 0, vec![]).await }
        });
        tokio::task::yield_now().await;
        drop(rx);
        let err = waiter.await.unwrap().unwrap_err();
        assert!(err.is_cancelled());
    }
}
