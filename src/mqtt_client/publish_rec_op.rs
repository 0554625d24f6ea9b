// SPDX-License-Identifier: MPL-2.0

//! Inbound QoS 2 receive parked between PUBREC and PUBREL.
//!
//! The task holds a share of the client service. It ends when PUBREL arrives
//! (message delivered, PUBCOMP queued) or when the session it belongs to is
//! discarded.

use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::trace;

use super::client::ClientService;
use super::worker::Command;
use crate::mqtt_serde::mqttv5::publishv5::MqttPublish;

pub(crate) fn spawn(
    service: Arc<ClientService>,
    publish: MqttPublish,
    pubrel: oneshot::Receiver<()>,
) {
    let parked = service.session.parked_token();
    tokio::spawn(async move {
        let packet_id = publish.packet_id.unwrap_or_default();
        tokio::select! {
            _ = parked.cancelled() => {
                trace!("QoS 2 receive {} released with its session", packet_id);
            }
            released = pubrel => {
                if released.is_ok() {
                    let _ = service.inbound_tx.send(publish);
                    let _ = service.cmd_tx.send(Command::PubComp(packet_id));
                }
            }
        }
    });
}
