// SPDX-License-Identifier: MPL-2.0

use serde::{Deserialize, Serialize};

use crate::mqtt_serde::control_packet::{ControlPacketType, MqttControlPacket, MqttPacket};
use crate::mqtt_serde::mqttv5::ack::{decode_ack, encode_ack};
use crate::mqtt_serde::mqttv5::common::properties::Property;
use crate::mqtt_serde::mqttv5::common::reason_code::PUBREC_CODES;
use crate::mqtt_serde::parser::{ParseError, ParseOk};

/// PUBREC packet (MQTT 5.0: 3.5).
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct MqttPubRec {
    pub packet_id: u16,
    pub reason_code: u8,
    pub properties: Vec<Property>,
}

impl MqttPubRec {
    pub fn new(packet_id: u16, reason_code: u8, properties: Vec<Property>) -> Self {
        Self {
            packet_id,
            reason_code,
            properties,
        }
    }
}

impl MqttControlPacket for MqttPubRec {
    fn control_packet_type(&self) -> u8 {
        ControlPacketType::PUBREC as u8
    }

    fn flags(&self) -> u8 {
        0x00
    }

    fn packet_id_offset(&self) -> Option<usize> {
        Some(0)
    }

    fn variable_header(&self) -> Result<Vec<u8>, ParseError> {
        encode_ack(self.packet_id, self.reason_code, &self.properties)
    }

    fn from_bytes(buffer: &[u8]) -> Result<ParseOk, ParseError> {
        match decode_ack(buffer, ControlPacketType::PUBREC as u8, 0x00, PUBREC_CODES)? {
            Some(ack) => Ok(ParseOk::Packet(
                MqttPacket::PubRec(MqttPubRec::new(ack.packet_id, ack.reason_code, ack.properties)),
                ack.total_len,
            )),
            None => Ok(ParseOk::Continue(1, 0)),
        }
    }
}
