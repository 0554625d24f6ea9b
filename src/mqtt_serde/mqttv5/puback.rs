// SPDX-License-Identifier: MPL-2.0

use serde::{Deserialize, Serialize};

use crate::mqtt_serde::control_packet::{ControlPacketType, MqttControlPacket, MqttPacket};
use crate::mqtt_serde::mqttv5::ack::{decode_ack, encode_ack};
use crate::mqtt_serde::mqttv5::common::properties::Property;
use crate::mqtt_serde::mqttv5::common::reason_code::PUBACK_CODES;
use crate::mqtt_serde::parser::{ParseError, ParseOk};

/// PUBACK packet (MQTT 5.0: 3.4).
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct MqttPubAck {
    pub packet_id: u16,
    pub reason_code: u8,
    pub properties: Vec<Property>,
}

impl MqttPubAck {
    pub fn new(packet_id: u16, reason_code: u8, properties: Vec<Property>) -> Self {
        Self {
            packet_id,
            reason_code,
            properties,
        }
    }
}

impl MqttControlPacket for MqttPubAck {
    fn control_packet_type(&self) -> u8 {
        ControlPacketType::PUBACK as u8
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
        match decode_ack(buffer, ControlPacketType::PUBACK as u8, 0x00, PUBACK_CODES)? {
            Some(ack) => Ok(ParseOk::Packet(
                MqttPacket::PubAck(MqttPubAck::new(ack.packet_id, ack.reason_code, ack.properties)),
                ack.total_len,
            )),
            None => Ok(ParseOk::Continue(1, 0)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_puback_minimal() {
        let ack = MqttPubAck::new(1, 0, vec![]);
        let bytes = ack.to_bytes().unwrap();
        assert_eq!(hex::encode(&bytes), "40020001");
        assert_eq!(
            MqttPacket::from_bytes(&bytes).unwrap(),
            ParseOk::Packet(MqttPacket::PubAck(ack), 4)
        );
    }

    #[test]
    fn test_puback_with_reason_string() {
        let ack = MqttPubAck::new(
            0x1234,
            0x10,
            vec![Property::ReasonString("none".to_string())],
        );
        let bytes = ack.to_bytes().unwrap();
        match MqttPubAck::from_bytes(&bytes).unwrap() {
            ParseOk::Packet(MqttPacket::PubAck(decoded), n) => {
                assert_eq!(decoded, ack);
                assert_eq!(n, bytes.len());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_puback_reason_only() {
        // remaining length 3: packet id + reason code, no property length
        let bytes = hex::decode("4003000510").unwrap();
        match MqttPubAck::from_bytes(&bytes).unwrap() {
            ParseOk::Packet(MqttPacket::PubAck(ack), 5) => {
                assert_eq!(ack.packet_id, 5);
                assert_eq!(ack.reason_code, 0x10);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_puback_invalid_reason_code() {
        let bytes = hex::decode("40040001ff00").unwrap();
        assert!(matches!(
            MqttPubAck::from_bytes(&bytes),
            Err(ParseError::InvalidReasonCode(0xff))
        ));
    }

    #[test]
    fn test_puback_partial() {
        let bytes = hex::decode("400400").unwrap();
        assert!(matches!(
            MqttPubAck::from_bytes(&bytes).unwrap(),
            ParseOk::Continue(..)
        ));
    }
}
