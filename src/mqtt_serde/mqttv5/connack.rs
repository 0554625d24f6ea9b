// SPDX-License-Identifier: MPL-2.0

use serde::{Deserialize, Serialize};

use crate::mqtt_serde::control_packet::{ControlPacketType, MqttControlPacket, MqttPacket};
use crate::mqtt_serde::mqttv5::common::properties::{
    encode_properties_hdr, parse_properties_hdr, Property,
};
use crate::mqtt_serde::mqttv5::common::reason_code;
use crate::mqtt_serde::parser::{expect_consumed, parse_fixed_header, ParseError, ParseOk};

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct MqttConnAck {
    pub session_present: bool,
    pub reason_code: u8,
    pub properties: Vec<Property>,
}

impl MqttConnAck {
    pub fn new(session_present: bool, reason_code: u8, properties: Vec<Property>) -> Self {
        Self {
            session_present,
            reason_code,
            properties,
        }
    }

    pub fn is_success(&self) -> bool {
        self.reason_code == reason_code::SUCCESS
    }
}

impl MqttControlPacket for MqttConnAck {
    fn control_packet_type(&self) -> u8 {
        ControlPacketType::CONNACK as u8
    }

    fn variable_header(&self) -> Result<Vec<u8>, ParseError> {
        // MQTT 5.0: 3.2.2.1 Connect Acknowledge Flags
        let mut bytes = vec![self.session_present as u8, self.reason_code];
        bytes.extend(encode_properties_hdr(&self.properties)?);
        Ok(bytes)
    }

    fn from_bytes(buffer: &[u8]) -> Result<ParseOk, ParseError> {
        let (flags, mut offset, total_len) =
            match parse_fixed_header(buffer, ControlPacketType::CONNACK as u8)? {
                Some(hdr) => hdr,
                None => return Ok(ParseOk::Continue(1, 0)),
            };
        if flags != 0 {
            return Err(ParseError::InvalidFlags);
        }
        if total_len - offset < 2 {
            return Err(ParseError::InvalidLength);
        }

        // Bits 7-1 are reserved
        let ack_flags = buffer[offset];
        if ack_flags & 0xFE != 0 {
            return Err(ParseError::ParseError(
                "CONNACK reserved flag bits set".to_string(),
            ));
        }
        let reason = reason_code::check(buffer[offset + 1], reason_code::CONNACK_CODES)?;
        offset += 2;

        // MQTT 5.0: 3.2.2.2 Session Present must be 0 with a non-zero Reason Code
        if reason != reason_code::SUCCESS && ack_flags != 0 {
            return Err(ParseError::ParseError(
                "CONNACK session present with error reason code".to_string(),
            ));
        }

        let mut properties = Vec::new();
        if offset < total_len {
            let (props, consumed) = parse_properties_hdr(&buffer[offset..total_len])?;
            properties = props;
            offset += consumed;
        }
        expect_consumed(offset, total_len)?;

        Ok(ParseOk::Packet(
            MqttPacket::ConnAck(MqttConnAck::new(ack_flags == 1, reason, properties)),
            total_len,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connack_minimal() {
        let bytes = hex::decode("2003000000").unwrap();
        assert_eq!(
            MqttConnAck::from_bytes(&bytes).unwrap(),
            ParseOk::Packet(MqttPacket::ConnAck(MqttConnAck::new(false, 0, vec![])), 5)
        );
        assert_eq!(
            MqttConnAck::new(false, 0, vec![]).to_bytes().unwrap(),
            bytes
        );
    }

    #[test]
    fn test_connack_refused() {
        let bytes = hex::decode("2003008700").unwrap();
        match MqttConnAck::from_bytes(&bytes).unwrap() {
            ParseOk::Packet(MqttPacket::ConnAck(ack), _) => {
                assert!(!ack.is_success());
                assert_eq!(ack.reason_code, reason_code::NOT_AUTHORIZED);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_connack_illegal_reason_code() {
        // 0x10 is a PUBACK code, never legal in CONNACK
        let bytes = hex::decode("2003001000").unwrap();
        assert!(matches!(
            MqttConnAck::from_bytes(&bytes),
            Err(ParseError::InvalidReasonCode(0x10))
        ));
    }

    #[test]
    fn test_connack_reserved_bits() {
        let bytes = hex::decode("2003020000").unwrap();
        assert!(MqttConnAck::from_bytes(&bytes).is_err());
    }

    #[test]
    fn test_connack_session_present_with_error() {
        let bytes = hex::decode("2003018000").unwrap();
        assert!(MqttConnAck::from_bytes(&bytes).is_err());
    }
}
