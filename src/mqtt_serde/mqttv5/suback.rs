// SPDX-License-Identifier: MPL-2.0

use serde::{Deserialize, Serialize};

use crate::mqtt_serde::control_packet::{ControlPacketType, MqttControlPacket, MqttPacket};
use crate::mqtt_serde::mqttv5::common::properties::{
    encode_properties_hdr, parse_properties_hdr, Property,
};
use crate::mqtt_serde::mqttv5::common::reason_code::{self, SUBACK_CODES};
use crate::mqtt_serde::parser::{parse_fixed_header, parse_packet_id, ParseError, ParseOk};

/// SUBACK packet (MQTT 5.0: 3.9). One Reason Code per requested Topic Filter, in order.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct MqttSubAck {
    pub packet_id: u16,
    pub reason_codes: Vec<u8>,
    pub properties: Vec<Property>,
}

impl MqttSubAck {
    pub fn new(packet_id: u16, reason_codes: Vec<u8>, properties: Vec<Property>) -> Self {
        Self {
            packet_id,
            reason_codes,
            properties,
        }
    }
}

impl MqttControlPacket for MqttSubAck {
    fn control_packet_type(&self) -> u8 {
        ControlPacketType::SUBACK as u8
    }

    fn packet_id_offset(&self) -> Option<usize> {
        Some(0)
    }

    fn variable_header(&self) -> Result<Vec<u8>, ParseError> {
        let mut bytes = self.packet_id.to_be_bytes().to_vec();
        bytes.extend(encode_properties_hdr(&self.properties)?);
        Ok(bytes)
    }

    fn payload(&self) -> Result<Vec<u8>, ParseError> {
        for code in &self.reason_codes {
            reason_code::check(*code, SUBACK_CODES)?;
        }
        Ok(self.reason_codes.clone())
    }

    fn from_bytes(buffer: &[u8]) -> Result<ParseOk, ParseError> {
        let (flags, mut offset, total_len) =
            match parse_fixed_header(buffer, ControlPacketType::SUBACK as u8)? {
                Some(hdr) => hdr,
                None => return Ok(ParseOk::Continue(1, 0)),
            };
        if flags != 0 {
            return Err(ParseError::InvalidFlags);
        }
        let body = &buffer[..total_len];

        let (packet_id, consumed) = parse_packet_id(&body[offset..])?;
        offset += consumed;
        let (properties, consumed) = parse_properties_hdr(&body[offset..])?;
        offset += consumed;

        let reason_codes = body[offset..]
            .iter()
            .map(|code| reason_code::check(*code, SUBACK_CODES))
            .collect::<Result<Vec<u8>, ParseError>>()?;
        if reason_codes.is_empty() {
            return Err(ParseError::ParseError(
                "SUBACK without Reason Codes".to_string(),
            ));
        }

        Ok(ParseOk::Packet(
            MqttPacket::SubAck(MqttSubAck::new(packet_id, reason_codes, properties)),
            total_len,
        ))
    }
}
