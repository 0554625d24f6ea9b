// SPDX-License-Identifier: MPL-2.0

use serde::{Deserialize, Serialize};

use crate::mqtt_serde::control_packet::{ControlPacketType, MqttControlPacket, MqttPacket};
use crate::mqtt_serde::mqttv5::common::properties::{
    encode_properties_hdr, parse_properties_hdr, Property,
};
use crate::mqtt_serde::mqttv5::common::reason_code::{self, DISCONNECT_CODES};
use crate::mqtt_serde::parser::{expect_consumed, parse_fixed_header, ParseError, ParseOk};

/// DISCONNECT packet (MQTT 5.0: 3.14), sent by either side.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct MqttDisconnect {
    pub reason_code: u8,
    pub properties: Vec<Property>,
}

impl MqttDisconnect {
    pub fn new(reason_code: u8, properties: Vec<Property>) -> Self {
        Self {
            reason_code,
            properties,
        }
    }

    pub fn new_normal() -> Self {
        Self::new(reason_code::SUCCESS, Vec::new())
    }

    /// DISCONNECT 0x81 with a Reason String describing what was wrong.
    pub fn new_malformed_packet(reason_string: String) -> Self {
        Self::new(
            reason_code::MALFORMED_PACKET,
            vec![Property::ReasonString(reason_string)],
        )
    }

    pub fn new_protocol_error(reason_string: String) -> Self {
        Self::new(
            reason_code::PROTOCOL_ERROR,
            vec![Property::ReasonString(reason_string)],
        )
    }
}

impl Default for MqttDisconnect {
    fn default() -> Self {
        Self::new_normal()
    }
}

impl MqttControlPacket for MqttDisconnect {
    fn control_packet_type(&self) -> u8 {
        ControlPacketType::DISCONNECT as u8
    }

    fn variable_header(&self) -> Result<Vec<u8>, ParseError> {
        reason_code::check(self.reason_code, DISCONNECT_CODES)?;
        // MQTT 5.0: 3.14.2.1 Remaining Length 0 means Normal disconnection
        if self.reason_code == reason_code::SUCCESS && self.properties.is_empty() {
            return Ok(Vec::new());
        }
        let mut bytes = vec![self.reason_code];
        if !self.properties.is_empty() {
            bytes.extend(encode_properties_hdr(&self.properties)?);
        }
        Ok(bytes)
    }

    fn from_bytes(buffer: &[u8]) -> Result<ParseOk, ParseError> {
        let (flags, mut offset, total_len) =
            match parse_fixed_header(buffer, ControlPacketType::DISCONNECT as u8)? {
                Some(hdr) => hdr,
                None => return Ok(ParseOk::Continue(1, 0)),
            };
        if flags != 0 {
            return Err(ParseError::InvalidFlags);
        }

        let mut code = reason_code::SUCCESS;
        if offset < total_len {
            code = reason_code::check(buffer[offset], DISCONNECT_CODES)?;
            offset += 1;
        }
        let mut properties = Vec::new();
        if offset < total_len {
            let (props, consumed) = parse_properties_hdr(&buffer[offset..total_len])?;
            properties = props;
            offset += consumed;
        }
        expect_consumed(offset, total_len)?;

        Ok(ParseOk::Packet(
            MqttPacket::Disconnect(MqttDisconnect::new(code, properties)),
            total_len,
        ))
    }
}
