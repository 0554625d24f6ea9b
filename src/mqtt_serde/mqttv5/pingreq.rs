// SPDX-License-Identifier: MPL-2.0

use serde::{Deserialize, Serialize};

use crate::mqtt_serde::control_packet::{ControlPacketType, MqttControlPacket, MqttPacket};
use crate::mqtt_serde::parser::{parse_fixed_header, ParseError, ParseOk};

/// PINGREQ carries no variable header and no payload (MQTT 5.0: 3.12).
#[derive(Debug, PartialEq, Clone, Default, Serialize, Deserialize)]
pub struct MqttPingReq {}

impl MqttPingReq {
    pub fn new() -> Self {
        Self {}
    }
}

impl MqttControlPacket for MqttPingReq {
    fn control_packet_type(&self) -> u8 {
        ControlPacketType::PINGREQ as u8
    }

    fn variable_header(&self) -> Result<Vec<u8>, ParseError> {
        Ok(Vec::new())
    }

    fn from_bytes(buffer: &[u8]) -> Result<ParseOk, ParseError> {
        let (flags, offset, total_len) =
            match parse_fixed_header(buffer, ControlPacketType::PINGREQ as u8)? {
                Some(hdr) => hdr,
                None => return Ok(ParseOk::Continue(1, 0)),
            };
        if flags != 0 {
            return Err(ParseError::InvalidFlags);
        }
        if offset != total_len {
            return Err(ParseError::InvalidLength);
        }
        Ok(ParseOk::Packet(MqttPacket::PingReq(MqttPingReq::new()), total_len))
    }
}
