// SPDX-License-Identifier: MPL-2.0

use serde::{Deserialize, Serialize};

use crate::mqtt_serde::control_packet::{ControlPacketType, MqttControlPacket, MqttPacket};
use crate::mqtt_serde::parser::{parse_fixed_header, ParseError, ParseOk};

#[derive(Debug, PartialEq, Clone, Default, Serialize, Deserialize)]
pub struct MqttPingResp {}

impl MqttPingResp {
    pub fn new() -> Self {
        Self {}
    }
}

impl MqttControlPacket for MqttPingResp {
    fn control_packet_type(&self) -> u8 {
        ControlPacketType::PINGRESP as u8
    }

    fn variable_header(&self) -> Result<Vec<u8>, ParseError> {
        Ok(Vec::new())
    }

    fn from_bytes(buffer: &[u8]) -> Result<ParseOk, ParseError> {
        let (flags, offset, total_len) =
            match parse_fixed_header(buffer, ControlPacketType::PINGRESP as u8)? {
                Some(hdr) => hdr,
                None => return Ok(ParseOk::Continue(1, 0)),
            };
        if flags != 0 {
            return Err(ParseError::InvalidFlags);
        }
        // MQTT 5.0: 3.13.1 Remaining Length is zero
        if offset != total_len {
            return Err(ParseError::InvalidLength);
        }
        Ok(ParseOk::Packet(
            MqttPacket::PingResp(MqttPingResp::new()),
            total_len,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pingresp_bytes() {
        assert_eq!(MqttPingResp::new().to_bytes().unwrap(), vec![0xD0, 0x00]);
        assert_eq!(
            MqttPacket::from_bytes(&[0xD0, 0x00]).unwrap(),
            ParseOk::Packet(MqttPacket::PingResp(MqttPingResp::new()), 2)
        );
    }

    #[test]
    fn test_pingresp_bad_flags() {
        assert!(matches!(
            MqttPingResp::from_bytes(&[0xD1, 0x00]),
            Err(ParseError::InvalidFlags)
        ));
    }
}
