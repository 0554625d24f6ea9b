// SPDX-License-Identifier: MPL-2.0

use serde::{Deserialize, Serialize};

use crate::mqtt_serde::control_packet::{ControlPacketType, MqttControlPacket, MqttPacket};
use crate::mqtt_serde::mqttv5::common::properties::{
    encode_properties_hdr, parse_properties_hdr, Property, PropertyLookup,
};
use crate::mqtt_serde::mqttv5::common::reason_code::{self, AUTH_CODES};
use crate::mqtt_serde::parser::{expect_consumed, parse_fixed_header, ParseError, ParseOk};

/// AUTH packet used by enhanced authentication and re-authentication (MQTT 5.0: 3.15).
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct MqttAuth {
    pub reason_code: u8,
    pub properties: Vec<Property>,
}

impl MqttAuth {
    pub fn new(reason_code: u8, properties: Vec<Property>) -> Self {
        Self {
            reason_code,
            properties,
        }
    }

    /// AUTH carrying an Authentication Method and optional data.
    pub fn with_method(reason_code: u8, method: &str, data: Option<Vec<u8>>) -> Self {
        let mut properties = vec![Property::AuthenticationMethod(method.to_string())];
        if let Some(data) = data {
            properties.push(Property::AuthenticationData(data));
        }
        Self::new(reason_code, properties)
    }

    pub fn method(&self) -> Option<&str> {
        self.properties.authentication_method()
    }

    pub fn data(&self) -> Option<&[u8]> {
        self.properties.authentication_data()
    }
}

impl MqttControlPacket for MqttAuth {
    fn control_packet_type(&self) -> u8 {
        ControlPacketType::AUTH as u8
    }

    fn variable_header(&self) -> Result<Vec<u8>, ParseError> {
        reason_code::check(self.reason_code, AUTH_CODES)?;
        // MQTT 5.0: 3.15.2.1 Remaining Length 0 means Success
        if self.reason_code == reason_code::SUCCESS && self.properties.is_empty() {
            return Ok(Vec::new());
        }
        let mut bytes = vec![self.reason_code];
        bytes.extend(encode_properties_hdr(&self.properties)?);
        Ok(bytes)
    }

    fn from_bytes(buffer: &[u8]) -> Result<ParseOk, ParseError> {
        let (flags, mut offset, total_len) =
            match parse_fixed_header(buffer, ControlPacketType::AUTH as u8)? {
                Some(hdr) => hdr,
                None => return Ok(ParseOk::Continue(1, 0)),
            };
        if flags != 0 {
            return Err(ParseError::InvalidFlags);
        }

        let mut code = reason_code::SUCCESS;
        if offset < total_len {
            code = reason_code::check(buffer[offset], AUTH_CODES)?;
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
            MqttPacket::Auth(MqttAuth::new(code, properties)),
            total_len,
        ))
    }
}
