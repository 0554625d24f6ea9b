// SPDX-License-Identifier: MPL-2.0

use crate::mqtt_serde::control_packet::{ControlPacketType, MqttControlPacket, MqttPacket};
use crate::mqtt_serde::mqttv5::common::properties::{
    encode_properties_hdr, parse_properties_hdr, Property,
};
use crate::mqtt_serde::mqttv5::will::Will;
use crate::mqtt_serde::parser::{
    expect_consumed, parse_binary_data, parse_fixed_header, parse_packet_id, parse_utf8_string,
    ParseError, ParseOk,
};
use crate::mqtt_serde::{encode_binary_data, encode_utf8_string};
use serde::{Deserialize, Serialize};

pub const PROTOCOL_NAME: &str = "MQTT";
pub const PROTOCOL_VERSION: u8 = 5;

#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct MqttConnect {
    pub protocol_name: String,
    pub protocol_version: u8,
    pub keep_alive: u16,
    pub client_id: String,
    pub will: Option<Will>,
    pub username: Option<String>,
    pub password: Option<Vec<u8>>,
    pub properties: Vec<Property>,
    pub clean_start: bool,
}

impl MqttConnect {
    pub fn new(
        client_id: String,
        username: Option<String>,
        password: Option<Vec<u8>>,
        will: Option<Will>,
        keep_alive: u16,
        clean_start: bool,
        properties: Vec<Property>,
    ) -> Self {
        MqttConnect {
            protocol_name: PROTOCOL_NAME.to_string(),
            protocol_version: PROTOCOL_VERSION,
            keep_alive,
            client_id,
            will,
            username,
            password,
            properties,
            clean_start,
        }
    }

    // MQTT 5.0: 3.1.2.3
    fn connect_flags(&self) -> u8 {
        let mut flags: u8 = 0;
        if self.username.is_some() {
            flags |= 0x80;
        }
        if self.password.is_some() {
            flags |= 0x40;
        }
        if let Some(will) = &self.will {
            flags |= 0x04;
            flags |= (will.will_qos & 0x03) << 3;
            if will.will_retain {
                flags |= 0x20;
            }
        }
        if self.clean_start {
            flags |= 0x02;
        }
        flags
    }
}

impl MqttControlPacket for MqttConnect {
    fn control_packet_type(&self) -> u8 {
        ControlPacketType::CONNECT as u8
    }

    fn variable_header(&self) -> Result<Vec<u8>, ParseError> {
        let mut bytes = encode_utf8_string(&self.protocol_name)?;
        bytes.push(self.protocol_version);
        bytes.push(self.connect_flags());
        bytes.extend(self.keep_alive.to_be_bytes());
        bytes.extend(encode_properties_hdr(&self.properties)?);
        Ok(bytes)
    }

    fn payload(&self) -> Result<Vec<u8>, ParseError> {
        let mut bytes = encode_utf8_string(&self.client_id)?;
        if let Some(will) = &self.will {
            will.encode(&mut bytes)?;
        }
        if let Some(username) = &self.username {
            bytes.extend(encode_utf8_string(username)?);
        }
        if let Some(password) = &self.password {
            bytes.extend(encode_binary_data(password)?);
        }
        Ok(bytes)
    }

    fn from_bytes(buffer: &[u8]) -> Result<ParseOk, ParseError> {
        let (flags, mut offset, total_len) =
            match parse_fixed_header(buffer, ControlPacketType::CONNECT as u8)? {
                Some(hdr) => hdr,
                None => return Ok(ParseOk::Continue(1, 0)),
            };
        if flags != 0 {
            return Err(ParseError::InvalidFlags);
        }
        let body = &buffer[..total_len];

        let (protocol_name, consumed) = parse_utf8_string(&body[offset..])?;
        if protocol_name != PROTOCOL_NAME {
            return Err(ParseError::UnSuppProtoVsn);
        }
        offset += consumed;

        let protocol_version = *body.get(offset).ok_or(ParseError::BufferTooShort)?;
        if protocol_version != PROTOCOL_VERSION {
            return Err(ParseError::UnSuppProtoVsn);
        }
        let connect_flags = *body.get(offset + 1).ok_or(ParseError::BufferTooShort)?;
        if connect_flags & 0x01 != 0 {
            return Err(ParseError::InvalidFlags);
        }
        offset += 2;

        let (keep_alive, consumed) = parse_packet_id(&body[offset..])?;
        offset += consumed;

        let (properties, consumed) = parse_properties_hdr(&body[offset..])?;
        offset += consumed;

        let (client_id, consumed) = parse_utf8_string(&body[offset..])?;
        offset += consumed;

        let will = if connect_flags & 0x04 != 0 {
            let (will, consumed) = Will::from_bytes(&body[offset..], connect_flags)?;
            offset += consumed;
            Some(will)
        } else {
            None
        };

        let username = if connect_flags & 0x80 != 0 {
            let (name, consumed) = parse_utf8_string(&body[offset..])?;
            offset += consumed;
            Some(name)
        } else {
            None
        };

        let password = if connect_flags & 0x40 != 0 {
            let (pass, consumed) = parse_binary_data(&body[offset..])?;
            offset += consumed;
            Some(pass)
        } else {
            None
        };
        expect_consumed(offset, total_len)?;

        let connect = MqttConnect {
            protocol_name,
            protocol_version,
            keep_alive,
            client_id,
            will,
            username,
            password,
            properties,
            clean_start: connect_flags & 0x02 != 0,
        };
        Ok(ParseOk::Packet(MqttPacket::Connect(connect), total_len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_minimal_hex() {
        let connect = MqttConnect::new("c".to_string(), None, None, None, 60, true, vec![]);
        let bytes = connect.to_bytes().unwrap();
        // protocol name, level 5, clean start, keep alive 60, no properties, client id "c"
        assert_eq!(hex::encode(&bytes), "100e00044d5154540502003c00000163");
    }

    #[test]
    fn test_connect_full_roundtrip() {
        let will = Will::new("will/t".to_string(), b"gone".to_vec(), 1, true)
            .with_properties(vec![Property::WillDelayInterval(5)]);
        let connect = MqttConnect::new(
            "client-1".to_string(),
            Some("user".to_string()),
            Some(b"secret".to_vec()),
            Some(will),
            30,
            false,
            vec![
                Property::SessionExpiryInterval(120),
                Property::AuthenticationMethod("SCRAM-SHA-1".to_string()),
                Property::AuthenticationData(vec![1, 2]),
            ],
        );
        let bytes = connect.to_bytes().unwrap();
        assert_eq!(
            MqttConnect::from_bytes(&bytes).unwrap(),
            ParseOk::Packet(MqttPacket::Connect(connect), bytes.len())
        );
    }

    #[test]
    fn test_connect_reserved_flag() {
        let mut bytes = MqttConnect::new("c".to_string(), None, None, None, 0, true, vec![])
            .to_bytes()
            .unwrap();
        bytes[9] |= 0x01;
        assert!(matches!(
            MqttConnect::from_bytes(&bytes),
            Err(ParseError::InvalidFlags)
        ));
    }
}
