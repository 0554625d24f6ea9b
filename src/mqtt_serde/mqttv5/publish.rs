// SPDX-License-Identifier: MPL-2.0

use crate::mqtt_serde::control_packet::{ControlPacketType, MqttControlPacket, MqttPacket};
use crate::mqtt_serde::encode_utf8_string;
use crate::mqtt_serde::mqttv5::common::properties::{
    encode_properties_hdr, parse_properties_hdr, Property, PropertyLookup,
};
use crate::mqtt_serde::parser::{
    parse_fixed_header, parse_packet_id, parse_utf8_string, ParseError, ParseOk,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct MqttPublish {
    pub topic_name: String,
    pub qos: u8,
    pub dup: bool,
    pub retain: bool,
    pub packet_id: Option<u16>,
    pub payload: Vec<u8>,
    pub properties: Vec<Property>,
}

impl MqttPublish {
    pub fn new(
        qos: u8,
        topic_name: String,
        packet_id: Option<u16>,
        payload: Vec<u8>,
        retain: bool,
        dup: bool,
    ) -> Self {
        MqttPublish {
            topic_name,
            qos,
            dup,
            retain,
            packet_id,
            payload,
            properties: Vec::new(),
        }
    }

    pub fn with_properties(mut self, properties: Vec<Property>) -> Self {
        self.properties = properties;
        self
    }

    pub fn topic_alias(&self) -> Option<u16> {
        self.properties.topic_alias()
    }
}

impl MqttControlPacket for MqttPublish {
    fn control_packet_type(&self) -> u8 {
        ControlPacketType::PUBLISH as u8
    }

    // MQTT 5.0: 3.3.1 DUP, QoS, RETAIN
    fn flags(&self) -> u8 {
        let mut val: u8 = (self.qos & 0x03) << 1;
        if self.dup {
            val |= 0x08;
        }
        if self.retain {
            val |= 0x01;
        }
        val
    }

    fn packet_id_offset(&self) -> Option<usize> {
        (self.qos > 0).then_some(2 + self.topic_name.len())
    }

    fn variable_header(&self) -> Result<Vec<u8>, ParseError> {
        if self.qos > 2 {
            return Err(ParseError::InvalidQoS(self.qos));
        }
        let mut bytes = encode_utf8_string(&self.topic_name)?;
        if self.qos > 0 {
            match self.packet_id {
                Some(id) if id != 0 => bytes.extend(id.to_be_bytes()),
                _ => {
                    return Err(ParseError::ParseError(
                        "QoS > 0 requires a packet identifier".to_string(),
                    ))
                }
            }
        }
        bytes.extend(encode_properties_hdr(&self.properties)?);
        Ok(bytes)
    }

    fn payload(&self) -> Result<Vec<u8>, ParseError> {
        Ok(self.payload.clone())
    }

    fn from_bytes(buffer: &[u8]) -> Result<ParseOk, ParseError> {
        let (flags, mut offset, total_len) =
            match parse_fixed_header(buffer, ControlPacketType::PUBLISH as u8)? {
                Some(hdr) => hdr,
                None => return Ok(ParseOk::Continue(1, 0)),
            };

        let dup = flags & 0x08 != 0;
        let qos = (flags & 0x06) >> 1;
        let retain = flags & 0x01 != 0;
        if qos == 3 {
            return Err(ParseError::InvalidQoS(qos));
        }
        if qos == 0 && dup {
            return Err(ParseError::InvalidFlags);
        }

        let body = &buffer[..total_len];
        let (topic_name, consumed) = parse_utf8_string(&body[offset..])?;
        offset += consumed;

        let packet_id = if qos > 0 {
            let (id, consumed) = parse_packet_id(&body[offset..])?;
            if id == 0 {
                return Err(ParseError::ParseError(
                    "Packet Identifier must be non-zero".to_string(),
                ));
            }
            offset += consumed;
            Some(id)
        } else {
            None
        };

        let (properties, consumed) = parse_properties_hdr(&body[offset..])?;
        offset += consumed;

        let publish = MqttPublish {
            topic_name,
            qos,
            dup,
            retain,
            packet_id,
            payload: body[offset..].to_vec(),
            properties,
        };
        Ok(ParseOk::Packet(MqttPacket::Publish(publish), total_len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_qos0_hex() {
        let publish = MqttPublish::new(0, "t".to_string(), None, b"hi".to_vec(), false, false);
        let bytes = publish.to_bytes().unwrap();
        assert_eq!(hex::encode(&bytes), "3006000174006869");
    }

    #[test]
    fn test_publish_qos2_with_properties() {
        let publish = MqttPublish::new(2, "a/b".to_string(), Some(10), vec![0; 300], true, true)
            .with_properties(vec![
                Property::TopicAlias(3),
                Property::ContentType("bin".to_string()),
            ]);
        let bytes = publish.to_bytes().unwrap();
        match MqttPublish::from_bytes(&bytes).unwrap() {
            ParseOk::Packet(MqttPacket::Publish(decoded), n) => {
                assert_eq!(n, bytes.len());
                assert_eq!(decoded.topic_alias(), Some(3));
                assert_eq!(decoded, publish);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_publish_invalid_qos3() {
        let bytes = hex::decode("36050001740000").unwrap();
        assert!(matches!(
            MqttPublish::from_bytes(&bytes),
            Err(ParseError::InvalidQoS(3))
        ));
    }

    #[test]
    fn test_publish_dup_on_qos0() {
        let bytes = hex::decode("380400017400").unwrap();
        assert!(matches!(
            MqttPublish::from_bytes(&bytes),
            Err(ParseError::InvalidFlags)
        ));
    }

    #[test]
    fn test_publish_requires_packet_id() {
        let publish = MqttPublish::new(1, "t".to_string(), None, vec![], false, false);
        assert!(publish.to_bytes().is_err());
    }
}
