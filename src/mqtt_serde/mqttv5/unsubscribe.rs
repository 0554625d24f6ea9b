// SPDX-License-Identifier: MPL-2.0

use serde::{Deserialize, Serialize};

use crate::mqtt_serde::control_packet::{ControlPacketType, MqttControlPacket, MqttPacket};
use crate::mqtt_serde::encode_utf8_string;
use crate::mqtt_serde::mqttv5::common::properties::{
    encode_properties_hdr, parse_properties_hdr, Property,
};
use crate::mqtt_serde::parser::{
    parse_fixed_header, parse_packet_id, parse_utf8_string, ParseError, ParseOk,
};

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct MqttUnsubscribe {
    pub packet_id: u16,
    pub topic_filters: Vec<String>,
    pub properties: Vec<Property>,
}

impl MqttUnsubscribe {
    pub fn new(packet_id: u16, topic_filters: Vec<String>, properties: Vec<Property>) -> Self {
        Self {
            packet_id,
            topic_filters,
            properties,
        }
    }
}

impl MqttControlPacket for MqttUnsubscribe {
    fn control_packet_type(&self) -> u8 {
        ControlPacketType::UNSUBSCRIBE as u8
    }

    // MQTT 5.0: 3.10.1 reserved bits 0010
    fn flags(&self) -> u8 {
        0x02
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
        if self.topic_filters.is_empty() {
            return Err(ParseError::ParseError(
                "UNSUBSCRIBE requires at least one topic filter".to_string(),
            ));
        }
        let mut bytes = Vec::new();
        for filter in &self.topic_filters {
            bytes.extend(encode_utf8_string(filter)?);
        }
        Ok(bytes)
    }

    fn from_bytes(buffer: &[u8]) -> Result<ParseOk, ParseError> {
        let (flags, mut offset, total_len) =
            match parse_fixed_header(buffer, ControlPacketType::UNSUBSCRIBE as u8)? {
                Some(hdr) => hdr,
                None => return Ok(ParseOk::Continue(1, 0)),
            };
        if flags != 0x02 {
            return Err(ParseError::InvalidFlags);
        }
        let body = &buffer[..total_len];

        let (packet_id, consumed) = parse_packet_id(&body[offset..])?;
        offset += consumed;
        let (properties, consumed) = parse_properties_hdr(&body[offset..])?;
        offset += consumed;

        let mut topic_filters = Vec::new();
        while offset < total_len {
            let (filter, consumed) = parse_utf8_string(&body[offset..])?;
            offset += consumed;
            topic_filters.push(filter);
        }
        if topic_filters.is_empty() {
            return Err(ParseError::ParseError(
                "UNSUBSCRIBE requires at least one topic filter".to_string(),
            ));
        }

        Ok(ParseOk::Packet(
            MqttPacket::Unsubscribe(MqttUnsubscribe::new(packet_id, topic_filters, properties)),
            total_len,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsubscribe_hex() {
        let unsub = MqttUnsubscribe::new(4, vec!["a/b".to_string()], vec![]);
        let bytes = unsub.to_bytes().unwrap();
        assert_eq!(hex::encode(&bytes), "a2080004000003612f62");
        assert_eq!(
            MqttUnsubscribe::from_bytes(&bytes).unwrap(),
            ParseOk::Packet(MqttPacket::Unsubscribe(unsub), bytes.len())
        );
    }

    #[test]
    fn test_unsubscribe_bad_flags() {
        let bytes = hex::decode("a0080004000003612f62").unwrap();
        assert!(matches!(
            MqttUnsubscribe::from_bytes(&bytes),
            Err(ParseError::InvalidFlags)
        ));
    }
}
