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

/// A topic filter and its Subscription Options (MQTT 5.0: 3.8.3.1).
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct TopicSubscription {
    pub topic_filter: String,
    pub qos: u8,
    pub no_local: bool,
    pub retain_as_published: bool,
    pub retain_handling: u8,
}

impl TopicSubscription {
    pub fn new(
        topic_filter: String,
        qos: u8,
        no_local: bool,
        retain_as_published: bool,
        retain_handling: u8,
    ) -> Self {
        Self {
            topic_filter,
            qos,
            no_local,
            retain_as_published,
            retain_handling,
        }
    }

    pub fn new_simple(topic_filter: String, qos: u8) -> Self {
        Self::new(topic_filter, qos, false, false, 0)
    }

    // Bits 0-1 QoS, 2 No Local, 3 Retain As Published, 4-5 Retain Handling, 6-7 reserved
    fn options_byte(&self) -> Result<u8, ParseError> {
        if self.qos > 2 {
            return Err(ParseError::InvalidQoS(self.qos));
        }
        if self.retain_handling > 2 {
            return Err(ParseError::ParseError(
                "Retain Handling must be 0, 1 or 2".to_string(),
            ));
        }
        let mut options = self.qos;
        if self.no_local {
            options |= 0x04;
        }
        if self.retain_as_published {
            options |= 0x08;
        }
        options |= self.retain_handling << 4;
        Ok(options)
    }

    fn from_options(topic_filter: String, options: u8) -> Result<Self, ParseError> {
        if options & 0xC0 != 0 {
            return Err(ParseError::ParseError(
                "Subscription Options reserved bits set".to_string(),
            ));
        }
        let sub = Self::new(
            topic_filter,
            options & 0x03,
            options & 0x04 != 0,
            options & 0x08 != 0,
            (options >> 4) & 0x03,
        );
        if sub.qos == 3 {
            return Err(ParseError::InvalidQoS(3));
        }
        if sub.retain_handling == 3 {
            return Err(ParseError::ParseError(
                "Retain Handling must be 0, 1 or 2".to_string(),
            ));
        }
        Ok(sub)
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct MqttSubscribe {
    pub packet_id: u16,
    pub subscriptions: Vec<TopicSubscription>,
    pub properties: Vec<Property>,
}

impl MqttSubscribe {
    pub fn new(
        packet_id: u16,
        subscriptions: Vec<TopicSubscription>,
        properties: Vec<Property>,
    ) -> Self {
        Self {
            packet_id,
            subscriptions,
            properties,
        }
    }
}

impl MqttControlPacket for MqttSubscribe {
    fn control_packet_type(&self) -> u8 {
        ControlPacketType::SUBSCRIBE as u8
    }

    // MQTT 5.0: 3.8.1 reserved bits 0010
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
        // MQTT-3.8.3-2: at least one Topic Filter
        if self.subscriptions.is_empty() {
            return Err(ParseError::ParseError(
                "SUBSCRIBE requires at least one topic filter".to_string(),
            ));
        }
        let mut bytes = Vec::new();
        for sub in &self.subscriptions {
            bytes.extend(encode_utf8_string(&sub.topic_filter)?);
            bytes.push(sub.options_byte()?);
        }
        Ok(bytes)
    }

    fn from_bytes(buffer: &[u8]) -> Result<ParseOk, ParseError> {
        let (flags, mut offset, total_len) =
            match parse_fixed_header(buffer, ControlPacketType::SUBSCRIBE as u8)? {
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

        let mut subscriptions = Vec::new();
        while offset < total_len {
            let (topic_filter, consumed) = parse_utf8_string(&body[offset..])?;
            offset += consumed;
            let options = *body.get(offset).ok_or(ParseError::BufferTooShort)?;
            offset += 1;
            subscriptions.push(TopicSubscription::from_options(topic_filter, options)?);
        }
        if subscriptions.is_empty() {
            return Err(ParseError::ParseError(
                "SUBSCRIBE requires at least one topic filter".to_string(),
            ));
        }

        Ok(ParseOk::Packet(
            MqttPacket::Subscribe(MqttSubscribe::new(packet_id, subscriptions, properties)),
            total_len,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribe_hex() {
        let sub = MqttSubscribe::new(
            1,
            vec![TopicSubscription::new("a".to_string(), 1, true, false, 2)],
            vec![],
        );
        let bytes = sub.to_bytes().unwrap();
        // options: qos 1 | no local | retain handling 2 = 0x25
        assert_eq!(hex::encode(&bytes), "820700010000016125");
        assert_eq!(
            MqttSubscribe::from_bytes(&bytes).unwrap(),
            ParseOk::Packet(MqttPacket::Subscribe(sub), bytes.len())
        );
    }

    #[test]
    fn test_subscribe_with_identifier() {
        let sub = MqttSubscribe::new(
            9,
            vec![
                TopicSubscription::new_simple("x/+".to_string(), 0),
                TopicSubscription::new_simple("y/#".to_string(), 2),
            ],
            vec![Property::SubscriptionIdentifier(4)],
        );
        let bytes = sub.to_bytes().unwrap();
        match MqttSubscribe::from_bytes(&bytes).unwrap() {
            ParseOk::Packet(MqttPacket::Subscribe(decoded), _) => assert_eq!(decoded, sub),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_subscribe_empty_rejected() {
        let sub = MqttSubscribe::new(1, vec![], vec![]);
        assert!(sub.to_bytes().is_err());
        let bytes = hex::decode("8203000100").unwrap();
        assert!(MqttSubscribe::from_bytes(&bytes).is_err());
    }

    #[test]
    fn test_subscribe_reserved_option_bits() {
        let bytes = hex::decode("8207000100000161c1").unwrap();
        assert!(MqttSubscribe::from_bytes(&bytes).is_err());
    }
}
