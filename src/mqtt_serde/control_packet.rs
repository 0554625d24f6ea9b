// SPDX-License-Identifier: MPL-2.0

use serde::{Deserialize, Serialize};
use std::convert::TryFrom;

use super::encode_variable_length;
use super::parser::packet_type;
use super::parser::{ParseError, ParseOk};

use crate::mqtt_serde::mqttv5::*;

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
#[allow(clippy::large_enum_variant)]
pub enum MqttPacket {
    Connect(connectv5::MqttConnect),
    ConnAck(connackv5::MqttConnAck),
    Publish(publishv5::MqttPublish),
    PubAck(pubackv5::MqttPubAck),
    PubRec(pubrecv5::MqttPubRec),
    PubRel(pubrelv5::MqttPubRel),
    PubComp(pubcompv5::MqttPubComp),
    Subscribe(subscribev5::MqttSubscribe),
    SubAck(subackv5::MqttSubAck),
    Unsubscribe(unsubscribev5::MqttUnsubscribe),
    UnsubAck(unsubackv5::MqttUnsubAck),
    PingReq(pingreqv5::MqttPingReq),
    PingResp(pingrespv5::MqttPingResp),
    Disconnect(disconnectv5::MqttDisconnect),
    Auth(authv5::MqttAuth),
}

impl MqttPacket {
    pub fn to_bytes(&self) -> Result<Vec<u8>, ParseError> {
        match self {
            MqttPacket::Connect(p) => p.to_bytes(),
            MqttPacket::ConnAck(p) => p.to_bytes(),
            MqttPacket::Publish(p) => p.to_bytes(),
            MqttPacket::PubAck(p) => p.to_bytes(),
            MqttPacket::PubRec(p) => p.to_bytes(),
            MqttPacket::PubRel(p) => p.to_bytes(),
            MqttPacket::PubComp(p) => p.to_bytes(),
            MqttPacket::Subscribe(p) => p.to_bytes(),
            MqttPacket::SubAck(p) => p.to_bytes(),
            MqttPacket::Unsubscribe(p) => p.to_bytes(),
            MqttPacket::UnsubAck(p) => p.to_bytes(),
            MqttPacket::PingReq(p) => p.to_bytes(),
            MqttPacket::PingResp(p) => p.to_bytes(),
            MqttPacket::Disconnect(p) => p.to_bytes(),
            MqttPacket::Auth(p) => p.to_bytes(),
        }
    }

    pub fn from_bytes(buffer: &[u8]) -> Result<ParseOk, ParseError> {
        let packet_type = ControlPacketType::try_from(packet_type(buffer)?)?;

        match packet_type {
            ControlPacketType::CONNECT => connectv5::MqttConnect::from_bytes(buffer),
            ControlPacketType::CONNACK => connackv5::MqttConnAck::from_bytes(buffer),
            ControlPacketType::PUBLISH => publishv5::MqttPublish::from_bytes(buffer),
            ControlPacketType::PUBACK => pubackv5::MqttPubAck::from_bytes(buffer),
            ControlPacketType::PUBREC => pubrecv5::MqttPubRec::from_bytes(buffer),
            ControlPacketType::PUBREL => pubrelv5::MqttPubRel::from_bytes(buffer),
            ControlPacketType::PUBCOMP => pubcompv5::MqttPubComp::from_bytes(buffer),
            ControlPacketType::SUBSCRIBE => subscribev5::MqttSubscribe::from_bytes(buffer),
            ControlPacketType::SUBACK => subackv5::MqttSubAck::from_bytes(buffer),
            ControlPacketType::UNSUBSCRIBE => unsubscribev5::MqttUnsubscribe::from_bytes(buffer),
            ControlPacketType::UNSUBACK => unsubackv5::MqttUnsubAck::from_bytes(buffer),
            ControlPacketType::PINGREQ => pingreqv5::MqttPingReq::from_bytes(buffer),
            ControlPacketType::PINGRESP => pingrespv5::MqttPingResp::from_bytes(buffer),
            ControlPacketType::DISCONNECT => disconnectv5::MqttDisconnect::from_bytes(buffer),
            ControlPacketType::AUTH => authv5::MqttAuth::from_bytes(buffer),
        }
    }

    pub fn packet_type(&self) -> ControlPacketType {
        match self {
            MqttPacket::Connect(_) => ControlPacketType::CONNECT,
            MqttPacket::ConnAck(_) => ControlPacketType::CONNACK,
            MqttPacket::Publish(_) => ControlPacketType::PUBLISH,
            MqttPacket::PubAck(_) => ControlPacketType::PUBACK,
            MqttPacket::PubRec(_) => ControlPacketType::PUBREC,
            MqttPacket::PubRel(_) => ControlPacketType::PUBREL,
            MqttPacket::PubComp(_) => ControlPacketType::PUBCOMP,
            MqttPacket::Subscribe(_) => ControlPacketType::SUBSCRIBE,
            MqttPacket::SubAck(_) => ControlPacketType::SUBACK,
            MqttPacket::Unsubscribe(_) => ControlPacketType::UNSUBSCRIBE,
            MqttPacket::UnsubAck(_) => ControlPacketType::UNSUBACK,
            MqttPacket::PingReq(_) => ControlPacketType::PINGREQ,
            MqttPacket::PingResp(_) => ControlPacketType::PINGRESP,
            MqttPacket::Disconnect(_) => ControlPacketType::DISCONNECT,
            MqttPacket::Auth(_) => ControlPacketType::AUTH,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlPacketType {
    CONNECT = 1,
    CONNACK = 2,
    PUBLISH = 3,
    PUBACK = 4,
    PUBREC = 5,
    PUBREL = 6,
    PUBCOMP = 7,
    SUBSCRIBE = 8,
    SUBACK = 9,
    UNSUBSCRIBE = 10,
    UNSUBACK = 11,
    PINGREQ = 12,
    PINGRESP = 13,
    DISCONNECT = 14,
    AUTH = 15,
}

impl ControlPacketType {
    pub fn name(&self) -> &'static str {
        match self {
            ControlPacketType::CONNECT => "CONNECT",
            ControlPacketType::CONNACK => "CONNACK",
            ControlPacketType::PUBLISH => "PUBLISH",
            ControlPacketType::PUBACK => "PUBACK",
            ControlPacketType::PUBREC => "PUBREC",
            ControlPacketType::PUBREL => "PUBREL",
            ControlPacketType::PUBCOMP => "PUBCOMP",
            ControlPacketType::SUBSCRIBE => "SUBSCRIBE",
            ControlPacketType::SUBACK => "SUBACK",
            ControlPacketType::UNSUBSCRIBE => "UNSUBSCRIBE",
            ControlPacketType::UNSUBACK => "UNSUBACK",
            ControlPacketType::PINGREQ => "PINGREQ",
            ControlPacketType::PINGRESP => "PINGRESP",
            ControlPacketType::DISCONNECT => "DISCONNECT",
            ControlPacketType::AUTH => "AUTH",
        }
    }
}

impl TryFrom<u8> for ControlPacketType {
    type Error = ParseError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(ControlPacketType::CONNECT),
            2 => Ok(ControlPacketType::CONNACK),
            3 => Ok(ControlPacketType::PUBLISH),
            4 => Ok(ControlPacketType::PUBACK),
            5 => Ok(ControlPacketType::PUBREC),
            6 => Ok(ControlPacketType::PUBREL),
            7 => Ok(ControlPacketType::PUBCOMP),
            8 => Ok(ControlPacketType::SUBSCRIBE),
            9 => Ok(ControlPacketType::SUBACK),
            10 => Ok(ControlPacketType::UNSUBSCRIBE),
            11 => Ok(ControlPacketType::UNSUBACK),
            12 => Ok(ControlPacketType::PINGREQ),
            13 => Ok(ControlPacketType::PINGRESP),
            14 => Ok(ControlPacketType::DISCONNECT),
            15 => Ok(ControlPacketType::AUTH),
            _ => Err(ParseError::InvalidPacketType),
        }
    }
}

pub trait MqttControlPacket {
    // MQTT 5.0: 2.1.2, MQTT control packet type
    fn control_packet_type(&self) -> u8;

    // MQTT 5.0: 2.1.3, Flags in the fixed header
    fn flags(&self) -> u8 {
        0u8
    }

    /// Offset of the Packet Identifier inside the variable header, for packets that carry one.
    fn packet_id_offset(&self) -> Option<usize> {
        None
    }

    fn fixed_header(&self, len: usize) -> Result<Vec<u8>, ParseError> {
        let byte1: u8 = (self.control_packet_type() << 4) | self.flags();
        let mut hdr = vec![byte1];
        hdr.extend(encode_variable_length(len)?);
        Ok(hdr)
    }

    fn variable_header(&self) -> Result<Vec<u8>, ParseError>;

    fn payload(&self) -> Result<Vec<u8>, ParseError> {
        Ok(Vec::new())
    }

    fn from_bytes(buffer: &[u8]) -> Result<ParseOk, ParseError>;

    fn to_bytes(&self) -> Result<Vec<u8>, ParseError> {
        Ok(self.encode()?.into_bytes())
    }

    fn encode(&self) -> Result<EncodedPacket, ParseError> {
        let vhdr = self.variable_header()?;
        let payload = self.payload()?;
        let fixed = self.fixed_header(vhdr.len() + payload.len())?;
        let packet_id_offset = self.packet_id_offset().map(|off| fixed.len() + off);

        let mut bytes = Vec::with_capacity(fixed.len() + vhdr.len() + payload.len());
        bytes.extend(fixed);
        bytes.extend(vhdr);
        bytes.extend(payload);
        Ok(EncodedPacket {
            bytes,
            packet_id_offset,
        })
    }
}

/// An encoded control packet ready for the wire.
///
/// Keeps the position of the Packet Identifier; a retransmission patches the
/// DUP flag in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPacket {
    bytes: Vec<u8>,
    packet_id_offset: Option<usize>,
}

const DUP_FLAG: u8 = 0x08;

impl EncodedPacket {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn packet_type(&self) -> Option<ControlPacketType> {
        self.bytes
            .first()
            .and_then(|b| ControlPacketType::try_from(b >> 4).ok())
    }

    pub fn packet_id(&self) -> Option<u16> {
        let off = self.packet_id_offset?;
        let raw = self.bytes.get(off..off + 2)?;
        Some(u16::from_be_bytes([raw[0], raw[1]]))
    }

    /// Sets the DUP flag. Only meaningful for PUBLISH.
    pub fn set_dup(&mut self, dup: bool) {
        if self.packet_type() != Some(ControlPacketType::PUBLISH) {
            return;
        }
        if let Some(first) = self.bytes.first_mut() {
            if dup {
                *first |= DUP_FLAG;
            } else {
                *first &= !DUP_FLAG;
            }
        }
    }
}
