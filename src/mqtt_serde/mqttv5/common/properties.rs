// SPDX-License-Identifier: MPL-2.0

use serde::{Deserialize, Serialize};

use crate::mqtt_serde::base_data::{FourByteInteger, TwoByteInteger, VariableByteInteger};
use crate::mqtt_serde::parser::{self, parse_binary_data, parse_utf8_string, ParseError};
use crate::mqtt_serde::{encode_binary_data, encode_utf8_string, encode_variable_length};

pub type Properties = Vec<Property>;

// MQTT 5.0: 2.2.2.2
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyID {
    PayloadFormatIndicator = 0x01,
    MessageExpiryInterval = 0x02,
    ContentType = 0x03,
    ResponseTopic = 0x08,
    CorrelationData = 0x09,
    SubscriptionIdentifier = 0x0b,
    SessionExpiryInterval = 0x11,
    AssignedClientIdentifier = 0x12,
    ServerKeepAlive = 0x13,
    AuthenticationMethod = 0x15,
    AuthenticationData = 0x16,
    RequestProblemInformation = 0x17,
    WillDelayInterval = 0x18,
    RequestResponseInformation = 0x19,
    ResponseInformation = 0x1a,
    ServerReference = 0x1c,
    ReasonString = 0x1f,
    ReceiveMaximum = 0x21,
    TopicAliasMaximum = 0x22,
    TopicAlias = 0x23,
    MaximumQoS = 0x24,
    RetainAvailable = 0x25,
    UserProperty = 0x26,
    MaximumPacketSize = 0x27,
    WildcardSubscriptionAvailable = 0x28,
    SubscriptionIdentifierAvailable = 0x29,
    SharedSubscriptionAvailable = 0x2a,
}

impl TryFrom<usize> for PropertyID {
    type Error = ParseError;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        let id = match value {
            0x01 => PropertyID::PayloadFormatIndicator,
            0x02 => PropertyID::MessageExpiryInterval,
            0x03 => PropertyID::ContentType,
            0x08 => PropertyID::ResponseTopic,
            0x09 => PropertyID::CorrelationData,
            0x0b => PropertyID::SubscriptionIdentifier,
            0x11 => PropertyID::SessionExpiryInterval,
            0x12 => PropertyID::AssignedClientIdentifier,
            0x13 => PropertyID::ServerKeepAlive,
            0x15 => PropertyID::AuthenticationMethod,
            0x16 => PropertyID::AuthenticationData,
            0x17 => PropertyID::RequestProblemInformation,
            0x18 => PropertyID::WillDelayInterval,
            0x19 => PropertyID::RequestResponseInformation,
            0x1a => PropertyID::ResponseInformation,
            0x1c => PropertyID::ServerReference,
            0x1f => PropertyID::ReasonString,
            0x21 => PropertyID::ReceiveMaximum,
            0x22 => PropertyID::TopicAliasMaximum,
            0x23 => PropertyID::TopicAlias,
            0x24 => PropertyID::MaximumQoS,
            0x25 => PropertyID::RetainAvailable,
            0x26 => PropertyID::UserProperty,
            0x27 => PropertyID::MaximumPacketSize,
            0x28 => PropertyID::WildcardSubscriptionAvailable,
            0x29 => PropertyID::SubscriptionIdentifierAvailable,
            0x2a => PropertyID::SharedSubscriptionAvailable,
            other => return Err(ParseError::InvalidPropertyId(other)),
        };
        Ok(id)
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub enum Property {
    PayloadFormatIndicator(u8),
    MessageExpiryInterval(u32),
    ContentType(String),
    ResponseTopic(String),
    CorrelationData(Vec<u8>),
    SubscriptionIdentifier(u32),
    SessionExpiryInterval(u32),
    AssignedClientIdentifier(String),
    ServerKeepAlive(u16),
    AuthenticationMethod(String),
    AuthenticationData(Vec<u8>),
    RequestProblemInformation(u8),
    WillDelayInterval(u32),
    RequestResponseInformation(u8),
    ResponseInformation(String),
    ServerReference(String),
    ReasonString(String),
    ReceiveMaximum(u16),
    TopicAliasMaximum(u16),
    TopicAlias(u16),
    MaximumQoS(u8),
    RetainAvailable(u8),
    UserProperty(String, String),
    MaximumPacketSize(u32),
    WildcardSubscriptionAvailable(u8),
    SubscriptionIdentifierAvailable(u8),
    SharedSubscriptionAvailable(u8),
}

impl Property {
    pub fn id(&self) -> PropertyID {
        match self {
            Property::PayloadFormatIndicator(_) => PropertyID::PayloadFormatIndicator,
            Property::MessageExpiryInterval(_) => PropertyID::MessageExpiryInterval,
            Property::ContentType(_) => PropertyID::ContentType,
            Property::ResponseTopic(_) => PropertyID::ResponseTopic,
            Property::CorrelationData(_) => PropertyID::CorrelationData,
            Property::SubscriptionIdentifier(_) => PropertyID::SubscriptionIdentifier,
            Property::SessionExpiryInterval(_) => PropertyID::SessionExpiryInterval,
            Property::AssignedClientIdentifier(_) => PropertyID::AssignedClientIdentifier,
            Property::ServerKeepAlive(_) => PropertyID::ServerKeepAlive,
            Property::AuthenticationMethod(_) => PropertyID::AuthenticationMethod,
            Property::AuthenticationData(_) => PropertyID::AuthenticationData,
            Property::RequestProblemInformation(_) => PropertyID::RequestProblemInformation,
            Property::WillDelayInterval(_) => PropertyID::WillDelayInterval,
            Property::RequestResponseInformation(_) => PropertyID::RequestResponseInformation,
            Property::ResponseInformation(_) => PropertyID::ResponseInformation,
            Property::ServerReference(_) => PropertyID::ServerReference,
            Property::ReasonString(_) => PropertyID::ReasonString,
            Property::ReceiveMaximum(_) => PropertyID::ReceiveMaximum,
            Property::TopicAliasMaximum(_) => PropertyID::TopicAliasMaximum,
            Property::TopicAlias(_) => PropertyID::TopicAlias,
            Property::MaximumQoS(_) => PropertyID::MaximumQoS,
            Property::RetainAvailable(_) => PropertyID::RetainAvailable,
            Property::UserProperty(..) => PropertyID::UserProperty,
            Property::MaximumPacketSize(_) => PropertyID::MaximumPacketSize,
            Property::WildcardSubscriptionAvailable(_) => {
                PropertyID::WildcardSubscriptionAvailable
            }
            Property::SubscriptionIdentifierAvailable(_) => {
                PropertyID::SubscriptionIdentifierAvailable
            }
            Property::SharedSubscriptionAvailable(_) => PropertyID::SharedSubscriptionAvailable,
        }
    }

    /// Range and reserved-value checks from MQTT 5.0: 3.x property definitions.
    pub fn validate(&self) -> Result<(), ParseError> {
        let bad = |msg: &str| Err(ParseError::InvalidPropertyValue(msg.to_string()));
        match self {
            Property::PayloadFormatIndicator(v)
            | Property::RequestProblemInformation(v)
            | Property::RequestResponseInformation(v)
            | Property::MaximumQoS(v)
            | Property::RetainAvailable(v)
            | Property::WildcardSubscriptionAvailable(v)
            | Property::SubscriptionIdentifierAvailable(v)
            | Property::SharedSubscriptionAvailable(v)
                if *v > 1 =>
            {
                bad(&format!("{:?} must be 0 or 1", self.id()))
            }
            Property::SubscriptionIdentifier(v) if *v == 0 || *v > 268_435_455 => {
                bad("Subscription Identifier out of range")
            }
            Property::ReceiveMaximum(0) => bad("Receive Maximum must not be 0"),
            Property::MaximumPacketSize(0) => bad("Maximum Packet Size must not be 0"),
            Property::TopicAlias(0) => bad("Topic Alias must not be 0"),
            Property::ContentType(s)
            | Property::ResponseTopic(s)
            | Property::AssignedClientIdentifier(s)
            | Property::AuthenticationMethod(s)
            | Property::ResponseInformation(s)
            | Property::ServerReference(s)
            | Property::ReasonString(s) => {
                crate::mqtt_serde::base_data::validate_mqtt_utf8(s)
            }
            Property::UserProperty(k, v) => {
                crate::mqtt_serde::base_data::validate_mqtt_utf8(k)?;
                crate::mqtt_serde::base_data::validate_mqtt_utf8(v)
            }
            Property::CorrelationData(d) | Property::AuthenticationData(d)
                if d.len() > u16::MAX as usize =>
            {
                bad("binary property too long")
            }
            _ => Ok(()),
        }
    }

    fn encode(&self, bytes: &mut Vec<u8>) -> Result<(), ParseError> {
        bytes.push(self.id() as u8);
        match self {
            Property::PayloadFormatIndicator(v)
            | Property::RequestProblemInformation(v)
            | Property::RequestResponseInformation(v)
            | Property::MaximumQoS(v)
            | Property::RetainAvailable(v)
            | Property::WildcardSubscriptionAvailable(v)
            | Property::SubscriptionIdentifierAvailable(v)
            | Property::SharedSubscriptionAvailable(v) => bytes.push(*v),
            Property::MessageExpiryInterval(v)
            | Property::SessionExpiryInterval(v)
            | Property::WillDelayInterval(v)
            | Property::MaximumPacketSize(v) => bytes.extend(FourByteInteger::encode(*v)),
            Property::ServerKeepAlive(v)
            | Property::ReceiveMaximum(v)
            | Property::TopicAliasMaximum(v)
            | Property::TopicAlias(v) => bytes.extend(TwoByteInteger::encode(*v)),
            Property::SubscriptionIdentifier(v) => {
                bytes.extend(VariableByteInteger::encode(*v));
            }
            Property::ContentType(s)
            | Property::ResponseTopic(s)
            | Property::AssignedClientIdentifier(s)
            | Property::AuthenticationMethod(s)
            | Property::ResponseInformation(s)
            | Property::ServerReference(s)
            | Property::ReasonString(s) => bytes.extend(encode_utf8_string(s)?),
            Property::CorrelationData(d) | Property::AuthenticationData(d) => {
                bytes.extend(encode_binary_data(d)?)
            }
            Property::UserProperty(k, v) => {
                bytes.extend(encode_utf8_string(k)?);
                bytes.extend(encode_utf8_string(v)?);
            }
        }
        Ok(())
    }
}

pub fn encode_properties_hdr(properties: &[Property]) -> Result<Vec<u8>, ParseError> {
    let mut props = Vec::new();
    for p in properties {
        p.validate()?;
        p.encode(&mut props)?;
    }
    let mut bytes = encode_variable_length(props.len())?;
    bytes.extend(props);
    Ok(bytes)
}

/// Runs `Property::validate` over a list and rejects duplicates of single-valued properties.
pub fn validate_properties(properties: &[Property]) -> Result<(), ParseError> {
    let mut seen = [false; 0x30];
    for p in properties {
        p.validate()?;
        let id = p.id();
        if matches!(
            id,
            PropertyID::UserProperty | PropertyID::SubscriptionIdentifier
        ) {
            continue;
        }
        let slot = &mut seen[id as usize];
        if *slot {
            return Err(ParseError::DuplicateProperty(id as u8));
        }
        *slot = true;
    }
    Ok(())
}

pub fn parse_properties_hdr(buffer: &[u8]) -> Result<(Vec<Property>, usize), ParseError> {
    let (prop_len, mut offset) = parser::parse_vbi(buffer)?;
    let body = buffer
        .get(offset..offset + prop_len)
        .ok_or(ParseError::IncompleteProperty)?;

    let mut properties = Vec::new();
    let mut pos = 0;
    while pos < body.len() {
        let (prop, consumed) = parse_property(&body[pos..])?;
        properties.push(prop);
        pos += consumed;
    }
    offset += prop_len;

    validate_properties(&properties)?;
    Ok((properties, offset))
}

fn parse_property(buffer: &[u8]) -> Result<(Property, usize), ParseError> {
    let (raw_id, mut offset) = parser::parse_vbi(buffer)?;
    let id = PropertyID::try_from(raw_id)?;
    let rest = &buffer[offset..];

    let byte = || rest.first().copied().ok_or(ParseError::IncompleteProperty);
    let two = || {
        TwoByteInteger::decode(rest)
            .map(|(v, _)| v)
            .map_err(|_| ParseError::IncompleteProperty)
    };
    let four = || {
        FourByteInteger::decode(rest)
            .map(|(v, _)| v)
            .map_err(|_| ParseError::IncompleteProperty)
    };

    let (property, consumed) = match id {
        PropertyID::PayloadFormatIndicator => (Property::PayloadFormatIndicator(byte()?), 1),
        PropertyID::RequestProblemInformation => (Property::RequestProblemInformation(byte()?), 1),
        PropertyID::RequestResponseInformation => {
            (Property::RequestResponseInformation(byte()?), 1)
        }
        PropertyID::MaximumQoS => (Property::MaximumQoS(byte()?), 1),
        PropertyID::RetainAvailable => (Property::RetainAvailable(byte()?), 1),
        PropertyID::WildcardSubscriptionAvailable => {
            (Property::WildcardSubscriptionAvailable(byte()?), 1)
        }
        PropertyID::SubscriptionIdentifierAvailable => {
            (Property::SubscriptionIdentifierAvailable(byte()?), 1)
        }
        PropertyID::SharedSubscriptionAvailable => {
            (Property::SharedSubscriptionAvailable(byte()?), 1)
        }
        PropertyID::MessageExpiryInterval => (Property::MessageExpiryInterval(four()?), 4),
        PropertyID::SessionExpiryInterval => (Property::SessionExpiryInterval(four()?), 4),
        PropertyID::WillDelayInterval => (Property::WillDelayInterval(four()?), 4),
        PropertyID::MaximumPacketSize => (Property::MaximumPacketSize(four()?), 4),
        PropertyID::ServerKeepAlive => (Property::ServerKeepAlive(two()?), 2),
        PropertyID::ReceiveMaximum => (Property::ReceiveMaximum(two()?), 2),
        PropertyID::TopicAliasMaximum => (Property::TopicAliasMaximum(two()?), 2),
        PropertyID::TopicAlias => (Property::TopicAlias(two()?), 2),
        PropertyID::SubscriptionIdentifier => {
            let (v, n) = parser::parse_vbi(rest)?;
            (Property::SubscriptionIdentifier(v as u32), n)
        }
        PropertyID::ContentType => {
            let (s, n) = parse_utf8_string(rest)?;
            (Property::ContentType(s), n)
        }
        PropertyID::ResponseTopic => {
            let (s, n) = parse_utf8_string(rest)?;
            (Property::ResponseTopic(s), n)
        }
        PropertyID::AssignedClientIdentifier => {
            let (s, n) = parse_utf8_string(rest)?;
            (Property::AssignedClientIdentifier(s), n)
        }
        PropertyID::AuthenticationMethod => {
            let (s, n) = parse_utf8_string(rest)?;
            (Property::AuthenticationMethod(s), n)
        }
        PropertyID::ResponseInformation => {
            let (s, n) = parse_utf8_string(rest)?;
            (Property::ResponseInformation(s), n)
        }
        PropertyID::ServerReference => {
            let (s, n) = parse_utf8_string(rest)?;
            (Property::ServerReference(s), n)
        }
        PropertyID::ReasonString => {
            let (s, n) = parse_utf8_string(rest)?;
            (Property::ReasonString(s), n)
        }
        PropertyID::CorrelationData => {
            let (d, n) = parse_binary_data(rest)?;
            (Property::CorrelationData(d), n)
        }
        PropertyID::AuthenticationData => {
            let (d, n) = parse_binary_data(rest)?;
            (Property::AuthenticationData(d), n)
        }
        PropertyID::UserProperty => {
            let (k, n1) = parse_utf8_string(rest)?;
            let (v, n2) = parse_utf8_string(&rest[n1..])?;
            (Property::UserProperty(k, v), n1 + n2)
        }
    };
    offset += consumed;
    Ok((property, offset))
}

/// Lookup helpers over a property list.
pub trait PropertyLookup {
    fn authentication_method(&self) -> Option<&str>;
    fn authentication_data(&self) -> Option<&[u8]>;
    fn reason_string(&self) -> Option<&str>;
    fn topic_alias(&self) -> Option<u16>;
    fn has_subscription_identifier(&self) -> bool;
}

impl PropertyLookup for [Property] {
    fn authentication_method(&self) -> Option<&str> {
        self.iter().find_map(|p| match p {
            Property::AuthenticationMethod(m) => Some(m.as_str()),
            _ => None,
        })
    }

    fn authentication_data(&self) -> Option<&[u8]> {
        self.iter().find_map(|p| match p {
            Property::AuthenticationData(d) => Some(d.as_slice()),
            _ => None,
        })
    }

    fn reason_string(&self) -> Option<&str> {
        self.iter().find_map(|p| match p {
            Property::ReasonString(s) => Some(s.as_str()),
            _ => None,
        })
    }

    fn topic_alias(&self) -> Option<u16> {
        self.iter().find_map(|p| match p {
            Property::TopicAlias(a) => Some(*a),
            _ => None,
        })
    }

    fn has_subscription_identifier(&self) -> bool {
        self.iter()
            .any(|p| matches!(p, Property::SubscriptionIdentifier(_)))
    }
}
