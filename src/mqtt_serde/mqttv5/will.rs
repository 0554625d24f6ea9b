// SPDX-License-Identifier: MPL-2.0

use crate::mqtt_serde::mqttv5::common::properties::{
    encode_properties_hdr, parse_properties_hdr, Property, PropertyID,
};
use crate::mqtt_serde::parser::{parse_binary_data, parse_utf8_string, ParseError};
use crate::mqtt_serde::{encode_binary_data, encode_utf8_string, validate_topic_name};
use serde::{Deserialize, Serialize};

/// Will Message carried in the CONNECT payload (MQTT 5.0: 3.1.3.2 - 3.1.3.4).
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct Will {
    pub will_topic: String,
    pub will_message: Vec<u8>,
    pub will_qos: u8,
    pub will_retain: bool,
    /// Only Will Properties are accepted here, see `Will::validate`.
    pub properties: Vec<Property>,
}

impl Will {
    pub fn new(will_topic: String, will_message: Vec<u8>, will_qos: u8, will_retain: bool) -> Self {
        Will {
            will_topic,
            will_message,
            will_qos,
            will_retain,
            properties: Vec::new(),
        }
    }

    pub fn with_properties(mut self, properties: Vec<Property>) -> Self {
        self.properties = properties;
        self
    }

    pub fn validate(&self) -> Result<(), ParseError> {
        validate_topic_name(&self.will_topic)?;
        if self.will_qos > 2 {
            return Err(ParseError::InvalidQoS(self.will_qos));
        }
        for p in &self.properties {
            let allowed = matches!(
                p.id(),
                PropertyID::WillDelayInterval
                    | PropertyID::PayloadFormatIndicator
                    | PropertyID::MessageExpiryInterval
                    | PropertyID::ContentType
                    | PropertyID::ResponseTopic
                    | PropertyID::CorrelationData
                    | PropertyID::UserProperty
            );
            if !allowed {
                return Err(ParseError::InvalidPropertyValue(format!(
                    "{:?} is not a Will Property",
                    p.id()
                )));
            }
        }
        Ok(())
    }

    pub(crate) fn encode(&self, bytes: &mut Vec<u8>) -> Result<(), ParseError> {
        self.validate()?;
        bytes.extend(encode_properties_hdr(&self.properties)?);
        bytes.extend(encode_utf8_string(&self.will_topic)?);
        bytes.extend(encode_binary_data(&self.will_message)?);
        Ok(())
    }

    pub(crate) fn from_bytes(buffer: &[u8], connect_flags: u8) -> Result<(Self, usize), ParseError> {
        let (properties, mut offset) = parse_properties_hdr(buffer)?;
        let (will_topic, consumed) = parse_utf8_string(&buffer[offset..])?;
        offset += consumed;
        let (will_message, consumed) = parse_binary_data(&buffer[offset..])?;
        offset += consumed;

        let will_qos = (connect_flags >> 3) & 0x03;
        let will_retain = connect_flags & 0x20 != 0;
        let will = Will::new(will_topic, will_message, will_qos, will_retain).with_properties(properties);
        will.validate()?;
        Ok((will, offset))
    }
}
