// SPDX-License-Identifier: MPL-2.0

pub mod base_data;
pub mod control_packet;
pub mod mqttv5;
pub mod parser;

use crate::mqtt_serde::base_data::{BinaryData, Utf8String, VariableByteInteger};
use crate::mqtt_serde::parser::ParseError;
//re export
pub use crate::mqtt_serde::parser::stream::MqttParser;

// MQTT 5.0 Spec, 1.5.6
pub(crate) fn encode_binary_data(data: &[u8]) -> Result<Vec<u8>, ParseError> {
    BinaryData::encode(data)
}

// MQTT 5.0 Spec, 1.5.4
pub(crate) fn encode_utf8_string(s: &str) -> Result<Vec<u8>, ParseError> {
    Utf8String::encode(s)
}

pub(crate) fn encode_variable_length(len: usize) -> Result<Vec<u8>, ParseError> {
    let len = base_data::checked_remaining_length(len)?;
    Ok(VariableByteInteger::encode(len))
}

/// Validates a PUBLISH topic name (MQTT 5.0: 4.7).
///
/// Topic names carry no wildcards. An empty name is only allowed when a
/// topic alias stands in for it, which callers check separately.
pub fn validate_topic_name(topic_name: &str) -> Result<(), ParseError> {
    if topic_name.is_empty() {
        return Err(ParseError::ParseError(
            "Topic name cannot be empty".to_string(),
        ));
    }
    base_data::validate_mqtt_utf8(topic_name)?;
    if topic_name.contains(['+', '#']) {
        return Err(ParseError::ParseError(
            "Topic name must not contain wildcard characters".to_string(),
        ));
    }
    Ok(())
}

/// Validates MQTT topic filter syntax according to MQTT 5.0 specification
pub fn validate_topic_filter(topic_filter: &str) -> Result<(), ParseError> {
    if topic_filter.is_empty() {
        return Err(ParseError::ParseError(
            "Topic filter cannot be empty".to_string(),
        ));
    }
    base_data::validate_mqtt_utf8(topic_filter)?;

    if topic_filter.starts_with("$share/") {
        return validate_shared_subscription(topic_filter);
    }

    let levels: Vec<&str> = topic_filter.split('/').collect();
    for (i, level) in levels.iter().enumerate() {
        if level.contains('#') {
            if *level != "#" {
                return Err(ParseError::ParseError(
                    "Multi-level wildcard (#) must be the only character in topic level"
                        .to_string(),
                ));
            }
            if i != levels.len() - 1 {
                return Err(ParseError::ParseError(
                    "Multi-level wildcard (#) must be the last level in topic filter".to_string(),
                ));
            }
        }
        if level.contains('+') && *level != "+" {
            return Err(ParseError::ParseError(
                "Single-level wildcard (+) must be the only character in topic level".to_string(),
            ));
        }
    }

    Ok(())
}

/// Validates `$share/<ShareName>/<TopicFilter>` (MQTT 5.0: 4.8.2).
pub fn validate_shared_subscription(topic_filter: &str) -> Result<(), ParseError> {
    let mut parts = topic_filter.splitn(3, '/');
    let (_, share_name, filter) = match (parts.next(), parts.next(), parts.next()) {
        (Some(prefix), Some(share), Some(filter)) => (prefix, share, filter),
        _ => {
            return Err(ParseError::ParseError(
                "Invalid shared subscription format: must be $share/ShareName/TopicFilter"
                    .to_string(),
            ))
        }
    };

    if share_name.is_empty() {
        return Err(ParseError::ParseError(
            "Shared subscription ShareName cannot be empty".to_string(),
        ));
    }
    if share_name.contains(['+', '#']) {
        return Err(ParseError::ParseError(
            "Shared subscription ShareName cannot contain wildcards".to_string(),
        ));
    }
    if filter.is_empty() || filter.starts_with("$share/") {
        return Err(ParseError::ParseError(
            "Shared subscription must carry a non-shared topic filter".to_string(),
        ));
    }
    validate_topic_filter(filter)
}

/// True for filters containing `+` or `#`.
pub fn has_wildcard(topic_filter: &str) -> bool {
    topic_filter.contains(['+', '#'])
}

/// True for `$share/...` filters.
pub fn is_shared_subscription(topic_filter: &str) -> bool {
    topic_filter.starts_with("$share/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_name() {
        assert!(validate_topic_name("sport/tennis/player1").is_ok());
        assert!(validate_topic_name("/").is_ok());
        assert!(validate_topic_name("").is_err());
        assert!(validate_topic_name("sport/+/player1").is_err());
        assert!(validate_topic_name("sport/#").is_err());
    }

    #[test]
    fn test_topic_filter_wildcards() {
        assert!(validate_topic_filter("sport/tennis/#").is_ok());
        assert!(validate_topic_filter("#").is_ok());
        assert!(validate_topic_filter("+/tennis/+").is_ok());
        assert!(validate_topic_filter("sport/tennis#").is_err());
        assert!(validate_topic_filter("sport/#/ranking").is_err());
        assert!(validate_topic_filter("sport+").is_err());
        assert!(validate_topic_filter("").is_err());
    }

    #[test]
    fn test_shared_subscription() {
        assert!(validate_topic_filter("$share/group/sport/#").is_ok());
        assert!(validate_topic_filter("$share//sport").is_err());
        assert!(validate_topic_filter("$share/group").is_err());
        assert!(validate_topic_filter("$share/gr+oup/sport").is_err());
        assert!(validate_topic_filter("$share/group/sport/#/x").is_err());
        assert!(is_shared_subscription("$share/g/t"));
        assert!(has_wildcard("a/+/c"));
    }
}
