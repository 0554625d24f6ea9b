// SPDX-License-Identifier: MPL-2.0

//! Shared layout of PUBACK, PUBREC, PUBREL and PUBCOMP (MQTT 5.0: 3.4 - 3.7).

use crate::mqtt_serde::mqttv5::common::properties::{
    encode_properties_hdr, parse_properties_hdr, Property,
};
use crate::mqtt_serde::mqttv5::common::reason_code;
use crate::mqtt_serde::parser::{
    expect_consumed, parse_fixed_header, parse_packet_id, ParseError,
};

pub(crate) struct DecodedAck {
    pub packet_id: u16,
    pub reason_code: u8,
    pub properties: Vec<Property>,
    pub total_len: usize,
}

pub(crate) fn encode_ack(
    packet_id: u16,
    reason_code: u8,
    properties: &[Property],
) -> Result<Vec<u8>, ParseError> {
    let mut bytes = packet_id.to_be_bytes().to_vec();
    // The Reason Code and Property Length can be omitted for Success without properties.
    if reason_code == reason_code::SUCCESS && properties.is_empty() {
        return Ok(bytes);
    }
    bytes.push(reason_code);
    if !properties.is_empty() {
        bytes.extend(encode_properties_hdr(properties)?);
    }
    Ok(bytes)
}

/// Returns `Ok(None)` when more bytes are needed.
pub(crate) fn decode_ack(
    buffer: &[u8],
    packet_type: u8,
    required_flags: u8,
    allowed_codes: &[u8],
) -> Result<Option<DecodedAck>, ParseError> {
    let (flags, mut offset, total_len) = match parse_fixed_header(buffer, packet_type)? {
        Some(hdr) => hdr,
        None => return Ok(None),
    };
    if flags != required_flags {
        return Err(ParseError::InvalidFlags);
    }
    if total_len - offset < 2 {
        return Err(ParseError::InvalidLength);
    }

    let (packet_id, consumed) = parse_packet_id(&buffer[offset..total_len])?;
    if packet_id == 0 {
        return Err(ParseError::ParseError(
            "Packet Identifier must be non-zero".to_string(),
        ));
    }
    offset += consumed;

    let mut reason = reason_code::SUCCESS;
    if offset < total_len {
        reason = reason_code::check(buffer[offset], allowed_codes)?;
        offset += 1;
    }

    let mut properties = Vec::new();
    if offset < total_len {
        let (props, consumed) = parse_properties_hdr(&buffer[offset..total_len])?;
        properties = props;
        offset += consumed;
    }

    expect_consumed(offset, total_len)?;
    Ok(Some(DecodedAck {
        packet_id,
        reason_code: reason,
        properties,
        total_len,
    }))
}
