// SPDX-License-Identifier: MPL-2.0

use super::control_packet::MqttPacket;
use crate::mqtt_serde::base_data::{BinaryData, TwoByteInteger, Utf8String, VariableByteInteger};
use std::error::Error;
use std::fmt;
use std::io::Error as IoError;

pub mod stream;

pub type ParserResult = Result<ParseOk, ParseError>;

// First byte of Fixed header
pub const FIXED_HDR_LEN: usize = 1;

/// Largest value a Variable Byte Integer can carry (MQTT 5.0: 1.5.5).
pub const MAX_REMAINING_LENGTH: usize = 268_435_455;

#[derive(Debug)]
pub enum ParseError {
    More(usize, String), // not enough data for processing, hint for how many more bytes are needed
    IoError(IoError),
    ParseError(String),
    IncompleteProperty,
    Utf8Error(std::str::Utf8Error),
    StringTooLong,
    BufferTooShort,
    InvalidLength,
    InvalidPropertyId(usize),
    InvalidPropertyValue(String),
    DuplicateProperty(u8),
    InvalidPacketType,
    InvalidFlags,
    InvalidReasonCode(u8),
    InvalidQoS(u8),
    UnSuppProtoVsn,
    InternalError(String),
    InvalidVariableByteInteger,
}

impl ParseError {
    /// Short diagnostic used in the reason string of a malformed-packet DISCONNECT.
    pub fn diagnostic(&self) -> String {
        match self {
            ParseError::InvalidReasonCode(_) => "invalid Reason Code".to_string(),
            ParseError::InvalidPropertyId(_)
            | ParseError::InvalidPropertyValue(_)
            | ParseError::DuplicateProperty(_)
            | ParseError::IncompleteProperty => "malformed Properties".to_string(),
            ParseError::InvalidFlags => "invalid fixed header flags".to_string(),
            ParseError::InvalidQoS(_) => "invalid QoS".to_string(),
            ParseError::Utf8Error(_) | ParseError::StringTooLong => {
                "malformed UTF-8 string".to_string()
            }
            ParseError::InvalidLength
            | ParseError::BufferTooShort
            | ParseError::InvalidVariableByteInteger => "malformed packet length".to_string(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ParseError::More(hint, msg) => write!(f, "More data needed ({} bytes): {}", hint, msg),
            ParseError::IoError(e) => write!(f, "IO Error: {}", e),
            ParseError::ParseError(msg) => write!(f, "Parse Error: {}", msg),
            ParseError::IncompleteProperty => write!(f, "Incomplete Property"),
            ParseError::Utf8Error(e) => write!(f, "UTF-8 Error: {}", e),
            ParseError::StringTooLong => write!(f, "String Too Long"),
            ParseError::BufferTooShort => write!(f, "Buffer Too Short"),
            ParseError::InvalidLength => write!(f, "Invalid Length"),
            ParseError::InvalidPropertyId(id) => write!(f, "Invalid Property ID 0x{:02x}", id),
            ParseError::InvalidPropertyValue(msg) => write!(f, "Invalid Property Value: {}", msg),
            ParseError::DuplicateProperty(id) => write!(f, "Duplicate Property 0x{:02x}", id),
            ParseError::InvalidPacketType => write!(f, "Invalid Packet Type"),
            ParseError::InvalidFlags => write!(f, "Invalid Fixed Header Flags"),
            ParseError::InvalidReasonCode(rc) => write!(f, "Invalid Reason Code 0x{:02x}", rc),
            ParseError::InvalidQoS(qos) => write!(f, "Invalid QoS {}", qos),
            ParseError::UnSuppProtoVsn => write!(f, "Unsupported Protocol Version"),
            ParseError::InternalError(msg) => write!(f, "Internal Error: {}", msg),
            ParseError::InvalidVariableByteInteger => write!(f, "Invalid Variable Byte Integer"),
        }
    }
}

impl Error for ParseError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ParseError::IoError(e) => Some(e),
            ParseError::Utf8Error(e) => Some(e),
            _ => None,
        }
    }
}

#[derive(Debug, PartialEq)]
pub enum ParseOk {
    Continue(usize, usize),    // (hint, consumed)
    Packet(MqttPacket, usize), // (packet, consumed)
}

pub fn packet_type(buffer: &[u8]) -> Result<u8, ParseError> {
    buffer
        .first()
        .map(|b| b >> 4)
        .ok_or(ParseError::BufferTooShort)
}

pub fn parse_remaining_length(buffer: &[u8]) -> Result<(usize, usize), ParseError> {
    VariableByteInteger::decode(buffer)
}

/// Splits a buffer into the fixed header and the body of a single packet.
///
/// Returns `Ok(None)` when the buffer does not hold the whole packet yet,
/// otherwise `(flags, body_offset, total_len)`.
pub fn parse_fixed_header(
    buffer: &[u8],
    expected_type: u8,
) -> Result<Option<(u8, usize, usize)>, ParseError> {
    if packet_type(buffer)? != expected_type {
        return Err(ParseError::InvalidPacketType);
    }
    let flags = buffer[0] & 0x0F;
    let (size, vbi_len) = match parse_remaining_length(&buffer[FIXED_HDR_LEN..]) {
        Ok(v) => v,
        Err(ParseError::More(..)) | Err(ParseError::BufferTooShort) => return Ok(None),
        Err(e) => return Err(e),
    };
    let offset = FIXED_HDR_LEN + vbi_len;
    let total_len = offset + size;
    if total_len > buffer.len() {
        return Ok(None);
    }
    Ok(Some((flags, offset, total_len)))
}

// 1.5.4 UTF-8 Encoded String
pub fn parse_utf8_string(buffer: &[u8]) -> Result<(String, usize), ParseError> {
    Utf8String::decode(buffer)
}

pub fn parse_packet_id(buffer: &[u8]) -> Result<(u16, usize), ParseError> {
    TwoByteInteger::decode(buffer)
}

pub fn parse_binary_data(buffer: &[u8]) -> Result<(Vec<u8>, usize), ParseError> {
    BinaryData::decode(buffer)
}

pub fn parse_vbi(buffer: &[u8]) -> Result<(usize, usize), ParseError> {
    VariableByteInteger::decode(buffer)
}

pub fn parse_byte(buffer: &[u8]) -> Result<(u8, usize), ParseError> {
    buffer
        .first()
        .map(|b| (*b, 1))
        .ok_or(ParseError::BufferTooShort)
}

/// Fails unless `offset` landed exactly on the end of the packet.
pub fn expect_consumed(offset: usize, total_len: usize) -> Result<(), ParseError> {
    if offset != total_len {
        return Err(ParseError::InternalError(format!(
            "Inconsistent offset {} != total: {}",
            offset, total_len
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_header_incomplete() {
        // PUBACK with remaining length 4 but only 2 body bytes
        let buf = [0x40, 0x04, 0x00, 0x01];
        assert!(parse_fixed_header(&buf, 4).unwrap().is_none());
    }

    #[test]
    fn test_fixed_header_complete() {
        let buf = [0x40, 0x02, 0x00, 0x01];
        assert_eq!(parse_fixed_header(&buf, 4).unwrap(), Some((0, 2, 4)));
    }

    #[test]
    fn test_fixed_header_wrong_type() {
        let buf = [0x50, 0x02, 0x00, 0x01];
        assert!(matches!(
            parse_fixed_header(&buf, 4),
            Err(ParseError::InvalidPacketType)
        ));
    }

    #[test]
    fn test_diagnostic_reason_code() {
        assert_eq!(
            ParseError::InvalidReasonCode(0x05).diagnostic(),
            "invalid Reason Code"
        );
    }
}
