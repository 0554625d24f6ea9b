// SPDX-License-Identifier: MPL-2.0

//! MQTT 5.0 data representations (section 1.5).

use crate::mqtt_serde::parser::{ParseError, MAX_REMAINING_LENGTH};

pub struct TwoByteInteger;

impl TwoByteInteger {
    pub fn encode(val: u16) -> [u8; 2] {
        val.to_be_bytes()
    }

    pub fn decode(bytes: &[u8]) -> Result<(u16, usize), ParseError> {
        let raw = bytes.get(..2).ok_or(ParseError::BufferTooShort)?;
        Ok((u16::from_be_bytes([raw[0], raw[1]]), 2))
    }
}

pub struct FourByteInteger;

impl FourByteInteger {
    pub fn encode(val: u32) -> [u8; 4] {
        val.to_be_bytes()
    }

    pub fn decode(bytes: &[u8]) -> Result<(u32, usize), ParseError> {
        let raw = bytes.get(..4).ok_or(ParseError::BufferTooShort)?;
        Ok((u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]), 4))
    }
}

pub struct VariableByteInteger;

impl VariableByteInteger {
    pub fn encode(val: u32) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(4);
        let mut num = val;
        loop {
            let mut byte = (num % 128) as u8;
            num /= 128;
            if num > 0 {
                byte |= 0x80;
            }
            bytes.push(byte);
            if num == 0 {
                return bytes;
            }
        }
    }

    /// Number of bytes `encode` produces for `val`.
    pub fn encoded_len(val: usize) -> usize {
        match val {
            0..=127 => 1,
            128..=16_383 => 2,
            16_384..=2_097_151 => 3,
            _ => 4,
        }
    }

    /// Decodes at most four bytes; a fifth continuation byte is malformed.
    pub fn decode(buffer: &[u8]) -> Result<(usize, usize), ParseError> {
        if buffer.is_empty() {
            return Err(ParseError::BufferTooShort);
        }

        let mut value: usize = 0;
        for (i, byte) in buffer.iter().take(4).enumerate() {
            value += ((byte & 0x7F) as usize) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok((value, i + 1));
            }
        }

        if buffer.len() >= 4 {
            return Err(ParseError::InvalidVariableByteInteger);
        }
        Err(ParseError::More(
            1,
            "vbi: not enough bytes for remaining length".to_string(),
        ))
    }
}

pub struct BinaryData;

impl BinaryData {
    pub fn encode(data: &[u8]) -> Result<Vec<u8>, ParseError> {
        let len = u16::try_from(data.len()).map_err(|_| ParseError::StringTooLong)?;
        let mut bytes = Vec::with_capacity(2 + data.len());
        bytes.extend_from_slice(&len.to_be_bytes());
        bytes.extend_from_slice(data);
        Ok(bytes)
    }

    pub fn decode(bytes: &[u8]) -> Result<(Vec<u8>, usize), ParseError> {
        let (len, _) = TwoByteInteger::decode(bytes)?;
        let end = 2 + len as usize;
        let data = bytes.get(2..end).ok_or(ParseError::BufferTooShort)?;
        Ok((data.to_vec(), end))
    }
}

pub struct Utf8String;

impl Utf8String {
    pub fn encode(s: &str) -> Result<Vec<u8>, ParseError> {
        validate_mqtt_utf8(s)?;
        BinaryData::encode(s.as_bytes())
    }

    pub fn decode(bytes: &[u8]) -> Result<(String, usize), ParseError> {
        let (len, _) = TwoByteInteger::decode(bytes)?;
        let end = 2 + len as usize;
        let data = bytes.get(2..end).ok_or(ParseError::BufferTooShort)?;
        let s = std::str::from_utf8(data).map_err(ParseError::Utf8Error)?;
        validate_mqtt_utf8(s)?;
        Ok((s.to_string(), end))
    }
}

pub struct Utf8StringPair;

impl Utf8StringPair {
    pub fn encode(key: &str, value: &str) -> Result<Vec<u8>, ParseError> {
        let mut bytes = Utf8String::encode(key)?;
        bytes.extend(Utf8String::encode(value)?);
        Ok(bytes)
    }

    pub fn decode(bytes: &[u8]) -> Result<((String, String), usize), ParseError> {
        let (key, key_len) = Utf8String::decode(bytes)?;
        let (value, value_len) = Utf8String::decode(&bytes[key_len..])?;
        Ok(((key, value), key_len + value_len))
    }
}

/// MQTT 5.0: 1.5.4. Strings MUST NOT include U+0000 and MUST fit in 65535 bytes.
/// Surrogates cannot occur in a Rust `str`.
pub fn validate_mqtt_utf8(s: &str) -> Result<(), ParseError> {
    if s.len() > u16::MAX as usize {
        return Err(ParseError::StringTooLong);
    }
    if s.contains('\u{0}') {
        return Err(ParseError::ParseError(
            "UTF-8 string contains null character (U+0000)".to_string(),
        ));
    }
    Ok(())
}

/// Checks a remaining length fits the VBI range before it is written out.
pub fn checked_remaining_length(len: usize) -> Result<u32, ParseError> {
    if len > MAX_REMAINING_LENGTH {
        return Err(ParseError::InvalidLength);
    }
    Ok(len as u32)
}
