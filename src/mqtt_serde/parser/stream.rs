// SPDX-License-Identifier: MPL-2.0

use crate::mqtt_serde::control_packet::MqttPacket;
use crate::mqtt_serde::parser::{ParseError, ParseOk};
use bytes::{Buf, BytesMut};

/// A stateful parser for a stream of MQTT data.
/// It internally buffers data from a stream and yields complete packets.
#[derive(Debug)]
pub struct MqttParser {
    buffer: BytesMut,
}

impl Default for MqttParser {
    fn default() -> Self {
        Self::new(16384)
    }
}

impl MqttParser {
    pub fn new(buffer_size: usize) -> Self {
        MqttParser {
            buffer: BytesMut::with_capacity(buffer_size),
        }
    }

    /// Appends new data from the stream to the internal buffer.
    pub fn feed(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Attempts to parse a single MQTT packet from the internal buffer.
    ///
    /// - If a full packet is available, it returns `Ok(Some(MqttPacket))`,
    ///   and the corresponding bytes are removed from the buffer.
    /// - If the buffer does not contain a full packet, it returns `Ok(None)`.
    /// - If the data in the buffer is malformed, it returns `Err(ParseError)`.
    ///   The buffer is left untouched; the connection is expected to be dropped.
    pub fn next_packet(&mut self) -> Result<Option<MqttPacket>, ParseError> {
        if self.buffer.is_empty() {
            return Ok(None);
        }
        match MqttPacket::from_bytes(&self.buffer)? {
            ParseOk::Packet(packet, consumed) => {
                self.buffer.advance(consumed);
                Ok(Some(packet))
            }
            ParseOk::Continue(_, _) => Ok(None),
        }
    }

    pub fn buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.buffer
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Drops any partial packet, used when the connection is replaced.
    pub fn reset(&mut self) {
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parser_partial_then_complete() {
        let mut parser = MqttParser::default();
        assert!(parser.next_packet().unwrap().is_none());

        parser.feed(&[0x40, 0x02, 0x00]);
        assert!(parser.next_packet().unwrap().is_none());
        assert_eq!(parser.buffered(), 3);

        parser.feed(&[0x07, 0xD0]);
        match parser.next_packet().unwrap() {
            Some(MqttPacket::PubAck(ack)) => assert_eq!(ack.packet_id, 7),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(parser.buffered(), 1);
        assert!(parser.next_packet().unwrap().is_none());
    }

    #[test]
    fn test_parser_malformed() {
        let mut parser = MqttParser::default();
        // PUBACK with an illegal Reason Code
        parser.feed(&[0x40, 0x03, 0x00, 0x01, 0xFF]);
        assert!(matches!(
            parser.next_packet(),
            Err(ParseError::InvalidReasonCode(0xFF))
        ));
    }

    #[test]
    fn test_parser_reserved_packet_type() {
        let mut parser = MqttParser::default();
        parser.feed(&[0x00, 0x00]);
        assert!(matches!(
            parser.next_packet(),
            Err(ParseError::InvalidPacketType)
        ));
    }
}
