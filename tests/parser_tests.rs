// SPDX-License-Identifier: MPL-2.0

// Stream parser behavior over MQTT 5.0 byte streams

use mqtt5_engine::mqtt_serde::control_packet::{MqttControlPacket, MqttPacket};
use mqtt5_engine::mqtt_serde::mqttv5::common::properties::Property;
use mqtt5_engine::mqtt_serde::mqttv5::connackv5::MqttConnAck;
use mqtt5_engine::mqtt_serde::mqttv5::publishv5::MqttPublish;
use mqtt5_engine::mqtt_serde::mqttv5::subackv5::MqttSubAck;
use mqtt5_engine::mqtt_serde::parser::{
    packet_type, parse_binary_data, parse_packet_id, parse_remaining_length, parse_utf8_string,
    stream::MqttParser, ParseError,
};

fn connect_packet() -> Vec<u8> {
    let mut bytes = vec![
        0x10, 0x1f, 0x00, 0x04, b'M', b'Q', b'T', b'T', 0x05, 0x02, 0x01, 0x2c, 0x05, 0x11, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x0d,
    ];
    bytes.extend_from_slice(b"parser_client");
    bytes
}

#[test]
fn test_packet_type_extraction() {
    assert_eq!(packet_type(&[0x10]).unwrap(), 1);
    assert_eq!(packet_type(&[0x20]).unwrap(), 2);
    assert_eq!(packet_type(&[0xc0]).unwrap(), 12);
    assert_eq!(packet_type(&[0xf0]).unwrap(), 15);
    assert!(packet_type(&[]).is_err());
}

#[test]
fn test_parse_remaining_length() {
    assert_eq!(parse_remaining_length(&[0x00]).unwrap(), (0, 1));
    assert_eq!(parse_remaining_length(&[0x7f]).unwrap(), (127, 1));
    assert_eq!(parse_remaining_length(&[0x80, 0x01]).unwrap(), (128, 2));
    assert_eq!(
        parse_remaining_length(&[0xff, 0xff, 0xff, 0x7f]).unwrap(),
        (268_435_455, 4)
    );
    // A fifth continuation byte is malformed
    assert!(parse_remaining_length(&[0xff, 0xff, 0xff, 0xff, 0x01]).is_err());
}

#[test]
fn test_parse_fields() {
    assert_eq!(
        parse_utf8_string(&[0x00, 0x03, b'a', b'/', b'b']).unwrap(),
        ("a/b".to_string(), 5)
    );
    assert!(parse_utf8_string(&[0x00, 0x02, 0xc3, 0x28]).is_err());
    assert_eq!(parse_packet_id(&[0x12, 0x34]).unwrap(), (0x1234, 2));
    assert_eq!(
        parse_binary_data(&[0x00, 0x02, 0xde, 0xad]).unwrap(),
        (vec![0xde, 0xad], 4)
    );
}

mod stream_tests {
    use super::*;

    #[test]
    fn test_connect_parsing() {
        let mut parser = MqttParser::default();
        parser.feed(&connect_packet());
        match parser.next_packet().unwrap() {
            Some(MqttPacket::Connect(connect)) => {
                assert_eq!(connect.client_id, "parser_client");
                assert_eq!(connect.keep_alive, 300);
                assert!(connect.clean_start);
                assert_eq!(connect.protocol_version, 5);
                assert!(connect
                    .properties
                    .contains(&Property::SessionExpiryInterval(0)));
            }
            other => panic!("expected CONNECT, got {:?}", other),
        }
        assert_eq!(parser.buffered(), 0);
    }

    #[test]
    fn test_byte_by_byte_feeding() {
        let bytes = MqttPublish::new(1, "s/t".to_string(), Some(3), b"body".to_vec(), false, false)
            .to_bytes()
            .unwrap();
        let mut parser = MqttParser::new(4);
        for (i, byte) in bytes.iter().enumerate() {
            parser.feed(&[*byte]);
            let parsed = parser.next_packet().unwrap();
            if i + 1 < bytes.len() {
                assert!(parsed.is_none(), "packet complete after {} bytes", i + 1);
            } else {
                match parsed {
                    Some(MqttPacket::Publish(p)) => {
                        assert_eq!(p.topic_name, "s/t");
                        assert_eq!(p.packet_id, Some(3));
                        assert_eq!(p.payload, b"body");
                    }
                    other => panic!("expected PUBLISH, got {:?}", other),
                }
            }
        }
    }

    #[test]
    fn test_back_to_back_packets() {
        let mut stream = MqttConnAck::new(true, 0, vec![Property::ReceiveMaximum(10)])
            .to_bytes()
            .unwrap();
        stream.extend(MqttSubAck::new(4, vec![0, 1, 0x87], vec![]).to_bytes().unwrap());
        stream.extend([0xd0, 0x00]);

        let mut parser = MqttParser::default();
        parser.feed(&stream);
        match parser.next_packet().unwrap() {
            Some(MqttPacket::ConnAck(ack)) => {
                assert!(ack.session_present);
                assert_eq!(ack.properties, vec![Property::ReceiveMaximum(10)]);
            }
            other => panic!("expected CONNACK, got {:?}", other),
        }
        assert!(
            matches!(parser.next_packet().unwrap(), Some(MqttPacket::SubAck(s)) if s.reason_codes == vec![0, 1, 0x87])
        );
        assert!(matches!(
            parser.next_packet().unwrap(),
            Some(MqttPacket::PingResp(_))
        ));
        assert!(parser.next_packet().unwrap().is_none());
    }

    #[test]
    fn test_reset_drops_partial_packet() {
        let mut parser = MqttParser::default();
        parser.feed(&connect_packet()[..10]);
        assert!(parser.next_packet().unwrap().is_none());
        parser.reset();
        assert_eq!(parser.buffered(), 0);

        parser.feed(&[0xe0, 0x00]);
        match parser.next_packet().unwrap() {
            Some(MqttPacket::Disconnect(d)) => assert_eq!(d.reason_code, 0),
            other => panic!("expected DISCONNECT, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_input() {
        // SUBACK carrying a Reason Code SUBACK never uses
        let mut parser = MqttParser::default();
        parser.feed(&[0x90, 0x04, 0x00, 0x01, 0x00, 0x03]);
        let err = parser.next_packet().unwrap_err();
        assert!(matches!(err, ParseError::InvalidReasonCode(0x03)));
        assert_eq!(err.diagnostic(), "invalid Reason Code");

        // PUBREL must carry flags 0b0010
        let mut parser = MqttParser::default();
        parser.feed(&[0x60, 0x02, 0x00, 0x01]);
        assert!(parser.next_packet().is_err());

        // Duplicate Receive Maximum in a CONNACK
        let mut parser = MqttParser::default();
        parser.feed(&[0x20, 0x09, 0x00, 0x00, 0x06, 0x21, 0x00, 0x01, 0x21, 0x00, 0x02]);
        let err = parser.next_packet().unwrap_err();
        assert_eq!(err.diagnostic(), "malformed Properties");
    }
}
