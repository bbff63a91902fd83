//! Codec for the legacy socket.io 0.9 text framing
//! `<opcode>:[<id>][+]:<endpoint>:<payload>`.
//!
//! ACK frames are irregular: their primary id slot must be empty and the
//! acknowledged id (plus optional `+`) sits after the endpoint separator
//! instead. That placement is reproduced exactly, not normalized away on the
//! wire.

use super::{Opcode, Packet};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("invalid opcode byte: {0:#04x}")]
    InvalidOpcode(u8),
    #[error("expected ':' separator")]
    MissingSeparator,
    #[error("ack packet with id in the primary slot")]
    AckIdInPrimarySlot,
    #[error("ack packet without a referenced id")]
    AckIdMissing,
    #[error("packet id does not fit in 64 bits")]
    IdOutOfRange,
    #[error("packet payload is not valid UTF-8")]
    InvalidUtf8,
    #[error("unexpected end of frame")]
    UnexpectedEof,
}

/// Decodes one wire frame into a [`Packet`].
pub fn decode_packet(data: &[u8]) -> Result<Packet, FrameError> {
    let mut cursor = Cursor::new(data);

    let first = cursor.read_u8()?;
    let opcode = Opcode::from_digit(first).ok_or(FrameError::InvalidOpcode(first))?;
    cursor.expect(b':')?;

    let mut id = cursor.read_decimal()?;
    let mut ack_with_data = cursor.read_if(|b| b == b'+').is_some();

    cursor.expect(b':')?;

    let endpoint = cursor.take_while(|b| b != b':');
    let endpoint = String::from_utf8(endpoint.to_vec()).map_err(|_| FrameError::InvalidUtf8)?;
    cursor.read_if(|b| b == b':');

    if opcode == Opcode::Ack {
        if id.is_some() || ack_with_data {
            return Err(FrameError::AckIdInPrimarySlot);
        }
        id = Some(cursor.read_decimal()?.ok_or(FrameError::AckIdMissing)?);
        ack_with_data = cursor.read_if(|b| b == b'+').is_some();
    }

    let payload =
        String::from_utf8(cursor.rest().to_vec()).map_err(|_| FrameError::InvalidUtf8)?;

    Ok(Packet {
        opcode,
        id,
        ack_with_data,
        endpoint,
        payload,
    })
}

/// Encodes a well-formed [`Packet`] back to wire bytes.
///
/// Strict inverse of [`decode_packet`] on the frames this client handles:
/// the payload separator is only emitted when a payload is present, matching
/// the `1::` / `2::` frames the server produces.
pub fn encode_packet(packet: &Packet) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + packet.payload.len());
    out.push(packet.opcode.as_digit());
    out.push(b':');

    if packet.opcode != Opcode::Ack {
        if let Some(id) = packet.id {
            out.extend_from_slice(id.to_string().as_bytes());
            if packet.ack_with_data {
                out.push(b'+');
            }
        }
    }

    out.push(b':');
    out.extend_from_slice(packet.endpoint.as_bytes());

    if packet.opcode == Opcode::Ack {
        out.push(b':');
        if let Some(id) = packet.id {
            out.extend_from_slice(id.to_string().as_bytes());
            if packet.ack_with_data {
                out.push(b'+');
            }
        }
        out.extend_from_slice(packet.payload.as_bytes());
    } else if !packet.payload.is_empty() {
        out.push(b':');
        out.extend_from_slice(packet.payload.as_bytes());
    }

    out
}

#[derive(Clone, Copy)]
struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn read_u8(&mut self) -> Result<u8, FrameError> {
        let byte = self.peek().ok_or(FrameError::UnexpectedEof)?;
        self.pos += 1;
        Ok(byte)
    }

    fn expect(&mut self, want: u8) -> Result<(), FrameError> {
        match self.read_u8()? {
            byte if byte == want => Ok(()),
            _ => Err(FrameError::MissingSeparator),
        }
    }

    fn read_if(&mut self, pred: impl Fn(u8) -> bool) -> Option<u8> {
        match self.peek() {
            Some(byte) if pred(byte) => {
                self.pos += 1;
                Some(byte)
            }
            _ => None,
        }
    }

    /// Longest run of decimal digits, or `None` if no digit is present.
    /// The grammar puts no bound on the run, so overflow is a frame error
    /// rather than a panic.
    fn read_decimal(&mut self) -> Result<Option<u64>, FrameError> {
        let mut value: u64 = 0;
        let mut any = false;
        while let Some(byte) = self.read_if(|b| b.is_ascii_digit()) {
            value = value
                .checked_mul(10)
                .and_then(|v| v.checked_add(u64::from(byte - b'0')))
                .ok_or(FrameError::IdOutOfRange)?;
            any = true;
        }
        Ok(any.then_some(value))
    }

    fn take_while(&mut self, pred: impl Fn(u8) -> bool) -> &'a [u8] {
        let start = self.pos;
        while self.read_if(&pred).is_some() {}
        &self.bytes[start..self.pos]
    }

    fn rest(&self) -> &'a [u8] {
        &self.bytes[self.pos..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::EVENT_JOIN_PROJECT;

    #[test]
    fn decodes_connect_handshake() {
        let pkt = decode_packet(b"1::").expect("decode");
        assert_eq!(pkt.opcode, Opcode::Connect);
        assert_eq!(pkt.id, None);
        assert!(!pkt.ack_with_data);
        assert_eq!(pkt.endpoint, "");
        assert_eq!(pkt.payload, "");
    }

    #[test]
    fn decodes_heartbeat() {
        let pkt = decode_packet(b"2::").expect("decode");
        assert_eq!(pkt.opcode, Opcode::Heartbeat);
        assert_eq!(pkt.id, None);
        assert_eq!(pkt.payload, "");
    }

    #[test]
    fn decodes_join_event() {
        let json = r#"{"name":"joinProjectResponse","args":[]}"#;
        let frame = format!("5:::{json}");
        let pkt = decode_packet(frame.as_bytes()).expect("decode");
        assert_eq!(pkt.opcode, Opcode::Event);
        assert_eq!(pkt.id, None);
        assert_eq!(pkt.payload, json);

        let event = pkt.event_payload().expect("payload");
        assert_eq!(event.name, EVENT_JOIN_PROJECT);
        assert!(event.args.is_empty());
    }

    #[test]
    fn decodes_event_with_id_and_flag() {
        let pkt = decode_packet(b"5:12+::{\"name\":\"x\",\"args\":[]}").expect("decode");
        assert_eq!(pkt.opcode, Opcode::Event);
        assert_eq!(pkt.id, Some(12));
        assert!(pkt.ack_with_data);
    }

    #[test]
    fn decodes_ack_id_after_endpoint() {
        let pkt = decode_packet(b"6:::12+[null,[\"a\"]]").expect("decode");
        assert_eq!(pkt.opcode, Opcode::Ack);
        assert_eq!(pkt.id, Some(12));
        assert!(pkt.ack_with_data);
        assert_eq!(pkt.payload, "[null,[\"a\"]]");
    }

    #[test]
    fn decodes_ack_without_data_flag() {
        let pkt = decode_packet(b"6:::4").expect("decode");
        assert_eq!(pkt.id, Some(4));
        assert!(!pkt.ack_with_data);
        assert_eq!(pkt.payload, "");
    }

    #[test]
    fn rejects_ack_with_primary_slot_id() {
        assert_eq!(
            decode_packet(b"6:4+::whatever"),
            Err(FrameError::AckIdInPrimarySlot)
        );
        assert_eq!(decode_packet(b"6:4::x"), Err(FrameError::AckIdInPrimarySlot));
    }

    #[test]
    fn rejects_ack_without_referenced_id() {
        assert_eq!(decode_packet(b"6:::"), Err(FrameError::AckIdMissing));
        assert_eq!(decode_packet(b"6::"), Err(FrameError::AckIdMissing));
    }

    #[test]
    fn rejects_id_overflowing_u64() {
        // One digit past u64::MAX in either id position.
        assert_eq!(
            decode_packet(b"6:::999999999999999999999[null]"),
            Err(FrameError::IdOutOfRange)
        );
        assert_eq!(
            decode_packet(b"5:99999999999999999999+::{}"),
            Err(FrameError::IdOutOfRange)
        );
    }

    #[test]
    fn rejects_bad_opcode_byte() {
        assert_eq!(decode_packet(b"9::"), Err(FrameError::InvalidOpcode(b'9')));
        assert_eq!(decode_packet(b"x::"), Err(FrameError::InvalidOpcode(b'x')));
    }

    #[test]
    fn rejects_missing_separator() {
        assert_eq!(decode_packet(b"5"), Err(FrameError::UnexpectedEof));
        assert_eq!(decode_packet(b"5x::"), Err(FrameError::MissingSeparator));
        assert_eq!(decode_packet(b"5:12+"), Err(FrameError::UnexpectedEof));
    }

    #[test]
    fn roundtrips_observed_frames() {
        for frame in [
            &b"1::"[..],
            b"2::",
            b"0::",
            b"5:::{\"name\":\"joinProjectResponse\",\"args\":[]}",
            b"5:3+::{\"name\":\"joinDoc\",\"args\":[\"d\"]}",
            b"6:::7+[null]",
            b"6:::9",
        ] {
            let pkt = decode_packet(frame).expect("decode");
            assert_eq!(encode_packet(&pkt), frame.to_vec(), "frame {frame:?}");
        }
    }

    #[test]
    fn encodes_outbound_call_shape() {
        let payload = crate::protocol::EventPayload {
            name: "joinDoc".to_string(),
            args: vec![serde_json::json!("abc123")],
        };
        let encoded = encode_packet(&Packet::event(4, &payload));
        assert_eq!(
            encoded,
            b"5:4+::{\"name\":\"joinDoc\",\"args\":[\"abc123\"]}".to_vec()
        );
    }
}
