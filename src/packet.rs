//! Wire packet definitions and binary codec
//!
//! The closed set of messages exchanged between client and relay, framed as
//! `[type: 1 byte][length: u32 big-endian][payload: length bytes]`.
//! Strings inside a payload are length-prefixed with a u32 big-endian byte
//! count followed by UTF-8 data.
//!
//! Decoding rejects unknown tags, truncated payloads, invalid UTF-8 and
//! trailing bytes as [`DecodeError`], never silent coercion. The codec does
//! not enforce any string length limit; that is session-layer policy.

use bytes::{Buf, BufMut};

use crate::error::DecodeError;

/// Number of bytes in a frame header (tag + payload length)
pub const FRAME_HEADER_LEN: usize = 5;

const TAG_CONNECT: u8 = 0x01;
const TAG_DISCONNECT: u8 = 0x02;
const TAG_GROUP_MESSAGE: u8 = 0x03;
const TAG_PRIVATE_MESSAGE: u8 = 0x04;
const TAG_ROSTER_UPDATE: u8 = 0x05;

/// A wire message
///
/// Packet instances are transient: constructed per send, discarded after
/// write or dispatch. The variant set is closed; new message kinds extend
/// the tag space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    /// First packet on a new connection; not valid afterward
    Connect { display_name: String },
    /// Voluntary departure; terminal for the connection
    Disconnect,
    /// Broadcast to all other registered connections
    GroupMessage { body: String, sender: String },
    /// Delivered to exactly one registered connection
    PrivateMessage {
        body: String,
        sender: String,
        recipient: String,
    },
    /// Server-to-client snapshot of the registered-name set
    RosterUpdate { names: Vec<String> },
}

impl Packet {
    /// Wire tag byte for this variant
    pub fn tag(&self) -> u8 {
        match self {
            Packet::Connect { .. } => TAG_CONNECT,
            Packet::Disconnect => TAG_DISCONNECT,
            Packet::GroupMessage { .. } => TAG_GROUP_MESSAGE,
            Packet::PrivateMessage { .. } => TAG_PRIVATE_MESSAGE,
            Packet::RosterUpdate { .. } => TAG_ROSTER_UPDATE,
        }
    }

    /// Encode into a complete frame including the header
    pub fn encode(&self) -> Vec<u8> {
        let mut payload = Vec::new();
        match self {
            Packet::Connect { display_name } => {
                put_string(&mut payload, display_name);
            }
            Packet::Disconnect => {}
            Packet::GroupMessage { body, sender } => {
                put_string(&mut payload, body);
                put_string(&mut payload, sender);
            }
            Packet::PrivateMessage {
                body,
                sender,
                recipient,
            } => {
                put_string(&mut payload, body);
                put_string(&mut payload, sender);
                put_string(&mut payload, recipient);
            }
            Packet::RosterUpdate { names } => {
                payload.put_u32(names.len() as u32);
                for name in names {
                    put_string(&mut payload, name);
                }
            }
        }

        let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
        frame.put_u8(self.tag());
        frame.put_u32(payload.len() as u32);
        frame.extend_from_slice(&payload);
        frame
    }

    /// Decode a packet from its tag byte and payload bytes
    ///
    /// The payload must be exactly the frame's declared length; every byte
    /// must be consumed by the variant's fields.
    pub fn decode(tag: u8, payload: &[u8]) -> Result<Packet, DecodeError> {
        let mut buf = payload;
        let packet = match tag {
            TAG_CONNECT => Packet::Connect {
                display_name: take_string(&mut buf)?,
            },
            TAG_DISCONNECT => Packet::Disconnect,
            TAG_GROUP_MESSAGE => Packet::GroupMessage {
                body: take_string(&mut buf)?,
                sender: take_string(&mut buf)?,
            },
            TAG_PRIVATE_MESSAGE => Packet::PrivateMessage {
                body: take_string(&mut buf)?,
                sender: take_string(&mut buf)?,
                recipient: take_string(&mut buf)?,
            },
            TAG_ROSTER_UPDATE => {
                if buf.remaining() < 4 {
                    return Err(DecodeError::Truncated);
                }
                let count = buf.get_u32() as usize;
                let mut names = Vec::with_capacity(count.min(1024));
                for _ in 0..count {
                    names.push(take_string(&mut buf)?);
                }
                Packet::RosterUpdate { names }
            }
            other => return Err(DecodeError::UnknownTag(other)),
        };

        if buf.has_remaining() {
            return Err(DecodeError::TrailingBytes);
        }
        Ok(packet)
    }
}

/// Append a u32-length-prefixed UTF-8 string to a payload buffer
fn put_string(buf: &mut Vec<u8>, value: &str) {
    buf.put_u32(value.len() as u32);
    buf.put_slice(value.as_bytes());
}

/// Consume a u32-length-prefixed UTF-8 string from the front of a buffer
fn take_string(buf: &mut &[u8]) -> Result<String, DecodeError> {
    if buf.remaining() < 4 {
        return Err(DecodeError::Truncated);
    }
    let len = buf.get_u32() as usize;
    if buf.remaining() < len {
        return Err(DecodeError::Truncated);
    }
    let data = buf.copy_to_bytes(len);
    String::from_utf8(data.to_vec()).map_err(|_| DecodeError::InvalidUtf8)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_frame(frame: &[u8]) -> Result<Packet, DecodeError> {
        let tag = frame[0];
        let len = u32::from_be_bytes([frame[1], frame[2], frame[3], frame[4]]) as usize;
        assert_eq!(frame.len(), FRAME_HEADER_LEN + len);
        Packet::decode(tag, &frame[FRAME_HEADER_LEN..])
    }

    #[test]
    fn test_frame_header_layout() {
        let frame = Packet::Connect {
            display_name: "alice".to_string(),
        }
        .encode();

        assert_eq!(frame[0], 0x01);
        // Payload is a u32 length prefix plus five UTF-8 bytes
        assert_eq!(&frame[1..5], &9u32.to_be_bytes());
    }

    #[test]
    fn test_connect_roundtrip() {
        let packet = Packet::Connect {
            display_name: "alice".to_string(),
        };
        assert_eq!(decode_frame(&packet.encode()).unwrap(), packet);
    }

    #[test]
    fn test_disconnect_has_empty_payload() {
        let frame = Packet::Disconnect.encode();
        assert_eq!(frame.len(), FRAME_HEADER_LEN);
        assert_eq!(decode_frame(&frame).unwrap(), Packet::Disconnect);
    }

    #[test]
    fn test_roster_preserves_order() {
        let packet = Packet::RosterUpdate {
            names: vec!["bob".to_string(), "alice".to_string(), "carol".to_string()],
        };
        let decoded = decode_frame(&packet.encode()).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn test_unknown_tag_rejected() {
        assert_eq!(
            Packet::decode(0x7f, &[]),
            Err(DecodeError::UnknownTag(0x7f))
        );
    }

    #[test]
    fn test_truncated_payload_rejected() {
        // Connect with a declared string length longer than the payload
        let mut payload = Vec::new();
        payload.put_u32(100);
        payload.put_slice(b"short");
        assert_eq!(
            Packet::decode(0x01, &payload),
            Err(DecodeError::Truncated)
        );
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut payload = Vec::new();
        put_string(&mut payload, "alice");
        payload.push(0xff);
        assert_eq!(
            Packet::decode(0x01, &payload),
            Err(DecodeError::TrailingBytes)
        );
    }

    #[test]
    fn test_invalid_utf8_rejected() {
        let mut payload = Vec::new();
        payload.put_u32(2);
        payload.put_slice(&[0xc3, 0x28]);
        assert_eq!(
            Packet::decode(0x01, &payload),
            Err(DecodeError::InvalidUtf8)
        );
    }

    #[test]
    fn test_private_message_roundtrip() {
        let packet = Packet::PrivateMessage {
            body: "hello there".to_string(),
            sender: "alice".to_string(),
            recipient: "bob".to_string(),
        };
        assert_eq!(decode_frame(&packet.encode()).unwrap(), packet);
    }
}
