//! # Overlay Packet Wire Format
//!
//! Fixed 12-byte binary header followed by a UTF-8 payload:
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                         srcAdr (32)                          |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                        destAdr (32)                          |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |   protocol    |      ttl      |        payload len (16)       |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                      payload (variable)                      |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! The wire form is implementation-defined by the spec; this is the one
//! stable representation every node in the fleet agrees on.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{OverlayError, Result};

/// Fixed header size in bytes: 4 + 4 + 1 + 1 + 2.
pub const HEADER_LEN: usize = 12;

/// Default TTL for a freshly originated data packet (§4.1).
pub const DEFAULT_DATA_TTL: u8 = 100;

/// Which local consumer a packet is destined for once it reaches `destAdr`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// Application data, delivered to the local source/sink.
    Data,
    /// Router control-plane traffic, delivered to the local Router.
    Router,
}

impl Protocol {
    fn as_u8(self) -> u8 {
        match self {
            Protocol::Data => 1,
            Protocol::Router => 2,
        }
    }

    fn from_u8(v: u8) -> Result<Self> {
        match v {
            1 => Ok(Protocol::Data),
            2 => Ok(Protocol::Router),
            other => Err(OverlayError::UnknownProtocol(other)),
        }
    }
}

/// An overlay packet: a 32-bit source/destination pair, a protocol tag, a
/// hop-count budget, and a bounded text payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub src_adr: u32,
    pub dest_adr: u32,
    pub protocol: Protocol,
    pub ttl: u8,
    pub payload: String,
}

impl Packet {
    /// Build a new DATA packet as the Forwarder does for a source/sink send:
    /// `srcAdr = myIp`, `protocol = Data`, `ttl = DEFAULT_DATA_TTL`.
    pub fn new_data(src_adr: u32, dest_adr: u32, payload: impl Into<String>) -> Self {
        Packet {
            src_adr,
            dest_adr,
            protocol: Protocol::Data,
            ttl: DEFAULT_DATA_TTL,
            payload: payload.into(),
        }
    }

    /// Build a new router-control packet.
    pub fn new_router(src_adr: u32, dest_adr: u32, ttl: u8, payload: impl Into<String>) -> Self {
        Packet {
            src_adr,
            dest_adr,
            protocol: Protocol::Router,
            ttl,
            payload: payload.into(),
        }
    }

    /// Decrement `ttl`, returning `None` if the new value is zero (the
    /// packet must be dropped at this hop rather than forwarded further).
    pub fn decrement_ttl(&mut self) -> Option<u8> {
        self.ttl = self.ttl.saturating_sub(1);
        if self.ttl == 0 {
            None
        } else {
            Some(self.ttl)
        }
    }

    pub fn encode(&self) -> Bytes {
        let payload_bytes = self.payload.as_bytes();
        let mut buf = BytesMut::with_capacity(HEADER_LEN + payload_bytes.len());
        buf.put_u32(self.src_adr);
        buf.put_u32(self.dest_adr);
        buf.put_u8(self.protocol.as_u8());
        buf.put_u8(self.ttl);
        buf.put_u16(payload_bytes.len() as u16);
        buf.put_slice(payload_bytes);
        buf.freeze()
    }

    pub fn decode(mut buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_LEN {
            return Err(OverlayError::PacketTooShort {
                need: HEADER_LEN,
                got: buf.len(),
            });
        }
        let src_adr = buf.get_u32();
        let dest_adr = buf.get_u32();
        let protocol = Protocol::from_u8(buf.get_u8())?;
        let ttl = buf.get_u8();
        let payload_len = buf.get_u16() as usize;
        if buf.remaining() < payload_len {
            return Err(OverlayError::PayloadLengthMismatch {
                declared: payload_len,
                remaining: buf.remaining(),
            });
        }
        let payload_bytes = &buf[..payload_len];
        let payload = std::str::from_utf8(payload_bytes)
            .map_err(|_| OverlayError::InvalidPayloadEncoding)?
            .to_string();
        Ok(Packet {
            src_adr,
            dest_adr,
            protocol,
            ttl,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_data_packet() {
        let p = Packet::new_data(1, 2, "hello");
        let encoded = p.encode();
        let decoded = Packet::decode(&encoded).unwrap();
        assert_eq!(p, decoded);
        assert_eq!(decoded.protocol, Protocol::Data);
        assert_eq!(decoded.ttl, DEFAULT_DATA_TTL);
    }

    #[test]
    fn roundtrip_router_packet() {
        let p = Packet::new_router(10, 20, 5, "RPv0\ntype: hello\ntimestamp: 1.0\n");
        let decoded = Packet::decode(&p.encode()).unwrap();
        assert_eq!(p, decoded);
    }

    #[test]
    fn decode_rejects_short_buffer() {
        assert!(Packet::decode(&[0u8; 4]).is_err());
    }

    #[test]
    fn decode_rejects_truncated_payload() {
        let p = Packet::new_data(1, 2, "hello world");
        let mut encoded = p.encode().to_vec();
        encoded.truncate(HEADER_LEN + 3);
        assert!(Packet::decode(&encoded).is_err());
    }

    #[test]
    fn decrement_ttl_drops_on_the_hop_that_reaches_zero() {
        let mut p = Packet::new_router(0, 0, 1, "");
        assert_eq!(p.decrement_ttl(), None);
    }

    #[test]
    fn decrement_ttl_keeps_forwarding_while_above_zero() {
        let mut p = Packet::new_router(0, 0, 2, "");
        assert_eq!(p.decrement_ttl(), Some(1));
        assert_eq!(p.decrement_ttl(), None);
    }
}
