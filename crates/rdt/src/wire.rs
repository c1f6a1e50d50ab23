//! The RDT packet wire format (§3 "RDT packet"): a 1-byte type tag, a
//! 2-byte sequence number, and — for DATA — a length-prefixed payload.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{RdtError, Result};

/// Largest legal window size, `2^14 - 1` (§3).
pub const MAX_WINDOW: u16 = (1 << 14) - 1;

const TYPE_DATA: u8 = 0;
const TYPE_ACK: u8 = 1;

const HEADER_LEN: usize = 1 + 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RdtPacket {
    Data { seq: u16, payload: Bytes },
    Ack { seq: u16 },
}

impl RdtPacket {
    pub fn seq(&self) -> u16 {
        match self {
            RdtPacket::Data { seq, .. } => *seq,
            RdtPacket::Ack { seq } => *seq,
        }
    }

    pub fn encode(&self) -> Bytes {
        match self {
            RdtPacket::Data { seq, payload } => {
                let mut buf = BytesMut::with_capacity(HEADER_LEN + 2 + payload.len());
                buf.put_u8(TYPE_DATA);
                buf.put_u16(*seq);
                buf.put_u16(payload.len() as u16);
                buf.put_slice(payload);
                buf.freeze()
            }
            RdtPacket::Ack { seq } => {
                let mut buf = BytesMut::with_capacity(HEADER_LEN);
                buf.put_u8(TYPE_ACK);
                buf.put_u16(*seq);
                buf.freeze()
            }
        }
    }

    pub fn decode(mut buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_LEN {
            return Err(RdtError::PacketTooShort {
                need: HEADER_LEN,
                got: buf.len(),
            });
        }
        let ty = buf.get_u8();
        let seq = buf.get_u16();
        match ty {
            TYPE_ACK => Ok(RdtPacket::Ack { seq }),
            TYPE_DATA => {
                if buf.remaining() < 2 {
                    return Err(RdtError::PacketTooShort {
                        need: HEADER_LEN + 2,
                        got: HEADER_LEN + buf.remaining(),
                    });
                }
                let len = buf.get_u16() as usize;
                if buf.remaining() < len {
                    return Err(RdtError::PayloadLengthMismatch {
                        declared: len,
                        remaining: buf.remaining(),
                    });
                }
                let payload = Bytes::copy_from_slice(&buf[..len]);
                Ok(RdtPacket::Data { seq, payload })
            }
            other => Err(RdtError::UnknownType(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_data() {
        let p = RdtPacket::Data {
            seq: 7,
            payload: Bytes::from_static(b"hello"),
        };
        let decoded = RdtPacket::decode(&p.encode()).unwrap();
        assert_eq!(p, decoded);
    }

    #[test]
    fn roundtrip_ack() {
        let p = RdtPacket::Ack { seq: 3 };
        let decoded = RdtPacket::decode(&p.encode()).unwrap();
        assert_eq!(p, decoded);
    }

    #[test]
    fn decode_rejects_short_buffer() {
        assert!(RdtPacket::decode(&[0u8]).is_err());
    }

    #[test]
    fn decode_rejects_unknown_type() {
        let bytes = [9u8, 0, 0];
        assert!(RdtPacket::decode(&bytes).is_err());
    }

    #[test]
    fn decode_rejects_truncated_payload() {
        let p = RdtPacket::Data {
            seq: 1,
            payload: Bytes::from_static(b"hello world"),
        };
        let mut encoded = p.encode().to_vec();
        encoded.truncate(HEADER_LEN + 2 + 3);
        assert!(RdtPacket::decode(&encoded).is_err());
    }
}
