//! Go-back-N receiver state: strict in-order, exactly-once delivery with
//! cumulative ACKs (§4.3).

use bytes::Bytes;

use crate::seq::incr;

pub struct Receiver {
    space: u16,
    recv_buf: Vec<Option<Bytes>>,
    recv_base: u16,
    exp_seq_num: u16,
}

impl Receiver {
    pub fn new(space: u16) -> Self {
        Receiver {
            space,
            recv_buf: vec![None; space as usize],
            recv_base: 0,
            exp_seq_num: 0,
        }
    }

    /// True iff `recvBuf[recvBase]` holds a payload ready to deliver.
    pub fn has_deliverable(&self) -> bool {
        self.recv_buf[self.recv_base as usize].is_some()
    }

    /// Deliver and clear `recvBuf[recvBase]`, advancing `recvBase`.
    pub fn deliver(&mut self) -> Option<Bytes> {
        let slot = self.recv_buf[self.recv_base as usize].take();
        if slot.is_some() {
            self.recv_base = incr(self.recv_base, self.space);
        }
        slot
    }

    /// Handle an inbound DATA packet, returning the sequence number to ACK
    /// (§4.3 "DATA" handling — cumulative ACK of the last in-order seq on
    /// an out-of-order arrival).
    ///
    /// When `expSeqNum == 0` and an out-of-order packet arrives before
    /// anything has ever been received, this computes `expSeqNum - 1 mod
    /// space` unconditionally, per the spec's documented first-packet-loss
    /// behavior (§9): the ACK wraps to `space - 1` rather than signaling
    /// "nothing received yet" specially.
    pub fn handle_data(&mut self, seq: u16, payload: Bytes) -> u16 {
        if seq == self.exp_seq_num {
            let ack = seq;
            self.recv_buf[self.exp_seq_num as usize] = Some(payload);
            self.exp_seq_num = incr(self.exp_seq_num, self.space);
            ack
        } else {
            (self.exp_seq_num + self.space - 1) % self.space
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(n: u8) -> Bytes {
        Bytes::from(vec![n])
    }

    #[test]
    fn in_order_data_is_acked_with_its_own_seq() {
        let mut r = Receiver::new(8);
        assert_eq!(r.handle_data(0, payload(0)), 0);
        assert!(r.has_deliverable());
        assert_eq!(r.deliver(), Some(payload(0)));
        assert!(!r.has_deliverable());
    }

    #[test]
    fn out_of_order_data_is_dropped_and_cumulative_acked() {
        let mut r = Receiver::new(8);
        // seq 2 arrives before seq 0/1 -> not stored, ack = expSeqNum-1 mod space
        let ack = r.handle_data(2, payload(2));
        assert_eq!(ack, 7); // exp_seq_num(0) - 1 mod 8 = 7
        assert!(!r.has_deliverable());
    }

    #[test]
    fn sequence_of_in_order_packets_delivers_in_order() {
        let mut r = Receiver::new(8);
        for (seq, byte) in (0..4).enumerate() {
            let ack = r.handle_data(seq as u16, payload(byte));
            assert_eq!(ack, seq as u16);
        }
        for byte in 0..4u8 {
            assert_eq!(r.deliver(), Some(payload(byte)));
        }
        assert_eq!(r.deliver(), None);
    }
}
