//! Go-back-N sender state: a fixed-size send window, duplicate-ACK
//! fast retransmit, and timer-based whole-window retransmission (§4.3).

use bytes::Bytes;

use crate::error::{RdtError, Result};
use crate::seq::{diff, incr};
use crate::wire::MAX_WINDOW;

/// What an incoming ACK caused to happen (§4.3 "ACK" handling).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckEffect {
    /// The ACK advanced `sendBase`; the window is at least partially freed.
    Advanced,
    /// The third duplicate ACK for the same sequence arrived; the whole
    /// current window should be retransmitted.
    FastRetransmit,
    /// A duplicate ACK that didn't yet reach the fast-retransmit threshold,
    /// or an ACK that neither advances the base nor duplicates the last one.
    NoChange,
}

pub struct Sender {
    window: u16,
    space: u16,
    send_buf: Vec<Option<Bytes>>,
    send_base: u16,
    send_seq_num: u16,
    dup_acks: u8,
    retrans_flag: bool,
}

impl Sender {
    /// `window` must be `<= MAX_WINDOW` (§3); the sequence space is `2*window`.
    pub fn new(window: u16) -> Result<Self> {
        if window > MAX_WINDOW {
            return Err(RdtError::WindowTooLarge(window, MAX_WINDOW));
        }
        let space = window * 2;
        Ok(Sender {
            window,
            space,
            send_buf: vec![None; space as usize],
            send_base: 0,
            send_seq_num: 0,
            dup_acks: 0,
            retrans_flag: false,
        })
    }

    pub fn space(&self) -> u16 {
        self.space
    }

    /// True iff the send window is full — the next `enqueue` must wait.
    pub fn window_full(&self) -> bool {
        diff(self.send_seq_num, self.send_base, self.space) >= self.window
    }

    /// All unacked data has been drained (used for the quit-after-drain
    /// termination condition, §4.3).
    pub fn is_drained(&self) -> bool {
        self.send_seq_num == self.send_base
    }

    /// Reserve the next sequence number for `payload`, storing it in the
    /// send buffer for future retransmission. Caller must have checked
    /// `!window_full()` first.
    pub fn enqueue(&mut self, payload: Bytes) -> u16 {
        let seq = self.send_seq_num;
        self.send_buf[seq as usize] = Some(payload);
        self.send_seq_num = incr(self.send_seq_num, self.space);
        seq
    }

    /// Apply an incoming ACK for sequence `k` (§4.3 "ACK" handling).
    pub fn handle_ack(&mut self, k: u16) -> AckEffect {
        if diff(k, self.send_base, self.space) < diff(self.send_seq_num, self.send_base, self.space) {
            self.send_base = incr(k, self.space);
            self.dup_acks = 0;
            self.retrans_flag = false;
            AckEffect::Advanced
        } else if incr(k, self.space) == self.send_base {
            self.dup_acks += 1;
            if self.dup_acks >= 3 && !self.retrans_flag {
                self.retrans_flag = true;
                AckEffect::FastRetransmit
            } else {
                AckEffect::NoChange
            }
        } else {
            AckEffect::NoChange
        }
    }

    /// Every currently-unacked `(seq, payload)` pair, oldest first — used
    /// for both the timeout retransmission and the fast-retransmit path.
    pub fn window_contents(&self) -> Vec<(u16, Bytes)> {
        let mut out = Vec::new();
        let mut s = self.send_base;
        while s != self.send_seq_num {
            if let Some(payload) = &self.send_buf[s as usize] {
                out.push((s, payload.clone()));
            }
            s = incr(s, self.space);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(n: u8) -> Bytes {
        Bytes::from(vec![n])
    }

    #[test]
    fn window_fills_after_w_sends() {
        let mut s = Sender::new(4).unwrap();
        for i in 0..4 {
            assert!(!s.window_full());
            s.enqueue(payload(i));
        }
        assert!(s.window_full());
    }

    #[test]
    fn ack_advancing_base_resets_dup_count() {
        let mut s = Sender::new(4).unwrap();
        for i in 0..4 {
            s.enqueue(payload(i));
        }
        assert_eq!(s.handle_ack(1), AckEffect::Advanced);
        assert!(!s.window_full()); // base moved from 0 to 2, 2 slots free
    }

    #[test]
    fn triple_duplicate_ack_triggers_fast_retransmit_once() {
        let mut s = Sender::new(4).unwrap(); // space = 8
        for i in 0..4 {
            s.enqueue(payload(i));
        }
        // base is 0, so a dup-ack for seq 7 (== space-1) means "incr(k)==base"
        assert_eq!(s.handle_ack(7), AckEffect::NoChange);
        assert_eq!(s.handle_ack(7), AckEffect::NoChange);
        assert_eq!(s.handle_ack(7), AckEffect::FastRetransmit);
        // a fourth duplicate does not re-trigger until the base advances
        assert_eq!(s.handle_ack(7), AckEffect::NoChange);
    }

    #[test]
    fn window_contents_lists_unacked_in_order() {
        let mut s = Sender::new(4).unwrap();
        for i in 0..3 {
            s.enqueue(payload(i));
        }
        let contents = s.window_contents();
        assert_eq!(contents.iter().map(|(seq, _)| *seq).collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn is_drained_tracks_base_equals_seqnum() {
        let mut s = Sender::new(4).unwrap();
        assert!(s.is_drained());
        s.enqueue(payload(0));
        assert!(!s.is_drained());
        s.handle_ack(0);
        assert!(s.is_drained());
    }
}
