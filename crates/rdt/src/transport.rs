//! The RDT main loop (§4.3): a single-threaded polled transport that
//! moves payloads between the local application and a `PointSubstrate`,
//! go-back-N style.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use overlay_common::substrate::PointSubstrate;
use overlay_common::BoundedQueue;
use tracing::{trace, warn};

use crate::error::Result;
use crate::receiver::Receiver;
use crate::sender::{AckEffect, Sender};
use crate::wire::RdtPacket;

/// Capacity of the application-facing queues.
pub const QUEUE_CAPACITY: usize = 1000;

/// Idle sleep between polling iterations when there's nothing to do.
pub const IDLE_SLEEP: Duration = Duration::from_millis(1);

pub struct Rdt {
    sender: Sender,
    receiver: Receiver,
    substrate: Arc<dyn PointSubstrate>,
    timeout: Duration,
    send_again: Option<Instant>,

    source_out: BoundedQueue<Bytes>,
    sink_in: BoundedQueue<Bytes>,
}

impl Rdt {
    pub fn new(window: u16, timeout: Duration, substrate: Arc<dyn PointSubstrate>) -> Result<Self> {
        let sender = Sender::new(window)?;
        let space = sender.space();
        Ok(Rdt {
            sender,
            receiver: Receiver::new(space),
            substrate,
            timeout,
            send_again: None,
            source_out: BoundedQueue::new(QUEUE_CAPACITY),
            sink_in: BoundedQueue::new(QUEUE_CAPACITY),
        })
    }

    // ─── Application-facing API ──────────────────────────────────────────

    pub fn send(&self, payload: impl Into<Bytes>) {
        self.source_out.put(payload.into());
    }

    pub fn ready(&self) -> bool {
        self.source_out.has_room()
    }

    pub fn receive(&self) -> Option<Bytes> {
        self.sink_in.poll()
    }

    pub fn incoming(&self) -> bool {
        self.sink_in.has_pending()
    }

    /// True once nothing further will ever be delivered or sent: the
    /// termination condition in §4.3 is `quit && sendSeqNum == sendBase`.
    pub fn drained(&self) -> bool {
        self.sender.is_drained() && !self.source_out.has_pending()
    }

    // ─── Main loop ───────────────────────────────────────────────────────

    pub fn run_once(&mut self) -> bool {
        let now = Instant::now();
        self.tick(now)
    }

    pub fn run(&mut self, quit: impl Fn() -> bool) {
        loop {
            let should_stop = quit() && self.drained();
            if should_stop {
                return;
            }
            if !self.run_once() {
                std::thread::sleep(IDLE_SLEEP);
            }
        }
    }

    fn tick(&mut self, now: Instant) -> bool {
        if self.receiver.has_deliverable() {
            if let Some(payload) = self.receiver.deliver() {
                self.sink_in.put(payload);
            }
            return true;
        }
        if self.substrate.incoming() {
            self.handle_inbound(now);
            return true;
        }
        if let Some(deadline) = self.send_again {
            if now >= deadline {
                self.retransmit_window();
                self.send_again = Some(now + self.timeout);
                return true;
            }
        }
        if !self.sender.window_full() && self.substrate.ready() {
            if let Some(payload) = self.source_out.poll() {
                let seq = self.sender.enqueue(payload.clone());
                self.send_pkt(RdtPacket::Data { seq, payload });
                return true;
            }
        }
        false
    }

    fn handle_inbound(&mut self, now: Instant) {
        let Some(bytes) = self.substrate.receive() else {
            return;
        };
        match RdtPacket::decode(&bytes) {
            Ok(RdtPacket::Data { seq, payload }) => {
                let ack_seq = self.receiver.handle_data(seq, payload);
                self.send_pkt(RdtPacket::Ack { seq: ack_seq });
            }
            Ok(RdtPacket::Ack { seq }) => match self.sender.handle_ack(seq) {
                AckEffect::FastRetransmit => {
                    trace!(seq, "triple duplicate ack, fast retransmitting window");
                    self.retransmit_window();
                }
                AckEffect::Advanced | AckEffect::NoChange => {}
            },
            Err(e) => {
                warn!(error = %e, "dropping malformed rdt packet");
            }
        }
        self.send_again = Some(now + self.timeout);
    }

    fn retransmit_window(&mut self) {
        for (seq, payload) in self.sender.window_contents() {
            self.send_pkt(RdtPacket::Data { seq, payload });
        }
    }

    fn send_pkt(&self, packet: RdtPacket) {
        if let Err(e) = self.substrate.send(&packet.encode()) {
            warn!(error = %e, "substrate send failed, dropping");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use overlay_common::substrate::MockPointSubstrate;

    fn make(window: u16) -> (Rdt, Arc<MockPointSubstrate>) {
        let sub = Arc::new(MockPointSubstrate::new());
        let rdt = Rdt::new(window, Duration::from_secs(1), sub.clone()).unwrap();
        (rdt, sub)
    }

    #[test]
    fn sends_data_and_stores_in_window() {
        let (mut rdt, sub) = make(4);
        rdt.send(Bytes::from_static(b"A"));
        assert!(rdt.tick(Instant::now()));
        let sent = sub.drain_sent();
        assert_eq!(sent.len(), 1);
        match RdtPacket::decode(&sent[0]).unwrap() {
            RdtPacket::Data { seq, payload } => {
                assert_eq!(seq, 0);
                assert_eq!(payload, Bytes::from_static(b"A"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn inbound_data_is_delivered_in_order_and_acked() {
        let (mut rdt, sub) = make(4);
        sub.inject(RdtPacket::Data { seq: 0, payload: Bytes::from_static(b"A") }.encode().to_vec());
        assert!(rdt.tick(Instant::now())); // processes inbound, sends ack
        assert!(rdt.tick(Instant::now())); // delivers to sink
        assert_eq!(rdt.receive(), Some(Bytes::from_static(b"A")));

        let sent = sub.drain_sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(RdtPacket::decode(&sent[0]).unwrap(), RdtPacket::Ack { seq: 0 });
    }

    #[test]
    fn triple_dup_ack_fast_retransmits_whole_window() {
        // §8 scenario 2: W=4, substrate drops only the ack for seq 0.
        let (mut rdt, sub) = make(4);
        for byte in b"ABCD" {
            rdt.send(Bytes::from(vec![*byte]));
        }
        for _ in 0..4 {
            assert!(rdt.tick(Instant::now()));
        }
        sub.drain_sent(); // discard the initial 4 DATA sends

        // Receiver acks 1,2,3 normally; ack for 0 is dropped by the substrate,
        // so the sender sees three duplicate acks for seq 2W-1=7.
        for _ in 0..3 {
            sub.inject(RdtPacket::Ack { seq: 7 }.encode().to_vec());
            assert!(rdt.tick(Instant::now()));
        }
        let retransmitted = sub.drain_sent();
        assert_eq!(retransmitted.len(), 4);
        for (i, bytes) in retransmitted.iter().enumerate() {
            match RdtPacket::decode(bytes).unwrap() {
                RdtPacket::Data { seq, .. } => assert_eq!(seq, i as u16),
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn window_full_blocks_further_sends() {
        let (mut rdt, sub) = make(2);
        for byte in b"AB" {
            rdt.send(Bytes::from(vec![*byte]));
        }
        assert!(rdt.tick(Instant::now()));
        assert!(rdt.tick(Instant::now()));
        sub.drain_sent();
        rdt.send(Bytes::from_static(b"C"));
        // window is full (2 unacked of capacity 2) so this tick does nothing
        assert!(!rdt.tick(Instant::now()));
        assert!(sub.drain_sent().is_empty());
    }
}
