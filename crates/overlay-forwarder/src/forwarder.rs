//! The Forwarder main loop (§4.1): moves packets between the substrate,
//! the local source/sink, and the local Router.

use std::sync::Arc;
use std::time::Duration;

use overlay_common::substrate::LinkSubstrate;
use overlay_common::{BoundedQueue, Packet, Protocol};
use tracing::{debug, trace, warn};

use crate::table::ForwardingTable;

/// Capacity of each inter-thread queue (§5).
pub const QUEUE_CAPACITY: usize = 1000;

/// Idle sleep between polling iterations when there's nothing to do (§4.1).
pub const IDLE_SLEEP: Duration = Duration::from_millis(1);

/// A payload delivered to (or submitted by) the local application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub payload: String,
    pub peer_adr: u32,
}

/// A router-control packet together with the link it arrived on / should
/// be sent on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedPacket {
    pub packet: Packet,
    pub link: usize,
}

/// The Forwarder: owns the forwarding table and the four queues that
/// connect it to the local source/sink and the local Router.
pub struct Forwarder {
    my_ip: u32,
    table: Arc<ForwardingTable>,
    substrate: Arc<dyn LinkSubstrate>,

    /// Router -> Forwarder: packets the router wants sent out a link.
    router_out: BoundedQueue<LinkedPacket>,
    /// Forwarder -> Router: protocol=2 packets addressed to us.
    router_in: BoundedQueue<LinkedPacket>,
    /// Source -> Forwarder: payloads to send.
    source_out: BoundedQueue<Delivery>,
    /// Forwarder -> Sink: payloads delivered to us.
    sink_in: BoundedQueue<Delivery>,
}

impl Forwarder {
    pub fn new(my_ip: u32, table: Arc<ForwardingTable>, substrate: Arc<dyn LinkSubstrate>) -> Self {
        Forwarder {
            my_ip,
            table,
            substrate,
            router_out: BoundedQueue::new(QUEUE_CAPACITY),
            router_in: BoundedQueue::new(QUEUE_CAPACITY),
            source_out: BoundedQueue::new(QUEUE_CAPACITY),
            sink_in: BoundedQueue::new(QUEUE_CAPACITY),
        }
    }

    pub fn table(&self) -> Arc<ForwardingTable> {
        self.table.clone()
    }

    // ─── Source/sink-facing API ─────────────────────────────────────────

    /// Enqueue a new DATA packet for `dest_adr`. Blocks if the outgoing
    /// queue is full.
    pub fn send(&self, payload: impl Into<String>, dest_adr: u32) {
        self.source_out.put(Delivery {
            payload: payload.into(),
            peer_adr: dest_adr,
        });
    }

    /// Nonblocking: true iff the outgoing queue has room.
    pub fn ready(&self) -> bool {
        self.source_out.has_room()
    }

    /// Dequeue the next delivered payload, or `None` if none is ready yet
    /// (callers that want the blocking spec behavior should poll this in
    /// a loop; kept nonblocking here so it composes with any runtime).
    pub fn receive(&self) -> Option<(String, u32)> {
        self.sink_in.poll().map(|d| (d.payload, d.peer_adr))
    }

    pub fn incoming(&self) -> bool {
        self.sink_in.has_pending()
    }

    // ─── Router-facing API ──────────────────────────────────────────────

    pub fn send_pkt(&self, packet: Packet, link: usize) {
        self.router_out.put(LinkedPacket { packet, link });
    }

    pub fn ready_for_pkt(&self) -> bool {
        self.router_out.has_room()
    }

    pub fn receive_pkt(&self) -> Option<(Packet, usize)> {
        self.router_in.poll().map(|lp| (lp.packet, lp.link))
    }

    pub fn incoming_pkt(&self) -> bool {
        self.router_in.has_pending()
    }

    // ─── Main loop ───────────────────────────────────────────────────────

    /// Run one iteration of the priority-ordered dispatch loop (§4.1).
    /// Returns `true` if any work was done (so callers can skip the idle
    /// sleep on a busy loop).
    pub fn run_once(&self) -> bool {
        if self.substrate.incoming() {
            self.handle_inbound();
            return true;
        }
        if let Some(lp) = self.router_out.poll() {
            self.dispatch_outbound(lp.packet, lp.link as i64);
            return true;
        }
        if let Some(d) = self.source_out.poll() {
            let link = self.table.lookup(d.peer_adr);
            let packet = Packet::new_data(self.my_ip, d.peer_adr, d.payload);
            self.dispatch_outbound(packet, link);
            return true;
        }
        false
    }

    /// Run the loop until `quit` reports true, sleeping ~1ms when idle.
    pub fn run(&self, quit: impl Fn() -> bool) {
        while !quit() {
            if !self.run_once() {
                std::thread::sleep(IDLE_SLEEP);
            }
        }
    }

    fn handle_inbound(&self) {
        let Some((bytes, link)) = self.substrate.receive() else {
            return;
        };
        let mut packet = match Packet::decode(&bytes) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, link, "dropping malformed inbound packet");
                return;
            }
        };

        if packet.dest_adr == self.my_ip {
            match packet.protocol {
                Protocol::Data => {
                    self.sink_in.put(Delivery {
                        payload: packet.payload,
                        peer_adr: packet.src_adr,
                    });
                }
                Protocol::Router => {
                    self.router_in.put(LinkedPacket { packet, link });
                }
            }
            return;
        }

        if packet.decrement_ttl().is_none() {
            warn!(src = packet.src_adr, dest = packet.dest_adr, "ttl exhausted, dropping");
            return;
        }

        let out_link = self.table.lookup(packet.dest_adr);
        if out_link < 0 {
            warn!(dest = packet.dest_adr, "no forwarding entry, dropping");
            return;
        }
        let out_link = out_link as usize;
        if self.substrate.ready(out_link) {
            self.send_to_substrate(&packet, out_link);
        } else {
            trace!(link = out_link, "substrate not ready, dropping this tick");
        }
    }

    /// Send `packet` out `link`, where `link < 0` means "no route" (the
    /// Forwarder's `lookup` return convention, §4.1).
    fn dispatch_outbound(&self, packet: Packet, link: i64) {
        if link < 0 {
            warn!(dest = packet.dest_adr, "no route for outgoing payload, dropping");
            return;
        }
        let link = link as usize;
        if self.substrate.ready(link) {
            self.send_to_substrate(&packet, link);
        } else {
            debug!(link, "substrate not ready for outbound packet this tick");
        }
    }

    fn send_to_substrate(&self, packet: &Packet, link: usize) {
        let bytes = packet.encode();
        if let Err(e) = self.substrate.send(&bytes, link) {
            warn!(error = %e, link, "substrate send failed, dropping");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use overlay_common::substrate::MockLinkSubstrate;
    use overlay_common::Prefix;

    fn parse(s: &str) -> u32 {
        overlay_common::parse_ip(s).unwrap()
    }

    fn make(links: usize, my_ip: &str) -> (Forwarder, Arc<MockLinkSubstrate>, Arc<ForwardingTable>) {
        let sub = Arc::new(MockLinkSubstrate::new(links));
        let table = Arc::new(ForwardingTable::new(0));
        let fwd = Forwarder::new(parse(my_ip), table.clone(), sub.clone());
        (fwd, sub, table)
    }

    #[test]
    fn scenario_forwards_with_decremented_ttl() {
        // §8 end-to-end scenario 1.
        let (fwd, sub, table) = make(3, "10.9.0.1");
        table.add_route(Prefix::parse("10.1.0.0/16").unwrap(), 2);

        let pkt = Packet::new_router(parse("10.9.0.2"), parse("10.1.2.3"), 5, "x");
        sub.inject(0, pkt.encode().to_vec());

        assert!(fwd.run_once());

        let sent = sub.drain_sent();
        assert_eq!(sent.len(), 1);
        let (data, link) = &sent[0];
        assert_eq!(*link, 2);
        let decoded = Packet::decode(data).unwrap();
        assert_eq!(decoded.ttl, 4);
    }

    #[test]
    fn delivers_data_addressed_to_self() {
        let (fwd, sub, _table) = make(1, "10.9.0.1");
        let pkt = Packet::new_data(parse("10.9.0.2"), parse("10.9.0.1"), "hello");
        sub.inject(0, pkt.encode().to_vec());

        assert!(fwd.run_once());
        assert!(fwd.incoming());
        let (payload, src) = fwd.receive().unwrap();
        assert_eq!(payload, "hello");
        assert_eq!(src, parse("10.9.0.2"));
    }

    #[test]
    fn delivers_router_packet_to_router_inbox() {
        let (fwd, sub, _table) = make(2, "10.9.0.1");
        let pkt = Packet::new_router(parse("10.9.0.2"), parse("10.9.0.1"), 10, "RPv0\n");
        sub.inject(1, pkt.encode().to_vec());

        assert!(fwd.run_once());
        assert!(fwd.incoming_pkt());
        let (received, link) = fwd.receive_pkt().unwrap();
        assert_eq!(received.payload, "RPv0\n");
        assert_eq!(link, 1);
    }

    #[test]
    fn ttl_exhaustion_drops_without_forwarding() {
        let (fwd, sub, table) = make(2, "10.9.0.1");
        table.add_route(Prefix::parse("10.1.0.0/16").unwrap(), 1);
        let pkt = Packet::new_router(parse("10.9.0.2"), parse("10.1.0.5"), 0, "x");
        sub.inject(0, pkt.encode().to_vec());

        assert!(fwd.run_once());
        assert!(sub.drain_sent().is_empty());
    }

    #[test]
    fn ttl_of_one_drops_at_this_hop_instead_of_one_hop_later() {
        let (fwd, sub, table) = make(2, "10.9.0.1");
        table.add_route(Prefix::parse("10.1.0.0/16").unwrap(), 1);
        // ttl=1 means this is the packet's last legal hop: it must be
        // dropped here, not stamped with ttl=0 and forwarded once more.
        let pkt = Packet::new_router(parse("10.9.0.2"), parse("10.1.0.5"), 1, "x");
        sub.inject(0, pkt.encode().to_vec());

        assert!(fwd.run_once());
        assert!(sub.drain_sent().is_empty());
    }

    #[test]
    fn router_outbox_is_serviced_before_source_outbox() {
        let (fwd, sub, table) = make(2, "10.9.0.1");
        table.add_route(Prefix::default_route(), 0);

        fwd.send("payload", parse("10.1.0.5"));
        fwd.send_pkt(
            Packet::new_router(parse("10.9.0.1"), parse("10.1.0.9"), 10, "ctl"),
            1,
        );

        assert!(fwd.run_once()); // should service router_out first
        let sent = sub.drain_sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, 1);
        let decoded = Packet::decode(&sent[0].0).unwrap();
        assert_eq!(decoded.payload, "ctl");
    }

    #[test]
    fn no_route_drops_source_payload() {
        let (fwd, sub, _table) = make(1, "10.9.0.1");
        // Only default route exists, pointing at link 0, which we mark unready.
        sub.set_ready(0, false);
        fwd.send("hi", parse("8.8.8.8"));
        assert!(fwd.run_once());
        assert!(sub.drain_sent().is_empty());
    }
}
