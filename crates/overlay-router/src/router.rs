//! The Router main loop (§4.2): hello/keepalive, path-vector
//! advertisement, and failure advertisement, layered on top of the
//! Forwarder's queues.

use std::sync::Arc;
use std::time::{Duration, Instant};

use overlay_common::{Prefix, Packet};
use overlay_forwarder::{Forwarder, IDLE_SLEEP};
use tracing::{debug, info, trace};

use crate::link::LinkState;
use crate::route::{Route, RouteTable};
use crate::wire::{self, RouterMessage};

/// TTL stamped on control-plane packets. Hello/advert traffic never
/// travels more than one hop before being consumed, but a generous value
/// keeps it from being silently dropped by an intermediate misconfigured
/// node.
const CONTROL_TTL: u8 = 64;

const HELLO_INTERVAL: f64 = 1.0;
const ADVERT_INTERVAL: f64 = 10.0;

pub struct Router {
    my_ip: u32,
    prefix: Prefix,
    links: Vec<LinkState>,
    route_table: RouteTable,
    forwarder: Arc<Forwarder>,
    debug: u8,
    failure_advert: bool,
    hello_time: f64,
    pv_send_time: f64,
    start: Instant,
}

impl Router {
    pub fn new(
        my_ip: u32,
        prefix: Prefix,
        peer_ips: Vec<u32>,
        forwarder: Arc<Forwarder>,
        debug: u8,
        failure_advert: bool,
    ) -> Self {
        let links = peer_ips.into_iter().map(LinkState::new).collect();
        Router {
            my_ip,
            prefix,
            links,
            route_table: RouteTable::new(),
            forwarder,
            debug,
            failure_advert,
            hello_time: 0.0,
            pv_send_time: 0.0,
            start: Instant::now(),
        }
    }

    pub fn route_table(&self) -> &RouteTable {
        &self.route_table
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    pub fn link_cost(&self, link: usize) -> f64 {
        self.links[link].cost()
    }

    pub fn link_is_up(&self, link: usize) -> bool {
        self.links[link].is_up()
    }

    fn now(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    /// One tick of the priority-ordered main loop (§4.2). Returns `true`
    /// if any work was done.
    pub fn run_once(&mut self) -> bool {
        let now = self.now();
        self.tick(now)
    }

    /// Run until `quit` reports true, sleeping ~1ms when idle.
    pub fn run(&mut self, quit: impl Fn() -> bool) {
        while !quit() {
            if !self.run_once() {
                std::thread::sleep(IDLE_SLEEP);
            }
        }
    }

    /// The tick logic with an explicit clock, so tests can drive it
    /// without waiting on real time.
    pub(crate) fn tick(&mut self, now: f64) -> bool {
        if now >= self.hello_time + HELLO_INTERVAL {
            self.send_hellos(now);
            self.hello_time = now;
            true
        } else if now >= self.pv_send_time + ADVERT_INTERVAL {
            self.send_adverts(now);
            self.pv_send_time = now;
            true
        } else if self.forwarder.incoming_pkt() {
            self.handle_incoming(now);
            true
        } else {
            false
        }
    }

    fn send_hellos(&mut self, now: f64) {
        for i in 0..self.links.len() {
            let just_died = self.links[i].tick_liveness();
            if just_died {
                let peer_ip = self.links[i].peer_ip;
                info!(link = i, peer_ip, "link down, three hellos missed");
                self.route_table.invalidate_via_peer(peer_ip);
                if self.debug >= 2 {
                    self.log_route_table();
                }
                if self.failure_advert {
                    self.send_failure_advert(i, now);
                }
            }
            let payload = wire::format_hello(now);
            let peer_ip = self.links[i].peer_ip;
            self.forwarder.send_pkt(
                Packet::new_router(self.my_ip, peer_ip, CONTROL_TTL, payload),
                i,
            );
        }
    }

    fn send_adverts(&self, now: f64) {
        for (i, link) in self.links.iter().enumerate() {
            let payload = wire::format_advert(self.prefix, now, 0.0, &[self.my_ip]);
            self.forwarder.send_pkt(
                Packet::new_router(self.my_ip, link.peer_ip, CONTROL_TTL, payload),
                i,
            );
        }
    }

    fn handle_incoming(&mut self, now: f64) {
        let Some((packet, link)) = self.forwarder.receive_pkt() else {
            return;
        };
        self.handle_packet(packet, link, now);
    }

    #[cfg(test)]
    pub(crate) fn handle_incoming_for_test(&mut self, packet: Packet, link: usize, now: f64) {
        self.handle_packet(packet, link, now);
    }

    fn handle_packet(&mut self, packet: Packet, link: usize, now: f64) {
        match wire::parse(&packet.payload) {
            Ok(RouterMessage::Hello { timestamp }) => {
                let reply = wire::format_hello2u(timestamp);
                self.forwarder.send_pkt(
                    Packet::new_router(self.my_ip, packet.src_adr, CONTROL_TTL, reply),
                    link,
                );
            }
            Ok(RouterMessage::Hello2u { timestamp }) => {
                if let Some(ls) = self.links.get_mut(link) {
                    ls.record_rtt(now - timestamp);
                }
            }
            Ok(RouterMessage::Advert {
                prefix,
                timestamp,
                cost,
                path,
            }) => self.handle_advert(link, prefix, timestamp, cost, path),
            Ok(RouterMessage::FAdvert {
                ip_a,
                ip_b,
                timestamp,
                path,
            }) => self.handle_fadvert(link, ip_a, ip_b, timestamp, path),
            Err(e) => {
                trace!(error = %e, link, "dropping malformed router control packet");
            }
        }
    }

    fn handle_advert(&mut self, link: usize, prefix: Prefix, timestamp: f64, cost: f64, path: Vec<u32>) {
        if path.contains(&self.my_ip) {
            return; // loop prevention
        }
        let Some(link_state) = self.links.get(link) else {
            return;
        };
        let candidate = Route {
            prefix,
            timestamp,
            cost: cost + link_state.cost(),
            path: path.clone(),
            out_link: link,
            valid: true,
        };
        let candidate_cost = candidate.cost;
        let outcome = {
            let links = &self.links;
            self.route_table
                .update_route(candidate, |l| links.get(l).map(|ls| ls.is_up()).unwrap_or(false))
        };
        let Some(outcome) = outcome else { return };

        // §9: `addRoute` fires on every accepted update, not only when the
        // out-link actually changed — the Java original calls it redundantly
        // whenever any branch of `updateRoute` returns non-null, and we keep
        // that rather than gate it on `link_changed`.
        self.forwarder.table().add_route(prefix, link);
        if outcome.path_changed && self.debug > 0 {
            self.log_route_table();
        }

        let mut onward_path = vec![self.my_ip];
        onward_path.extend(path);
        let payload = wire::format_advert(prefix, timestamp, candidate_cost, &onward_path);
        for i in 0..self.links.len() {
            if i == link || !self.links[i].is_up() {
                continue;
            }
            let peer_ip = self.links[i].peer_ip;
            self.forwarder.send_pkt(
                Packet::new_router(self.my_ip, peer_ip, CONTROL_TTL, payload.clone()),
                i,
            );
        }
    }

    fn handle_fadvert(&mut self, link: usize, ip_a: u32, ip_b: u32, timestamp: f64, path: Vec<u32>) {
        if path.contains(&self.my_ip) {
            return;
        }
        let changed = self.route_table.invalidate_via_link_failure(ip_a, ip_b, timestamp);
        if !changed {
            return;
        }
        let mut onward_path = vec![self.my_ip];
        onward_path.extend(path);
        let payload = wire::format_fadvert(ip_a, ip_b, timestamp, &onward_path);
        for i in 0..self.links.len() {
            if i == link || !self.links[i].is_up() {
                continue;
            }
            let peer_ip = self.links[i].peer_ip;
            self.forwarder.send_pkt(
                Packet::new_router(self.my_ip, peer_ip, CONTROL_TTL, payload.clone()),
                i,
            );
        }
    }

    fn send_failure_advert(&self, dead_link: usize, now: f64) {
        let peer_ip = self.links[dead_link].peer_ip;
        let payload = wire::format_fadvert(self.my_ip, peer_ip, now, &[self.my_ip]);
        for i in 0..self.links.len() {
            if i == dead_link || !self.links[i].is_up() {
                continue;
            }
            let dest = self.links[i].peer_ip;
            self.forwarder.send_pkt(
                Packet::new_router(self.my_ip, dest, CONTROL_TTL, payload.clone()),
                i,
            );
        }
    }

    fn log_route_table(&self) {
        debug!(routes = self.route_table.iter().count(), "routing table changed");
        for r in self.route_table.iter() {
            debug!(prefix = %r.prefix, cost = r.cost, out_link = r.out_link, valid = r.valid, "route");
        }
    }
}

/// Pending hello-retry wakeup granularity, exposed for binaries that want
/// to align their own idle sleep with the router's.
pub const TICK_GRANULARITY: Duration = IDLE_SLEEP;

#[cfg(test)]
mod tests {
    use super::*;
    use overlay_common::substrate::MockLinkSubstrate;
    use overlay_forwarder::ForwardingTable;
    use overlay_common::Packet as RawPacket;

    fn parse(s: &str) -> u32 {
        overlay_common::parse_ip(s).unwrap()
    }

    fn make_router(my_ip: &str, peers: &[&str]) -> (Router, Arc<MockLinkSubstrate>, Arc<Forwarder>) {
        let n = peers.len();
        let sub = Arc::new(MockLinkSubstrate::new(n));
        let table = Arc::new(ForwardingTable::new(0));
        let fwd = Arc::new(Forwarder::new(parse(my_ip), table, sub.clone() as Arc<dyn overlay_common::substrate::LinkSubstrate>));
        let peer_ips: Vec<u32> = peers.iter().map(|p| parse(p)).collect();
        let prefix = Prefix::default_route();
        let router = Router::new(parse(my_ip), prefix, peer_ips, fwd.clone(), 0, false);
        (router, sub, fwd)
    }

    #[test]
    fn first_tick_sends_hellos_on_every_link() {
        let (mut router, _sub, fwd) = make_router("10.0.0.1", &["10.0.0.2", "10.0.0.3"]);
        assert!(router.tick(1.0));
        assert!(fwd.ready_for_pkt()); // queue still has room
        let (pkt, link) = fwd.receive_pkt().unwrap();
        assert_eq!(link, 0);
        assert!(pkt.payload.contains("type: hello"));
        let (_pkt2, link2) = fwd.receive_pkt().unwrap();
        assert_eq!(link2, 1);
    }

    #[test]
    fn hello_is_echoed_with_hello2u() {
        let (mut router, _sub, _fwd) = make_router("10.0.0.1", &["10.0.0.2"]);
        let hello = RawPacket::new_router(parse("10.0.0.2"), parse("10.0.0.1"), 64, wire::format_hello(1.0));
        router.handle_incoming_for_test(hello, 0, 1.0);

        let (reply, link) = router.forwarder.receive_pkt().unwrap();
        assert_eq!(link, 0);
        match wire::parse(&reply.payload).unwrap() {
            wire::RouterMessage::Hello2u { timestamp } => assert_eq!(timestamp, 1.0),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn hello2u_updates_cost_and_resets_liveness() {
        let (mut router, _sub, _fwd) = make_router("10.0.0.1", &["10.0.0.2"]);
        router.links[0].tick_liveness();
        router.links[0].tick_liveness(); // hello_state down to 1

        let reply = RawPacket::new_router(parse("10.0.0.2"), parse("10.0.0.1"), 64, wire::format_hello2u(1.0));
        router.handle_incoming_for_test(reply, 0, 1.040);

        assert_eq!(router.links[0].hello_state, 3);
        assert!(router.link_is_up(0));
        assert!(router.link_cost(0) > 0.0);
    }

    #[test]
    fn three_missed_hellos_invalidates_routes_through_that_peer() {
        let (mut router, _sub, _fwd) = make_router("10.0.0.1", &["10.0.0.2"]);
        let prefix = Prefix::parse("10.1.0.0/16").unwrap();
        router.route_table.update_route(
            Route {
                prefix,
                timestamp: 0.0,
                cost: 0.01,
                path: vec![parse("10.0.0.2")],
                out_link: 0,
                valid: true,
            },
            |_| true,
        );

        router.tick(1.0);
        router.tick(2.0);
        router.tick(3.0);

        assert!(!router.route_table.get(&prefix).unwrap().valid);
        assert!(!router.link_is_up(0));
    }

    #[test]
    fn advert_with_my_ip_in_path_is_loop_dropped() {
        let (mut router, _sub, _fwd) = make_router("10.0.0.1", &["10.0.0.2"]);
        let prefix = Prefix::parse("10.1.0.0/16").unwrap();
        let payload = wire::format_advert(prefix, 1.0, 0.02, &[parse("10.0.0.1")]);
        let pkt = RawPacket::new_router(parse("10.0.0.2"), parse("10.0.0.1"), 64, payload);

        router.handle_incoming_for_test(pkt, 0, 1.0);
        assert!(router.route_table.get(&prefix).is_none());
    }

    #[test]
    fn accepted_advert_updates_forwarding_table_and_reannounces() {
        let (mut router, _sub, fwd) = make_router("10.0.0.1", &["10.0.0.2", "10.0.0.3"]);
        let prefix = Prefix::parse("10.1.0.0/16").unwrap();
        let payload = wire::format_advert(prefix, 1.0, 0.02, &[parse("10.0.0.2")]);
        let pkt = RawPacket::new_router(parse("10.0.0.2"), parse("10.0.0.1"), 64, payload);

        router.handle_incoming_for_test(pkt, 0, 1.0);

        let route = router.route_table.get(&prefix).unwrap();
        assert_eq!(route.out_link, 0);
        assert_eq!(route.path, vec![parse("10.0.0.2")]);

        assert_eq!(fwd.table().lookup(parse("10.1.2.3")), 0);

        // re-advertised on link 1 (the other live link), not back on link 0
        let (repkt, relink) = fwd.receive_pkt().unwrap();
        assert_eq!(relink, 1);
        assert!(repkt.payload.contains("type: advert"));
    }
}
