//! The DHT node (§4.4): ring membership (join/leave), key storage with
//! an optional cache, shortcut-learning routing table, and forwarding.

use std::collections::HashMap;
use std::net::SocketAddrV4;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, trace, warn};

use crate::hash::hashit;
use crate::node_info::NodeInfo;
use crate::route::RouteTable;
use crate::substrate::AddressedSubstrate;
use crate::wire::{DhtPacket, PacketKind};

/// TTL given to freshly originated packets (§6: decremented per hop, drops at <= 0).
const DEFAULT_TTL: i32 = 32;

/// Idle sleep between polling iterations when there's nothing to do.
pub const IDLE_SLEEP: Duration = Duration::from_millis(1);

/// The full span of the ring, `[0, 2^31)`.
pub const RING_SIZE: u32 = 1 << 31;

pub struct DhtNode {
    my_info: NodeInfo,
    pred_info: Option<NodeInfo>,
    succ_info: Option<NodeInfo>,
    hash_range: (u32, u32),
    map: HashMap<String, String>,
    cache: Option<HashMap<String, String>>,
    route_table: RouteTable,
    stop_flag: bool,
    send_tag: u64,
    substrate: Arc<dyn AddressedSubstrate>,
    debug: u8,
}

impl DhtNode {
    /// Construct a node that owns the whole ring (the bootstrap case: the
    /// first node, with no predecessor to join through). Its successor
    /// and predecessor are itself until another node joins.
    pub fn bootstrap(
        addr: SocketAddrV4,
        num_routes: usize,
        cache_enabled: bool,
        debug: u8,
        substrate: Arc<dyn AddressedSubstrate>,
    ) -> Self {
        let my_info = NodeInfo::new(addr, 0);
        DhtNode {
            my_info,
            pred_info: Some(my_info),
            succ_info: Some(my_info),
            hash_range: (0, RING_SIZE - 1),
            map: HashMap::new(),
            cache: cache_enabled.then(HashMap::new),
            route_table: RouteTable::new(num_routes),
            stop_flag: false,
            send_tag: 0,
            substrate,
            debug,
        }
    }

    pub fn my_info(&self) -> NodeInfo {
        self.my_info
    }

    pub fn hash_range(&self) -> (u32, u32) {
        self.hash_range
    }

    pub fn succ_info(&self) -> Option<NodeInfo> {
        self.succ_info
    }

    pub fn pred_info(&self) -> Option<NodeInfo> {
        self.pred_info
    }

    pub fn route_table(&self) -> &RouteTable {
        &self.route_table
    }

    pub fn map_len(&self) -> usize {
        self.map.len()
    }

    fn next_tag(&mut self) -> u64 {
        self.send_tag += 1;
        self.send_tag
    }

    fn in_range(&self, h: u32) -> bool {
        let (left, right) = self.hash_range;
        h >= left && h <= right
    }

    fn send_pkt(&self, pkt: &DhtPacket, to: SocketAddrV4) {
        if let Err(e) = self.substrate.send(pkt.encode().as_bytes(), to) {
            warn!(error = %e, %to, "dht substrate send failed, dropping");
        }
    }

    // ─── Ring membership ─────────────────────────────────────────────────

    /// Join the ring through `pred` (§4.4 `join`). Blocks until the
    /// success reply arrives — this only ever runs once, at startup,
    /// before the node's main loop begins.
    pub fn join(&mut self, pred: SocketAddrV4) {
        let tag = self.next_tag();
        let mut pkt = DhtPacket::empty(PacketKind::Join, tag);
        pkt.ttl = Some(DEFAULT_TTL);
        pkt.sender_info = Some(self.my_info);
        self.send_pkt(&pkt, pred);
        info!(%pred, "dht join request sent, waiting for success");

        loop {
            if let Some((bytes, _from)) = self.substrate.receive() {
                let Ok(text) = std::str::from_utf8(&bytes) else {
                    continue;
                };
                match DhtPacket::parse(text) {
                    Ok(reply) if reply.tag == tag && reply.hash_range.is_some() => {
                        self.apply_join_success(reply);
                        return;
                    }
                    _ => continue,
                }
            }
            std::thread::sleep(IDLE_SLEEP);
        }
    }

    fn apply_join_success(&mut self, reply: DhtPacket) {
        let hash_range = reply.hash_range.expect("checked by caller");
        self.hash_range = hash_range;
        self.my_info.first_hash = hash_range.0;
        self.succ_info = reply.succ_info;
        self.pred_info = reply.pred_info;
        if let Some(succ) = self.succ_info {
            self.route_table.add_route(succ, self.my_info, self.succ_info);
        }
        info!(
            left = hash_range.0,
            right = hash_range.1,
            succ = ?self.succ_info.map(|n| n.addr),
            pred = ?self.pred_info.map(|n| n.addr),
            "dht join succeeded"
        );
    }

    /// Handle an incoming `join` request from `joiner` (§4.4 `handleJoin`):
    /// split the local range in half, hand the upper half to the joiner.
    fn handle_join(&mut self, pkt: DhtPacket, from: SocketAddrV4) {
        let joiner = pkt.sender_info.unwrap_or(NodeInfo::new(from, 0));
        let (left, right) = self.hash_range;
        let mid = left + (right - left) / 2;

        let mut reply = DhtPacket::empty(PacketKind::Success, pkt.tag);
        reply.ttl = Some(DEFAULT_TTL);
        reply.hash_range = Some((mid, right));
        reply.succ_info = self.succ_info;
        reply.pred_info = Some(self.my_info);
        self.send_pkt(&reply, joiner.addr);

        let old_succ = self.succ_info;
        if let Some(old_succ) = old_succ {
            if old_succ.addr == self.my_info.addr {
                // Ring of one: the joiner becomes our predecessor too.
                self.pred_info = Some(joiner);
            } else {
                let tag = self.next_tag();
                let mut update = DhtPacket::empty(PacketKind::Update, tag);
                update.ttl = Some(DEFAULT_TTL);
                update.pred_info = Some(joiner);
                self.send_pkt(&update, old_succ.addr);
            }
        }

        self.succ_info = Some(joiner);
        self.route_table.add_route(joiner, self.my_info, self.succ_info);
        self.hash_range = (left, mid.saturating_sub(1));

        let moved: Vec<String> = self
            .map
            .keys()
            .filter(|k| hashit(k) >= mid)
            .cloned()
            .collect();
        for key in moved {
            if let Some(value) = self.map.remove(&key) {
                let tag = self.next_tag();
                let mut xfer = DhtPacket::empty(PacketKind::Transfer, tag);
                xfer.ttl = Some(DEFAULT_TTL);
                xfer.key = Some(key);
                xfer.value = Some(value);
                self.send_pkt(&xfer, joiner.addr);
            }
        }

        info!(joiner = %joiner.addr, mid, new_right = self.hash_range.1, "dht peer joined, range split");
    }

    /// Leave the ring (§4.4 `leave`): notify the successor, wait for the
    /// leave notice to sweep all the way around the ring back to us,
    /// then merge our range and keys into our predecessor.
    pub fn leave(&mut self) {
        let Some(succ) = self.succ_info else {
            return;
        };
        if succ.addr != self.my_info.addr {
            let tag = self.next_tag();
            let mut pkt = DhtPacket::empty(PacketKind::Leave, tag);
            pkt.ttl = Some(DEFAULT_TTL);
            pkt.sender_info = Some(self.my_info);
            self.send_pkt(&pkt, succ.addr);

            self.stop_flag = false;
            while !self.stop_flag {
                if !self.run_once() {
                    std::thread::sleep(IDLE_SLEEP);
                }
            }
        }

        if let (Some(pred), Some(succ)) = (self.pred_info, self.succ_info) {
            if pred.addr != self.my_info.addr {
                let merged_range = (pred.first_hash, self.hash_range.1);

                let tag = self.next_tag();
                let mut to_pred = DhtPacket::empty(PacketKind::Update, tag);
                to_pred.ttl = Some(DEFAULT_TTL);
                to_pred.succ_info = Some(succ);
                to_pred.hash_range = Some(merged_range);
                self.send_pkt(&to_pred, pred.addr);

                let tag = self.next_tag();
                let mut to_succ = DhtPacket::empty(PacketKind::Update, tag);
                to_succ.ttl = Some(DEFAULT_TTL);
                to_succ.pred_info = Some(pred);
                self.send_pkt(&to_succ, succ.addr);

                for (key, value) in self.map.drain() {
                    let tag = self.next_tag();
                    let mut xfer = DhtPacket::empty(PacketKind::Transfer, tag);
                    xfer.ttl = Some(DEFAULT_TTL);
                    xfer.key = Some(key);
                    xfer.value = Some(value);
                    self.send_pkt(&xfer, pred.addr);
                }
            }
        }

        self.map.clear();
        if let Some(cache) = &mut self.cache {
            cache.clear();
        }
        self.route_table.clear();
        info!("dht node left the ring");
    }

    fn handle_leave(&mut self, pkt: DhtPacket) {
        let Some(sender) = pkt.sender_info else {
            return;
        };
        if sender == self.my_info {
            self.stop_flag = true;
            return;
        }
        if let Some(succ) = self.succ_info {
            self.send_pkt(&pkt, succ.addr);
        }
        self.route_table.remove_route(sender);
        if self.debug > 0 {
            debug!(left = %sender.addr, routes = self.route_table.len(), "routing table entry removed");
        }
    }

    fn handle_update(&mut self, pkt: DhtPacket) {
        if let Some(succ) = pkt.succ_info {
            self.succ_info = Some(succ);
            self.route_table.add_route(succ, self.my_info, self.succ_info);
        }
        if let Some(pred) = pkt.pred_info {
            self.pred_info = Some(pred);
        }
        if let Some(range) = pkt.hash_range {
            self.hash_range = range;
            self.my_info.first_hash = range.0;
        }
    }

    // ─── Key operations ──────────────────────────────────────────────────

    fn handle_get(&mut self, pkt: DhtPacket, from: SocketAddrV4) {
        let key = pkt.key.clone().unwrap_or_default();

        if let Some(cache) = &self.cache {
            if let Some(val) = cache.get(&key) {
                let mut reply = DhtPacket::empty(PacketKind::Success, pkt.tag);
                reply.ttl = Some(DEFAULT_TTL);
                reply.key = Some(key);
                reply.value = Some(val.clone());
                self.send_pkt(&reply, from);
                return;
            }
        }

        let h = hashit(&key);
        if self.in_range(h) {
            let reply_to = pkt.relay_adr.unwrap_or(from);
            let mut reply = match self.map.get(&key) {
                Some(v) => {
                    let mut r = DhtPacket::empty(PacketKind::Success, pkt.tag);
                    r.value = Some(v.clone());
                    r
                }
                None => DhtPacket::empty(PacketKind::NoMatch, pkt.tag),
            };
            reply.ttl = Some(DEFAULT_TTL);
            reply.key = Some(key);
            if pkt.relay_adr.is_some() {
                reply.sender_info = Some(self.my_info);
            }
            self.send_pkt(&reply, reply_to);
        } else {
            let mut fwd = pkt;
            if fwd.relay_adr.is_none() {
                fwd.relay_adr = Some(self.my_info.addr);
                fwd.client_adr = Some(from);
            }
            self.forward(&fwd, h);
        }
    }

    fn handle_put(&mut self, pkt: DhtPacket, from: SocketAddrV4) {
        let key = pkt.key.clone().unwrap_or_default();

        if let Some(cache) = &mut self.cache {
            cache.remove(&key);
        }

        let h = hashit(&key);
        if self.in_range(h) {
            match &pkt.value {
                Some(v) => {
                    self.map.insert(key.clone(), v.clone());
                }
                None => {
                    self.map.remove(&key);
                }
            }
            let reply_to = pkt.relay_adr.unwrap_or(from);
            let mut reply = DhtPacket::empty(PacketKind::Success, pkt.tag);
            reply.ttl = Some(DEFAULT_TTL);
            reply.key = Some(key);
            if pkt.relay_adr.is_some() {
                reply.sender_info = Some(self.my_info);
            }
            self.send_pkt(&reply, reply_to);
        } else {
            let mut fwd = pkt;
            if fwd.relay_adr.is_none() {
                fwd.relay_adr = Some(self.my_info.addr);
                fwd.client_adr = Some(from);
            }
            self.forward(&fwd, h);
        }
    }

    fn handle_xfer(&mut self, pkt: DhtPacket) {
        if let (Some(key), Some(value)) = (pkt.key, pkt.value) {
            self.map.insert(key, value);
        }
    }

    fn handle_reply(&mut self, pkt: DhtPacket) {
        if pkt.hash_range.is_some() {
            self.apply_join_success(pkt);
            return;
        }

        if pkt.kind == PacketKind::Success {
            if let (Some(cache), Some(key), Some(value)) = (&mut self.cache, &pkt.key, &pkt.value) {
                cache.insert(key.clone(), value.clone());
            }
        }

        if let Some(client) = pkt.client_adr {
            let mut out = pkt;
            out.client_adr = None;
            out.relay_adr = None;
            out.sender_info = None;
            self.send_pkt(&out, client);
        }
    }

    /// Forward `pkt` toward the node owning `h` (§4.4 `forward`): pick
    /// the closest predecessor of `h` known in the routing table.
    fn forward(&self, pkt: &DhtPacket, h: u32) {
        let target = self
            .route_table
            .closest_predecessor(h)
            .or(self.succ_info)
            .unwrap_or(self.my_info);
        trace!(target = %target.addr, h, "forwarding dht packet");
        self.send_pkt(pkt, target.addr);
    }

    // ─── Main loop ───────────────────────────────────────────────────────

    pub fn run_once(&mut self) -> bool {
        if !self.substrate.incoming() {
            return false;
        }
        let Some((bytes, from)) = self.substrate.receive() else {
            return false;
        };
        let Ok(text) = std::str::from_utf8(&bytes) else {
            warn!(%from, "dropping non-utf8 dht packet");
            return true;
        };
        let mut pkt = match DhtPacket::parse(text) {
            Ok(p) => p,
            Err(e) => {
                debug!(error = %e, %from, "dropping malformed dht packet");
                return true;
            }
        };

        if let Some(ttl) = pkt.ttl {
            let ttl = ttl - 1;
            if ttl <= 0 {
                warn!(%from, kind = ?pkt.kind, "dht packet ttl exhausted, dropping");
                return true;
            }
            pkt.ttl = Some(ttl);
        }

        if pkt.kind != PacketKind::Leave {
            if let Some(sender) = pkt.sender_info {
                self.route_table.add_route(sender, self.my_info, self.succ_info);
                if self.debug > 0 {
                    debug!(learned = %sender.addr, routes = self.route_table.len(), "routing table entry learned");
                }
            }
        }

        match pkt.kind {
            PacketKind::Get => self.handle_get(pkt, from),
            PacketKind::Put => self.handle_put(pkt, from),
            PacketKind::Success | PacketKind::NoMatch | PacketKind::Failure => self.handle_reply(pkt),
            PacketKind::Join => self.handle_join(pkt, from),
            PacketKind::Leave => self.handle_leave(pkt),
            PacketKind::Transfer => self.handle_xfer(pkt),
            PacketKind::Update => self.handle_update(pkt),
        }
        true
    }

    pub fn run(&mut self, quit: impl Fn() -> bool) {
        while !quit() {
            if !self.run_once() {
                std::thread::sleep(IDLE_SLEEP);
            }
        }
    }
}
