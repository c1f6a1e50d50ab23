//! The bounded shortcut routing table (§4.4 "Routing table"): up to
//! `numRoutes` entries, with the ring successor always pinned at index 0
//! when known.

use crate::node_info::NodeInfo;

pub struct RouteTable {
    capacity: usize,
    entries: Vec<NodeInfo>,
}

impl RouteTable {
    pub fn new(capacity: usize) -> Self {
        RouteTable {
            capacity: capacity.max(1),
            entries: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[NodeInfo] {
        &self.entries
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Learn about `r` (§4.4 `addRoute`). `my_info`/`succ_info` are the
    /// caller's current identity and successor, since the insertion rule
    /// special-cases both.
    pub fn add_route(&mut self, r: NodeInfo, my_info: NodeInfo, succ_info: Option<NodeInfo>) {
        if r == my_info {
            return;
        }
        if Some(r) == succ_info {
            if self.entries.is_empty() {
                self.entries.push(r);
            } else {
                self.entries[0] = r;
            }
            return;
        }
        if self.entries.len() >= self.capacity {
            if self.capacity > 1 && self.entries.len() > 1 {
                self.entries.remove(1);
                self.entries.push(r);
            }
            // capacity == 1 with an occupied succ-only slot: nothing else fits.
        } else {
            self.entries.push(r);
        }
    }

    pub fn remove_route(&mut self, r: NodeInfo) {
        self.entries.retain(|&e| e != r);
    }

    /// The closest predecessor of `h` on the ring (§4.4 `forward`): the
    /// entry minimizing `(h - firstHash) mod 2^31`.
    pub fn closest_predecessor(&self, h: u32) -> Option<NodeInfo> {
        const RING: i64 = 1 << 31;
        self.entries.iter().copied().min_by_key(|e| {
            let delta = h as i64 - e.first_hash as i64;
            delta.rem_euclid(RING)
        })
    }
}
