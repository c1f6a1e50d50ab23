//! The path-vector route table and `updateRoute` policy (§4.2, §3).

use overlay_common::Prefix;
use std::collections::HashMap;

/// One routing-table entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub prefix: Prefix,
    pub timestamp: f64,
    pub cost: f64,
    /// Router IPs, destination last. Never contains `myIp` for a valid route.
    pub path: Vec<u32>,
    pub out_link: usize,
    pub valid: bool,
}

/// What changed as a result of a successful `update_route` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub path_changed: bool,
    pub link_changed: bool,
}

#[derive(Default)]
pub struct RouteTable {
    routes: HashMap<Prefix, Route>,
}

impl RouteTable {
    pub fn new() -> Self {
        RouteTable::default()
    }

    pub fn get(&self, prefix: &Prefix) -> Option<&Route> {
        self.routes.get(prefix)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Route> {
        self.routes.values()
    }

    /// Apply the `updateRoute(old, nu)` policy from §4.2.
    ///
    /// `link_up` reports whether a given link index is currently live;
    /// the Router owns link state, so it's threaded through rather than
    /// duplicated here.
    pub fn update_route(
        &mut self,
        candidate: Route,
        link_up: impl Fn(usize) -> bool,
    ) -> Option<UpdateOutcome> {
        if !link_up(candidate.out_link) {
            return None;
        }

        let prefix = candidate.prefix;
        match self.routes.get(&prefix) {
            None => {
                self.routes.insert(prefix, candidate);
                Some(UpdateOutcome {
                    path_changed: true,
                    link_changed: true,
                })
            }
            Some(old) if !old.valid => {
                let path_changed = old.path != candidate.path;
                let link_changed = old.out_link != candidate.out_link;
                let mut updated = old.clone();
                updated.timestamp = candidate.timestamp;
                updated.cost = candidate.cost;
                updated.path = candidate.path;
                updated.out_link = candidate.out_link;
                updated.valid = true;
                self.routes.insert(prefix, updated);
                Some(UpdateOutcome {
                    path_changed,
                    link_changed,
                })
            }
            Some(old) if old.path == candidate.path && old.out_link == candidate.out_link => {
                let mut updated = old.clone();
                updated.timestamp = candidate.timestamp;
                updated.cost = candidate.cost;
                self.routes.insert(prefix, updated);
                None
            }
            Some(old) => {
                let should_replace = candidate.cost < 0.9 * old.cost
                    || candidate.timestamp - old.timestamp >= 20.0
                    || !link_up(old.out_link);
                if !should_replace {
                    return None;
                }
                let path_changed = old.path != candidate.path;
                let link_changed = old.out_link != candidate.out_link;
                let mut updated = old.clone();
                updated.timestamp = candidate.timestamp;
                updated.cost = candidate.cost;
                updated.path = candidate.path;
                updated.out_link = candidate.out_link;
                updated.valid = true;
                self.routes.insert(prefix, updated);
                Some(UpdateOutcome {
                    path_changed,
                    link_changed,
                })
            }
        }
    }

    /// Invalidate every route whose first path hop is `peer_ip` (a link to
    /// that peer just went down, §4.2 hello subprotocol).
    pub fn invalidate_via_peer(&mut self, peer_ip: u32) {
        for route in self.routes.values_mut() {
            if route.path.first() == Some(&peer_ip) {
                route.valid = false;
            }
        }
    }

    /// Invalidate every route whose path contains the adjacent pair
    /// `(ip_a, ip_b)` in that order (a failure advertisement for that
    /// link arrived, §4.2). Returns true iff any route changed.
    pub fn invalidate_via_link_failure(&mut self, ip_a: u32, ip_b: u32, now: f64) -> bool {
        let mut changed = false;
        for route in self.routes.values_mut() {
            if route
                .path
                .windows(2)
                .any(|w| w[0] == ip_a && w[1] == ip_b)
            {
                route.valid = false;
                route.timestamp = now;
                changed = true;
            }
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(prefix: &str, cost: f64, ts: f64, path: &[u32], link: usize) -> Route {
        Route {
            prefix: Prefix::parse(prefix).unwrap(),
            timestamp: ts,
            cost,
            path: path.to_vec(),
            out_link: link,
            valid: true,
        }
    }

    #[test]
    fn first_insert_changes_path_and_link() {
        let mut t = RouteTable::new();
        let r = route("10.1.0.0/16", 0.02, 1.0, &[5], 0);
        let outcome = t.update_route(r, |_| true).unwrap();
        assert!(outcome.path_changed && outcome.link_changed);
    }

    #[test]
    fn down_out_link_is_rejected() {
        let mut t = RouteTable::new();
        let r = route("10.1.0.0/16", 0.02, 1.0, &[5], 0);
        assert!(t.update_route(r, |_| false).is_none());
    }

    #[test]
    fn invalid_route_is_revalidated_in_place() {
        let mut t = RouteTable::new();
        let r = route("10.1.0.0/16", 0.02, 1.0, &[5], 0);
        t.update_route(r, |_| true).unwrap();
        t.routes.get_mut(&Prefix::parse("10.1.0.0/16").unwrap()).unwrap().valid = false;

        let nu = route("10.1.0.0/16", 0.03, 2.0, &[5], 0);
        let outcome = t.update_route(nu, |_| true).unwrap();
        assert!(!outcome.path_changed && !outcome.link_changed);
        assert!(t.get(&Prefix::parse("10.1.0.0/16").unwrap()).unwrap().valid);
    }

    #[test]
    fn matching_path_and_link_just_refreshes() {
        let mut t = RouteTable::new();
        t.update_route(route("10.1.0.0/16", 0.02, 1.0, &[5], 0), |_| true)
            .unwrap();
        let refreshed = route("10.1.0.0/16", 0.025, 5.0, &[5], 0);
        assert!(t.update_route(refreshed, |_| true).is_none());
        let stored = t.get(&Prefix::parse("10.1.0.0/16").unwrap()).unwrap();
        assert_eq!(stored.timestamp, 5.0);
        assert_eq!(stored.cost, 0.025);
    }

    #[test]
    fn significantly_cheaper_route_replaces() {
        let mut t = RouteTable::new();
        t.update_route(route("10.1.0.0/16", 0.10, 1.0, &[5], 0), |_| true)
            .unwrap();
        // 0.08 < 0.9 * 0.10 -> replace, and path differs so both flags set
        let cheaper = route("10.1.0.0/16", 0.08, 1.5, &[6], 1);
        let outcome = t.update_route(cheaper, |_| true).unwrap();
        assert!(outcome.path_changed && outcome.link_changed);
    }

    #[test]
    fn stale_route_is_replaced_after_20s_even_if_not_cheaper() {
        let mut t = RouteTable::new();
        t.update_route(route("10.1.0.0/16", 0.05, 0.0, &[5], 0), |_| true)
            .unwrap();
        let stale_but_same_cost = route("10.1.0.0/16", 0.05, 20.0, &[5], 0);
        // path/link identical -> falls into the "refresh" branch, not replace,
        // so use a different path to exercise the staleness clause specifically.
        let different_path = route("10.1.0.0/16", 0.05, 20.0, &[7], 1);
        let _ = stale_but_same_cost;
        let outcome = t.update_route(different_path, |_| true).unwrap();
        assert!(outcome.path_changed);
    }

    #[test]
    fn marginally_better_route_is_rejected() {
        let mut t = RouteTable::new();
        t.update_route(route("10.1.0.0/16", 0.10, 0.0, &[5], 0), |_| true)
            .unwrap();
        // 0.095 is not < 0.9 * 0.10 = 0.09, timestamp delta < 20, link up -> no change
        let marginal = route("10.1.0.0/16", 0.095, 1.0, &[6], 1);
        assert!(t.update_route(marginal, |_| true).is_none());
    }

    #[test]
    fn invalidate_via_peer_marks_first_hop_routes() {
        let mut t = RouteTable::new();
        t.update_route(route("10.1.0.0/16", 0.02, 1.0, &[5, 9], 0), |_| true)
            .unwrap();
        t.invalidate_via_peer(5);
        assert!(!t.get(&Prefix::parse("10.1.0.0/16").unwrap()).unwrap().valid);
    }

    #[test]
    fn invalidate_via_link_failure_matches_adjacent_pair() {
        let mut t = RouteTable::new();
        t.update_route(route("10.1.0.0/16", 0.02, 1.0, &[5, 9, 1], 0), |_| true)
            .unwrap();
        assert!(t.invalidate_via_link_failure(9, 1, 42.0));
        let r = t.get(&Prefix::parse("10.1.0.0/16").unwrap()).unwrap();
        assert!(!r.valid);
        assert_eq!(r.timestamp, 42.0);
    }

    #[test]
    fn invalidate_via_link_failure_no_match_leaves_route_valid() {
        let mut t = RouteTable::new();
        t.update_route(route("10.1.0.0/16", 0.02, 1.0, &[5, 9, 1], 0), |_| true)
            .unwrap();
        assert!(!t.invalidate_via_link_failure(1, 9, 42.0)); // reversed order
        assert!(t.get(&Prefix::parse("10.1.0.0/16").unwrap()).unwrap().valid);
    }
}
