//! Per-link state: cost estimate, hello liveness, and round-trip
//! statistics (§3 "Link info (router)").

use crate::ewma::{Ewma, COST_ALPHA};

/// Round-trip statistics accumulated over all successful hello exchanges
/// on a link.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinkStats {
    pub count: u64,
    pub total_cost: f64,
    pub min_cost: f64,
    pub max_cost: f64,
}

/// State the Router tracks for one neighbor link.
pub struct LinkState {
    pub peer_ip: u32,
    cost_ewma: Ewma,
    /// Set when a hello reply arrives within the last interval; cleared
    /// at the start of each hello tick.
    pub got_reply: bool,
    /// Decaying health counter in `0..=3`; `0` means the link is DOWN.
    pub hello_state: u8,
    pub stats: LinkStats,
}

impl LinkState {
    pub fn new(peer_ip: u32) -> Self {
        LinkState {
            peer_ip,
            cost_ewma: Ewma::new(COST_ALPHA),
            got_reply: false,
            hello_state: 3,
            stats: LinkStats::default(),
        }
    }

    /// Current EWMA-smoothed cost in seconds. Zero until the first
    /// successful hello round-trip.
    pub fn cost(&self) -> f64 {
        self.cost_ewma.value()
    }

    pub fn is_up(&self) -> bool {
        self.hello_state > 0
    }

    /// Record a successful hello round-trip of `rtt` seconds (§4.2).
    pub fn record_rtt(&mut self, rtt: f64) {
        let half_rtt = rtt / 2.0;
        self.cost_ewma.update(half_rtt);
        let cost = self.cost_ewma.value();

        self.stats.count += 1;
        self.stats.total_cost += cost;
        if self.stats.count == 1 {
            self.stats.min_cost = cost;
            self.stats.max_cost = cost;
        } else {
            self.stats.min_cost = self.stats.min_cost.min(cost);
            self.stats.max_cost = self.stats.max_cost.max(cost);
        }

        self.hello_state = 3;
        self.got_reply = true;
    }

    /// One hello-tick worth of liveness bookkeeping: decrement
    /// `hello_state` if no reply arrived since the last tick, and report
    /// whether the link just transitioned to DOWN. Always clears
    /// `got_reply` for the next interval.
    pub fn tick_liveness(&mut self) -> bool {
        let mut just_died = false;
        if !self.got_reply && self.hello_state > 0 {
            self.hello_state -= 1;
            if self.hello_state == 0 {
                just_died = true;
            }
        }
        self.got_reply = false;
        just_died
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_link_starts_up_with_zero_cost() {
        let l = LinkState::new(1);
        assert!(l.is_up());
        assert_eq!(l.cost(), 0.0);
    }

    #[test]
    fn three_missed_hellos_brings_link_down() {
        let mut l = LinkState::new(1);
        assert!(!l.tick_liveness());
        assert_eq!(l.hello_state, 2);
        assert!(!l.tick_liveness());
        assert_eq!(l.hello_state, 1);
        assert!(l.tick_liveness()); // just transitioned to down
        assert_eq!(l.hello_state, 0);
        assert!(!l.is_up());
    }

    #[test]
    fn reply_resets_liveness() {
        let mut l = LinkState::new(1);
        l.tick_liveness();
        l.tick_liveness();
        assert_eq!(l.hello_state, 1);
        l.record_rtt(0.050);
        assert_eq!(l.hello_state, 3);
        assert!(l.is_up());
    }

    #[test]
    fn stats_track_min_max_total() {
        let mut l = LinkState::new(1);
        l.record_rtt(0.020); // cost = 0.010
        l.record_rtt(0.040); // cost updates via ewma
        assert_eq!(l.stats.count, 2);
        assert!(l.stats.min_cost <= l.stats.max_cost);
        assert!((l.stats.total_cost - (l.stats.min_cost + l.stats.max_cost)).abs() < 1e-9
            || l.stats.count == 2);
    }
}
