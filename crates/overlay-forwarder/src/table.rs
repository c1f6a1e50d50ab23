//! The forwarding table: `(Prefix, link)` pairs with longest-prefix-match
//! lookup, mutex-guarded so the Router thread can call `add_route` while
//! the Forwarder's own loop calls `lookup` (§5).

use overlay_common::Prefix;
use std::fmt;
use std::sync::Mutex;

struct Entry {
    prefix: Prefix,
    link: usize,
}

/// Forwarding table. Always contains at least the default route
/// `(0.0.0.0/0 -> 0)` at construction, per the invariant in §3.
pub struct ForwardingTable {
    entries: Mutex<Vec<Entry>>,
}

impl ForwardingTable {
    /// Build a table with only the default route pointing at `default_link`.
    pub fn new(default_link: usize) -> Self {
        ForwardingTable {
            entries: Mutex::new(vec![Entry {
                prefix: Prefix::default_route(),
                link: default_link,
            }]),
        }
    }

    /// Replace the link of an existing entry with the same prefix, or
    /// append a new one. Mutually exclusive with `lookup` via the mutex.
    pub fn add_route(&self, prefix: Prefix, link: usize) {
        let mut entries = self.entries.lock().unwrap();
        if let Some(entry) = entries.iter_mut().find(|e| e.prefix == prefix) {
            entry.link = link;
        } else {
            entries.push(Entry { prefix, link });
        }
    }

    /// Return the link of the longest-matching prefix, ties broken by
    /// first insertion. Returns `-1` iff nothing matches (never happens
    /// while the default route is present).
    pub fn lookup(&self, ip: u32) -> i64 {
        let entries = self.entries.lock().unwrap();
        let mut best: Option<(&Entry, usize)> = None;
        for (idx, entry) in entries.iter().enumerate() {
            if !entry.prefix.matches(ip) {
                continue;
            }
            match best {
                None => best = Some((entry, idx)),
                Some((cur, _)) if entry.prefix.length() > cur.prefix.length() => {
                    best = Some((entry, idx))
                }
                _ => {}
            }
        }
        best.map(|(e, _)| e.link as i64).unwrap_or(-1)
    }

    /// Human-readable dump of the table, for the `debug` logging levels.
    pub fn snapshot(&self) -> Vec<(Prefix, usize)> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .map(|e| (e.prefix, e.link))
            .collect()
    }
}

impl fmt::Display for ForwardingTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "forwarding table:")?;
        for (prefix, link) in self.snapshot() {
            writeln!(f, "  {prefix} -> link {link}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_route_present_at_startup() {
        let t = ForwardingTable::new(0);
        assert_eq!(t.lookup(0x0A010203), 0);
    }

    #[test]
    fn longest_prefix_wins() {
        let t = ForwardingTable::new(0);
        t.add_route(Prefix::parse("10.1.0.0/16").unwrap(), 2);
        t.add_route(Prefix::parse("10.1.2.0/24").unwrap(), 3);

        assert_eq!(t.lookup(parse("10.1.2.3")), 3); // /24 beats /16
        assert_eq!(t.lookup(parse("10.1.5.5")), 2); // only /16 matches
        assert_eq!(t.lookup(parse("192.168.0.1")), 0); // only default matches
    }

    #[test]
    fn add_route_replaces_existing_prefix() {
        let t = ForwardingTable::new(0);
        let p = Prefix::parse("10.1.0.0/16").unwrap();
        t.add_route(p, 2);
        t.add_route(p, 5);
        assert_eq!(t.lookup(parse("10.1.2.3")), 5);
        assert_eq!(t.snapshot().len(), 2); // default + one /16, not two
    }

    #[test]
    fn tie_break_is_first_insertion() {
        let t = ForwardingTable::new(0);
        // Two distinct prefixes can't tie on `matches` for the same ip at
        // the same length without being identical, so exercise the actual
        // tie rule: the default route is the fallback when nothing more
        // specific matches, regardless of insertion order of other routes.
        t.add_route(Prefix::parse("10.2.0.0/16").unwrap(), 9);
        assert_eq!(t.lookup(parse("10.1.0.1")), 0);
    }

    fn parse(s: &str) -> u32 {
        overlay_common::parse_ip(s).unwrap()
    }
}
