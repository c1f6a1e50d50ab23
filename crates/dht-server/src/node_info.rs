//! `NodeInfo` (§3 "DHT server state"): a ring member's address together
//! with the left edge of its owned hash range, as carried on the wire by
//! `senderInfo`/`predInfo`/`succInfo` (`ip:port:firstHash`).

use std::net::SocketAddrV4;

use crate::wire::WireError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeInfo {
    pub addr: SocketAddrV4,
    pub first_hash: u32,
}

impl NodeInfo {
    pub fn new(addr: SocketAddrV4, first_hash: u32) -> Self {
        NodeInfo { addr, first_hash }
    }

    pub fn format(&self) -> String {
        format!("{}:{}", self.addr, self.first_hash)
    }

    pub fn parse(s: &str) -> Result<Self, WireError> {
        let (addr_part, hash_part) = s
            .rsplit_once(':')
            .ok_or_else(|| WireError::malformed("nodeinfo", s))?;
        let addr: SocketAddrV4 = addr_part
            .parse()
            .map_err(|_| WireError::malformed("nodeinfo", s))?;
        let first_hash: u32 = hash_part
            .parse()
            .map_err(|_| WireError::malformed("nodeinfo", s))?;
        Ok(NodeInfo { addr, first_hash })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let info = NodeInfo::new("10.0.0.1:9000".parse().unwrap(), 42);
        let parsed = NodeInfo::parse(&info.format()).unwrap();
        assert_eq!(info, parsed);
    }

    #[test]
    fn rejects_missing_hash() {
        assert!(NodeInfo::parse("10.0.0.1:9000").is_err());
    }
}
