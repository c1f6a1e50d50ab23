//! Node configuration: an all-optional `*Input` struct loaded from TOML,
//! resolved into a concrete `NodeConfig` with defaults filled in — the
//! same two-layer pattern the teacher's bonding config uses.

use std::net::SocketAddr;

use overlay_common::{parse_ip, Prefix};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required field `my_ip`")]
    MissingMyIp,
    #[error("invalid my_ip {0:?}: {1}")]
    InvalidMyIp(String, overlay_common::OverlayError),
    #[error("missing required field `prefix`")]
    MissingPrefix,
    #[error("invalid prefix {0:?}: {1}")]
    InvalidPrefix(String, overlay_common::OverlayError),
    #[error("link {0} is missing `peer_ip`")]
    MissingPeerIp(usize),
    #[error("link {0} has invalid peer_ip {1:?}: {2}")]
    InvalidPeerIp(usize, String, overlay_common::OverlayError),
    #[error("link {0} is missing `peer_addr`")]
    MissingPeerAddr(usize),
    #[error("link {0} has invalid peer_addr {1:?}: {2}")]
    InvalidPeerAddr(usize, String, std::net::AddrParseError),
    #[error("invalid bind_addr {0:?}: {1}")]
    InvalidBindAddr(String, std::net::AddrParseError),
}

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:9000";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NodeConfigInput {
    pub my_ip: Option<String>,
    pub bind_addr: Option<String>,
    pub prefix: Option<String>,
    pub debug: Option<u8>,
    pub failure_advert: Option<bool>,
    pub links: Vec<LinkConfigInput>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LinkConfigInput {
    pub peer_ip: Option<String>,
    pub peer_addr: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub my_ip: u32,
    pub bind_addr: SocketAddr,
    pub prefix: Prefix,
    pub debug: u8,
    pub failure_advert: bool,
    pub links: Vec<LinkConfig>,
}

#[derive(Debug, Clone)]
pub struct LinkConfig {
    pub peer_ip: u32,
    pub peer_addr: SocketAddr,
}

impl NodeConfigInput {
    pub fn resolve(self) -> Result<NodeConfig, ConfigError> {
        let my_ip_str = self.my_ip.ok_or(ConfigError::MissingMyIp)?;
        let my_ip = parse_ip(&my_ip_str)
            .map_err(|e| ConfigError::InvalidMyIp(my_ip_str.clone(), e))?;

        let bind_addr_str = self.bind_addr.unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_addr_str
            .parse()
            .map_err(|e| ConfigError::InvalidBindAddr(bind_addr_str.clone(), e))?;

        let prefix_str = self.prefix.ok_or(ConfigError::MissingPrefix)?;
        let prefix = Prefix::parse(&prefix_str)
            .map_err(|e| ConfigError::InvalidPrefix(prefix_str.clone(), e))?;

        let mut links = Vec::with_capacity(self.links.len());
        for (i, link) in self.links.into_iter().enumerate() {
            let peer_ip_str = link.peer_ip.ok_or(ConfigError::MissingPeerIp(i))?;
            let peer_ip = parse_ip(&peer_ip_str)
                .map_err(|e| ConfigError::InvalidPeerIp(i, peer_ip_str.clone(), e))?;
            let peer_addr_str = link.peer_addr.ok_or(ConfigError::MissingPeerAddr(i))?;
            let peer_addr = peer_addr_str
                .parse()
                .map_err(|e| ConfigError::InvalidPeerAddr(i, peer_addr_str.clone(), e))?;
            links.push(LinkConfig { peer_ip, peer_addr });
        }

        Ok(NodeConfig {
            my_ip,
            bind_addr,
            prefix,
            debug: self.debug.unwrap_or(0),
            failure_advert: self.failure_advert.unwrap_or(false),
            links,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_with_defaults() {
        let toml = r#"
            my_ip = "10.9.0.1"
            prefix = "10.9.0.0/16"

            [[links]]
            peer_ip = "10.9.0.2"
            peer_addr = "127.0.0.1:9001"
        "#;
        let input: NodeConfigInput = toml::from_str(toml).unwrap();
        let cfg = input.resolve().unwrap();
        assert_eq!(cfg.bind_addr, DEFAULT_BIND_ADDR.parse().unwrap());
        assert_eq!(cfg.debug, 0);
        assert!(!cfg.failure_advert);
        assert_eq!(cfg.links.len(), 1);
        assert_eq!(cfg.links[0].peer_ip, parse_ip("10.9.0.2").unwrap());
    }

    #[test]
    fn missing_my_ip_is_rejected() {
        let input = NodeConfigInput {
            prefix: Some("10.0.0.0/16".into()),
            ..Default::default()
        };
        assert!(matches!(input.resolve(), Err(ConfigError::MissingMyIp)));
    }

    #[test]
    fn missing_link_field_is_rejected() {
        let input = NodeConfigInput {
            my_ip: Some("10.9.0.1".into()),
            prefix: Some("10.9.0.0/16".into()),
            links: vec![LinkConfigInput {
                peer_ip: None,
                peer_addr: Some("127.0.0.1:9001".into()),
            }],
            ..Default::default()
        };
        assert!(matches!(input.resolve(), Err(ConfigError::MissingPeerIp(0))));
    }
}
