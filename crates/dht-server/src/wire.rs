//! The DHT control protocol (§6 "DHT wire format"): a text packet whose
//! first line is always `CSE473 DHTPv0.1`, followed by `field:value`
//! lines. Hand-rolled rather than pulled from a parser-combinator crate,
//! matching the overlay router's own small wire-format parser.

use std::net::SocketAddrV4;

use thiserror::Error;

use crate::node_info::NodeInfo;

pub const MAGIC: &str = "CSE473 DHTPv0.1";

#[derive(Debug, Error)]
pub enum WireError {
    #[error("missing or wrong magic line, got {0:?}")]
    BadMagic(String),
    #[error("missing type field")]
    MissingType,
    #[error("unknown packet type {0:?}")]
    UnknownType(String),
    #[error("missing required field {0}")]
    MissingField(&'static str),
    #[error("malformed field {field}: {value:?}")]
    MalformedField { field: &'static str, value: String },
    #[error("unparseable line: {0:?}")]
    BadLine(String),
}

impl WireError {
    pub(crate) fn malformed(field: &'static str, value: &str) -> Self {
        WireError::MalformedField {
            field,
            value: value.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    Get,
    Put,
    Success,
    NoMatch,
    Failure,
    Join,
    Leave,
    Transfer,
    Update,
}

impl PacketKind {
    fn as_str(&self) -> &'static str {
        match self {
            PacketKind::Get => "get",
            PacketKind::Put => "put",
            PacketKind::Success => "success",
            PacketKind::NoMatch => "no match",
            PacketKind::Failure => "failure",
            PacketKind::Join => "join",
            PacketKind::Leave => "leave",
            PacketKind::Transfer => "transfer",
            PacketKind::Update => "update",
        }
    }

    fn parse(s: &str) -> Result<Self, WireError> {
        match s {
            "get" => Ok(PacketKind::Get),
            "put" => Ok(PacketKind::Put),
            "success" => Ok(PacketKind::Success),
            "no match" => Ok(PacketKind::NoMatch),
            "failure" => Ok(PacketKind::Failure),
            "join" => Ok(PacketKind::Join),
            "leave" => Ok(PacketKind::Leave),
            "transfer" => Ok(PacketKind::Transfer),
            "update" => Ok(PacketKind::Update),
            other => Err(WireError::UnknownType(other.to_string())),
        }
    }
}

/// A single DHT protocol packet. Every field beyond `kind`/`tag` is
/// optional since the set of fields in play differs per packet type
/// (§6); callers build one with [`DhtPacket::empty`] and fill in what
/// the operation needs.
#[derive(Debug, Clone, PartialEq)]
pub struct DhtPacket {
    pub kind: PacketKind,
    pub tag: u64,
    pub ttl: Option<i32>,
    pub key: Option<String>,
    pub value: Option<String>,
    pub reason: Option<String>,
    pub client_adr: Option<SocketAddrV4>,
    pub relay_adr: Option<SocketAddrV4>,
    pub sender_info: Option<NodeInfo>,
    pub pred_info: Option<NodeInfo>,
    pub succ_info: Option<NodeInfo>,
    pub hash_range: Option<(u32, u32)>,
}

impl DhtPacket {
    pub fn empty(kind: PacketKind, tag: u64) -> Self {
        DhtPacket {
            kind,
            tag,
            ttl: None,
            key: None,
            value: None,
            reason: None,
            client_adr: None,
            relay_adr: None,
            sender_info: None,
            pred_info: None,
            succ_info: None,
            hash_range: None,
        }
    }

    pub fn encode(&self) -> String {
        let mut out = String::with_capacity(128);
        out.push_str(MAGIC);
        out.push('\n');
        out.push_str(&format!("type:{}\n", self.kind.as_str()));
        out.push_str(&format!("tag:{}\n", self.tag));
        if let Some(ttl) = self.ttl {
            out.push_str(&format!("ttl:{ttl}\n"));
        }
        if let Some(key) = &self.key {
            out.push_str(&format!("key:{key}\n"));
        }
        if let Some(value) = &self.value {
            out.push_str(&format!("value:{value}\n"));
        }
        if let Some(reason) = &self.reason {
            out.push_str(&format!("reason:{reason}\n"));
        }
        if let Some(adr) = &self.client_adr {
            out.push_str(&format!("clientAdr:{adr}\n"));
        }
        if let Some(adr) = &self.relay_adr {
            out.push_str(&format!("relayAdr:{adr}\n"));
        }
        if let Some(info) = &self.sender_info {
            out.push_str(&format!("senderInfo:{}\n", info.format()));
        }
        if let Some(info) = &self.pred_info {
            out.push_str(&format!("predInfo:{}\n", info.format()));
        }
        if let Some(info) = &self.succ_info {
            out.push_str(&format!("succInfo:{}\n", info.format()));
        }
        if let Some((lo, hi)) = self.hash_range {
            out.push_str(&format!("hashRange:{lo}:{hi}\n"));
        }
        out
    }

    pub fn parse(payload: &str) -> Result<DhtPacket, WireError> {
        let mut lines = payload.lines();
        let magic = lines.next().unwrap_or("");
        if magic != MAGIC {
            return Err(WireError::BadMagic(magic.to_string()));
        }

        let mut kind = None;
        let mut tag = None;
        let mut ttl = None;
        let mut key = None;
        let mut value = None;
        let mut reason = None;
        let mut client_adr = None;
        let mut relay_adr = None;
        let mut sender_info = None;
        let mut pred_info = None;
        let mut succ_info = None;
        let mut hash_range = None;

        for line in lines {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let (field, val) = line
                .split_once(':')
                .ok_or_else(|| WireError::BadLine(line.to_string()))?;
            let val = val.trim();
            match field {
                "type" => kind = Some(PacketKind::parse(val)?),
                "tag" => tag = Some(val.parse().map_err(|_| WireError::malformed("tag", val))?),
                "ttl" => ttl = Some(val.parse().map_err(|_| WireError::malformed("ttl", val))?),
                "key" => key = Some(val.to_string()),
                "value" => value = Some(val.to_string()),
                "reason" => reason = Some(val.to_string()),
                "clientAdr" => {
                    client_adr = Some(val.parse().map_err(|_| WireError::malformed("clientAdr", val))?)
                }
                "relayAdr" => {
                    relay_adr = Some(val.parse().map_err(|_| WireError::malformed("relayAdr", val))?)
                }
                "senderInfo" => sender_info = Some(NodeInfo::parse(val)?),
                "predInfo" => pred_info = Some(NodeInfo::parse(val)?),
                "succInfo" => succ_info = Some(NodeInfo::parse(val)?),
                "hashRange" => {
                    let (lo, hi) = val
                        .split_once(':')
                        .ok_or_else(|| WireError::malformed("hashRange", val))?;
                    let lo: u32 = lo.parse().map_err(|_| WireError::malformed("hashRange", val))?;
                    let hi: u32 = hi.parse().map_err(|_| WireError::malformed("hashRange", val))?;
                    hash_range = Some((lo, hi));
                }
                // Forward-compatible: ignore fields we don't recognize yet.
                _ => {}
            }
        }

        let kind = kind.ok_or(WireError::MissingType)?;
        let tag = tag.ok_or(WireError::MissingField("tag"))?;

        Ok(DhtPacket {
            kind,
            tag,
            ttl,
            key,
            value,
            reason,
            client_adr,
            relay_adr,
            sender_info,
            pred_info,
            succ_info,
            hash_range,
        })
    }
}
