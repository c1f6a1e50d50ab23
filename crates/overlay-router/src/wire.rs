//! The `RPv0` text control-plane wire format (§6): hello, hello2u,
//! advert, fadvert — newline-separated `key: value` lines, leading line
//! always `RPv0`.

use overlay_common::{format_ip, parse_ip, Prefix};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("missing leading RPv0 line")]
    MissingMagic,
    #[error("missing or unrecognized type line")]
    MissingType,
    #[error("unknown message type {0:?}")]
    UnknownType(String),
    #[error("malformed field {field:?}: {value:?}")]
    MalformedField { field: String, value: String },
    #[error("missing required field {0:?}")]
    MissingField(&'static str),
}

#[derive(Debug, Clone, PartialEq)]
pub enum RouterMessage {
    Hello { timestamp: f64 },
    Hello2u { timestamp: f64 },
    Advert {
        prefix: Prefix,
        timestamp: f64,
        cost: f64,
        path: Vec<u32>,
    },
    FAdvert {
        ip_a: u32,
        ip_b: u32,
        timestamp: f64,
        path: Vec<u32>,
    },
}

const MAGIC: &str = "RPv0";

pub fn format_hello(timestamp: f64) -> String {
    format!("{MAGIC}\ntype: hello\ntimestamp: {timestamp}\n")
}

pub fn format_hello2u(timestamp: f64) -> String {
    format!("{MAGIC}\ntype: hello2u\ntimestamp: {timestamp}\n")
}

pub fn format_advert(prefix: Prefix, timestamp: f64, cost: f64, path: &[u32]) -> String {
    let hops: Vec<String> = path.iter().map(|ip| format_ip(*ip)).collect();
    format!(
        "{MAGIC}\ntype: advert\npathvec: {prefix} {timestamp} {cost:.3} {}\n",
        hops.join(" ")
    )
}

pub fn format_fadvert(ip_a: u32, ip_b: u32, timestamp: f64, path: &[u32]) -> String {
    let hops: Vec<String> = path.iter().map(|ip| format_ip(*ip)).collect();
    format!(
        "{MAGIC}\ntype: fadvert\nlinkfail: {} {} {timestamp} {}\n",
        format_ip(ip_a),
        format_ip(ip_b),
        hops.join(" ")
    )
}

pub fn parse(payload: &str) -> Result<RouterMessage, WireError> {
    let mut lines = payload.lines();
    if lines.next() != Some(MAGIC) {
        return Err(WireError::MissingMagic);
    }

    let mut msg_type: Option<&str> = None;
    let mut timestamp_field: Option<&str> = None;
    let mut pathvec_field: Option<&str> = None;
    let mut linkfail_field: Option<&str> = None;

    for line in lines {
        if line.is_empty() {
            continue;
        }
        let (key, value) = line
            .split_once(':')
            .ok_or_else(|| WireError::MalformedField {
                field: "<line>".into(),
                value: line.into(),
            })?;
        let value = value.trim();
        match key.trim() {
            "type" => msg_type = Some(value),
            "timestamp" => timestamp_field = Some(value),
            "pathvec" => pathvec_field = Some(value),
            "linkfail" => linkfail_field = Some(value),
            _ => {} // unrecognized fields are ignored, not fatal
        }
    }

    match msg_type.ok_or(WireError::MissingType)? {
        "hello" => Ok(RouterMessage::Hello {
            timestamp: parse_f64(timestamp_field.ok_or(WireError::MissingField("timestamp"))?)?,
        }),
        "hello2u" => Ok(RouterMessage::Hello2u {
            timestamp: parse_f64(timestamp_field.ok_or(WireError::MissingField("timestamp"))?)?,
        }),
        "advert" => parse_advert(pathvec_field.ok_or(WireError::MissingField("pathvec"))?),
        "fadvert" => parse_fadvert(linkfail_field.ok_or(WireError::MissingField("linkfail"))?),
        other => Err(WireError::UnknownType(other.to_string())),
    }
}

fn parse_advert(field: &str) -> Result<RouterMessage, WireError> {
    let mut tokens = field.split_whitespace();
    let prefix = Prefix::parse(next(&mut tokens, "pathvec.prefix")?)
        .map_err(|_| malformed("pathvec.prefix", field))?;
    let timestamp = parse_f64(next(&mut tokens, "pathvec.timestamp")?)?;
    let cost = parse_f64(next(&mut tokens, "pathvec.cost")?)?;
    let path: Result<Vec<u32>, WireError> = tokens
        .map(|hop| parse_ip(hop).map_err(|_| malformed("pathvec.hop", hop)))
        .collect();
    let path = path?;
    if path.is_empty() {
        return Err(WireError::MissingField("pathvec.hop"));
    }
    Ok(RouterMessage::Advert {
        prefix,
        timestamp,
        cost,
        path,
    })
}

fn parse_fadvert(field: &str) -> Result<RouterMessage, WireError> {
    let mut tokens = field.split_whitespace();
    let ip_a = parse_ip(next(&mut tokens, "linkfail.ipA")?).map_err(|_| malformed("linkfail.ipA", field))?;
    let ip_b = parse_ip(next(&mut tokens, "linkfail.ipB")?).map_err(|_| malformed("linkfail.ipB", field))?;
    let timestamp = parse_f64(next(&mut tokens, "linkfail.timestamp")?)?;
    let path: Result<Vec<u32>, WireError> = tokens
        .map(|hop| parse_ip(hop).map_err(|_| malformed("linkfail.hop", hop)))
        .collect();
    Ok(RouterMessage::FAdvert {
        ip_a,
        ip_b,
        timestamp,
        path: path?,
    })
}

fn next<'a>(
    tokens: &mut impl Iterator<Item = &'a str>,
    field: &'static str,
) -> Result<&'a str, WireError> {
    tokens.next().ok_or(WireError::MissingField(field))
}

fn parse_f64(s: &str) -> Result<f64, WireError> {
    s.parse()
        .map_err(|_| malformed("timestamp/cost", s))
}

fn malformed(field: &str, value: &str) -> WireError {
    WireError::MalformedField {
        field: field.to_string(),
        value: value.to_string(),
    }
}
