//! Shared types for the overlay router and RDT cores.
//!
//! This crate contains:
//! - **Packet codec** — the fixed binary header used by the overlay wire format
//! - **Prefix / IP math** — longest-prefix matching and dotted-quad parsing
//! - **Bounded queue** — capacity-bounded inter-thread handoff
//! - **Substrate** — the `Substrate` trait plus UDP and in-memory implementations
//! - **Errors** — shared `OverlayError` type

pub mod error;
pub mod ip;
pub mod packet;
pub mod prefix;
pub mod queue;
pub mod substrate;

pub use error::OverlayError;
pub use ip::{format_ip, parse_ip};
pub use packet::{Packet, Protocol};
pub use prefix::Prefix;
pub use queue::BoundedQueue;
