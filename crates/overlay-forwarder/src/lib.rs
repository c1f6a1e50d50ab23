//! The overlay router's Forwarder: longest-prefix-match forwarding table
//! plus the packet dispatch loop between substrate, source/sink, and
//! Router (§4.1).

mod forwarder;
mod table;

pub use forwarder::{Delivery, Forwarder, LinkedPacket, IDLE_SLEEP, QUEUE_CAPACITY};
pub use table::ForwardingTable;
