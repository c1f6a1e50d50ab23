//! Chord-style distributed hash table ring node: key/value storage with
//! split-on-join range partition and transfer-on-leave.

pub mod error;
pub mod hash;
pub mod node;
pub mod node_info;
pub mod route;
pub mod substrate;
pub mod wire;

pub use error::{DhtError, Result};
pub use hash::hashit;
pub use node::{DhtNode, IDLE_SLEEP, RING_SIZE};
pub use node_info::NodeInfo;
pub use route::RouteTable;
pub use substrate::{AddressedSubstrate, MockAddressedSubstrate, UdpAddressedSubstrate};
pub use wire::{DhtPacket, PacketKind, WireError, MAGIC};
