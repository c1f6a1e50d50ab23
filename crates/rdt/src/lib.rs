pub mod error;
pub mod receiver;
pub mod sender;
pub mod seq;
pub mod transport;
pub mod wire;

pub use error::{RdtError, Result};
pub use receiver::Receiver;
pub use sender::{AckEffect, Sender};
pub use transport::{Rdt, IDLE_SLEEP, QUEUE_CAPACITY};
pub use wire::{RdtPacket, MAX_WINDOW};
