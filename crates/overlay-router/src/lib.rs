pub mod ewma;
pub mod link;
pub mod route;
pub mod router;
pub mod wire;

pub use ewma::{Ewma, COST_ALPHA};
pub use link::{LinkState, LinkStats};
pub use route::{Route, RouteTable, UpdateOutcome};
pub use router::Router;
pub use wire::{RouterMessage, WireError};
