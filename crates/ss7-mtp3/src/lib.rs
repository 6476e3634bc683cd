//! MTP3: routing-label codec, link selection, link test, changeover and
//! changeback, inhibition, and network-management message handling.

pub mod adjacent_sp;
pub mod engine;
pub mod link3;
pub mod netmgmt;
pub mod route;
pub mod routing_label;

pub use adjacent_sp::{AdjacentSp, AdjacentSpState};
pub use engine::Mtp3;
pub use link3::{ChangeoverState, Mtp3Link, SentNetMsg};
pub use netmgmt::NetMgmtMessage;
pub use route::{Route, RouteState};
pub use routing_label::{RoutingLabel, Sio, UserPart, Variant};
