//! MTP2: link-layer framing, alignment and sequenced retransmission.

pub mod link;
pub mod su;
pub mod timers;

pub use link::{AlignmentState, Link, LinkFailure, Mtp2Event};
pub use su::{LssuStatus, SignalUnit, SuHeader};
pub use timers::{Mtp2Timers, Variant};
