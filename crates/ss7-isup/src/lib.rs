pub mod bcd;
pub mod call;
pub mod cause;
pub mod event;
pub mod group_supervision;
pub mod message;
pub mod params;
pub mod party_number;
pub mod timers;

pub use call::{Call, CallTimers, GotSentMsg, UnexpectedAction};
pub use cause::Cause;
pub use event::Ss7Event;
pub use group_supervision::RangeAndStatus;
pub use message::{IsupMessage, MessageType};
pub use params::Parameter;
pub use party_number::PartyNumber;
pub use timers::{IsupTimers, TimerDuration, Variant};
