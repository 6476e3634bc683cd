//! Host-visible events emitted onto the session's event ring.

use bytes::Bytes;

use crate::message::MessageType;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ss7Event {
    /// An ISUP message arrived for a call and was accepted by the FSM.
    Message { cic: u16, dpc: u32, message_type: MessageType },
    /// A digit timer expired before a complete called-party number was
    /// received (overlap dialling).
    DigitTimeout { cic: u16, dpc: u32 },
    /// An unexpected/unhandled ISUP message forced a circuit reset.
    UnexpectedMessage { cic: u16, dpc: u32, raw: Bytes },
    /// A link reached MTP2 IN-SERVICE.
    Mtp2LinkUp { slc: u8 },
    /// A link left MTP2 IN-SERVICE.
    Mtp2LinkDown { slc: u8 },
    /// The whole linkset transitioned to UP (at least one adjacent SP up).
    Ss7Up,
    /// The whole linkset transitioned to DOWN (no adjacent SP up).
    Ss7Down,
}
