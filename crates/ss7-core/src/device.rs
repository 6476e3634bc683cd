//! The byte-oriented link device: a non-blocking handle
//! delivering exactly one HDLC frame per read, with FCS already
//! stripped, plus a side-channel for driver-reported link events.

use bytes::Bytes;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceEvent {
    Overrun,
    BadFcs,
    HdlcAbort,
}

pub trait Device: Send {
    /// Returns the next framed signal unit, or `None` on a short read
    /// (the caller retries on the next poll cycle).
    fn try_read(&mut self) -> std::io::Result<Option<Bytes>>;

    fn try_write(&mut self, frame: &[u8]) -> std::io::Result<()>;

    /// Drains one driver-reported event, if any. Unknown/unrecognised
    /// events are the driver's concern to filter; this interface only
    /// ever reports `DeviceEvent`'s three variants.
    fn poll_event(&mut self) -> Option<DeviceEvent>;
}

pub(crate) fn to_link_failure(event: DeviceEvent) -> ss7_mtp2::LinkFailure {
    match event {
        DeviceEvent::Overrun => ss7_mtp2::LinkFailure::Overrun,
        DeviceEvent::BadFcs => ss7_mtp2::LinkFailure::BadFcs,
        DeviceEvent::HdlcAbort => ss7_mtp2::LinkFailure::HdlcAbort,
    }
}
