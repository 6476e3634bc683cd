//! Host callback interface: the handful of
//! entry points the session invokes back into the host application.
//! Registered once per session, never swapped mid-run.

/// Action hint attached to a `hangup` callback, requesting what the
/// stack should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HangupAction {
    None,
    Rel,
    Rsc,
    Rlc,
    FreeCall,
    ReeventIam,
}

/// The host's verdict on a CIC's real-world state, returned from `hangup`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HangupResult {
    CicNotExists,
    CicUsed,
    CicIdle,
}

pub trait HostCallbacks {
    /// Structured-logging sink for informational messages.
    fn message(&mut self, text: &str) {
        tracing::info!(target: "ss7_core::host", "{text}");
    }

    /// Structured-logging sink for errors.
    fn error(&mut self, text: &str) {
        tracing::error!(target: "ss7_core::host", "{text}");
    }

    /// Mark this CIC out of service locally.
    fn not_in_service(&mut self, cic: u16, dpc: u32);

    /// Ask the host to resolve the real-world state of a CIC before the
    /// stack acts on it.
    fn hangup(&mut self, cic: u16, dpc: u32, cause: Option<u8>, action: HangupAction) -> HangupResult;

    /// Invoked just before the stack frees a Call, so the host can clear
    /// any back-reference it is holding.
    fn call_null(&mut self, cic: u16, dpc: u32) {
        let _ = (cic, dpc);
    }
}
