//! MTP3-level state layered on an MTP2 link: inhibition, changeover and
//! the Q.707 link-test handshake.

use bytes::Bytes;
use ss7_mtp2::Link as Mtp2Link;
use ss7_scheduler::TimerId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeoverState {
    None,
    Initiated,
    InProgress,
    Completed,
    ChangebackInitiated,
    Changeback,
}

/// Net-message SENT bitset. The source reuses the `SENT_CBD` bit value for
/// `SENT_LFU`; here each message gets its own bit so the two are
/// independently observable (see DESIGN.md).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SentNetMsg(u16);

impl SentNetMsg {
    pub const SENT_COO: SentNetMsg = SentNetMsg(0x0001);
    pub const SENT_ECO: SentNetMsg = SentNetMsg(0x0002);
    pub const SENT_CBD: SentNetMsg = SentNetMsg(0x0004);
    pub const SENT_LIN: SentNetMsg = SentNetMsg(0x0008);
    pub const SENT_LUN: SentNetMsg = SentNetMsg(0x0010);
    pub const SENT_LFU: SentNetMsg = SentNetMsg(0x0020);
    pub const SENT_LLT: SentNetMsg = SentNetMsg(0x0040);

    pub fn empty() -> Self {
        SentNetMsg(0)
    }

    pub fn contains(&self, other: SentNetMsg) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: SentNetMsg) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: SentNetMsg) {
        self.0 &= !other.0;
    }
}

pub struct Mtp3Link {
    pub mtp2: Mtp2Link,
    pub inhibit_local: bool,
    pub inhibit_remote: bool,
    pub changeover: ChangeoverState,
    pub slt_passed: bool,
    pub q707_fail_count: u8,
    pub sent: SentNetMsg,
    /// Snapshot taken when changeover begins: MSUs awaiting handoff to the
    /// replacement link once COA names the last FSN the peer accepted.
    pub co_saved: Vec<(u8, u8, Bytes)>,
    pub co_last_fsn_received: Option<u8>,
    /// MSUs held while this link is changed back, flushed on CBA.
    pub cb_buf: Vec<(u8, Bytes)>,
    pub q707_t1: Option<TimerId>,
    pub q707_t2: Option<TimerId>,
    pub changeover_t2: Option<TimerId>,
    pub changeback_t3: Option<TimerId>,
    pub changeback_t4: Option<TimerId>,
    pub changeback_t5: Option<TimerId>,
    pub inhibit_t12: Option<TimerId>,
    pub inhibit_t14: Option<TimerId>,
    pub inhibit_t22: Option<TimerId>,
    pub inhibit_t23: Option<TimerId>,
}

impl Mtp3Link {
    pub fn new(mtp2: Mtp2Link) -> Mtp3Link {
        Mtp3Link {
            mtp2,
            inhibit_local: false,
            inhibit_remote: false,
            changeover: ChangeoverState::None,
            slt_passed: false,
            q707_fail_count: 0,
            sent: SentNetMsg::empty(),
            co_saved: Vec::new(),
            co_last_fsn_received: None,
            cb_buf: Vec::new(),
            q707_t1: None,
            q707_t2: None,
            changeover_t2: None,
            changeback_t3: None,
            changeback_t4: None,
            changeback_t5: None,
            inhibit_t12: None,
            inhibit_t14: None,
            inhibit_t22: None,
            inhibit_t23: None,
        }
    }

    pub fn slc(&self) -> u8 {
        self.mtp2.slc
    }

    pub fn dpc(&self) -> u32 {
        self.mtp2.dpc
    }

    pub fn inhibited(&self) -> bool {
        self.inhibit_local || self.inhibit_remote
    }

    /// A link can carry direct traffic only when in service at MTP2, not
    /// inhibited, and not mid-changeover.
    pub fn available(&self) -> bool {
        self.mtp2.is_in_service()
            && !self.inhibited()
            && matches!(self.changeover, ChangeoverState::None | ChangeoverState::Changeback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ss7_mtp2::Variant;

    #[test]
    fn sent_bits_are_independent() {
        let mut sent = SentNetMsg::empty();
        sent.insert(SentNetMsg::SENT_CBD);
        assert!(sent.contains(SentNetMsg::SENT_CBD));
        assert!(!sent.contains(SentNetMsg::SENT_LFU));
        sent.insert(SentNetMsg::SENT_LFU);
        assert!(sent.contains(SentNetMsg::SENT_CBD));
        assert!(sent.contains(SentNetMsg::SENT_LFU));
        sent.remove(SentNetMsg::SENT_CBD);
        assert!(!sent.contains(SentNetMsg::SENT_CBD));
        assert!(sent.contains(SentNetMsg::SENT_LFU));
    }

    #[test]
    fn link_unavailable_while_changeover_in_progress() {
        let mut link = Mtp3Link::new(Mtp2Link::new(0, 1, Variant::Itu, false));
        link.changeover = ChangeoverState::InProgress;
        assert!(!link.available());
        link.changeover = ChangeoverState::None;
        assert!(!link.available(), "still not in service at mtp2");
    }
}
