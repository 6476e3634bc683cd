//! Per-call state: the `got_sent_msg` bitset that gates the FSM, the
//! per-call timer table, and the handful of rules ("Call state",
//! "Dual seizure", "Unexpected messages") that decide what an incoming
//! message is allowed to do.

use ss7_scheduler::TimerId;

use crate::cause::Cause;
use crate::group_supervision::RangeAndStatus;
use crate::party_number::PartyNumber;

/// Which ISUP messages have been sent or received on this call so far.
/// Gates acceptance of later messages (e.g. an ACM is only meaningful
/// after an IAM was sent) rather than tracking a rigid state enum,
/// mirroring the source's single combined bitset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GotSentMsg(u64);

impl GotSentMsg {
    pub const SENT_IAM: u64 = 1 << 0;
    pub const SENT_ACM: u64 = 1 << 1;
    pub const SENT_CON: u64 = 1 << 2;
    pub const SENT_ANM: u64 = 1 << 3;
    pub const SENT_REL: u64 = 1 << 4;
    pub const SENT_RLC: u64 = 1 << 5;
    pub const SENT_RSC: u64 = 1 << 6;
    pub const SENT_BLO: u64 = 1 << 7;
    pub const SENT_UBL: u64 = 1 << 8;
    pub const SENT_CGB: u64 = 1 << 9;
    pub const SENT_CGU: u64 = 1 << 10;
    pub const SENT_GRS: u64 = 1 << 11;
    pub const SENT_SUS: u64 = 1 << 12;
    pub const SENT_RES: u64 = 1 << 13;
    pub const SENT_INR: u64 = 1 << 14;
    pub const SENT_FAR: u64 = 1 << 15;
    pub const SENT_FAA: u64 = 1 << 16;

    pub const GOT_IAM: u64 = 1 << 20;
    pub const GOT_ACM: u64 = 1 << 21;
    pub const GOT_CON: u64 = 1 << 22;
    pub const GOT_ANM: u64 = 1 << 23;
    pub const GOT_REL: u64 = 1 << 24;
    pub const GOT_RLC: u64 = 1 << 25;
    pub const GOT_RSC: u64 = 1 << 26;
    pub const GOT_BLO: u64 = 1 << 27;
    pub const GOT_UBL: u64 = 1 << 28;
    pub const GOT_CGB: u64 = 1 << 29;
    pub const GOT_CGU: u64 = 1 << 30;
    pub const GOT_GRS: u64 = 1 << 31;
    pub const GOT_SUS: u64 = 1 << 32;
    pub const GOT_RES: u64 = 1 << 33;
    pub const GOT_INR: u64 = 1 << 34;
    pub const GOT_FAR: u64 = 1 << 35;
    pub const GOT_FAA: u64 = 1 << 36;

    /// Bits that only record where a now-finished call cycle has been:
    /// once RLC completes the release, none of these block the circuit
    /// from going idle. Distinct from e.g. `SENT_BLO`, which stays set
    /// until a BLA actually acks it.
    pub const CALL_LIFECYCLE: u64 = Self::SENT_IAM
        | Self::GOT_IAM
        | Self::SENT_ACM
        | Self::GOT_ACM
        | Self::SENT_CON
        | Self::GOT_CON
        | Self::SENT_ANM
        | Self::GOT_ANM
        | Self::SENT_REL
        | Self::GOT_REL
        | Self::SENT_RLC
        | Self::GOT_RLC
        | Self::SENT_RSC
        | Self::GOT_RSC;

    pub fn empty() -> GotSentMsg {
        GotSentMsg(0)
    }

    pub fn contains(&self, bit: u64) -> bool {
        self.0 & bit != 0
    }

    pub fn insert(&mut self, bit: u64) {
        self.0 |= bit;
    }

    pub fn remove(&mut self, bit: u64) {
        self.0 &= !bit;
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Whether the call has exchanged enough signalling to be considered
    /// "connected" (answered): CON or ANM in either direction.
    pub fn is_connected(&self) -> bool {
        const CONNECTED: u64 =
            GotSentMsg::SENT_CON | GotSentMsg::SENT_ANM | GotSentMsg::GOT_CON | GotSentMsg::GOT_ANM;
        self.0 & CONNECTED != 0
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CallTimers {
    pub t1: Option<TimerId>,
    pub t2_t6: Option<TimerId>,
    pub t5: Option<TimerId>,
    pub t7: Option<TimerId>,
    pub t8: Option<TimerId>,
    pub t12_t13: Option<TimerId>,
    pub t14_t15: Option<TimerId>,
    pub t16_t17: Option<TimerId>,
    pub t18_t19: Option<TimerId>,
    pub t20_t21: Option<TimerId>,
    pub t22_t23: Option<TimerId>,
    pub t27: Option<TimerId>,
    pub t33: Option<TimerId>,
    pub t35: Option<TimerId>,
    pub digit: Option<TimerId>,
}

impl CallTimers {
    pub fn none_armed(&self) -> bool {
        self.t1.is_none()
            && self.t2_t6.is_none()
            && self.t5.is_none()
            && self.t7.is_none()
            && self.t8.is_none()
            && self.t12_t13.is_none()
            && self.t14_t15.is_none()
            && self.t16_t17.is_none()
            && self.t18_t19.is_none()
            && self.t20_t21.is_none()
            && self.t22_t23.is_none()
            && self.t27.is_none()
            && self.t33.is_none()
            && self.t35.is_none()
            && self.digit.is_none()
    }
}

/// What to do with an incoming message the call's FSM does not expect:
/// once connected, ignore rather than destabilize the speech path;
/// otherwise reset the circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnexpectedAction {
    Ignore,
    ResetCircuit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub cic: u16,
    pub dpc: u32,
    pub sls: u8,
    pub called: Option<PartyNumber>,
    pub calling: Option<PartyNumber>,
    pub connected_number: Option<PartyNumber>,
    pub redirecting: Option<PartyNumber>,
    pub original_called: Option<PartyNumber>,
    pub release_cause: Option<Cause>,
    pub got_sent: GotSentMsg,
    /// Shadow copy of the last CGB this (base-CIC) call sent, so the CGBA
    /// reply's range/status can be validated against what was asked for.
    pub sent_cgb_status: Option<RangeAndStatus>,
    /// Supervision-indicator byte of the last CGB sent, for retransmission.
    pub sent_cgb_ind: Option<u8>,
    /// Shadow copy of the last CGU this call sent.
    pub sent_cgu_status: Option<RangeAndStatus>,
    /// Supervision-indicator byte of the last CGU sent, for retransmission.
    pub sent_cgu_ind: Option<u8>,
    /// Range requested by the last GRS this call sent, validated against
    /// the GRA's range on receipt.
    pub sent_grs_endcic: Option<u8>,
}

impl Call {
    pub fn new(cic: u16, dpc: u32, sls: u8) -> Call {
        Call {
            cic,
            dpc,
            sls,
            called: None,
            calling: None,
            connected_number: None,
            redirecting: None,
            original_called: None,
            sent_cgb_status: None,
            sent_cgb_ind: None,
            sent_cgu_status: None,
            sent_cgu_ind: None,
            sent_grs_endcic: None,
            release_cause: None,
            got_sent: GotSentMsg::empty(),
        }
    }

    /// An ACM/CON is only meaningful after this end sent an IAM.
    pub fn accepts_backward_setup(&self) -> bool {
        self.got_sent.contains(GotSentMsg::SENT_IAM)
    }

    /// An RLC is only meaningful once a REL or RSC has been sent.
    pub fn accepts_rlc(&self) -> bool {
        self.got_sent.contains(GotSentMsg::SENT_REL) || self.got_sent.contains(GotSentMsg::SENT_RSC)
    }

    /// True once the call has moved far enough along that an REL it
    /// didn't send or request should be treated as a peer-initiated
    /// clear rather than noise.
    pub fn is_established(&self) -> bool {
        self.got_sent.contains(GotSentMsg::SENT_IAM) || self.got_sent.contains(GotSentMsg::GOT_IAM)
    }

    pub fn mark_sent(&mut self, bit: u64) {
        self.got_sent.insert(bit);
    }

    pub fn mark_received(&mut self, bit: u64) {
        self.got_sent.insert(bit);
    }

    pub fn clear_bit(&mut self, bit: u64) {
        self.got_sent.remove(bit);
    }

    /// Records that a FAR was sent on this call. The original handler had
    /// a dead `return` before this bookkeeping that made the success path
    /// unreachable; here the bookkeeping always runs once the FAR is
    /// actually written to the wire.
    pub fn mark_far_sent(&mut self) {
        self.mark_sent(GotSentMsg::SENT_FAR);
    }

    pub fn handle_unexpected(&self) -> UnexpectedAction {
        if self.got_sent.is_connected() {
            UnexpectedAction::Ignore
        } else {
            UnexpectedAction::ResetCircuit
        }
    }

    /// Dual seizure: both ends sent IAM for the same CIC at once. The end
    /// with the numerically higher point code keeps its call; the other
    /// must release and retry on a different circuit.
    pub fn wins_dual_seizure(own_pc: u32, remote_pc: u32) -> bool {
        own_pc > remote_pc
    }

    pub fn is_clear(&self, timers: &CallTimers) -> bool {
        self.got_sent.is_empty() && timers.none_armed()
    }

    /// Drops the call-lifecycle bits once RLC has completed a release,
    /// so the circuit can go idle even though it was fully set up.
    pub fn clear_released(&mut self) {
        self.got_sent.remove(GotSentMsg::CALL_LIFECYCLE);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acm_gated_on_sent_iam() {
        let mut call = Call::new(1, 100, 0);
        assert!(!call.accepts_backward_setup());
        call.mark_sent(GotSentMsg::SENT_IAM);
        assert!(call.accepts_backward_setup());
    }

    #[test]
    fn rlc_gated_on_rel_or_rsc() {
        let mut call = Call::new(1, 100, 0);
        assert!(!call.accepts_rlc());
        call.mark_sent(GotSentMsg::SENT_RSC);
        assert!(call.accepts_rlc());
    }

    #[test]
    fn unexpected_message_ignored_once_connected() {
        let mut call = Call::new(1, 100, 0);
        assert_eq!(call.handle_unexpected(), UnexpectedAction::ResetCircuit);
        call.mark_received(GotSentMsg::GOT_ANM);
        assert_eq!(call.handle_unexpected(), UnexpectedAction::Ignore);
    }

    #[test]
    fn higher_point_code_wins_dual_seizure() {
        assert!(Call::wins_dual_seizure(200, 100));
        assert!(!Call::wins_dual_seizure(100, 200));
    }

    #[test]
    fn far_sent_bookkeeping_is_reachable() {
        let mut call = Call::new(1, 100, 0);
        call.mark_far_sent();
        assert!(call.got_sent.contains(GotSentMsg::SENT_FAR));
    }

    #[test]
    fn clear_call_has_no_bits_and_no_timers() {
        let call = Call::new(1, 100, 0);
        let timers = CallTimers::default();
        assert!(call.is_clear(&timers));
    }
}
