//! The MTP2 link: alignment state machine, FSN/BSN sequencing and
//! retransmission. One `Link` per signalling-link-code; owned by the MTP3
//! layer, driven synchronously by received signal units and timer expiry.

use std::collections::VecDeque;
use quanta::Instant;

use bytes::Bytes;
use ss7_scheduler::{Scheduler, TimerId};
use tracing::{debug, info, trace, warn};

use crate::su::{LssuStatus, SignalUnit, SuHeader};
use crate::timers::{Mtp2Timers, Variant};

/// A small, per-link scheduler: at most one of each timer is ever live.
const LINK_SCHED_CAPACITY: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignmentState {
    Idle,
    NotAligned,
    Aligned,
    Proving,
    AlignedReady,
    InService,
    Alarm,
    /// Administratively stopped; distinct from IDLE because it is reached
    /// only via an explicit deactivate, never by the alignment handshake.
    Deactivated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mtp2TimerKind {
    T1,
    T2,
    T3,
    T4,
    T7,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mtp2Event {
    LinkUp,
    LinkDown,
    Alarm,
}

/// A signal-unit-layer error reported by the driver side channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkFailure {
    Overrun,
    BadFcs,
    HdlcAbort,
}

struct Unacked {
    fsn: u8,
    sio: u8,
    sif: Bytes,
}

/// Identifies a sent/received SU's type for trace-log elision, so repeated
/// identical FISUs or LSSUs don't spam the log every idle poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SuKind {
    Fisu,
    Lssu(LssuStatus),
    Msu,
}

impl From<&SignalUnit> for SuKind {
    fn from(su: &SignalUnit) -> SuKind {
        match su {
            SignalUnit::Fisu { .. } => SuKind::Fisu,
            SignalUnit::Lssu { status, .. } => SuKind::Lssu(*status),
            SignalUnit::Msu { .. } => SuKind::Msu,
        }
    }
}

pub struct Link {
    pub slc: u8,
    pub dpc: u32,
    pub variant: Variant,
    pub timers: Mtp2Timers,
    pub zap_mtp2: bool,
    pub state: AlignmentState,

    fsn: u8,
    fib: bool,
    lastfsnacked: u8,
    our_bib: bool,

    tx_buf: VecDeque<Unacked>,
    tx_q: VecDeque<Unacked>,
    retransmit_pos: Option<usize>,

    ctrl_out: VecDeque<Bytes>,
    needs_write: bool,
    proving_emergency: bool,

    last_su_sent: Option<SuKind>,
    last_su_received: Option<SuKind>,

    sched: Scheduler<Mtp2TimerKind>,
    t1: Option<TimerId>,
    t2: Option<TimerId>,
    t3: Option<TimerId>,
    t4: Option<TimerId>,
    t7: Option<TimerId>,
}

impl Link {
    pub fn new(slc: u8, dpc: u32, variant: Variant, zap_mtp2: bool) -> Link {
        Link {
            slc,
            dpc,
            variant,
            timers: Mtp2Timers::for_variant(variant),
            zap_mtp2,
            state: AlignmentState::Idle,
            fsn: 127,
            fib: true,
            lastfsnacked: 127,
            our_bib: true,
            tx_buf: VecDeque::new(),
            tx_q: VecDeque::new(),
            retransmit_pos: None,
            ctrl_out: VecDeque::new(),
            needs_write: false,
            proving_emergency: false,
            last_su_sent: None,
            last_su_received: None,
            sched: Scheduler::new(LINK_SCHED_CAPACITY),
            t1: None,
            t2: None,
            t3: None,
            t4: None,
            t7: None,
        }
    }

    fn header(&self) -> SuHeader {
        SuHeader {
            bsn: self.lastfsnacked,
            bib: self.our_bib,
            fsn: self.fsn,
            fib: self.fib,
            li: 0,
        }
    }

    /// This link's own last-accepted FSN — the BSN value it is currently
    /// reporting to the peer. Changeover uses this to tell the peer which
    /// of its buffered MSUs this side actually got before the switch.
    pub fn last_accepted_fsn(&self) -> u8 {
        self.lastfsnacked
    }

    /// Logs a sent SU at trace level, eliding repeats of the same kind.
    fn log_su_sent(&mut self, su: &SignalUnit) {
        let kind = SuKind::from(su);
        if self.last_su_sent != Some(kind) {
            trace!(slc = self.slc, su = ?su, "mtp2 tx");
        }
        self.last_su_sent = Some(kind);
    }

    /// Logs a received SU at trace level, eliding repeats of the same kind.
    fn log_su_received(&mut self, su: &SignalUnit) {
        let kind = SuKind::from(su);
        if self.last_su_received != Some(kind) {
            trace!(slc = self.slc, su = ?su, "mtp2 rx");
        }
        self.last_su_received = Some(kind);
    }

    fn send_lssu(&mut self, status: LssuStatus) {
        let su = SignalUnit::Lssu {
            header: self.header(),
            status,
        };
        self.log_su_sent(&su);
        let bytes = su.encode();
        self.ctrl_out.push_back(bytes);
        self.needs_write = true;
    }

    fn send_fisu(&mut self) {
        let su = SignalUnit::Fisu {
            header: self.header(),
        };
        self.log_su_sent(&su);
        let bytes = su.encode();
        self.ctrl_out.push_back(bytes);
        self.needs_write = true;
    }

    /// If zap-MTP2 is set, resets sequencing to the values the source uses
    /// when an in-service link is restarted.
    fn reset_sequencing(&mut self) {
        self.fsn = 127;
        self.fib = true;
        self.lastfsnacked = 127;
        self.our_bib = true;
        self.tx_buf.clear();
        self.tx_q.clear();
        self.retransmit_pos = None;
    }

    fn proving_period(&self) -> std::time::Duration {
        if self.proving_emergency {
            self.timers.t4_emergency
        } else {
            self.timers.t4_normal
        }
    }

    fn arm(&mut self, now: Instant, kind: Mtp2TimerKind, dur: std::time::Duration) -> Option<TimerId> {
        match self.sched.schedule(now, dur, kind) {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(slc = self.slc, error = %e, "mtp2 timer table exhausted");
                None
            }
        }
    }

    pub fn start(&mut self, now: Instant) -> Vec<Mtp2Event> {
        info!(slc = self.slc, "mtp2 link start");
        self.state = AlignmentState::NotAligned;
        self.send_lssu(LssuStatus::Sio);
        self.t2 = self.arm(now, Mtp2TimerKind::T2, self.timers.t2);
        Vec::new()
    }

    pub fn deactivate(&mut self) -> Vec<Mtp2Event> {
        self.sched.cancel(&mut self.t1);
        self.sched.cancel(&mut self.t2);
        self.sched.cancel(&mut self.t3);
        self.sched.cancel(&mut self.t4);
        self.sched.cancel(&mut self.t7);
        let was_up = self.state == AlignmentState::InService;
        self.state = AlignmentState::Deactivated;
        self.reset_sequencing();
        if was_up {
            vec![Mtp2Event::LinkDown]
        } else {
            Vec::new()
        }
    }

    pub fn on_failure(&mut self, now: Instant, failure: LinkFailure) -> Vec<Mtp2Event> {
        warn!(slc = self.slc, ?failure, "mtp2 link failure");
        self.go_idle(now)
    }

    fn go_idle(&mut self, now: Instant) -> Vec<Mtp2Event> {
        let was_up = self.state == AlignmentState::InService;
        self.sched.cancel(&mut self.t1);
        self.sched.cancel(&mut self.t3);
        self.sched.cancel(&mut self.t4);
        self.sched.cancel(&mut self.t7);
        self.reset_sequencing();
        self.state = AlignmentState::NotAligned;
        self.send_lssu(LssuStatus::Sio);
        self.t2 = self.arm(now, Mtp2TimerKind::T2, self.timers.t2);
        if was_up {
            vec![Mtp2Event::LinkDown]
        } else {
            Vec::new()
        }
    }

    /// Handles one received signal unit. Returns emitted link-level events;
    /// any accepted MSU payload is returned separately for the caller to
    /// pass up to MTP3.
    pub fn on_su_received(&mut self, now: Instant, su: SignalUnit) -> (Vec<Mtp2Event>, Option<Bytes>) {
        self.log_su_received(&su);
        let mut events = Vec::new();
        match &su {
            SignalUnit::Lssu { status, .. } => {
                events.extend(self.on_lssu(now, *status));
            }
            SignalUnit::Fisu { header } => {
                self.on_ack_bsn(header.bsn, header.bib);
                if self.state == AlignmentState::AlignedReady {
                    events.extend(self.enter_in_service(now));
                }
            }
            SignalUnit::Msu { header, sio, sif } => {
                self.on_ack_bsn(header.bsn, header.bib);
                if self.state != AlignmentState::InService {
                    trace!(slc = self.slc, "dropping msu on link not in service");
                    return (events, None);
                }
                let expected_fsn = self.lastfsnacked.wrapping_add(1) & 0x7f;
                if header.fib != self.our_bib {
                    // Peer hasn't yet honoured our retransmission request.
                } else if header.fsn == expected_fsn {
                    self.lastfsnacked = header.fsn;
                    let mut payload = Vec::with_capacity(1 + sif.len());
                    payload.push(*sio);
                    payload.extend_from_slice(sif);
                    return (events, Some(Bytes::from(payload)));
                } else if header.fsn == self.lastfsnacked {
                    debug!(slc = self.slc, fsn = header.fsn, "duplicate msu dropped");
                } else {
                    debug!(slc = self.slc, fsn = header.fsn, expected_fsn, "msu gap detected, requesting retransmission");
                    self.our_bib = !self.our_bib;
                }
            }
        }
        (events, None)
    }

    fn on_lssu(&mut self, now: Instant, status: LssuStatus) -> Vec<Mtp2Event> {
        use AlignmentState::*;
        let mut events = Vec::new();
        match (self.state, status) {
            (NotAligned, LssuStatus::Sin) | (NotAligned, LssuStatus::Sie) | (NotAligned, LssuStatus::Sio) => {
                self.proving_emergency = matches!(status, LssuStatus::Sie);
                self.state = Proving;
                self.sched.cancel(&mut self.t2);
                let dur = self.proving_period();
                self.t4 = self.arm(now, Mtp2TimerKind::T4, dur);
            }
            (Aligned, LssuStatus::Sin) | (Aligned, LssuStatus::Sie) => {
                self.proving_emergency = matches!(status, LssuStatus::Sie);
                self.state = Proving;
                let dur = self.proving_period();
                self.t4 = self.arm(now, Mtp2TimerKind::T4, dur);
            }
            (Proving, LssuStatus::Sios) => {
                self.sched.cancel(&mut self.t4);
                self.state = Idle;
            }
            (InService, LssuStatus::Sios) | (InService, LssuStatus::Sio) => {
                events.extend(self.go_idle(now));
            }
            _ => {}
        }
        events
    }

    fn enter_in_service(&mut self, _now: Instant) -> Vec<Mtp2Event> {
        self.sched.cancel(&mut self.t1);
        self.state = AlignmentState::InService;
        info!(slc = self.slc, "mtp2 link in service");
        vec![Mtp2Event::LinkUp]
    }

    /// Advances `lastfsnacked`/`tx_buf` given the peer's backward sequence
    /// number and negative-ack bit.
    fn on_ack_bsn(&mut self, bsn: u8, bib: bool) {
        self.update_txbuf(bsn);
        if bib != self.fib {
            self.fib = !self.fib;
            self.retransmit_pos = if self.tx_buf.is_empty() { None } else { Some(0) };
        }
    }

    fn update_txbuf(&mut self, upto: u8) {
        let mut popped = 0usize;
        while let Some(front) = self.tx_buf.front() {
            if front.fsn == upto {
                self.tx_buf.pop_front();
                popped += 1;
                break;
            }
            if seq_lt(front.fsn, upto) {
                self.tx_buf.pop_front();
                popped += 1;
            } else {
                break;
            }
        }
        // Entries drop off the front of tx_buf here, so a retransmit cursor
        // mid-buffer needs to shift down by the same count or it'll end up
        // pointing past the entry it was on.
        if popped > 0 {
            if let Some(pos) = self.retransmit_pos {
                self.retransmit_pos = Some(pos.saturating_sub(popped));
            }
        }
        if self.tx_buf.is_empty() {
            self.sched.cancel(&mut self.t7);
            self.retransmit_pos = None;
        }
    }

    /// Snapshots every unacked-or-queued MSU in send order and clears both
    /// buffers, for handoff to a replacement link during changeover. Keeps
    /// each entry's original FSN so the far end's changeover ack can say
    /// which ones it already has.
    pub fn snapshot_unsent(&mut self) -> Vec<(u8, u8, Bytes)> {
        let mut out: Vec<(u8, u8, Bytes)> = self
            .tx_buf
            .drain(..)
            .map(|u| (u.fsn, u.sio, u.sif))
            .chain(self.tx_q.drain(..).map(|u| (u.fsn, u.sio, u.sif)))
            .collect();
        self.retransmit_pos = None;
        self.sched.cancel(&mut self.t7);
        out.shrink_to_fit();
        out
    }

    /// Requeues MSUs handed off from a failed link, preserving order.
    pub fn requeue_msus(&mut self, now: Instant, msus: Vec<(u8, Bytes)>) {
        for (sio, sif) in msus {
            self.queue_msu(now, sio, sif);
        }
    }

    /// Queues an MSU for eventual transmission, assigning it the next FSN.
    pub fn queue_msu(&mut self, now: Instant, sio: u8, sif: Bytes) {
        self.fsn = self.fsn.wrapping_add(1) & 0x7f;
        self.tx_q.push_back(Unacked { fsn: self.fsn, sio, sif });
        if self.t7.is_none() {
            self.t7 = self.arm(now, Mtp2TimerKind::T7, self.timers.t7);
        }
    }

    /// Pops the next outgoing SU, giving retransmissions priority over the
    /// control queue, and the control queue priority over fresh MSUs.
    pub fn poll_output(&mut self) -> Option<Bytes> {
        if let Some(pos) = self.retransmit_pos {
            if let Some(entry) = self.tx_buf.get(pos) {
                let su = SignalUnit::Msu {
                    header: SuHeader {
                        fsn: entry.fsn,
                        fib: self.fib,
                        ..self.header()
                    },
                    sio: entry.sio,
                    sif: entry.sif.clone(),
                };
                let next = pos + 1;
                self.retransmit_pos = if next < self.tx_buf.len() { Some(next) } else { None };
                self.log_su_sent(&su);
                return Some(su.encode());
            }
            self.retransmit_pos = None;
        }
        if let Some(bytes) = self.ctrl_out.pop_front() {
            return Some(bytes);
        }
        if let Some(entry) = self.tx_q.pop_front() {
            let header = SuHeader {
                fsn: entry.fsn,
                ..self.header()
            };
            let su = SignalUnit::Msu {
                header,
                sio: entry.sio,
                sif: entry.sif.clone(),
            };
            self.tx_buf.push_back(entry);
            self.log_su_sent(&su);
            return Some(su.encode());
        }
        if self.state == AlignmentState::InService || self.state == AlignmentState::AlignedReady {
            self.send_fisu();
            return self.ctrl_out.pop_front();
        }
        None
    }

    pub fn run_due_timers(&mut self, now: Instant) -> Vec<Mtp2Event> {
        let due = self.sched.run_due(now);
        let mut events = Vec::new();
        for (id, kind) in due {
            events.extend(self.on_timer(now, id, kind));
        }
        events
    }

    fn on_timer(&mut self, now: Instant, id: TimerId, kind: Mtp2TimerKind) -> Vec<Mtp2Event> {
        match kind {
            Mtp2TimerKind::T1 => {
                if self.t1 == Some(id) {
                    self.t1 = None;
                }
                self.go_idle(now)
            }
            Mtp2TimerKind::T2 => {
                if self.t2 == Some(id) {
                    self.t2 = None;
                }
                if self.state == AlignmentState::NotAligned {
                    self.send_lssu(LssuStatus::Sio);
                    self.send_lssu(LssuStatus::Sios);
                    self.t2 = self.arm(now, Mtp2TimerKind::T2, self.timers.t2);
                }
                Vec::new()
            }
            Mtp2TimerKind::T3 => {
                if self.t3 == Some(id) {
                    self.t3 = None;
                }
                Vec::new()
            }
            Mtp2TimerKind::T4 => {
                if self.t4 == Some(id) {
                    self.t4 = None;
                }
                if self.state == AlignmentState::Proving {
                    self.state = AlignmentState::AlignedReady;
                    self.t1 = self.arm(now, Mtp2TimerKind::T1, self.timers.t1);
                    self.send_fisu();
                }
                Vec::new()
            }
            Mtp2TimerKind::T7 => {
                if self.t7 == Some(id) {
                    self.t7 = None;
                }
                if !self.tx_buf.is_empty() {
                    self.go_idle(now)
                } else {
                    Vec::new()
                }
            }
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.sched.next_deadline()
    }

    pub fn is_in_service(&self) -> bool {
        self.state == AlignmentState::InService
    }
}

fn seq_lt(a: u8, b: u8) -> bool {
    ((a as i16 - b as i16) & 0x7f) as u8 > 64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link() -> Link {
        Link::new(0, 1, Variant::Itu, false)
    }

    #[test]
    fn start_sends_sio_and_arms_t2() {
        let mut l = link();
        let t0 = Instant::now();
        l.start(t0);
        assert_eq!(l.state, AlignmentState::NotAligned);
        let out = l.poll_output().expect("sio");
        let su = SignalUnit::decode(&out).unwrap();
        assert!(matches!(su, SignalUnit::Lssu { status: LssuStatus::Sio, .. }));
    }

    #[test]
    fn alignment_handshake_reaches_in_service() {
        let mut l = link();
        let t0 = Instant::now();
        l.start(t0);
        let _ = l.poll_output();

        let (events, _) = l.on_su_received(
            t0,
            SignalUnit::Lssu {
                header: SuHeader { bsn: 0, bib: false, fsn: 0, fib: false, li: 1 },
                status: LssuStatus::Sin,
            },
        );
        assert!(events.is_empty());
        assert_eq!(l.state, AlignmentState::Proving);

        let due_at = t0 + l.timers.t4_normal;
        let events = l.run_due_timers(due_at);
        assert!(events.is_empty());
        assert_eq!(l.state, AlignmentState::AlignedReady);

        let (events, _) = l.on_su_received(
            due_at,
            SignalUnit::Fisu {
                header: SuHeader { bsn: 0, bib: false, fsn: 0, fib: false, li: 0 },
            },
        );
        assert_eq!(events, vec![Mtp2Event::LinkUp]);
        assert_eq!(l.state, AlignmentState::InService);
    }

    #[test]
    fn sios_while_proving_returns_to_idle() {
        let mut l = link();
        let t0 = Instant::now();
        l.start(t0);
        l.on_su_received(
            t0,
            SignalUnit::Lssu {
                header: SuHeader { bsn: 0, bib: false, fsn: 0, fib: false, li: 1 },
                status: LssuStatus::Sin,
            },
        );
        assert_eq!(l.state, AlignmentState::Proving);
        let (events, _) = l.on_su_received(
            t0,
            SignalUnit::Lssu {
                header: SuHeader { bsn: 0, bib: false, fsn: 0, fib: false, li: 1 },
                status: LssuStatus::Sios,
            },
        );
        assert!(events.is_empty());
        assert_eq!(l.state, AlignmentState::Idle);
    }

    fn bring_up(l: &mut Link, t0: Instant) {
        l.start(t0);
        let _ = l.poll_output();
        l.on_su_received(
            t0,
            SignalUnit::Lssu {
                header: SuHeader { bsn: 0, bib: false, fsn: 0, fib: false, li: 1 },
                status: LssuStatus::Sin,
            },
        );
        let due_at = t0 + l.timers.t4_normal;
        l.run_due_timers(due_at);
        l.on_su_received(
            due_at,
            SignalUnit::Fisu {
                header: SuHeader { bsn: 0, bib: false, fsn: 0, fib: false, li: 0 },
            },
        );
    }

    #[test]
    fn in_service_link_drops_sio_and_realigns() {
        let mut l = link();
        let t0 = Instant::now();
        bring_up(&mut l, t0);
        assert!(l.is_in_service());
        let (events, _) = l.on_su_received(
            t0,
            SignalUnit::Lssu {
                header: SuHeader { bsn: 0, bib: false, fsn: 0, fib: false, li: 1 },
                status: LssuStatus::Sio,
            },
        );
        assert_eq!(events, vec![Mtp2Event::LinkDown]);
        assert_eq!(l.state, AlignmentState::NotAligned);
    }

    #[test]
    fn msu_accepted_in_order_and_duplicate_dropped() {
        let mut l = link();
        let t0 = Instant::now();
        bring_up(&mut l, t0);
        let expected = l.lastfsnacked.wrapping_add(1) & 0x7f;
        let su = SignalUnit::Msu {
            header: SuHeader { bsn: 0, bib: l.our_bib, fsn: expected, fib: false, li: 0 },
            sio: 0x45,
            sif: Bytes::from_static(b"hello"),
        };
        let (_, payload) = l.on_su_received(t0, su.clone());
        assert!(payload.is_some());
        let (_, payload2) = l.on_su_received(t0, su);
        assert!(payload2.is_none(), "duplicate fsn must be dropped silently");
    }

    #[test]
    fn gap_toggles_our_bib() {
        let mut l = link();
        let t0 = Instant::now();
        bring_up(&mut l, t0);
        let far_fsn = l.lastfsnacked.wrapping_add(5) & 0x7f;
        let bib_before = l.our_bib;
        let su = SignalUnit::Msu {
            header: SuHeader { bsn: 0, bib: l.our_bib, fsn: far_fsn, fib: false, li: 0 },
            sio: 0x45,
            sif: Bytes::from_static(b"x"),
        };
        let (_, payload) = l.on_su_received(t0, su);
        assert!(payload.is_none());
        assert_ne!(l.our_bib, bib_before);
    }

    #[test]
    fn deactivate_from_in_service_emits_link_down() {
        let mut l = link();
        let t0 = Instant::now();
        bring_up(&mut l, t0);
        let events = l.deactivate();
        assert_eq!(events, vec![Mtp2Event::LinkDown]);
        assert_eq!(l.state, AlignmentState::Deactivated);
    }
}
