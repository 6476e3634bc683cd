//! The MTP3 engine: link selection, changeover/changeback and network
//! management, shared across all links of one session.

use quanta::Instant;
use std::time::Duration;

use bytes::Bytes;
use ss7_scheduler::{Scheduler, TimerId};
use tracing::{debug, info, warn};

use crate::adjacent_sp::{AdjacentSp, AdjacentSpState};
use crate::link3::{ChangeoverState, Mtp3Link, SentNetMsg};
use crate::netmgmt::{NetMgmtMessage, SLT_TEST_PATTERN};
use crate::route::RouteState;
use crate::routing_label::Variant;

const Q707_T1: Duration = Duration::from_millis(8_200);
const Q707_T2: Duration = Duration::from_millis(30_000);
const CHANGEOVER_T2: Duration = Duration::from_millis(1_400);
const ROUTE_T6: Duration = Duration::from_millis(1_400);
const ROUTE_T10: Duration = Duration::from_millis(30_000);
const CHANGEBACK_T3: Duration = Duration::from_millis(500);
const CHANGEBACK_T4: Duration = Duration::from_millis(1_000);
const CHANGEBACK_T5: Duration = Duration::from_millis(1_000);
const INHIBIT_T12: Duration = Duration::from_millis(2_500);
const INHIBIT_T14: Duration = Duration::from_millis(2_500);
const INHIBIT_T22: Duration = Duration::from_millis(30_000);
const INHIBIT_T23: Duration = Duration::from_millis(8_200);
const ADJ_T19: Duration = Duration::from_millis(2_000);
const ADJ_T21: Duration = Duration::from_millis(5_000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mtp3Event {
    Q707T1(u8),
    Q707T2(u8),
    ChangeoverT2(u8),
    ChangebackT3(u8),
    ChangebackT4(u8),
    ChangebackT5(u8),
    InhibitT12(u8),
    InhibitT14(u8),
    InhibitT22(u8),
    InhibitT23(u8),
    RouteT6 { adj_dpc: u32, route_dpc: u32 },
    RouteT10 { adj_dpc: u32, route_dpc: u32 },
    AdjT19(u32),
    AdjT21(u32),
}

pub struct Mtp3 {
    pub variant: Variant,
    pub own_pc: u32,
    pub sls_shift: u8,
    pub links: Vec<Mtp3Link>,
    pub adjacent_sps: Vec<AdjacentSp>,
    sched: Scheduler<Mtp3Event>,
}

impl Mtp3 {
    pub fn new(variant: Variant, own_pc: u32, sls_shift: u8) -> Mtp3 {
        Mtp3 {
            variant,
            own_pc,
            sls_shift,
            links: Vec::new(),
            adjacent_sps: Vec::new(),
            sched: Scheduler::new(256),
        }
    }

    pub fn add_link(&mut self, link: Mtp3Link) -> usize {
        let dpc = link.dpc();
        self.links.push(link);
        self.adjacent_sp_mut(dpc);
        self.links.len() - 1
    }

    pub fn adjacent_sp_mut(&mut self, dpc: u32) -> &mut AdjacentSp {
        if let Some(idx) = self.adjacent_sps.iter().position(|sp| sp.dpc == dpc) {
            &mut self.adjacent_sps[idx]
        } else {
            self.adjacent_sps.push(AdjacentSp::new(dpc));
            self.adjacent_sps.last_mut().unwrap()
        }
    }

    pub fn adjacent_sp(&self, dpc: u32) -> Option<&AdjacentSp> {
        self.adjacent_sps.iter().find(|sp| sp.dpc == dpc)
    }

    fn route_state_for(&self, dpc: u32) -> RouteState {
        for sp in &self.adjacent_sps {
            if let Some(route) = sp.route(dpc) {
                return route.state;
            }
        }
        RouteState::Tfa
    }

    /// Link selection for egress: primary pick by `(sls >> shift) mod
    /// numlinks`, falling back to a linear scan for the first available
    /// link if the primary is unusable or the route to `dpc` is blocked.
    pub fn select_link(&self, sls: u8, dpc: u32) -> Option<usize> {
        if self.links.is_empty() {
            return None;
        }
        if self.route_state_for(dpc) == RouteState::Tfp {
            return None;
        }
        let primary = (sls as usize >> self.sls_shift) % self.links.len();
        if self.links[primary].available() && self.links[primary].dpc() == dpc {
            return Some(primary);
        }
        self.links
            .iter()
            .position(|l| l.available() && l.dpc() == dpc)
    }

    /// This side's own last-accepted FSN on `slc`, for a COA reply telling
    /// the peer how far to trim its changeover-saved traffic.
    pub fn last_accepted_fsn(&self, slc: u8) -> Option<u8> {
        self.links.iter().find(|l| l.slc() == slc).map(|l| l.mtp2.last_accepted_fsn())
    }

    fn arm(&mut self, now: Instant, ev: Mtp3Event, dur: Duration) -> Option<TimerId> {
        match self.sched.schedule(now, dur, ev) {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(error = %e, "mtp3 timer table exhausted");
                None
            }
        }
    }

    /// Called once a link reaches MTP2 IN-SERVICE: kicks off the Q.707
    /// link test.
    pub fn on_link_in_service(&mut self, now: Instant, slc: u8) -> Vec<Bytes> {
        let idx = match self.links.iter().position(|l| l.slc() == slc) {
            Some(i) => i,
            None => return Vec::new(),
        };
        self.links[idx].q707_t1 = self.arm(now, Mtp3Event::Q707T1(slc), Q707_T1);
        let sltm = NetMgmtMessage::Sltm {
            pattern: Bytes::from_static(SLT_TEST_PATTERN),
        };
        vec![sltm.encode()]
    }

    /// Called on receipt of SLTA for `slc` with a matching test pattern.
    pub fn on_slta_received(&mut self, now: Instant, slc: u8) -> Vec<Bytes> {
        let idx = match self.links.iter().position(|l| l.slc() == slc) {
            Some(i) => i,
            None => return Vec::new(),
        };
        self.sched.cancel(&mut self.links[idx].q707_t1);
        let was_recovering = self.links[idx].changeover == ChangeoverState::Completed;
        self.links[idx].slt_passed = true;
        self.links[idx].q707_fail_count = 0;
        self.links[idx].q707_t2 = self.arm(now, Mtp3Event::Q707T2(slc), Q707_T2);

        let mut out = Vec::new();
        if was_recovering {
            info!(slc, "link slt passes again, initiating changeback");
            out.extend(self.initiate_changeback(now, slc));
        }

        let dpc = self.links[idx].dpc();
        let first_pass = self.adjacent_sp_mut(dpc).on_first_link_slt_pass();
        if first_pass {
            info!(slc, dpc, "first link slt pass, sending tra");
            self.adjacent_sp_mut(dpc).on_tra_sent();
            let t19 = self.arm(now, Mtp3Event::AdjT19(dpc), ADJ_T19);
            let needs_t21 = !self.adjacent_sp_mut(dpc).tra_got;
            let t21 = if needs_t21 { self.arm(now, Mtp3Event::AdjT21(dpc), ADJ_T21) } else { None };
            let sp = self.adjacent_sp_mut(dpc);
            sp.t19 = t19;
            if needs_t21 {
                sp.t21 = t21;
            }
            out.push(NetMgmtMessage::Tra.encode());
        }
        out
    }

    pub fn on_tra_received(&mut self, dpc: u32) {
        self.adjacent_sp_mut(dpc).on_tra_received();
        if let Some(idx) = self.adjacent_sps.iter().position(|sp| sp.dpc == dpc) {
            self.sched.cancel(&mut self.adjacent_sps[idx].t21);
        }
    }

    /// Q.707 T1 expiry: two consecutive failures declare the link down and
    /// initiate changeover.
    fn on_q707_t1_expiry(&mut self, now: Instant, slc: u8) -> Vec<Bytes> {
        let idx = match self.links.iter().position(|l| l.slc() == slc) {
            Some(i) => i,
            None => return Vec::new(),
        };
        self.links[idx].q707_fail_count += 1;
        if self.links[idx].q707_fail_count >= 2 {
            self.links[idx].slt_passed = false;
            return self.initiate_changeover(now, slc);
        }
        let sltm = NetMgmtMessage::Sltm {
            pattern: Bytes::from_static(SLT_TEST_PATTERN),
        };
        self.links[idx].q707_t1 = self.arm(now, Mtp3Event::Q707T1(slc), Q707_T1);
        vec![sltm.encode()]
    }

    /// Snapshots the failed link's traffic and emits a COO carrying the
    /// last accepted FSN.
    pub fn initiate_changeover(&mut self, now: Instant, slc: u8) -> Vec<Bytes> {
        let idx = match self.links.iter().position(|l| l.slc() == slc) {
            Some(i) => i,
            None => return Vec::new(),
        };
        let saved = self.links[idx].mtp2.snapshot_unsent();
        self.links[idx].co_saved = saved;
        self.links[idx].changeover = ChangeoverState::Initiated;
        self.links[idx].sent.insert(SentNetMsg::SENT_COO);
        self.links[idx].changeover_t2 = self.arm(now, Mtp3Event::ChangeoverT2(slc), CHANGEOVER_T2);
        let last_fsn_received = self.links[idx].mtp2.last_accepted_fsn();
        vec![NetMgmtMessage::Coo { last_fsn_received }.encode()]
    }

    /// COA received: discard queued SUs through the acked FSN and move the
    /// rest onto the first other available link to the same destination.
    pub fn complete_changeover(&mut self, now: Instant, slc: u8, last_fsn_received: u8) {
        let idx = match self.links.iter().position(|l| l.slc() == slc) {
            Some(i) => i,
            None => return,
        };
        self.sched.cancel(&mut self.links[idx].changeover_t2);
        self.links[idx].changeover = ChangeoverState::Completed;
        let dpc = self.links[idx].dpc();
        let saved = std::mem::take(&mut self.links[idx].co_saved);
        let remaining: Vec<(u8, Bytes)> = saved
            .into_iter()
            .filter(|(fsn, _, _)| !seq_le(*fsn, last_fsn_received))
            .map(|(_, sio, sif)| (sio, sif))
            .collect();
        if let Some(dest) = self
            .links
            .iter()
            .position(|l| l.available() && l.dpc() == dpc)
        {
            self.links[dest].mtp2.requeue_msus(now, remaining);
        } else {
            debug!(slc, "no alternative link available, traffic dropped");
        }
    }

    /// Changeback: the failed link's SLT passes again.
    pub fn initiate_changeback(&mut self, now: Instant, slc: u8) -> Vec<Bytes> {
        let idx = match self.links.iter().position(|l| l.slc() == slc) {
            Some(i) => i,
            None => return Vec::new(),
        };
        self.links[idx].changeover = ChangeoverState::ChangebackInitiated;
        self.links[idx].sent.insert(SentNetMsg::SENT_CBD);
        self.links[idx].changeback_t3 = self.arm(now, Mtp3Event::ChangebackT3(slc), CHANGEBACK_T3);
        vec![NetMgmtMessage::Cbd { sequence: 0 }.encode()]
    }

    pub fn complete_changeback(&mut self, now: Instant, slc: u8) {
        let idx = match self.links.iter().position(|l| l.slc() == slc) {
            Some(i) => i,
            None => return,
        };
        self.sched.cancel(&mut self.links[idx].changeback_t3);
        self.sched.cancel(&mut self.links[idx].changeback_t4);
        self.sched.cancel(&mut self.links[idx].changeback_t5);
        self.links[idx].changeover = ChangeoverState::None;
        self.links[idx].sent.remove(SentNetMsg::SENT_CBD);
        let held = std::mem::take(&mut self.links[idx].cb_buf);
        self.links[idx].mtp2.requeue_msus(now, held);
    }

    /// T3 settle expiry without a CBA: retransmit CBD and arm T4.
    fn on_changeback_t3_expiry(&mut self, now: Instant, slc: u8) -> Vec<Bytes> {
        let idx = match self.links.iter().position(|l| l.slc() == slc) {
            Some(i) => i,
            None => return Vec::new(),
        };
        if self.links[idx].changeover != ChangeoverState::ChangebackInitiated {
            return Vec::new();
        }
        self.links[idx].changeback_t4 = self.arm(now, Mtp3Event::ChangebackT4(slc), CHANGEBACK_T4);
        vec![NetMgmtMessage::Cbd { sequence: 0 }.encode()]
    }

    /// T4 retry expiry without a CBA: retransmit CBD once more and arm the
    /// final T5 abandon wait.
    fn on_changeback_t4_expiry(&mut self, now: Instant, slc: u8) -> Vec<Bytes> {
        let idx = match self.links.iter().position(|l| l.slc() == slc) {
            Some(i) => i,
            None => return Vec::new(),
        };
        if self.links[idx].changeover != ChangeoverState::ChangebackInitiated {
            return Vec::new();
        }
        self.links[idx].changeback_t5 = self.arm(now, Mtp3Event::ChangebackT5(slc), CHANGEBACK_T5);
        vec![NetMgmtMessage::Cbd { sequence: 0 }.encode()]
    }

    /// T5 abandon expiry: give up on the changeback, leave the link off
    /// direct traffic, and drop whatever was held for it.
    fn on_changeback_t5_expiry(&mut self, slc: u8) {
        let idx = match self.links.iter().position(|l| l.slc() == slc) {
            Some(i) => i,
            None => return,
        };
        warn!(slc, "changeback abandoned, no cba received");
        self.links[idx].changeover = ChangeoverState::None;
        self.links[idx].sent.remove(SentNetMsg::SENT_CBD);
        self.links[idx].cb_buf.clear();
    }

    /// Management request to inhibit `slc` for maintenance. Sends LIN and
    /// arms T12 to retransmit once, then abandon, if LIA never arrives.
    pub fn request_inhibit(&mut self, now: Instant, slc: u8) -> Vec<Bytes> {
        let idx = match self.links.iter().position(|l| l.slc() == slc) {
            Some(i) => i,
            None => return Vec::new(),
        };
        self.links[idx].sent.insert(SentNetMsg::SENT_LIN);
        self.links[idx].inhibit_t12 = self.arm(now, Mtp3Event::InhibitT12(slc), INHIBIT_T12);
        vec![NetMgmtMessage::Lin.encode()]
    }

    /// Management request to uninhibit `slc`. Sends LUN and arms T14.
    pub fn request_uninhibit(&mut self, now: Instant, slc: u8) -> Vec<Bytes> {
        let idx = match self.links.iter().position(|l| l.slc() == slc) {
            Some(i) => i,
            None => return Vec::new(),
        };
        self.links[idx].sent.insert(SentNetMsg::SENT_LUN);
        self.links[idx].inhibit_t14 = self.arm(now, Mtp3Event::InhibitT14(slc), INHIBIT_T14);
        vec![NetMgmtMessage::Lun.encode()]
    }

    /// Peer asked to inhibit this end's view of `slc`: mark it
    /// remote-inhibited and acknowledge with LIA.
    pub fn on_lin_received(&mut self, now: Instant, slc: u8) -> Vec<Bytes> {
        let idx = match self.links.iter().position(|l| l.slc() == slc) {
            Some(i) => i,
            None => return Vec::new(),
        };
        self.links[idx].inhibit_remote = true;
        self.links[idx].inhibit_t22 = self.arm(now, Mtp3Event::InhibitT22(slc), INHIBIT_T22);
        vec![NetMgmtMessage::Lia.encode()]
    }

    /// LIA received: our own inhibit request was accepted.
    pub fn on_lia_received(&mut self, now: Instant, slc: u8) -> Vec<Bytes> {
        let idx = match self.links.iter().position(|l| l.slc() == slc) {
            Some(i) => i,
            None => return Vec::new(),
        };
        self.sched.cancel(&mut self.links[idx].inhibit_t12);
        self.links[idx].sent.remove(SentNetMsg::SENT_LIN);
        self.links[idx].inhibit_local = true;
        self.links[idx].inhibit_t22 = self.arm(now, Mtp3Event::InhibitT22(slc), INHIBIT_T22);
        Vec::new()
    }

    /// Peer asked to uninhibit `slc`: clear the remote-inhibit bit.
    pub fn on_lun_received(&mut self, slc: u8) -> Vec<Bytes> {
        let idx = match self.links.iter().position(|l| l.slc() == slc) {
            Some(i) => i,
            None => return Vec::new(),
        };
        self.links[idx].inhibit_remote = false;
        self.sched.cancel(&mut self.links[idx].inhibit_t22);
        self.sched.cancel(&mut self.links[idx].inhibit_t23);
        vec![NetMgmtMessage::Lua.encode()]
    }

    /// LUA received: our own uninhibit request was accepted.
    pub fn on_lua_received(&mut self, slc: u8) {
        let idx = match self.links.iter().position(|l| l.slc() == slc) {
            Some(i) => i,
            None => return,
        };
        self.sched.cancel(&mut self.links[idx].inhibit_t14);
        self.sched.cancel(&mut self.links[idx].inhibit_t22);
        self.sched.cancel(&mut self.links[idx].inhibit_t23);
        self.links[idx].sent.remove(SentNetMsg::SENT_LUN);
        self.links[idx].inhibit_local = false;
    }

    /// Forced uninhibit: the last available link to a destination is
    /// locally inhibited with no alternative, so force it back into
    /// service without waiting for an ack.
    pub fn force_uninhibit_if_sole_link(&mut self, dpc: u32) -> Option<Bytes> {
        let candidates: Vec<usize> = self
            .links
            .iter()
            .enumerate()
            .filter(|(_, l)| l.dpc() == dpc && l.mtp2.is_in_service())
            .map(|(i, _)| i)
            .collect();
        if candidates.len() != 1 {
            return None;
        }
        let idx = candidates[0];
        if !self.links[idx].inhibit_local {
            return None;
        }
        warn!(slc = self.links[idx].slc(), "forcing uninhibit, no alternative link");
        self.links[idx].inhibit_local = false;
        self.links[idx].sent.insert(SentNetMsg::SENT_LFU);
        Some(NetMgmtMessage::Lfu.encode())
    }

    pub fn on_lfu_received(&mut self, slc: u8) {
        if let Some(idx) = self.links.iter().position(|l| l.slc() == slc) {
            self.links[idx].inhibit_remote = false;
        }
    }

    /// LLT received from the peer testing an inhibited link: answer LRT.
    pub fn on_llt_received(&mut self, slc: u8) -> Vec<Bytes> {
        if self.links.iter().any(|l| l.slc() == slc) {
            vec![NetMgmtMessage::Lrt.encode()]
        } else {
            Vec::new()
        }
    }

    pub fn on_lrt_received(&mut self, now: Instant, slc: u8) {
        let idx = match self.links.iter().position(|l| l.slc() == slc) {
            Some(i) => i,
            None => return,
        };
        self.sched.cancel(&mut self.links[idx].inhibit_t23);
        self.links[idx].sent.remove(SentNetMsg::SENT_LLT);
        self.links[idx].inhibit_t22 = self.arm(now, Mtp3Event::InhibitT22(slc), INHIBIT_T22);
    }

    /// Applies a received route-state broadcast (TFP/TFA/TFR) to the route
    /// table under `adj_dpc`.
    pub fn on_route_state(&mut self, now: Instant, adj_dpc: u32, route_dpc: u32, msg: &NetMgmtMessage) {
        match msg {
            NetMgmtMessage::Tfp { .. } => {
                let t10 = self.arm(now, Mtp3Event::RouteT10 { adj_dpc, route_dpc }, ROUTE_T10);
                let sp = self.adjacent_sp_mut(adj_dpc);
                sp.route_mut(route_dpc).on_tfp();
                sp.route_mut(route_dpc).t10 = t10;
            }
            NetMgmtMessage::Tfa { .. } => {
                self.cancel_route_timers(adj_dpc, route_dpc);
                let flushed = self.adjacent_sp_mut(adj_dpc).route_mut(route_dpc).on_tfa();
                self.flush_route_traffic(now, route_dpc, flushed);
            }
            NetMgmtMessage::Tfr { .. } => {
                let t6 = self.arm(now, Mtp3Event::RouteT6 { adj_dpc, route_dpc }, ROUTE_T6);
                let sp = self.adjacent_sp_mut(adj_dpc);
                sp.route_mut(route_dpc).on_tfr(true);
                sp.route_mut(route_dpc).t6 = t6;
            }
            _ => {}
        }
    }

    /// Whether ISUP/net-mgmt traffic for `dpc` should be buffered on its
    /// route rather than sent directly (forced or controlled reroute).
    pub fn route_blocks_transmission(&self, dpc: u32) -> bool {
        for sp in &self.adjacent_sps {
            if let Some(route) = sp.route(dpc) {
                return route.blocks_transmission();
            }
        }
        false
    }

    /// Buffers one `(sio, sif)` MSU onto the route for `dpc`, if one exists.
    pub fn buffer_on_route(&mut self, dpc: u32, sio: u8, sif: Bytes) -> bool {
        for sp in self.adjacent_sps.iter_mut() {
            if sp.route(dpc).is_some() {
                sp.route_mut(dpc).buffer(sio, sif);
                return true;
            }
        }
        false
    }

    fn cancel_route_timers(&mut self, adj_dpc: u32, route_dpc: u32) {
        let sp_idx = match self.adjacent_sps.iter().position(|sp| sp.dpc == adj_dpc) {
            Some(i) => i,
            None => return,
        };
        let r_idx = match self.adjacent_sps[sp_idx].routes.iter().position(|r| r.dpc == route_dpc) {
            Some(i) => i,
            None => return,
        };
        self.sched.cancel(&mut self.adjacent_sps[sp_idx].routes[r_idx].t6);
        self.sched.cancel(&mut self.adjacent_sps[sp_idx].routes[r_idx].t10);
    }

    /// Flushes buffered route traffic onto whatever link is now available
    /// for `dpc`, dropping it (with a log) if none is.
    fn flush_route_traffic(&mut self, now: Instant, dpc: u32, items: std::collections::VecDeque<(u8, Bytes)>) {
        if items.is_empty() {
            return;
        }
        match self.select_link(0, dpc) {
            Some(idx) => {
                for (sio, sif) in items {
                    self.links[idx].mtp2.queue_msu(now, sio, sif);
                }
            }
            None => debug!(dpc, "route traffic flush: no link available, dropped"),
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.sched.next_deadline()
    }

    pub fn run_due_timers(&mut self, now: Instant) -> Vec<Bytes> {
        let due = self.sched.run_due(now);
        let mut out = Vec::new();
        for (_id, ev) in due {
            match ev {
                Mtp3Event::Q707T1(slc) => out.extend(self.on_q707_t1_expiry(now, slc)),
                Mtp3Event::Q707T2(slc) => {
                    if let Some(idx) = self.links.iter().position(|l| l.slc() == slc) {
                        self.links[idx].q707_t2 =
                            self.arm(now, Mtp3Event::Q707T2(slc), Q707_T2);
                        out.push(
                            NetMgmtMessage::Sltm {
                                pattern: Bytes::from_static(SLT_TEST_PATTERN),
                            }
                            .encode(),
                        );
                    }
                }
                Mtp3Event::ChangeoverT2(slc) => {
                    // Blind completion: no FSN acked by the peer.
                    self.complete_changeover(now, slc, 0);
                }
                Mtp3Event::AdjT21(dpc) => {
                    self.adjacent_sp_mut(dpc).on_t21_expiry();
                }
                Mtp3Event::AdjT19(dpc) => {
                    if let Some(idx) = self.adjacent_sps.iter().position(|sp| sp.dpc == dpc) {
                        self.adjacent_sps[idx].t19 = None;
                    }
                }
                Mtp3Event::ChangebackT3(slc) => out.extend(self.on_changeback_t3_expiry(now, slc)),
                Mtp3Event::ChangebackT4(slc) => out.extend(self.on_changeback_t4_expiry(now, slc)),
                Mtp3Event::ChangebackT5(slc) => self.on_changeback_t5_expiry(slc),
                Mtp3Event::InhibitT12(slc) => {
                    if let Some(idx) = self.links.iter().position(|l| l.slc() == slc) {
                        if self.links[idx].sent.contains(SentNetMsg::SENT_LIN) {
                            warn!(slc, "inhibit request abandoned, no lia received");
                            self.links[idx].sent.remove(SentNetMsg::SENT_LIN);
                        }
                    }
                }
                Mtp3Event::InhibitT14(slc) => {
                    if let Some(idx) = self.links.iter().position(|l| l.slc() == slc) {
                        if self.links[idx].sent.contains(SentNetMsg::SENT_LUN) {
                            warn!(slc, "uninhibit request abandoned, no lua received");
                            self.links[idx].sent.remove(SentNetMsg::SENT_LUN);
                        }
                    }
                }
                Mtp3Event::InhibitT22(slc) => {
                    if let Some(idx) = self.links.iter().position(|l| l.slc() == slc) {
                        if self.links[idx].inhibited() {
                            self.links[idx].sent.insert(SentNetMsg::SENT_LLT);
                            self.links[idx].inhibit_t23 =
                                self.arm(now, Mtp3Event::InhibitT23(slc), INHIBIT_T23);
                            out.push(NetMgmtMessage::Llt.encode());
                        }
                    }
                }
                Mtp3Event::InhibitT23(slc) => {
                    if let Some(idx) = self.links.iter().position(|l| l.slc() == slc) {
                        if self.links[idx].inhibited() {
                            self.links[idx].inhibit_t22 =
                                self.arm(now, Mtp3Event::InhibitT22(slc), INHIBIT_T22);
                            out.push(NetMgmtMessage::Llt.encode());
                        }
                    }
                }
                Mtp3Event::RouteT6 { adj_dpc, route_dpc } => {
                    self.cancel_route_timers(adj_dpc, route_dpc);
                    let flushed = self.adjacent_sp_mut(adj_dpc).route_mut(route_dpc).drain_t6();
                    self.flush_route_traffic(now, route_dpc, flushed);
                }
                Mtp3Event::RouteT10 { adj_dpc, route_dpc } => {
                    let still_tfp = self
                        .adjacent_sp(adj_dpc)
                        .and_then(|sp| sp.route(route_dpc))
                        .map(|r| r.state == RouteState::Tfp)
                        .unwrap_or(false);
                    if still_tfp {
                        let t10 = self.arm(now, Mtp3Event::RouteT10 { adj_dpc, route_dpc }, ROUTE_T10);
                        self.adjacent_sp_mut(adj_dpc).route_mut(route_dpc).t10 = t10;
                        out.push(NetMgmtMessage::Rst.encode());
                    }
                }
            }
        }
        out
    }

    pub fn is_up(&self, dpc: u32) -> bool {
        self.adjacent_sp(dpc)
            .map(|sp| sp.state == AdjacentSpState::Up)
            .unwrap_or(false)
    }
}

fn seq_le(a: u8, b: u8) -> bool {
    a == b || ((b as i16 - a as i16) & 0x7f) as u8 <= 64
}

#[cfg(test)]
mod tests {
    use super::*;
    use ss7_mtp2::{Link as Mtp2Link, Variant as Mtp2Variant};

    fn mtp3_with_two_links(dpc: u32) -> Mtp3 {
        let mut mtp3 = Mtp3::new(Variant::Itu, 100, 0);
        let mut l0 = Mtp3Link::new(Mtp2Link::new(0, dpc, Mtp2Variant::Itu, false));
        let mut l1 = Mtp3Link::new(Mtp2Link::new(1, dpc, Mtp2Variant::Itu, false));
        let t0 = Instant::now();
        l0.mtp2.start(t0);
        l1.mtp2.start(t0);
        // Force both links in service for selection tests without
        // replaying the full alignment handshake.
        force_in_service(&mut l0.mtp2);
        force_in_service(&mut l1.mtp2);
        mtp3.add_link(l0);
        mtp3.add_link(l1);
        mtp3
    }

    fn force_in_service(link: &mut Mtp2Link) {
        use ss7_mtp2::su::{LssuStatus, SignalUnit, SuHeader};
        let t0 = Instant::now();
        link.on_su_received(
            t0,
            SignalUnit::Lssu {
                header: SuHeader { bsn: 0, bib: false, fsn: 0, fib: false, li: 1 },
                status: LssuStatus::Sin,
            },
        );
        link.run_due_timers(t0 + link.timers.t4_normal);
        link.on_su_received(
            t0 + link.timers.t4_normal,
            SignalUnit::Fisu {
                header: SuHeader { bsn: 0, bib: false, fsn: 0, fib: false, li: 0 },
            },
        );
    }

    #[test]
    fn select_link_picks_primary_by_sls_shift() {
        let mtp3 = mtp3_with_two_links(200);
        assert_eq!(mtp3.select_link(0, 200), Some(0));
        assert_eq!(mtp3.select_link(1, 200), Some(1));
    }

    #[test]
    fn select_link_falls_back_when_primary_unavailable() {
        let mut mtp3 = mtp3_with_two_links(200);
        mtp3.links[0].changeover = ChangeoverState::InProgress;
        assert_eq!(mtp3.select_link(0, 200), Some(1));
    }

    #[test]
    fn select_link_none_when_route_prohibited() {
        let mut mtp3 = mtp3_with_two_links(200);
        mtp3.adjacent_sp_mut(200).route_mut(200).on_tfp();
        assert_eq!(mtp3.select_link(0, 200), None);
    }

    #[test]
    fn select_link_none_for_unknown_dpc() {
        let mtp3 = mtp3_with_two_links(200);
        assert_eq!(mtp3.select_link(0, 999), None);
    }

    #[test]
    fn changeover_then_coa_moves_traffic_to_other_link() {
        let mut mtp3 = mtp3_with_two_links(200);
        let t0 = Instant::now();
        mtp3.links[0].mtp2.queue_msu(t0, 0x45, Bytes::from_static(b"abc"));
        let _ = mtp3.initiate_changeover(t0, 0);
        assert_eq!(mtp3.links[0].changeover, ChangeoverState::Initiated);
        mtp3.complete_changeover(t0, 0, 0);
        assert_eq!(mtp3.links[0].changeover, ChangeoverState::Completed);
        // The moved traffic is now queued for transmission on link 1.
        assert!(mtp3.links[1].mtp2.poll_output().is_some());
    }

    #[test]
    fn changeback_completes_on_cba_and_flushes_held_traffic() {
        let mut mtp3 = mtp3_with_two_links(200);
        let t0 = Instant::now();
        let _ = mtp3.initiate_changeback(t0, 0);
        assert_eq!(mtp3.links[0].changeover, ChangeoverState::ChangebackInitiated);
        mtp3.links[0].cb_buf.push((0, Bytes::from_static(b"held")));
        mtp3.complete_changeback(t0, 0);
        assert_eq!(mtp3.links[0].changeover, ChangeoverState::None);
        assert!(!mtp3.links[0].sent.contains(SentNetMsg::SENT_CBD));
        assert!(mtp3.links[0].cb_buf.is_empty());
        assert!(mtp3.links[0].mtp2.poll_output().is_some());
    }

    #[test]
    fn changeback_abandons_after_t3_then_t4_then_t5() {
        let mut mtp3 = mtp3_with_two_links(200);
        let t0 = Instant::now();
        let _ = mtp3.initiate_changeback(t0, 0);
        let t1 = t0 + CHANGEBACK_T3;
        let retried = mtp3.on_changeback_t3_expiry(t1, 0);
        assert_eq!(retried.len(), 1, "t3 expiry retransmits cbd once");
        assert_eq!(mtp3.links[0].changeover, ChangeoverState::ChangebackInitiated);
        let t2 = t1 + CHANGEBACK_T4;
        let retried_again = mtp3.on_changeback_t4_expiry(t2, 0);
        assert_eq!(retried_again.len(), 1, "t4 expiry retransmits cbd a second time");
        mtp3.on_changeback_t5_expiry(0);
        assert_eq!(mtp3.links[0].changeover, ChangeoverState::None);
        assert!(!mtp3.links[0].sent.contains(SentNetMsg::SENT_CBD));
    }

    #[test]
    fn inhibit_handshake_then_uninhibit() {
        let mut mtp3 = mtp3_with_two_links(200);
        let t0 = Instant::now();
        let _ = mtp3.request_inhibit(t0, 0);
        assert!(mtp3.links[0].sent.contains(SentNetMsg::SENT_LIN));
        let _ = mtp3.on_lia_received(t0, 0);
        assert!(mtp3.links[0].inhibit_local);
        assert!(!mtp3.links[0].sent.contains(SentNetMsg::SENT_LIN));
        assert!(!mtp3.links[0].available());

        let _ = mtp3.request_uninhibit(t0, 0);
        assert!(mtp3.links[0].sent.contains(SentNetMsg::SENT_LUN));
        mtp3.on_lua_received(0);
        assert!(!mtp3.links[0].inhibit_local);
        assert!(!mtp3.links[0].sent.contains(SentNetMsg::SENT_LUN));
        assert!(mtp3.links[0].available());
    }

    #[test]
    fn force_uninhibit_when_sole_link_remains() {
        let mut mtp3 = mtp3_with_two_links(200);
        let t0 = Instant::now();
        let _ = mtp3.request_inhibit(t0, 0);
        let _ = mtp3.on_lia_received(t0, 0);
        assert!(mtp3.links[0].inhibit_local);
        // Take link 1 out of service, leaving link 0 the sole in-service
        // link to dpc 200 despite still being locally inhibited.
        let _ = mtp3.links[1].mtp2.deactivate();
        let frame = mtp3.force_uninhibit_if_sole_link(200);
        assert!(frame.is_some());
        assert!(!mtp3.links[0].inhibit_local);
        assert!(mtp3.links[0].sent.contains(SentNetMsg::SENT_LFU));
    }

    #[test]
    fn route_tfr_buffers_then_t10_flush_on_tfa() {
        let mut mtp3 = mtp3_with_two_links(200);
        let t0 = Instant::now();
        mtp3.on_route_state(t0, 200, 200, &NetMgmtMessage::Tfr { dpc: 200 });
        assert!(mtp3.route_blocks_transmission(200));
        assert!(mtp3.buffer_on_route(200, 0x45, Bytes::from_static(b"abc")));
        mtp3.on_route_state(t0, 200, 200, &NetMgmtMessage::Tfa { dpc: 200 });
        assert!(!mtp3.route_blocks_transmission(200));
        // Flushed traffic lands on whichever link is available to dpc 200.
        assert!(mtp3.links.iter_mut().any(|l| l.mtp2.poll_output().is_some()));
    }
}
