//! Per-destination route state (TFP/TFA/TFR) and its reroute buffering.

use std::collections::VecDeque;

use bytes::Bytes;
use ss7_scheduler::TimerId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteState {
    /// Transfer-Allowed: dpc reachable, normal routing.
    Tfa,
    /// Transfer-Prohibited: dpc unreachable via this adjacent SP.
    Tfp,
    /// Transfer-Restricted, not currently buffering (no T6 running).
    TfrNonActive,
    /// Transfer-Restricted, controlled reroute active (T6 running).
    TfrActive,
}

pub struct Route {
    pub dpc: u32,
    pub state: RouteState,
    pub t6: Option<TimerId>,
    pub t10: Option<TimerId>,
    /// MSUs held for this destination while routing is restricted, each as
    /// the `(sio, sif)` pair `Mtp2Link::queue_msu` expects.
    pub pending: VecDeque<(u8, Bytes)>,
}

impl Route {
    pub fn new(dpc: u32) -> Route {
        Route {
            dpc,
            state: RouteState::Tfa,
            t6: None,
            t10: None,
            pending: VecDeque::new(),
        }
    }

    /// A route at TFP never transmits; traffic is held on the route's queue.
    /// TFR-active also holds traffic, but only until T6 drains it.
    pub fn blocks_transmission(&self) -> bool {
        matches!(self.state, RouteState::Tfp | RouteState::TfrActive)
    }

    pub fn on_tfp(&mut self) {
        self.state = RouteState::Tfp;
    }

    /// Returns buffered traffic to flush onto a newly selected link, if this
    /// route was under controlled reroute (TFR-active).
    pub fn on_tfa(&mut self) -> VecDeque<(u8, Bytes)> {
        let was_reroute = self.state == RouteState::TfrActive;
        self.state = RouteState::Tfa;
        if was_reroute {
            std::mem::take(&mut self.pending)
        } else {
            VecDeque::new()
        }
    }

    pub fn on_tfr(&mut self, controlled_reroute: bool) {
        self.state = if controlled_reroute {
            RouteState::TfrActive
        } else {
            RouteState::TfrNonActive
        };
    }

    pub fn buffer(&mut self, sio: u8, sif: Bytes) {
        self.pending.push_back((sio, sif));
    }

    pub fn drain_t6(&mut self) -> VecDeque<(u8, Bytes)> {
        self.state = RouteState::TfrNonActive;
        std::mem::take(&mut self.pending)
    }
}
