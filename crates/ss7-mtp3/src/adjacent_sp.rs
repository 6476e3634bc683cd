//! Adjacent signalling-point state: link membership, routes and the
//! traffic-restart handshake (TRA).

use ss7_scheduler::TimerId;

use crate::route::Route;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdjacentSpState {
    Down,
    LocalRestart,
    RemoteRestart,
    Align,
    Up,
}

pub struct AdjacentSp {
    pub dpc: u32,
    pub state: AdjacentSpState,
    pub link_slcs: Vec<u8>,
    pub routes: Vec<Route>,
    pub tra_sent: bool,
    pub tra_got: bool,
    pub t19: Option<TimerId>,
    pub t21: Option<TimerId>,
}

impl AdjacentSp {
    pub fn new(dpc: u32) -> AdjacentSp {
        AdjacentSp {
            dpc,
            state: AdjacentSpState::Down,
            link_slcs: Vec::new(),
            routes: Vec::new(),
            tra_sent: false,
            tra_got: false,
            t19: None,
            t21: None,
        }
    }

    pub fn route_mut(&mut self, dpc: u32) -> &mut Route {
        if let Some(idx) = self.routes.iter().position(|r| r.dpc == dpc) {
            &mut self.routes[idx]
        } else {
            self.routes.push(Route::new(dpc));
            self.routes.last_mut().unwrap()
        }
    }

    pub fn route(&self, dpc: u32) -> Option<&Route> {
        self.routes.iter().find(|r| r.dpc == dpc)
    }

    /// First link's SLT passing: begin the TRA handshake.
    pub fn on_first_link_slt_pass(&mut self) -> bool {
        if self.state == AdjacentSpState::Down {
            self.state = AdjacentSpState::LocalRestart;
            self.tra_sent = false;
            self.tra_got = false;
            true
        } else {
            false
        }
    }

    pub fn on_tra_sent(&mut self) {
        self.tra_sent = true;
        self.maybe_up();
    }

    pub fn on_tra_received(&mut self) {
        self.tra_got = true;
        self.maybe_up();
    }

    fn maybe_up(&mut self) {
        if self.tra_sent && self.tra_got {
            self.state = AdjacentSpState::Up;
        } else if self.tra_sent {
            self.state = AdjacentSpState::RemoteRestart;
        } else if self.tra_got {
            self.state = AdjacentSpState::Align;
        }
    }

    /// T21 expiry: accept traffic anyway even without a peer TRA.
    pub fn on_t21_expiry(&mut self) {
        self.t21 = None;
        self.state = AdjacentSpState::Up;
    }

    /// No links to this SP are passing SLT: tear down all route state.
    pub fn on_all_links_down(&mut self) {
        self.state = AdjacentSpState::Down;
        self.routes.clear();
        self.tra_sent = false;
        self.tra_got = false;
    }
}
