//! Per-variant MTP2 timer durations.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    Itu,
    Ansi,
}

#[derive(Debug, Clone, Copy)]
pub struct Mtp2Timers {
    pub t1: Duration,
    pub t2: Duration,
    pub t3: Duration,
    pub t4_normal: Duration,
    pub t4_emergency: Duration,
    pub t7: Duration,
}

impl Mtp2Timers {
    pub fn for_variant(variant: Variant) -> Mtp2Timers {
        match variant {
            Variant::Itu => Mtp2Timers {
                t1: Duration::from_millis(45_000),
                t2: Duration::from_millis(50_000),
                t3: Duration::from_millis(1_500),
                t4_normal: Duration::from_millis(8_500),
                t4_emergency: Duration::from_millis(500),
                t7: Duration::from_millis(1_250),
            },
            Variant::Ansi => Mtp2Timers {
                t1: Duration::from_millis(16_000),
                t2: Duration::from_millis(11_500),
                t3: Duration::from_millis(11_500),
                t4_normal: Duration::from_millis(2_300),
                t4_emergency: Duration::from_millis(600),
                t7: Duration::from_millis(1_250),
            },
        }
    }
}

/// Linkset-up delay between all links reaching IN-SERVICE and the session
/// declaring SS7-STATE-UP.
pub const LINKSET_UP_DELAY: Duration = Duration::from_millis(500);
