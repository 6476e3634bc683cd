//! Single-threaded delayed-callback queue; the sole time source for the stack.

use quanta::Instant;
use std::time::Duration;

use slab::Slab;
use thiserror::Error;

/// Default bound on live timers, matching the linkset-wide scheduler table.
pub const DEFAULT_CAPACITY: usize = 512;

/// Opaque handle to a scheduled slot. Owners store `Option<TimerId>`; `None`
/// is the idiomatic stand-in for the source's `id = -1` sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(pub usize);

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("scheduler table exhausted (capacity {0})")]
    SlotsExhausted(usize),
}

struct Slot<E> {
    when: Instant,
    event: E,
}

/// Bounded arena of timed events, generic over the event payload a layer
/// wants delivered on expiry. MTP2/MTP3/ISUP each define their own event
/// enum and run their own `Scheduler<TheirEvent>`.
pub struct Scheduler<E> {
    slots: Slab<Slot<E>>,
    capacity: usize,
}

impl<E> Scheduler<E> {
    pub fn new(capacity: usize) -> Self {
        Scheduler {
            slots: Slab::with_capacity(capacity.min(64)),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Allocates the lowest free slot for an event due at `now + delay`.
    pub fn schedule(
        &mut self,
        now: Instant,
        delay: Duration,
        event: E,
    ) -> Result<TimerId, SchedulerError> {
        if self.slots.len() >= self.capacity {
            return Err(SchedulerError::SlotsExhausted(self.capacity));
        }
        let key = self.slots.insert(Slot {
            when: now + delay,
            event,
        });
        Ok(TimerId(key))
    }

    /// Idempotent cancellation: clears the slot (if still live) and the
    /// owner's handle, given by mutable reference, regardless of whether it
    /// was already `None`.
    pub fn cancel(&mut self, id: &mut Option<TimerId>) {
        if let Some(tid) = id.take() {
            self.slots.try_remove(tid.0);
        }
    }

    /// Earliest live deadline, or `None` if nothing is scheduled.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.slots.iter().map(|(_, slot)| slot.when).min()
    }

    /// Removes and returns every event whose deadline is `<= now`, in
    /// non-decreasing `when` order (ties broken by slot index, which is
    /// stable within a run). Slots are cleared before being handed back so
    /// a handler may immediately reschedule the same conceptual timer.
    pub fn run_due(&mut self, now: Instant) -> Vec<(TimerId, E)> {
        let mut due: Vec<usize> = self
            .slots
            .iter()
            .filter(|(_, slot)| slot.when <= now)
            .map(|(key, _)| key)
            .collect();
        due.sort_unstable();
        due.into_iter()
            .map(|key| {
                let slot = self.slots.remove(key);
                (TimerId(key), slot.event)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Eq, Clone, Copy)]
    enum Ev {
        A,
        B,
        C,
    }

    #[test]
    fn schedule_and_run_due_in_order() {
        let mut sched: Scheduler<Ev> = Scheduler::new(DEFAULT_CAPACITY);
        let t0 = Instant::now();
        sched.schedule(t0, Duration::from_millis(100), Ev::A).unwrap();
        sched.schedule(t0, Duration::from_millis(10), Ev::B).unwrap();
        sched.schedule(t0, Duration::from_millis(50), Ev::C).unwrap();

        let due = sched.run_due(t0 + Duration::from_millis(60));
        let events: Vec<Ev> = due.into_iter().map(|(_, e)| e).collect();
        assert_eq!(events, vec![Ev::B, Ev::C]);
        assert_eq!(sched.len(), 1);
    }

    #[test]
    fn cancel_prevents_invocation() {
        let mut sched: Scheduler<Ev> = Scheduler::new(DEFAULT_CAPACITY);
        let t0 = Instant::now();
        let mut id = Some(sched.schedule(t0, Duration::from_millis(10), Ev::A).unwrap());
        sched.cancel(&mut id);
        assert!(id.is_none());
        let due = sched.run_due(t0 + Duration::from_secs(1));
        assert!(due.is_empty());
    }

    #[test]
    fn cancel_is_idempotent_on_none() {
        let mut sched: Scheduler<Ev> = Scheduler::new(DEFAULT_CAPACITY);
        let mut id: Option<TimerId> = None;
        sched.cancel(&mut id);
        sched.cancel(&mut id);
        assert!(id.is_none());
    }

    #[test]
    fn capacity_is_enforced() {
        let mut sched: Scheduler<Ev> = Scheduler::new(2);
        let t0 = Instant::now();
        sched.schedule(t0, Duration::from_millis(1), Ev::A).unwrap();
        sched.schedule(t0, Duration::from_millis(1), Ev::B).unwrap();
        let err = sched.schedule(t0, Duration::from_millis(1), Ev::C);
        assert!(matches!(err, Err(SchedulerError::SlotsExhausted(2))));
    }

    #[test]
    fn next_deadline_tracks_earliest() {
        let mut sched: Scheduler<Ev> = Scheduler::new(DEFAULT_CAPACITY);
        let t0 = Instant::now();
        assert_eq!(sched.next_deadline(), None);
        sched.schedule(t0, Duration::from_millis(200), Ev::A).unwrap();
        sched.schedule(t0, Duration::from_millis(20), Ev::B).unwrap();
        assert_eq!(sched.next_deadline(), Some(t0 + Duration::from_millis(20)));
    }

    #[test]
    fn reschedule_from_within_handling_is_safe() {
        // Slots are cleared before being returned, so acting on a due event
        // by scheduling a brand new timer never collides with the old slot.
        let mut sched: Scheduler<Ev> = Scheduler::new(DEFAULT_CAPACITY);
        let t0 = Instant::now();
        let id = sched.schedule(t0, Duration::from_millis(10), Ev::A).unwrap();
        let due = sched.run_due(t0 + Duration::from_millis(10));
        assert_eq!(due, vec![(id, Ev::A)]);
        let new_id = sched
            .schedule(t0, Duration::from_millis(10), Ev::A)
            .unwrap();
        assert_eq!(new_id, id, "freed slot is reused, matching arena semantics");
    }
}
