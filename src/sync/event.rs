//! A resettable one-shot fiber event: fibers calling `wait` park until
//! some fiber (or thread) calls `fire`, then all of them resume.
//!
//! Grounded on `exe/fiber/sync/event.hpp` in the original source, built on
//! `queue::intrusive::AtomicStack`'s fold of "waiter list" and "fired"
//! into a single CAS per `DESIGN.md`'s grounding on
//! `concurrency/one_shot_event.h`.

use crate::fiber::awaiter::Awaiter;
use crate::fiber::core::Fiber;
use crate::fiber::handle::FiberHandle;
use crate::queue::intrusive::AtomicStack;

pub struct Event {
    waiters: AtomicStack<FiberHandle>,
}

impl Event {
    pub fn new() -> Self {
        Event {
            waiters: AtomicStack::new(),
        }
    }

    pub fn is_fired(&self) -> bool {
        self.waiters.is_closed()
    }

    /// Block the calling fiber until `fire` is called, or return
    /// immediately if it already has been.
    ///
    /// # Panics
    /// If called from outside a fiber.
    pub fn wait(&self) {
        if self.is_fired() {
            return;
        }

        struct ParkOnEvent<'a> {
            event: &'a Event,
        }
        impl Awaiter for ParkOnEvent<'_> {
            fn await_symmetric_suspend(&mut self, suspending: FiberHandle) -> FiberHandle {
                match self.event.waiters.push_unless_closed(suspending) {
                    Ok(()) => FiberHandle::invalid(),
                    // Fired in the gap between our `is_fired` check and
                    // pushing: the handle comes right back, so resume
                    // immediately instead of parking forever.
                    Err(handle) => handle,
                }
            }
        }

        Fiber::suspend_current(&mut ParkOnEvent { event: self });
    }

    /// Fire the event, waking every fiber currently parked in `wait`.
    /// Idempotent: firing an already-fired event is a no-op.
    pub fn fire(&self) {
        let Some(waiters) = self.waiters.close_and_drain() else {
            return;
        };
        for handle in waiters {
            Fiber::drive(handle);
        }
    }

    /// Reopen the event so a new round of `wait`/`fire` can happen.
    ///
    /// # Safety
    /// The caller must ensure no fiber is still parked from a previous
    /// round and no concurrent `fire`/`wait` is in flight — this is the
    /// same contract the original's event reuse pattern relies on (the
    /// "ping-pong" scenario in `SPEC_FULL.md` §8 resets only after every
    /// waiter from the previous round has observed the fire).
    pub fn reset(&self) {
        self.waiters.reset();
    }
}

impl Default for Event {
    fn default() -> Self {
        Self::new()
    }
}
