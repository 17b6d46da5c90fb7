//! A reusable countdown rendezvous: `add`/`done` move the counter, and
//! every fiber parked in `wait` for the round that just hit zero wakes.
//!
//! Grounded on `concurrency/wait_point.h` in the original source, which
//! packs a generation/version, a "helping" flag, and a countdown into one
//! 64-bit word so a single CAS both records an arrival and detects the
//! round completing. Used internally by [`crate::sync::barrier::Barrier`].
//!
//! State word layout (low to high bit): `[31-bit counter][1-bit helping]
//! [32-bit version]`. `version` is bumped every time the counter reaches
//! zero, turning the word into a generation marker: a fiber that parked
//! for version `v` and wakes to find the word already past `v` knows its
//! round is done without inspecting the counter at all. `helping` is set
//! for the instant between a round completing and its waiters queue being
//! drained — see `wait_for`'s doc comment for the race this closes.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::fiber::awaiter::Awaiter;
use crate::fiber::core::Fiber;
use crate::fiber::handle::FiberHandle;
use crate::queue::intrusive::{IntrusiveNode, IntrusiveQueue};

const COUNTER_BITS: u32 = 31;
const COUNTER_MASK: u64 = (1 << COUNTER_BITS) - 1;
const HELPING_BIT: u64 = 1 << COUNTER_BITS;
const VERSION_SHIFT: u32 = COUNTER_BITS + 1;

fn pack(version: u32, helping: bool, counter: u32) -> u64 {
    debug_assert!(counter as u64 <= COUNTER_MASK);
    ((version as u64) << VERSION_SHIFT) | (if helping { HELPING_BIT } else { 0 }) | counter as u64
}

fn unpack(word: u64) -> (u32, bool, u32) {
    let version = (word >> VERSION_SHIFT) as u32;
    let helping = word & HELPING_BIT != 0;
    let counter = (word & COUNTER_MASK) as u32;
    (version, helping, counter)
}

pub struct WaitPoint {
    participants: u32,
    state: AtomicU64,
    waiters: IntrusiveQueue<FiberHandle>,
}

impl WaitPoint {
    pub fn new(participants: u32) -> Self {
        WaitPoint {
            participants,
            state: AtomicU64::new(pack(0, false, participants)),
            waiters: IntrusiveQueue::new(),
        }
    }

    /// Adjust the counter by `delta`. Returns `true` for the one caller
    /// whose update drove it to zero; that caller wakes every fiber
    /// parked in the round it just completed and opens the next
    /// generation (bumping `version`, resetting the counter to
    /// `participants`) before returning.
    pub fn add(&self, delta: i64) -> bool {
        self.add_versioned(delta).0
    }

    pub fn done(&self) -> bool {
        self.add(-1)
    }

    /// Like `add`, but also returns the round's version as observed by
    /// the same compare-exchange that decided completion — the version a
    /// non-completing caller must hand to `wait_for` to identify which
    /// round it's waiting on, with no separate (and racy) follow-up read.
    fn add_versioned(&self, delta: i64) -> (bool, u32) {
        loop {
            let old = self.state.load(Ordering::Acquire);
            let (version, _helping, counter) = unpack(old);
            let new_counter: u32 = (counter as i64 + delta)
                .try_into()
                .expect("WaitPoint counter underflowed below zero");
            let completed = new_counter == 0;
            let new = if completed {
                pack(version, true, 0)
            } else {
                pack(version, false, new_counter)
            };
            if self
                .state
                .compare_exchange_weak(old, new, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                if completed {
                    self.drain_and_advance(version);
                }
                return (completed, version);
            }
        }
    }

    /// Wake every fiber parked for round `completed_version`, then open
    /// `completed_version + 1`. Called exactly once per round, by
    /// whichever `add` drove the counter to zero.
    fn drain_and_advance(&self, completed_version: u32) {
        while let Some(handle) = self.waiters.pop() {
            Fiber::drive(handle);
        }
        let next_version = completed_version.wrapping_add(1);
        self.state
            .store(pack(next_version, false, self.participants), Ordering::Release);
    }

    /// Suspend the calling fiber until round `version` (the one its own
    /// `add_versioned` call just determined it didn't complete) finishes.
    ///
    /// # Panics
    /// If called from outside a fiber.
    fn wait_for(&self, version: u32) {
        struct ParkOnWaitPoint<'a> {
            point: &'a WaitPoint,
            version: u32,
        }
        impl Awaiter for ParkOnWaitPoint<'_> {
            fn await_symmetric_suspend(&mut self, suspending: FiberHandle) -> FiberHandle {
                let self_ptr = suspending.ptr();
                let node = Box::new(IntrusiveNode::new(suspending)).into_raw();
                self.point.waiters.push(node);

                // The round may have already completed and drained between
                // our caller's `add_versioned` and this push landing: the
                // drain loop in `drain_and_advance` only sees pushes that
                // happened-before its own scan, and that ordering isn't
                // otherwise guaranteed between two independent atomics (the
                // state word and the waiter queue). If the version has
                // already moved on, help finish the drain ourselves —
                // `IntrusiveQueue::pop` is safe for concurrent callers, and
                // each node (including potentially our own) is handed to
                // exactly one popper, so this never double-resumes anyone.
                // If our own node isn't there, the original drain already
                // took and drove it concurrently with us, and we simply
                // fall back to the scheduler trusting that already happened.
                let (version, ..) = unpack(self.point.state.load(Ordering::Acquire));
                if version != self.version {
                    let mut resume_self = FiberHandle::invalid();
                    while let Some(handle) = self.point.waiters.pop() {
                        if handle.ptr() == self_ptr {
                            resume_self = handle;
                        } else {
                            Fiber::drive(handle);
                        }
                    }
                    return resume_self;
                }
                FiberHandle::invalid()
            }
        }

        Fiber::suspend_current(&mut ParkOnWaitPoint { point: self, version });
    }

    /// Arrive, suspending until every participant has. Returns `true` for
    /// the one caller whose arrival completed the round.
    ///
    /// # Panics
    /// If called from outside a fiber, unless this caller turns out to be
    /// the round's last arrival (which never suspends).
    pub fn arrive_and_wait(&self) -> bool {
        let (completed, version) = self.add_versioned(-1);
        if completed {
            return true;
        }
        self.wait_for(version);
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::sync::Arc;

    #[test]
    fn uncontended_single_participant_never_blocks() {
        let point = WaitPoint::new(1);
        assert!(point.arrive_and_wait());
        assert!(point.arrive_and_wait());
        assert!(point.arrive_and_wait());
    }

    #[test]
    fn reuse_advances_version_each_round() {
        let point = Arc::new(WaitPoint::new(1));
        let rounds = Arc::new(AtomicU32::new(0));
        for _ in 0..5 {
            assert!(point.arrive_and_wait());
            rounds.fetch_add(1, Ordering::Relaxed);
        }
        assert_eq!(rounds.load(Ordering::Relaxed), 5);
    }

    #[test]
    fn pack_unpack_round_trips() {
        assert_eq!(unpack(pack(3, true, 5)), (3, true, 5));
        assert_eq!(unpack(pack(u32::MAX, false, 0)), (u32::MAX, false, 0));
    }
}
