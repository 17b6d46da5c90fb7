//! A reusable barrier: `participants` fibers rendezvous on each call to
//! `wait`, and none proceed until all of them arrive.
//!
//! Grounded on `exe/fiber/sync/barrier.hpp` in the original source. Reuse
//! across rounds is [`WaitPoint`]'s own job (its packed state word's
//! version field is exactly a generation marker), so a `Barrier` is
//! nothing more than a named wrapper around one. This also absorbs the
//! "last-arrival" detection role `concurrency/meeting.hpp`/
//! `concurrency/rendezvous.h` play in the original source — see
//! `DESIGN.md` for why those aren't exposed as separate public types here.

use crate::sync::wait_point::WaitPoint;

pub struct Barrier {
    point: WaitPoint,
}

impl Barrier {
    pub fn new(participants: u32) -> Self {
        Barrier {
            point: WaitPoint::new(participants),
        }
    }

    /// Block the calling fiber until `participants` fibers have called
    /// `wait` for this round.
    pub fn wait(&self) {
        self.point.arrive_and_wait();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn repeated_rounds_with_one_participant_never_block() {
        // Exercised end-to-end (across real fibers, k > 1) in
        // tests/barrier.rs; this just checks a single-participant barrier
        // doesn't double-count or stall across repeated rounds.
        let barrier = Arc::new(Barrier::new(1));
        let rounds = Arc::new(AtomicU32::new(0));
        for _ in 0..3 {
            barrier.wait();
            rounds.fetch_add(1, Ordering::Relaxed);
        }
        assert_eq!(rounds.load(Ordering::Relaxed), 3);
    }
}
