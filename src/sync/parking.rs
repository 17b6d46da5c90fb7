//! Futex-backed parking word: the one place this crate blocks an *OS
//! thread* rather than suspending a fiber. Used by the thread pool's task
//! queue and by `WaitPoint`'s helping-bit protocol when a non-fiber caller
//! needs to wait.
//!
//! Grounded on `concurrency/wait_point.h`'s parking/helping protocol in the
//! original source. No futex wrapper crate is used by any of the five
//! teacher/example repos directly; `atomic-wait` is adopted here over a
//! hand-rolled `libc::syscall(SYS_futex, ...)` call, which would be a step
//! down in idiom from the rest of this crate's style (see `DESIGN.md`).

use std::sync::atomic::{AtomicU32, Ordering};

use atomic_wait::{wait, wake_all, wake_one};

/// A 32-bit word threads can park on and be woken from.
pub struct ParkingWord {
    word: AtomicU32,
}

impl ParkingWord {
    pub const fn new(initial: u32) -> Self {
        ParkingWord {
            word: AtomicU32::new(initial),
        }
    }

    pub fn load(&self, order: Ordering) -> u32 {
        self.word.load(order)
    }

    pub fn store(&self, value: u32, order: Ordering) {
        self.word.store(value, order);
    }

    pub fn fetch_add(&self, value: u32, order: Ordering) -> u32 {
        self.word.fetch_add(value, order)
    }

    pub fn fetch_sub(&self, value: u32, order: Ordering) -> u32 {
        self.word.fetch_sub(value, order)
    }

    pub fn compare_exchange(
        &self,
        current: u32,
        new: u32,
        success: Ordering,
        failure: Ordering,
    ) -> Result<u32, u32> {
        self.word.compare_exchange(current, new, success, failure)
    }

    /// Block the calling OS thread while the word still reads `expected`.
    /// Spurious wakeups are possible; callers loop on their own predicate.
    pub fn park_while(&self, expected: u32) {
        wait(&self.word, expected);
    }

    pub fn unpark_one(&self) {
        wake_one(&self.word);
    }

    pub fn unpark_all(&self) {
        wake_all(&self.word);
    }

    pub fn as_atomic(&self) -> &AtomicU32 {
        &self.word
    }
}

impl Default for ParkingWord {
    fn default() -> Self {
        Self::new(0)
    }
}
