//! A single-use countdown: `add` registers outstanding work, `done`
//! retires one unit of it, and `wait` blocks until the count reaches zero.
//!
//! Grounded on `exe/fiber/sync/wait_group.hpp` and `concurrency/wait_group.h`
//! in the original source (the latter being the thread-level counterpart
//! this crate's distillation dropped but which rounds out the primitive
//! family — see `SPEC_FULL.md`).

use std::sync::atomic::{AtomicI64, Ordering};

use crate::sync::event::Event;

pub struct WaitGroup {
    remaining: AtomicI64,
    done: Event,
}

impl WaitGroup {
    pub fn new() -> Self {
        WaitGroup {
            remaining: AtomicI64::new(0),
            done: Event::new(),
        }
    }

    /// Register `delta` more units of outstanding work (or retire some, if
    /// negative). Firing happens the instant the count reaches zero,
    /// including from within `add` itself if the caller only ever
    /// decrements.
    pub fn add(&self, delta: i64) {
        let prev = self.remaining.fetch_add(delta, Ordering::AcqRel);
        if prev + delta == 0 {
            self.done.fire();
        }
    }

    pub fn done_one(&self) {
        self.add(-1);
    }

    /// Block the calling fiber until the count reaches zero.
    pub fn wait(&self) {
        self.done.wait();
    }
}

impl Default for WaitGroup {
    fn default() -> Self {
        Self::new()
    }
}
