//! A fiber-blocking condition variable bound to a [`Mutex`] at each call
//! site (the original's `condvar.hpp` is likewise not tied to a single
//! mutex instance).
//!
//! Grounded on `exe/fiber/sync/condvar.hpp` in the original source.
//! Internally used by [`crate::sync::wait_point::WaitPoint`]'s
//! helping-bit protocol.

use crate::fiber::awaiter::Awaiter;
use crate::fiber::core::Fiber;
use crate::fiber::handle::FiberHandle;
use crate::queue::intrusive::{IntrusiveNode, IntrusiveQueue};
use crate::sync::mutex::{Mutex, MutexGuard};

pub struct Condvar {
    waiters: IntrusiveQueue<FiberHandle>,
}

impl Condvar {
    pub fn new() -> Self {
        Condvar {
            waiters: IntrusiveQueue::new(),
        }
    }

    /// Release `guard`'s mutex, suspend the calling fiber until notified,
    /// then re-lock the same mutex before returning.
    ///
    /// As with `std::sync::Condvar`, spurious wakeups are possible;
    /// callers should loop on their own predicate.
    pub fn wait<'a, T>(&self, guard: MutexGuard<'a, T>) -> MutexGuard<'a, T> {
        let mutex = guard.mutex();
        drop(guard);

        struct ParkOnCondvar<'a> {
            condvar: &'a Condvar,
        }
        impl Awaiter for ParkOnCondvar<'_> {
            fn await_symmetric_suspend(&mut self, suspending: FiberHandle) -> FiberHandle {
                let node = Box::new(IntrusiveNode::new(suspending)).into_raw();
                self.condvar.waiters.push(node);
                FiberHandle::invalid()
            }
        }

        Fiber::suspend_current(&mut ParkOnCondvar { condvar: self });
        mutex.lock()
    }

    pub fn notify_one(&self) {
        if let Some(handle) = self.waiters.pop() {
            Fiber::drive(handle);
        }
    }

    pub fn notify_all(&self) {
        while let Some(handle) = self.waiters.pop() {
            Fiber::drive(handle);
        }
    }
}

impl Default for Condvar {
    fn default() -> Self {
        Self::new()
    }
}
