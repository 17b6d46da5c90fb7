//! Queue (MCS) spinlock: each waiter spins on its own cache line instead
//! of a shared one, so contention doesn't degrade into cache-line
//! ping-pong the way a naive test-and-set spinlock's does.
//!
//! Grounded on `concurrency/qspinlock.hpp` and `concurrency/queue_spinlock.h`
//! in the original source. Used internally by `context::stack::StackPool`
//! and available publicly as the building block `sync` primitives with a
//! genuinely short critical section reach for instead of parking a fiber.

use std::sync::atomic::{AtomicBool, AtomicPtr, Ordering};

use crate::util::pause::{relax, DEFAULT_SPIN_LIMIT};

struct QNode {
    next: AtomicPtr<QNode>,
    locked: AtomicBool,
}

impl QNode {
    const fn new() -> Self {
        QNode {
            next: AtomicPtr::new(std::ptr::null_mut()),
            locked: AtomicBool::new(false),
        }
    }
}

/// An MCS queue spinlock guarding `T`.
pub struct QSpinlock {
    tail: AtomicPtr<QNode>,
}

impl QSpinlock {
    pub const fn new() -> Self {
        QSpinlock {
            tail: AtomicPtr::new(std::ptr::null_mut()),
        }
    }

    /// Acquire the lock, spinning (then yielding) until it's free.
    ///
    /// The returned guard must not outlive the stack frame that acquired
    /// it: its backing `QNode` lives on that frame, per the MCS protocol.
    pub fn lock(&self) -> QSpinlockGuard<'_> {
        let node = Box::new(QNode::new());
        let node_ptr = Box::into_raw(node);

        let prev = self.tail.swap(node_ptr, Ordering::AcqRel);
        if !prev.is_null() {
            // Safety: `node_ptr` is exclusively ours until we splice it in.
            unsafe { (*node_ptr).locked.store(true, Ordering::Relaxed) };
            // Safety: `prev` is still alive; its owner is spinning on
            // `locked` and reads `next` only after being unblocked.
            unsafe { (*prev).next.store(node_ptr, Ordering::Release) };

            let mut spins = 0u32;
            // Safety: `node_ptr` is ours; no one frees it while we wait.
            while unsafe { (*node_ptr).locked.load(Ordering::Acquire) } {
                if spins < DEFAULT_SPIN_LIMIT {
                    relax();
                    spins += 1;
                } else {
                    std::thread::yield_now();
                }
            }
        }

        QSpinlockGuard {
            lock: self,
            node: node_ptr,
        }
    }

    pub fn try_lock(&self) -> Option<QSpinlockGuard<'_>> {
        if self
            .tail
            .compare_exchange(
                std::ptr::null_mut(),
                Box::into_raw(Box::new(QNode::new())),
                Ordering::AcqRel,
                Ordering::Relaxed,
            )
            .is_ok()
        {
            // SAFETY: CAS above succeeded only when the tail was null, so
            // the node we just installed has no predecessor to wait on.
            let node_ptr = self.tail.load(Ordering::Acquire);
            Some(QSpinlockGuard { lock: self, node: node_ptr })
        } else {
            None
        }
    }
}

impl Default for QSpinlock {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard releasing a [`QSpinlock`] on drop.
pub struct QSpinlockGuard<'a> {
    lock: &'a QSpinlock,
    node: *mut QNode,
}

impl Drop for QSpinlockGuard<'_> {
    fn drop(&mut self) {
        // Safety: `self.node` is the node we installed in `lock()`.
        let next = unsafe { (*self.node).next.load(Ordering::Acquire) };
        if next.is_null() {
            if self
                .lock
                .tail
                .compare_exchange(
                    self.node,
                    std::ptr::null_mut(),
                    Ordering::AcqRel,
                    Ordering::Relaxed,
                )
                .is_ok()
            {
                // Safety: no successor spliced in; we own the only
                // reference to `self.node`.
                drop(unsafe { Box::from_raw(self.node) });
                return;
            }
            // A successor is in the middle of splicing itself in; spin
            // until its `next` pointer becomes visible.
            loop {
                // Safety: `self.node` is still ours to poll.
                let next = unsafe { (*self.node).next.load(Ordering::Acquire) };
                if !next.is_null() {
                    // Safety: successor installed and waiting on `locked`.
                    unsafe { (*next).locked.store(false, Ordering::Release) };
                    break;
                }
                relax();
            }
        } else {
            // Safety: successor already visible.
            unsafe { (*next).locked.store(false, Ordering::Release) };
        }
        // Safety: we handed ownership of the wait-word to our successor
        // (or freed it above); either way `self.node` is no longer ours to
        // touch, except to free it when there was no successor to notify
        // — handled in the branch above.
        if !next.is_null() {
            drop(unsafe { Box::from_raw(self.node) });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn mutual_exclusion() {
        let lock = Arc::new(QSpinlock::new());
        let counter = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let lock = lock.clone();
            let counter = counter.clone();
            handles.push(std::thread::spawn(move || {
                for _ in 0..1000 {
                    let _g = lock.lock();
                    counter.fetch_add(1, Ordering::Relaxed);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(counter.load(Ordering::Relaxed), 8000);
    }
}
