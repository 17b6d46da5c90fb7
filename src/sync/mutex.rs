//! A fiber-blocking mutex: `lock` suspends the calling fiber (never blocks
//! the underlying OS thread) while the lock is held elsewhere.
//!
//! Grounded on `exe/fiber/sync/mutex.hpp` in the original source: a
//! Michael-Scott intrusive queue whose own dummy sentinel doubles as the
//! "locked" flag (locked iff `dummy.next != &dummy`), with the owner
//! handed off directly from `unlock` to the next queued waiter rather
//! than waking it up to re-race for the lock.
//!
//! Waiter nodes live on the suspending fiber's own stack frame (inside
//! `lock`'s local `node`), never heap-allocated — the frame stays alive
//! for exactly as long as the node needs to stay linked, since a
//! suspended fiber's stack persists until it's resumed.

use std::cell::UnsafeCell;
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicPtr, Ordering};

use crate::fiber::awaiter::Awaiter;
use crate::fiber::core::Fiber;
use crate::fiber::handle::FiberHandle;

/// One queue slot. `next` links the Michael-Scott chain; `handle` carries
/// the parked fiber once this node has actually been pushed (the dummy
/// sentinel's `handle` is never used).
struct Node {
    next: AtomicPtr<Node>,
    handle: UnsafeCell<Option<FiberHandle>>,
}

impl Node {
    fn new() -> Self {
        Node {
            next: AtomicPtr::new(std::ptr::null_mut()),
            handle: UnsafeCell::new(None),
        }
    }
}

pub struct Mutex<T> {
    /// Heap-allocated so its address stays stable across `Mutex` being
    /// moved (e.g. into an `Arc::new`) — unlike the stack-local waiter
    /// nodes, this one must outlive any single `lock`/`unlock` call.
    dummy: NonNull<Node>,
    /// Only ever read/written by whoever currently owns the lock.
    head: UnsafeCell<NonNull<Node>>,
    tail: AtomicPtr<Node>,
    data: UnsafeCell<T>,
}

// Safety: `data` is reachable only through a `MutexGuard`, which the
// dummy/head/tail protocol guarantees is unique at a time; `Node` pointers
// cross threads but are always handed off with exclusive ownership.
unsafe impl<T: Send> Send for Mutex<T> {}
unsafe impl<T: Send> Sync for Mutex<T> {}

impl<T> Mutex<T> {
    pub fn new(value: T) -> Self {
        let dummy = Box::into_raw(Box::new(Node::new()));
        // Safety: just allocated, sole reference. Self-link: `dummy.next
        // == &dummy` is the "unlocked, empty queue" sentinel value.
        unsafe { (*dummy).next.store(dummy, Ordering::Relaxed) };
        let dummy = unsafe { NonNull::new_unchecked(dummy) };
        Mutex {
            dummy,
            head: UnsafeCell::new(dummy),
            tail: AtomicPtr::new(dummy.as_ptr()),
            data: UnsafeCell::new(value),
        }
    }

    fn head(&self) -> NonNull<Node> {
        // Safety: only the current owner touches `head`, and `unlock` (the
        // only place that reads it) runs on the owner's own call stack.
        unsafe { *self.head.get() }
    }

    fn set_head(&self, node: NonNull<Node>) {
        // Safety: see `head`.
        unsafe { *self.head.get() = node };
    }

    /// Take `node`'s stashed handle. Every node reaching this point was
    /// pushed by `lock_slow` with its handle set first.
    fn take_handle(node: NonNull<Node>) -> FiberHandle {
        // Safety: `handle` is only touched by whichever single party
        // currently "owns" this node per the queue protocol below.
        unsafe { (*node.as_ref().handle.get()).take() }.expect("queue node has no parked handle")
    }

    pub fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
        // Safety: `dummy` is a live allocation for the whole lifetime of
        // `self`.
        unsafe { self.dummy.as_ref() }
            .next
            .compare_exchange(
                self.dummy.as_ptr(),
                std::ptr::null_mut(),
                Ordering::Acquire,
                Ordering::Relaxed,
            )
            .ok()
            .map(|_| MutexGuard { mutex: self })
    }

    /// Acquire the mutex, suspending the calling fiber while it's held by
    /// another.
    ///
    /// # Panics
    /// If called from outside a fiber while the mutex is contended (the
    /// uncontended fast path works from any thread).
    pub fn lock(&self) -> MutexGuard<'_, T> {
        if let Some(guard) = self.try_lock() {
            return guard;
        }

        let node = Node::new();
        let node_ptr = unsafe { NonNull::new_unchecked(&node as *const Node as *mut Node) };

        struct LockAwaiter<'a, T> {
            mutex: &'a Mutex<T>,
            node: NonNull<Node>,
        }
        impl<T> Awaiter for LockAwaiter<'_, T> {
            fn await_symmetric_suspend(&mut self, suspending: FiberHandle) -> FiberHandle {
                // Safety: `self.node` is exclusively ours until it's linked
                // into the queue a moment later, within this same call.
                unsafe { *self.node.as_ref().handle.get() = Some(suspending) };
                self.mutex.lock_slow(self.node)
            }
        }

        Fiber::suspend_current(&mut LockAwaiter { mutex: self, node: node_ptr });
        MutexGuard { mutex: self }
    }

    /// Link `node` onto the tail of the MS queue. Returns the handle to
    /// resume on this OS thread: our own (a symmetric transfer back to
    /// ourselves) if the lock turns out to have been free all along, or
    /// invalid if we're now a genuinely parked waiter that `unlock` will
    /// find later.
    fn lock_slow(&self, node: NonNull<Node>) -> FiberHandle {
        let prev = self.tail.swap(node.as_ptr(), Ordering::AcqRel);
        // Safety: `prev` was installed as `tail` by some earlier call and
        // is never freed while reachable from the queue.
        let prev = unsafe { NonNull::new_unchecked(prev) };
        let owner = unsafe { prev.as_ref() }.next.swap(node.as_ptr(), Ordering::Relaxed);
        let Some(owner) = NonNull::new(owner) else {
            // Genuinely enqueued behind an existing owner; `unlock` will
            // walk `prev.next` to us and hand off when it gets here.
            return FiberHandle::invalid();
        };
        // `owner` can only be `self.dummy` here: every other node's `next`
        // is null until exactly one later caller's exchange (this one)
        // sets it, so no `prev` other than the dummy ever yields a
        // non-null "old" value through this path. Re-read it with Acquire
        // to synchronize with whatever the previous owner released
        // through this same location — the swap above used Relaxed, which
        // alone wouldn't close that gap.
        let _ = unsafe { owner.as_ref() }.next.load(Ordering::Acquire);
        self.acquire(owner, node, true)
    }

    /// Pop `node`'s successor if one is linked, or else mark `node` as a
    /// self-loop meaning "nothing queued behind me yet" and report `None`.
    /// A concurrent `lock_slow` racing in at exactly this moment loses the
    /// self-loop CAS and hands back the real successor instead.
    fn try_take_next(node: NonNull<Node>) -> Option<NonNull<Node>> {
        let next = unsafe { node.as_ref() }.next.load(Ordering::Relaxed);
        if let Some(next) = NonNull::new(next) {
            return Some(next);
        }
        match unsafe { node.as_ref() }.next.compare_exchange(
            std::ptr::null_mut(),
            node.as_ptr(),
            Ordering::Release,
            Ordering::Relaxed,
        ) {
            Ok(_) => None,
            Err(raced_in) => NonNull::new(raced_in),
        }
    }

    /// Shared tail of the lock/unlock slow paths. `owner` is the node
    /// vacating its position (the current queue head, or the dummy);
    /// `next` is its already-known successor. `resume` is true only when
    /// called from our own `lock_slow`, where discovering no further
    /// successor means *we* should resume directly via symmetric transfer
    /// instead of falling back to the scheduler — the original's
    /// equivalent branch instead skips suspending the locking fiber
    /// altogether, which isn't available here since by the time an
    /// awaiter runs, the coroutine switch away has already completed (see
    /// `fiber::core`'s `PENDING_AWAITER` note); resuming ourselves is the
    /// same outcome reached the long way around.
    fn acquire(&self, owner: NonNull<Node>, next: NonNull<Node>, resume: bool) -> FiberHandle {
        let (owner, next) = if owner == self.dummy {
            // Re-seat the dummy as the new tail-adjacent marker, splicing
            // whatever is currently the real tail forward to it so the
            // queue stays linked for the next arrival.
            unsafe { self.dummy.as_ref() }
                .next
                .store(std::ptr::null_mut(), Ordering::Relaxed);
            let old_tail = self.tail.swap(self.dummy.as_ptr(), Ordering::AcqRel);
            let old_tail = unsafe { NonNull::new_unchecked(old_tail) };
            unsafe { old_tail.as_ref() }
                .next
                .store(self.dummy.as_ptr(), Ordering::Release);

            let owner = next;
            match Self::try_take_next(owner) {
                Some(next) => {
                    if resume {
                        self.set_head(next);
                        return Self::take_handle(owner);
                    }
                    (owner, next)
                }
                None => {
                    return if resume {
                        Self::take_handle(owner)
                    } else {
                        FiberHandle::invalid()
                    };
                }
            }
        } else {
            (owner, next)
        };

        self.set_head(next);
        let handle = Self::take_handle(owner);
        Fiber::drive(handle);
        FiberHandle::invalid()
    }

    fn unlock(&self) {
        let owner = self.head();
        let Some(next) = Self::try_take_next(owner) else {
            return;
        };
        self.acquire(owner, next, false);
    }
}

impl<T> Drop for Mutex<T> {
    fn drop(&mut self) {
        // Safety: `dummy` was allocated by `new` and never freed elsewhere;
        // `&mut self` proves no other reference to the mutex remains.
        drop(unsafe { Box::from_raw(self.dummy.as_ptr()) });
    }
}

pub struct MutexGuard<'a, T> {
    mutex: &'a Mutex<T>,
}

impl<'a, T> MutexGuard<'a, T> {
    /// The mutex this guard locked. Used by [`crate::sync::condvar::Condvar`]
    /// to re-lock after a wait.
    pub(crate) fn mutex(&self) -> &'a Mutex<T> {
        self.mutex
    }
}

impl<T> Deref for MutexGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        // Safety: holding the guard proves exclusive access.
        unsafe { &*self.mutex.data.get() }
    }
}

impl<T> DerefMut for MutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // Safety: holding the guard proves exclusive access.
        unsafe { &mut *self.mutex.data.get() }
    }
}

impl<T> Drop for MutexGuard<'_, T> {
    fn drop(&mut self) {
        self.mutex.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn uncontended_lock_unlock() {
        let mutex = Mutex::new(0u64);
        {
            let mut guard = mutex.lock();
            *guard += 1;
        }
        assert_eq!(*mutex.lock(), 1);
    }

    #[test]
    fn try_lock_respects_held_lock() {
        let mutex = Arc::new(Mutex::new(()));
        let _guard = mutex.lock();
        assert!(mutex.try_lock().is_none());
    }

    #[test]
    fn sequential_lock_unlock_cycles_all_observe_prior_writes() {
        // Single thread, so every `lock()` here takes the uncontended
        // `try_lock` fast path — `unlock` restores the dummy's self-loop
        // each time, leaving the queue in the same "empty" shape `new`
        // starts with. The contended `lock_slow`/`acquire` path is
        // exercised by `tests/mutex_stress.rs` instead.
        let mutex = Mutex::new(0u64);
        for _ in 0..100 {
            *mutex.lock() += 1;
        }
        assert_eq!(*mutex.lock(), 100);
    }
}
