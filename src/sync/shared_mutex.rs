//! A reader/writer lock: any number of readers may hold it concurrently,
//! but a writer excludes everyone else.
//!
//! Grounded on `exe/fiber/sync/shared_mutex.hpp` in the original source.
//! Writer-preferring: once a writer is waiting, new readers queue behind
//! it instead of continuing to pile in, so a steady stream of readers
//! can't starve a writer out indefinitely.

use std::cell::UnsafeCell;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

use crate::fiber::awaiter::Awaiter;
use crate::fiber::core::Fiber;
use crate::fiber::handle::FiberHandle;
use crate::queue::intrusive::{IntrusiveNode, IntrusiveQueue};

const WRITER_LOCKED: i64 = -1;

pub struct SharedMutex<T> {
    /// `0` free, `>0` that many readers held, `WRITER_LOCKED` a writer
    /// holds it.
    state: AtomicI64,
    pending_writers: AtomicUsize,
    reader_waiters: IntrusiveQueue<FiberHandle>,
    writer_waiters: IntrusiveQueue<FiberHandle>,
    data: UnsafeCell<T>,
}

// Safety: `data` is reachable only through a guard, and the guards'
// invariants (many readers xor one writer) are enforced by `state`.
unsafe impl<T: Send> Send for SharedMutex<T> {}
unsafe impl<T: Send + Sync> Sync for SharedMutex<T> {}

impl<T> SharedMutex<T> {
    pub fn new(value: T) -> Self {
        SharedMutex {
            state: AtomicI64::new(0),
            pending_writers: AtomicUsize::new(0),
            reader_waiters: IntrusiveQueue::new(),
            writer_waiters: IntrusiveQueue::new(),
            data: UnsafeCell::new(value),
        }
    }

    /// Acquire a shared (read) lock, suspending while a writer holds it or
    /// one is waiting to.
    pub fn lock_shared(&self) -> SharedMutexReadGuard<'_, T> {
        loop {
            if self.try_acquire_shared() {
                return SharedMutexReadGuard { lock: self };
            }

            struct ParkOnRead<'a, T> {
                lock: &'a SharedMutex<T>,
            }
            impl<T> Awaiter for ParkOnRead<'_, T> {
                fn await_symmetric_suspend(&mut self, suspending: FiberHandle) -> FiberHandle {
                    let node = Box::new(IntrusiveNode::new(suspending)).into_raw();
                    self.lock.reader_waiters.push(node);
                    if self.lock.pending_writers.load(Ordering::Acquire) == 0
                        && self.lock.state.load(Ordering::Acquire) >= 0
                    {
                        if let Some(handle) = self.lock.reader_waiters.pop() {
                            return handle;
                        }
                    }
                    FiberHandle::invalid()
                }
            }

            Fiber::suspend_current(&mut ParkOnRead { lock: self });
        }
    }

    fn try_acquire_shared(&self) -> bool {
        if self.pending_writers.load(Ordering::Acquire) > 0 {
            return false;
        }
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if current < 0 {
                return false;
            }
            match self.state.compare_exchange_weak(
                current,
                current + 1,
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
    }

    /// Acquire an exclusive (write) lock, suspending while it's held by
    /// anyone, reader or writer.
    pub fn lock(&self) -> SharedMutexWriteGuard<'_, T> {
        self.pending_writers.fetch_add(1, Ordering::AcqRel);
        loop {
            if self
                .state
                .compare_exchange(0, WRITER_LOCKED, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                self.pending_writers.fetch_sub(1, Ordering::AcqRel);
                return SharedMutexWriteGuard { lock: self };
            }

            struct ParkOnWrite<'a, T> {
                lock: &'a SharedMutex<T>,
            }
            impl<T> Awaiter for ParkOnWrite<'_, T> {
                fn await_symmetric_suspend(&mut self, suspending: FiberHandle) -> FiberHandle {
                    let node = Box::new(IntrusiveNode::new(suspending)).into_raw();
                    self.lock.writer_waiters.push(node);
                    if self.lock.state.load(Ordering::Acquire) == 0 {
                        if let Some(handle) = self.lock.writer_waiters.pop() {
                            return handle;
                        }
                    }
                    FiberHandle::invalid()
                }
            }

            Fiber::suspend_current(&mut ParkOnWrite { lock: self });
        }
    }

    fn unlock_shared(&self) {
        if self.state.fetch_sub(1, Ordering::AcqRel) == 1 {
            if let Some(handle) = self.writer_waiters.pop() {
                Fiber::drive(handle);
            }
        }
    }

    fn unlock(&self) {
        self.state.store(0, Ordering::Release);
        if let Some(handle) = self.writer_waiters.pop() {
            Fiber::drive(handle);
            return;
        }
        while let Some(handle) = self.reader_waiters.pop() {
            Fiber::drive(handle);
        }
    }
}

pub struct SharedMutexReadGuard<'a, T> {
    lock: &'a SharedMutex<T>,
}

impl<T> Deref for SharedMutexReadGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        // Safety: holding any read guard proves no writer holds `state`.
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> Drop for SharedMutexReadGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.unlock_shared();
    }
}

pub struct SharedMutexWriteGuard<'a, T> {
    lock: &'a SharedMutex<T>,
}

impl<T> Deref for SharedMutexWriteGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        // Safety: holding the write guard proves exclusive access.
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for SharedMutexWriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // Safety: holding the write guard proves exclusive access.
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for SharedMutexWriteGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concurrent_readers_see_the_same_value() {
        let lock = SharedMutex::new(7);
        let a = lock.lock_shared();
        let b = lock.lock_shared();
        assert_eq!(*a, 7);
        assert_eq!(*b, 7);
    }

    #[test]
    fn writer_excludes_readers() {
        let lock = SharedMutex::new(0);
        {
            let mut w = lock.lock();
            *w = 5;
        }
        assert_eq!(*lock.lock_shared(), 5);
    }
}
