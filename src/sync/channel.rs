//! A bounded MPMC channel. Capacity zero is a rendezvous: `send` only
//! completes once a `recv` is there to receive it directly, and vice
//! versa.
//!
//! Grounded on `exe/fiber/sync/channel.hpp` in the original source, with
//! the buffered/rendezvous split resolved per `DESIGN.md`'s Open Question
//! decision. `Sender`/`Receiver` are intrusively refcounted with
//! [`crate::rc::RefCount`], the way the original's channel and executor
//! types share ownership without a natural single owner.
//!
//! The buffer and both wait-queues live behind a single
//! [`QSpinlock`](crate::queue::qspinlock::QSpinlock) rather than three
//! independently-synchronized pieces: a sender deciding whether to park
//! and a racing `close()` must agree on one atomic "yes/no" moment, which
//! only a shared critical section gives them. The lock is always dropped
//! before a scheduling call (`Fiber::suspend_current`/`Fiber::drive`) — the
//! awaiter below drops it the instant it has finished linking the waiter
//! in, before returning.
//!
//! Waiter queues hold `Box<dyn Waiter>` rather than bare `FiberHandle`s so
//! [`crate::sync::select`] can register the same clause in several
//! channels at once: a plain park always "wins" its own wakeup, but a
//! select clause's wakeup must first win a claim race against whichever
//! other channel's clause becomes ready first.

use std::cell::UnsafeCell;
use std::collections::VecDeque;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::error::{Error, Result};
use crate::fiber::awaiter::Awaiter;
use crate::fiber::core::Fiber;
use crate::fiber::handle::FiberHandle;
use crate::queue::qspinlock::{QSpinlock, QSpinlockGuard};
use crate::rc::RefCount;

/// What a channel should do after asking a queued waiter to claim a
/// wakeup: nothing (someone else already claimed it, or a competing
/// select clause beat it to the punch), or proceed with the handoff and
/// optionally drive a handle.
pub(crate) enum Claim {
    Lost,
    /// Proceed with the data transfer. `Some(handle)` if a fiber needs
    /// driving now; `None` if the winner hasn't actually parked yet and
    /// will resume itself once it discovers it won.
    Won(Option<FiberHandle>),
}

/// A queued waiter: either a fiber plainly parked on this channel, or one
/// clause of a multi-channel [`crate::sync::select`] call.
pub(crate) trait Waiter: Send {
    fn claim(self: Box<Self>) -> Claim;
}

struct DirectWaiter(FiberHandle);

impl Waiter for DirectWaiter {
    fn claim(self: Box<Self>) -> Claim {
        Claim::Won(Some(self.0))
    }
}

struct State<T> {
    buffer: VecDeque<T>,
    send_waiters: VecDeque<Box<dyn Waiter>>,
    recv_waiters: VecDeque<Box<dyn Waiter>>,
}

struct Inner<T> {
    capacity: usize,
    closed: AtomicBool,
    refcount: RefCount,
    sender_count: AtomicUsize,
    lock: QSpinlock,
    state: UnsafeCell<State<T>>,
}

// Safety: `state` is only ever touched while holding `lock`.
unsafe impl<T: Send> Send for Inner<T> {}
unsafe impl<T: Send> Sync for Inner<T> {}

impl<T> Inner<T> {
    fn state(&self) -> &mut State<T> {
        // Safety: caller must be holding `self.lock`.
        unsafe { &mut *self.state.get() }
    }

    fn close(&self) {
        let guard = self.lock.lock();
        self.closed.store(true, Ordering::Release);
        let send_waiters = std::mem::take(&mut self.state().send_waiters);
        let recv_waiters = std::mem::take(&mut self.state().recv_waiters);
        drop(guard);
        for waiter in send_waiters.into_iter().chain(recv_waiters) {
            if let Claim::Won(Some(handle)) = waiter.claim() {
                Fiber::drive(handle);
            }
        }
    }
}

/// Create a channel with the given buffer capacity. Capacity `0` is a
/// rendezvous channel.
pub fn channel<T>(capacity: usize) -> (Sender<T>, Receiver<T>) {
    let inner = Box::into_raw(Box::new(Inner {
        capacity,
        closed: AtomicBool::new(false),
        refcount: RefCount::new(),
        sender_count: AtomicUsize::new(1),
        lock: QSpinlock::new(),
        state: UnsafeCell::new(State {
            buffer: VecDeque::new(),
            send_waiters: VecDeque::new(),
            recv_waiters: VecDeque::new(),
        }),
    }));
    // Safety: just allocated, non-null.
    let inner = unsafe { NonNull::new_unchecked(inner) };
    // Safety: sole reference at this point, before either handle exists.
    unsafe { inner.as_ref() }.refcount.inc_ref();
    (Sender { inner }, Receiver { inner })
}

pub struct Sender<T> {
    inner: NonNull<Inner<T>>,
}

pub struct Receiver<T> {
    inner: NonNull<Inner<T>>,
}

// Safety: `Inner<T>` is `Send + Sync` for `T: Send`; the handles only
// reach shared state through it.
unsafe impl<T: Send> Send for Sender<T> {}
unsafe impl<T: Send> Send for Receiver<T> {}

impl<T> Sender<T> {
    fn inner(&self) -> &Inner<T> {
        // Safety: this handle's refcount share keeps the allocation alive.
        unsafe { self.inner.as_ref() }
    }

    /// Send `value`, suspending the calling fiber until there's room (or,
    /// for a rendezvous channel, until a receiver is waiting).
    pub fn send(&self, value: T) -> Result<()> {
        let mut slot = Some(value);
        loop {
            let guard = self.inner().lock.lock();
            let state = self.inner().state();

            if self.inner().closed.load(Ordering::Acquire) {
                return Err(Error::QueueClosed);
            }

            let has_room = self.inner().capacity > 0 && state.buffer.len() < self.inner().capacity;
            if has_room {
                state.buffer.push_back(slot.take().unwrap());
                let waiter = state.recv_waiters.pop_front();
                drop(guard);
                if let Some(waiter) = waiter {
                    if let Claim::Won(Some(handle)) = waiter.claim() {
                        Fiber::drive(handle);
                    }
                }
                return Ok(());
            }
            if self.inner().capacity == 0 {
                // Keep trying queued receivers until one actually claims
                // the handoff — a select clause among them may have
                // already been claimed by a different channel.
                while let Some(waiter) = state.recv_waiters.pop_front() {
                    match waiter.claim() {
                        Claim::Lost => continue,
                        Claim::Won(handle) => {
                            state.buffer.push_back(slot.take().unwrap());
                            drop(guard);
                            if let Some(handle) = handle {
                                Fiber::drive(handle);
                            }
                            return Ok(());
                        }
                    }
                }
            }

            struct ParkOnSend<'a, T> {
                inner: &'a Inner<T>,
                guard: Option<QSpinlockGuard<'a>>,
            }
            impl<T> Awaiter for ParkOnSend<'_, T> {
                fn await_symmetric_suspend(&mut self, suspending: FiberHandle) -> FiberHandle {
                    // Safety: `self.guard` is still held, so we have
                    // exclusive access to `state` until it's dropped below.
                    self.inner
                        .state()
                        .send_waiters
                        .push_back(Box::new(DirectWaiter(suspending)));
                    self.guard = None;
                    FiberHandle::invalid()
                }
            }

            Fiber::suspend_current(&mut ParkOnSend {
                inner: self.inner(),
                guard: Some(guard),
            });
        }
    }

    /// Send `value` only if it can complete without suspending (room is
    /// free, or a receiver is already waiting on a rendezvous channel).
    /// Returns `value` back on failure, including when the channel is
    /// closed. Used by [`crate::sync::select`] to poll several channels'
    /// send sides at once, and to commit a winning send clause after it
    /// wakes.
    pub fn try_send(&self, value: T) -> std::result::Result<(), T> {
        let guard = self.inner().lock.lock();
        let state = self.inner().state();

        if self.inner().closed.load(Ordering::Acquire) {
            drop(guard);
            return Err(value);
        }

        let has_room = self.inner().capacity > 0 && state.buffer.len() < self.inner().capacity;
        if has_room {
            state.buffer.push_back(value);
            let waiter = state.recv_waiters.pop_front();
            drop(guard);
            if let Some(waiter) = waiter {
                if let Claim::Won(Some(handle)) = waiter.claim() {
                    Fiber::drive(handle);
                }
            }
            return Ok(());
        }
        if self.inner().capacity == 0 {
            while let Some(waiter) = state.recv_waiters.pop_front() {
                match waiter.claim() {
                    Claim::Lost => continue,
                    Claim::Won(handle) => {
                        state.buffer.push_back(value);
                        drop(guard);
                        if let Some(handle) = handle {
                            Fiber::drive(handle);
                        }
                        return Ok(());
                    }
                }
            }
        }

        drop(guard);
        Err(value)
    }

    /// Close the channel immediately: every currently-parked sender and
    /// receiver wakes (to observe [`Error::QueueClosed`] / `None`), and
    /// every future `send` fails the same way. Values already buffered
    /// are still drainable by `recv` until they run out.
    pub fn close(&self) {
        self.inner().close();
    }

    /// Register `waiter` on this channel's sender-wait queue — the same
    /// queue a blocked `send` parks in — to be asked to claim once either
    /// room or a waiting receiver appears. Used by
    /// [`crate::sync::select`]'s send clauses.
    pub(crate) fn register_send_side_waiter(&self, waiter: Box<dyn Waiter>) {
        let guard = self.inner().lock.lock();
        self.inner().state().send_waiters.push_back(waiter);
        drop(guard);
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.inner().closed.load(Ordering::Acquire)
    }
}

impl<T> Clone for Sender<T> {
    fn clone(&self) -> Self {
        self.inner().refcount.inc_ref();
        self.inner().sender_count.fetch_add(1, Ordering::Relaxed);
        Sender { inner: self.inner }
    }
}

impl<T> Drop for Sender<T> {
    fn drop(&mut self) {
        if self.inner().sender_count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.inner().close();
        }
        if self.inner().refcount.dec_ref() {
            // Safety: last handle of either kind; no one else can reach
            // this allocation.
            drop(unsafe { Box::from_raw(self.inner.as_ptr()) });
        }
    }
}

impl<T> Receiver<T> {
    fn inner(&self) -> &Inner<T> {
        // Safety: this handle's refcount share keeps the allocation alive.
        unsafe { self.inner.as_ref() }
    }

    /// Take a value if one is already buffered, without suspending.
    /// Used by [`crate::sync::select`] to poll several channels at once.
    pub fn try_recv(&self) -> Option<T> {
        let guard = self.inner().lock.lock();
        let state = self.inner().state();
        let item = state.buffer.pop_front();
        let waiter = if item.is_some() {
            state.send_waiters.pop_front()
        } else {
            None
        };
        drop(guard);
        if let Some(waiter) = waiter {
            if let Claim::Won(Some(handle)) = waiter.claim() {
                Fiber::drive(handle);
            }
        }
        item
    }

    /// Whether this channel is closed with nothing left to drain — the
    /// point at which polling it further is pointless.
    pub fn is_closed_and_drained(&self) -> bool {
        if !self.inner().closed.load(Ordering::Acquire) {
            return false;
        }
        let guard = self.inner().lock.lock();
        let empty = self.inner().state().buffer.is_empty();
        drop(guard);
        empty
    }

    /// Receive a value, suspending the calling fiber until one is
    /// available. Returns `None` once the channel is closed and drained.
    pub fn recv(&self) -> Option<T> {
        loop {
            let guard = self.inner().lock.lock();
            let state = self.inner().state();

            if let Some(item) = state.buffer.pop_front() {
                let waiter = state.send_waiters.pop_front();
                drop(guard);
                if let Some(waiter) = waiter {
                    if let Claim::Won(Some(handle)) = waiter.claim() {
                        Fiber::drive(handle);
                    }
                }
                return Some(item);
            }
            if self.inner().closed.load(Ordering::Acquire) {
                return None;
            }
            let mut woke_a_sender = false;
            while let Some(waiter) = state.send_waiters.pop_front() {
                match waiter.claim() {
                    Claim::Lost => continue,
                    Claim::Won(handle) => {
                        drop(guard);
                        if let Some(handle) = handle {
                            Fiber::drive(handle);
                        }
                        woke_a_sender = true;
                        break;
                    }
                }
            }
            if woke_a_sender {
                continue;
            }

            struct ParkOnRecv<'a, T> {
                inner: &'a Inner<T>,
                guard: Option<QSpinlockGuard<'a>>,
            }
            impl<T> Awaiter for ParkOnRecv<'_, T> {
                fn await_symmetric_suspend(&mut self, suspending: FiberHandle) -> FiberHandle {
                    // Safety: see `ParkOnSend`.
                    self.inner
                        .state()
                        .recv_waiters
                        .push_back(Box::new(DirectWaiter(suspending)));
                    self.guard = None;
                    FiberHandle::invalid()
                }
            }

            Fiber::suspend_current(&mut ParkOnRecv {
                inner: self.inner(),
                guard: Some(guard),
            });
        }
    }

    /// Register `waiter` on this channel's receiver-wait queue — the same
    /// queue a blocked `recv` parks in — to be asked to claim once a value
    /// becomes available. Used by [`crate::sync::select`]'s recv clauses.
    pub(crate) fn register_recv_side_waiter(&self, waiter: Box<dyn Waiter>) {
        let guard = self.inner().lock.lock();
        self.inner().state().recv_waiters.push_back(waiter);
        drop(guard);
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.inner().closed.load(Ordering::Acquire)
    }
}

impl<T> Clone for Receiver<T> {
    fn clone(&self) -> Self {
        self.inner().refcount.inc_ref();
        Receiver { inner: self.inner }
    }
}

impl<T> Drop for Receiver<T> {
    fn drop(&mut self) {
        if self.inner().refcount.dec_ref() {
            // Safety: last handle of either kind.
            drop(unsafe { Box::from_raw(self.inner.as_ptr()) });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Deeper coverage — rendezvous pairing and close-while-waiting — runs
    // real fibers against this channel in `tests/channel_close.rs`; these
    // only exercise the uncontended buffered path, which works from a
    // plain thread with no fiber underneath it.

    #[test]
    fn buffered_send_then_recv() {
        let (tx, rx) = channel::<u32>(4);
        tx.send(1).unwrap();
        tx.send(2).unwrap();
        assert_eq!(rx.recv(), Some(1));
        assert_eq!(rx.recv(), Some(2));
    }

    #[test]
    fn closing_after_sender_drop_drains_then_ends() {
        let (tx, rx) = channel::<u32>(2);
        tx.send(10).unwrap();
        drop(tx);
        assert_eq!(rx.recv(), Some(10));
        assert_eq!(rx.recv(), None);
    }

    #[test]
    fn send_after_last_receiver_drop_still_buffers() {
        let (tx, rx) = channel::<u32>(1);
        drop(rx);
        // Closing is driven by senders dropping, not receivers; a
        // receiverless channel still accepts sends up to capacity, same
        // as a plain SPSC buffer would.
        assert!(tx.send(1).is_ok());
    }
}
