//! Intrusive singly-linked node shared by every lock-free queue in the
//! crate: `Mutex`'s waiter queue, `Event`'s waiter queue, `Barrier`'s
//! arrival queue, `CombiningStrand`'s task queue, and `Channel`'s send/recv
//! queues all push/pop the same node shape.
//!
//! Grounded on the Michael-Scott-style queues embedded in
//! `exe/fiber/sync/mutex.hpp`, `event.hpp`, `barrier.hpp`, and
//! `concurrency/mpmc_unbounded_blocking_queue.hpp` in the original source —
//! all of which share the "dummy sentinel" idiom: an empty queue is
//! represented by a node whose `next` points nowhere, never by a null
//! head pointer.

use std::cell::UnsafeCell;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicPtr, Ordering};

/// An intrusive queue node. Embedded by value inside whatever payload a
/// particular primitive queues (a parked fiber handle, a task closure, ...).
///
/// `value` is only ever touched by whichever single thread currently holds
/// exclusive rights to this node per the Michael-Scott protocol below, so
/// the `UnsafeCell` never needs external locking.
#[repr(C)]
pub struct IntrusiveNode<T> {
    next: AtomicPtr<IntrusiveNode<T>>,
    value: UnsafeCell<Option<T>>,
}

impl<T> IntrusiveNode<T> {
    pub fn new(value: T) -> Self {
        IntrusiveNode {
            next: AtomicPtr::new(std::ptr::null_mut()),
            value: UnsafeCell::new(Some(value)),
        }
    }

    /// Leak a boxed node into a raw pointer suitable for [`IntrusiveQueue::push`].
    pub fn into_raw(self: Box<Self>) -> NonNull<IntrusiveNode<T>> {
        NonNull::new(Box::into_raw(self)).unwrap()
    }
}

/// A Michael-Scott unbounded lock-free queue of `IntrusiveNode<T>`s,
/// linked through a single dummy sentinel so push/pop never observe a
/// transient "queue has zero nodes" state.
pub struct IntrusiveQueue<T> {
    head: AtomicPtr<IntrusiveNode<T>>,
    tail: AtomicPtr<IntrusiveNode<T>>,
}

// Safety: all mutation goes through the atomic head/tail CAS loops below;
// `T` crossing threads is the caller's concern (bounded by `T: Send`).
unsafe impl<T: Send> Send for IntrusiveQueue<T> {}
unsafe impl<T: Send> Sync for IntrusiveQueue<T> {}

impl<T> IntrusiveQueue<T> {
    pub fn new() -> Self {
        let dummy = Box::new(IntrusiveNode {
            next: AtomicPtr::new(std::ptr::null_mut()),
            value: UnsafeCell::new(None),
        });
        let dummy_ptr = Box::into_raw(dummy);
        IntrusiveQueue {
            head: AtomicPtr::new(dummy_ptr),
            tail: AtomicPtr::new(dummy_ptr),
        }
    }

    /// Push a node onto the tail. `node` must have been produced by
    /// [`IntrusiveNode::into_raw`] and not freed elsewhere.
    pub fn push(&self, node: NonNull<IntrusiveNode<T>>) {
        let raw = node.as_ptr();
        // Safety: `node` is a live, exclusively-owned allocation being
        // handed to the queue; nothing else can reach it yet.
        unsafe { (*raw).next.store(std::ptr::null_mut(), Ordering::Relaxed) };
        let prev = self.tail.swap(raw, Ordering::AcqRel);
        // Safety: `prev` was the tail; the node it points to is still
        // alive because the queue never frees a node behind the head.
        unsafe { (*prev).next.store(raw, Ordering::Release) };
    }

    /// Pop the head's value, returning `None` if the queue is empty.
    ///
    /// The dummy node is retired (freed) and the node after it becomes the
    /// new dummy; its value is taken out (leaving `None` behind) and
    /// returned to the caller.
    pub fn pop(&self) -> Option<T> {
        loop {
            let head = self.head.load(Ordering::Acquire);
            // Safety: `head` always points at a live node (the initial
            // dummy, or a previously-pushed node promoted to dummy by a
            // prior successful pop).
            let next = unsafe { (*head).next.load(Ordering::Acquire) };
            if next.is_null() {
                return None;
            }
            if self
                .head
                .compare_exchange(head, next, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                // Safety: we just won the CAS that retires `head`; no
                // other thread can still be dereferencing it as the head.
                let value = unsafe { (*next).value.get().as_mut().unwrap().take() };
                // Safety: `head` is unreachable from `self.head` now and
                // was exclusively ours to reclaim.
                drop(unsafe { Box::from_raw(head) });
                return value;
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        let head = self.head.load(Ordering::Acquire);
        // Safety: `head` always points at a live node.
        unsafe { (*head).next.load(Ordering::Acquire).is_null() }
    }
}

impl<T> Default for IntrusiveQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for IntrusiveQueue<T> {
    fn drop(&mut self) {
        while self.pop().is_some() {}
        let dummy = self.head.load(Ordering::Relaxed);
        // Safety: the final remaining node (the dummy) was never freed by
        // `pop`, which only frees the node it retires *from* head.
        drop(unsafe { Box::from_raw(dummy) });
    }
}

/// A single Treiber-stack node used by [`AtomicStack`].
struct StackNode<T> {
    next: *mut StackNode<T>,
    value: T,
}

/// A lock-free LIFO stack whose head is swapped with a single CAS,
/// combined with a sentinel "closed" value — the shape
/// `sync::event::Event` and `sync::wait_group::WaitGroup` use to avoid the
/// lost-wakeup race a plain queue has between "check the flag" and "enqueue
/// the waiter".
///
/// Grounded on `concurrency/one_shot_event.h` in the original source,
/// which folds a waiter list and a fired flag into one atomically-swapped
/// word.
pub struct AtomicStack<T> {
    head: AtomicPtr<StackNode<T>>,
}

/// Sentinel head value meaning "closed" (fired / counted down to zero /
/// etc., depending on the primitive built on top).
fn closed_sentinel<T>() -> *mut StackNode<T> {
    std::ptr::NonNull::<StackNode<T>>::dangling().as_ptr()
}

impl<T> AtomicStack<T> {
    pub fn new() -> Self {
        AtomicStack {
            head: AtomicPtr::new(std::ptr::null_mut()),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.head.load(Ordering::Acquire) == closed_sentinel::<T>()
    }

    /// Push `value` unless the stack is already closed, in which case
    /// `value` is returned back to the caller to handle immediately.
    pub fn push_unless_closed(&self, value: T) -> Result<(), T> {
        let node = Box::into_raw(Box::new(StackNode {
            next: std::ptr::null_mut(),
            value,
        }));
        loop {
            let head = self.head.load(Ordering::Acquire);
            if head == closed_sentinel::<T>() {
                // Safety: `node` was never published; we still own it.
                let boxed = unsafe { Box::from_raw(node) };
                return Err(boxed.value);
            }
            // Safety: `node` is exclusively ours until the CAS below
            // publishes it.
            unsafe { (*node).next = head };
            if self
                .head
                .compare_exchange(head, node, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                return Ok(());
            }
        }
    }

    /// Atomically mark the stack closed and return every value pushed
    /// before this call, most-recently-pushed first. Returns `None` if the
    /// stack was already closed.
    pub fn close_and_drain(&self) -> Option<Vec<T>> {
        let head = self.head.swap(closed_sentinel::<T>(), Ordering::AcqRel);
        if head == closed_sentinel::<T>() {
            return None;
        }
        let mut values = Vec::new();
        let mut cursor = head;
        while !cursor.is_null() {
            // Safety: nodes in this chain were published by `push_unless_closed`
            // and are only ever freed here, exactly once.
            let node = unsafe { Box::from_raw(cursor) };
            cursor = node.next;
            values.push(node.value);
        }
        Some(values)
    }

    /// Reopen a closed stack, discarding the closed marker. Callers must
    /// ensure no concurrent push/drain is in flight.
    pub fn reset(&self) {
        self.head.store(std::ptr::null_mut(), Ordering::Release);
    }
}

impl<T> Default for AtomicStack<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for AtomicStack<T> {
    fn drop(&mut self) {
        let head = self.head.load(Ordering::Relaxed);
        if head == closed_sentinel::<T>() {
            return;
        }
        let mut cursor = head;
        while !cursor.is_null() {
            // Safety: see `close_and_drain`.
            let node = unsafe { Box::from_raw(cursor) };
            cursor = node.next;
        }
    }
}
