//! An unbounded, multi-producer multi-consumer blocking task queue:
//! workers parked on an empty queue are woken by a push, rather than
//! spinning.
//!
//! Grounded on `concurrency/mpmc_unbounded_blocking_queue.hpp` in the
//! original source, built here on top of `queue::intrusive::IntrusiveQueue`
//! and `sync::parking::ParkingWord`.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::queue::intrusive::{IntrusiveNode, IntrusiveQueue};
use crate::scheduler::task::Task;
use crate::sync::parking::ParkingWord;

pub struct TaskQueue {
    queue: IntrusiveQueue<Task>,
    /// Approximate pending-task count; workers park while this reads 0.
    pending: ParkingWord,
    closed: AtomicBool,
}

impl TaskQueue {
    pub fn new() -> Self {
        TaskQueue {
            queue: IntrusiveQueue::new(),
            pending: ParkingWord::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Push a task, waking one parked worker if any are waiting.
    pub fn push(&self, task: Task) {
        let node = Box::new(IntrusiveNode::new(task)).into_raw();
        self.queue.push(node);
        self.pending.fetch_add(1, Ordering::Release);
        self.pending.unpark_one();
    }

    /// Pop a task, blocking the calling OS thread while the queue is empty
    /// and open. Returns `None` once the queue has been closed and
    /// drained.
    pub fn pop_blocking(&self) -> Option<Task> {
        loop {
            if let Some(task) = self.queue.pop() {
                self.pending.fetch_sub(1, Ordering::AcqRel);
                return Some(task);
            }
            if self.closed.load(Ordering::Acquire) {
                return None;
            }
            let seen = self.pending.load(Ordering::Acquire);
            if seen == 0 {
                self.pending.park_while(0);
            }
        }
    }

    /// Stop accepting the promise of further work: wakes every parked
    /// worker, which then observe `closed` and exit once the queue drains.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.pending.unpark_all();
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}
