//! A fixed-size pool of OS worker threads draining a shared
//! [`TaskQueue`].
//!
//! Grounded on `exe/executors/tp/thread_pool.h/.cc` in the original
//! source; worker-count-from-available-parallelism convention grounded on
//! `slide-rs-bran`'s own `num_cpus` dependency (there used by its
//! `examples/multithread.rs` demo, here promoted to the pool's own default
//! sizing).

use std::sync::Arc;

use crate::scheduler::queue::TaskQueue;
use crate::scheduler::task::Task;
use crate::scheduler::Scheduler;

pub struct ThreadPool {
    queue: Arc<TaskQueue>,
    workers: Vec<std::thread::JoinHandle<()>>,
}

impl ThreadPool {
    /// Spawn a pool with `worker_count` OS threads draining a shared task
    /// queue.
    pub fn new(worker_count: usize) -> Self {
        let worker_count = worker_count.max(1);
        let queue = Arc::new(TaskQueue::new());
        let workers = (0..worker_count)
            .map(|index| {
                let queue = queue.clone();
                std::thread::Builder::new()
                    .name(format!("filament-worker-{index}"))
                    .spawn(move || {
                        log::debug!("worker {index} starting");
                        while let Some(task) = queue.pop_blocking() {
                            task();
                        }
                        log::debug!("worker {index} exiting");
                    })
                    .expect("failed to spawn worker thread")
            })
            .collect();
        ThreadPool { queue, workers }
    }

    /// Size the pool to the host's available parallelism, matching the
    /// `num_cpus::get()` convention carried over from the teacher.
    pub fn new_with_default_parallelism() -> Self {
        Self::new(num_cpus::get())
    }
}

impl Scheduler for ThreadPool {
    fn submit(&self, task: Task) {
        self.queue.push(task);
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.queue.close();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn runs_submitted_tasks() {
        let pool = ThreadPool::new(4);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..100 {
            let counter = counter.clone();
            pool.submit(Box::new(move || {
                counter.fetch_add(1, Ordering::Relaxed);
            }));
        }
        drop(pool); // joins workers, draining the queue first
        assert_eq!(counter.load(Ordering::Relaxed), 100);
    }
}
