//! 8 worker threads, 64 fibers each, 10 000 increments apiece under a
//! single `Mutex` — the mutex stress scenario in spec.md §8.

use std::sync::Arc;

use filament::scheduler::ThreadPool;
use filament::sync::{Mutex, WaitGroup};

#[test]
fn eight_by_sixty_four_by_ten_thousand_increments() {
    const WORKER_THREADS: usize = 8;
    const FIBERS_PER_WORKER: usize = 64;
    const INCREMENTS: usize = 10_000;

    let pool = Arc::new(ThreadPool::new(WORKER_THREADS));
    let counter = Arc::new(Mutex::new(0u64));
    let group = Arc::new(WaitGroup::new());
    group.add((WORKER_THREADS * FIBERS_PER_WORKER) as i64);

    for _ in 0..(WORKER_THREADS * FIBERS_PER_WORKER) {
        let counter = counter.clone();
        let group = group.clone();
        filament::go_on(pool.clone(), move || {
            for _ in 0..INCREMENTS {
                *counter.lock() += 1;
            }
            group.done_one();
        })
        .unwrap();
    }

    // `WaitGroup::wait` suspends a fiber, so it must itself run on the
    // pool rather than block this OS thread directly.
    let waiter = filament::go_on(pool.clone(), move || group.wait()).unwrap();
    waiter.join();

    assert_eq!(
        *counter.lock(),
        (WORKER_THREADS * FIBERS_PER_WORKER * INCREMENTS) as u64
    );
}
