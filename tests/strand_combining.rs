//! 1000 fibers each submit a critical section to a `Strand` that appends
//! their index to a shared vector — the strand-combining scenario in
//! spec.md §8.

use std::sync::{Arc, Mutex as StdMutex};

use filament::scheduler::ThreadPool;
use filament::sync::{Strand, WaitGroup};

#[test]
fn thousand_fibers_each_append_exactly_once() {
    const FIBERS: usize = 1000;

    let pool = Arc::new(ThreadPool::new(8));
    let strand = Arc::new(Strand::new());
    let log = Arc::new(StdMutex::new(Vec::<usize>::with_capacity(FIBERS)));
    let group = Arc::new(WaitGroup::new());
    group.add(FIBERS as i64);

    for index in 0..FIBERS {
        let strand = strand.clone();
        let log = log.clone();
        let group = group.clone();
        filament::go_on(pool.clone(), move || {
            // `execute` may hand the closure off to a different fiber
            // entirely as the combiner, so completion has to be signaled
            // from inside it, not after `execute` returns.
            strand.execute(move || {
                log.lock().unwrap().push(index);
                group.done_one();
            });
        })
        .unwrap();
    }

    let waiter = filament::go_on(pool.clone(), move || group.wait()).unwrap();
    waiter.join();

    let mut entries = log.lock().unwrap().clone();
    assert_eq!(entries.len(), FIBERS);
    entries.sort_unstable();
    assert_eq!(entries, (0..FIBERS).collect::<Vec<_>>());
}
