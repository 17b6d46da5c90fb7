//! Four fibers each append their id, rendezvous at a `Barrier`, then
//! append `-id` — the barrier-of-4 scenario in spec.md §8. All four
//! pre-arrive appends must precede all four post-arrive appends.

use std::sync::Arc;

use filament::scheduler::ThreadPool;
use filament::sync::{Barrier, Mutex, WaitGroup};

#[test]
fn four_way_barrier_orders_pre_and_post_appends() {
    let pool = Arc::new(ThreadPool::new(4));
    let barrier = Arc::new(Barrier::new(4));
    let log = Arc::new(Mutex::new(Vec::<i32>::new()));
    let group = Arc::new(WaitGroup::new());
    group.add(4);

    for id in 0..4i32 {
        let barrier = barrier.clone();
        let log = log.clone();
        let group = group.clone();
        filament::go_on(pool.clone(), move || {
            log.lock().push(id);
            barrier.wait();
            log.lock().push(-id);
            group.done_one();
        })
        .unwrap();
    }

    let waiter = filament::go_on(pool.clone(), move || group.wait()).unwrap();
    waiter.join();

    let entries = log.lock().clone();
    assert_eq!(entries.len(), 8);
    let (pre, post) = entries.split_at(4);
    assert!(pre.iter().all(|&n| n >= 0));
    assert!(post.iter().all(|&n| n < 0));
    let mut pre_ids: Vec<i32> = pre.to_vec();
    let mut post_ids: Vec<i32> = post.iter().map(|&n| -n).collect();
    pre_ids.sort_unstable();
    post_ids.sort_unstable();
    assert_eq!(pre_ids, vec![0, 1, 2, 3]);
    assert_eq!(post_ids, vec![0, 1, 2, 3]);
}
