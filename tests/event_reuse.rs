//! `reset; spawn N waiters; fire; join all; reset; spawn N; fire; join`
//! for N = 100 — the event-reuse scenario in spec.md §8. Both rounds must
//! complete with no fiber left parked.
//!
//! A waiter that calls `wait` after `fire` has already happened doesn't
//! park (`Event::wait` checks `is_fired` up front), so firing can race
//! ahead of some waiters spawning without losing anyone.

use std::sync::Arc;

use filament::scheduler::ThreadPool;
use filament::sync::{Event, WaitGroup};

fn run_round(pool: &Arc<ThreadPool>, event: &Arc<Event>, n: usize) {
    let group = Arc::new(WaitGroup::new());
    group.add(n as i64);

    for _ in 0..n {
        let event = event.clone();
        let group = group.clone();
        filament::go_on(pool.clone(), move || {
            event.wait();
            group.done_one();
        })
        .unwrap();
    }

    let firer_event = event.clone();
    let firer = filament::go_on(pool.clone(), move || firer_event.fire()).unwrap();
    firer.join();

    let waiter = filament::go_on(pool.clone(), move || group.wait()).unwrap();
    waiter.join();
}

#[test]
fn two_rounds_of_a_hundred_waiters_each_complete() {
    const N: usize = 100;
    let pool = Arc::new(ThreadPool::new_with_default_parallelism());
    let event = Arc::new(Event::new());

    run_round(&pool, &event, N);
    event.reset();
    run_round(&pool, &event, N);
}
