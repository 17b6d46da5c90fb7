//! Two fibers hand a counter back and forth over a pair of capacity-1
//! channels, matching the ping-pong scenario in spec.md §8 / SPEC_FULL.md §8.

use std::sync::Arc;

use filament::scheduler::{Scheduler, ThreadPool};
use filament::sync::channel;

#[test]
fn thousand_round_trips_come_back_in_order() {
    let pool: Arc<dyn Scheduler> = Arc::new(ThreadPool::new_with_default_parallelism());
    let (ab_tx, ab_rx) = channel::<u32>(1);
    let (ba_tx, ba_rx) = channel::<u32>(1);
    // `JoinHandle` only signals completion; fiber A's collected replies
    // come back to this thread through their own channel.
    let (out_tx, out_rx) = channel::<Vec<u32>>(1);

    let b = filament::go_on(pool.clone(), move || {
        for _ in 1..=1000u32 {
            let value = ab_rx.recv().expect("fiber A never closes ab_tx early");
            ba_tx.send(value).unwrap();
        }
    })
    .unwrap();

    let a = filament::go_on(pool.clone(), move || {
        let mut received = Vec::with_capacity(1000);
        for n in 1..=1000u32 {
            ab_tx.send(n).unwrap();
            received.push(ba_rx.recv().expect("fiber B always echoes back"));
        }
        out_tx.send(received).unwrap();
    })
    .unwrap();

    a.join();
    b.join();

    let received = out_rx.recv().unwrap();
    assert_eq!(received, (1..=1000u32).collect::<Vec<_>>());
}
