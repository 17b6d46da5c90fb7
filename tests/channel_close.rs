//! Channel of capacity 2, 5 fibers each trying to send an int; after 2
//! succeed the remaining 3 park; the main fiber closes the channel and
//! the parked senders wake with `QueueClosed` — the close-while-senders-
//! wait scenario in spec.md §8. Also covers the rendezvous (capacity 0)
//! pairing path that `src/sync/channel.rs`'s own unit tests defer here.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use filament::error::Error;
use filament::scheduler::ThreadPool;
use filament::sync::{channel, WaitGroup};

#[test]
fn closing_while_senders_wait_wakes_them_with_queue_closed() {
    let pool = Arc::new(ThreadPool::new(4));
    let (tx, rx) = channel::<i32>(2);

    // Fill the buffer so every further send must park.
    tx.send(1).unwrap();
    tx.send(2).unwrap();

    let ok_count = Arc::new(AtomicUsize::new(0));
    let closed_count = Arc::new(AtomicUsize::new(0));
    let group = Arc::new(WaitGroup::new());
    group.add(3);

    for n in 3..6 {
        let tx = tx.clone();
        let ok_count = ok_count.clone();
        let closed_count = closed_count.clone();
        let group = group.clone();
        filament::go_on(pool.clone(), move || {
            match tx.send(n) {
                Ok(()) => {
                    ok_count.fetch_add(1, Ordering::Relaxed);
                }
                Err(Error::QueueClosed) => {
                    closed_count.fetch_add(1, Ordering::Relaxed);
                }
                Err(other) => panic!("unexpected error: {other}"),
            }
            group.done_one();
        })
        .unwrap();
    }

    // Drop this handle's own reference; the 3 spawned senders plus this
    // closed-over `tx.clone()`s keep it open until `close()` below.
    tx.close();

    let waiter = filament::go_on(pool.clone(), move || group.wait()).unwrap();
    waiter.join();

    assert_eq!(closed_count.load(Ordering::Relaxed), 3);
    assert_eq!(ok_count.load(Ordering::Relaxed), 0);

    // The 2 values buffered before close are still drainable.
    assert_eq!(rx.recv(), Some(1));
    assert_eq!(rx.recv(), Some(2));
    assert_eq!(rx.recv(), None);
}

#[test]
fn rendezvous_channel_pairs_send_with_recv_across_fibers() {
    let pool = Arc::new(ThreadPool::new(2));
    let (tx, rx) = channel::<u32>(0);

    let received = Arc::new(std::sync::Mutex::new(None));
    let received_in_fiber = received.clone();
    let receiver = filament::go_on(pool.clone(), move || {
        *received_in_fiber.lock().unwrap() = rx.recv();
    })
    .unwrap();
    let sender = filament::go_on(pool.clone(), move || tx.send(42).unwrap()).unwrap();

    sender.join();
    receiver.join();
    assert_eq!(*received.lock().unwrap(), Some(42));
}
