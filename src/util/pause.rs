//! CPU pause-hint spinning, grounded on `concurrency/relax.h` in the
//! original source: a bounded spin with a relax hint before a caller falls
//! back to parking.

#[inline]
pub fn relax() {
    std::hint::spin_loop();
}

/// Spin for `iterations` relax cycles. Callers use this for the short,
/// uncontended window of a queue spinlock before parking.
#[inline]
pub fn spin(iterations: u32) {
    for _ in 0..iterations {
        relax();
    }
}

/// Default spin budget used by `queue::qspinlock` before a waiter parks.
pub const DEFAULT_SPIN_LIMIT: u32 = 64;
