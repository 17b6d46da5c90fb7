//! The suspension contract every synchronization primitive implements.
//!
//! Grounded on `exe/fiber/core/awaiter.hpp` in the original source. Per
//! `DESIGN.md`'s port of spec.md §9: one required method
//! (`await_symmetric_suspend`) and one provided convenience
//! (`await_suspend`) for awaiters that never have a specific fiber to hand
//! control to.

use crate::fiber::handle::FiberHandle;

/// Called from inside the fiber that's about to suspend, with ownership
/// of that fiber's own handle. Implementations decide what happens to the
/// suspending fiber (park it on a wait queue, drop it into a combining
/// strand's task list, ...) and return the handle of whichever fiber
/// should run next on this OS thread.
///
/// Returning [`FiberHandle::invalid`] falls back to the scheduler picking
/// up whatever's next in its own task queue; returning a specific handle
/// performs a symmetric transfer directly into it, skipping a scheduler
/// queue round-trip entirely.
pub trait Awaiter {
    fn await_symmetric_suspend(&mut self, suspending: FiberHandle) -> FiberHandle;

    /// Convenience for awaiters that always fall back to the scheduler
    /// and never symmetric-transfer.
    fn await_suspend(&mut self, suspending: FiberHandle) {
        let next = self.await_symmetric_suspend(suspending);
        debug_assert!(
            !next.is_valid(),
            "await_suspend's default impl must not be paired with symmetric transfer"
        );
    }
}
