//! The move-only ownership token passed through the awaiter protocol.
//!
//! Grounded on `exe/fiber/core/handle.hpp/.cpp` in the original source:
//! `FiberHandle`'s destructor there asserts the handle was already
//! consumed (`UTIL_ASSERT(!IsValid())`). Rust has no implicit-move-means-
//! empty-source the way C++ move construction does, so the same invariant
//! is enforced by a `Drop` impl that treats a still-valid handle going out
//! of scope as a programmer error, and a `consume` that explicitly forgets
//! `self` once ownership has been handed off.

use std::ptr::NonNull;

use crate::fiber::core::Fiber;
use crate::util::abort::programmer_error;

/// An owned reference to a fiber, passed through
/// [`crate::fiber::awaiter::Awaiter::await_symmetric_suspend`] and the
/// scheduler's "drive this fiber" tasks.
///
/// Must be consumed (handed to `fiber::core::drive`, stored in a wait
/// queue, or otherwise explicitly disposed of) before it drops — dropping
/// a still-valid handle silently would leak or double-resume a fiber, so
/// it aborts the process instead.
#[must_use]
pub struct FiberHandle(Option<NonNull<Fiber>>);

// Safety: a `FiberHandle` is the only way to reach its `Fiber`, and
// ownership transfers follow the same single-owner discipline as a `Box`.
unsafe impl Send for FiberHandle {}

impl FiberHandle {
    pub(crate) fn new(ptr: NonNull<Fiber>) -> Self {
        FiberHandle(Some(ptr))
    }

    /// The sentinel meaning "no fiber to hand off to — fall back to
    /// whatever the scheduler would otherwise run next".
    pub fn invalid() -> Self {
        FiberHandle(None)
    }

    pub fn is_valid(&self) -> bool {
        self.0.is_some()
    }

    /// The fiber this handle identifies, without consuming it. Used to
    /// recognize "is this my own handle?" when a handle comes back out of
    /// a queue it was just pushed into (pointer identity only — never
    /// dereferenced through this path).
    pub(crate) fn ptr(&self) -> Option<NonNull<Fiber>> {
        self.0
    }

    /// Consume the handle, returning the raw fiber pointer it held (or
    /// `None` for an invalid handle). This is the only sanctioned way to
    /// dispose of a `FiberHandle`.
    pub(crate) fn consume(self) -> Option<NonNull<Fiber>> {
        let ptr = self.0;
        std::mem::forget(self);
        ptr
    }
}

impl Drop for FiberHandle {
    fn drop(&mut self) {
        if self.0.is_some() {
            programmer_error("FiberHandle dropped while still valid; it must be consumed");
        }
    }
}
