//! The public entry points for spawning and cooperating with fibers.
//!
//! Grounded on `exe/fiber/api.hpp` in the original source, which overloads
//! `go(body)` (spawn on the caller's own scheduler) and `go(scheduler,
//! body)` (spawn on an explicit one). Rust has no overloading by arity, so
//! the two are named [`go`] and [`go_on`] here, matching `slide-rs-bran`'s
//! own `spawn`-style free functions at the crate root.

use std::ptr::NonNull;
use std::sync::Arc;

use crate::context::stack::{self, DEFAULT_STACK_SIZE};
use crate::error::{Error, Result};
use crate::fiber::awaiter::Awaiter;
use crate::fiber::core::Fiber;
use crate::fiber::handle::FiberHandle;
use crate::fiber::id::FiberId;
use crate::scheduler::Scheduler;
use crate::sync::event::Event;

/// A join-able reference to a spawned fiber's completion. Dropping it
/// without joining is fine — it does not cancel or detach anything, since
/// fibers always run to completion or panic on their own.
pub struct JoinHandle {
    completion: Arc<Event>,
}

impl JoinHandle {
    /// Suspend the calling fiber until the spawned fiber finishes
    /// (normally or by panicking — panics are not propagated to the
    /// joiner, per the Open Question decision in `DESIGN.md`).
    pub fn join(&self) {
        self.completion.wait();
    }
}

/// Spawn `body` as a new fiber on `scheduler`.
pub fn go_on(scheduler: Arc<dyn Scheduler>, body: impl FnOnce() + Send + 'static) -> Result<JoinHandle> {
    let stack = stack::global_pool()
        .take(DEFAULT_STACK_SIZE)
        .ok_or(Error::Oom)?;
    let (fiber, completion) = Fiber::new(stack, scheduler.clone(), body);
    // Safety: `fiber` was just allocated by `Box::new` inside `Fiber::new`.
    let ptr = unsafe { NonNull::new_unchecked(Box::into_raw(fiber)) };
    let handle = FiberHandle::new(ptr);
    scheduler.submit(Box::new(move || Fiber::drive(handle)));
    Ok(JoinHandle { completion })
}

/// Spawn `body` as a new fiber on the calling fiber's own scheduler.
///
/// # Panics
/// If called from outside any fiber.
pub fn go(body: impl FnOnce() + Send + 'static) -> Result<JoinHandle> {
    let scheduler = current_scheduler().expect("go(body) called outside a fiber; use go_on(scheduler, body)");
    go_on(scheduler, body)
}

/// The running fiber's id, or `None` outside any fiber.
pub fn current_id() -> Option<FiberId> {
    // Safety: the pointer is only live while the fiber is running, which
    // is exactly the scope of this call.
    Fiber::current().map(|ptr| unsafe { ptr.as_ref().id() })
}

/// The running fiber's current scheduler, or `None` outside any fiber.
pub fn current_scheduler() -> Option<Arc<dyn Scheduler>> {
    // Safety: see `current_id`.
    Fiber::current().map(|ptr| unsafe { ptr.as_ref().scheduler() })
}

/// Suspend the calling fiber through a caller-provided [`Awaiter`]. Most
/// callers want one of the higher-level primitives in `sync`; this is the
/// building block they're written on top of.
///
/// # Panics
/// If called from outside any fiber.
pub fn suspend(awaiter: &mut dyn Awaiter) {
    Fiber::suspend_current(awaiter);
}

/// Reschedule the calling fiber on its own scheduler and suspend, giving
/// other ready work a chance to run before it's resumed.
///
/// # Panics
/// If called from outside any fiber.
pub fn yield_now() {
    Fiber::yield_now();
}

/// Re-pin the calling fiber to `scheduler`, then yield — its next
/// resumption (and everything after) runs through the new scheduler.
///
/// # Panics
/// If called from outside any fiber.
pub fn teleport_to(scheduler: Arc<dyn Scheduler>) {
    let ptr = Fiber::current().expect("teleport_to called outside a fiber");
    // Safety: `ptr` is the currently running fiber; only its own code
    // mutates its scheduler pinning.
    unsafe { ptr.as_ref().retarget_scheduler(scheduler) };
    yield_now();
}

/// Symmetric-transfer directly into `target`, skipping a trip through any
/// scheduler. `register_self` is called with the calling fiber's own
/// handle before the switch — it must stash it somewhere (a primitive's
/// wait queue, a handoff slot, ...) or the fiber can never be resumed
/// again.
///
/// # Panics
/// If called from outside any fiber.
pub fn switch_to(target: FiberHandle, register_self: impl FnOnce(FiberHandle)) {
    struct SwitchTo<F> {
        target: Option<FiberHandle>,
        register: Option<F>,
    }
    impl<F: FnOnce(FiberHandle)> Awaiter for SwitchTo<F> {
        fn await_symmetric_suspend(&mut self, suspending: FiberHandle) -> FiberHandle {
            (self.register.take().unwrap())(suspending);
            self.target.take().unwrap()
        }
    }

    suspend(&mut SwitchTo {
        target: Some(target),
        register: Some(register_self),
    });
}
