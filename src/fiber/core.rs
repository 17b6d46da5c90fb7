//! The schedulable fiber and the symmetric-transfer loop that drives it.
//!
//! Grounded on `exe/fiber/core/fiber.hpp/.cpp` in the original source.
//! `drive` plays the role of the run loop there: it resumes a fiber,
//! and if the fiber's awaiter handed back another fiber to run next
//! (symmetric transfer), it resumes that one directly on the same OS
//! thread rather than returning to the scheduler's task queue. Control
//! only returns to the scheduler once a suspension yields no hand-off.

use std::cell::{Cell, UnsafeCell};
use std::ptr::NonNull;
use std::sync::Arc;

use crate::context::stack::Stack;
use crate::coroutine::{Coroutine, Status};
use crate::fiber::awaiter::Awaiter;
use crate::fiber::handle::FiberHandle;
use crate::fiber::id::FiberId;
use crate::scheduler::Scheduler;
use crate::sync::event::Event;
use crate::util::debug::debug_invariant;

pub struct Fiber {
    id: FiberId,
    coroutine: Box<Coroutine>,
    /// The scheduler this fiber reschedules itself on (`yield`) or spawns
    /// children onto (`go(body)` with no explicit scheduler). Only ever
    /// mutated by this fiber's own code, via `teleport_to`, never
    /// concurrently with a read.
    scheduler: UnsafeCell<Arc<dyn Scheduler>>,
}

thread_local! {
    /// The fiber currently executing on this OS thread, if any. Set and
    /// cleared only by `drive`.
    static CURRENT: Cell<Option<NonNull<Fiber>>> = const { Cell::new(None) };

    /// The awaiter a fiber is suspending through, stashed here by
    /// `suspend_current` just before the context switch away and picked
    /// back up by `drive` just after. It is deliberately *not* invoked
    /// before the switch: until the switch completes, this fiber's
    /// context isn't actually saved yet, so handing its `FiberHandle` to
    /// anyone (e.g. pushing it onto a wait queue another thread is
    /// already draining) would let them resume a coroutine that hasn't
    /// finished suspending. Running the awaiter from `drive`, on the
    /// resumer's own stack, after `resume()` has returned, closes that
    /// window.
    static PENDING_AWAITER: Cell<Option<*mut dyn Awaiter>> = const { Cell::new(None) };
}

impl Fiber {
    /// Build a new fiber, wrapping `body` so its completion fires
    /// `completion` (observed by [`FiberHandle`] joiners) once it returns
    /// or panics.
    pub(crate) fn new(
        stack: Stack,
        scheduler: Arc<dyn Scheduler>,
        body: impl FnOnce() + Send + 'static,
    ) -> (Box<Fiber>, Arc<Event>) {
        let completion = Arc::new(Event::new());
        let fired = completion.clone();
        let wrapped = move || {
            body();
            fired.fire();
        };
        let coroutine = Coroutine::new(stack, wrapped);
        let fiber = Box::new(Fiber {
            id: FiberId::next(),
            coroutine,
            scheduler: UnsafeCell::new(scheduler),
        });
        (fiber, completion)
    }

    pub fn id(&self) -> FiberId {
        self.id
    }

    /// The scheduler this fiber is currently pinned to.
    pub fn scheduler(&self) -> Arc<dyn Scheduler> {
        // Safety: only `teleport_to` mutates this, and only from the
        // fiber's own running code — never concurrently with this read.
        unsafe { (*self.scheduler.get()).clone() }
    }

    /// Re-pin this fiber to a different scheduler. Takes effect for its
    /// next `yield`/suspend-and-reschedule; does not itself suspend.
    pub(crate) fn retarget_scheduler(&self, scheduler: Arc<dyn Scheduler>) {
        // Safety: see `scheduler`.
        unsafe { *self.scheduler.get() = scheduler };
    }

    /// The fiber currently running on this thread, or `None` if called
    /// from outside any fiber (e.g. a plain OS thread or worker between
    /// tasks).
    pub fn current() -> Option<NonNull<Fiber>> {
        CURRENT.with(Cell::get)
    }

    /// Drive fibers starting from `handle`, following symmetric-transfer
    /// hand-offs directly until a suspension yields none, at which point
    /// control returns to the caller — normally a scheduler worker about
    /// to look for its next task.
    pub(crate) fn drive(mut handle: FiberHandle) {
        loop {
            let ptr = match handle.consume() {
                Some(ptr) => ptr,
                None => return,
            };

            let previous = CURRENT.with(|c| c.replace(Some(ptr)));
            // Safety: `ptr` was just handed to us with unique ownership of
            // the right to run it; nothing else resumes it concurrently.
            unsafe { (*ptr.as_ptr()).coroutine.resume() };
            CURRENT.with(|c| c.set(previous));

            // Safety: `ptr` is still a live allocation; the coroutine
            // either suspended or reached a terminal state.
            let status = unsafe { (*ptr.as_ptr()).coroutine.status() };
            let pending_awaiter = PENDING_AWAITER.with(|c| c.take());

            match status {
                Status::Suspended => {
                    let awaiter_ptr = pending_awaiter
                        .expect("a suspended fiber must have registered an awaiter before switching away");
                    let suspending = FiberHandle::new(ptr);
                    // Safety: the switch into this call's `resume()` has
                    // returned, so the suspending fiber's context is fully
                    // saved; its stack (and the awaiter living on it) is
                    // safe to read from here, and `suspending` is safe to
                    // hand off to anyone the awaiter wakes.
                    let next = unsafe { (*awaiter_ptr).await_symmetric_suspend(suspending) };
                    handle = next;
                }
                Status::Completed | Status::Panicked => {
                    debug_invariant!(
                        pending_awaiter.is_none(),
                        "a terminated fiber's trampoline must not register an awaiter"
                    );
                    log::trace!("fiber {} finished ({:?})", unsafe { (*ptr.as_ptr()).id }, status);
                    // Safety: the fiber is terminal and no longer
                    // reachable from any wait queue; reclaim it, returning
                    // its stack to the global pool instead of munmap'ing
                    // it outright.
                    let fiber = unsafe { Box::from_raw(ptr.as_ptr()) };
                    let stack = fiber.coroutine.into_stack();
                    crate::context::stack::global_pool().give(stack);
                    handle = FiberHandle::invalid();
                }
                Status::Running => unreachable!("coroutine still Running after resume returned"),
            }
        }
    }

    /// Suspend the currently running fiber. `awaiter` decides what happens
    /// to the suspending fiber's handle and which fiber (if any) should
    /// run next via symmetric transfer — but it only runs once the
    /// context switch away from this fiber has actually completed, from
    /// inside `drive` on the resuming thread (see [`PENDING_AWAITER`]).
    ///
    /// # Panics
    /// If called from outside any fiber.
    pub(crate) fn suspend_current(awaiter: &mut dyn Awaiter) {
        let ptr = Self::current().expect("suspend_current called outside a fiber");
        PENDING_AWAITER.with(|c| c.set(Some(awaiter as *mut dyn Awaiter)));
        // Safety: called from within the fiber's own body, on its own
        // stack, which is exactly the contract `Coroutine::suspend`
        // requires.
        unsafe { (*ptr.as_ptr()).coroutine.suspend() };
    }

    /// Reschedule the currently running fiber on its own scheduler and
    /// suspend, letting other work run before it's resumed.
    ///
    /// # Panics
    /// If called from outside any fiber.
    pub(crate) fn yield_now() {
        let ptr = Self::current().expect("yield_now called outside a fiber");
        let scheduler = unsafe { (*ptr.as_ptr()).scheduler() };

        struct YieldAwaiter {
            scheduler: Arc<dyn Scheduler>,
        }
        impl Awaiter for YieldAwaiter {
            fn await_symmetric_suspend(&mut self, suspending: FiberHandle) -> FiberHandle {
                self.scheduler.submit(Box::new(move || Fiber::drive(suspending)));
                FiberHandle::invalid()
            }
        }

        Fiber::suspend_current(&mut YieldAwaiter { scheduler });
    }
}

// Safety: a `Fiber` only runs on one OS thread at a time, ferried between
// threads exclusively through `FiberHandle`.
unsafe impl Send for Fiber {}

/// Hides this thread's current-fiber identity for the guard's lifetime.
///
/// `sync::strand::Strand`'s combiner runs other fibers' queued work
/// inline, without switching onto their stacks — that work must never
/// suspend, since there's no coroutine context to suspend *to*. Holding
/// this guard while running it makes [`Fiber::suspend_current`] panic
/// instead of silently attributing a suspension to the wrong fiber.
pub struct NoSwitchContextGuard {
    previous: Option<NonNull<Fiber>>,
}

impl NoSwitchContextGuard {
    pub fn enter() -> Self {
        let previous = CURRENT.with(|c| c.replace(None));
        NoSwitchContextGuard { previous }
    }
}

impl Drop for NoSwitchContextGuard {
    fn drop(&mut self) {
        CURRENT.with(|c| c.set(self.previous.take()));
    }
}
