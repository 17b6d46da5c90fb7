//! A resumable computation built from a [`crate::context::machine::MachineContext`]
//! switch pair and a [`crate::context::stack::Stack`].
//!
//! Grounded on `exe/fiber/core/coroutine.hpp` in the original source and
//! `slide-rs-bran/src/fiber.rs`'s `coroutine_initialize` trampoline. A
//! `Coroutine` knows nothing about scheduling or synchronization — it is
//! exactly two `MachineContext`s (its own, and whichever context resumed
//! it last) ping-ponging across one stack. `fiber::core` builds the
//! schedulable `Fiber` on top of this.

use std::panic::AssertUnwindSafe;

use crate::context::machine::MachineContext;
use crate::context::stack::Stack;
use crate::util::debug::debug_invariant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Primed but never resumed, or resumed and then suspended.
    Suspended,
    /// Currently executing (or executing on some thread, from this
    /// context's point of view).
    Running,
    /// The body returned normally; `resume` must never be called again.
    Completed,
    /// The body panicked; `catch_unwind` contained it at the trampoline
    /// boundary per the decision recorded in `DESIGN.md`. `resume` must
    /// never be called again.
    Panicked,
}

impl Status {
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Completed | Status::Panicked)
    }
}

/// Argument bundle handed through the trampoline to the monomorphized
/// entry stub for a specific body closure `F`.
struct Body<F> {
    f: Option<F>,
    coroutine: *mut Coroutine,
}

pub struct Coroutine {
    stack: Stack,
    /// This coroutine's own saved context — where it left off.
    context: MachineContext,
    /// The context of whoever last resumed this coroutine; suspending
    /// switches back into this.
    caller: MachineContext,
    status: Status,
}

impl Coroutine {
    /// Build a new coroutine that will run `body` on `stack` the first
    /// time it's resumed.
    pub fn new<F>(stack: Stack, body: F) -> Box<Coroutine>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut co = Box::new(Coroutine {
            stack,
            context: MachineContext::empty(),
            caller: MachineContext::empty(),
            status: Status::Suspended,
        });
        let co_ptr: *mut Coroutine = &mut *co;

        let boxed_body = Box::new(Body {
            f: Some(body),
            coroutine: co_ptr,
        });
        let arg = Box::into_raw(boxed_body) as *mut ();

        let primed = co.stack.prime(trampoline_entry::<F>, arg);
        co.context = primed;
        co
    }

    pub fn status(&self) -> Status {
        self.status
    }

    /// Reclaim the stack out of a terminated coroutine so it can be
    /// returned to a [`crate::context::stack::StackPool`] instead of
    /// munmap'd and remapped on the next spawn.
    ///
    /// # Panics
    /// If the coroutine hasn't reached a terminal status.
    pub(crate) fn into_stack(self: Box<Self>) -> Stack {
        debug_invariant!(self.status.is_terminal(), "reclaimed the stack of a live coroutine");
        self.stack
    }

    /// Resume this coroutine from the calling thread, blocking until it
    /// suspends (via [`Coroutine::suspend`], called from inside the body
    /// through `fiber::core`) or runs to completion.
    ///
    /// # Safety
    /// Must not be called when `status()` is already terminal, and must
    /// not be called concurrently with another `resume` of the same
    /// coroutine.
    pub unsafe fn resume(&mut self) {
        debug_invariant!(!self.status.is_terminal(), "resumed a terminated coroutine");
        self.status = Status::Running;
        // Safety: `self.caller` becomes the context this call returns
        // into; `self.context` is either freshly primed or was saved by a
        // prior `suspend`.
        unsafe { self.caller.switch(&self.context) };
    }

    /// Suspend the currently running coroutine back to whoever resumed
    /// it. Must be called from code running on this coroutine's own
    /// stack.
    ///
    /// # Safety
    /// Must only be invoked from within the body passed to
    /// [`Coroutine::new`] (directly or via a fiber suspension point), and
    /// `self` must be the coroutine currently running on this stack.
    pub unsafe fn suspend(&mut self) {
        self.status = Status::Suspended;
        // Safety: see `switch_back_to_caller`.
        unsafe { self.switch_back_to_caller() };
    }

    /// Switch back into whoever resumed this coroutine, without touching
    /// `status`. Used both by `suspend` (status already set to
    /// `Suspended`) and by the trampoline's terminal exit (status already
    /// set to `Completed`/`Panicked`).
    unsafe fn switch_back_to_caller(&mut self) {
        // Safety: saves the coroutine's own register state into
        // `self.context` and switches back into `self.caller`, exactly
        // undoing the `resume` that got us here.
        unsafe { self.context.switch(&self.caller) };
    }
}

extern "C" fn trampoline_entry<F>(arg: *mut ()) -> !
where
    F: FnOnce() + Send + 'static,
{
    // Safety: `arg` was produced by `Box::into_raw` in `Coroutine::new`
    // and is only ever passed through the trampoline once.
    let mut body = unsafe { Box::from_raw(arg as *mut Body<F>) };
    let f = body.f.take().expect("coroutine body already consumed");
    let coroutine = body.coroutine;
    drop(body);

    let result = std::panic::catch_unwind(AssertUnwindSafe(f));

    // Safety: `coroutine` outlives this call; it only gets dropped after
    // its status is observed terminal and no thread is running its body.
    unsafe {
        (*coroutine).status = if result.is_ok() {
            Status::Completed
        } else {
            Status::Panicked
        };
        (*coroutine).switch_back_to_caller();
    }

    unreachable!("a terminated coroutine must never be resumed again");
}
