//! x86_64 machine-context switch.
//!
//! Grounded on `context/arch/x86_64/machine_context.cc/.h` in the original
//! source: a context is nothing but a saved stack pointer, because the
//! callee-saved registers (`rbx`, `rbp`, `r12`-`r15`) are pushed onto the
//! stack we're switching away from and popped back off the stack we're
//! switching to. Written as inline `global_asm!` rather than a vendored
//! `.S` file compiled by a build script, following the idiom in
//! `davidzeng0/xx-core`'s `fiber` module and the riscv64 teaching exercise
//! in this pack's `other_examples/`.

use std::arch::global_asm;

/// A saved machine context: just the stack pointer at the moment of the
/// last switch. Everything else lives on the stack itself.
#[repr(C)]
#[derive(Debug)]
pub struct MachineContext {
    rsp: *mut u8,
}

// Safety: a `MachineContext` only ever points into a stack owned by the
// `Stack` it belongs to; the pointer itself carries no thread affinity.
unsafe impl Send for MachineContext {}

extern "C" {
    /// Save the current callee-saved registers and stack pointer into
    /// `*save_rsp`, then load `new_rsp` and return into whatever context
    /// it was last saved from (or the trampoline, on first entry).
    fn filament_swap_context(save_rsp: *mut *mut u8, new_rsp: *mut u8);
}

global_asm!(
    ".text",
    ".global filament_swap_context",
    "filament_swap_context:",
    // Save callee-saved registers of the outgoing context.
    "push rbp",
    "push rbx",
    "push r12",
    "push r13",
    "push r14",
    "push r15",
    // Stash the resulting stack pointer into *rdi (save_rsp).
    "mov [rdi], rsp",
    // Switch to the incoming stack.
    "mov rsp, rsi",
    // Restore callee-saved registers of the incoming context.
    "pop r15",
    "pop r14",
    "pop r13",
    "pop r12",
    "pop rbx",
    "pop rbp",
    "ret",
);

impl MachineContext {
    /// A context with no saved stack pointer yet; only valid as the
    /// "current" side of the very first switch out of a thread's own
    /// stack.
    pub fn empty() -> Self {
        MachineContext {
            rsp: std::ptr::null_mut(),
        }
    }

    /// Switch from `self` (the currently running context) to `to`,
    /// blocking until some other context switches back into `self`.
    ///
    /// # Safety
    /// `self` must be the context of the fiber currently executing on this
    /// thread; `to` must be a context previously primed by
    /// `context::stack::Stack::prime` or previously suspended via this
    /// same function.
    pub unsafe fn switch(&mut self, to: &MachineContext) {
        filament_swap_context(&mut self.rsp, to.rsp);
    }

    pub(crate) fn set_rsp(&mut self, rsp: *mut u8) {
        self.rsp = rsp;
    }
}
