//! The very first instructions executed on a freshly primed stack.
//!
//! `context::stack::Stack::prime` writes a fake saved frame whose "return
//! address" is [`filament_trampoline_entry`] and whose saved `rbx` holds a
//! pointer to a [`BootstrapArgs`]. The System V ABI only guarantees
//! callee-saved registers survive a `context::machine::MachineContext`
//! switch, so the argument has to ride in one of those rather than `rdi`;
//! this tiny stub moves it into `rdi` before calling into normal Rust.
//!
//! Grounded on `context/trampoline.hpp` in the original source, which
//! plays the same role for the C++ implementation's `ucontext`-free
//! bootstrap.

use std::arch::global_asm;

/// Payload handed from `Stack::prime` to the coroutine body through the
/// bootstrap stub.
#[repr(C)]
pub struct BootstrapArgs {
    pub entry: extern "C" fn(*mut ()) -> !,
    pub arg: *mut (),
}

extern "C" {
    /// Entry point baked into every primed stack's initial frame. Reads
    /// the `BootstrapArgs` pointer out of `rbx` (placed there by
    /// `Stack::prime`) and tail-calls into `entry(arg)`.
    pub fn filament_trampoline_entry() -> !;
}

global_asm!(
    ".text",
    ".global filament_trampoline_entry",
    "filament_trampoline_entry:",
    // rbx holds *mut BootstrapArgs, restored by filament_swap_context's
    // final `pop rbx` just before it returned into us.
    "mov rax, [rbx]",     // entry fn pointer
    "mov rdi, [rbx + 8]", // arg pointer, passed per the SysV ABI's first
                          // integer argument register
    "jmp rax",
);
