//! Small helpers shared across the runtime: spin-pause hints, debug
//! assertions, and the programmer-error abort path.

pub mod abort;
pub mod debug;
pub mod pause;
