//! Debug-only invariant checks, compiled out in release builds. Mirrors
//! the original's `DEBUG_ASSERT` macros, which are no-ops outside of debug
//! builds of `exe`.

macro_rules! debug_invariant {
    ($cond:expr, $($msg:tt)+) => {
        debug_assert!($cond, $($msg)+);
    };
}

pub(crate) use debug_invariant;
