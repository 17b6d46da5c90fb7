//! Programmer-error reporting. These conditions (dropping a live
//! `FiberHandle`, resuming an already-running fiber, ...) are never
//! recoverable `Result`s — the original aborts via `UTIL_ASSERT`/
//! `UTIL_VERIFY`, and so do we.

/// Log `message` at error level and abort the process.
///
/// Never returns. Used for conditions the public API documents as
/// programmer errors rather than runtime failures.
#[cold]
#[inline(never)]
pub fn programmer_error(message: &str) -> ! {
    log::error!("programmer error: {message}");
    std::process::abort();
}

/// Like `assert!`, but routes through [`programmer_error`] instead of
/// panicking, so the failure is reported consistently with the rest of the
/// runtime's non-recoverable conditions.
macro_rules! runtime_assert {
    ($cond:expr, $($msg:tt)+) => {
        if !$cond {
            $crate::util::abort::programmer_error(&format!($($msg)+));
        }
    };
}

pub(crate) use runtime_assert;
