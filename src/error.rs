//! Crate-wide error type. Only conditions that are a normal, expected part
//! of the runtime's contract land here; conditions that indicate a bug in
//! the caller abort the process instead (see [`crate::util::abort`]).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Stack (or other) allocation failed. Surfaced from [`crate::go`].
    #[error("out of memory: failed to allocate a fiber stack")]
    Oom,

    /// The channel's sender half (or, symmetrically, all receivers) has
    /// been dropped; the operation has nothing left to synchronize with.
    #[error("channel is closed")]
    QueueClosed,
}

pub type Result<T> = std::result::Result<T, Error>;
