//! Stackful fibers: the schedulable unit this runtime switches between.
//!
//! `core` and `handle` are crate-internal plumbing; `api` is the surface
//! user code actually calls (`go`, `yield_now`, `suspend`, ...).

pub mod api;
pub mod awaiter;
pub(crate) mod core;
pub mod handle;
pub mod id;

pub use api::{current_id, current_scheduler, go, go_on, suspend, switch_to, teleport_to, yield_now, JoinHandle};
pub use awaiter::Awaiter;
pub use handle::FiberHandle;
pub use id::FiberId;
