//! A stackful fiber runtime: cooperative, user-mode threads scheduled
//! over ordinary OS threads, plus the family of synchronization
//! primitives built to suspend a fiber instead of blocking the thread
//! underneath it.
//!
//! Grounded on `slide-rs-bran` (coroutine/context-switch core) and the
//! `exe`/`concurrency` layers of the original source this was distilled
//! from — see `DESIGN.md` for the module-by-module grounding and
//! `SPEC_FULL.md` for the full requirements this implements.
//!
//! ```no_run
//! use filament::scheduler::ThreadPool;
//! use std::sync::Arc;
//!
//! let pool: Arc<dyn filament::scheduler::Scheduler> =
//!     Arc::new(ThreadPool::new_with_default_parallelism());
//! filament::go_on(pool, || {
//!     let (tx, rx) = filament::sync::channel::<u32>(1);
//!     filament::go(move || tx.send(7).unwrap()).unwrap();
//!     assert_eq!(rx.recv(), Some(7));
//! })
//! .unwrap()
//! .join();
//! ```

pub mod context;
pub mod coroutine;
pub mod error;
pub mod fiber;
pub mod queue;
pub mod rc;
pub mod scheduler;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use fiber::{current_id, current_scheduler, go, go_on, suspend, switch_to, teleport_to, yield_now, FiberHandle, FiberId, JoinHandle};
