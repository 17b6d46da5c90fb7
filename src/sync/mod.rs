//! Fiber-blocking synchronization primitives: everything here suspends
//! the calling fiber rather than the underlying OS thread, except
//! [`parking::ParkingWord`], which is the one place actual OS threads
//! park (used internally by the scheduler's task queue).

pub mod barrier;
pub mod channel;
pub mod condvar;
pub mod event;
pub mod mutex;
pub mod parking;
pub mod select;
pub mod shared_mutex;
pub mod strand;
pub mod wait_group;
pub mod wait_point;

pub use barrier::Barrier;
pub use channel::{channel, Receiver, Sender};
pub use condvar::Condvar;
pub use event::Event;
pub use mutex::{Mutex, MutexGuard};
pub use parking::ParkingWord;
pub use select::{select, SelectOp, SelectResult};
pub use shared_mutex::{SharedMutex, SharedMutexReadGuard, SharedMutexWriteGuard};
pub use strand::Strand;
pub use wait_group::WaitGroup;
pub use wait_point::WaitPoint;
