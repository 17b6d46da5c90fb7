//! Lock-free intrusive queue primitives shared by the synchronization
//! primitive family, and the queue spinlock used for genuinely short
//! critical sections.

pub mod intrusive;
pub mod qspinlock;

pub use intrusive::{AtomicStack, IntrusiveNode, IntrusiveQueue};
pub use qspinlock::{QSpinlock, QSpinlockGuard};
