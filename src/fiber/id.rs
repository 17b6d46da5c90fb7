//! Monotonic fiber identifiers, grounded on `exe/fiber/core/fiber.hpp`'s
//! `FiberId` in the original source.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FiberId(u64);

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

impl FiberId {
    pub(crate) fn next() -> Self {
        FiberId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for FiberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "fiber#{}", self.0)
    }
}
