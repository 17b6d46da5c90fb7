//! Executes a submitted task synchronously, on the submitter's own
//! thread. Grounded on `exe/executors/inline.h/.cc` in the original
//! source; used by tests and as the trivial `Scheduler` example.

use crate::scheduler::task::Task;
use crate::scheduler::Scheduler;

#[derive(Default)]
pub struct InlineScheduler;

impl InlineScheduler {
    pub fn new() -> Self {
        InlineScheduler
    }
}

impl Scheduler for InlineScheduler {
    fn submit(&self, task: Task) {
        task();
    }
}
