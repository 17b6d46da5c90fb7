//! The unit of work a [`super::Scheduler`] runs: grounded on
//! `exe/sched/task/task.hpp` in the original source, which types a task as
//! a non-throwing, no-argument, no-return callable.

/// A boxed unit of scheduler work. Submitting a task and later running it
/// are the only two operations any `Scheduler` needs to support.
pub type Task = Box<dyn FnOnce() + Send + 'static>;
