//! A lock-free combining strand: `execute` runs a closure with mutual
//! exclusion against every other closure submitted to the same strand.
//! If another caller is already combining, the closure is queued for that
//! combiner to run on its behalf, and the submitting fiber parks until its
//! own closure has actually run — `execute` only returns once its section
//! is done.
//!
//! Grounded on `exe/fiber/sync/strand.hpp` in the original source. This is
//! a *different* type from [`crate::scheduler::strand_scheduler::StrandScheduler`]
//! (the serializing scheduler decorator) — see `DESIGN.md` for the naming
//! collision this avoids.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::fiber::awaiter::Awaiter;
use crate::fiber::core::{Fiber, NoSwitchContextGuard};
use crate::fiber::handle::FiberHandle;
use crate::queue::intrusive::{IntrusiveNode, IntrusiveQueue};

type Job = Box<dyn FnOnce() + Send>;

const WAITING: u8 = 0;
const PARKED: u8 = 1;
const DONE: u8 = 2;

/// One queued closure plus the handshake a non-combiner submitter and the
/// combiner use to agree on who resumes the submitting fiber. Shared via
/// `Arc` so both the queue (which moves it out on pop) and the parked
/// submitter (which keeps its own clone) see the same handshake state.
struct Entry {
    job: UnsafeCell<Option<Job>>,
    state: AtomicU8,
    handle: UnsafeCell<Option<FiberHandle>>,
}

// Safety: `job` is taken exactly once, by whichever combiner pops this
// entry; `handle` is written only by the parked submitter and read only
// after the `state` CAS below hands it to the combiner — never both at
// once.
unsafe impl Send for Entry {}
unsafe impl Sync for Entry {}

impl Entry {
    fn new(job: Job) -> Self {
        Entry {
            job: UnsafeCell::new(Some(job)),
            state: AtomicU8::new(WAITING),
            handle: UnsafeCell::new(None),
        }
    }

    fn take_job(&self) -> Job {
        unsafe { (*self.job.get()).take() }.expect("entry's job already taken")
    }
}

pub struct Strand {
    queue: IntrusiveQueue<Arc<Entry>>,
    pending: AtomicUsize,
}

impl Strand {
    pub fn new() -> Self {
        Strand {
            queue: IntrusiveQueue::new(),
            pending: AtomicUsize::new(0),
        }
    }

    /// Run `f` exclusively with respect to every other call to `execute`
    /// on this strand, returning only once `f` has run. The calling fiber
    /// becomes the combiner if no one else is currently combining, and
    /// runs `f` plus any work that arrives while it's combining, directly;
    /// otherwise it parks until the combiner reaches its entry.
    ///
    /// `f` itself must not suspend the calling fiber: it may run on behalf
    /// of a different caller entirely, on whichever fiber became the
    /// combiner.
    pub fn execute(&self, f: impl FnOnce() + Send + 'static) {
        let entry = Arc::new(Entry::new(Box::new(f)));
        let node = Box::new(IntrusiveNode::new(entry.clone())).into_raw();
        self.queue.push(node);

        if self.pending.fetch_add(1, Ordering::AcqRel) == 0 {
            self.combine();
            return;
        }

        Self::park_until_done(&entry);
    }

    fn combine(&self) {
        let _guard = NoSwitchContextGuard::enter();
        loop {
            let entry = self
                .queue
                .pop()
                .expect("pending count > 0 implies a queued job");
            entry.take_job()();

            if let Err(_already_parked) =
                entry
                    .state
                    .compare_exchange(WAITING, DONE, Ordering::AcqRel, Ordering::Acquire)
            {
                let handle = unsafe { (*entry.handle.get()).take() }
                    .expect("entry marked parked has a waiting handle");
                Fiber::drive(handle);
            }

            if self.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
                break;
            }
        }
    }

    /// Suspend the calling fiber until `entry`'s job has run. Races with
    /// `combine` over who ever touches `entry.handle`: whichever of "the
    /// combiner marks the entry done" and "we park and record our handle"
    /// loses the `state` CAS below defers to the winner — the combiner
    /// resumes a handle it finds already stored, or the parking fiber
    /// resumes itself on discovering the entry was already done.
    ///
    /// # Panics
    /// If called from outside a fiber.
    fn park_until_done(entry: &Arc<Entry>) {
        if entry.state.load(Ordering::Acquire) == DONE {
            return;
        }

        struct ParkOnStrand<'a> {
            entry: &'a Entry,
        }
        impl Awaiter for ParkOnStrand<'_> {
            fn await_symmetric_suspend(&mut self, suspending: FiberHandle) -> FiberHandle {
                unsafe { *self.entry.handle.get() = Some(suspending) };
                match self
                    .entry
                    .state
                    .compare_exchange(WAITING, PARKED, Ordering::AcqRel, Ordering::Acquire)
                {
                    Ok(_) => FiberHandle::invalid(),
                    Err(_already_done) => unsafe { (*self.entry.handle.get()).take() }
                        .expect("we just stored our own handle above"),
                }
            }
        }

        Fiber::suspend_current(&mut ParkOnStrand { entry });
    }
}

impl Default for Strand {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc as StdArc, Mutex as StdMutex};

    use crate::scheduler::ThreadPool;
    use crate::sync::WaitGroup;

    #[test]
    fn serializes_appends_from_many_fibers() {
        // A non-combining `execute` call now parks the submitting fiber,
        // so this has to run every submitter on its own fiber rather than
        // a raw OS thread — there's nothing for `park_until_done` to
        // suspend otherwise.
        const SUBMITTERS: usize = 8;
        const PER_SUBMITTER: usize = 50;

        let pool = StdArc::new(ThreadPool::new(4));
        let strand = StdArc::new(Strand::new());
        let log = StdArc::new(StdMutex::new(Vec::new()));
        let group = StdArc::new(WaitGroup::new());
        group.add((SUBMITTERS * PER_SUBMITTER) as i64);

        for i in 0..SUBMITTERS {
            let strand = strand.clone();
            let log = log.clone();
            let group = group.clone();
            crate::go_on(pool.clone(), move || {
                for j in 0..PER_SUBMITTER {
                    let log = log.clone();
                    let group = group.clone();
                    strand.execute(move || {
                        log.lock().unwrap().push(i * PER_SUBMITTER + j);
                        group.done_one();
                    });
                }
            })
            .unwrap();
        }

        let waiter = crate::go_on(pool.clone(), move || group.wait()).unwrap();
        waiter.join();
        assert_eq!(log.lock().unwrap().len(), SUBMITTERS * PER_SUBMITTER);
    }

    #[test]
    fn execute_does_not_return_before_its_own_closure_ran() {
        let strand = Strand::new();
        let ran = StdArc::new(std::sync::atomic::AtomicBool::new(false));
        strand.execute(|| {});
        strand.execute(|| {});
        let flag = ran.clone();
        strand.execute(move || {
            flag.store(true, std::sync::atomic::Ordering::Relaxed);
        });
        assert!(ran.load(std::sync::atomic::Ordering::Relaxed));
    }
}
