//! Guard-paged stack allocation and a process-global free-list pool.
//!
//! Grounded on `slide-rs-bran/src/stack.rs` (`Stack`, `StackPool`,
//! `take_stack`/`give_stack`, pool cap 256), reworked to call
//! `libc::mmap`/`mprotect` directly (the `mmap` crate bran depended on is
//! unmaintained) and to protect the pool's free list with the runtime's
//! own `queue::qspinlock::QSpinlock` instead of `std::sync::Mutex`, per
//! `concurrency/qspinlock.hpp` in the original source.

use std::ptr::NonNull;

use crate::context::machine::MachineContext;
use crate::context::trampoline::{filament_trampoline_entry, BootstrapArgs};
use crate::queue::qspinlock::QSpinlock;
use crate::util::abort::programmer_error;

/// Default stack size for a fiber, matching bran's own default (2 MiB,
/// one guard page).
pub const DEFAULT_STACK_SIZE: usize = 2 * 1024 * 1024;

fn page_size() -> usize {
    // Safety: sysconf with _SC_PAGESIZE never fails on a real system.
    unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize }
}

/// An mmap'd stack with a no-access guard page at its low end.
pub struct Stack {
    base: NonNull<u8>,
    len: usize,
    /// Bytes reserved for the guard page (not usable stack space).
    guard_len: usize,
}

// Safety: ownership of the mapped region transfers with the `Stack`.
unsafe impl Send for Stack {}

impl Stack {
    /// Allocate a new stack of at least `requested_len` usable bytes, plus
    /// one guard page.
    pub fn new(requested_len: usize) -> Option<Stack> {
        let page = page_size();
        let usable_len = requested_len.max(page).next_multiple_of(page);
        let total_len = usable_len + page;

        // Safety: MAP_PRIVATE|MAP_ANONYMOUS reserves a fresh mapping we
        // exclusively own; we check the result before using it.
        let base = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                total_len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if base == libc::MAP_FAILED {
            return None;
        }

        // Safety: `base` is a fresh mapping of `total_len` bytes; the
        // first page becomes the guard page (stacks grow down, so the
        // guard must sit below the usable region).
        let guard_ok = unsafe { libc::mprotect(base, page, libc::PROT_NONE) == 0 };
        if !guard_ok {
            // Safety: `base`/`total_len` match the mmap call above.
            unsafe { libc::munmap(base, total_len) };
            return None;
        }

        Some(Stack {
            // Safety: mmap did not return MAP_FAILED or null above.
            base: NonNull::new(base as *mut u8).unwrap(),
            len: usable_len,
            guard_len: page,
        })
    }

    fn usable_base(&self) -> *mut u8 {
        // Safety: within the mapped region, past the guard page.
        unsafe { self.base.as_ptr().add(self.guard_len) }
    }

    fn top(&self) -> *mut u8 {
        // Safety: within the mapped region.
        unsafe { self.usable_base().add(self.len) }
    }

    /// Write the initial saved frame so that switching into the returned
    /// context begins executing `entry(arg)`.
    ///
    /// `args` is leaked onto the heap; the coroutine trampoline that
    /// eventually runs on this stack is responsible for reclaiming it (see
    /// `coroutine::coroutine_trampoline`).
    pub fn prime(&self, entry: extern "C" fn(*mut ()) -> !, arg: *mut ()) -> MachineContext {
        let args = Box::into_raw(Box::new(BootstrapArgs { entry, arg }));

        let mut top = self.top() as usize;
        top &= !0xf; // 16-byte align the stack top per the SysV ABI.

        // Frame layout matches `filament_swap_context`'s pop sequence:
        // r15, r14, r13, r12, rbx, rbp, return address — from low to high.
        let frame_words = 7usize;
        let frame_base = (top - frame_words * 8) as *mut usize;

        // Safety: frame_base..top is freshly mapped, writable stack memory.
        unsafe {
            frame_base.add(0).write(0); // r15
            frame_base.add(1).write(0); // r14
            frame_base.add(2).write(0); // r13
            frame_base.add(3).write(0); // r12
            frame_base.add(4).write(args as usize); // rbx: BootstrapArgs*
            frame_base.add(5).write(0); // rbp
            frame_base
                .add(6)
                .write(filament_trampoline_entry as usize); // return address
        }

        let mut ctx = MachineContext::empty();
        ctx.set_rsp(frame_base as *mut u8);
        ctx
    }
}

impl Drop for Stack {
    fn drop(&mut self) {
        let total_len = self.len + self.guard_len;
        // Safety: `base`/`total_len` match the mmap call in `Stack::new`.
        let ok = unsafe { libc::munmap(self.base.as_ptr() as *mut libc::c_void, total_len) == 0 };
        if !ok {
            programmer_error("munmap failed while dropping a fiber stack");
        }
    }
}

struct PoolEntry {
    stack: Stack,
    next: Option<Box<PoolEntry>>,
}

/// Process-global pool of unused stacks, reused across fiber spawns to
/// avoid repeated `mmap`/`munmap` churn. Capacity matches
/// `slide-rs-bran`'s `StackPool` (256).
pub struct StackPool {
    lock: QSpinlock,
    free: std::cell::UnsafeCell<Option<Box<PoolEntry>>>,
    count: std::sync::atomic::AtomicUsize,
    cap: usize,
}

// Safety: all access to `free` is serialized by `lock`.
unsafe impl Sync for StackPool {}

impl StackPool {
    pub const fn new() -> Self {
        StackPool {
            lock: QSpinlock::new(),
            free: std::cell::UnsafeCell::new(None),
            count: std::sync::atomic::AtomicUsize::new(0),
            cap: 256,
        }
    }

    /// Take a pooled stack of at least `len` usable bytes, or allocate a
    /// fresh one if the pool is empty or its head isn't large enough.
    ///
    /// Only the head of the free list is consulted (matching bran's own
    /// `StackPool`, which pools a single size class in practice): fibers
    /// overwhelmingly request the default stack size, so a linear scan for
    /// a better fit would spend more cycles than the mmap it's trying to
    /// avoid.
    pub fn take(&self, len: usize) -> Option<Stack> {
        let guard = self.lock.lock();
        // Safety: exclusive access under `guard`.
        let free = unsafe { &mut *self.free.get() };
        let fits = matches!(free, Some(entry) if entry.stack.len >= len);
        let reused = if fits {
            let entry = free.take().unwrap();
            *free = entry.next;
            self.count.fetch_sub(1, std::sync::atomic::Ordering::Relaxed);
            Some(entry.stack)
        } else {
            None
        };
        drop(guard);
        reused.or_else(|| Stack::new(len))
    }

    /// Return a stack to the pool, dropping it instead if the pool is at
    /// capacity.
    pub fn give(&self, stack: Stack) {
        let guard = self.lock.lock();
        if self.count.load(std::sync::atomic::Ordering::Relaxed) >= self.cap {
            drop(guard);
            drop(stack);
            return;
        }
        // Safety: exclusive access under `guard`.
        let free = unsafe { &mut *self.free.get() };
        let entry = Box::new(PoolEntry {
            stack,
            next: free.take(),
        });
        *free = Some(entry);
        self.count.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    }
}

impl Default for StackPool {
    fn default() -> Self {
        Self::new()
    }
}

static GLOBAL_POOL: StackPool = StackPool::new();

/// The process-wide stack pool used by `fiber::go` unless a caller
/// supplies their own.
pub fn global_pool() -> &'static StackPool {
    &GLOBAL_POOL
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_and_drops() {
        let stack = Stack::new(DEFAULT_STACK_SIZE).expect("mmap should succeed");
        assert!(stack.len >= DEFAULT_STACK_SIZE);
    }

    #[test]
    fn pool_round_trips() {
        let pool = StackPool::new();
        let stack = pool.take(DEFAULT_STACK_SIZE).expect("alloc");
        pool.give(stack);
        assert_eq!(pool.count.load(std::sync::atomic::Ordering::Relaxed), 1);
        let again = pool.take(DEFAULT_STACK_SIZE);
        assert!(again.is_some());
        assert_eq!(pool.count.load(std::sync::atomic::Ordering::Relaxed), 0);
    }
}
