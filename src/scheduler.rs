//! The work-stealing scheduler interface named in §6, plus a reference
//! implementation used by tests. Reuses [`crate::sync::SpinLock`] for the
//! queue lock, the same primitive the HH lock is built on.

use crate::hh::HierarchicalHeap;
use crate::sync::SpinLock;
use core::cell::Cell;

/// `Parallel_lockTake` / `Parallel_lockRelease` / `Parallel_alreadyLockedByMe`
/// plus the per-worker process-state accessors the collector needs.
///
/// `already_locked_by_me` is intentionally delegated to the scheduler
/// rather than tracked inside the collector: the scheduler already knows
/// whether the calling worker entered through a critical section, and
/// duplicating that bookkeeping in the collector would be two sources of
/// truth for one fact.
pub trait Scheduler {
    fn lock_queue(&self);
    fn unlock_queue(&self);
    fn already_locked_by_me(&self) -> bool;
    fn processor_number(&self) -> u32;
    fn current_hierarchical_heap(&self) -> *mut HierarchicalHeap;
    fn set_current_hierarchical_heap(&self, hh: *mut HierarchicalHeap);
}

/// A single-worker reference scheduler: one queue lock, reentrancy tracked
/// via a per-thread flag (`Cell`, since the reference scheduler is itself
/// single-threaded — a real multi-worker scheduler would key this off its
/// own per-processor state instead).
pub struct ReferenceScheduler {
    queue_lock: SpinLock,
    held_by_me: Cell<bool>,
    processor_number: u32,
    current_hh: core::cell::Cell<*mut HierarchicalHeap>,
}

// SAFETY: the reference scheduler is used from tests driving a single
// logical worker at a time; `Cell` fields are never touched concurrently
// from two threads. A production scheduler would use per-processor state
// instead of shared `Cell`s.
unsafe impl Sync for ReferenceScheduler {}

impl ReferenceScheduler {
    pub const fn new(processor_number: u32) -> Self {
        Self {
            queue_lock: SpinLock::new(),
            held_by_me: Cell::new(false),
            processor_number,
            current_hh: core::cell::Cell::new(core::ptr::null_mut()),
        }
    }
}

impl Scheduler for ReferenceScheduler {
    fn lock_queue(&self) {
        if self.held_by_me.get() {
            return;
        }
        self.queue_lock.lock();
        self.held_by_me.set(true);
    }

    fn unlock_queue(&self) {
        if self.held_by_me.get() {
            self.held_by_me.set(false);
            self.queue_lock.unlock();
        }
    }

    fn already_locked_by_me(&self) -> bool {
        self.held_by_me.get()
    }

    fn processor_number(&self) -> u32 {
        self.processor_number
    }

    fn current_hierarchical_heap(&self) -> *mut HierarchicalHeap {
        self.current_hh.get()
    }

    fn set_current_hierarchical_heap(&self, hh: *mut HierarchicalHeap) {
        self.current_hh.set(hh);
    }
}

/// Guard for "take the queue lock unless already held", matching
/// `collectLocal`'s step 1 reentrancy rule. Releases on drop only if it
/// was this guard that acquired the lock.
pub struct QueueLockGuard<'a, S: Scheduler> {
    scheduler: &'a S,
    acquired: bool,
}

impl<'a, S: Scheduler> QueueLockGuard<'a, S> {
    pub fn acquire(scheduler: &'a S) -> Self {
        let already_held = scheduler.already_locked_by_me();
        if !already_held {
            scheduler.lock_queue();
        }
        Self {
            scheduler,
            acquired: !already_held,
        }
    }
}

impl<S: Scheduler> Drop for QueueLockGuard<'_, S> {
    fn drop(&mut self) {
        if self.acquired {
            self.scheduler.unlock_queue();
        }
    }
}
