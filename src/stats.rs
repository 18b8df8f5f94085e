//! Collection statistics counters.
//!
//! All counters use `Relaxed` ordering — they are observational only and not
//! used as synchronization primitives. The HH lock and queue lock provide
//! the ordering guarantees for correctness; these counters are purely for
//! monitoring, mirroring the teacher crate's `Stats`/`Snapshot` split.
//!
//! # Usage
//!
//! ```ignore
//! let snap = hhgc::stats::snapshot();
//! println!("objects copied: {}", snap.objects_copied);
//! ```
//!
//! Obtain a [`Snapshot`] with [`snapshot()`]. Individual counter loads are
//! individually atomic but not globally consistent with each other.

use core::sync::atomic::{AtomicU64, Ordering};

pub(crate) struct Stats {
    /// Total calls to `collect_local`.
    pub collections: AtomicU64,
    /// Total non-stack objects copied across all collections.
    pub objects_copied: AtomicU64,
    /// Total stack objects copied across all collections (counted separately
    /// per the forwarding algorithm's step 5).
    pub stacks_copied: AtomicU64,
    /// Total bytes copied (sum of `objectSize` across forwarded objects).
    pub bytes_copied: AtomicU64,
    /// Total chunks freed by `free_chunks` across all collections.
    pub chunks_freed: AtomicU64,
    /// Total chunks allocated via the chunk pool.
    pub chunks_allocated: AtomicU64,
    /// Calls to `platform::page_alloc` made by the chunk pool.
    pub os_alloc_count: AtomicU64,
    /// Bytes requested from the OS via `platform::page_alloc`.
    pub os_alloc_bytes: AtomicU64,
    /// Times `merge` found a same-level head collision and concatenated.
    pub level_merges: AtomicU64,
    /// Times `promote_chunks` moved a chunk down a level.
    pub promotions: AtomicU64,
    /// Entanglement aborts detected by the forwarder.
    pub entanglements: AtomicU64,
}

impl Stats {
    const fn new() -> Self {
        Self {
            collections: AtomicU64::new(0),
            objects_copied: AtomicU64::new(0),
            stacks_copied: AtomicU64::new(0),
            bytes_copied: AtomicU64::new(0),
            chunks_freed: AtomicU64::new(0),
            chunks_allocated: AtomicU64::new(0),
            os_alloc_count: AtomicU64::new(0),
            os_alloc_bytes: AtomicU64::new(0),
            level_merges: AtomicU64::new(0),
            promotions: AtomicU64::new(0),
            entanglements: AtomicU64::new(0),
        }
    }
}

pub(crate) static STATS: Stats = Stats::new();

/// A point-in-time snapshot of all collection statistics.
///
/// Fields are plain `u64` values loaded from the global atomic counters.
/// Individual fields are each atomically read, but the snapshot as a whole
/// is not globally consistent — a concurrent collection may race between
/// loads. For monitoring purposes this is always sufficient.
#[derive(Clone, Copy, Debug, Default)]
pub struct Snapshot {
    pub collections: u64,
    pub objects_copied: u64,
    pub stacks_copied: u64,
    pub bytes_copied: u64,
    pub chunks_freed: u64,
    pub chunks_allocated: u64,
    pub os_alloc_count: u64,
    pub os_alloc_bytes: u64,
    pub level_merges: u64,
    pub promotions: u64,
    pub entanglements: u64,
}

/// Load all counters with `Relaxed` ordering and return a [`Snapshot`].
pub fn snapshot() -> Snapshot {
    let s = &STATS;
    Snapshot {
        collections: s.collections.load(Ordering::Relaxed),
        objects_copied: s.objects_copied.load(Ordering::Relaxed),
        stacks_copied: s.stacks_copied.load(Ordering::Relaxed),
        bytes_copied: s.bytes_copied.load(Ordering::Relaxed),
        chunks_freed: s.chunks_freed.load(Ordering::Relaxed),
        chunks_allocated: s.chunks_allocated.load(Ordering::Relaxed),
        os_alloc_count: s.os_alloc_count.load(Ordering::Relaxed),
        os_alloc_bytes: s.os_alloc_bytes.load(Ordering::Relaxed),
        level_merges: s.level_merges.load(Ordering::Relaxed),
        promotions: s.promotions.load(Ordering::Relaxed),
        entanglements: s.entanglements.load(Ordering::Relaxed),
    }
}
