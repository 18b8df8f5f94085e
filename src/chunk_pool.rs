//! The chunk pool: the external collaborator named in the core's spec as
//! `ChunkPool_allocate` / `ChunkPool_free` / `ChunkPool_find` /
//! `ChunkPool_overHalfAllocated` / `ChunkPool_pointerInChunkPool`.
//!
//! Structurally this is the teacher crate's `PageHeap` simplified for the
//! collector's needs: chunks are ephemeral and uniformly sized in the
//! common case, so there is no span-splitting/coalescing machinery — a
//! freed exactly-`CHUNK_ALIGNMENT`-sized chunk goes back on a single free
//! list (its header's own `next_chunk` field reused as the free-list link,
//! exactly as the teacher reuses a freed `Span`'s pointer fields), and an
//! oversized chunk (when `allocableSize` doesn't fit one aligned unit) is
//! mapped and released directly through `platform`, uncached. This
//! simplification is recorded in DESIGN.md: the teacher's span-splitting
//! carve/coalesce logic has no counterpart need here.

use crate::chunk::ChunkHeader;
use crate::chunk_registry::ChunkRegistry;
use crate::config::CHUNK_ALIGNMENT;
use crate::platform;
use crate::sync::SpinMutex;
use crate::{stat_add, stat_inc};
use core::ptr;
use core::sync::atomic::{AtomicU64, Ordering};

pub struct ChunkPool {
    /// Free list of retired, exactly-`CHUNK_ALIGNMENT`-sized chunks. Reuses
    /// each chunk's own `next_chunk` header field as the link.
    free_list: SpinMutex<*mut ChunkHeader>,
    /// Currently allocated (in-use, not cached) bytes.
    allocated_bytes: AtomicU64,
    /// High-water mark of bytes ever reserved from the OS. Used by
    /// `over_half_allocated` as the ratio's denominator; never decremented,
    /// matching `ChunkPool_overHalfAllocated`'s intent of tracking pressure
    /// against total committed capacity rather than current footprint.
    reserved_bytes: AtomicU64,
    registry: &'static ChunkRegistry,
}

unsafe impl Send for ChunkPool {}
unsafe impl Sync for ChunkPool {}

impl ChunkPool {
    pub const fn new(registry: &'static ChunkRegistry) -> Self {
        Self {
            free_list: SpinMutex::new(ptr::null_mut()),
            allocated_bytes: AtomicU64::new(0),
            reserved_bytes: AtomicU64::new(0),
            registry,
        }
    }

    /// Allocate a chunk whose total byte length is >= `min_bytes`, aligned
    /// to `CHUNK_ALIGNMENT`. Returns null on OS allocation failure.
    pub fn allocate(&self, min_bytes: usize) -> *mut ChunkHeader {
        if min_bytes <= CHUNK_ALIGNMENT {
            let mut guard = self.free_list.lock();
            let chunk = *guard;
            if !chunk.is_null() {
                *guard = unsafe { (*chunk).next_chunk };
                drop(guard);
                self.allocated_bytes
                    .fetch_add(CHUNK_ALIGNMENT as u64, Ordering::Relaxed);
                return chunk;
            }
            drop(guard);
            return self.os_allocate(CHUNK_ALIGNMENT);
        }
        let size = round_up(min_bytes, CHUNK_ALIGNMENT);
        self.os_allocate(size)
    }

    fn os_allocate(&self, size: usize) -> *mut ChunkHeader {
        let ptr = unsafe { platform::page_alloc(size) };
        if ptr.is_null() {
            return core::ptr::null_mut();
        }
        let chunk = ptr.cast::<ChunkHeader>();
        unsafe { self.registry.register(chunk, size) };
        self.allocated_bytes
            .fetch_add(size as u64, Ordering::Relaxed);
        self.reserved_bytes
            .fetch_add(size as u64, Ordering::Relaxed);
        stat_add!(os_alloc_bytes, size);
        stat_inc!(os_alloc_count);
        stat_inc!(chunks_allocated);
        chunk
    }

    /// Return a chunk to the pool.
    ///
    /// # Safety
    /// `chunk` must have been returned by `allocate` and must not still be
    /// linked into any level list.
    pub unsafe fn free(&self, chunk: *mut ChunkHeader) {
        let size = self.chunk_byte_len(chunk);
        self.allocated_bytes
            .fetch_sub(size as u64, Ordering::Relaxed);
        stat_inc!(chunks_freed);

        if size == CHUNK_ALIGNMENT {
            let mut guard = self.free_list.lock();
            unsafe { (*chunk).next_chunk = *guard };
            *guard = chunk;
        } else {
            unsafe { self.registry.unregister(chunk, size) };
            unsafe { platform::page_dealloc(chunk.cast(), size) };
        }
    }

    /// Find the chunk header covering `ptr`, or null if `ptr` is not in the
    /// pool (`ChunkPool_find`).
    #[inline]
    pub fn find(&self, ptr: *const u8) -> *mut ChunkHeader {
        self.registry.get(ptr)
    }

    /// `ChunkPool_pointerInChunkPool`.
    #[inline]
    pub fn pointer_in_chunk_pool(&self, ptr: *const u8) -> bool {
        !self.find(ptr).is_null()
    }

    /// The byte length of the chunk starting at `chunk`, derived from how
    /// many contiguous registry units still map to it.
    pub fn chunk_byte_len(&self, chunk: *mut ChunkHeader) -> usize {
        let mut units = 0usize;
        loop {
            let probe = unsafe { (chunk as *const u8).add(units * CHUNK_ALIGNMENT) };
            if self.registry.get(probe) == chunk {
                units += 1;
            } else {
                break;
            }
        }
        units * CHUNK_ALIGNMENT
    }

    /// `HM_getChunkLimit`: the chunk's physical end.
    pub fn chunk_limit(&self, chunk: *mut ChunkHeader) -> *mut u8 {
        (chunk as usize + self.chunk_byte_len(chunk)) as *mut u8
    }

    /// `ChunkPool_overHalfAllocated`: is currently-allocated capacity over
    /// `OVER_ALLOCATED_NUMERATOR / OVER_ALLOCATED_DENOMINATOR` of the
    /// high-water reservation?
    pub fn over_half_allocated(&self) -> bool {
        let allocated = self.allocated_bytes.load(Ordering::Relaxed);
        let reserved = self.reserved_bytes.load(Ordering::Relaxed);
        if reserved == 0 {
            return false;
        }
        allocated * crate::config::OVER_ALLOCATED_DENOMINATOR
            >= reserved * crate::config::OVER_ALLOCATED_NUMERATOR
    }
}

#[inline]
fn round_up(size: usize, align: usize) -> usize {
    (size + align - 1) & !(align - 1)
}

/// The process-wide chunk registry and pool, used by production callers.
/// Tests build their own leaked instances for isolation, matching the
/// teacher crate's `PageHeap`/`PageMap` test idiom.
static GLOBAL_REGISTRY: ChunkRegistry = ChunkRegistry::new();
pub static GLOBAL_POOL: ChunkPool = ChunkPool::new(&GLOBAL_REGISTRY);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::ChunkHeader;
    use alloc::boxed::Box;
    use alloc::vec::Vec;
    extern crate alloc;

    fn make_pool() -> &'static ChunkPool {
        let registry = Box::leak(Box::new(ChunkRegistry::new()));
        Box::leak(Box::new(ChunkPool::new(registry)))
    }

    #[test]
    fn test_allocate_and_free_single_chunk() {
        let pool = make_pool();
        let chunk = pool.allocate(64);
        assert!(!chunk.is_null());
        assert_eq!(pool.chunk_byte_len(chunk), CHUNK_ALIGNMENT);
        assert!(pool.pointer_in_chunk_pool(chunk.cast()));
        unsafe { pool.free(chunk) };
    }

    #[test]
    fn test_free_list_reuse() {
        let pool = make_pool();
        let c1 = pool.allocate(64);
        let addr1 = c1 as usize;
        unsafe { pool.free(c1) };
        let c2 = pool.allocate(64);
        assert_eq!(c2 as usize, addr1, "freed chunk should be reused");
        unsafe { pool.free(c2) };
    }

    #[test]
    fn test_oversized_chunk() {
        let pool = make_pool();
        let chunk = pool.allocate(CHUNK_ALIGNMENT * 2 + 1);
        assert!(!chunk.is_null());
        let len = pool.chunk_byte_len(chunk);
        assert_eq!(len, CHUNK_ALIGNMENT * 3);
        assert!(pool.pointer_in_chunk_pool(unsafe { (chunk as *const u8).add(CHUNK_ALIGNMENT) }));
        unsafe { pool.free(chunk) };
        assert!(!pool.pointer_in_chunk_pool(chunk.cast()));
    }

    #[test]
    fn test_find_interior_pointer() {
        let pool = make_pool();
        let chunk = pool.allocate(64);
        let interior = unsafe { (chunk as *const u8).add(200) };
        assert_eq!(pool.find(interior), chunk);
        unsafe { pool.free(chunk) };
    }

    #[test]
    fn test_over_half_allocated() {
        let pool = make_pool();
        assert!(!pool.over_half_allocated());
        let mut chunks = Vec::new();
        // Two fresh chunks: 100% of the first reservation is allocated.
        chunks.push(pool.allocate(64));
        assert!(pool.over_half_allocated());
        for c in chunks {
            unsafe { pool.free(c) };
        }
    }

    #[test]
    fn test_chunk_header_is_initializable_in_allocated_chunk() {
        let pool = make_pool();
        let chunk = pool.allocate(64);
        let start = ChunkHeader::chunk_start(chunk);
        unsafe { ChunkHeader::init_head(chunk, 3, core::ptr::null_mut(), start) };
        unsafe {
            assert!((*chunk).is_head());
            assert_eq!((*chunk).resolved_level(), 3);
        }
        unsafe { pool.free(chunk) };
    }
}
