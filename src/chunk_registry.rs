//! 3-level radix tree mapping chunk unit IDs to `*mut ChunkHeader`.
//!
//! Adapted from the teacher crate's `PageMap`: same lazy mid/leaf allocation,
//! same lock-free reads. The unit here is a `CHUNK_ALIGNMENT`-sized slot
//! (512 KiB by default) rather than a page, and the registered value is a
//! chunk header pointer rather than a `Span`. Chunks larger than one unit
//! (an `allocableSize` that doesn't fit in a single aligned unit) register
//! every unit they cover, so `ChunkPool_find`/`ChunkPool_pointerInChunkPool`
//! resolve correctly from any interior pointer.

use crate::chunk::ChunkHeader;
use crate::platform;
use core::ptr;
use core::sync::atomic::{AtomicPtr, Ordering};

const ROOT_BITS: usize = 10;
const MID_BITS: usize = 10;
const LEAF_BITS: usize = 9;

const ROOT_LEN: usize = 1 << ROOT_BITS;
const MID_LEN: usize = 1 << MID_BITS;
const LEAF_LEN: usize = 1 << LEAF_BITS;

const MID_SHIFT: usize = LEAF_BITS;
const ROOT_SHIFT: usize = LEAF_BITS + MID_BITS;

const MID_MASK: usize = (1 << MID_BITS) - 1;
const LEAF_MASK: usize = (1 << LEAF_BITS) - 1;

#[repr(C)]
struct MidNode {
    children: [AtomicPtr<LeafNode>; MID_LEN],
}

#[repr(C)]
struct LeafNode {
    chunks: [AtomicPtr<ChunkHeader>; LEAF_LEN],
}

/// 3-level radix tree for chunk_unit_id -> `*mut ChunkHeader` lookup.
pub struct ChunkRegistry {
    root: [AtomicPtr<MidNode>; ROOT_LEN],
}

unsafe impl Send for ChunkRegistry {}
unsafe impl Sync for ChunkRegistry {}

macro_rules! null_atomic_array {
    ($len:expr, $T:ty) => {{
        // SAFETY: AtomicPtr<T>::new(null_mut()) is just a null pointer,
        // which has the same bit pattern as zeroed memory.
        unsafe { core::mem::transmute::<[usize; $len], [AtomicPtr<$T>; $len]>([0usize; $len]) }
    }};
}

impl ChunkRegistry {
    #[allow(clippy::new_without_default)]
    pub const fn new() -> Self {
        Self {
            root: null_atomic_array!(ROOT_LEN, MidNode),
        }
    }

    #[inline]
    fn unit_id(ptr: *const u8) -> usize {
        (ptr as usize) >> crate::config::CHUNK_SHIFT
    }

    /// Look up the chunk header registered for the unit containing `ptr`.
    /// Lock-free.
    #[inline]
    pub fn get(&self, ptr: *const u8) -> *mut ChunkHeader {
        let unit = Self::unit_id(ptr);
        let root_idx = unit >> ROOT_SHIFT;
        let mid_idx = (unit >> MID_SHIFT) & MID_MASK;
        let leaf_idx = unit & LEAF_MASK;

        if root_idx >= ROOT_LEN {
            return ptr::null_mut();
        }

        let mid = self.root[root_idx].load(Ordering::Acquire);
        if mid.is_null() {
            return ptr::null_mut();
        }

        let leaf = unsafe { (*mid).children[mid_idx].load(Ordering::Acquire) };
        if leaf.is_null() {
            return ptr::null_mut();
        }

        unsafe { (*leaf).chunks[leaf_idx].load(Ordering::Acquire) }
    }

    /// Set the registered chunk for the unit containing `ptr`.
    ///
    /// # Safety
    /// Must be called under external synchronization (the chunk pool lock).
    unsafe fn set(&self, ptr: *const u8, chunk: *mut ChunkHeader) {
        let unit = Self::unit_id(ptr);
        let root_idx = unit >> ROOT_SHIFT;
        let mid_idx = (unit >> MID_SHIFT) & MID_MASK;
        let leaf_idx = unit & LEAF_MASK;

        assert!(root_idx < ROOT_LEN, "chunk address out of range for registry");

        let mut mid = self.root[root_idx].load(Ordering::Acquire);
        if mid.is_null() {
            mid = unsafe { Self::alloc_mid_node() };
            assert!(!mid.is_null(), "failed to allocate mid node for chunk registry");
            self.root[root_idx].store(mid, Ordering::Release);
        }

        let mut leaf = unsafe { (*mid).children[mid_idx].load(Ordering::Acquire) };
        if leaf.is_null() {
            leaf = unsafe { Self::alloc_leaf_node() };
            assert!(!leaf.is_null(), "failed to allocate leaf node for chunk registry");
            unsafe { (*mid).children[mid_idx].store(leaf, Ordering::Release) };
        }

        unsafe { (*leaf).chunks[leaf_idx].store(chunk, Ordering::Release) };
    }

    /// Register every unit covered by `[chunk, chunk + byte_len)`.
    ///
    /// # Safety
    /// Must be called under external synchronization.
    pub unsafe fn register(&self, chunk: *mut ChunkHeader, byte_len: usize) {
        let units = byte_len.div_ceil(1 << crate::config::CHUNK_SHIFT);
        let base = chunk as *const u8;
        for i in 0..units {
            let unit_ptr = unsafe { base.add(i << crate::config::CHUNK_SHIFT) };
            unsafe { self.set(unit_ptr, chunk) };
        }
    }

    /// Unregister every unit covered by `[chunk, chunk + byte_len)`.
    ///
    /// # Safety
    /// Must be called under external synchronization.
    pub unsafe fn unregister(&self, chunk: *mut ChunkHeader, byte_len: usize) {
        let units = byte_len.div_ceil(1 << crate::config::CHUNK_SHIFT);
        let base = chunk as *const u8;
        for i in 0..units {
            let unit_ptr = unsafe { base.add(i << crate::config::CHUNK_SHIFT) };
            unsafe { self.set(unit_ptr, ptr::null_mut()) };
        }
    }

    unsafe fn alloc_mid_node() -> *mut MidNode {
        let size = core::mem::size_of::<MidNode>();
        let ptr = unsafe { platform::page_alloc(size) };
        ptr.cast::<MidNode>()
    }

    unsafe fn alloc_leaf_node() -> *mut LeafNode {
        let size = core::mem::size_of::<LeafNode>();
        let ptr = unsafe { platform::page_alloc(size) };
        ptr.cast::<LeafNode>()
    }
}
