//! Chunk header layout: a fixed, packed record placed at the start of every
//! chunk handed out by the chunk pool.
//!
//! Mirrors the teacher crate's `Span` — a `#[repr(C)]` metadata record
//! manipulated entirely through raw pointers — except the metadata here
//! lives *inside* the memory it describes (the original design's packed
//! in-band header) rather than in an out-of-band slab, since the level-head
//! discriminator and `containingHH` pointer must be reachable from a bare
//! object pointer during forwarding with no side table lookup.

use crate::hh::HierarchicalHeap;

/// Sentinel for `ChunkHeader::level` marking a non-head ("normal") chunk.
pub const INVALID_LEVEL: u32 = u32::MAX;

/// The head-chunk variant of the trailer: `{ nextHead, lastChunk, containingHH }`.
#[derive(Clone, Copy)]
#[repr(C)]
pub struct LevelHeadTrailer {
    /// Head chunk of the next (lower-numbered, older) level, or null.
    pub next_head: *mut ChunkHeader,
    /// Tail chunk of this level's list, for O(1) append.
    pub last_chunk: *mut ChunkHeader,
    /// The heap owning this level, or the `COPY_OBJECT_HH` sentinel while a
    /// collection is copying into this head as to-space.
    pub containing_hh: *mut HierarchicalHeap,
}

/// The normal-chunk variant of the trailer: a single `levelHead` link.
#[derive(Clone, Copy)]
#[repr(C)]
pub struct NormalTrailer {
    pub level_head: *mut ChunkHeader,
}

/// Discriminated by `ChunkHeader::level == INVALID_LEVEL` (normal) vs not
/// (head). Never read the wrong variant; `ChunkHeader` methods enforce this.
#[repr(C)]
pub union ChunkTrailer {
    pub head: LevelHeadTrailer,
    pub normal: NormalTrailer,
}

/// Packed header placed at the first bytes of every chunk.
///
/// # Invariants
/// - 8-byte aligned (guaranteed by `#[repr(C)]` field ordering on 64-bit).
/// - `frontier` lies in `[chunk_start(self), limit)`.
/// - if `level == INVALID_LEVEL`, `trailer.normal.level_head` is non-null and
///   its chain terminates at a head within one hop (the collector eagerly
///   demotes, so chains never grow deep).
#[repr(C)]
pub struct ChunkHeader {
    /// End of allocations so far within this chunk (the bump pointer).
    pub frontier: *mut u8,
    /// Next chunk within the same level's list, or null.
    pub next_chunk: *mut ChunkHeader,
    /// This chunk's level if it is a level head, else `INVALID_LEVEL`.
    pub level: u32,
    _pad: u32,
    pub trailer: ChunkTrailer,
}

impl ChunkHeader {
    #[inline]
    pub fn is_head(&self) -> bool {
        self.level != INVALID_LEVEL
    }

    /// Initialize a fresh chunk's header as a level head.
    ///
    /// # Safety
    /// `chunk` must point to a writable region at least `size_of::<ChunkHeader>()`
    /// bytes, itself within a chunk of at least `CHUNK_ALIGNMENT` bytes.
    pub unsafe fn init_head(
        chunk: *mut ChunkHeader,
        level: u32,
        containing_hh: *mut HierarchicalHeap,
        start: *mut u8,
    ) {
        unsafe {
            (*chunk).frontier = start;
            (*chunk).next_chunk = core::ptr::null_mut();
            (*chunk).level = level;
            (*chunk).trailer.head = LevelHeadTrailer {
                next_head: core::ptr::null_mut(),
                last_chunk: chunk,
                containing_hh,
            };
        }
    }

    /// Initialize a fresh chunk's header as a normal (non-head) chunk.
    ///
    /// # Safety
    /// Same as [`init_head`](Self::init_head).
    pub unsafe fn init_normal(chunk: *mut ChunkHeader, level_head: *mut ChunkHeader, start: *mut u8) {
        unsafe {
            (*chunk).frontier = start;
            (*chunk).next_chunk = core::ptr::null_mut();
            (*chunk).level = INVALID_LEVEL;
            (*chunk).trailer.normal = NormalTrailer { level_head };
        }
    }

    /// Walk to the level-head chunk for this chunk (self, if already a head).
    ///
    /// # Safety
    /// `self` must be part of a well-formed level list (invariant ii).
    pub unsafe fn level_head(&self) -> *mut ChunkHeader {
        if self.is_head() {
            self as *const ChunkHeader as *mut ChunkHeader
        } else {
            unsafe { self.trailer.normal.level_head }
        }
    }

    /// The level this chunk belongs to, resolved via `level_head` if needed.
    ///
    /// # Safety
    /// Same as [`level_head`](Self::level_head).
    pub unsafe fn resolved_level(&self) -> u32 {
        if self.is_head() {
            self.level
        } else {
            unsafe { (*self.level_head()).level }
        }
    }

    /// First byte past the header, rounded up to `config::OBJECT_ALIGNMENT`.
    pub fn chunk_start(chunk: *mut ChunkHeader) -> *mut u8 {
        let header_end = chunk as usize + core::mem::size_of::<ChunkHeader>();
        let align = crate::config::OBJECT_ALIGNMENT;
        let aligned = (header_end + align - 1) & !(align - 1);
        aligned as *mut u8
    }
}

const _ASSERT_ALIGNED: () = assert!(core::mem::align_of::<ChunkHeader>() <= 8);
const _ASSERT_FITS: () =
    assert!(core::mem::size_of::<ChunkHeader>() < crate::config::CHUNK_ALIGNMENT);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform;

    fn alloc_chunk_mem() -> *mut ChunkHeader {
        unsafe { platform::page_alloc(crate::config::CHUNK_ALIGNMENT).cast::<ChunkHeader>() }
    }

    #[test]
    fn test_init_head_and_normal() {
        unsafe {
            let chunk = alloc_chunk_mem();
            let start = ChunkHeader::chunk_start(chunk);
            ChunkHeader::init_head(chunk, 5, core::ptr::null_mut(), start);
            assert!((*chunk).is_head());
            assert_eq!((*chunk).resolved_level(), 5);
            assert_eq!((*chunk).level_head(), chunk);

            let chunk2 = alloc_chunk_mem();
            let start2 = ChunkHeader::chunk_start(chunk2);
            ChunkHeader::init_normal(chunk2, chunk, start2);
            assert!(!(*chunk2).is_head());
            assert_eq!((*chunk2).resolved_level(), 5);
            assert_eq!((*chunk2).level_head(), chunk);

            platform::page_dealloc(chunk.cast(), crate::config::CHUNK_ALIGNMENT);
            platform::page_dealloc(chunk2.cast(), crate::config::CHUNK_ALIGNMENT);
        }
    }

    #[test]
    fn test_chunk_start_is_aligned_and_past_header() {
        let chunk = alloc_chunk_mem();
        let start = ChunkHeader::chunk_start(chunk);
        assert!(start as usize >= chunk as usize + core::mem::size_of::<ChunkHeader>());
        assert_eq!(start as usize % crate::config::OBJECT_ALIGNMENT, 0);
        unsafe { platform::page_dealloc(chunk.cast(), crate::config::CHUNK_ALIGNMENT) };
    }
}
