//! Level list operations: the per-heap spine of per-level chunk lists.
//!
//! A level list is represented as a bare `*mut ChunkHeader` pointing at the
//! highest-level head, or null when empty. Heads are linked by descending
//! level through `trailer.head.next_head`; each head's own list of normal
//! chunks is linked through `next_chunk`, with `trailer.head.last_chunk`
//! caching the tail for O(1) append — the same "intrusive list, append via
//! cached tail pointer" shape the teacher crate uses for a `Span`'s free
//! list, just one level up.

use crate::chunk::{ChunkHeader, INVALID_LEVEL};
use crate::chunk_pool::ChunkPool;
use crate::die;
use crate::hh::HierarchicalHeap;
use crate::stat_inc;
use core::mem::size_of;

/// Acquire a chunk, install it as a *normal* chunk of `head_of_level`'s
/// list, and append it. Returns the new chunk and its physical end.
///
/// Per Design Note (b), both chunk-allocating primitives use this one
/// uniform signature.
pub fn allocate_chunk(
    pool: &ChunkPool,
    head_of_level: *mut ChunkHeader,
    allocable_size: usize,
) -> Option<(*mut ChunkHeader, *mut u8)> {
    debug_assert!(!head_of_level.is_null());
    debug_assert!(unsafe { (*head_of_level).is_head() });

    let min_bytes = allocable_size + size_of::<ChunkHeader>();
    let chunk = pool.allocate(min_bytes);
    if chunk.is_null() {
        return None;
    }
    let start = ChunkHeader::chunk_start(chunk);
    unsafe { ChunkHeader::init_normal(chunk, head_of_level, start) };

    unsafe {
        let last = (*head_of_level).trailer.head.last_chunk;
        (*last).next_chunk = chunk;
        (*head_of_level).trailer.head.last_chunk = chunk;
    }

    let limit = pool.chunk_limit(chunk);
    Some((chunk, limit))
}

/// Acquire a chunk, install it as a level head at `level` owned by
/// `owning_hh`, and splice it into `*list_slot` at the correct
/// descending-order position.
pub fn allocate_level_head_chunk(
    pool: &ChunkPool,
    list_slot: &mut *mut ChunkHeader,
    allocable_size: usize,
    level: u32,
    owning_hh: *mut HierarchicalHeap,
) -> Option<(*mut ChunkHeader, *mut u8)> {
    let min_bytes = allocable_size + size_of::<ChunkHeader>();
    let chunk = pool.allocate(min_bytes);
    if chunk.is_null() {
        return None;
    }
    let start = ChunkHeader::chunk_start(chunk);
    unsafe { ChunkHeader::init_head(chunk, level, owning_hh, start) };

    splice_head(list_slot, chunk, level);

    let limit = pool.chunk_limit(chunk);
    Some((chunk, limit))
}

/// Splice an already-initialized head chunk into `*list_slot`, maintaining
/// strictly descending level order. Dies if a head already exists at
/// `level` — merging same-level heads is the collector's job (`merge`),
/// never this primitive's.
fn splice_head(list_slot: &mut *mut ChunkHeader, chunk: *mut ChunkHeader, level: u32) {
    let mut prev: *mut ChunkHeader = core::ptr::null_mut();
    let mut cur = *list_slot;
    unsafe {
        while !cur.is_null() && (*cur).level > level {
            prev = cur;
            cur = (*cur).trailer.head.next_head;
        }
        if !cur.is_null() && (*cur).level == level {
            die!("splice_head: level {} already present in level list", level);
        }
        (*chunk).trailer.head.next_head = cur;
        if prev.is_null() {
            *list_slot = chunk;
        } else {
            (*prev).trailer.head.next_head = chunk;
        }
    }
}

/// `highest-level`: O(1) read of the spine's first head, or `INVALID_LEVEL`
/// if the list is empty.
pub fn highest_level(list: *mut ChunkHeader) -> u32 {
    if list.is_null() {
        INVALID_LEVEL
    } else {
        unsafe { (*list).level }
    }
}

/// `get-level`: the level `chunk` belongs to.
pub fn get_level(chunk: *mut ChunkHeader) -> u32 {
    unsafe { (*chunk).resolved_level() }
}

/// `merge(destination, source)`: splice every head of `source` into
/// `*destination`, concatenating onto an existing same-level head rather
/// than duplicating it.
pub fn merge(destination: &mut *mut ChunkHeader, source: *mut ChunkHeader) {
    let mut src_head = source;
    while !src_head.is_null() {
        let next_src_head = unsafe { (*src_head).trailer.head.next_head };
        let level = unsafe { (*src_head).level };

        match find_head(*destination, level) {
            Some(dst_head) => {
                demote_into(dst_head, src_head);
                stat_inc!(level_merges);
            }
            None => {
                splice_head(destination, src_head, level);
            }
        }

        src_head = next_src_head;
    }
}

/// Demote a head chunk (and its own chain of normal chunks) into `dst_head`,
/// appending at the tail and rewriting every demoted chunk's `level_head`
/// to point directly at `dst_head` — the one-hop chain invariant depends on
/// this eager fixup rather than leaving a chain through the old head.
fn demote_into(dst_head: *mut ChunkHeader, src_head: *mut ChunkHeader) {
    unsafe {
        let dst_last = (*dst_head).trailer.head.last_chunk;
        let chain = (*src_head).next_chunk;

        (*src_head).level = INVALID_LEVEL;
        (*src_head).trailer.normal.level_head = dst_head;

        let mut cur = chain;
        while !cur.is_null() {
            (*cur).trailer.normal.level_head = dst_head;
            cur = (*cur).next_chunk;
        }

        (*dst_last).next_chunk = src_head;
        let mut tail = src_head;
        while !(*tail).next_chunk.is_null() {
            tail = (*tail).next_chunk;
        }
        (*dst_head).trailer.head.last_chunk = tail;
    }
}

fn find_head(list: *mut ChunkHeader, level: u32) -> Option<*mut ChunkHeader> {
    let mut cur = list;
    unsafe {
        while !cur.is_null() {
            if (*cur).level == level {
                return Some(cur);
            }
            cur = (*cur).trailer.head.next_head;
        }
    }
    None
}

/// `free-chunks(listSlot, minLevel)`: release every chunk at level >=
/// `min_level` back to the pool. `*list_slot` is updated to the first
/// surviving head. Returns the number of chunks freed (heads and normal
/// chunks alike), for the collector's leave-time bookkeeping.
pub fn free_chunks(pool: &ChunkPool, list_slot: &mut *mut ChunkHeader, min_level: u32) -> u64 {
    let mut cur = *list_slot;
    let mut first_surviving: *mut ChunkHeader = core::ptr::null_mut();
    let mut last_surviving: *mut ChunkHeader = core::ptr::null_mut();
    let mut freed = 0u64;

    while !cur.is_null() {
        let next_head = unsafe { (*cur).trailer.head.next_head };
        if unsafe { (*cur).level } >= min_level {
            freed += free_one_level(pool, cur);
        } else if first_surviving.is_null() {
            first_surviving = cur;
            last_surviving = cur;
        } else {
            unsafe { (*last_surviving).trailer.head.next_head = cur };
            last_surviving = cur;
        }
        cur = next_head;
    }
    if !last_surviving.is_null() {
        unsafe { (*last_surviving).trailer.head.next_head = core::ptr::null_mut() };
    }
    *list_slot = first_surviving;
    freed
}

/// Free every chunk in one level's list (the head and its normal chunks).
/// Returns the count of chunks freed.
fn free_one_level(pool: &ChunkPool, head: *mut ChunkHeader) -> u64 {
    let mut count = 0u64;
    let mut cur = unsafe { (*head).next_chunk };
    while !cur.is_null() {
        let next = unsafe { (*cur).next_chunk };
        unsafe { pool.free(cur) };
        count += 1;
        cur = next;
    }
    unsafe { pool.free(head) };
    count + 1
}

/// `promote-chunks(listSlot, level)`: move every chunk at exactly `level`
/// down to `level - 1`, merging into (creating if needed) the `level - 1`
/// head.
pub fn promote_chunks(pool: &ChunkPool, list_slot: &mut *mut ChunkHeader, level: u32) {
    debug_assert!(level > 0, "cannot promote below level 0");
    let Some(src_head) = find_head(*list_slot, level) else {
        return;
    };
    // Detach src_head from the list first.
    remove_head(list_slot, src_head);

    match find_head(*list_slot, level - 1) {
        Some(dst_head) => {
            demote_into(dst_head, src_head);
        }
        None => {
            unsafe { (*src_head).level = level - 1 };
            splice_head(list_slot, src_head, level - 1);
        }
    }
    stat_inc!(promotions);
}

fn remove_head(list_slot: &mut *mut ChunkHeader, target: *mut ChunkHeader) {
    let mut prev: *mut ChunkHeader = core::ptr::null_mut();
    let mut cur = *list_slot;
    unsafe {
        while !cur.is_null() {
            let next = (*cur).trailer.head.next_head;
            if cur == target {
                if prev.is_null() {
                    *list_slot = next;
                } else {
                    (*prev).trailer.head.next_head = next;
                }
                return;
            }
            prev = cur;
            cur = next;
        }
    }
}

/// `update-level-list-pointers`: rewrite every head's `containingHH`.
pub fn update_level_list_pointers(list: *mut ChunkHeader, new_hh: *mut HierarchicalHeap) {
    let mut cur = list;
    unsafe {
        while !cur.is_null() {
            (*cur).trailer.head.containing_hh = new_hh;
            cur = (*cur).trailer.head.next_head;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk_registry::ChunkRegistry;
    use alloc::boxed::Box;
    extern crate alloc;

    fn make_pool() -> &'static ChunkPool {
        let registry = Box::leak(Box::new(ChunkRegistry::new()));
        Box::leak(Box::new(ChunkPool::new(registry)))
    }

    #[test]
    fn test_allocate_level_head_and_append_chunk() {
        let pool = make_pool();
        let mut list: *mut ChunkHeader = core::ptr::null_mut();
        let (head, _) =
            allocate_level_head_chunk(pool, &mut list, 64, 3, core::ptr::null_mut()).unwrap();
        assert_eq!(highest_level(list), 3);
        assert_eq!(list, head);

        let (chunk2, _) = allocate_chunk(pool, head, 64).unwrap();
        assert_eq!(get_level(chunk2), 3);
        unsafe {
            assert_eq!((*head).trailer.head.last_chunk, chunk2);
        }
    }

    #[test]
    fn test_splice_descending_order() {
        let pool = make_pool();
        let mut list: *mut ChunkHeader = core::ptr::null_mut();
        allocate_level_head_chunk(pool, &mut list, 64, 3, core::ptr::null_mut()).unwrap();
        allocate_level_head_chunk(pool, &mut list, 64, 5, core::ptr::null_mut()).unwrap();
        allocate_level_head_chunk(pool, &mut list, 64, 1, core::ptr::null_mut()).unwrap();

        let mut levels = alloc::vec::Vec::new();
        let mut cur = list;
        unsafe {
            while !cur.is_null() {
                levels.push((*cur).level);
                cur = (*cur).trailer.head.next_head;
            }
        }
        assert_eq!(levels, alloc::vec![5, 3, 1]);
    }

    #[test]
    fn test_free_chunks_above_min_level() {
        let pool = make_pool();
        let mut list: *mut ChunkHeader = core::ptr::null_mut();
        allocate_level_head_chunk(pool, &mut list, 64, 5, core::ptr::null_mut()).unwrap();
        allocate_level_head_chunk(pool, &mut list, 64, 3, core::ptr::null_mut()).unwrap();
        allocate_level_head_chunk(pool, &mut list, 64, 1, core::ptr::null_mut()).unwrap();

        free_chunks(pool, &mut list, 3);
        assert_eq!(highest_level(list), 1);
    }

    #[test]
    fn test_promote_chunks_creates_new_head() {
        let pool = make_pool();
        let mut list: *mut ChunkHeader = core::ptr::null_mut();
        allocate_level_head_chunk(pool, &mut list, 64, 5, core::ptr::null_mut()).unwrap();
        promote_chunks(pool, &mut list, 5);
        assert_eq!(highest_level(list), 4);
    }

    #[test]
    fn test_promote_chunks_merges_into_existing_head() {
        let pool = make_pool();
        let mut list: *mut ChunkHeader = core::ptr::null_mut();
        allocate_level_head_chunk(pool, &mut list, 64, 4, core::ptr::null_mut()).unwrap();
        allocate_level_head_chunk(pool, &mut list, 64, 5, core::ptr::null_mut()).unwrap();
        promote_chunks(pool, &mut list, 5);
        assert_eq!(highest_level(list), 4);
        // only one head left at level 4
        unsafe {
            assert!((*list).trailer.head.next_head.is_null());
        }
    }
}
