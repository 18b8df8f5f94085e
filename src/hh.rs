//! The hierarchical heap (HH): the task-local heap object described in §3
//! and the lifecycle API of §4.6.

use crate::chunk::ChunkHeader;
use crate::chunk_pool::ChunkPool;
use crate::die;
use crate::level_list;
use crate::sync::SpinLock;
use core::fmt;
use core::ptr;

/// `hhCollectionLevel ∈ {NONE, SUPERLOCAL, ALL}` (§6).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CollectionLevel {
    None,
    SuperLocal,
    All,
}

/// Distinguished sentinel written into a to-space head's `containingHH`
/// during collection (Design Notes: "Global sentinel `COPY_OBJECT_HH`").
/// Never dereferenced; tested for by pointer equality only.
pub const COPY_OBJECT_HH: *mut HierarchicalHeap = usize::MAX as *mut HierarchicalHeap;

/// One per live task (§3).
pub struct HierarchicalHeap {
    lock: SpinLock,

    /// Current (deepest) level at which the task is allocating.
    pub level: u32,
    /// Highest level number stolen from this task; levels above are private.
    pub steal_level: u32,

    /// Owning pointer to the spine.
    pub level_list: *mut ChunkHeader,
    /// To-space spine, valid only during a local collection.
    pub new_level_list: *mut ChunkHeader,

    /// Mutator fast-path cache.
    pub saved_frontier: *mut u8,
    pub limit: *mut u8,
    pub last_allocated_chunk: *mut ChunkHeader,

    /// Dynamic task tree links.
    pub parent_hh: *mut HierarchicalHeap,
    pub next_child_hh: *mut HierarchicalHeap,
    pub child_hh_list: *mut HierarchicalHeap,

    /// Roots owned by the task.
    pub thread: usize,
    pub ret_val: usize,

    /// Size accounting for private levels.
    pub locally_collectible_size: u64,
    pub locally_collectible_heap_size: u64,

    pub collection_level: CollectionLevel,
}

unsafe impl Send for HierarchicalHeap {}

impl HierarchicalHeap {
    pub fn new(level: u32) -> Self {
        Self {
            lock: SpinLock::new(),
            level,
            steal_level: 0,
            level_list: ptr::null_mut(),
            new_level_list: ptr::null_mut(),
            saved_frontier: ptr::null_mut(),
            limit: ptr::null_mut(),
            last_allocated_chunk: ptr::null_mut(),
            parent_hh: ptr::null_mut(),
            next_child_hh: ptr::null_mut(),
            child_hh_list: ptr::null_mut(),
            thread: 0,
            ret_val: 0,
            locally_collectible_size: 0,
            locally_collectible_heap_size: 0,
            collection_level: CollectionLevel::All,
        }
    }

    pub fn lock(&self) {
        self.lock.lock();
    }

    pub fn unlock(&self) {
        self.lock.unlock();
    }

    /// `getSavedFrontier`.
    pub fn get_saved_frontier(&self) -> *mut u8 {
        self.saved_frontier
    }

    /// `getLimit`.
    pub fn get_limit(&self) -> *mut u8 {
        self.limit
    }

    /// `getCurrent`: the chunk the mutator is currently bump-allocating in.
    pub fn get_current(&self) -> *mut ChunkHeader {
        self.last_allocated_chunk
    }

    /// `getContaining`: the HH owning the chunk containing `ptr`, resolved
    /// via the chunk's level head (never `COPY_OBJECT_HH` outside an
    /// in-progress collection).
    pub fn get_containing(pool: &ChunkPool, ptr: *const u8) -> *mut HierarchicalHeap {
        let chunk = pool.find(ptr);
        if chunk.is_null() {
            return ptr::null_mut();
        }
        unsafe {
            let head = (*chunk).level_head();
            (*head).trailer.head.containing_hh
        }
    }

    /// `getObjptrLevel`.
    pub fn get_objptr_level(pool: &ChunkPool, ptr: *const u8) -> u32 {
        let chunk = pool.find(ptr);
        if chunk.is_null() {
            return crate::chunk::INVALID_LEVEL;
        }
        unsafe { (*chunk).resolved_level() }
    }

    /// `objptrInHierarchicalHeap`.
    pub fn objptr_in_hierarchical_heap(pool: &ChunkPool, ptr: *const u8) -> bool {
        pool.pointer_in_chunk_pool(ptr)
    }

    /// `ensureNotEmpty`: guarantee the level list has at least one chunk at
    /// `hh.level`, allocating a fresh level head if needed.
    pub fn ensure_not_empty(&mut self, pool: &ChunkPool, min_allocable: usize) {
        if level_list::highest_level(self.level_list) == self.level {
            return;
        }
        let self_ptr: *mut HierarchicalHeap = self;
        let Some((chunk, limit)) = level_list::allocate_level_head_chunk(
            pool,
            &mut self.level_list,
            min_allocable,
            self.level,
            self_ptr,
        ) else {
            die!("ensure_not_empty: chunk pool exhausted");
        };
        self.saved_frontier = crate::chunk::ChunkHeader::chunk_start(chunk);
        self.limit = limit;
        self.last_allocated_chunk = chunk;
    }

    /// `updateValues`: write back the mutator's current frontier before a
    /// safe point (spec §4.4 precondition).
    pub fn update_values(&mut self, frontier: *mut u8) {
        if !self.last_allocated_chunk.is_null() {
            unsafe { (*self.last_allocated_chunk).frontier = frontier };
        }
        self.saved_frontier = frontier;
    }

    /// `updateLevelListPointers`: after moving this HH (e.g. across a
    /// merge), rewrite every head's `containingHH`.
    pub fn update_level_list_pointers(&mut self) {
        let self_ptr: *mut HierarchicalHeap = self;
        level_list::update_level_list_pointers(self.level_list, self_ptr);
    }

    /// `setLevel`: unsynchronised, owning-worker-only setter.
    pub fn set_level(&mut self, level: u32) {
        self.level = level;
    }

    /// `getLevel`.
    pub fn get_level(&self) -> u32 {
        self.level
    }

    /// `promoteChunks`: move every chunk at `self.level` down a level.
    pub fn promote_chunks(&mut self, pool: &ChunkPool) {
        if self.level == 0 {
            return;
        }
        level_list::promote_chunks(pool, &mut self.level_list, self.level);
    }

    /// `extend`: mutator slow-path allocator refill (§4.6).
    pub fn extend<M: crate::object_model::ObjectModel, S: crate::scheduler::Scheduler>(
        &mut self,
        pool: &ChunkPool,
        model: &M,
        scheduler: &S,
        bytes: usize,
    ) -> bool {
        if pool.over_half_allocated() {
            let mut roots = crate::collector::Roots {
                stack: None,
                thread: None,
                deque: None,
            };
            crate::collector::collect_local(self, pool, model, scheduler, &mut roots);
        }

        let result = if level_list::highest_level(self.level_list) == self.level {
            level_list::allocate_chunk(pool, self.level_list, bytes)
        } else {
            let self_ptr: *mut HierarchicalHeap = self;
            level_list::allocate_level_head_chunk(pool, &mut self.level_list, bytes, self.level, self_ptr)
        };

        match result {
            Some((chunk, limit)) => {
                self.saved_frontier = unsafe { (*chunk).frontier };
                self.limit = limit;
                self.last_allocated_chunk = chunk;
                true
            }
            None => false,
        }
    }

    /// `sizeof`.
    pub fn sizeof() -> usize {
        core::mem::size_of::<HierarchicalHeap>()
    }

    /// `offsetof(field)`: byte offset of a named field, used by the
    /// mutator's generated fast-path code to read the cache fields without
    /// going through a function call.
    pub fn offsetof_saved_frontier() -> usize {
        core::mem::offset_of!(HierarchicalHeap, saved_frontier)
    }

    pub fn offsetof_limit() -> usize {
        core::mem::offset_of!(HierarchicalHeap, limit)
    }
}

impl fmt::Debug for HierarchicalHeap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HierarchicalHeap")
            .field("level", &self.level)
            .field("steal_level", &self.steal_level)
            .field("highest_level", &level_list::highest_level(self.level_list))
            .finish()
    }
}

/// `display`.
pub fn display(hh: &HierarchicalHeap) {
    log::info!(
        target: "hhgc::hh",
        "HH level={} steal_level={} highest_level={}",
        hh.level,
        hh.steal_level,
        level_list::highest_level(hh.level_list)
    );
}

/// `appendChild(parent, child)` (§4.6).
pub fn append_child(parent: &mut HierarchicalHeap, child: &mut HierarchicalHeap) {
    parent.lock();
    child.lock();

    assert!(child.parent_hh.is_null(), "child already has a parent");
    assert!(child.next_child_hh.is_null(), "child already linked");

    let child_ptr: *mut HierarchicalHeap = child;
    let parent_ptr: *mut HierarchicalHeap = parent;
    child.next_child_hh = parent.child_hh_list;
    parent.child_hh_list = child_ptr;
    child.parent_hh = parent_ptr;

    child.unlock();
    parent.unlock();
}

/// `mergeIntoParent(child)` (§4.6).
pub fn merge_into_parent(pool: &ChunkPool, child: &mut HierarchicalHeap) {
    let parent_ptr = child.parent_hh;
    assert!(!parent_ptr.is_null(), "merge_into_parent: child has no parent");
    let parent = unsafe { &mut *parent_ptr };

    parent.lock();
    child.lock();

    assert_eq!(
        child.level, parent.level,
        "merge_into_parent: only valid at a join point"
    );

    let child_ptr: *mut HierarchicalHeap = child;
    remove_child(parent, child_ptr);

    level_list::merge(&mut parent.level_list, child.level_list);
    parent.update_level_list_pointers();
    child.level_list = ptr::null_mut();
    child.parent_hh = ptr::null_mut();

    child.unlock();
    parent.unlock();

    let _ = pool;
}

fn remove_child(parent: &mut HierarchicalHeap, target: *mut HierarchicalHeap) {
    let mut prev: *mut HierarchicalHeap = ptr::null_mut();
    let mut cur = parent.child_hh_list;
    while !cur.is_null() {
        let next = unsafe { (*cur).next_child_hh };
        if cur == target {
            if prev.is_null() {
                parent.child_hh_list = next;
            } else {
                unsafe { (*prev).next_child_hh = next };
            }
            unsafe { (*cur).next_child_hh = ptr::null_mut() };
            return;
        }
        prev = cur;
        cur = next;
    }
    die!("remove_child: child not found in parent's child list");
}

/// Deprecated poison pill (Design Notes / DESIGN.md): the source tree
/// carries a disabled stub that aborts unconditionally. Never implement
/// global-heap-hole enumeration in the core.
pub fn populate_global_heap_holes() -> ! {
    unimplemented!("populateGlobalHeapHoles is a deprecated poison pill and must never be invoked")
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
    fn test_ensure_not_empty_allocates_head() {
        let pool = make_pool();
        let mut hh = HierarchicalHeap::new(3);
        hh.ensure_not_empty(pool, 64);
        assert_eq!(level_list::highest_level(hh.level_list), 3);
        assert!(hh.get_saved_frontier() < hh.get_limit());
        assert!(!hh.get_current().is_null());
    }

    #[test]
    fn test_append_and_merge() {
        let pool = make_pool();
        let mut parent = HierarchicalHeap::new(2);
        let mut child = HierarchicalHeap::new(3);
        append_child(&mut parent, &mut child);
        assert_eq!(parent.child_hh_list as *const _, &child as *const _);

        child.ensure_not_empty(pool, 64);
        child.set_level(2);
        parent.set_level(2);
        merge_into_parent(pool, &mut child);

        assert!(parent.child_hh_list.is_null());
        assert_eq!(level_list::highest_level(parent.level_list), 2);
    }

    #[test]
    fn test_promote_chunks_on_hh() {
        let pool = make_pool();
        let mut hh = HierarchicalHeap::new(4);
        hh.ensure_not_empty(pool, 64);
        hh.promote_chunks(pool);
        assert_eq!(level_list::highest_level(hh.level_list), 3);
    }

    #[test]
    #[should_panic(expected = "deprecated poison pill")]
    fn test_populate_global_heap_holes_is_a_poison_pill() {
        populate_global_heap_holes();
    }
}
