//! The six concrete end-to-end scenarios from the collector's testable
//! properties, run against the crate's reference `ObjectModel`/`Scheduler`.
//!
//! Assertions are structural (spine shape, slot addresses, chain integrity)
//! rather than counter-based, since the `stats` counters are a
//! feature-gated, observational-only addition and these scenarios must
//! hold under the crate's default feature set.

use hhgc::chunk::ChunkHeader;
use hhgc::chunk_pool::ChunkPool;
use hhgc::chunk_registry::ChunkRegistry;
use hhgc::collector::{collect_local, Roots};
use hhgc::hh::{self, HierarchicalHeap};
use hhgc::object_model::{ObjPtr, ObjectModel, ObjectTag, ReferenceObjectModel};
use hhgc::scheduler::ReferenceScheduler;
use std::alloc::{alloc, Layout};
use std::mem::size_of;

/// `GC_ENTER`/`GC_LEAVE`/`COPY` trace lines go through the `log` crate;
/// install a real subscriber so running these tests with `--nocapture`
/// shows the collector's own diagnostics instead of swallowing them.
/// `try_init` is idempotent across the multiple tests in this binary.
fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Walk a level list's heads (all fields used here are public) to find the
/// head at `level`.
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

fn levels_of(list: *mut ChunkHeader) -> Vec<u32> {
    let mut levels = Vec::new();
    let mut cur = list;
    unsafe {
        while !cur.is_null() {
            levels.push((*cur).level);
            cur = (*cur).trailer.head.next_head;
        }
    }
    levels
}

fn make_pool() -> Box<ChunkPool> {
    let registry: &'static ChunkRegistry = Box::leak(Box::new(ChunkRegistry::new()));
    Box::new(ChunkPool::new(registry))
}

fn alloc_normal_object(ptr_count: u32, non_ptr_bytes: u32) -> ObjPtr {
    let payload = non_ptr_bytes as usize + ptr_count as usize * size_of::<usize>();
    let total = size_of::<usize>() + payload;
    let layout = Layout::from_size_align(total, 8).unwrap();
    let base = unsafe { alloc(layout) };
    assert!(!base.is_null());
    let op = unsafe { std::ptr::NonNull::new_unchecked(base.add(size_of::<usize>())) };
    unsafe { ReferenceObjectModel::write_normal_header(op, ptr_count, non_ptr_bytes) };
    op
}

/// Copy a freestanding reference object into an HH's private range so the
/// collector treats it as belonging to that level, returning the slot value
/// the mutator would hold.
fn place_object_at_level(
    pool: &ChunkPool,
    hh: &mut HierarchicalHeap,
    model: &ReferenceObjectModel,
    level: u32,
    ptr_count: u32,
    non_ptr_bytes: u32,
) -> usize {
    let saved_level = hh.level;
    hh.set_level(level);
    hh.ensure_not_empty(pool, 4096);

    let src = alloc_normal_object(ptr_count, non_ptr_bytes);
    let metadata_size = model.metadata_size(ObjectTag::Normal);
    let object_size = model.sizeof_object(src);
    let record_size = metadata_size + object_size;

    let head = find_head(hh.level_list, level).expect("level head must exist after ensure_not_empty");
    let tail = unsafe { (*head).trailer.head.last_chunk };
    let dest_meta = unsafe { (*tail).frontier };
    unsafe {
        std::ptr::copy_nonoverlapping(
            (src.as_ptr() as *const u8).sub(metadata_size),
            dest_meta,
            record_size,
        );
        (*tail).frontier = dest_meta.add(record_size);
        std::alloc::dealloc(
            src.as_ptr().sub(metadata_size),
            Layout::from_size_align(record_size, 8).unwrap(),
        );
    }

    hh.set_level(saved_level);
    unsafe { dest_meta.add(metadata_size) as usize }
}

fn write_ptr_slot(holder: usize, target: usize) {
    unsafe { *(holder as *mut usize) = target };
}

fn read_ptr_slot(holder: usize) -> usize {
    unsafe { *(holder as *const usize) }
}

#[test]
fn scenario_1_empty_collection() {
    init_logging();
    let pool = make_pool();
    let model = ReferenceObjectModel::new();
    let scheduler = ReferenceScheduler::new(0);
    let mut hh = HierarchicalHeap::new(3);
    // Nothing above the steal level is allocated, so min_level (4) exceeds
    // max_level (3): the collector has no levels in scope and the fresh,
    // empty level-3 head survives untouched.
    hh.steal_level = 3;

    hh.ensure_not_empty(&pool, 64);
    let head_before = find_head(hh.level_list, 3).unwrap();
    let frontier_before = unsafe { (*head_before).frontier };
    let start = ChunkHeader::chunk_start(head_before);
    assert_eq!(frontier_before, start);

    let mut roots = Roots { stack: None, thread: None, deque: None };
    collect_local(&mut hh, &pool, &model, &scheduler, &mut roots);

    assert_eq!(levels_of(hh.level_list), vec![3]);
    let head_after = find_head(hh.level_list, 3).unwrap();
    assert_eq!(head_after, head_before, "untouched level must not be reallocated");
    assert_eq!(unsafe { (*head_after).frontier }, start);
}

#[test]
fn scenario_2_single_object_survives() {
    init_logging();
    let pool = make_pool();
    let model = ReferenceObjectModel::new();
    let scheduler = ReferenceScheduler::new(0);
    let mut hh = HierarchicalHeap::new(5);

    let stack_slot = place_object_at_level(&pool, &mut hh, &model, 5, 0, 64);
    let old_chunk = pool.find(stack_slot as *const u8);
    assert!(!old_chunk.is_null());

    let mut roots = Roots { stack: Some(stack_slot), thread: None, deque: None };
    collect_local(&mut hh, &pool, &model, &scheduler, &mut roots);

    let new_slot = roots.stack.expect("stack root preserved");
    assert_ne!(new_slot, stack_slot, "object must have moved");
    assert_eq!(levels_of(hh.level_list), vec![5]);

    let new_head = find_head(hh.level_list, 5).unwrap();
    let metadata_size = model.metadata_size(ObjectTag::Normal);
    let expected = ChunkHeader::chunk_start(new_head) as usize + metadata_size;
    assert_eq!(new_slot, expected, "forwarded object lands at offset 0 past to-space start");

    let new_op = unsafe { std::ptr::NonNull::new_unchecked(new_slot as *mut u8) };
    assert!(!model.has_fwd_ptr(new_op));
    assert_eq!(model.sizeof_object(new_op), 64);
}

#[test]
fn scenario_3_multi_level_drain() {
    init_logging();
    let pool = make_pool();
    let model = ReferenceObjectModel::new();
    let scheduler = ReferenceScheduler::new(0);
    let mut hh = HierarchicalHeap::new(5);

    // Chain: level5 -> level5 -> level4 -> level4 -> level3, each holding
    // one pointer to the next, rooted from the stack at the first object.
    let leaf = place_object_at_level(&pool, &mut hh, &model, 3, 0, 8);
    let n4b = place_object_at_level(&pool, &mut hh, &model, 4, 1, 0);
    write_ptr_slot(n4b, leaf);
    let n4a = place_object_at_level(&pool, &mut hh, &model, 4, 1, 0);
    write_ptr_slot(n4a, n4b);
    let n5b = place_object_at_level(&pool, &mut hh, &model, 5, 1, 0);
    write_ptr_slot(n5b, n4a);
    let n5a = place_object_at_level(&pool, &mut hh, &model, 5, 1, 0);
    write_ptr_slot(n5a, n5b);

    let mut roots = Roots { stack: Some(n5a), thread: None, deque: None };
    collect_local(&mut hh, &pool, &model, &scheduler, &mut roots);

    assert_eq!(levels_of(hh.level_list), vec![5, 4, 3]);

    // Walk the forwarded chain end to end: four hops through Normal nodes
    // down to the Normal leaf (ptr_count == 0).
    let new_n5a = roots.stack.unwrap();
    let mut cur = new_n5a;
    for _ in 0..4 {
        cur = read_ptr_slot(cur);
    }
    let leaf_op = unsafe { std::ptr::NonNull::new_unchecked(cur as *mut u8) };
    let (tag, non_ptr_bytes, ptr_count) = model.split_header(model.get_header(leaf_op));
    assert_eq!(tag, ObjectTag::Normal);
    assert_eq!(ptr_count, 0);
    assert_eq!(non_ptr_bytes, 8);
}

#[test]
fn scenario_4_garbage_at_one_level() {
    init_logging();
    let pool = make_pool();
    let model = ReferenceObjectModel::new();
    let scheduler = ReferenceScheduler::new(0);
    let mut hh = HierarchicalHeap::new(5);

    let leaf = place_object_at_level(&pool, &mut hh, &model, 3, 0, 8);
    let n4 = place_object_at_level(&pool, &mut hh, &model, 4, 1, 0);
    write_ptr_slot(n4, leaf);
    // Two level-5 objects allocated but never rooted: garbage.
    let _unreachable_a = place_object_at_level(&pool, &mut hh, &model, 5, 0, 16);
    let _unreachable_b = place_object_at_level(&pool, &mut hh, &model, 5, 0, 16);

    let mut roots = Roots { stack: Some(n4), thread: None, deque: None };
    collect_local(&mut hh, &pool, &model, &scheduler, &mut roots);

    assert_eq!(
        levels_of(hh.level_list),
        vec![4, 3],
        "level 5 head must be absent: nothing there was reachable"
    );

    let new_n4 = roots.stack.unwrap();
    let new_leaf = read_ptr_slot(new_n4);
    let leaf_op = unsafe { std::ptr::NonNull::new_unchecked(new_leaf as *mut u8) };
    assert_eq!(model.sizeof_object(leaf_op), 8);
}

#[test]
fn scenario_5_fork_merge() {
    init_logging();
    let pool = make_pool();
    let model = ReferenceObjectModel::new();
    let mut parent = HierarchicalHeap::new(2);
    let mut child = HierarchicalHeap::new(3);

    hh::append_child(&mut parent, &mut child);
    let _ = place_object_at_level(&pool, &mut child, &model, 3, 0, 32);
    child.set_level(2);
    parent.set_level(2);

    hh::merge_into_parent(&pool, &mut child);

    assert!(parent.child_hh_list.is_null(), "child must be unlinked from parent");
    assert_eq!(
        levels_of(parent.level_list),
        vec![3],
        "child's level-3 chunks must be present in parent's spine"
    );
}

#[test]
#[should_panic(expected = "entanglement")]
fn scenario_6_entanglement_detection() {
    init_logging();
    let pool = make_pool();
    let model = ReferenceObjectModel::new();
    let scheduler = ReferenceScheduler::new(0);
    let mut hh = HierarchicalHeap::new(8);

    let deep = place_object_at_level(&pool, &mut hh, &model, 9, 0, 8);
    let shallow = place_object_at_level(&pool, &mut hh, &model, 6, 1, 0);
    write_ptr_slot(shallow, deep);

    hh.set_level(8);
    let mut roots = Roots { stack: Some(shallow), thread: None, deque: None };
    collect_local(&mut hh, &pool, &model, &scheduler, &mut roots);
}
