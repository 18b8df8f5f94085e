//! The object copier (§4.3): size computation and bump-copy into a
//! to-space level list.

use crate::chunk::ChunkHeader;
use crate::chunk_pool::ChunkPool;
use crate::die;
use crate::level_list;
use crate::object_model::{ObjPtr, ObjectModel, ObjectTag};
use core::ptr::NonNull;

/// Output of `computeObjectCopyParameters`.
pub struct CopyParameters {
    pub tag: ObjectTag,
    pub metadata_size: usize,
    /// Full reserved size (what the frontier advances by).
    pub object_size: usize,
    /// Bytes actually copied (`<= object_size`).
    pub copy_size: usize,
}

/// `computeObjectCopyParameters(p)`.
pub fn compute_object_copy_parameters<M: ObjectModel>(model: &M, op: ObjPtr) -> CopyParameters {
    let word = model.get_header(op);
    let (tag, ..) = model.split_header(word);

    match tag {
        ObjectTag::Weak => die!("copier: refusing to copy a weak object"),
        ObjectTag::HierarchicalHeapHeader => {
            die!("copier: refusing to copy a hierarchical-heap header object")
        }
        ObjectTag::Stack => {
            if model.is_current_stack(op) {
                model.shrink_stack_reserved(op);
            }
        }
        ObjectTag::Normal | ObjectTag::Array => {}
    }

    CopyParameters {
        tag,
        metadata_size: model.metadata_size(tag),
        object_size: model.sizeof_object(op),
        copy_size: model.copy_size(op),
    }
}

/// `copyObject(p, objectSize, copySize, toChunkList)`.
///
/// Per Design Note (a) (the straddle-bug fix): the destination chunk for
/// the *entire* object is decided before any byte is copied. If the
/// to-space head's tail chunk does not have `object_size` bytes of room
/// left, a fresh chunk is allocated and becomes the copy target outright —
/// there is no "copy, then discover it doesn't fit, and leave stale bytes
/// behind" path, because nothing is written until the destination is
/// final.
pub fn copy_object<M: ObjectModel>(
    pool: &ChunkPool,
    to_level_head: *mut ChunkHeader,
    op: ObjPtr,
    params: &CopyParameters,
    model: &M,
) -> ObjPtr {
    debug_assert!(!to_level_head.is_null());
    debug_assert!(unsafe { (*to_level_head).is_head() });

    // The record footprint in the chunk is metadata + payload; `object_size`
    // and `copy_size` from `computeObjectCopyParameters` count payload bytes
    // only, so the reserved/copied spans both add `metadata_size` back in.
    let record_size = params.metadata_size + params.object_size;
    let copy_len = params.metadata_size + params.copy_size;

    let mut tail = unsafe { (*to_level_head).trailer.head.last_chunk };
    let mut limit = pool.chunk_limit(tail);
    let mut remaining = limit as usize - unsafe { (*tail).frontier as usize };

    if remaining < record_size {
        let Some((chunk, chunk_limit)) = level_list::allocate_chunk(pool, to_level_head, record_size)
        else {
            die!("copy_object: chunk pool exhausted during copy");
        };
        tail = chunk;
        limit = chunk_limit;
        remaining = limit as usize - unsafe { (*tail).frontier as usize };
        debug_assert!(remaining >= record_size);
    }

    let dest_base = unsafe { (*tail).frontier };
    let src_base = unsafe { (op.as_ptr() as *const u8).sub(params.metadata_size) };

    unsafe {
        core::ptr::copy_nonoverlapping(src_base, dest_base, copy_len);
    }

    let new_op = unsafe { dest_base.add(params.metadata_size) };
    unsafe {
        (*tail).frontier = dest_base.add(record_size);
    }

    crate::trace::copy(unsafe { (*to_level_head).level }, record_size);
    crate::stat_add!(bytes_copied, record_size);
    if params.tag == ObjectTag::Stack {
        crate::stat_inc!(stacks_copied);
    } else {
        crate::stat_inc!(objects_copied);
    }

    let _ = model;
    NonNull::new(new_op).expect("copy destination must be non-null")
}
