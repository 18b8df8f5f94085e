#![no_std]

//! hhgc: the core of a hierarchical, per-task copying garbage collector for
//! a parallel, work-stealing runtime.
//!
//! The heap is partitioned by dynamic task structure: each task owns a
//! [`hh::HierarchicalHeap`] whose storage is organized into numbered
//! levels corresponding to nesting depth in a parallel fork/join call
//! tree. Local collection ([`collector::collect_local`]) runs privately
//! per task, over only the levels it still exclusively owns; values escape
//! to shallower levels by promotion ([`level_list::promote_chunks`]).
//!
//! Object-model details, the work-stealing scheduler proper, the global
//! heap, and the mutator allocator fast path are external collaborators —
//! see the [`object_model`] and [`scheduler`] trait seams.
//!
//! # Usage
//!
//! ```ignore
//! use hhgc::hh::HierarchicalHeap;
//! use hhgc::chunk_pool::GLOBAL_POOL;
//!
//! let mut hh = HierarchicalHeap::new(0);
//! hh.ensure_not_empty(&GLOBAL_POOL, 4096);
//! ```

extern crate alloc;
#[cfg(any(test, feature = "std"))]
extern crate std;

pub mod chunk;
pub mod chunk_pool;
pub mod chunk_registry;
pub mod collector;
pub mod config;
pub mod copier;
pub mod hh;
pub mod level_list;
pub mod macros;
pub mod object_model;
pub mod platform;
pub mod scheduler;
pub mod stats;
pub mod sync;
pub mod trace;

pub use config::{CHUNK_ALIGNMENT, OBJECT_ALIGNMENT};

// Panic handler for bare no_std builds without `std` linked in. Only
// active outside test harnesses, which bring their own.
#[cfg(all(not(test), not(feature = "std")))]
#[panic_handler]
fn panic(_: &core::panic::PanicInfo) -> ! {
    loop {
        core::hint::spin_loop();
    }
}
