//! Trace events and timing for local collections (§6: "Tracing / stats /
//! logging"). Built on the `log` crate, matching the teacher crate's
//! `log::trace!`/`log::debug!` usage in hot paths, plus a `cfg(feature =
//! "debug")` `println!` fallback for environments without a logger
//! installed (the teacher's own `debug`-feature idiom).

/// Fired at `collectLocal` entry, once locks are held.
pub fn gc_enter(hh_level: u32, min_level: u32, max_level: u32) {
    log::debug!(
        target: "hhgc::gc",
        "GC_ENTER level={hh_level} range=[{min_level}, {max_level}]"
    );
    #[cfg(feature = "debug")]
    std::println!("[hhgc] GC_ENTER level={hh_level} range=[{min_level}, {max_level}]");
}

/// Fired at `collectLocal` exit, just before releasing locks.
pub fn gc_leave(objects_copied: u64, bytes_copied: u64, chunks_freed: u64) {
    log::debug!(
        target: "hhgc::gc",
        "GC_LEAVE objects={objects_copied} bytes={bytes_copied} chunks_freed={chunks_freed}"
    );
    #[cfg(feature = "debug")]
    std::println!(
        "[hhgc] GC_LEAVE objects={objects_copied} bytes={bytes_copied} chunks_freed={chunks_freed}"
    );
}

/// Fired once per object forwarded.
pub fn copy(level: u32, size: usize) {
    log::trace!(target: "hhgc::gc", "COPY level={level} size={size}");
}

/// Fired when the forwarder detects an entanglement.
pub fn entanglement(from_level: u32, to_level: u32) {
    log::error!(
        target: "hhgc::gc",
        "entanglement: private reference at level {from_level} points to level {to_level}"
    );
}

/// `rusage`-style timing sampler around a local collection. Feature `std`
/// only — `no_std` builds skip timing entirely (matching the spec's note
/// that the RUSAGE-style statistics shims are an out-of-scope collaborator;
/// we still give the `std` build something real rather than a stub).
#[cfg(feature = "std")]
pub struct CollectionTiming {
    start: std::time::Instant,
}

#[cfg(feature = "std")]
impl CollectionTiming {
    pub fn start() -> Self {
        Self {
            start: std::time::Instant::now(),
        }
    }

    pub fn finish(self) -> core::time::Duration {
        let elapsed = self.start.elapsed();
        log::debug!(target: "hhgc::gc", "collection took {elapsed:?}");
        elapsed
    }
}
