/// Increment a stats counter by 1.
///
/// Compiles to nothing when the `stats` feature is disabled.
#[macro_export]
macro_rules! stat_inc {
    ($counter:ident) => {
        #[cfg(feature = "stats")]
        {
            $crate::stats::STATS
                .$counter
                .fetch_add(1, ::core::sync::atomic::Ordering::Relaxed);
        }
    };
}

/// Add a value to a stats counter.
///
/// Compiles to nothing (including the value expression) when the `stats`
/// feature is disabled.
#[macro_export]
macro_rules! stat_add {
    ($counter:ident, $val:expr) => {
        #[cfg(feature = "stats")]
        {
            $crate::stats::STATS
                .$counter
                .fetch_add($val as u64, ::core::sync::atomic::Ordering::Relaxed);
        }
    };
}

/// Abort the process with a formatted diagnostic.
///
/// Every fatal condition named in the collector's error table (out of chunk
/// pool, entanglement, unsupported object class, invariant violations) goes
/// through this instead of a bare `panic!`, so diagnostics consistently
/// carry a `[hhgc]` prefix and get logged before unwinding starts.
#[macro_export]
macro_rules! die {
    ($($arg:tt)*) => {{
        ::log::error!(target: "hhgc", $($arg)*);
        panic!($($arg)*)
    }};
}
