//! Compile-time configuration, generated by `build.rs` from `hhgc.toml`.
//!
//! Mirrors the teacher crate's `config_gen.rs` generate-then-include pattern:
//! `build.rs` validates the TOML file's invariants with `assert!` and emits
//! plain `pub const` declarations here.

include!(concat!(env!("OUT_DIR"), "/config_gen.rs"));
