//! Public surface for Sidekick.
//!
//! This crate re-exports the building blocks and wires them into a ready
//! chat engine for the `sidekick` binary and embedding applications.

pub mod app;

/// Re-export for convenience.
pub use sidekick_rs_config as config;
pub use sidekick_rs_core as core;
/// Re-export for convenience.
pub use sidekick_rs_imagegen as imagegen;
pub use sidekick_rs_llm as llm;
/// Re-export for convenience.
pub use sidekick_rs_protocol as protocol;
pub use sidekick_rs_tools as tools;

pub use app::{SidekickApp, load_config};

/// Initialize `env_logger` with millisecond timestamps, honoring `RUST_LOG`.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_logging() {
    let _ = env_logger::builder()
        .format_timestamp_millis()
        .parse_default_env()
        .try_init();
}
