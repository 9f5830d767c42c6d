//! Configuration models and layered config loading.
//!
//! This crate owns the Sidekick config schema, validation, and layer-merging
//! logic used by the engine and the command-line client.

mod error;
mod loader;
mod model;
mod secret;

/// Public error type returned by config loading and validation APIs.
pub use error::ConfigError;
/// Layered config types and loader options.
pub use loader::{ConfigLayer, ConfigLayerSource, LayeredConfig, LayeredConfigOptions};
/// Configuration schema models.
pub use model::*;
/// Credential helpers.
pub use secret::{mask_secret, resolve_secret};
