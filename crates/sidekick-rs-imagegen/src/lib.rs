//! Client for a locally running Stable Diffusion WebUI API.
//!
//! The WebUI is an external service; this crate only checks that it is up,
//! switches checkpoints, and turns text prompts into PNG files.

mod client;
mod error;
mod params;

pub use client::{DiffusionClient, GenerationProgress, SdModel};
pub use error::ImageGenError;
pub use params::GenerationParams;
