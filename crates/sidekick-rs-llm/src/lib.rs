//! Chat model providers for Sidekick.
//!
//! Defines the provider-neutral request/response model, the [`ChatProvider`]
//! trait, and adapters for Gemini and OpenAI-compatible APIs.

mod catalog;
mod error;
pub mod gemini;
mod http;
pub mod openai;
mod provider;
mod stream;
mod types;

pub use catalog::{
    ProviderCatalog, ProviderInfo, build_current_provider, build_provider, capabilities_for,
    http_client,
};
pub use error::ProviderError;
pub use gemini::GeminiProvider;
pub use openai::OpenAiCompatibleProvider;
pub use provider::{ChatProvider, ChunkStream, response_to_chunk};
pub use stream::{ResponseAccumulator, collect_stream};
pub use types::*;
