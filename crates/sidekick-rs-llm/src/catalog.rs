//! Provider catalog and adapter construction.

use crate::error::ProviderError;
use crate::gemini::GeminiProvider;
use crate::openai::OpenAiCompatibleProvider;
use crate::provider::ChatProvider;
use crate::types::ProviderCapabilities;
use log::{info, warn};
use serde::Serialize;
use sidekick_rs_config::{ProviderKind, ResolvedProvider, SidekickConfig, mask_secret};
use sidekick_rs_protocol::AttachmentKind;
use std::sync::Arc;
use std::time::Duration;

/// Catalog entry describing one provider.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderInfo {
    pub id: String,
    pub display_name: String,
    pub kind: ProviderKind,
    pub model: String,
    pub context_limit: u64,
    pub api_key_env: String,
    /// Masked API key, `None` when no key is configured.
    pub masked_key: Option<String>,
    pub use_proxy: bool,
    pub current: bool,
    pub capabilities: ProviderCapabilities,
}

/// All providers known to a config.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProviderCatalog {
    pub providers: Vec<ProviderInfo>,
}

impl ProviderCatalog {
    /// Build the catalog, skipping entries that fail to resolve.
    pub fn from_config(config: &SidekickConfig) -> Self {
        let mut providers = Vec::new();
        for id in config.providers.ids() {
            match config.providers.resolve(&id) {
                Ok(settings) => providers.push(ProviderInfo {
                    masked_key: settings.resolve_api_key().map(|key| mask_secret(&key)),
                    current: settings.id == config.providers.current,
                    capabilities: capabilities_for(&settings),
                    id: settings.id,
                    display_name: settings.display_name,
                    kind: settings.kind,
                    model: settings.model,
                    context_limit: settings.context_limit,
                    api_key_env: settings.api_key_env,
                    use_proxy: settings.use_proxy,
                }),
                Err(err) => warn!("skipping provider (id={id}, error={err})"),
            }
        }
        Self { providers }
    }

    pub fn get(&self, id: &str) -> Option<&ProviderInfo> {
        self.providers.iter().find(|info| info.id == id)
    }
}

/// Attachment and tool support for a resolved provider.
pub fn capabilities_for(settings: &ResolvedProvider) -> ProviderCapabilities {
    match settings.kind {
        ProviderKind::Gemini => ProviderCapabilities {
            tools: true,
            streaming: true,
            inline_kinds: vec![AttachmentKind::Image, AttachmentKind::Pdf],
            staged_kinds: vec![
                AttachmentKind::Image,
                AttachmentKind::Pdf,
                AttachmentKind::Video,
            ],
            always_staged_kinds: vec![AttachmentKind::Video],
        },
        ProviderKind::OpenaiCompatible if settings.id == "deepseek" => {
            ProviderCapabilities::text_only()
        }
        ProviderKind::OpenaiCompatible => ProviderCapabilities {
            inline_kinds: vec![AttachmentKind::Image],
            ..ProviderCapabilities::text_only()
        },
    }
}

/// Build the HTTP client for a provider, routing through the proxy when both
/// the provider and the global proxy setting enable it.
pub fn http_client(
    config: &SidekickConfig,
    settings: &ResolvedProvider,
) -> Result<reqwest::Client, ProviderError> {
    let mut builder =
        reqwest::Client::builder().timeout(Duration::from_secs(settings.timeout_secs.max(1)));
    if settings.use_proxy && config.proxy.enabled {
        info!(
            "provider proxy enabled (provider={}, proxy={})",
            settings.id, config.proxy.url
        );
        builder = builder.proxy(reqwest::Proxy::all(&config.proxy.url)?);
    }
    Ok(builder.build()?)
}

/// Construct the adapter for a provider id.
pub fn build_provider(
    config: &SidekickConfig,
    id: &str,
) -> Result<Arc<dyn ChatProvider>, ProviderError> {
    let settings = config.providers.resolve(id)?;
    let api_key = settings
        .resolve_api_key()
        .ok_or_else(|| ProviderError::MissingApiKey {
            provider: settings.id.clone(),
            env: settings.api_key_env.clone(),
        })?;
    let client = http_client(config, &settings)?;
    let capabilities = capabilities_for(&settings);
    info!(
        "provider ready (id={}, model={}, key={})",
        settings.id,
        settings.model,
        mask_secret(&api_key)
    );
    let provider: Arc<dyn ChatProvider> = match settings.kind {
        ProviderKind::Gemini => Arc::new(GeminiProvider::new(
            client,
            &settings,
            api_key,
            capabilities,
        )),
        ProviderKind::OpenaiCompatible => Arc::new(OpenAiCompatibleProvider::new(
            client,
            &settings,
            api_key,
            capabilities,
        )),
    };
    Ok(provider)
}

/// Construct the adapter for the configured current provider.
pub fn build_current_provider(
    config: &SidekickConfig,
) -> Result<Arc<dyn ChatProvider>, ProviderError> {
    build_provider(config, &config.providers.current)
}
