//! Wiring of config, provider, tools, and storage into a chat engine.

use anyhow::Context;
use log::{debug, info};
use sidekick_rs_config::SidekickConfig;
use sidekick_rs_core::{ChatEngine, SessionStore, StagedFileCache};
use sidekick_rs_llm::{ChatProvider, build_provider};
use sidekick_rs_tools::{SearchRouter, ToolRegistry, builtin_tool_registry};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

const SEARCH_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Load an explicit config file, or the layered config for the current directory.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<SidekickConfig> {
    if let Some(path) = path {
        info!("loading config from path: {}", path.display());
        return SidekickConfig::load_from_path(path).context("failed to load config");
    }
    let cwd = std::env::current_dir().context("cwd")?;
    info!("loading layered config from cwd: {}", cwd.display());
    let layered = SidekickConfig::load_layered(&cwd).context("failed to load layered config")?;
    debug!("layered config loaded (layers={})", layered.layers.len());
    Ok(layered.config)
}

/// A configured chat engine plus the stores it shares with the front end.
#[derive(Clone)]
pub struct SidekickApp {
    pub engine: ChatEngine,
    pub sessions: SessionStore,
    pub file_cache: Arc<StagedFileCache>,
}

impl SidekickApp {
    /// Build the app for `provider_id`, or the configured current provider.
    pub fn build(mut config: SidekickConfig, provider_id: Option<&str>) -> anyhow::Result<Self> {
        if let Some(id) = provider_id {
            config.providers.current = id.to_string();
        }
        let provider = build_provider(&config, &config.providers.current)
            .with_context(|| format!("failed to build provider {}", config.providers.current))?;
        let tools = tool_registry(&config)?;
        let workspace_root = std::env::current_dir().context("cwd")?;
        Self::with_parts(config, provider, tools, workspace_root)
    }

    /// Assemble the app around an already constructed provider and registry.
    pub fn with_parts(
        config: SidekickConfig,
        provider: Arc<dyn ChatProvider>,
        tools: ToolRegistry,
        workspace_root: impl Into<PathBuf>,
    ) -> anyhow::Result<Self> {
        let sessions =
            SessionStore::from_config(&config.sessions).context("failed to open session store")?;
        let file_cache = Arc::new(
            StagedFileCache::from_config(&config.attachments)
                .context("failed to open staged file cache")?,
        );
        info!(
            "chat engine ready (provider={}, model={}, tools={})",
            provider.id(),
            provider.model(),
            tools.list().len()
        );
        let engine = ChatEngine::new(config, provider, tools, sessions.clone())
            .with_file_cache(file_cache.clone())
            .with_workspace_root(workspace_root);
        Ok(Self {
            engine,
            sessions,
            file_cache,
        })
    }
}

/// Built-in tools with a search router over the enabled engines.
pub fn tool_registry(config: &SidekickConfig) -> anyhow::Result<ToolRegistry> {
    let client = reqwest::Client::builder()
        .connect_timeout(SEARCH_CONNECT_TIMEOUT)
        .build()
        .context("failed to build search client")?;
    let router = SearchRouter::from_config(&config.search, client);
    Ok(builtin_tool_registry(&config.tools, Some(Arc::new(router))))
}
