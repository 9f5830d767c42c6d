//! Configuration schema for Sidekick.

use crate::ConfigError;
use crate::secret::resolve_secret;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Root config for the Sidekick client.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SidekickConfig {
    #[serde(default, rename = "$schema")]
    pub schema: Option<String>,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub attachments: AttachmentsConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub imagegen: ImageGenConfig,
}

impl SidekickConfig {
    /// Start building a config programmatically with defaults applied.
    pub fn builder() -> SidekickConfigBuilder {
        SidekickConfigBuilder::new()
    }
}

/// Builder for assembling a `SidekickConfig` in code.
#[derive(Debug, Default, Clone)]
pub struct SidekickConfigBuilder {
    config: SidekickConfig,
}

impl SidekickConfigBuilder {
    /// Create a new builder seeded with default config values.
    pub fn new() -> Self {
        Self {
            config: SidekickConfig::default(),
        }
    }

    /// Select the active provider id.
    pub fn current_provider(mut self, id: impl Into<String>) -> Self {
        self.config.providers.current = id.into();
        self
    }

    /// Insert or replace a provider entry.
    pub fn provider(mut self, id: impl Into<String>, entry: ProviderEntryConfig) -> Self {
        self.config.providers.entries.insert(id.into(), entry);
        self
    }

    /// Replace the search configuration.
    pub fn search(mut self, search: SearchConfig) -> Self {
        self.config.search = search;
        self
    }

    /// Replace the chat configuration.
    pub fn chat(mut self, chat: ChatConfig) -> Self {
        self.config.chat = chat;
        self
    }

    /// Replace the attachment limits.
    pub fn attachments(mut self, attachments: AttachmentsConfig) -> Self {
        self.config.attachments = attachments;
        self
    }

    /// Replace the session persistence configuration.
    pub fn sessions(mut self, sessions: SessionsConfig) -> Self {
        self.config.sessions = sessions;
        self
    }

    /// Finalize and return the built `SidekickConfig`.
    pub fn build(self) -> SidekickConfig {
        self.config
    }
}

/// Wire family spoken by a model provider.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Google Gemini REST API.
    Gemini,
    /// OpenAI chat-completions compatible API (DeepSeek and similar).
    OpenaiCompatible,
}

/// Model provider selection and per-provider overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default = "default_current_provider")]
    pub current: String,
    #[serde(default)]
    pub entries: BTreeMap<String, ProviderEntryConfig>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            current: default_current_provider(),
            entries: BTreeMap::new(),
        }
    }
}

fn default_current_provider() -> String {
    "gemini".to_string()
}

/// Partial provider settings. Unset fields fall back to built-in defaults.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ProviderEntryConfig {
    #[serde(default)]
    pub kind: Option<ProviderKind>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub api_url: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub context_limit: Option<u64>,
    #[serde(default)]
    pub use_proxy: Option<bool>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_output_tokens: Option<u32>,
}

/// Fully resolved provider settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedProvider {
    pub id: String,
    pub kind: ProviderKind,
    pub display_name: String,
    pub api_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub api_key_env: String,
    pub context_limit: u64,
    pub use_proxy: bool,
    pub timeout_secs: u64,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl ResolvedProvider {
    /// Resolve the API key from inline config first, then the environment.
    pub fn resolve_api_key(&self) -> Option<String> {
        resolve_secret(self.api_key.as_deref(), &self.api_key_env)
    }
}

/// Built-in provider ids shipped with the client.
pub const BUILTIN_PROVIDERS: &[&str] = &["gemini", "deepseek"];

/// Return the built-in defaults for a provider id.
pub fn builtin_provider(id: &str) -> Option<ProviderEntryConfig> {
    match id {
        "gemini" => Some(ProviderEntryConfig {
            kind: Some(ProviderKind::Gemini),
            display_name: Some("Gemini".to_string()),
            api_url: Some("https://generativelanguage.googleapis.com/v1beta".to_string()),
            model: Some("gemini-2.5-flash".to_string()),
            api_key: None,
            api_key_env: Some("GEMINI_API_KEY".to_string()),
            context_limit: Some(1_000_000),
            use_proxy: Some(true),
            timeout_secs: Some(120),
            temperature: Some(0.7),
            max_output_tokens: Some(2048),
        }),
        "deepseek" => Some(ProviderEntryConfig {
            kind: Some(ProviderKind::OpenaiCompatible),
            display_name: Some("DeepSeek".to_string()),
            api_url: Some("https://api.deepseek.com/v1".to_string()),
            model: Some("deepseek-chat".to_string()),
            api_key: None,
            api_key_env: Some("DEEPSEEK_API_KEY".to_string()),
            context_limit: Some(32_000),
            use_proxy: Some(false),
            timeout_secs: Some(120),
            temperature: Some(0.7),
            max_output_tokens: Some(2048),
        }),
        _ => None,
    }
}

impl ProvidersConfig {
    /// All known provider ids (built-in plus configured), sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = BUILTIN_PROVIDERS.iter().map(|id| id.to_string()).collect();
        for id in self.entries.keys() {
            if !ids.contains(id) {
                ids.push(id.clone());
            }
        }
        ids.sort();
        ids
    }

    /// Resolve the currently selected provider.
    pub fn current(&self) -> Result<ResolvedProvider, ConfigError> {
        self.resolve(&self.current)
    }

    /// Overlay configured fields onto built-in defaults for a provider id.
    pub fn resolve(&self, id: &str) -> Result<ResolvedProvider, ConfigError> {
        let base = builtin_provider(id);
        let overlay = self.entries.get(id);
        if base.is_none() && overlay.is_none() {
            return Err(ConfigError::UnknownProvider(id.to_string()));
        }
        let base = base.unwrap_or_default();
        let overlay = overlay.cloned().unwrap_or_default();
        let missing = |field: &str| ConfigError::InvalidField {
            path: format!("providers.entries.{id}.{field}"),
            message: "missing required field".to_string(),
        };

        let kind = overlay.kind.or(base.kind).ok_or_else(|| missing("kind"))?;
        let api_url = overlay
            .api_url
            .or(base.api_url)
            .ok_or_else(|| missing("api_url"))?;
        let model = overlay.model.or(base.model).ok_or_else(|| missing("model"))?;
        let api_key_env = overlay
            .api_key_env
            .or(base.api_key_env)
            .unwrap_or_else(|| format!("{}_API_KEY", id.to_ascii_uppercase().replace('-', "_")));

        Ok(ResolvedProvider {
            id: id.to_string(),
            kind,
            display_name: overlay
                .display_name
                .or(base.display_name)
                .unwrap_or_else(|| id.to_string()),
            api_url: api_url.trim_end_matches('/').to_string(),
            model,
            api_key: overlay.api_key.or(base.api_key),
            api_key_env,
            context_limit: overlay.context_limit.or(base.context_limit).unwrap_or(32_000),
            use_proxy: overlay.use_proxy.or(base.use_proxy).unwrap_or(false),
            timeout_secs: overlay.timeout_secs.or(base.timeout_secs).unwrap_or(120),
            temperature: overlay.temperature.or(base.temperature).unwrap_or(0.7),
            max_output_tokens: overlay
                .max_output_tokens
                .or(base.max_output_tokens)
                .unwrap_or(2048),
        })
    }
}

/// Outbound HTTP proxy used by providers that opt in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_proxy_url")]
    pub url: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: default_proxy_url(),
        }
    }
}

fn default_proxy_url() -> String {
    "http://127.0.0.1:7890".to_string()
}

/// Search engines exposed as tools.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SearchEngineKind {
    Baidu,
    Google,
}

impl SearchEngineKind {
    /// Return the engine name as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchEngineKind::Baidu => "baidu",
            SearchEngineKind::Google => "google",
        }
    }
}

/// Web search tool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_enabled_engines")]
    pub enabled_engines: Vec<SearchEngineKind>,
    #[serde(default = "default_primary_engine")]
    pub primary_engine: SearchEngineKind,
    #[serde(default = "default_true")]
    pub fallback_enabled: bool,
    #[serde(default)]
    pub baidu: BaiduSearchConfig,
    #[serde(default)]
    pub google: GoogleSearchConfig,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            enabled_engines: default_enabled_engines(),
            primary_engine: default_primary_engine(),
            fallback_enabled: true,
            baidu: BaiduSearchConfig::default(),
            google: GoogleSearchConfig::default(),
        }
    }
}

impl SearchConfig {
    /// Enabled engines with the primary engine first.
    pub fn ordered_engines(&self) -> Vec<SearchEngineKind> {
        let mut engines = Vec::with_capacity(self.enabled_engines.len());
        if self.enabled_engines.contains(&self.primary_engine) {
            engines.push(self.primary_engine);
        }
        for engine in &self.enabled_engines {
            if !engines.contains(engine) {
                engines.push(*engine);
            }
        }
        engines
    }
}

fn default_enabled_engines() -> Vec<SearchEngineKind> {
    vec![SearchEngineKind::Baidu, SearchEngineKind::Google]
}

fn default_primary_engine() -> SearchEngineKind {
    SearchEngineKind::Baidu
}

/// Baidu Qianfan AI search settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaiduSearchConfig {
    #[serde(default = "default_baidu_url")]
    pub api_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_baidu_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_search_timeout")]
    pub timeout_secs: u64,
}

impl Default for BaiduSearchConfig {
    fn default() -> Self {
        Self {
            api_url: default_baidu_url(),
            api_key: None,
            api_key_env: default_baidu_key_env(),
            timeout_secs: default_search_timeout(),
        }
    }
}

impl BaiduSearchConfig {
    /// Resolve the API key from inline config first, then the environment.
    pub fn resolve_api_key(&self) -> Option<String> {
        resolve_secret(self.api_key.as_deref(), &self.api_key_env)
    }
}

fn default_baidu_url() -> String {
    "https://qianfan.baidubce.com".to_string()
}

fn default_baidu_key_env() -> String {
    "BAIDU_SEARCH_API_KEY".to_string()
}

fn default_search_timeout() -> u64 {
    30
}

/// Google Custom Search JSON API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleSearchConfig {
    #[serde(default = "default_google_url")]
    pub api_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_google_key_env")]
    pub api_key_env: String,
    #[serde(default)]
    pub engine_id: Option<String>,
    #[serde(default = "default_google_engine_env")]
    pub engine_id_env: String,
    #[serde(default = "default_search_timeout")]
    pub timeout_secs: u64,
}

impl Default for GoogleSearchConfig {
    fn default() -> Self {
        Self {
            api_url: default_google_url(),
            api_key: None,
            api_key_env: default_google_key_env(),
            engine_id: None,
            engine_id_env: default_google_engine_env(),
            timeout_secs: default_search_timeout(),
        }
    }
}

impl GoogleSearchConfig {
    /// Resolve the API key from inline config first, then the environment.
    pub fn resolve_api_key(&self) -> Option<String> {
        resolve_secret(self.api_key.as_deref(), &self.api_key_env)
    }

    /// Resolve the search engine id (cx) from inline config or the environment.
    pub fn resolve_engine_id(&self) -> Option<String> {
        resolve_secret(self.engine_id.as_deref(), &self.engine_id_env)
    }
}

fn default_google_url() -> String {
    "https://www.googleapis.com/customsearch/v1".to_string()
}

fn default_google_key_env() -> String {
    "GOOGLE_SEARCH_APIKEY".to_string()
}

fn default_google_engine_env() -> String {
    "GOOGLE_SEARCH_ENGINE_ID".to_string()
}

/// Global tool configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ToolsConfig {
    #[serde(default)]
    pub output_policy: ToolOutputPolicyConfig,
    #[serde(default)]
    pub disabled: Vec<String>,
}

/// Output policy for tool results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutputPolicyConfig {
    #[serde(default = "default_max_string_bytes")]
    pub max_string_bytes: usize,
    #[serde(default = "default_max_array_len")]
    pub max_array_len: usize,
    #[serde(default = "default_max_object_entries")]
    pub max_object_entries: usize,
    #[serde(default)]
    pub redact_keys: Vec<String>,
    #[serde(default)]
    pub redact_values: Vec<String>,
    #[serde(default = "default_redaction_replacement")]
    pub replacement: String,
}

impl Default for ToolOutputPolicyConfig {
    fn default() -> Self {
        Self {
            max_string_bytes: default_max_string_bytes(),
            max_array_len: default_max_array_len(),
            max_object_entries: default_max_object_entries(),
            redact_keys: Vec::new(),
            redact_values: Vec::new(),
            replacement: default_redaction_replacement(),
        }
    }
}

fn default_max_string_bytes() -> usize {
    16 * 1024
}

fn default_max_array_len() -> usize {
    64
}

fn default_max_object_entries() -> usize {
    128
}

fn default_redaction_replacement() -> String {
    "[REDACTED]".to_string()
}

/// Chat loop behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default = "default_true")]
    pub tool_guidance: bool,
    #[serde(default = "default_true")]
    pub stream: bool,
    #[serde(default = "default_title_max_chars")]
    pub title_max_chars: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            system_prompt: None,
            tool_guidance: true,
            stream: true,
            title_max_chars: default_title_max_chars(),
        }
    }
}

fn default_title_max_chars() -> usize {
    20
}

/// Attachment size limits and remote staging behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentsConfig {
    /// Files at or above this size are staged remotely instead of inlined.
    #[serde(default = "default_inline_max_bytes")]
    pub inline_max_bytes: u64,
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
    #[serde(default = "default_retention_hours")]
    pub retention_hours: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,
    /// Staged file cache location; relative paths resolve against the cwd.
    #[serde(default)]
    pub cache_path: Option<String>,
}

impl Default for AttachmentsConfig {
    fn default() -> Self {
        Self {
            inline_max_bytes: default_inline_max_bytes(),
            max_file_bytes: default_max_file_bytes(),
            retention_hours: default_retention_hours(),
            poll_interval_ms: default_poll_interval_ms(),
            poll_timeout_secs: default_poll_timeout_secs(),
            cache_path: None,
        }
    }
}

fn default_inline_max_bytes() -> u64 {
    20 * 1024 * 1024
}

fn default_max_file_bytes() -> u64 {
    2 * 1024 * 1024 * 1024
}

fn default_retention_hours() -> u64 {
    48
}

fn default_poll_interval_ms() -> u64 {
    3_000
}

fn default_poll_timeout_secs() -> u64 {
    120
}

/// Session persistence configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub path: Option<String>,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
        }
    }
}

/// Stable Diffusion WebUI client defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageGenConfig {
    #[serde(default = "default_imagegen_url")]
    pub api_url: String,
    #[serde(default)]
    pub output_dir: Option<String>,
    #[serde(default = "default_imagegen_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_sampler")]
    pub sampler: String,
    #[serde(default = "default_scheduler")]
    pub scheduler: String,
    #[serde(default = "default_steps")]
    pub steps: u32,
    #[serde(default = "default_cfg_scale")]
    pub cfg_scale: f32,
    #[serde(default = "default_image_side")]
    pub width: u32,
    #[serde(default = "default_image_side")]
    pub height: u32,
    #[serde(default = "default_seed")]
    pub seed: i64,
    #[serde(default = "default_negative_prompt")]
    pub negative_prompt: String,
}

impl Default for ImageGenConfig {
    fn default() -> Self {
        Self {
            api_url: default_imagegen_url(),
            output_dir: None,
            timeout_secs: default_imagegen_timeout(),
            sampler: default_sampler(),
            scheduler: default_scheduler(),
            steps: default_steps(),
            cfg_scale: default_cfg_scale(),
            width: default_image_side(),
            height: default_image_side(),
            seed: default_seed(),
            negative_prompt: default_negative_prompt(),
        }
    }
}

fn default_imagegen_url() -> String {
    "http://127.0.0.1:7860".to_string()
}

fn default_imagegen_timeout() -> u64 {
    300
}

fn default_sampler() -> String {
    "DPM++ 2M".to_string()
}

fn default_scheduler() -> String {
    "Karras".to_string()
}

fn default_steps() -> u32 {
    20
}

fn default_cfg_scale() -> f32 {
    7.0
}

fn default_image_side() -> u32 {
    512
}

fn default_seed() -> i64 {
    -1
}

fn default_negative_prompt() -> String {
    "lowres, bad quality, deformed, blurry, worst quality".to_string()
}

fn default_true() -> bool {
    true
}
