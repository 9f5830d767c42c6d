//! Built-in tools bundled with Sidekick.

mod document;
mod search;
mod time;
mod utils;

use crate::ToolRegistry;
use crate::search::SearchRouter;
use log::info;
use sidekick_rs_config::{SearchEngineKind, ToolsConfig};
use std::sync::Arc;

pub use document::ReadDocumentTool;
pub use search::{BaiduSearchTool, GoogleSearchTool};
pub use time::SystemTimeTool;

/// Register all built-in tools with the provided registry.
///
/// Search tools follow the router's engine order so the primary engine is
/// declared first. Names listed in `config.disabled` are skipped.
pub fn register_builtin_tools(
    registry: &ToolRegistry,
    config: &ToolsConfig,
    router: Option<Arc<SearchRouter>>,
) {
    if let Some(router) = router {
        for engine in router.engines() {
            match engine {
                SearchEngineKind::Baidu => {
                    registry.register(Arc::new(BaiduSearchTool::new(router.clone())))
                }
                SearchEngineKind::Google => {
                    registry.register(Arc::new(GoogleSearchTool::new(router.clone())))
                }
            }
        }
    }
    registry.register(Arc::new(SystemTimeTool));
    registry.register(Arc::new(ReadDocumentTool));
    for name in &config.disabled {
        registry.unregister(name);
    }
    info!("registered built-in tools (count={})", registry.list().len());
}

/// Build a registry pre-populated with built-in tools.
pub fn builtin_tool_registry(
    config: &ToolsConfig,
    router: Option<Arc<SearchRouter>>,
) -> ToolRegistry {
    let registry = ToolRegistry::new();
    register_builtin_tools(&registry, config, router);
    registry
}
