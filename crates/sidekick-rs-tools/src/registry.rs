//! Registry for tool implementations.

use crate::tool::{Tool, ToolSpec};
use log::debug;
use parking_lot::RwLock;
use std::sync::Arc;

/// In-memory registry that keeps tools in registration order.
///
/// Order matters: it is the order tools are declared to the model, so the
/// preferred search engine is registered first.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: Arc<RwLock<Vec<Arc<dyn Tool>>>>,
}

impl ToolRegistry {
    /// Create an empty tool registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, replacing any tool with the same name in place.
    pub fn register(&self, tool: Arc<dyn Tool>) {
        debug!("registering tool (name={})", tool.name());
        let mut tools = self.tools.write();
        match tools.iter().position(|existing| existing.name() == tool.name()) {
            Some(idx) => tools[idx] = tool,
            None => tools.push(tool),
        }
    }

    /// Remove a tool by name, returning whether it was present.
    pub fn unregister(&self, name: &str) -> bool {
        let mut tools = self.tools.write();
        let before = tools.len();
        tools.retain(|tool| tool.name() != name);
        before != tools.len()
    }

    /// Fetch a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools
            .read()
            .iter()
            .find(|tool| tool.name() == name)
            .cloned()
    }

    /// List registered tool names in order.
    pub fn list(&self) -> Vec<String> {
        self.tools
            .read()
            .iter()
            .map(|tool| tool.name().to_string())
            .collect()
    }

    /// Whether no tools are registered.
    pub fn is_empty(&self) -> bool {
        self.tools.read().is_empty()
    }

    /// Return tool specs for all registered tools in order.
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.read().iter().map(|tool| tool.spec()).collect()
    }
}
