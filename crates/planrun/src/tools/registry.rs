//! Caller-supplied mapping from tool name to handler.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::error::ToolError;

use super::definition::{AsyncTool, SyncTool, ToolDefinition, ToolHandler};

/// Registry of tools a plan may invoke.
///
/// Read-only during a run; the executor only looks tools up by name.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, ToolDefinition>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Panics if a tool with the same name already exists.
    pub fn register(&mut self, tool: ToolDefinition) {
        if self.tools.contains_key(&tool.name) {
            panic!("duplicate tool: {}", tool.name);
        }
        self.tools.insert(tool.name.clone(), tool);
    }

    /// Register a synchronous tool from a plain closure.
    pub fn register_fn<F>(&mut self, name: &str, f: F)
    where
        F: Fn(Map<String, Value>) -> Result<Value, ToolError> + Send + Sync + 'static,
    {
        self.register(ToolDefinition::new(name, Arc::new(SyncTool(f))));
    }

    /// Register an asynchronous tool from a future-returning closure.
    pub fn register_async<F, Fut>(&mut self, name: &str, f: F)
    where
        F: Fn(Map<String, Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ToolError>> + Send + 'static,
    {
        self.register(ToolDefinition::new(name, Arc::new(AsyncTool(f))));
    }

    /// Look up a tool by name.
    pub fn lookup(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.get(name)
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Sorted list of registered tool names.
    pub fn tool_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Render the registry as a listing suitable for planner prompts.
    pub fn describe(&self) -> String {
        let mut lines = vec!["Available tools:".to_string()];
        for name in self.tool_names() {
            match self.tools[name].description.as_deref() {
                Some(desc) => lines.push(format!("- {name}: {desc}")),
                None => lines.push(format!("- {name}")),
            }
        }
        lines.join("\n")
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tool_names())
            .finish()
    }
}
