//! Tool functions exposed to the hosted agents.
//!
//! The agents call these through `POST /tools/{name}`. Every tool answers
//! with a JSON object; failures become `{"error": ...}` so the model can read
//! them instead of receiving an HTTP error.

pub mod search;
pub mod travel;

pub use search::{SearchClient, SearchError, SearchItem, SearchKind};
pub use travel::{
    CoordinatesTool, CurrentTimeTool, CustomSearchTool, ImageSearchTool, KnowledgeGraphTool,
    PlaceDetailsTool,
};

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::geo::MapsClient;

/// Name, description and JSON-schema parameters of a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }

    /// Schema for a tool taking a single required string argument.
    pub fn single_string(name: &str, description: &str, arg: &str, arg_description: &str) -> Self {
        Self::new(
            name,
            description,
            json!({
                "type": "object",
                "properties": {
                    arg: {"type": "string", "description": arg_description}
                },
                "required": [arg]
            }),
        )
    }
}

/// Trait for executable tools.
#[async_trait]
pub trait Tool: Send + Sync {
    fn definition(&self) -> ToolDefinition;

    /// Run the tool. An `Err` is reported to the caller as `{"error": ...}`.
    async fn execute(&self, arguments: &Value) -> anyhow::Result<Value>;
}

/// Required string argument, trimmed.
pub fn required_str<'a>(arguments: &'a Value, name: &str) -> anyhow::Result<&'a str> {
    arguments
        .get(name)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| anyhow::anyhow!("Missing required argument: {name}"))
}

/// Registry of available tools, keyed by name.
#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<BTreeMap<String, Arc<dyn Tool>>>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tools = self.tools.read();
        f.debug_struct("ToolRegistry")
            .field("tools", &tools.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every travel tool the agents reference.
    pub fn with_travel_tools(maps: Arc<MapsClient>, search: Arc<SearchClient>) -> Self {
        let registry = Self::new();
        registry.register(Arc::new(CurrentTimeTool));
        registry.register(Arc::new(CoordinatesTool::new(Arc::clone(&maps))));
        registry.register(Arc::new(PlaceDetailsTool::new(maps)));
        registry.register(Arc::new(KnowledgeGraphTool::new(Arc::clone(&search))));
        registry.register(Arc::new(ImageSearchTool::new(Arc::clone(&search))));
        registry.register(Arc::new(CustomSearchTool::new(search)));
        registry
    }

    pub fn register(&self, tool: Arc<dyn Tool>) {
        let name = tool.definition().name;
        self.tools.write().insert(name, tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.read().contains_key(name)
    }

    /// Definitions sorted by name.
    pub fn get_definitions(&self) -> Vec<ToolDefinition> {
        self.tools.read().values().map(|t| t.definition()).collect()
    }

    pub fn list_tools(&self) -> Vec<String> {
        self.tools.read().keys().cloned().collect()
    }

    /// Run a tool by name, folding failures into `{"error": ...}`.
    /// `None` when no such tool is registered.
    pub async fn invoke(&self, name: &str, arguments: &Value) -> Option<Value> {
        let tool = self.get(name)?;
        let result = match tool.execute(arguments).await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(tool = name, error = %e, "Tool call failed");
                json!({ "error": e.to_string() })
            }
        };
        Some(result)
    }
}
