//! MCP tools exposed by the server.

pub mod failed_workflows;
pub mod workflow_history;

pub use failed_workflows::FailedWorkflowsTool;
pub use workflow_history::WorkflowHistoryTool;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::aggregate::HistoryAggregator;
use crate::error::{HistoryError, ServiceResult};
use crate::scanner::FailureScanner;

/// Tool metadata as listed by `tools/list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema of the arguments object.
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

/// An executable tool.
#[async_trait]
pub trait Tool: Send + Sync {
    fn definition(&self) -> ToolDefinition;

    /// Run the tool. The returned string is the text content of the result.
    async fn execute(&self, arguments: Value, cancel: &CancellationToken) -> ServiceResult<String>;
}

/// Registry of available tools, listed in name order.
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
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding `workflow_history` and `failed_workflows`.
    pub fn with_defaults(
        aggregator: HistoryAggregator,
        scanner: FailureScanner,
        instructions: Arc<str>,
    ) -> Self {
        let registry = Self::new();
        registry.register(Arc::new(WorkflowHistoryTool::new(aggregator, instructions)));
        registry.register(Arc::new(FailedWorkflowsTool::new(scanner)));
        registry
    }

    /// Register a tool under its definition's name, replacing any previous one.
    pub fn register(&self, tool: Arc<dyn Tool>) {
        let name = tool.definition().name;
        self.tools.write().insert(name, tool);
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.read().get(name).cloned()
    }

    /// Definitions of every registered tool, in name order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.read().values().map(|t| t.definition()).collect()
    }

    /// Names of every registered tool, in name order.
    pub fn list_tools(&self) -> Vec<String> {
        self.tools.read().keys().cloned().collect()
    }
}

/// Interpret tool arguments as an object; `null` counts as `{}`.
pub(crate) fn argument_object(arguments: Value) -> ServiceResult<serde_json::Map<String, Value>> {
    match arguments {
        Value::Null => Ok(serde_json::Map::new()),
        Value::Object(map) => Ok(map),
        other => Err(HistoryError::InvalidArguments(format!(
            "expected an object, got {other}"
        ))),
    }
}
