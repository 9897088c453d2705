//! `workflow_history` tool.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::{Tool, ToolDefinition, argument_object};
use crate::aggregate::HistoryAggregator;
use crate::error::{HistoryError, ServiceResult};

pub const NAME: &str = "workflow_history";

#[derive(Debug, Default, Deserialize)]
struct WorkflowHistoryArgs {
    #[serde(default)]
    workflow_id: Option<String>,
    #[serde(default)]
    run_id: Option<String>,
}

/// Returns the normalized history of one workflow execution.
#[derive(Debug, Clone)]
pub struct WorkflowHistoryTool {
    aggregator: HistoryAggregator,
    instructions: Arc<str>,
}

impl WorkflowHistoryTool {
    pub fn new(aggregator: HistoryAggregator, instructions: Arc<str>) -> Self {
        Self {
            aggregator,
            instructions,
        }
    }
}

#[async_trait]
impl Tool for WorkflowHistoryTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            NAME,
            "Retrieve a workflow history",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "workflow_id": {
                        "type": "string",
                        "description": "The ID of the workflow to retrieve"
                    },
                    "run_id": {
                        "type": "string",
                        "description": "Optional run ID of the workflow"
                    }
                },
                "required": ["workflow_id"]
            }),
        )
    }

    async fn execute(&self, arguments: Value, cancel: &CancellationToken) -> ServiceResult<String> {
        let args: WorkflowHistoryArgs =
            serde_json::from_value(Value::Object(argument_object(arguments)?))
                .map_err(|e| HistoryError::InvalidArguments(e.to_string()))?;

        let workflow_id = args
            .workflow_id
            .filter(|id| !id.is_empty())
            .ok_or(HistoryError::MissingArgument("workflow_id"))?;

        let mut result = self
            .aggregator
            .get_history(&workflow_id, args.run_id.as_deref(), cancel)
            .await?;
        result.instructions = Some(self.instructions.to_string());

        Ok(serde_json::to_string(&result)?)
    }
}
