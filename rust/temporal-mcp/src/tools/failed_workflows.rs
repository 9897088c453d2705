//! `failed_workflows` tool.

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::{Tool, ToolDefinition, argument_object};
use crate::error::ServiceResult;
use crate::scanner::{FailedWorkflowsResult, FailureScanner};

pub const NAME: &str = "failed_workflows";

/// Lists open executions whose history carries an error.
#[derive(Debug, Clone)]
pub struct FailedWorkflowsTool {
    scanner: FailureScanner,
}

impl FailedWorkflowsTool {
    pub fn new(scanner: FailureScanner) -> Self {
        Self { scanner }
    }
}

#[async_trait]
impl Tool for FailedWorkflowsTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            NAME,
            "List open workflows whose history contains a failure, with the last error and the relevant events of each",
            serde_json::json!({
                "type": "object",
                "properties": {}
            }),
        )
    }

    async fn execute(&self, arguments: Value, cancel: &CancellationToken) -> ServiceResult<String> {
        // No parameters; anything other than an object is still rejected.
        argument_object(arguments)?;

        let workflows = self.scanner.scan_failed(cancel).await?;
        Ok(serde_json::to_string(&FailedWorkflowsResult { workflows })?)
    }
}
