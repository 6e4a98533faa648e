//! File write tool: create or overwrite a file inside the workspace.

use std::path::PathBuf;

use async_trait::async_trait;
use forgeloop_core::error::ToolError;
use forgeloop_core::tool::{Tool, ToolOutput};
use tracing::debug;

use crate::path::resolve_in_workspace;

const TOOL_NAME: &str = "file_write";

pub struct FileWriteTool {
    workspace: PathBuf,
    forbidden_paths: Vec<String>,
}

impl FileWriteTool {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
            forbidden_paths: Vec::new(),
        }
    }

    pub fn with_forbidden_paths(mut self, forbidden_paths: Vec<String>) -> Self {
        self.forbidden_paths = forbidden_paths;
        self
    }
}

#[async_trait]
impl Tool for FileWriteTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        "Write content to a file in the project workspace. Creates the file and any missing parent directories; overwrites existing files."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "File path, relative to the workspace root"
                },
                "content": {
                    "type": "string",
                    "description": "The complete file content"
                }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let invalid = |reason: &str| ToolError::InvalidArguments {
            tool_name: TOOL_NAME.into(),
            reason: reason.into(),
        };
        let path = arguments["path"]
            .as_str()
            .ok_or_else(|| invalid("missing 'path' argument"))?;
        let content = arguments["content"]
            .as_str()
            .ok_or_else(|| invalid("missing 'content' argument"))?;

        let target = resolve_in_workspace(&self.workspace, path, &self.forbidden_paths).map_err(
            |e| ToolError::PermissionDenied {
                tool_name: TOOL_NAME.into(),
                reason: e.to_string(),
            },
        )?;

        if let Some(parent) = target.parent()
            && let Err(e) = tokio::fs::create_dir_all(parent).await
        {
            return Ok(ToolOutput::failed(format!("Failed to create directory: {e}")));
        }

        debug!(path = %target.display(), bytes = content.len(), "Writing file");
        match tokio::fs::write(&target, content).await {
            Ok(()) => Ok(ToolOutput::ok(format!(
                "Successfully wrote {} bytes to {path}",
                content.len()
            ))),
            Err(e) => Ok(ToolOutput::failed(format!("Failed to write file: {e}"))),
        }
    }
}
