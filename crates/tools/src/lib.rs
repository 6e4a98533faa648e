//! Built-in tools for forgeloop.
//!
//! Two capabilities cover what extracted actions ask for: running a shell
//! command and writing a file. Both are confined to a workspace directory.

pub mod file_write;
pub mod path;
pub mod shell;

use std::time::Duration;

use forgeloop_config::ToolsConfig;
use forgeloop_core::tool::ToolRegistry;

pub use file_write::FileWriteTool;
pub use path::{PathError, resolve_in_workspace};
pub use shell::ShellTool;

/// Create a registry with the built-in tools, configured from `config`.
///
/// Security defaults:
/// - Shell: allowlisted commands only, run inside the workspace, with a timeout
/// - File write: paths resolve inside the workspace; forbidden prefixes are blocked
pub fn default_registry(config: &ToolsConfig) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(
        ShellTool::new(config.allowed_commands.clone())
            .with_working_dir(&config.workspace_dir)
            .with_timeout(Duration::from_secs(config.command_timeout_secs)),
    ));
    registry.register(Box::new(
        FileWriteTool::new(&config.workspace_dir)
            .with_forbidden_paths(config.forbidden_paths.clone()),
    ));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use forgeloop_core::error::ToolError;
    use forgeloop_core::tool::ToolExecutor;

    #[test]
    fn registry_has_both_tools() {
        let registry = default_registry(&ToolsConfig::default());
        assert_eq!(registry.names(), vec!["file_write", "shell"]);
        let defs = registry.definitions();
        assert_eq!(defs.len(), 2);
        assert_eq!(defs[0].name, "file_write");
    }

    #[tokio::test]
    async fn registry_dispatches_file_write() {
        let dir = tempfile::tempdir().unwrap();
        let config = ToolsConfig {
            workspace_dir: dir.path().to_path_buf(),
            ..ToolsConfig::default()
        };
        let registry = default_registry(&config);
        let args = serde_json::json!({"path": "index.html", "content": "<h1>hi</h1>"});
        let out = ToolExecutor::execute(&registry, "file_write", args.as_object().unwrap())
            .await
            .unwrap();
        assert!(out.contains("11 bytes"));
        assert!(dir.path().join("index.html").exists());
    }

    #[tokio::test]
    async fn failed_write_is_execution_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("taken")).unwrap();
        let config = ToolsConfig {
            workspace_dir: dir.path().to_path_buf(),
            ..ToolsConfig::default()
        };
        let registry = default_registry(&config);
        let args = serde_json::json!({"path": "taken", "content": "x"});
        let err = ToolExecutor::execute(&registry, "file_write", args.as_object().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(
            &err,
            ToolError::ExecutionFailed { tool_name, reason }
                if tool_name == "file_write" && reason.starts_with("Failed to write file")
        ));
    }

    #[tokio::test]
    async fn nonzero_exit_is_execution_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = ToolsConfig {
            workspace_dir: dir.path().to_path_buf(),
            ..ToolsConfig::default()
        };
        let registry = default_registry(&config);
        let args = serde_json::json!({"command": "ls missing-dir"});
        let err = ToolExecutor::execute(&registry, "shell", args.as_object().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(
            &err,
            ToolError::ExecutionFailed { reason, .. } if reason.starts_with("[exit code:")
        ));
    }

    #[tokio::test]
    async fn disallowed_shell_command_is_error() {
        let registry = default_registry(&ToolsConfig::default());
        let args = serde_json::json!({"command": "shutdown now"});
        let err = ToolExecutor::execute(&registry, "shell", args.as_object().unwrap())
            .await
            .unwrap_err();
        assert_eq!(err.tool_name(), "shell");
    }
}
