//! Shell tool: run a command in the workspace.
//!
//! Supports command allowlisting, a working directory, and a timeout.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use forgeloop_core::error::ToolError;
use forgeloop_core::tool::{Tool, ToolOutput};
use tokio::process::Command;
use tracing::{debug, warn};

const TOOL_NAME: &str = "shell";

/// Command substitution and redirection, refused under an allowlist.
const FORBIDDEN_SYNTAX: &[&str] = &["$(", "`", "<", ">"];

/// Execute shell commands with safety constraints.
pub struct ShellTool {
    /// If non-empty, only these commands are allowed.
    allowed_commands: Vec<String>,
    working_dir: Option<PathBuf>,
    timeout: Duration,
}

impl ShellTool {
    pub fn new(allowed_commands: Vec<String>) -> Self {
        Self {
            allowed_commands,
            working_dir: None,
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Check `command` against the allowlist.
    ///
    /// With an allowlist, every segment of a chained command must start with
    /// an allowed program and no substitution or redirection may appear.
    fn check_command(&self, command: &str) -> Result<(), String> {
        if self.allowed_commands.is_empty() {
            return Ok(());
        }

        if let Some(token) = FORBIDDEN_SYNTAX.iter().find(|t| command.contains(**t)) {
            return Err(format!("command '{command}' uses forbidden syntax '{token}'"));
        }

        let blocked = command
            .split(['&', '|', ';', '\n'])
            .map(str::trim)
            .filter(|segment| !segment.is_empty())
            .find(|segment| {
                let base = segment.split_whitespace().next().unwrap_or("");
                !self.allowed_commands.iter().any(|a| a == base)
            });
        match blocked {
            Some(segment) => Err(format!("command '{segment}' not in allowlist")),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        "Execute a shell command in the project workspace and return stdout/stderr. Use this to install dependencies, run builds, or start dev servers."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let command = arguments["command"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments {
                tool_name: TOOL_NAME.into(),
                reason: "missing 'command' argument".into(),
            })?;

        if let Err(reason) = self.check_command(command) {
            return Err(ToolError::PermissionDenied {
                tool_name: TOOL_NAME.into(),
                reason,
            });
        }

        debug!(command = %command, "Executing shell command");

        let mut cmd = if cfg!(target_os = "windows") {
            let mut c = Command::new("cmd");
            c.args(["/C", command]);
            c
        } else {
            let mut c = Command::new("sh");
            c.args(["-c", command]);
            c
        };
        cmd.kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(ToolError::ExecutionFailed {
                    tool_name: TOOL_NAME.into(),
                    reason: e.to_string(),
                });
            }
            Err(_) => {
                warn!(command = %command, "Command timed out");
                return Err(ToolError::Timeout {
                    tool_name: TOOL_NAME.into(),
                    timeout_secs: self.timeout.as_secs(),
                });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let success = output.status.success();

        let text = if success {
            if stderr.is_empty() {
                stdout
            } else {
                format!("{stdout}\n[stderr]: {stderr}")
            }
        } else {
            let code = output.status.code().unwrap_or(-1);
            warn!(command = %command, exit_code = code, "Command failed");
            format!("[exit code: {code}]\n{stdout}\n{stderr}")
        };

        let text = text.trim().to_string();
        Ok(if success {
            ToolOutput::ok(text)
        } else {
            ToolOutput::failed(text)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allowlist_check() {
        let tool = ShellTool::new(vec!["ls".into(), "npm".into(), "git".into()]);
        assert!(tool.check_command("ls -la").is_ok());
        assert!(tool.check_command("npm install && npm run dev").is_ok());
        assert!(tool.check_command("git status").is_ok());
        assert!(tool.check_command("rm -rf /").is_err());
        assert!(tool.check_command("ls; rm -rf /").is_err());
        assert!(tool.check_command("npm install | sudo tee x").is_err());
    }

    #[test]
    fn substitution_and_redirection_are_refused() {
        let tool = ShellTool::new(vec!["echo".into(), "ls".into()]);
        for command in [
            "echo $(touch pwned)",
            "echo `touch pwned`",
            "echo hi > written.txt",
            "echo hi >> written.txt",
            "ls < input.txt",
            "ls 2>&1",
        ] {
            let reason = tool.check_command(command).unwrap_err();
            assert!(reason.contains("forbidden syntax"), "{command}: {reason}");
        }
        assert!(tool.check_command("echo $HOME").is_ok());
    }

    #[tokio::test]
    async fn substitution_does_not_run() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ShellTool::new(vec!["echo".into()]).with_working_dir(dir.path());
        let result = tool
            .execute(serde_json::json!({"command": "echo $(touch pwned) > also_written"}))
            .await;

        assert!(matches!(result, Err(ToolError::PermissionDenied { .. })));
        assert!(!dir.path().join("pwned").exists());
        assert!(!dir.path().join("also_written").exists());
    }

    #[test]
    fn empty_allowlist_allows_all() {
        let tool = ShellTool::new(vec![]);
        assert!(tool.check_command("anything goes").is_ok());
    }

    #[tokio::test]
    async fn execute_echo() {
        let tool = ShellTool::new(vec![]);
        let result = tool
            .execute(serde_json::json!({"command": "echo hello"}))
            .await
            .unwrap();
        assert!(result.success);
        assert!(result.output.contains("hello"));
    }

    #[tokio::test]
    async fn runs_in_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "").unwrap();
        let tool = ShellTool::new(vec![]).with_working_dir(dir.path());
        let result = tool
            .execute(serde_json::json!({"command": "ls"}))
            .await
            .unwrap();
        assert!(result.output.contains("marker.txt"));
    }

    #[tokio::test]
    async fn failing_command_is_unsuccessful_output() {
        let tool = ShellTool::new(vec![]);
        let result = tool
            .execute(serde_json::json!({"command": "exit 3"}))
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.output.contains("[exit code: 3]"));
    }

    #[tokio::test]
    async fn slow_command_times_out() {
        let tool = ShellTool::new(vec![]).with_timeout(Duration::from_millis(100));
        let result = tool
            .execute(serde_json::json!({"command": "sleep 5"}))
            .await;
        assert!(matches!(result, Err(ToolError::Timeout { .. })));
    }

    #[tokio::test]
    async fn blocked_command() {
        let tool = ShellTool::new(vec!["ls".into()]);
        let result = tool
            .execute(serde_json::json!({"command": "rm -rf /"}))
            .await;
        assert!(matches!(result, Err(ToolError::PermissionDenied { .. })));
    }

    #[tokio::test]
    async fn missing_command_argument() {
        let tool = ShellTool::new(vec![]);
        let result = tool.execute(serde_json::json!({})).await;
        assert!(matches!(result, Err(ToolError::InvalidArguments { .. })));
    }
}
