//! Apply extracted actions through the tool executor.
//!
//! Shell actions go to the `shell` tool and file actions to `file_write`.
//! Message actions have no effect beyond being reported. Actions run in
//! order and a failure does not stop the ones after it.

use std::sync::Arc;

use forgeloop_core::action::{Action, ActionKind};
use forgeloop_core::tool::ToolExecutor;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// How one action went.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ActionStatus {
    Completed { output: String },
    /// Message actions are only delivered, never executed.
    Delivered,
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionOutcome {
    pub action: Action,
    #[serde(flatten)]
    pub status: ActionStatus,
}

impl ActionOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self.status, ActionStatus::Failed { .. })
    }
}

pub struct ActionRunner {
    executor: Arc<dyn ToolExecutor>,
}

impl ActionRunner {
    pub fn new(executor: Arc<dyn ToolExecutor>) -> Self {
        Self { executor }
    }

    pub async fn apply(&self, actions: &[Action]) -> Vec<ActionOutcome> {
        let mut outcomes = Vec::with_capacity(actions.len());
        for action in actions {
            let status = self.apply_one(&action.kind).await;
            outcomes.push(ActionOutcome {
                action: action.clone(),
                status,
            });
        }
        outcomes
    }

    async fn apply_one(&self, kind: &ActionKind) -> ActionStatus {
        let (tool, arguments) = match kind {
            ActionKind::Shell { command } => {
                let mut args = Map::new();
                args.insert("command".into(), Value::String(command.clone()));
                ("shell", args)
            }
            ActionKind::File { path, content } => {
                let mut args = Map::new();
                args.insert("path".into(), Value::String(path.clone()));
                args.insert("content".into(), Value::String(content.clone()));
                ("file_write", args)
            }
            ActionKind::Message { .. } => return ActionStatus::Delivered,
        };

        debug!(tool, "Applying action");
        match self.executor.execute(tool, &arguments).await {
            Ok(output) => ActionStatus::Completed { output },
            Err(e) => {
                warn!(tool, error = %e, "Action failed");
                ActionStatus::Failed {
                    error: e.to_string(),
                }
            }
        }
    }
}
