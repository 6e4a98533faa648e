//! Per-run bookkeeping: rounds, the run state, and why a run stopped.

use serde::{Deserialize, Serialize};

use crate::responder::ToolCallRequest;

/// Why a run reached its terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The responder answered without requesting a tool.
    ToolLoopEnded,
    /// The round ceiling was hit.
    MaxRoundsReached,
    /// The progress advisor reported the task complete.
    PlannerDone,
    /// The caller cancelled between two states.
    Cancelled,
    /// A responder failure, or a tool failure under fail-fast.
    Error,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::ToolLoopEnded => "tool_loop_ended",
            Self::MaxRoundsReached => "max_rounds_reached",
            Self::PlannerDone => "planner_done",
            Self::Cancelled => "cancelled",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// One iteration of responder-invoke → inspect → (tool-execute).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Round {
    pub index: usize,
    /// Transcript length when the round started.
    pub transcript_snapshot_len: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_tool: Option<ToolCallRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_result: Option<String>,
}

impl Round {
    pub fn new(index: usize, transcript_snapshot_len: usize) -> Self {
        Self {
            index,
            transcript_snapshot_len,
            requested_tool: None,
            tool_result: None,
        }
    }
}

/// Counters and flags of one orchestration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    pub round_count: usize,
    pub max_rounds: usize,
    pub use_planner: bool,
    pub stopped: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<StopReason>,
}

impl RunState {
    pub fn new(max_rounds: usize, use_planner: bool) -> Self {
        Self {
            round_count: 0,
            max_rounds,
            use_planner,
            stopped: false,
            stop_reason: None,
        }
    }

    /// Whether the hard round ceiling has been reached.
    pub fn ceiling_reached(&self) -> bool {
        self.round_count >= self.max_rounds
    }

    /// Mark the run stopped. The first reason wins.
    pub fn stop(&mut self, reason: StopReason) {
        if !self.stopped {
            self.stopped = true;
            self.stop_reason = Some(reason);
        }
    }
}
