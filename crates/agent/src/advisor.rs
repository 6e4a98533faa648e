//! Progress advice: is the task done, and if not, what next?
//!
//! The orchestrator asks between rounds when the planner is enabled. The
//! verdict is advisory only; the round ceiling always wins.

use std::sync::Arc;

use async_trait::async_trait;
use forgeloop_core::error::ResponderError;
use forgeloop_core::responder::Responder;
use forgeloop_core::transcript::{Block, Transcript};
use tracing::debug;

/// What an advisor concluded about the run so far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressVerdict {
    pub done: bool,
    /// Suggested next step, fed back as a user block.
    pub next_goal: Option<String>,
}

impl ProgressVerdict {
    pub fn done() -> Self {
        Self {
            done: true,
            next_goal: None,
        }
    }

    pub fn continue_with(goal: impl Into<String>) -> Self {
        Self {
            done: false,
            next_goal: Some(goal.into()),
        }
    }
}

#[async_trait]
pub trait ProgressAdvisor: Send + Sync {
    /// Assess `transcript` after `rounds_completed` of `max_rounds` rounds.
    async fn assess(
        &self,
        transcript: &Transcript,
        rounds_completed: usize,
        max_rounds: usize,
    ) -> Result<ProgressVerdict, ResponderError>;
}

/// Advisor that asks a responder, with an iteration-aware prompt.
pub struct ResponderAdvisor {
    responder: Arc<dyn Responder>,
}

impl ResponderAdvisor {
    pub fn new(responder: Arc<dyn Responder>) -> Self {
        Self { responder }
    }

    fn prompt(rounds_completed: usize, max_rounds: usize) -> String {
        let iteration = rounds_completed + 1;
        let mut prompt = format!(
            "You are reviewing progress on the task above. This is iteration {iteration}/{max_rounds}.\n\
             Reply with a single line: `next_goal: <the next concrete step>`, \
             or `next_goal: DONE` if the task is complete."
        );
        if iteration >= max_rounds {
            prompt.push_str("\nThis is the final iteration: reply `next_goal: DONE`.");
        }
        prompt
    }

    /// Read a verdict out of free-form advisor text.
    ///
    /// Accepts a `next_goal: …` line (any case) or a JSON object with a
    /// `next_goal` field. Anything else is treated as the next goal itself.
    pub fn parse_verdict(text: &str) -> ProgressVerdict {
        let goal = serde_json::from_str::<serde_json::Value>(text.trim())
            .ok()
            .and_then(|v| v.get("next_goal").and_then(|g| g.as_str()).map(String::from))
            .or_else(|| {
                text.lines().find_map(|line| {
                    let line = line.trim().trim_matches('`');
                    let (key, value) = line.split_once(':')?;
                    key.trim()
                        .eq_ignore_ascii_case("next_goal")
                        .then(|| value.trim().trim_matches(['`', '"', '\'']).to_string())
                })
            });

        match goal {
            Some(g) if g.eq_ignore_ascii_case("done") => ProgressVerdict::done(),
            Some(g) if !g.is_empty() => ProgressVerdict::continue_with(g),
            _ => {
                let trimmed = text.trim();
                ProgressVerdict {
                    done: false,
                    next_goal: (!trimmed.is_empty()).then(|| trimmed.to_string()),
                }
            }
        }
    }
}

#[async_trait]
impl ProgressAdvisor for ResponderAdvisor {
    async fn assess(
        &self,
        transcript: &Transcript,
        rounds_completed: usize,
        max_rounds: usize,
    ) -> Result<ProgressVerdict, ResponderError> {
        let mut review = Transcript::new();
        for block in transcript.blocks() {
            review.append(block.clone());
        }
        review.append(Block::user(Self::prompt(rounds_completed, max_rounds)));

        let response = self.responder.invoke(&review).await?;
        let verdict = Self::parse_verdict(&response.text);
        debug!(done = verdict.done, next_goal = ?verdict.next_goal, "Progress assessed");
        Ok(verdict)
    }
}
