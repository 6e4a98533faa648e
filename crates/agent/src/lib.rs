//! The round orchestrator and what it needs around it.
//!
//! A run alternates between asking the responder and executing the single
//! tool call it asked for, until the responder stops asking, the optional
//! progress advisor says the task is done, the round ceiling is hit, or the
//! run is cancelled. Responder text is extracted incrementally as it streams
//! and every event lands in the caller's [`Sink`](forgeloop_core::event::Sink).

pub mod action_runner;
pub mod advisor;
pub mod orchestrator;
pub mod sink;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use action_runner::{ActionOutcome, ActionRunner, ActionStatus};
pub use advisor::{ProgressAdvisor, ProgressVerdict, ResponderAdvisor};
pub use orchestrator::{OrchestratorSettings, RoundOrchestrator, RunOutcome};
pub use sink::{ConsoleSink, JsonLinesSink};
