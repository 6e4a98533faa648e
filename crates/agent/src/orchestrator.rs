//! The round orchestrator: a small explicit state machine.
//!
//! ```text
//! Init → AwaitResponse ─┬─ tool call ──→ ExecuteTool ──→ AwaitResponse | End
//!                       ├─ planner ────→ CheckProgress → AwaitResponse | End
//!                       └─ otherwise ──→ End
//! ```
//!
//! A run is strictly sequential: one responder or tool call in flight at a
//! time. Cancellation is observed at the top of every state that would start
//! new work, so an in-flight call always finishes.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use forgeloop_config::OrchestratorConfig;
use forgeloop_core::action::{Action, Grammar, WrapperHeader};
use forgeloop_core::error::{Error, ResponderError};
use forgeloop_core::event::{DomainEvent, EventBus, RunNotice, Sink, StructuralEvent};
use forgeloop_core::responder::{ResponseBlock, Responder, ToolCallRequest, Usage};
use forgeloop_core::run::{Round, RunState, StopReason};
use forgeloop_core::tool::ToolExecutor;
use forgeloop_core::transcript::{Block, Transcript};
use forgeloop_extract::StreamExtractor;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::advisor::{ProgressAdvisor, ResponderAdvisor};

/// Knobs of a single orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub max_rounds: usize,
    pub use_planner: bool,
    pub fail_fast: bool,
    pub streaming: bool,
    pub grammar: Grammar,
    pub wrapper_tag: String,
    pub system_prompt: Option<String>,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from(&OrchestratorConfig::default())
    }
}

impl From<&OrchestratorConfig> for OrchestratorSettings {
    fn from(config: &OrchestratorConfig) -> Self {
        Self {
            max_rounds: config.max_rounds,
            use_planner: config.use_planner,
            fail_fast: config.fail_fast,
            streaming: config.streaming,
            grammar: config.grammar,
            wrapper_tag: config.wrapper_tag.clone(),
            system_prompt: config.system_prompt.clone(),
        }
    }
}

/// Everything a finished run leaves behind.
#[derive(Debug)]
pub struct RunOutcome {
    pub transcript: Transcript,
    pub state: RunState,
    pub rounds: Vec<Round>,
    /// Actions extracted from every response, in emission order.
    pub actions: Vec<Action>,
    pub header: Option<WrapperHeader>,
    /// Set exactly when the run stopped with [`StopReason::Error`].
    pub error: Option<Error>,
}

impl RunOutcome {
    pub fn stop_reason(&self) -> StopReason {
        self.state.stop_reason.unwrap_or(StopReason::Error)
    }
}

enum State {
    Init,
    AwaitResponse,
    ExecuteTool(ToolCallRequest),
    CheckProgress,
    End(StopReason),
}

/// Mutable state owned by one run.
struct RunContext<'a> {
    transcript: Transcript,
    state: RunState,
    rounds: Vec<Round>,
    extractor: StreamExtractor,
    error: Option<Error>,
    sink: &'a mut dyn Sink,
    cancel: &'a CancellationToken,
}

impl RunContext<'_> {
    fn emit(&mut self, events: Vec<StructuralEvent>) {
        for event in events {
            self.sink.emit(event.into());
        }
    }

    fn run_id(&self) -> String {
        self.transcript.id.to_string()
    }
}

/// Drives responder ↔ tool rounds for one task at a time.
pub struct RoundOrchestrator {
    responder: Arc<dyn Responder>,
    executor: Arc<dyn ToolExecutor>,
    advisor: Option<Arc<dyn ProgressAdvisor>>,
    event_bus: Option<Arc<EventBus>>,
    settings: OrchestratorSettings,
}

impl RoundOrchestrator {
    pub fn new(responder: Arc<dyn Responder>, executor: Arc<dyn ToolExecutor>) -> Self {
        Self {
            responder,
            executor,
            advisor: None,
            event_bus: None,
            settings: OrchestratorSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: OrchestratorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.settings.max_rounds = max_rounds;
        self
    }

    pub fn with_planner(mut self, enabled: bool) -> Self {
        self.settings.use_planner = enabled;
        self
    }

    pub fn with_fail_fast(mut self, enabled: bool) -> Self {
        self.settings.fail_fast = enabled;
        self
    }

    pub fn with_streaming(mut self, enabled: bool) -> Self {
        self.settings.streaming = enabled;
        self
    }

    pub fn with_grammar(mut self, grammar: Grammar) -> Self {
        self.settings.grammar = grammar;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.settings.system_prompt = Some(prompt.into());
        self
    }

    /// Use a dedicated advisor. Without one, the planner asks the main
    /// responder.
    pub fn with_advisor(mut self, advisor: Arc<dyn ProgressAdvisor>) -> Self {
        self.advisor = Some(advisor);
        self
    }

    /// Publish domain events while runs progress.
    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Run one task to completion, streaming events into `sink`.
    ///
    /// Always returns an outcome; a fatal failure is reported in
    /// `RunOutcome::error` alongside whatever the run produced before it.
    pub async fn run(
        &self,
        user_input: &str,
        sink: &mut dyn Sink,
        cancel: &CancellationToken,
    ) -> RunOutcome {
        let advisor: Option<Arc<dyn ProgressAdvisor>> = if self.settings.use_planner {
            Some(self.advisor.clone().unwrap_or_else(|| {
                Arc::new(ResponderAdvisor::new(self.responder.clone())) as Arc<dyn ProgressAdvisor>
            }))
        } else {
            None
        };

        let mut run = RunContext {
            transcript: Transcript::new(),
            state: RunState::new(self.settings.max_rounds, self.settings.use_planner),
            rounds: Vec::new(),
            extractor: StreamExtractor::with_wrapper_tag(
                self.settings.grammar,
                &self.settings.wrapper_tag,
            ),
            error: None,
            sink,
            cancel,
        };

        let mut state = State::Init;
        let reason = loop {
            state = match state {
                State::Init => self.init(&mut run, user_input),
                State::AwaitResponse => self.await_response(&mut run).await,
                State::ExecuteTool(call) => self.execute_tool(&mut run, call).await,
                State::CheckProgress => match &advisor {
                    Some(advisor) => self.check_progress(&mut run, advisor.as_ref()).await,
                    None => State::End(StopReason::ToolLoopEnded),
                },
                State::End(reason) => break reason,
            };
        };

        run.state.stop(reason);
        let rounds = run.state.round_count;
        info!(
            run_id = %run.transcript.id,
            stop_reason = %reason,
            rounds,
            "Run finished"
        );
        run.sink.emit(
            RunNotice::Stopped {
                stop_reason: reason,
                rounds,
            }
            .into(),
        );
        self.publish(DomainEvent::RunStopped {
            run_id: run.run_id(),
            stop_reason: reason,
            rounds,
            timestamp: Utc::now(),
        });

        let header = run.extractor.header().cloned();
        RunOutcome {
            transcript: run.transcript,
            state: run.state,
            rounds: run.rounds,
            actions: run.extractor.into_actions(),
            header,
            error: run.error,
        }
    }

    fn init(&self, run: &mut RunContext<'_>, user_input: &str) -> State {
        if let Some(prompt) = &self.settings.system_prompt {
            run.transcript.append(Block::system(prompt));
        }
        run.transcript.append(Block::user(user_input));
        info!(
            run_id = %run.transcript.id,
            max_rounds = self.settings.max_rounds,
            planner = self.settings.use_planner,
            "Run started"
        );

        if run.state.ceiling_reached() {
            return State::End(StopReason::MaxRoundsReached);
        }
        State::AwaitResponse
    }

    async fn await_response(&self, run: &mut RunContext<'_>) -> State {
        if run.cancel.is_cancelled() {
            return State::End(StopReason::Cancelled);
        }

        let round = run.state.round_count;
        debug!(run_id = %run.transcript.id, round, "Awaiting response");
        run.rounds.push(Round::new(round, run.transcript.len()));
        run.extractor.set_round(round);
        self.publish(DomainEvent::RoundStarted {
            run_id: run.run_id(),
            round,
            timestamp: Utc::now(),
        });

        let result = if self.settings.streaming {
            self.receive_streamed(run).await
        } else {
            self.receive_whole(run).await
        };

        let end_events = run.extractor.end_of_stream();
        run.emit(end_events);

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                warn!(run_id = %run.transcript.id, round, error = %e, "Responder failed");
                run.error = Some(Error::Responder(e));
                return State::End(StopReason::Error);
            }
        };

        self.publish(DomainEvent::ResponseReceived {
            run_id: run.run_id(),
            round,
            tool_calls: response.tool_calls.len(),
            tokens_used: response.usage.as_ref().map(|u| u.total_tokens),
            timestamp: Utc::now(),
        });

        let first_call = response.tool_calls.first().cloned();
        if response.tool_calls.len() > 1 {
            debug!(
                requested = response.tool_calls.len(),
                "Only the first tool call of a round is executed"
            );
        }
        run.transcript
            .append(Block::responder(response.text, response.tool_calls));

        match first_call {
            Some(call) => State::ExecuteTool(call),
            None if self.settings.use_planner => State::CheckProgress,
            None => State::End(StopReason::ToolLoopEnded),
        }
    }

    async fn receive_whole(&self, run: &mut RunContext<'_>) -> Result<ResponseBlock, ResponderError> {
        let response = self.responder.invoke(&run.transcript).await?;
        let events = run.extractor.feed(&response.text);
        run.emit(events);
        Ok(response)
    }

    /// Feed each fragment to the extractor as it arrives and rebuild the
    /// full response once the stream ends.
    async fn receive_streamed(
        &self,
        run: &mut RunContext<'_>,
    ) -> Result<ResponseBlock, ResponderError> {
        let mut rx = self.responder.invoke_streaming(&run.transcript).await?;
        let mut text = String::new();
        let mut tool_calls: Vec<ToolCallRequest> = Vec::new();
        let mut usage: Option<Usage> = None;

        while let Some(chunk) = rx.recv().await {
            let chunk = chunk?;
            if let Some(content) = &chunk.content
                && !content.is_empty()
            {
                text.push_str(content);
                let events = run.extractor.feed(content);
                run.emit(events);
            }
            tool_calls.extend(chunk.tool_calls);
            if chunk.usage.is_some() {
                usage = chunk.usage;
            }
            if chunk.done {
                break;
            }
        }

        Ok(ResponseBlock {
            text,
            tool_calls,
            usage,
            model: None,
        })
    }

    async fn execute_tool(&self, run: &mut RunContext<'_>, call: ToolCallRequest) -> State {
        if run.cancel.is_cancelled() {
            return State::End(StopReason::Cancelled);
        }

        let round = run.state.round_count;
        debug!(run_id = %run.transcript.id, round, tool = %call.name, "Executing tool");

        let start = Instant::now();
        let result = self.executor.execute(&call.name, &call.arguments).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        let (output, failure) = match result {
            Ok(output) => (output, None),
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Tool execution failed");
                (format!("Error executing tool {}: {e}", call.name), Some(e))
            }
        };
        let success = failure.is_none();

        run.transcript.append(Block::tool_result(&call, &output));
        run.sink.emit(
            RunNotice::ToolResult {
                round,
                name: call.name.clone(),
                output: output.clone(),
                success,
            }
            .into(),
        );
        self.publish(DomainEvent::ToolExecuted {
            run_id: run.run_id(),
            tool_name: call.name.clone(),
            success,
            duration_ms,
            timestamp: Utc::now(),
        });
        if let Some(record) = run.rounds.last_mut() {
            record.requested_tool = Some(call);
            record.tool_result = Some(output);
        }

        run.state.round_count += 1;

        if let Some(e) = failure
            && self.settings.fail_fast
        {
            run.error = Some(Error::Tool(e));
            return State::End(StopReason::Error);
        }

        if run.state.ceiling_reached() {
            return State::End(StopReason::MaxRoundsReached);
        }
        State::AwaitResponse
    }

    async fn check_progress(&self, run: &mut RunContext<'_>, advisor: &dyn ProgressAdvisor) -> State {
        if run.cancel.is_cancelled() {
            return State::End(StopReason::Cancelled);
        }

        let round = run.state.round_count;
        let verdict = match advisor
            .assess(&run.transcript, round, run.state.max_rounds)
            .await
        {
            Ok(verdict) => verdict,
            Err(e) => {
                warn!(run_id = %run.transcript.id, round, error = %e, "Progress advisor failed");
                run.error = Some(Error::Responder(e));
                return State::End(StopReason::Error);
            }
        };

        self.publish(DomainEvent::ProgressChecked {
            run_id: run.run_id(),
            round,
            done: verdict.done,
            timestamp: Utc::now(),
        });

        // The ceiling wins over whatever the advisor said
        if run.state.ceiling_reached() {
            return State::End(StopReason::MaxRoundsReached);
        }
        if verdict.done {
            return State::End(StopReason::PlannerDone);
        }

        let goal = verdict
            .next_goal
            .unwrap_or_else(|| "Continue with the task.".to_string());
        debug!(round, next_goal = %goal, "Continuing with next goal");
        run.transcript.append(Block::user(goal));
        run.state.round_count += 1;
        State::AwaitResponse
    }

    fn publish(&self, event: DomainEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish(event);
        }
    }
}
