//! `forgeloop run`: one task through the round orchestrator.

use std::sync::Arc;

use forgeloop_agent::{ConsoleSink, JsonLinesSink, OrchestratorSettings, RoundOrchestrator};
use forgeloop_config::AppConfig;
use forgeloop_core::event::Sink;
use forgeloop_core::run::StopReason;
use forgeloop_core::tool::ToolExecutor;
use forgeloop_providers::OpenAiCompatResponder;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub struct RunArgs {
    pub message: String,
    pub max_rounds: Option<usize>,
    pub planner: bool,
    pub streaming: bool,
    pub fail_fast: bool,
    pub json: bool,
}

pub async fn run(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if !config.has_api_key() && config.responder.provider != "ollama" {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set FORGELOOP_API_KEY (or OPENAI_API_KEY), or add api_key to");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let registry = Arc::new(forgeloop_tools::default_registry(&config.tools));
    let responder = OpenAiCompatResponder::from_config(&config.responder)?
        .with_tools(registry.definitions());
    info!(
        provider = %config.responder.provider,
        model = responder.model(),
        "Responder ready"
    );

    let mut settings = OrchestratorSettings::from(&config.orchestrator);
    if let Some(max_rounds) = args.max_rounds {
        if max_rounds == 0 {
            return Err("--max-rounds must be at least 1".into());
        }
        settings.max_rounds = max_rounds;
    }
    settings.use_planner |= args.planner;
    settings.fail_fast |= args.fail_fast;
    settings.streaming &= args.streaming;

    let orchestrator =
        RoundOrchestrator::new(Arc::new(responder), registry).with_settings(settings);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; stopping after the current step");
            on_interrupt.cancel();
        }
    });

    let mut sink: Box<dyn Sink> = if args.json {
        Box::new(JsonLinesSink::new(std::io::stdout()))
    } else {
        Box::new(ConsoleSink::stdio())
    };

    let outcome = orchestrator
        .run(&args.message, sink.as_mut(), &cancel)
        .await;

    info!(
        stop_reason = %outcome.stop_reason(),
        rounds = outcome.state.round_count,
        actions = outcome.actions.len(),
        "Done"
    );

    match (outcome.stop_reason(), outcome.error) {
        (StopReason::Error, Some(e)) => Err(e.into()),
        (StopReason::Error, None) => Err("run stopped with an error".into()),
        _ => Ok(()),
    }
}
