//! `forgeloop extract`: run the stream extractor over saved text.

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use forgeloop_agent::{ActionRunner, JsonLinesSink};
use forgeloop_config::{AppConfig, OrchestratorConfig};
use forgeloop_core::action::Grammar;
use forgeloop_core::event::Sink;
use forgeloop_extract::StreamExtractor;

use super::GrammarArg;

pub async fn run(
    file: Option<PathBuf>,
    grammar: Option<GrammarArg>,
    chunk_size: usize,
    apply: bool,
    workspace: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    if let Some(dir) = workspace {
        config.tools.workspace_dir = dir;
    }

    let text = match &file {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("Failed to read {}: {e}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };

    let grammar = resolve_grammar(grammar, &config.orchestrator);
    let mut extractor = StreamExtractor::with_wrapper_tag(grammar, &config.orchestrator.wrapper_tag);
    let mut sink = JsonLinesSink::new(std::io::stdout());

    for fragment in fragments(&text, chunk_size) {
        for event in extractor.feed(fragment) {
            sink.emit(event.into());
        }
    }
    for event in extractor.end_of_stream() {
        sink.emit(event.into());
    }

    let actions = extractor.into_actions();
    tracing::info!(actions = actions.len(), "Extraction finished");

    if apply {
        let registry = Arc::new(forgeloop_tools::default_registry(&config.tools));
        let runner = ActionRunner::new(registry);
        let outcomes = runner.apply(&actions).await;
        let failed = outcomes.iter().filter(|o| o.is_failure()).count();
        for outcome in &outcomes {
            println!("{}", serde_json::to_string(outcome)?);
        }
        if failed > 0 {
            return Err(format!("{failed} of {} action(s) failed", outcomes.len()).into());
        }
    }

    Ok(())
}

/// The `--grammar` flag when given, otherwise the configured grammar.
fn resolve_grammar(arg: Option<GrammarArg>, config: &OrchestratorConfig) -> Grammar {
    arg.map(Grammar::from).unwrap_or(config.grammar)
}

/// Split `text` into pieces of at most `size` chars, on char boundaries.
fn fragments(text: &str, size: usize) -> Vec<&str> {
    let size = size.max(1);
    let mut pieces = Vec::new();
    let mut start = 0;
    for (count, (idx, _)) in text.char_indices().enumerate() {
        if count > 0 && count % size == 0 {
            pieces.push(&text[start..idx]);
            start = idx;
        }
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragments_respect_char_boundaries() {
        let text = "héllo→wörld";
        let pieces = fragments(text, 3);
        assert_eq!(pieces, vec!["hél", "lo→", "wör", "ld"]);
        assert_eq!(pieces.concat(), text);
    }

    #[test]
    fn grammar_falls_back_to_config() {
        let config = OrchestratorConfig {
            grammar: Grammar::Balanced,
            ..OrchestratorConfig::default()
        };
        assert_eq!(resolve_grammar(None, &config), Grammar::Balanced);
        assert_eq!(
            resolve_grammar(Some(GrammarArg::PairedTag), &config),
            Grammar::PairedTag
        );
        assert_eq!(
            resolve_grammar(None, &OrchestratorConfig::default()),
            Grammar::PairedTag
        );
    }

    #[test]
    fn zero_chunk_size_means_one_char() {
        assert_eq!(fragments("abc", 0), vec!["a", "b", "c"]);
        assert!(fragments("", 4).is_empty());
    }
}
