//! forgeloop CLI, the main entry point.
//!
//! Commands:
//! - `run`      Drive responder and tool rounds for one task
//! - `extract`  Extract wrapper events and actions from a saved response
//! - `config`   Show, locate or initialize the configuration

use clap::{Parser, Subcommand};

mod commands;

use commands::GrammarArg;

#[derive(Parser)]
#[command(
    name = "forgeloop",
    about = "forgeloop: streaming action extraction and tool rounds for LLM responders",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one task through the round orchestrator
    Run {
        /// The task for the responder
        #[arg(short, long)]
        message: String,

        /// Override orchestrator.max_rounds
        #[arg(long)]
        max_rounds: Option<usize>,

        /// Ask a progress advisor between rounds
        #[arg(long)]
        planner: bool,

        /// Request whole responses instead of streaming
        #[arg(long)]
        no_stream: bool,

        /// Stop on the first failed tool call
        #[arg(long)]
        fail_fast: bool,

        /// Print events as JSON lines instead of console text
        #[arg(long)]
        json: bool,
    },

    /// Extract events and actions from a response saved on disk
    Extract {
        /// Response text to read; stdin when omitted
        file: Option<std::path::PathBuf>,

        /// Extraction grammar; defaults to orchestrator.grammar
        #[arg(short, long, value_enum)]
        grammar: Option<GrammarArg>,

        /// Feed the text in fragments of this many chars
        #[arg(long, default_value_t = 64)]
        chunk_size: usize,

        /// Apply extracted actions with the built-in tools
        #[arg(long)]
        apply: bool,

        /// Workspace for --apply; overrides tools.workspace_dir
        #[arg(short, long)]
        workspace: Option<std::path::PathBuf>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Print the config file path
    Path,
    /// Write a default config file if none exists
    Init,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries responder text and JSON lines
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Run {
            message,
            max_rounds,
            planner,
            no_stream,
            fail_fast,
            json,
        } => {
            commands::run::run(commands::run::RunArgs {
                message,
                max_rounds,
                planner,
                streaming: !no_stream,
                fail_fast,
                json,
            })
            .await?
        }
        Commands::Extract {
            file,
            grammar,
            chunk_size,
            apply,
            workspace,
        } => commands::extract::run(file, grammar, chunk_size, apply, workspace).await?,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show().await?,
            ConfigAction::Path => commands::config_cmd::path().await?,
            ConfigAction::Init => commands::config_cmd::init().await?,
        },
    }

    Ok(())
}
