pub mod config_cmd;
pub mod extract;
pub mod run;

use clap::ValueEnum;
use forgeloop_core::action::Grammar;

/// Command-line spelling of [`Grammar`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum GrammarArg {
    /// `<boltArtifact id=".." title="..">` wrapper with JSON objects inside
    PairedTag,
    /// Bare `{"type": ..}` objects anywhere in the text
    Balanced,
}

impl From<GrammarArg> for Grammar {
    fn from(arg: GrammarArg) -> Self {
        match arg {
            GrammarArg::PairedTag => Grammar::PairedTag,
            GrammarArg::Balanced => Grammar::Balanced,
        }
    }
}
