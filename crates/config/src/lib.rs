//! Configuration loading, validation, and management for forgeloop.
//!
//! Loads configuration from `~/.forgeloop/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use forgeloop_core::Grammar;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.forgeloop/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Model endpoint settings
    #[serde(default)]
    pub responder: ResponderConfig,

    /// Round loop settings
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// Built-in tool settings
    #[serde(default)]
    pub tools: ToolsConfig,
}

/// The OpenAI-compatible endpoint the run talks to.
#[derive(Clone, Serialize, Deserialize)]
pub struct ResponderConfig {
    /// Provider label, used in logs and to pick a default URL
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Base URL; `/chat/completions` is appended
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Max tokens per response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Whole-request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_provider() -> String {
    "openai".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.2
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_timeout_secs() -> u64 {
    120
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for ResponderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponderConfig")
            .field("provider", &self.provider)
            .field("api_url", &self.api_url)
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            api_url: None,
            api_key: None,
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Settings for the round orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Hard ceiling on completed rounds
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,

    /// Ask a progress advisor after each round whether the task is done
    #[serde(default)]
    pub use_planner: bool,

    /// Stop the run on the first tool failure instead of reporting it back
    #[serde(default)]
    pub fail_fast: bool,

    /// Consume responses incrementally
    #[serde(default = "default_true")]
    pub streaming: bool,

    /// How actions are recognized in responder text
    #[serde(default)]
    pub grammar: Grammar,

    /// Reserved wrapper tag for the paired-tag grammar
    #[serde(default = "default_wrapper_tag")]
    pub wrapper_tag: String,

    /// Prepended to every transcript
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

fn default_max_rounds() -> usize {
    10
}
fn default_true() -> bool {
    true
}
fn default_wrapper_tag() -> String {
    "boltArtifact".into()
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            use_planner: false,
            fail_fast: false,
            streaming: true,
            grammar: Grammar::default(),
            wrapper_tag: default_wrapper_tag(),
            system_prompt: None,
        }
    }
}

/// Settings for the built-in `shell` and `file_write` tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Root that file writes and commands are confined to
    #[serde(default = "default_workspace_dir")]
    pub workspace_dir: PathBuf,

    /// Commands the shell tool may run (first word). Empty allows all.
    #[serde(default = "default_allowed_commands")]
    pub allowed_commands: Vec<String>,

    /// Path prefixes that may never be written
    #[serde(default = "default_forbidden_paths")]
    pub forbidden_paths: Vec<String>,

    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
}

fn default_workspace_dir() -> PathBuf {
    PathBuf::from(".")
}
fn default_allowed_commands() -> Vec<String> {
    [
        "ls", "cat", "echo", "pwd", "mkdir", "touch", "cp", "mv", "grep", "find", "git",
        "npm", "npx", "node", "cargo", "python3",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
fn default_forbidden_paths() -> Vec<String> {
    ["/etc", "/proc", "/sys", "~/.ssh", "~/.gnupg"]
        .into_iter()
        .map(String::from)
        .collect()
}
fn default_command_timeout_secs() -> u64 {
    60
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            workspace_dir: default_workspace_dir(),
            allowed_commands: default_allowed_commands(),
            forbidden_paths: default_forbidden_paths(),
            command_timeout_secs: default_command_timeout_secs(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.forgeloop/config.toml).
    ///
    /// Environment variables override the file:
    /// - `FORGELOOP_API_KEY`, then `OPENAI_API_KEY` (only if no key is configured)
    /// - `FORGELOOP_MODEL`
    /// - `FORGELOOP_API_URL`
    /// - `FORGELOOP_MAX_ROUNDS`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::read_file(&config_path)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::read_file(path)?;
        config.validate()?;
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Apply overrides from `lookup`, usually the process environment.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if self.responder.api_key.is_none() {
            self.responder.api_key =
                lookup("FORGELOOP_API_KEY").or_else(|| lookup("OPENAI_API_KEY"));
        }

        if let Some(model) = lookup("FORGELOOP_MODEL") {
            self.responder.model = model;
        }

        if let Some(url) = lookup("FORGELOOP_API_URL") {
            self.responder.api_url = Some(url);
        }

        if let Some(rounds) = lookup("FORGELOOP_MAX_ROUNDS") {
            self.orchestrator.max_rounds = rounds.trim().parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "FORGELOOP_MAX_ROUNDS must be a positive integer, got '{rounds}'"
                ))
            })?;
        }

        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".forgeloop")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.responder.temperature < 0.0 || self.responder.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "responder.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.orchestrator.max_rounds == 0 {
            return Err(ConfigError::ValidationError(
                "orchestrator.max_rounds must be at least 1".into(),
            ));
        }

        let tag = &self.orchestrator.wrapper_tag;
        if tag.is_empty() || !tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
            return Err(ConfigError::ValidationError(format!(
                "orchestrator.wrapper_tag '{tag}' must be a non-empty ASCII tag name"
            )));
        }

        if self.tools.command_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "tools.command_timeout_secs must be > 0".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.responder.api_key.is_some()
    }

    /// Generate a default config TOML string (for `config --init`).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
