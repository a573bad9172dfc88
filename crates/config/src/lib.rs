//! Configuration loading, validation, and management for llmagent.
//!
//! Loads configuration from `~/.llmagent/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.llmagent/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the LLM endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL of the OpenAI-compatible endpoint
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Verbose logging
    #[serde(default)]
    pub debug: bool,

    /// LLM settings
    #[serde(default)]
    pub llm: LlmConfig,

    /// Task loop settings
    #[serde(default)]
    pub task: TaskConfig,

    /// Validator agent settings
    #[serde(default)]
    pub validator: ValidatorConfig,
}

fn default_api_url() -> String {
    "https://api.openai.com/v1".into()
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("debug", &self.debug)
            .field("llm", &self.llm)
            .field("task", &self.task)
            .field("validator", &self.validator)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    /// Model used when GPT-4 is requested on the command line
    #[serde(default = "default_gpt4_model")]
    pub gpt4_model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_true")]
    pub stream: bool,

    /// Cache identical LLM requests in memory
    #[serde(default = "default_true")]
    pub cache: bool,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_chat_model() -> String {
    "gpt-3.5-turbo".into()
}
fn default_gpt4_model() -> String {
    "gpt-4".into()
}
fn default_temperature() -> f32 {
    0.2
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_timeout_secs() -> u64 {
    120
}
fn default_true() -> bool {
    true
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            chat_model: default_chat_model(),
            gpt4_model: default_gpt4_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            stream: true,
            cache: true,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Limits for tasks built with `Task::with_config`. The interactive chat
/// session ignores `max_turns`; only the human ends it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Upper bound on responder turns per task run
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
}

fn default_max_turns() -> usize {
    20
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
        }
    }
}

/// Settings for the recipient validator. Empty `recipients` means no
/// validator is configured.
///
/// The `llmagent` binary runs a single agent and never reads this section;
/// it is for programs that assemble multi-agent tasks from the library with
/// `ValidatorAgentConfig::from_config`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorConfig {
    #[serde(default = "default_validator_name")]
    pub name: String,

    #[serde(default)]
    pub recipients: Vec<String>,

    #[serde(default)]
    pub tool_recipient: String,

    /// Substring that marks a message as a tool request
    #[serde(default = "default_tool_marker")]
    pub tool_marker: String,
}

fn default_validator_name() -> String {
    "Validator".into()
}
fn default_tool_marker() -> String {
    "TOOL".into()
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            name: default_validator_name(),
            recipients: vec![],
            tool_recipient: String::new(),
            tool_marker: default_tool_marker(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.llmagent/config.toml).
    ///
    /// Environment variables override the file:
    /// - `LLMAGENT_API_KEY`, then `OPENAI_API_KEY` (when no key is configured)
    /// - `LLMAGENT_MODEL`
    /// - `LLMAGENT_API_URL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides using the given lookup.
    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if self.api_key.is_none() {
            self.api_key = var("LLMAGENT_API_KEY").or_else(|| var("OPENAI_API_KEY"));
        }
        if let Some(model) = var("LLMAGENT_MODEL") {
            self.llm.chat_model = model;
        }
        if let Some(url) = var("LLMAGENT_API_URL") {
            self.api_url = url;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".llmagent")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.llm.temperature < 0.0 || self.llm.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "llm.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.task.max_turns == 0 {
            return Err(ConfigError::ValidationError(
                "task.max_turns must be > 0".into(),
            ));
        }

        if self.validator.recipients.iter().any(|r| r.trim().is_empty()) {
            return Err(ConfigError::ValidationError(
                "validator.recipients must not contain blank names".into(),
            ));
        }

        if !self.validator.recipients.is_empty() && self.validator.tool_recipient.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "validator.tool_recipient is required when recipients are set".into(),
            ));
        }

        Ok(())
    }

    /// The chat model to use, honouring a GPT-4 request.
    pub fn chat_model(&self, gpt4: bool) -> &str {
        if gpt4 {
            &self.llm.gpt4_model
        } else {
            &self.llm.chat_model
        }
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: default_api_url(),
            debug: false,
            llm: LlmConfig::default(),
            task: TaskConfig::default(),
            validator: ValidatorConfig::default(),
        }
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
