//! Pipeline configuration.
//!
//! [`SteerConfig`] is immutable once a [`Pipeline`](crate::pipeline::Pipeline)
//! holds it. Every field has a default, so a JSON config file only needs the
//! keys it changes.
//!
//! # Examples
//!
//! ```
//! use steer_rs::config::{RenderMode, SteerConfig};
//!
//! let config = SteerConfig::default()
//!     .with_hidden_target("Sunken Temple")
//!     .with_render_mode(RenderMode::TemplateOnly)
//!     .with_window_size(8);
//! assert_eq!(config.inference.model, "gpt-4.1");
//! ```

use crate::OPENAI_CHAT_URL;
use crate::prompt::{PromptOverrides, PromptRevision};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Environment variables consulted for the API key, in order.
pub const API_KEY_ENV_VARS: [&str; 2] = ["STEER_API_KEY", "OPENAI_API_KEY"];

pub const DEFAULT_HIDDEN_TARGET: &str = "Medieval Castle";

pub const DEFAULT_OPEN_GOAL: &str =
    "Create a detailed scene description that can be used for visual rendering or storytelling purposes.";

/// Number of recent messages the inference stage sees.
pub const DEFAULT_WINDOW_SIZE: usize = 6;

/// Turns with an index below this are early turns.
pub const EARLY_TURN_THRESHOLD: u32 = 3;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse config file '{path}': {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
}

// ── Stage config ───────────────────────────────────────────────────

/// Model parameters for one backend call site.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StageConfig {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl StageConfig {
    pub fn new(model: impl Into<String>, temperature: f32, max_tokens: u32) -> Self {
        Self {
            model: model.into(),
            temperature,
            max_tokens,
        }
    }

    pub fn inference() -> Self {
        Self::new("gpt-4.1", 0.3, 500)
    }

    pub fn render() -> Self {
        Self::new("gpt-4.1-mini", 0.8, 800)
    }

    pub fn summary() -> Self {
        Self::new("gpt-4.1-nano", 0.7, 1000)
    }
}

/// What to do with inference output that fails to parse because it was
/// cut off.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RepairPolicy {
    /// Close unterminated objects and arrays once, then re-validate.
    #[default]
    Lenient,
    /// Any parse failure goes straight to the fallback directive.
    Strict,
}

/// How the render stage produces its text.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RenderMode {
    /// Polish the template draft with the render model.
    #[default]
    Llm,
    /// Use the deterministic template draft only. No backend call.
    TemplateOnly,
}

// ── SteerConfig ────────────────────────────────────────────────────

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SteerConfig {
    /// OpenAI-compatible chat completions URL.
    pub endpoint: String,
    /// Explicit API key. Falls back to [`API_KEY_ENV_VARS`] when unset.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Upper bound on every backend call, in seconds.
    pub request_timeout_secs: u64,
    pub inference: StageConfig,
    pub render: StageConfig,
    pub summary: StageConfig,
    pub hidden_target: String,
    pub open_goal: String,
    pub window_size: usize,
    pub early_turn_threshold: u32,
    pub repair_policy: RepairPolicy,
    pub render_mode: RenderMode,
    pub prompt_revision: PromptRevision,
    pub prompt_overrides: PromptOverrides,
}

impl Default for SteerConfig {
    fn default() -> Self {
        Self {
            endpoint: OPENAI_CHAT_URL.to_string(),
            api_key: None,
            request_timeout_secs: crate::DEFAULT_TIMEOUT_SECS,
            inference: StageConfig::inference(),
            render: StageConfig::render(),
            summary: StageConfig::summary(),
            hidden_target: DEFAULT_HIDDEN_TARGET.to_string(),
            open_goal: DEFAULT_OPEN_GOAL.to_string(),
            window_size: DEFAULT_WINDOW_SIZE,
            early_turn_threshold: EARLY_TURN_THRESHOLD,
            repair_policy: RepairPolicy::default(),
            render_mode: RenderMode::default(),
            prompt_revision: PromptRevision::default(),
            prompt_overrides: PromptOverrides::default(),
        }
    }
}

impl SteerConfig {
    /// Load a config from a JSON file. Missing keys take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// The explicit key if set and non-blank, otherwise the first non-blank
    /// environment variable from [`API_KEY_ENV_VARS`].
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| {
                API_KEY_ENV_VARS
                    .iter()
                    .filter_map(|var| std::env::var(var).ok())
                    .find(|k| !k.trim().is_empty())
            })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_request_timeout_secs(mut self, secs: u64) -> Self {
        self.request_timeout_secs = secs;
        self
    }

    pub fn with_hidden_target(mut self, target: impl Into<String>) -> Self {
        self.hidden_target = target.into();
        self
    }

    pub fn with_open_goal(mut self, goal: impl Into<String>) -> Self {
        self.open_goal = goal.into();
        self
    }

    pub fn with_window_size(mut self, size: usize) -> Self {
        self.window_size = size;
        self
    }

    pub fn with_early_turn_threshold(mut self, threshold: u32) -> Self {
        self.early_turn_threshold = threshold;
        self
    }

    pub fn with_repair_policy(mut self, policy: RepairPolicy) -> Self {
        self.repair_policy = policy;
        self
    }

    pub fn with_render_mode(mut self, mode: RenderMode) -> Self {
        self.render_mode = mode;
        self
    }

    pub fn with_prompt_revision(mut self, revision: PromptRevision) -> Self {
        self.prompt_revision = revision;
        self
    }

    pub fn with_prompt_overrides(mut self, overrides: PromptOverrides) -> Self {
        self.prompt_overrides = overrides;
        self
    }
}
