//! Configuration system for Scrivener.
//!
//! Uses `figment` for layered configuration: defaults -> config file -> environment -> overrides.
//! Configuration is loaded from `~/.config/scrivener/config.toml` and/or
//! `.scrivener/config.toml` in the workspace directory.

use crate::error::ConfigError;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// Organisation template handed to the planner when none is configured.
pub const DEFAULT_DOCUMENT_STRUCTURE: &str = "Use this structure to create a document on the user-provided topic:

1. Introduction (no research needed)
   - Brief overview of the topic area

2. Main Body Sections:
   - Each section should focus on a sub-topic of the user-provided topic

3. Conclusion
   - Aim for 1 structural element (either a list or table) that distills the main body sections
   - Provide a concise summary of the document";

/// Top-level configuration for a generation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Model used for planning and grading.
    #[serde(default = "LlmConfig::default")]
    pub planner: LlmConfig,
    /// Model used for query generation and drafting.
    #[serde(default = "LlmConfig::default")]
    pub writer: LlmConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl GenerationConfig {
    /// Reject settings that would make a run meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workflow.number_of_queries == 0 {
            return Err(ConfigError::Invalid {
                message: "workflow.number_of_queries must be at least 1".to_string(),
            });
        }
        if self.search.provider.trim().is_empty() {
            return Err(ConfigError::Invalid {
                message: "search.provider must name a registered search provider".to_string(),
            });
        }
        Ok(())
    }
}

/// LLM provider configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider name: "openai", "ollama", "mock", or any OpenAI-compatible endpoint.
    pub provider: String,
    /// Model identifier (e.g., "gpt-4", "gpt-4o-mini").
    pub model: String,
    /// Environment variable name containing the API key.
    pub api_key_env: String,
    /// Inline API key. Takes precedence over `api_key_env`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Optional base URL override for the API endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Maximum tokens to generate in a response.
    pub max_tokens: usize,
    /// Default temperature for generation.
    pub temperature: f32,
    /// Per-request timeout.
    pub timeout_secs: u64,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            api_key: None,
            base_url: None,
            max_tokens: 4096,
            temperature: 0.0,
            timeout_secs: 120,
            retry: RetryConfig::default(),
        }
    }
}

/// Exponential backoff settings for transient provider failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 1000,
            max_backoff_ms: 30_000,
            backoff_multiplier: 2.0,
        }
    }
}

/// Search federation configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Registered provider name ("tavily", "exa", "perplexity", "duckduckgo").
    pub provider: String,
    /// Generic options shared across providers; each provider keeps only the keys it accepts.
    #[serde(default)]
    pub options: Map<String, Value>,
    /// Per-source budget for raw content, in tokens (roughly four characters each).
    pub max_tokens_per_source: usize,
    /// Whether raw page content is included in the drafting context.
    pub include_raw_content: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            provider: "tavily".to_string(),
            options: Map::new(),
            max_tokens_per_source: 4000,
            include_raw_content: true,
        }
    }
}

/// Bounds and templates for the generation workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Search queries generated per round (planning and each section iteration).
    pub number_of_queries: usize,
    /// Search iterations a section may run before it is force-completed.
    pub max_search_depth: u32,
    /// Free-text organisation template passed to the planner.
    pub document_structure: String,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            number_of_queries: 3,
            max_search_depth: 3,
            document_structure: DEFAULT_DOCUMENT_STRUCTURE.to_string(),
        }
    }
}

/// Tracing output configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
    /// Also write JSON logs to a daily rolling file.
    pub json_file: bool,
    /// Directory for the JSON log files. Defaults to the platform data dir.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json_file: false,
            log_dir: None,
        }
    }
}

/// Load configuration by merging all sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `SCRIVENER_`, `.env` honoured)
/// 3. Workspace-local config (`.scrivener/config.toml`)
/// 4. User config (`~/.config/scrivener/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&GenerationConfig>,
) -> Result<GenerationConfig, ConfigError> {
    // A missing .env is normal
    let _ = dotenvy::dotenv();

    let mut figment = Figment::from(Serialized::defaults(GenerationConfig::default()));

    if let Some(dirs) = project_dirs() {
        let user_config = dirs.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = ws.join(".scrivener").join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // SCRIVENER_WORKFLOW__MAX_SEARCH_DEPTH, SCRIVENER_SEARCH__PROVIDER, etc.
    figment = figment.merge(Env::prefixed("SCRIVENER_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    let config: GenerationConfig = figment.extract().map_err(|e| ConfigError::ParseError {
        message: e.to_string(),
    })?;
    config.validate()?;
    Ok(config)
}

/// Load configuration from a single TOML file layered over the defaults.
pub fn load_config_file(path: &Path) -> Result<GenerationConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    let config: GenerationConfig = Figment::from(Serialized::defaults(GenerationConfig::default()))
        .merge(Toml::file(path))
        .extract()
        .map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })?;
    config.validate()?;
    Ok(config)
}

pub(crate) fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("dev", "scrivener", "scrivener")
}
