//! Error types for the Scrivener core library.
//!
//! Uses `thiserror` for public API error types with structured error variants
//! covering LLM, search, planning, checkpoint, compilation, and configuration domains.

use std::path::PathBuf;

/// Top-level error type for the Scrivener core library.
#[derive(Debug, thiserror::Error)]
pub enum ScrivenerError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Search error: {0}")]
    Search(#[from] SearchError),

    #[error("Plan error: {0}")]
    Plan(#[from] PlanError),

    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("Compile error: {0}")]
    Compile(#[from] CompileError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from LLM provider interactions.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("API request failed: {message}")]
    ApiRequest { message: String },

    #[error("API response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Provider connection failed: {message}")]
    Connection { message: String },
}

/// Errors from search providers and the federation layer.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("Unsupported search provider: {provider}")]
    UnsupportedProvider { provider: String },

    #[error("Search provider already registered: {provider}")]
    AlreadyRegistered { provider: String },

    #[error("Search request to '{provider}' failed: {message}")]
    Request { provider: String, message: String },

    #[error("Could not parse '{provider}' response: {message}")]
    ResponseParse { provider: String, message: String },

    #[error("Invalid options for '{provider}': {reason}")]
    InvalidOptions { provider: String, reason: String },

    #[error("Search provider '{provider}' needs an API key in ${env}")]
    MissingApiKey { provider: String, env: String },
}

/// Errors from section planning.
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("Planner returned a malformed plan: {message}")]
    Malformed { message: String },

    #[error("Planner returned no sections")]
    Empty,

    #[error("Section name appears more than once in the plan: {name}")]
    DuplicateSection { name: String },
}

/// Errors from the human review checkpoint.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("Resume value of type {kind} is not supported (expected `true` or a feedback string)")]
    UnsupportedResume { kind: String },

    #[error("Feedback channel closed before a decision arrived")]
    ChannelClosed,

    #[error("Run is not awaiting feedback (phase: {phase})")]
    NotAwaitingFeedback { phase: String },

    #[error("Plan has not been approved (phase: {phase})")]
    NotApproved { phase: String },

    #[error("Run has already finished (phase: {phase})")]
    RunFinished { phase: String },
}

/// Errors from document compilation.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("Planned section has no completed content: {name}")]
    MissingSection { name: String },
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

/// A type alias for results using the top-level `ScrivenerError`.
pub type Result<T> = std::result::Result<T, ScrivenerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_llm() {
        let err = ScrivenerError::Llm(LlmError::ApiRequest {
            message: "connection refused".into(),
        });
        assert_eq!(
            err.to_string(),
            "LLM error: API request failed: connection refused"
        );
    }

    #[test]
    fn test_error_display_search() {
        let err = ScrivenerError::Search(SearchError::UnsupportedProvider {
            provider: "bing".into(),
        });
        assert_eq!(
            err.to_string(),
            "Search error: Unsupported search provider: bing"
        );
    }

    #[test]
    fn test_error_display_checkpoint() {
        let err = CheckpointError::UnsupportedResume {
            kind: "number".into(),
        };
        assert!(err.to_string().contains("number"));
    }

    #[test]
    fn test_error_display_compile() {
        let err = ScrivenerError::Compile(CompileError::MissingSection {
            name: "Conclusion".into(),
        });
        assert_eq!(
            err.to_string(),
            "Compile error: Planned section has no completed content: Conclusion"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: ScrivenerError = io_err.into();
        assert!(matches!(err, ScrivenerError::Io(_)));
    }

    #[test]
    fn test_error_from_serde() {
        let serde_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err: ScrivenerError = serde_err.into();
        assert!(matches!(err, ScrivenerError::Serialization(_)));
    }

    #[test]
    fn test_llm_error_variants() {
        let err = LlmError::RateLimited {
            retry_after_secs: 60,
        };
        assert_eq!(err.to_string(), "Rate limited by provider, retry after 60s");

        let err = LlmError::Timeout { timeout_secs: 30 };
        assert_eq!(err.to_string(), "Request timed out after 30s");
    }
}
