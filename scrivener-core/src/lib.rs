//! # Scrivener Core
//!
//! Core library for Scrivener, an LLM-driven long-form writer.
//! Provides the generation pipeline (planning, human review, per-section
//! research loops, synthesis and compilation), search federation, the LLM
//! interface (brain), configuration, and fundamental types.

pub mod brain;
pub mod config;
pub mod error;
pub mod generation;
pub mod logging;
pub mod persistence;
pub mod providers;
pub mod search;
pub mod types;

// Re-export commonly used types at the crate root.
pub use brain::{Brain, LlmProvider, MockLlmProvider};
pub use config::{GenerationConfig, LlmConfig, SearchConfig, WorkflowConfig};
pub use error::{Result, ScrivenerError};
pub use generation::{
    CheckpointDecision, FeedbackChannel, GenerationEngine, PipelineCallback, RunPhase, RunState,
    Section,
};
pub use search::{ProviderRegistry, SearchFederator, SearchProvider, SourceRecord};
pub use types::{CompletionRequest, CompletionResponse, Message, Role, TokenUsage};
