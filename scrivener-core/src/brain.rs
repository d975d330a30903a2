//! LLM provider abstraction and structured completions.
//!
//! Defines the `LlmProvider` trait for model-agnostic completions and the
//! `Brain` wrapper the pipeline uses to request free text or typed JSON
//! objects. Structured answers are parsed with `serde`; a provider that wraps
//! its JSON in a markdown fence or surrounding prose is tolerated.

use crate::error::LlmError;
use crate::types::{CompletionRequest, CompletionResponse, Message, TokenUsage};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Trait for LLM providers.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Perform a full completion and return the response.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Return the model name.
    fn model_name(&self) -> &str;
}

/// Pull the JSON payload out of a model answer.
///
/// Accepts a bare object, a fenced ```json block, or an object embedded in
/// prose (first `{` or `[` through the matching last `}` or `]`).
pub fn extract_json(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    if let Some(rest) = trimmed.strip_prefix("```") {
        let rest = rest.strip_prefix("json").unwrap_or(rest);
        if let Some(end) = rest.rfind("```") {
            return Some(rest[..end].trim());
        }
    }

    let start = trimmed.find(['{', '['])?;
    let close = if trimmed[start..].starts_with('{') {
        '}'
    } else {
        ']'
    };
    let end = trimmed.rfind(close)?;
    (end > start).then(|| &trimmed[start..=end])
}

/// Parse a structured answer into `T`.
pub fn parse_structured<T: DeserializeOwned>(text: &str) -> Result<T, LlmError> {
    let payload = extract_json(text).ok_or_else(|| LlmError::ResponseParse {
        message: "No JSON object found in model output".to_string(),
    })?;
    serde_json::from_str(payload).map_err(|e| LlmError::ResponseParse {
        message: format!("Structured output did not match schema: {}", e),
    })
}

/// Wraps a provider and accumulates token usage across calls.
pub struct Brain {
    provider: Arc<dyn LlmProvider>,
    total_usage: Mutex<TokenUsage>,
}

impl Brain {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            provider,
            total_usage: Mutex::new(TokenUsage::default()),
        }
    }

    pub fn provider(&self) -> &Arc<dyn LlmProvider> {
        &self.provider
    }

    /// Total token usage recorded so far.
    pub fn total_usage(&self) -> TokenUsage {
        *self.total_usage.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let response = self.provider.complete(request).await?;
        self.total_usage
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .accumulate(&response.usage);
        Ok(response)
    }

    /// Free-text completion.
    pub async fn text(
        &self,
        system: impl Into<String>,
        user: impl Into<String>,
    ) -> Result<String, LlmError> {
        let response = self.complete(CompletionRequest::new(system, user)).await?;
        Ok(response.message.content)
    }

    /// Structured completion parsed into `T`.
    pub async fn structured<T: DeserializeOwned>(
        &self,
        system: impl Into<String>,
        user: impl Into<String>,
    ) -> Result<T, LlmError> {
        let request = CompletionRequest::new(system, user).json();
        let response = self.complete(request).await?;
        debug!(
            model = %response.model,
            chars = response.message.content.len(),
            "Parsing structured completion"
        );
        parse_structured(&response.message.content)
    }
}

type Responder = dyn Fn(&CompletionRequest) -> Result<String, LlmError> + Send + Sync;

/// A mock LLM provider for testing.
///
/// Answers from a queue of canned responses, or from a responder closure that
/// inspects the request. The closure form keeps concurrent tests
/// deterministic because the answer depends on the prompt, not call order.
pub struct MockLlmProvider {
    model: String,
    responses: Mutex<Vec<CompletionResponse>>,
    responder: Option<Box<Responder>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockLlmProvider {
    pub fn new() -> Self {
        Self {
            model: "mock-model".to_string(),
            responses: Mutex::new(Vec::new()),
            responder: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Create a MockLlmProvider that answers every request with `respond(request)`.
    pub fn with_responder<F>(respond: F) -> Self
    where
        F: Fn(&CompletionRequest) -> Result<String, LlmError> + Send + Sync + 'static,
    {
        Self {
            responder: Some(Box::new(respond)),
            ..Self::new()
        }
    }

    /// Queue a response to be returned by the next `complete` call.
    pub fn queue_response(&self, response: CompletionResponse) {
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(response);
    }

    /// Create a simple text response for testing.
    pub fn text_response(text: &str) -> CompletionResponse {
        CompletionResponse {
            message: Message::assistant(text),
            usage: TokenUsage {
                input_tokens: 100,
                output_tokens: 50,
            },
            model: "mock-model".to_string(),
            finish_reason: Some("stop".to_string()),
        }
    }

    /// Every request received so far, in arrival order.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl Default for MockLlmProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());

        if let Some(respond) = &self.responder {
            let text = respond(&request)?;
            return Ok(Self::text_response(&text));
        }

        let mut responses = self.responses.lock().unwrap_or_else(|e| e.into_inner());
        if responses.is_empty() {
            Ok(Self::text_response(
                "I'm a mock LLM. No queued responses available.",
            ))
        } else {
            Ok(responses.remove(0))
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
