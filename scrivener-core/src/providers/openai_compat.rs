//! Chat-completions provider for OpenAI and compatible servers.
//!
//! Works against any endpoint speaking the `/chat/completions` wire format:
//! OpenAI, Azure OpenAI, Ollama, vLLM, LM Studio. Structured requests ask the
//! server for a JSON object via `response_format`.

use super::{RetryConfig, with_retry};
use crate::brain::LlmProvider;
use crate::config::LlmConfig;
use crate::error::LlmError;
use crate::types::{CompletionRequest, CompletionResponse, Message, ResponseFormat, TokenUsage};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
/// Retry-after used when a 429 body does not say how long to wait.
const DEFAULT_RETRY_AFTER_SECS: u64 = 5;

pub struct OpenAiCompatibleProvider {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: usize,
    temperature: f32,
    timeout_secs: u64,
    retry: RetryConfig,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    temperature: f32,
    max_tokens: usize,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<JsonObjectFormat>,
}

#[derive(Debug, Serialize)]
struct JsonObjectFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: usize,
    #[serde(default)]
    completion_tokens: usize,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: String,
}

impl OpenAiCompatibleProvider {
    /// Build a provider from config, resolving the key from `api_key` or `api_key_env`.
    ///
    /// Local servers (`localhost`, `127.0.0.1`) get a placeholder key when none is set.
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = resolve_api_key(config)?;
        Self::new_with_key(config, api_key)
    }

    pub fn new_with_key(config: &LlmConfig, api_key: String) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::Connection {
                message: format!("Failed to build HTTP client: {}", e),
            })?;
        let base_url = config.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            timeout_secs: config.timeout_secs,
            retry: config.retry.clone(),
        })
    }

    fn chat_request<'a>(&'a self, request: &'a CompletionRequest) -> ChatRequest<'a> {
        ChatRequest {
            model: request.model.as_deref().unwrap_or(&self.model),
            messages: &request.messages,
            temperature: request.temperature.unwrap_or(self.temperature),
            max_tokens: request.max_tokens.unwrap_or(self.max_tokens),
            stream: false,
            response_format: (request.response_format == ResponseFormat::Json)
                .then_some(JsonObjectFormat {
                    kind: "json_object",
                }),
        }
    }

    fn into_completion(response: ChatResponse, fallback_model: &str) -> Result<CompletionResponse, LlmError> {
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::ResponseParse {
                message: "Completion has no choices".to_string(),
            })?;
        let usage = response.usage.unwrap_or_default();

        Ok(CompletionResponse {
            message: Message::assistant(choice.message.content.unwrap_or_default()),
            usage: TokenUsage {
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
            },
            model: response
                .model
                .unwrap_or_else(|| fallback_model.to_string()),
            finish_reason: choice.finish_reason,
        })
    }

    /// Classify a non-2xx answer. 5xx maps to `Connection` so it is retried.
    fn status_error(status: StatusCode, body: &str) -> LlmError {
        match status {
            StatusCode::UNAUTHORIZED => LlmError::AuthFailed {
                provider: "OpenAI-compatible".to_string(),
            },
            StatusCode::TOO_MANY_REQUESTS => LlmError::RateLimited {
                retry_after_secs: retry_after_from_body(body).unwrap_or(DEFAULT_RETRY_AFTER_SECS),
            },
            s if s.is_server_error() => LlmError::Connection {
                message: format!("Server error ({}): {}", s.as_u16(), body),
            },
            s => LlmError::ApiRequest {
                message: format!("HTTP {}: {}", s.as_u16(), body),
            },
        }
    }

    async fn send_once(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
        let chat = self.chat_request(request);
        debug!(url = %url, model = %chat.model, json = chat.response_format.is_some(), "Sending completion request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&chat)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout {
                        timeout_secs: self.timeout_secs,
                    }
                } else {
                    LlmError::Connection {
                        message: format!("Request failed: {}", e),
                    }
                }
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| LlmError::ApiRequest {
            message: format!("Failed to read response body: {}", e),
        })?;
        if !status.is_success() {
            return Err(Self::status_error(status, &text));
        }

        let parsed: ChatResponse = serde_json::from_str(&text).map_err(|e| LlmError::ResponseParse {
            message: format!("Invalid completion body: {}", e),
        })?;
        Self::into_completion(parsed, &self.model)
    }
}

fn resolve_api_key(config: &LlmConfig) -> Result<String, LlmError> {
    if let Some(key) = config.api_key.clone().or_else(|| std::env::var(&config.api_key_env).ok()) {
        return Ok(key);
    }
    let local = config
        .base_url
        .as_deref()
        .is_some_and(|url| url.contains("localhost") || url.contains("127.0.0.1"));
    if local {
        debug!("No API key for local endpoint; sending a placeholder");
        return Ok("local".to_string());
    }
    Err(LlmError::AuthFailed {
        provider: format!("{}: env var '{}' not set", config.provider, config.api_key_env),
    })
}

/// Read the wait hint out of messages like "Rate limit reached ... try again in 20s".
fn retry_after_from_body(body: &str) -> Option<u64> {
    let error: ErrorBody = serde_json::from_str(body).ok()?;
    let tail = error.error.message.rsplit("in ").next()?;
    tail.trim().trim_end_matches('.').trim_end_matches('s').parse().ok()
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        with_retry(&self.retry, || self.send_once(&request)).await
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn test_config() -> LlmConfig {
        LlmConfig {
            provider: "openai".to_string(),
            model: "gpt-4".to_string(),
            api_key_env: "SCRIVENER_TEST_OPENAI_KEY".to_string(),
            ..LlmConfig::default()
        }
    }

    fn provider() -> OpenAiCompatibleProvider {
        OpenAiCompatibleProvider::new_with_key(&test_config(), "sk-test".into()).unwrap()
    }

    #[test]
    fn test_chat_request_serialization() {
        let provider = provider();
        let request = CompletionRequest::new("You are a planner", "Topic: 골밀도");
        let body = serde_json::to_value(provider.chat_request(&request)).unwrap();
        assert_eq!(body["model"], "gpt-4");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "Topic: 골밀도");
        assert_eq!(body["max_tokens"], 4096);
        assert_eq!(body["temperature"], 0.0);
        assert!(body.get("response_format").is_none());

        let body = serde_json::to_value(provider.chat_request(&request.json())).unwrap();
        assert_eq!(body["response_format"], json!({"type": "json_object"}));
    }

    #[test]
    fn test_parse_completion() {
        let raw = json!({
            "id": "chatcmpl-123",
            "model": "gpt-4-0613",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "{\"grade\":\"pass\"}"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 8, "total_tokens": 18}
        });
        let parsed: ChatResponse = serde_json::from_value(raw).unwrap();
        let resp = OpenAiCompatibleProvider::into_completion(parsed, "gpt-4").unwrap();
        assert_eq!(resp.text(), "{\"grade\":\"pass\"}");
        assert_eq!(resp.usage.total(), 18);
        assert_eq!(resp.model, "gpt-4-0613");
        assert_eq!(resp.finish_reason.as_deref(), Some("stop"));
    }

    #[test]
    fn test_parse_completion_without_choices() {
        let parsed: ChatResponse = serde_json::from_value(json!({"choices": []})).unwrap();
        assert!(matches!(
            OpenAiCompatibleProvider::into_completion(parsed, "gpt-4"),
            Err(LlmError::ResponseParse { .. })
        ));
    }

    #[test]
    fn test_null_content_reads_as_empty() {
        let parsed: ChatResponse = serde_json::from_value(json!({
            "choices": [{"message": {"content": Value::Null}}]
        }))
        .unwrap();
        let resp = OpenAiCompatibleProvider::into_completion(parsed, "gpt-4").unwrap();
        assert_eq!(resp.text(), "");
        assert_eq!(resp.model, "gpt-4");
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            OpenAiCompatibleProvider::status_error(StatusCode::UNAUTHORIZED, "no"),
            LlmError::AuthFailed { .. }
        ));
        match OpenAiCompatibleProvider::status_error(
            StatusCode::TOO_MANY_REQUESTS,
            r#"{"error":{"message":"Rate limit reached, try again in 20s"}}"#,
        ) {
            LlmError::RateLimited { retry_after_secs } => assert_eq!(retry_after_secs, 20),
            other => panic!("Expected RateLimited, got {:?}", other),
        }
        match OpenAiCompatibleProvider::status_error(StatusCode::BAD_GATEWAY, "upstream") {
            LlmError::Connection { message } => assert!(message.contains("502")),
            other => panic!("Expected Connection, got {:?}", other),
        }
        assert!(matches!(
            OpenAiCompatibleProvider::status_error(StatusCode::BAD_REQUEST, "bad"),
            LlmError::ApiRequest { .. }
        ));
    }

    #[test]
    fn test_retry_after_falls_back_when_unparsable() {
        assert_eq!(retry_after_from_body("not json"), None);
        match OpenAiCompatibleProvider::status_error(StatusCode::TOO_MANY_REQUESTS, "slow down") {
            LlmError::RateLimited { retry_after_secs } => {
                assert_eq!(retry_after_secs, DEFAULT_RETRY_AFTER_SECS)
            }
            other => panic!("Expected RateLimited, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_key_is_auth_error() {
        let mut config = test_config();
        config.api_key_env = "SCRIVENER_TEST_OPENAI_KEY_NEVER_SET".to_string();
        assert!(matches!(
            OpenAiCompatibleProvider::new(&config),
            Err(LlmError::AuthFailed { .. })
        ));
    }

    #[test]
    fn test_local_endpoint_needs_no_key() {
        let mut config = test_config();
        config.api_key_env = "SCRIVENER_TEST_LOCAL_KEY_UNSET".to_string();
        config.base_url = Some("http://localhost:11434/v1/".to_string());
        let provider = OpenAiCompatibleProvider::new(&config).unwrap();
        assert_eq!(provider.base_url, "http://localhost:11434/v1");
        assert_eq!(provider.api_key, "local");
    }
}
