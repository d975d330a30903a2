//! HTTP plumbing shared by the search providers.

use scrivener_core::error::SearchError;
use serde::de::DeserializeOwned;
use std::time::Duration;

pub(crate) const USER_AGENT: &str = concat!("Scrivener/", env!("CARGO_PKG_VERSION"));

/// Build a client with the provider-wide timeouts and user agent.
pub(crate) fn build_client(provider: &str, timeout: Duration) -> Result<reqwest::Client, SearchError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| SearchError::Request {
            provider: provider.to_string(),
            message: format!("Failed to create HTTP client: {}", e),
        })
}

/// Read an API key from `env`. Blank values count as missing.
pub(crate) fn api_key_from_env(provider: &str, env: &str) -> Result<String, SearchError> {
    std::env::var(env)
        .ok()
        .filter(|key| !key.trim().is_empty())
        .ok_or_else(|| SearchError::MissingApiKey {
            provider: provider.to_string(),
            env: env.to_string(),
        })
}

/// Send `request` and decode a JSON body of type `T`.
///
/// Transport failures and non-2xx statuses become `Request` errors (the
/// status code leads the message); undecodable bodies become `ResponseParse`.
pub(crate) async fn send_json<T: DeserializeOwned>(
    provider: &str,
    request: reqwest::RequestBuilder,
) -> Result<T, SearchError> {
    let response = checked(provider, request).await?;
    response.json().await.map_err(|e| SearchError::ResponseParse {
        provider: provider.to_string(),
        message: format!("Failed to parse search response: {}", e),
    })
}

/// Send `request` and return the body as text, for providers that answer in XML.
pub(crate) async fn send_text(
    provider: &str,
    request: reqwest::RequestBuilder,
) -> Result<String, SearchError> {
    let response = checked(provider, request).await?;
    response.text().await.map_err(|e| SearchError::ResponseParse {
        provider: provider.to_string(),
        message: format!("Failed to read search response: {}", e),
    })
}

async fn checked(
    provider: &str,
    request: reqwest::RequestBuilder,
) -> Result<reqwest::Response, SearchError> {
    let response = request.send().await.map_err(|e| SearchError::Request {
        provider: provider.to_string(),
        message: format!("Search request failed: {}", e),
    })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(SearchError::Request {
            provider: provider.to_string(),
            message: format!("HTTP {}: {}", status.as_u16(), snippet(&body)),
        });
    }
    Ok(response)
}

/// True for errors caused by the provider's rate limit.
pub(crate) fn is_rate_limited(error: &SearchError) -> bool {
    matches!(error, SearchError::Request { message, .. } if message.starts_with("HTTP 429"))
}

fn snippet(body: &str) -> &str {
    match body.char_indices().nth(200) {
        Some((cut, _)) => &body[..cut],
        None => body,
    }
}
