//! # Scrivener Tools
//!
//! HTTP search providers for the Scrivener pipeline. Web: Tavily, Exa,
//! Linkup, DuckDuckGo. Answer engine: Perplexity. Academic: arXiv, PubMed.
//! Each implements [`scrivener_core::search::SearchProvider`].

pub mod arxiv;
pub mod duckduckgo;
pub mod exa;
pub mod linkup;
pub mod perplexity;
pub mod pubmed;
pub mod tavily;

mod http;
mod params;
mod xml;

pub use arxiv::ArxivProvider;
pub use duckduckgo::DuckDuckGoProvider;
pub use exa::ExaProvider;
pub use linkup::LinkupProvider;
pub use perplexity::PerplexityProvider;
pub use pubmed::PubMedProvider;
pub use tavily::TavilyProvider;

use scrivener_core::config::SearchConfig;
use scrivener_core::error::SearchError;
use scrivener_core::search::{ProviderRegistry, SearchProvider};
use std::sync::Arc;
use tracing::debug;

/// Names of every provider this crate ships.
pub const BUILTIN_PROVIDERS: &[&str] = &[
    "tavily",
    "exa",
    "perplexity",
    "arxiv",
    "pubmed",
    "linkup",
    "duckduckgo",
];

/// Construct a built-in provider by name, reading its API key from the environment.
pub fn builtin_provider(name: &str) -> Result<Arc<dyn SearchProvider>, SearchError> {
    let provider: Arc<dyn SearchProvider> = match name {
        "tavily" => Arc::new(TavilyProvider::from_env()?),
        "exa" => Arc::new(ExaProvider::from_env()?),
        "perplexity" => Arc::new(PerplexityProvider::from_env()?),
        "arxiv" => Arc::new(ArxivProvider::new()?),
        "pubmed" => Arc::new(PubMedProvider::new()?),
        "linkup" => Arc::new(LinkupProvider::from_env()?),
        "duckduckgo" => Arc::new(DuckDuckGoProvider::new()?),
        other => {
            return Err(SearchError::UnsupportedProvider {
                provider: other.to_string(),
            });
        }
    };
    Ok(provider)
}

/// Register every built-in provider that can be constructed.
///
/// Providers without an API key are skipped, except the one named in
/// `config.provider`: a missing key for the configured provider is an error,
/// as is a name that no built-in provider answers to.
pub fn build_registry(config: &SearchConfig) -> Result<ProviderRegistry, SearchError> {
    let mut registry = ProviderRegistry::new();
    for name in BUILTIN_PROVIDERS {
        match builtin_provider(name) {
            Ok(provider) => registry.register(provider)?,
            Err(SearchError::MissingApiKey { env, .. }) if *name != config.provider => {
                debug!(provider = %name, env = %env, "Skipping search provider without API key");
            }
            Err(e) => return Err(e),
        }
    }

    if !registry.contains(&config.provider) {
        return Err(SearchError::UnsupportedProvider {
            provider: config.provider.clone(),
        });
    }
    Ok(registry)
}

/// Score for the result at `rank` (0-based) when a provider gives none:
/// evenly spaced from 1.0 down, never reaching 0.
pub(crate) fn rank_score(rank: usize, total: usize) -> f64 {
    1.0 - rank as f64 / (total + 1) as f64
}
