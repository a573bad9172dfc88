//! Provider construction from configuration.
//!
//! Every agent in a run talks to the same OpenAI-compatible endpoint; the
//! config decides the base URL, key, timeout and whether responses are cached.

use std::sync::Arc;
use std::time::Duration;
use llmagent_config::AppConfig;
use llmagent_core::provider::Provider;
use tracing::{debug, warn};
use crate::cache::CachedProvider;
use crate::openai_compat::OpenAiCompatProvider;

/// Build the shared provider for a run.
pub fn build_from_config(config: &AppConfig) -> Arc<dyn Provider> {
    let api_key = config.api_key.clone().unwrap_or_default();
    if api_key.is_empty() {
        warn!("No API key configured; requests will likely be rejected");
    }

    let name = provider_name(&config.api_url);
    let provider: Arc<dyn Provider> = Arc::new(OpenAiCompatProvider::with_timeout(
        name,
        &config.api_url,
        api_key,
        Duration::from_secs(config.llm.timeout_secs),
    ));

    if config.llm.cache {
        debug!(provider = %name, "Response cache enabled");
        Arc::new(CachedProvider::new(provider))
    } else {
        provider
    }
}

/// A short provider name derived from well-known base URLs.
fn provider_name(base_url: &str) -> &'static str {
    if base_url.contains("api.openai.com") {
        "openai"
    } else if base_url.contains("openrouter.ai") {
        "openrouter"
    } else if base_url.contains("localhost:11434") {
        "ollama"
    } else if base_url.contains("azure.com") {
        "azure"
    } else {
        "openai-compatible"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_builds_cached_openai() {
        let config = AppConfig::default();
        let provider = build_from_config(&config);
        assert_eq!(provider.name(), "cached-openai");
    }

    #[test]
    fn cache_can_be_disabled() {
        let mut config = AppConfig::default();
        config.llm.cache = false;
        let provider = build_from_config(&config);
        assert_eq!(provider.name(), "openai");
    }

    #[test]
    fn provider_names() {
        assert_eq!(provider_name("https://api.openai.com/v1"), "openai");
        assert_eq!(provider_name("http://localhost:11434/v1"), "ollama");
        assert_eq!(provider_name("http://localhost:8000/v1"), "openai-compatible");
    }
}
