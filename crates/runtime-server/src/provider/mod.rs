//! Provider registry and `provider:model` routing (spec §4.B).
//!
//! Every configured HTTP backend (lmdeploy, mnn, ollama) is a fully generic
//! OpenAI-compatible peer; `llama_cpp` is registered by name only; this
//! gateway never embeds or supervises an inference process (spec §1
//! Non-goals), so any request routed to it resolves to a typed
//! `provider_unavailable` error rather than "provider not found".

pub mod adapter;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::warn;

use runtime_core::config::RuntimeConfig;
use runtime_core::error::RuntimeError;

use adapter::OpenAiCompatBackend;

pub struct ProviderRegistry {
    default_provider: String,
    backends: HashMap<String, Arc<OpenAiCompatBackend>>,
    known_unconfigured: HashSet<String>,
}

impl ProviderRegistry {
    pub fn from_config(config: &RuntimeConfig) -> Self {
        let mut backends: HashMap<String, Arc<OpenAiCompatBackend>> = HashMap::new();
        if let Some(host) = &config.lmdeploy_host {
            backends.insert(
                "lmdeploy".to_string(),
                Arc::new(OpenAiCompatBackend::new("lmdeploy", host.clone(), config.request_timeout)),
            );
        }
        if let Some(host) = &config.mnn_host {
            backends.insert(
                "mnn".to_string(),
                Arc::new(OpenAiCompatBackend::new("mnn", host.clone(), config.request_timeout)),
            );
        }
        if let Some(host) = &config.ollama_host {
            backends.insert(
                "ollama".to_string(),
                Arc::new(OpenAiCompatBackend::new("ollama", host.clone(), config.request_timeout)),
            );
        }

        let mut known_unconfigured = HashSet::new();
        known_unconfigured.insert("llama_cpp".to_string());

        Self {
            default_provider: config.default_provider.clone(),
            backends,
            known_unconfigured,
        }
    }

    /// Splits a `provider:model` spec, falling back to the default provider
    /// when no known provider prefix is present.
    pub fn parse_model<'a>(&self, model_spec: &'a str) -> (String, &'a str) {
        if let Some((provider, model)) = model_spec.split_once(':') {
            if self.backends.contains_key(provider) || self.known_unconfigured.contains(provider) {
                return (provider.to_string(), model);
            }
        }
        (self.default_provider.clone(), model_spec)
    }

    pub fn backend(&self, provider: &str) -> Result<Arc<OpenAiCompatBackend>, RuntimeError> {
        if let Some(backend) = self.backends.get(provider) {
            return Ok(backend.clone());
        }
        if self.known_unconfigured.contains(provider) {
            return Err(RuntimeError::ProviderUnavailable {
                provider: provider.to_string(),
                reason: format!("{provider}: no HTTP endpoint configured for this engine"),
            });
        }
        Err(RuntimeError::ProviderNotFound(provider.to_string()))
    }

    pub fn default_provider(&self) -> &str {
        &self.default_provider
    }

    /// Aggregates every configured backend's own model catalog. Bare ids are
    /// listed for the default provider; every provider's ids are additionally
    /// listed under a `provider:model` alias so clients can force routing.
    pub async fn list_models(&self) -> Vec<String> {
        let mut models = Vec::new();
        for (name, backend) in &self.backends {
            match backend.list_models().await {
                Ok(ids) => {
                    for id in ids {
                        if name == &self.default_provider {
                            models.push(id.clone());
                        }
                        models.push(format!("{name}:{id}"));
                    }
                }
                Err(e) => warn!(provider = %name, error = %e, "failed to list models"),
            }
        }
        models.sort();
        models.dedup();
        models
    }
}
