use std::collections::HashMap;
use std::sync::Arc;

use crate::config::LlmConfig;
use crate::errors::{RelayError, RelayResult};
use crate::llm::provider::LlmProvider;
use crate::llm::providers::openai_compatible::OpenAiCompatibleProvider;
use crate::llm::types::CallConfig;

/// Registry of all available LLM providers, keyed by their config.toml identifier.
/// Built once at startup; every request borrows the same provider handles.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
    active: String,
    llm_config: LlmConfig,
}

impl ProviderRegistry {
    pub fn new(llm_config: LlmConfig) -> Self {
        Self {
            providers: HashMap::new(),
            active: llm_config.active_provider.clone(),
            llm_config,
        }
    }

    pub fn register(&mut self, provider: Arc<dyn LlmProvider>) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    pub fn get_active(&self) -> RelayResult<Arc<dyn LlmProvider>> {
        self.providers.get(&self.active).cloned().ok_or_else(|| {
            RelayError::Config(format!(
                "Active provider '{}' not found in registry",
                self.active
            ))
        })
    }

    /// Active provider plus the call settings from its config entry.
    pub fn active_call(
        &self,
        json_response: bool,
    ) -> RelayResult<(Arc<dyn LlmProvider>, CallConfig)> {
        let provider = self.get_active()?;
        let (model, temperature) = self
            .llm_config
            .providers
            .get(&self.active)
            .map(|p| (p.model.clone(), p.temperature))
            .unwrap_or_else(|| (String::new(), 0.1));
        tracing::debug!(
            provider = %self.active,
            model = %model,
            json_response,
            "resolved call config"
        );
        Ok((
            provider,
            CallConfig {
                model,
                temperature,
                json_response,
            },
        ))
    }

    /// Build a registry from the loaded config.
    /// API keys: `DAWASSIST_<ID>_API_KEY`, then the config entry, then `OPENAI_API_KEY`.
    pub fn from_config(config: &LlmConfig) -> Self {
        let mut registry = Self::new(config.clone());
        for (id, entry) in &config.providers {
            let api_key = std::env::var(format!("DAWASSIST_{}_API_KEY", id.to_uppercase()))
                .ok()
                .or_else(|| entry.api_key.clone())
                .or_else(|| std::env::var("OPENAI_API_KEY").ok())
                .unwrap_or_default();
            if api_key.is_empty() {
                tracing::warn!(provider = %id, name = %entry.display_name, "no API key configured");
            }
            tracing::info!(
                provider = %id,
                name = %entry.display_name,
                model = %entry.model,
                "provider registered"
            );
            let provider =
                OpenAiCompatibleProvider::new(id.clone(), entry.api_base.clone(), api_key);
            registry.register(Arc::new(provider));
        }
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_registers_openai() {
        let registry = ProviderRegistry::from_config(&LlmConfig::default());
        let (provider, cfg) = registry.active_call(true).unwrap();
        assert_eq!(provider.name(), "openai");
        assert_eq!(cfg.model, "gpt-4o");
        assert!(cfg.json_response);
    }

    #[test]
    fn missing_active_provider_is_a_config_error() {
        let registry = ProviderRegistry::new(LlmConfig::default());
        assert!(matches!(registry.get_active(), Err(RelayError::Config(_))));
    }
}
