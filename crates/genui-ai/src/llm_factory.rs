use crate::llm_provider::*;
use crate::openai_compatible_provider::{OpenAICompatibleConfig, OpenAICompatibleProvider};
use anyhow::{anyhow, Result};
use genui_core::{GatewayConfig, ProviderConfig, RuntimeConfig, DEFAULT_PROVIDER_URL};
use std::sync::Arc;

/// Factory for creating LLM providers based on configuration
pub struct LLMProviderFactory;

impl LLMProviderFactory {
    /// Create a provider for the endpoint named in `runtime`.
    ///
    /// The runtime snapshot wins over the static provider URL so that
    /// configuration updates reach new runs without a restart.
    pub fn create_from_config(
        provider: &ProviderConfig,
        runtime: &RuntimeConfig,
        gateway: &GatewayConfig,
    ) -> Result<Arc<dyn LLMProvider>> {
        let config = Self::resolve_config(provider, runtime, gateway)?;

        tracing::debug!(
            provider = %config.provider_name,
            base_url = %config.base_url,
            "Creating LLM provider"
        );

        Ok(Arc::new(OpenAICompatibleProvider::new(config)?))
    }

    /// Client settings for `provider`.
    ///
    /// Local presets (LM Studio, Ollama) keep their own endpoint while the
    /// runtime URL is still the stock OpenRouter one.
    pub fn resolve_config(
        provider: &ProviderConfig,
        runtime: &RuntimeConfig,
        gateway: &GatewayConfig,
    ) -> Result<OpenAICompatibleConfig> {
        let provider_name = provider.name.to_lowercase();

        let mut config = match provider_name.as_str() {
            "openrouter" | "openai" | "openai-compatible" => OpenAICompatibleConfig::default(),
            "lmstudio" => OpenAICompatibleConfig::lm_studio(),
            "ollama" => OpenAICompatibleConfig::ollama(),
            _ => {
                return Err(anyhow!(
                    "Unsupported LLM provider: {}. Available providers: {}",
                    provider_name,
                    Self::supported_providers().join(", ")
                ))
            }
        };

        let runtime_url = runtime.provider_url.trim().trim_end_matches('/');
        if runtime_url.is_empty() {
            return Err(anyhow!("Provider URL must not be empty"));
        }
        if runtime_url != DEFAULT_PROVIDER_URL {
            config.base_url = runtime_url.to_string();
        }

        config.api_key = provider.api_key.clone();
        config.provider_name = provider_name;
        config.timeout_secs = gateway.call_timeout_secs.max(1);
        Ok(config)
    }

    /// Check if the provider endpoint answers
    pub async fn check_availability(provider: &Arc<dyn LLMProvider>) -> bool {
        provider.is_available().await
    }

    pub fn supported_providers() -> Vec<&'static str> {
        vec!["openrouter", "openai", "openai-compatible", "lmstudio", "ollama"]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_creates_provider_for_known_names() {
        let runtime = RuntimeConfig::default();
        for name in LLMProviderFactory::supported_providers() {
            let provider = ProviderConfig {
                name: name.to_string(),
                ..Default::default()
            };
            let created =
                LLMProviderFactory::create_from_config(&provider, &runtime, &GatewayConfig::default())
                    .unwrap();
            assert_eq!(created.provider_name(), name);
        }
    }

    #[test]
    fn test_local_presets_apply_until_url_is_changed() {
        let ollama = ProviderConfig {
            name: "ollama".to_string(),
            ..Default::default()
        };
        let gateway = GatewayConfig::default();

        let config =
            LLMProviderFactory::resolve_config(&ollama, &RuntimeConfig::default(), &gateway)
                .unwrap();
        assert_eq!(config.base_url, "http://localhost:11434/v1");
        assert_eq!(config.provider_name, "ollama");

        let custom = RuntimeConfig {
            provider_url: "http://gpu-box:11434/v1/".to_string(),
            ..Default::default()
        };
        let config = LLMProviderFactory::resolve_config(&ollama, &custom, &gateway).unwrap();
        assert_eq!(config.base_url, "http://gpu-box:11434/v1");

        let openrouter = ProviderConfig::default();
        let config =
            LLMProviderFactory::resolve_config(&openrouter, &RuntimeConfig::default(), &gateway)
                .unwrap();
        assert_eq!(config.base_url, DEFAULT_PROVIDER_URL);
        assert_eq!(config.timeout_secs, gateway.call_timeout_secs.max(1));
    }

    #[test]
    fn test_rejects_unknown_provider() {
        let provider = ProviderConfig {
            name: "carrier-pigeon".to_string(),
            ..Default::default()
        };
        let err = LLMProviderFactory::create_from_config(
            &provider,
            &RuntimeConfig::default(),
            &GatewayConfig::default(),
        )
        .err()
        .unwrap();
        assert!(err.to_string().contains("Unsupported LLM provider"));
    }
}
