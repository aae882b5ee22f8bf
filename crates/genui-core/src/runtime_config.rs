use crate::config_manager::{validate_provider_url, ConfigError, GenUiConfig, ModelsConfig};
use serde::{Deserialize, Serialize};

/// The part of the configuration that can change while the service runs.
///
/// Held behind an atomic pointer by the service; a run captures one snapshot when
/// it starts and keeps it until it finishes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeConfig {
    pub models: ModelsConfig,
    pub provider_url: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::from(&GenUiConfig::default())
    }
}

impl From<&GenUiConfig> for RuntimeConfig {
    fn from(config: &GenUiConfig) -> Self {
        Self {
            models: config.models.clone(),
            provider_url: config.provider.url.clone(),
        }
    }
}

/// Partial update for [`RuntimeConfig`]; absent fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeConfigPatch {
    #[serde(default)]
    pub models: Option<ModelsPatch>,
    #[serde(default)]
    pub provider_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelsPatch {
    #[serde(default)]
    pub requirement_analysis: Option<String>,
    #[serde(default, alias = "webDSL")]
    pub ui_spec_synthesis: Option<String>,
    #[serde(default)]
    pub coding: Option<String>,
    #[serde(default)]
    pub evaluation: Option<String>,
    #[serde(default)]
    pub validation: Option<String>,
}

impl RuntimeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (stage, model) in self.models.entries() {
            if model.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "Model for stage '{}' must not be empty",
                    stage
                )));
            }
        }
        validate_provider_url(&self.provider_url)
    }

    /// Merge `patch` into a copy of `self` and validate the result.
    ///
    /// Either the whole merged value is returned or an error is; `self` is never
    /// left half-updated.
    pub fn merged(&self, patch: &RuntimeConfigPatch) -> Result<RuntimeConfig, ConfigError> {
        let mut next = self.clone();

        if let Some(models) = &patch.models {
            let slots = [
                (&models.requirement_analysis, &mut next.models.requirement_analysis),
                (&models.ui_spec_synthesis, &mut next.models.ui_spec_synthesis),
                (&models.coding, &mut next.models.coding),
                (&models.evaluation, &mut next.models.evaluation),
                (&models.validation, &mut next.models.validation),
            ];
            for (value, slot) in slots {
                if let Some(value) = value {
                    *slot = value.trim().to_string();
                }
            }
        }

        if let Some(url) = &patch.provider_url {
            next.provider_url = url.trim().trim_end_matches('/').to_string();
        }

        next.validate()?;
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_updates_only_given_fields() {
        let current = RuntimeConfig::default();
        let patch = RuntimeConfigPatch {
            models: Some(ModelsPatch {
                coding: Some(" local/coder ".to_string()),
                ..Default::default()
            }),
            provider_url: Some("http://localhost:1234/v1/".to_string()),
        };

        let next = current.merged(&patch).unwrap();
        assert_eq!(next.models.coding, "local/coder");
        assert_eq!(next.models.evaluation, current.models.evaluation);
        assert_eq!(next.provider_url, "http://localhost:1234/v1");
    }

    #[test]
    fn test_invalid_patch_is_rejected_whole() {
        let current = RuntimeConfig::default();
        let patch = RuntimeConfigPatch {
            models: Some(ModelsPatch {
                coding: Some("local/coder".to_string()),
                validation: Some("".to_string()),
                ..Default::default()
            }),
            provider_url: None,
        };

        assert!(current.merged(&patch).is_err());
        assert_eq!(current, RuntimeConfig::default());
    }

    #[test]
    fn test_patch_accepts_legacy_web_dsl_key() {
        let patch: RuntimeConfigPatch =
            serde_json::from_str(r#"{"models":{"webDSL":"dsl/model"}}"#).unwrap();
        let next = RuntimeConfig::default().merged(&patch).unwrap();
        assert_eq!(next.models.ui_spec_synthesis, "dsl/model");
    }

    #[test]
    fn test_runtime_config_json_shape() {
        let json = serde_json::to_value(RuntimeConfig::default()).unwrap();
        assert_eq!(json["providerUrl"], "https://openrouter.ai/api/v1");
        assert!(json["models"].get("requirementAnalysis").is_some());
        assert!(json["models"].get("uiSpecSynthesis").is_some());
    }
}
