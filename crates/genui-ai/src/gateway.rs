// ABOUTME: Single entry point for all model calls made by the pipeline
// ABOUTME: Adds per-call timeouts, bounded retries and lenient JSON recovery on top of a provider

use crate::error::{GatewayError, GatewayResult};
use crate::llm_provider::{GenerationConfig, LLMProvider, Message};
use crate::output_shape::OutputShape;
use futures::future::try_join_all;
use genui_core::GatewayConfig;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Retry and timeout policy applied to every gateway operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayPolicy {
    /// Attempts per operation, the first one included
    pub max_attempts: u32,
    /// Upper bound for one attempt
    pub call_timeout: Duration,
    /// Delay before the second attempt; doubles after every further failure
    pub retry_backoff: Duration,
}

impl Default for GatewayPolicy {
    fn default() -> Self {
        Self::from(&GatewayConfig::default())
    }
}

impl From<&GatewayConfig> for GatewayPolicy {
    fn from(config: &GatewayConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            call_timeout: Duration::from_secs(config.call_timeout_secs.max(1)),
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }
}

impl GatewayPolicy {
    fn backoff_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        self.retry_backoff * (1u32 << (attempt - 2).min(6))
    }
}

/// Sampling parameters for one gateway operation.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CallOptions {
    pub temperature: Option<f32>,
    pub max_completion_tokens: Option<usize>,
}

impl CallOptions {
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn max_completion_tokens(mut self, max: usize) -> Self {
        self.max_completion_tokens = Some(max);
        self
    }

    fn generation_config(&self, shape: Option<&OutputShape>) -> GenerationConfig {
        GenerationConfig {
            temperature: self.temperature,
            max_completion_tokens: self.max_completion_tokens,
            response_format: shape.map(OutputShape::response_format),
            ..Default::default()
        }
    }
}

/// Model gateway: structured (JSON) and free-text completions with retries.
///
/// Every operation either returns a value that passed all of its checks or a
/// [`GatewayError::RetriesExhausted`] carrying the last attempt's failure.
#[derive(Clone)]
pub struct ModelGateway {
    provider: Arc<dyn LLMProvider>,
    policy: GatewayPolicy,
}

impl ModelGateway {
    pub fn new(provider: Arc<dyn LLMProvider>, policy: GatewayPolicy) -> Self {
        Self { provider, policy }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.provider_name()
    }

    pub fn policy(&self) -> &GatewayPolicy {
        &self.policy
    }

    /// Structured completion decoded into `T`.
    pub async fn complete_structured<T>(
        &self,
        model: &str,
        messages: &[Message],
        shape: &OutputShape,
        options: CallOptions,
    ) -> GatewayResult<T>
    where
        T: DeserializeOwned + Send,
    {
        self.complete_structured_checked(model, messages, shape, options, |_: &T| Ok(()))
            .await
    }

    /// Structured completion with an extra semantic check.
    ///
    /// A value rejected by `check` counts as a failed attempt and is retried
    /// like malformed JSON.
    pub async fn complete_structured_checked<T, F>(
        &self,
        model: &str,
        messages: &[Message],
        shape: &OutputShape,
        options: CallOptions,
        check: F,
    ) -> GatewayResult<T>
    where
        T: DeserializeOwned + Send,
        F: Fn(&T) -> Result<(), String> + Send + Sync,
    {
        let config = options.generation_config(Some(shape));
        let config = &config;
        let check = &check;

        self.with_retries("structured completion", model, move |_| {
            self.structured_attempt(model, messages, config, check)
        })
        .await
    }

    /// Raw JSON object without any shape requirement.
    pub async fn complete_json(
        &self,
        model: &str,
        messages: &[Message],
        options: CallOptions,
    ) -> GatewayResult<Value> {
        self.complete_structured(model, messages, &OutputShape::any_object("json"), options)
            .await
    }

    /// Single free-text completion, trimmed.
    pub async fn complete_text(
        &self,
        model: &str,
        messages: &[Message],
        options: CallOptions,
    ) -> GatewayResult<String> {
        let mut samples = self
            .complete_text_samples(model, messages, 1, options)
            .await?;
        Ok(samples.pop().unwrap_or_default())
    }

    /// `n` independent free-text completions issued concurrently.
    ///
    /// Results keep request order. A failure of any sample fails the attempt
    /// and the whole batch is retried.
    pub async fn complete_text_samples(
        &self,
        model: &str,
        messages: &[Message],
        n: usize,
        options: CallOptions,
    ) -> GatewayResult<Vec<String>> {
        if n == 0 {
            return Err(GatewayError::InvalidRequest(
                "at least one sample must be requested".to_string(),
            ));
        }

        let config = options.generation_config(None);
        let config = &config;

        self.with_retries("text completion", model, move |_| {
            self.text_attempt(model, messages, config, n)
        })
        .await
    }

    async fn structured_attempt<T, F>(
        &self,
        model: &str,
        messages: &[Message],
        config: &GenerationConfig,
        check: &F,
    ) -> GatewayResult<T>
    where
        T: DeserializeOwned,
        F: Fn(&T) -> Result<(), String>,
    {
        let response = self
            .provider
            .generate_chat(model, messages, config)
            .await
            .map_err(|e| GatewayError::Transport(format!("{:#}", e)))?;

        let value = parse_json_lenient(&response.content)?;
        let parsed: T = serde_json::from_value(value)
            .map_err(|e| GatewayError::InvalidStructuredOutput(e.to_string()))?;
        check(&parsed).map_err(GatewayError::InvalidStructuredOutput)?;
        Ok(parsed)
    }

    async fn text_attempt(
        &self,
        model: &str,
        messages: &[Message],
        config: &GenerationConfig,
        n: usize,
    ) -> GatewayResult<Vec<String>> {
        let calls = (0..n).map(|_| self.provider.generate_chat(model, messages, config));
        let responses = try_join_all(calls)
            .await
            .map_err(|e| GatewayError::Transport(format!("{:#}", e)))?;

        Ok(responses
            .into_iter()
            .map(|response| response.content.trim().to_string())
            .collect())
    }

    async fn with_retries<T, F, Fut>(
        &self,
        operation: &'static str,
        model: &str,
        mut attempt_fn: F,
    ) -> GatewayResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = GatewayResult<T>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            let delay = self.policy.backoff_before(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let started = Instant::now();
            let outcome = tokio::time::timeout(self.policy.call_timeout, attempt_fn(attempt)).await;

            let error = match outcome {
                Ok(Ok(value)) => {
                    debug!(
                        model,
                        attempt,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "{} succeeded",
                        operation
                    );
                    return Ok(value);
                }
                Ok(Err(e)) => e,
                Err(_) => GatewayError::Timeout(self.policy.call_timeout),
            };

            if attempt < max_attempts {
                warn!(
                    "{} with {} failed (attempt {}/{}), retrying: {}",
                    operation, model, attempt, max_attempts, error
                );
            } else {
                warn!(
                    "{} with {} failed (attempt {}/{}), giving up: {}",
                    operation, model, attempt, max_attempts, error
                );
            }
            last_error = Some(error);
        }

        Err(GatewayError::RetriesExhausted {
            operation,
            model: model.to_string(),
            attempts: max_attempts,
            last: Box::new(last_error.unwrap_or_else(|| {
                GatewayError::InvalidRequest("no attempt was made".to_string())
            })),
        })
    }
}

/// Parse model output as JSON, tolerating surrounding prose.
///
/// Empty output is treated as `{}`. When the whole text does not parse, the
/// span from the first `{` to the last `}` is tried instead.
pub fn parse_json_lenient(content: &str) -> GatewayResult<Value> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Ok(Value::Object(Default::default()));
    }

    let first_error = match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            if let Ok(value) = serde_json::from_str::<Value>(&trimmed[start..=end]) {
                return Ok(value);
            }
        }
    }

    Err(GatewayError::InvalidJson(first_error.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_plain_json() {
        assert_eq!(parse_json_lenient(r#"{"a": 1}"#).unwrap(), json!({"a": 1}));
    }

    #[test]
    fn test_parse_empty_output_as_empty_object() {
        assert_eq!(parse_json_lenient("  \n").unwrap(), json!({}));
    }

    #[test]
    fn test_parse_recovers_embedded_object() {
        let content = "Sure! Here is the result:\n```json\n{\"score\": 88, \"notes\": {\"x\": 1}}\n```\nHope it helps.";
        assert_eq!(
            parse_json_lenient(content).unwrap(),
            json!({"score": 88, "notes": {"x": 1}})
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            parse_json_lenient("no json here"),
            Err(GatewayError::InvalidJson(_))
        ));
        assert!(parse_json_lenient("} backwards {").is_err());
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = GatewayPolicy {
            max_attempts: 4,
            call_timeout: Duration::from_secs(1),
            retry_backoff: Duration::from_millis(100),
        };
        assert_eq!(policy.backoff_before(1), Duration::ZERO);
        assert_eq!(policy.backoff_before(2), Duration::from_millis(100));
        assert_eq!(policy.backoff_before(3), Duration::from_millis(200));
        assert_eq!(policy.backoff_before(4), Duration::from_millis(400));
    }

    #[test]
    fn test_policy_from_config_never_zero_attempts() {
        let config = GatewayConfig {
            max_attempts: 0,
            call_timeout_secs: 0,
            retry_backoff_ms: 0,
        };
        let policy = GatewayPolicy::from(&config);
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.call_timeout, Duration::from_secs(1));
    }
}
