use crate::llm_provider::*;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for OpenAI-compatible chat-completion endpoints (OpenRouter, LM Studio, Ollama, ...)
#[derive(Debug, Clone)]
pub struct OpenAICompatibleConfig {
    /// Base URL for the API (e.g., "https://openrouter.ai/api/v1")
    pub base_url: String,
    /// Bearer token; some local endpoints need none
    pub api_key: Option<SecretString>,
    /// Provider name for display purposes
    pub provider_name: String,
    /// HTTP client timeout in seconds
    pub timeout_secs: u64,
}

impl Default for OpenAICompatibleConfig {
    fn default() -> Self {
        Self {
            base_url: "https://openrouter.ai/api/v1".to_string(),
            api_key: None,
            provider_name: "openrouter".to_string(),
            timeout_secs: 300,
        }
    }
}

impl OpenAICompatibleConfig {
    /// Create config for LM Studio
    pub fn lm_studio() -> Self {
        Self {
            base_url: "http://localhost:1234/v1".to_string(),
            provider_name: "lmstudio".to_string(),
            ..Default::default()
        }
    }

    /// Create config for Ollama (OpenAI-compatible endpoint)
    pub fn ollama() -> Self {
        Self {
            base_url: "http://localhost:11434/v1".to_string(),
            provider_name: "ollama".to_string(),
            ..Default::default()
        }
    }
}

/// OpenAI-compatible LLM provider. Each call is exactly one HTTP request.
pub struct OpenAICompatibleProvider {
    config: OpenAICompatibleConfig,
    client: Client,
}

impl OpenAICompatibleProvider {
    pub fn new(config: OpenAICompatibleConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { config, client })
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.api_key {
            Some(api_key) => request.header(
                "Authorization",
                format!("Bearer {}", api_key.expose_secret()),
            ),
            None => request,
        }
    }

    async fn try_chat_completions_request(
        &self,
        model: &str,
        messages: &[Message],
        config: &GenerationConfig,
    ) -> Result<LLMResponse> {
        let request = build_chat_request(model, messages, config);

        let request_builder = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .header("Content-Type", "application/json")
            .json(&request);

        let response = self
            .authorize(request_builder)
            .send()
            .await
            .context(format!(
                "Failed to send request to {} Chat Completions API at {}",
                self.config.provider_name, self.config.base_url
            ))?;

        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());

            return Err(anyhow!(
                "{} API error ({}): {}",
                self.config.provider_name,
                status,
                error_text
            ));
        }

        let chat_response: ChatCompletionsResponse = response.json().await.context(format!(
            "Failed to parse {} Chat Completions API response",
            self.config.provider_name
        ))?;

        into_llm_response(chat_response, model)
    }
}

#[async_trait]
impl LLMProvider for OpenAICompatibleProvider {
    async fn generate_chat(
        &self,
        model: &str,
        messages: &[Message],
        config: &GenerationConfig,
    ) -> LLMResult<LLMResponse> {
        self.try_chat_completions_request(model, messages, config)
            .await
    }

    async fn is_available(&self) -> bool {
        let request = self.client.get(format!("{}/models", self.config.base_url));
        match self.authorize(request).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    fn provider_name(&self) -> &str {
        &self.config.provider_name
    }
}

fn build_chat_request(
    model: &str,
    messages: &[Message],
    config: &GenerationConfig,
) -> ChatCompletionsRequest {
    ChatCompletionsRequest {
        model: model.to_string(),
        messages: messages
            .iter()
            .map(|m| ChatMessage {
                role: m.role.to_string(),
                content: m.content.clone(),
            })
            .collect(),
        temperature: config.temperature,
        max_completion_tokens: config.max_completion_tokens,
        top_p: config.top_p,
        stop: config.stop.clone(),
        response_format: config.response_format.clone(),
    }
}

fn into_llm_response(response: ChatCompletionsResponse, model: &str) -> Result<LLMResponse> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("No choices in response"))?;

    Ok(LLMResponse {
        content: choice.message.content.unwrap_or_default(),
        total_tokens: response.usage.as_ref().map(|u| u.total_tokens),
        prompt_tokens: response.usage.as_ref().map(|u| u.prompt_tokens),
        completion_tokens: response.usage.as_ref().map(|u| u.completion_tokens),
        finish_reason: choice.finish_reason,
        model: response.model.unwrap_or_else(|| model.to_string()),
    })
}

// Chat Completions API request/response structures

#[derive(Debug, Serialize)]
struct ChatCompletionsRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionsResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: usize,
    completion_tokens: usize,
    total_tokens: usize,
}
