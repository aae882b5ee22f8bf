use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Result type for LLM operations
pub type LLMResult<T> = anyhow::Result<T>;

/// Configuration for generation parameters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Sampling temperature; provider default when unset
    pub temperature: Option<f32>,
    /// Maximum output tokens
    pub max_completion_tokens: Option<usize>,
    /// Top-p nucleus sampling parameter
    pub top_p: Option<f32>,
    /// Stop sequences
    pub stop: Option<Vec<String>>,
    /// Requested output format (structured calls only)
    pub response_format: Option<ResponseFormat>,
}

/// Output format requested from the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseFormat {
    Text,
    /// Any syntactically valid JSON object
    JsonObject,
    /// JSON matching the attached schema
    JsonSchema { json_schema: JsonSchema },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonSchema {
    pub name: String,
    pub schema: Value,
    pub strict: bool,
}

/// A message in the conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

/// Role of a message in the conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// Response from the LLM
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LLMResponse {
    /// Generated text content; empty when the model returned nothing
    pub content: String,
    pub total_tokens: Option<usize>,
    pub prompt_tokens: Option<usize>,
    pub completion_tokens: Option<usize>,
    /// Finish reason (e.g., "stop", "length")
    pub finish_reason: Option<String>,
    /// Model that served the request
    pub model: String,
}

/// A chat-completion backend.
///
/// One call is one attempt: retries, timeouts and output validation belong to
/// [`crate::gateway::ModelGateway`].
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Generate a chat completion with `model`
    async fn generate_chat(
        &self,
        model: &str,
        messages: &[Message],
        config: &GenerationConfig,
    ) -> LLMResult<LLMResponse>;

    /// Check if the provider is reachable
    async fn is_available(&self) -> bool;

    /// Get the name of this provider
    fn provider_name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_response_format_wire_shape() {
        let format = ResponseFormat::JsonSchema {
            json_schema: JsonSchema {
                name: "requirements".to_string(),
                schema: json!({"type": "object"}),
                strict: false,
            },
        };
        let value = serde_json::to_value(&format).unwrap();
        assert_eq!(value["type"], "json_schema");
        assert_eq!(value["json_schema"]["name"], "requirements");

        let value = serde_json::to_value(ResponseFormat::JsonObject).unwrap();
        assert_eq!(value, json!({"type": "json_object"}));
    }

    #[test]
    fn test_message_roles_serialize_lowercase() {
        let value = serde_json::to_value(Message::system("hi")).unwrap();
        assert_eq!(value["role"], "system");
        assert_eq!(MessageRole::User.to_string(), "user");
    }
}
