// ABOUTME: In-process scripted LLM provider for tests
// ABOUTME: Replies are produced by a closure or a fixed queue; every call is recorded

use crate::llm_provider::*;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;

/// One recorded request made against a [`ScriptedProvider`].
#[derive(Debug, Clone)]
pub struct ScriptedCall {
    /// Zero-based position of this call among all calls to the provider
    pub index: usize,
    pub model: String,
    pub messages: Vec<Message>,
    pub config: GenerationConfig,
}

impl ScriptedCall {
    /// Name of the requested JSON schema, if the call asked for one
    pub fn schema_name(&self) -> Option<&str> {
        match &self.config.response_format {
            Some(ResponseFormat::JsonSchema { json_schema }) => Some(json_schema.name.as_str()),
            _ => None,
        }
    }

    pub fn wants_json(&self) -> bool {
        matches!(
            self.config.response_format,
            Some(ResponseFormat::JsonObject) | Some(ResponseFormat::JsonSchema { .. })
        )
    }

    pub fn system_prompt(&self) -> &str {
        self.content_of(MessageRole::System)
    }

    pub fn user_prompt(&self) -> &str {
        self.content_of(MessageRole::User)
    }

    fn content_of(&self, role: MessageRole) -> &str {
        self.messages
            .iter()
            .find(|m| m.role == role)
            .map(|m| m.content.as_str())
            .unwrap_or("")
    }
}

#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Content(String),
    Fail(String),
    Delayed(Duration, Box<ScriptedReply>),
}

impl ScriptedReply {
    pub fn content(text: impl Into<String>) -> Self {
        ScriptedReply::Content(text.into())
    }

    pub fn json(value: serde_json::Value) -> Self {
        ScriptedReply::Content(value.to_string())
    }

    pub fn fail(message: impl Into<String>) -> Self {
        ScriptedReply::Fail(message.into())
    }

    pub fn after(self, delay: Duration) -> Self {
        ScriptedReply::Delayed(delay, Box::new(self))
    }
}

type Responder = dyn Fn(&ScriptedCall) -> ScriptedReply + Send + Sync;

/// Provider whose answers come from a test script.
pub struct ScriptedProvider {
    responder: Box<Responder>,
    calls: Mutex<Vec<ScriptedCall>>,
}

impl ScriptedProvider {
    pub fn new(responder: impl Fn(&ScriptedCall) -> ScriptedReply + Send + Sync + 'static) -> Self {
        Self {
            responder: Box::new(responder),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Reply with `replies` in order; calls past the end fail.
    pub fn from_queue(replies: Vec<ScriptedReply>) -> Self {
        let queue = Mutex::new(VecDeque::from(replies));
        Self::new(move |_| {
            queue
                .lock()
                .pop_front()
                .unwrap_or_else(|| ScriptedReply::fail("script exhausted"))
        })
    }

    pub fn calls(&self) -> Vec<ScriptedCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn calls_for_model(&self, model: &str) -> Vec<ScriptedCall> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.model == model)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl LLMProvider for ScriptedProvider {
    async fn generate_chat(
        &self,
        model: &str,
        messages: &[Message],
        config: &GenerationConfig,
    ) -> LLMResult<LLMResponse> {
        let call = {
            let mut calls = self.calls.lock();
            let call = ScriptedCall {
                index: calls.len(),
                model: model.to_string(),
                messages: messages.to_vec(),
                config: config.clone(),
            };
            calls.push(call.clone());
            call
        };

        let mut reply = (self.responder)(&call);
        loop {
            match reply {
                ScriptedReply::Delayed(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    reply = *inner;
                }
                ScriptedReply::Content(content) => {
                    return Ok(LLMResponse {
                        content,
                        model: model.to_string(),
                        finish_reason: Some("stop".to_string()),
                        ..Default::default()
                    })
                }
                ScriptedReply::Fail(message) => return Err(anyhow::anyhow!(message)),
            }
        }
    }

    async fn is_available(&self) -> bool {
        true
    }

    fn provider_name(&self) -> &str {
        "scripted"
    }
}
