// ABOUTME: Declared output shapes for structured model calls
// ABOUTME: Turns schemars schemas into chat-completion response formats

use crate::llm_provider::{JsonSchema as LLMJsonSchema, ResponseFormat};
use schemars::{schema_for, JsonSchema};
use serde_json::Value;

/// The shape a structured call asks the model for.
///
/// A strict shape is sent to the provider as a JSON schema. An advisory shape
/// only asks for "some JSON object"; the typed decode after the call is then the
/// only check.
#[derive(Debug, Clone)]
pub struct OutputShape {
    name: String,
    schema: Value,
    adhere: bool,
}

impl OutputShape {
    pub fn strict<T: JsonSchema>(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: schema_to_json_value::<T>(),
            adhere: true,
        }
    }

    pub fn advisory<T: JsonSchema>(name: impl Into<String>) -> Self {
        Self {
            adhere: false,
            ..Self::strict::<T>(name)
        }
    }

    /// Any JSON object, no schema at all
    pub fn any_object(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: serde_json::json!({ "type": "object" }),
            adhere: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Value {
        &self.schema
    }

    pub fn adheres(&self) -> bool {
        self.adhere
    }

    pub fn response_format(&self) -> ResponseFormat {
        if !self.adhere {
            return ResponseFormat::JsonObject;
        }
        ResponseFormat::JsonSchema {
            json_schema: LLMJsonSchema {
                name: self.name.clone(),
                schema: self.schema.clone(),
                // Strict mode needs additionalProperties=false on every object,
                // which open attribute bags cannot satisfy.
                strict: false,
            },
        }
    }
}

fn schema_to_json_value<T: JsonSchema>() -> Value {
    schema_for!(T).to_value()
}
