use crate::{ModelError, OutputSchema, parse_structured_response};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ModelRequest {
    /// Opaque session tag of the suite run issuing the call.
    pub session_id: String,
    pub model: String,
    pub system: Option<String>,
    pub prompt: String,
    pub schema: Option<OutputSchema>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ModelResponse {
    Text(String),
    Fields(Map<String, Value>),
}

#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn complete(&self, request: ModelRequest) -> Result<ModelResponse, ModelError>;
}

pub type SharedModelClient = Arc<dyn ModelClient>;

/// Turns a model reply into the node payload.
///
/// Without a schema, text stays text and a field map becomes a JSON object.
/// With a schema, both shapes are validated and any mismatch is a
/// [`ModelError::Parse`].
pub fn interpret_response(
    response: ModelResponse,
    schema: Option<&OutputSchema>,
) -> Result<Value, ModelError> {
    match (response, schema) {
        (ModelResponse::Text(text), None) => Ok(Value::String(text)),
        (ModelResponse::Fields(fields), None) => Ok(Value::Object(fields)),
        (ModelResponse::Text(text), Some(schema)) => {
            parse_structured_response(&text, schema).map(Value::Object)
        }
        (ModelResponse::Fields(fields), Some(schema)) => schema.validate(&fields).map(Value::Object),
    }
}
