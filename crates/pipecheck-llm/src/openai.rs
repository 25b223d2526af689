use crate::{ModelClient, ModelError, ModelRequest, ModelResponse};
use async_trait::async_trait;
use serde_json::{Value, json};

const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Chat-completions client for any OpenAI-compatible endpoint.
#[derive(Clone, Debug)]
pub struct OpenAiCompatibleClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl OpenAiCompatibleClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: None,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn from_env() -> Self {
        let base_url = std::env::var("OPENAI_BASE_URL")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string());
        let client = Self::new(base_url);
        match std::env::var("OPENAI_API_KEY") {
            Ok(key) if !key.trim().is_empty() => client.with_api_key(key),
            _ => client,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

pub(crate) fn request_body(request: &ModelRequest) -> Value {
    let mut messages = Vec::new();
    if let Some(system) = request.system.as_deref() {
        messages.push(json!({ "role": "system", "content": system }));
    }
    messages.push(json!({ "role": "user", "content": request.prompt }));

    let mut body = json!({
        "model": request.model,
        "messages": messages,
        "user": request.session_id,
    });
    if request.schema.is_some() {
        body["response_format"] = json!({ "type": "json_object" });
    }
    body
}

#[async_trait]
impl ModelClient for OpenAiCompatibleClient {
    async fn complete(&self, request: ModelRequest) -> Result<ModelResponse, ModelError> {
        let mut builder = self.client.post(self.endpoint()).json(&request_body(&request));
        if let Some(api_key) = self.api_key.as_deref() {
            builder = builder.bearer_auth(api_key);
        }

        tracing::debug!(model = %request.model, session = %request.session_id, "sending chat completion");
        let response = builder
            .send()
            .await
            .map_err(|err| ModelError::Request(format!("http post failed: {err}")))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|err| ModelError::Request(format!("http read body failed: {err}")))?;
        if !status.is_success() {
            return Err(ModelError::Http {
                status: status.as_u16(),
                body: text,
            });
        }

        let payload: Value = serde_json::from_str(&text)
            .map_err(|err| ModelError::Request(format!("http json decode failed: {err}")))?;
        let content = payload
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .ok_or_else(|| ModelError::Request("missing choices[0].message.content".to_string()))?;
        Ok(ModelResponse::Text(content.to_string()))
    }
}
