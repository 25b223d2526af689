use crate::{ModelClient, ModelError, ModelRequest, ModelResponse};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

/// Model client that answers from a queue of prepared replies and records
/// every request it receives.
#[derive(Debug, Default)]
pub struct ScriptedModelClient {
    replies: Mutex<VecDeque<Result<ModelResponse, ModelError>>>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedModelClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_reply(&self, reply: Result<ModelResponse, ModelError>) -> &Self {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(reply);
        self
    }

    pub fn push_text(&self, text: impl Into<String>) -> &Self {
        self.push_reply(Ok(ModelResponse::Text(text.into())))
    }

    pub fn push_fields(&self, fields: Map<String, Value>) -> &Self {
        self.push_reply(Ok(ModelResponse::Fields(fields)))
    }

    pub fn push_error(&self, error: ModelError) -> &Self {
        self.push_reply(Err(error))
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl ModelClient for ScriptedModelClient {
    async fn complete(&self, request: ModelRequest) -> Result<ModelResponse, ModelError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| Err(ModelError::Request("no scripted reply left".to_string())))
    }
}
