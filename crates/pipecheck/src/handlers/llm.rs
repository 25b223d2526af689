use crate::handlers::{ExecutionContext, NodeExecutor};
use crate::{NodeError, NodeKind, NodeSpec, ResolvedInputs, render_prompt};
use async_trait::async_trait;
use pipecheck_llm::{ModelError, ModelRequest, SharedModelClient, interpret_response};
use serde_json::Value;

/// Renders the node's prompt, calls the model, and interprets the reply.
///
/// A failed call surfaces as [`NodeError::ModelInvocation`]; a reply that
/// does not match the declared schema surfaces as
/// [`NodeError::StructuredOutputParse`].
pub struct ModelExecutor {
    client: SharedModelClient,
}

impl ModelExecutor {
    pub fn new(client: SharedModelClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl NodeExecutor for ModelExecutor {
    async fn execute(
        &self,
        node: &NodeSpec,
        inputs: &ResolvedInputs,
        context: &ExecutionContext,
    ) -> Result<Value, NodeError> {
        let NodeKind::LanguageModel {
            model,
            prompt,
            system,
            structured_output,
        } = &node.kind
        else {
            return Err(NodeError::ModelInvocation(format!(
                "node '{}' is not a language-model node",
                node.id
            )));
        };

        let request = ModelRequest {
            session_id: context.session_id.to_string(),
            model: model.clone(),
            system: system.as_deref().map(|text| render_prompt(text, inputs)),
            prompt: render_prompt(prompt, inputs),
            schema: structured_output.clone(),
        };
        tracing::debug!(node = %node.id, model = %model, "calling language model");

        let response = self
            .client
            .complete(request)
            .await
            .map_err(model_error_to_node_error)?;
        interpret_response(response, structured_output.as_ref()).map_err(model_error_to_node_error)
    }
}

fn model_error_to_node_error(error: ModelError) -> NodeError {
    match error {
        ModelError::Parse(message) => NodeError::StructuredOutputParse(message),
        other => NodeError::ModelInvocation(other.to_string()),
    }
}
