use crate::{NodeError, NodeKind, NodeSpec, ResolvedInputs, SessionId};
use async_trait::async_trait;
use pipecheck_llm::SharedModelClient;
use serde_json::Value;
use std::sync::Arc;

pub mod code;
pub mod llm;
pub mod tool;

/// What an executor knows about the run it is serving.
#[derive(Clone, Debug)]
pub struct ExecutionContext {
    /// Opaque tag forwarded on every external call made for this run.
    pub session_id: SessionId,
    pub pipeline: String,
}

#[async_trait]
pub trait NodeExecutor: Send + Sync {
    async fn execute(
        &self,
        node: &NodeSpec,
        inputs: &ResolvedInputs,
        context: &ExecutionContext,
    ) -> Result<Value, NodeError>;
}

pub type SharedNodeExecutor = Arc<dyn NodeExecutor>;

/// One executor per node kind.
#[derive(Clone)]
pub struct ExecutorRegistry {
    tool: SharedNodeExecutor,
    model: SharedNodeExecutor,
    code: SharedNodeExecutor,
}

impl ExecutorRegistry {
    pub fn new(
        tool: SharedNodeExecutor,
        model: SharedNodeExecutor,
        code: SharedNodeExecutor,
    ) -> Self {
        Self { tool, model, code }
    }

    pub fn with_collaborators(toolkit: tool::SharedToolkit, model: SharedModelClient) -> Self {
        Self::new(
            Arc::new(tool::ToolExecutor::new(toolkit)),
            Arc::new(llm::ModelExecutor::new(model)),
            Arc::new(code::CodeExecutor::default()),
        )
    }

    pub fn with_code_executor(mut self, code: SharedNodeExecutor) -> Self {
        self.code = code;
        self
    }

    pub fn executor_for(&self, kind: &NodeKind) -> &SharedNodeExecutor {
        match kind {
            NodeKind::Tool { .. } => &self.tool,
            NodeKind::LanguageModel { .. } => &self.model,
            NodeKind::Code { .. } => &self.code,
        }
    }
}

impl std::fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorRegistry").finish_non_exhaustive()
    }
}
