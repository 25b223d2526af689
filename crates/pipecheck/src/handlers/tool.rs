use crate::handlers::{ExecutionContext, NodeExecutor};
use crate::{NodeError, NodeKind, NodeSpec, ResolvedInputs, ToolkitError};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// One operation invocation against the toolkit collaborator.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolCall {
    pub session_id: String,
    pub toolkit: String,
    pub operation: String,
    pub arguments: ResolvedInputs,
}

#[async_trait]
pub trait Toolkit: Send + Sync {
    async fn invoke(&self, call: ToolCall) -> Result<Value, ToolkitError>;
}

pub type SharedToolkit = Arc<dyn Toolkit>;

pub type ToolFuture = Pin<Box<dyn Future<Output = Result<Value, ToolkitError>> + Send>>;
pub type ToolOperation = Arc<dyn Fn(ToolCall) -> ToolFuture + Send + Sync>;

/// In-process toolkit keyed by (toolkit, operation).
#[derive(Clone, Default)]
pub struct ToolRegistry {
    operations: HashMap<(String, String), ToolOperation>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        toolkit: impl Into<String>,
        operation: impl Into<String>,
        executor: ToolOperation,
    ) -> Option<ToolOperation> {
        self.operations
            .insert((toolkit.into(), operation.into()), executor)
    }

    pub fn register_fn<F, Fut>(
        &mut self,
        toolkit: impl Into<String>,
        operation: impl Into<String>,
        executor: F,
    ) -> Option<ToolOperation>
    where
        F: Fn(ToolCall) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ToolkitError>> + Send + 'static,
    {
        let executor: ToolOperation =
            Arc::new(move |call: ToolCall| -> ToolFuture { Box::pin(executor(call)) });
        self.register(toolkit, operation, executor)
    }

    pub fn contains(&self, toolkit: &str, operation: &str) -> bool {
        self.operations
            .contains_key(&(toolkit.to_string(), operation.to_string()))
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .operations
            .keys()
            .map(|(toolkit, operation)| format!("{toolkit}.{operation}"))
            .collect();
        names.sort_unstable();
        names
    }
}

#[async_trait]
impl Toolkit for ToolRegistry {
    async fn invoke(&self, call: ToolCall) -> Result<Value, ToolkitError> {
        let key = (call.toolkit.clone(), call.operation.clone());
        let Some(executor) = self.operations.get(&key).cloned() else {
            return Err(ToolkitError::new(format!(
                "unknown tool '{}' in toolkit '{}'",
                call.operation, call.toolkit
            )));
        };
        executor(call).await
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("operations", &self.names())
            .finish()
    }
}

pub struct ToolExecutor {
    toolkit: SharedToolkit,
}

impl ToolExecutor {
    pub fn new(toolkit: SharedToolkit) -> Self {
        Self { toolkit }
    }
}

#[async_trait]
impl NodeExecutor for ToolExecutor {
    async fn execute(
        &self,
        node: &NodeSpec,
        inputs: &ResolvedInputs,
        context: &ExecutionContext,
    ) -> Result<Value, NodeError> {
        let NodeKind::Tool { toolkit, tool } = &node.kind else {
            return Err(NodeError::ToolInvocation(format!(
                "node '{}' is not a toolkit node",
                node.id
            )));
        };

        let call = ToolCall {
            session_id: context.session_id.to_string(),
            toolkit: toolkit.clone(),
            operation: tool.clone(),
            arguments: inputs.clone(),
        };
        self.toolkit
            .invoke(call)
            .await
            .map_err(|error| NodeError::ToolInvocation(error.message))
    }
}
