#![allow(dead_code)]

use pipecheck::{
    EnvSnapshot, ExecutorRegistry, PipelineEngine, Session, SessionId, ToolCall, ToolRegistry,
    ToolkitError,
};
use pipecheck_llm::ScriptedModelClient;
use serde_json::{Value, json};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Records every toolkit call so tests can assert on arguments and order.
#[derive(Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<ToolCall>>>,
}

impl CallLog {
    pub fn push(&self, call: ToolCall) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }

    pub fn calls(&self) -> Vec<ToolCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn operations(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .map(|call| format!("{}.{}", call.toolkit, call.operation))
            .collect()
    }
}

/// A `files` toolkit: `list_items` returns `["a", "b"]`, `read_item` fails
/// with "item not found", `sleep` waits `seconds` and echoes its arguments.
pub fn files_toolkit(log: &CallLog) -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    let calls = log.clone();
    registry.register_fn("files", "list_items", move |call: ToolCall| {
        let calls = calls.clone();
        async move {
            calls.push(call);
            Ok::<Value, ToolkitError>(json!(["a", "b"]))
        }
    });

    let calls = log.clone();
    registry.register_fn("files", "read_item", move |call: ToolCall| {
        let calls = calls.clone();
        async move {
            let name = call
                .arguments
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or("?")
                .to_string();
            calls.push(call);
            Err::<Value, _>(ToolkitError::new(format!("item '{name}' not found")))
        }
    });

    let calls = log.clone();
    registry.register_fn("files", "sleep", move |call: ToolCall| {
        let calls = calls.clone();
        async move {
            let seconds = call
                .arguments
                .get("seconds")
                .and_then(Value::as_u64)
                .unwrap_or(0);
            let echo = Value::Object(call.arguments.clone());
            calls.push(call);
            tokio::time::sleep(Duration::from_secs(seconds)).await;
            Ok::<Value, ToolkitError>(echo)
        }
    });

    let calls = log.clone();
    registry.register_fn("files", "echo", move |call: ToolCall| {
        let calls = calls.clone();
        async move {
            let echo = Value::Object(call.arguments.clone());
            calls.push(call);
            Ok::<Value, ToolkitError>(echo)
        }
    });

    registry
}

pub fn executors(toolkit: ToolRegistry, model: Arc<ScriptedModelClient>) -> ExecutorRegistry {
    ExecutorRegistry::with_collaborators(Arc::new(toolkit), model)
}

pub fn engine(toolkit: ToolRegistry, model: Arc<ScriptedModelClient>) -> PipelineEngine {
    PipelineEngine::new(executors(toolkit, model))
}

pub fn session(id: &str) -> Session {
    Session::with_id(SessionId::from(id), EnvSnapshot::new())
}
