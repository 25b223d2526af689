use crate::{NodeError, PipelineError};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Succeeded,
    Failed,
    /// Failed, but the error was bound into state and traversal went on.
    CapturedError,
}

impl NodeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::CapturedError => "captured_error",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NodeFailure {
    pub kind: String,
    pub message: String,
}

impl From<&NodeError> for NodeFailure {
    fn from(error: &NodeError) -> Self {
        Self {
            kind: error.kind().to_string(),
            message: error.message().to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NodeResult {
    pub success: bool,
    /// Values bound into state. Empty for an aborted failure.
    pub outputs: Map<String, Value>,
    pub error: Option<NodeFailure>,
}

impl NodeResult {
    pub fn success(outputs: Map<String, Value>) -> Self {
        Self {
            success: true,
            outputs,
            error: None,
        }
    }

    pub fn failure(error: &NodeError) -> Self {
        Self {
            success: false,
            outputs: Map::new(),
            error: Some(error.into()),
        }
    }

    pub fn captured(error: &NodeError, outputs: Map<String, Value>) -> Self {
        Self {
            success: false,
            outputs,
            error: Some(error.into()),
        }
    }
}

/// One executed step, in traversal order.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NodeTrace {
    pub step: usize,
    pub node_id: String,
    pub kind: &'static str,
    pub status: NodeStatus,
    pub duration: Duration,
    pub result: NodeResult,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineOutcome {
    Passed,
    /// Reached END but the verdict did not hold, or a node's inputs could
    /// not be mapped from state.
    Failed,
    /// Could not run to completion.
    Errored,
    /// Never scheduled.
    Skipped,
}

impl PipelineOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Errored => "errored",
            Self::Skipped => "skipped",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PipelineResult {
    pub name: String,
    pub outcome: PipelineOutcome,
    pub duration: Duration,
    /// Terminal state snapshot.
    pub state: BTreeMap<String, Value>,
    pub error: Option<PipelineError>,
    pub trace: Vec<NodeTrace>,
}

impl PipelineResult {
    /// Decides the outcome of a run that reached END. The verdict entry must
    /// be boolean `true` to pass; an absent entry passes on completion.
    pub fn completed(
        name: impl Into<String>,
        state: BTreeMap<String, Value>,
        trace: Vec<NodeTrace>,
        duration: Duration,
        verdict_key: &str,
    ) -> Self {
        let outcome = match state.get(verdict_key) {
            None => PipelineOutcome::Passed,
            Some(Value::Bool(true)) => PipelineOutcome::Passed,
            Some(_) => PipelineOutcome::Failed,
        };
        Self {
            name: name.into(),
            outcome,
            duration,
            state,
            error: None,
            trace,
        }
    }

    /// A run stopped by `error`. Mapping errors count as `Failed`; every
    /// other error counts as `Errored`.
    pub fn errored(
        name: impl Into<String>,
        error: PipelineError,
        state: BTreeMap<String, Value>,
        trace: Vec<NodeTrace>,
        duration: Duration,
    ) -> Self {
        let outcome = match &error {
            PipelineError::Mapping(_) => PipelineOutcome::Failed,
            _ => PipelineOutcome::Errored,
        };
        Self {
            name: name.into(),
            outcome,
            duration,
            state,
            error: Some(error),
            trace,
        }
    }

    /// A result for a pipeline that never started, such as one that failed
    /// to load or timed out before reporting.
    pub fn aborted(name: impl Into<String>, error: PipelineError, duration: Duration) -> Self {
        Self::errored(name, error, BTreeMap::new(), Vec::new(), duration)
    }

    pub fn skipped(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            outcome: PipelineOutcome::Skipped,
            duration: Duration::ZERO,
            state: BTreeMap::new(),
            error: None,
            trace: Vec::new(),
        }
    }

    pub fn passed(&self) -> bool {
        self.outcome == PipelineOutcome::Passed
    }

    /// Failed or errored; skipped pipelines do not count.
    pub fn is_failure(&self) -> bool {
        matches!(
            self.outcome,
            PipelineOutcome::Failed | PipelineOutcome::Errored
        )
    }

    /// Node that stopped the run, if a node did.
    pub fn failing_node(&self) -> Option<&str> {
        self.error.as_ref().and_then(PipelineError::node_id)
    }
}
