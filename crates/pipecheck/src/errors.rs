use std::time::Duration;
use thiserror::Error;

/// Structural violation found while loading a pipeline document.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{path}: {message}")]
pub struct ParseError {
    pub path: String,
    pub message: String,
}

impl ParseError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("entry point '{0}' does not name a node")]
    MissingEntryPoint(String),
    #[error("node '{node_id}' transitions to unknown node '{target}'")]
    DanglingTransition { node_id: String, target: String },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum VariableError {
    #[error("required variable '{0}' is not set and has no default")]
    MissingRequiredVariable(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum MappingError {
    #[error("node '{node_id}' reads unknown state variable '{name}'")]
    UnknownStateVariable { node_id: String, name: String },
    #[error("node '{node_id}' template references unresolved variable '{name}'")]
    UnresolvedTemplateVariable { node_id: String, name: String },
}

/// Failure of a single node's external effect.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum NodeError {
    #[error("{0}")]
    ToolInvocation(String),
    #[error("{0}")]
    ModelInvocation(String),
    #[error("{0}")]
    StructuredOutputParse(String),
    #[error("{0}")]
    CodeEvaluation(String),
}

impl NodeError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ToolInvocation(_) => "ToolInvocationError",
            Self::ModelInvocation(_) => "ModelInvocationError",
            Self::StructuredOutputParse(_) => "StructuredOutputParseError",
            Self::CodeEvaluation(_) => "CodeEvaluationError",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::ToolInvocation(message)
            | Self::ModelInvocation(message)
            | Self::StructuredOutputParse(message)
            | Self::CodeEvaluation(message) => message,
        }
    }
}

/// Error raised by a toolkit operation. The message is reported unchanged.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ToolkitError {
    pub message: String,
}

impl ToolkitError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Why a pipeline instance did not run to completion.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum PipelineError {
    #[error("parse error at {0}")]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Variable(#[from] VariableError),
    #[error(transparent)]
    Mapping(#[from] MappingError),
    #[error("node '{node_id}' failed: {error}")]
    Node { node_id: String, error: NodeError },
    #[error("pipeline timed out after {0:?}")]
    Timeout(Duration),
    #[error("pipeline exceeded the step limit of {0}")]
    StepLimitExceeded(usize),
    #[error("remote platform error: {0}")]
    Remote(String),
    #[error("pipeline run was aborted: {0}")]
    Aborted(String),
}

impl PipelineError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Parse(_) => "ParseError",
            Self::Graph(_) => "GraphError",
            Self::Variable(VariableError::MissingRequiredVariable(_)) => "MissingRequiredVariable",
            Self::Mapping(MappingError::UnknownStateVariable { .. }) => "UnknownStateVariable",
            Self::Mapping(MappingError::UnresolvedTemplateVariable { .. }) => {
                "UnresolvedTemplateVariable"
            }
            Self::Node { error, .. } => error.kind(),
            Self::Timeout(_) => "Timeout",
            Self::StepLimitExceeded(_) => "StepLimitExceeded",
            Self::Remote(_) => "RemotePlatformError",
            Self::Aborted(_) => "Aborted",
        }
    }

    pub fn node_id(&self) -> Option<&str> {
        match self {
            Self::Node { node_id, .. } => Some(node_id.as_str()),
            Self::Mapping(MappingError::UnknownStateVariable { node_id, .. })
            | Self::Mapping(MappingError::UnresolvedTemplateVariable { node_id, .. }) => {
                Some(node_id.as_str())
            }
            Self::Graph(GraphError::DanglingTransition { node_id, .. }) => Some(node_id.as_str()),
            _ => None,
        }
    }

    /// Load-time errors stop a pipeline before any node executes.
    pub fn is_load_time(&self) -> bool {
        matches!(self, Self::Parse(_) | Self::Graph(_) | Self::Variable(_))
    }
}

/// Errors of the I/O-bearing APIs around the engine.
#[derive(Debug, Error)]
pub enum PipecheckError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),
    #[error("no environment snapshot stored for session '{0}'")]
    UnknownSession(String),
    #[error("remote platform error: {0}")]
    Remote(String),
}
