use pipecheck_llm::{OutputSchema, ValueType};
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;

/// Transition sentinel that ends a pipeline.
pub const END: &str = "END";

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PipelineDefinition {
    pub name: String,
    pub description: Option<String>,
    pub state: Vec<StateVariable>,
    pub entry_point: String,
    pub nodes: Vec<NodeSpec>,
}

impl PipelineDefinition {
    pub fn node(&self, id: &str) -> Option<&NodeSpec> {
        self.nodes.iter().find(|node| node.id == id)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StateVariable {
    pub name: String,
    #[serde(rename = "type")]
    pub value_type: ValueType,
    pub value: Option<Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NodeSpec {
    pub id: String,
    #[serde(flatten)]
    pub kind: NodeKind,
    /// Input names in resolution order.
    pub input: Vec<String>,
    pub output: Vec<String>,
    pub input_mapping: BTreeMap<String, InputSource>,
    pub error_policy: ErrorPolicy,
    pub transition: Transition,
}

impl NodeSpec {
    /// Inputs without an explicit mapping read the state variable of the same name.
    pub fn source_for(&self, input: &str) -> InputSource {
        self.input_mapping
            .get(input)
            .cloned()
            .unwrap_or_else(|| InputSource::Variable(input.to_string()))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum NodeKind {
    #[serde(rename = "toolkit")]
    Tool { toolkit: String, tool: String },
    #[serde(rename = "llm")]
    LanguageModel {
        model: String,
        prompt: String,
        system: Option<String>,
        structured_output: Option<OutputSchema>,
    },
    #[serde(rename = "code")]
    Code { code: String },
}

impl NodeKind {
    pub fn type_tag(&self) -> &'static str {
        match self {
            Self::Tool { .. } => "toolkit",
            Self::LanguageModel { .. } => "llm",
            Self::Code { .. } => "code",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum InputSource {
    Variable(String),
    Fixed(Value),
    Template(String),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    #[default]
    Abort,
    ContinueWithCapturedError,
}

impl ErrorPolicy {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "abort" => Some(Self::Abort),
            "continue" | "continue_with_captured_error" => Some(Self::ContinueWithCapturedError),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Transition {
    Node(String),
    End,
}

impl Transition {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed == END {
            Self::End
        } else {
            Self::Node(trimmed.to_string())
        }
    }

    pub fn target(&self) -> Option<&str> {
        match self {
            Self::Node(id) => Some(id.as_str()),
            Self::End => None,
        }
    }
}

impl Serialize for Transition {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.target().unwrap_or(END))
    }
}
