use crate::handlers::{ExecutionContext, ExecutorRegistry, NodeExecutor};
use crate::{
    EngineConfig, ErrorPolicy, GraphError, NodeResult, NodeSpec, NodeStatus, NodeTrace,
    PipelineDefinition, PipelineError, PipelineGraph, PipelineResult, Session, State, Transition,
    bind_captured_error, bind_outputs, build_graph, load_pipeline, resolve_inputs,
};
use async_trait::async_trait;
use serde_json::Map;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::Instrument;

/// Anything that can run one pipeline to a result: the local engine or a
/// remote platform.
#[async_trait]
pub trait PipelineBackend: Send + Sync {
    async fn run_pipeline(
        &self,
        definition: &PipelineDefinition,
        session: &Session,
    ) -> PipelineResult;
}

pub type SharedPipelineBackend = Arc<dyn PipelineBackend>;

#[derive(Debug)]
enum ExecutionState {
    Running(String),
    Completed,
    Failed(PipelineError),
}

/// Runs pipelines in-process, one node at a time.
#[derive(Clone, Debug)]
pub struct PipelineEngine {
    executors: Arc<ExecutorRegistry>,
    config: EngineConfig,
}

impl PipelineEngine {
    pub fn new(executors: ExecutorRegistry) -> Self {
        Self {
            executors: Arc::new(executors),
            config: EngineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Loads a YAML document against the session environment and runs it.
    /// Load failures come back as an errored result with no trace, reported
    /// under `name`.
    pub async fn run_document(
        &self,
        name: &str,
        document: &str,
        session: &Session,
    ) -> PipelineResult {
        let started = Instant::now();
        match load_pipeline(document, session.env.values()) {
            Ok(definition) => self.execute(&definition, session).await,
            Err(error) => {
                tracing::warn!(
                    case = %name,
                    session = %session.id,
                    error = %error,
                    "pipeline failed to load"
                );
                PipelineResult::aborted(name, error, started.elapsed())
            }
        }
    }

    pub async fn execute(
        &self,
        definition: &PipelineDefinition,
        session: &Session,
    ) -> PipelineResult {
        let span =
            tracing::info_span!("pipeline", name = %definition.name, session = %session.id);
        self.drive(definition, session).instrument(span).await
    }

    async fn drive(&self, definition: &PipelineDefinition, session: &Session) -> PipelineResult {
        let started = Instant::now();
        let graph = match build_graph(definition) {
            Ok(graph) => graph,
            Err(error) => {
                tracing::warn!(error = %error, "pipeline graph is invalid");
                return PipelineResult::aborted(&definition.name, error.into(), started.elapsed());
            }
        };

        let context = ExecutionContext {
            session_id: session.id.clone(),
            pipeline: definition.name.clone(),
        };
        let mut state = State::from_schema(&definition.state);
        let mut trace = Vec::new();
        let mut current = ExecutionState::Running(graph.entry_point().to_string());
        let mut previous: Option<String> = None;
        let mut steps = 0usize;

        loop {
            current = match current {
                ExecutionState::Running(node_id) => {
                    if steps >= self.config.max_steps {
                        ExecutionState::Failed(PipelineError::StepLimitExceeded(
                            self.config.max_steps,
                        ))
                    } else {
                        steps += 1;
                        let next = self
                            .step(
                                &graph,
                                &node_id,
                                previous.as_deref(),
                                steps,
                                &context,
                                &mut state,
                                &mut trace,
                            )
                            .await;
                        previous = Some(node_id);
                        next
                    }
                }
                ExecutionState::Completed => {
                    tracing::info!(steps, "pipeline completed");
                    return PipelineResult::completed(
                        &definition.name,
                        state.into_values(),
                        trace,
                        started.elapsed(),
                        &self.config.verdict_key,
                    );
                }
                ExecutionState::Failed(error) => {
                    tracing::warn!(steps, kind = error.kind(), error = %error, "pipeline failed");
                    return PipelineResult::errored(
                        &definition.name,
                        error,
                        state.into_values(),
                        trace,
                        started.elapsed(),
                    );
                }
            };
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn step(
        &self,
        graph: &PipelineGraph,
        node_id: &str,
        previous: Option<&str>,
        step: usize,
        context: &ExecutionContext,
        state: &mut State,
        trace: &mut Vec<NodeTrace>,
    ) -> ExecutionState {
        let Some(node) = graph.node(node_id) else {
            let error = match previous {
                Some(from) => GraphError::DanglingTransition {
                    node_id: from.to_string(),
                    target: node_id.to_string(),
                },
                None => GraphError::MissingEntryPoint(node_id.to_string()),
            };
            return ExecutionState::Failed(error.into());
        };

        let inputs = match resolve_inputs(node, state) {
            Ok(inputs) => inputs,
            Err(error) => return ExecutionState::Failed(error.into()),
        };

        tracing::debug!(step, node = %node.id, kind = node.kind.type_tag(), "executing node");
        let node_started = Instant::now();
        let executor = self.executors.executor_for(&node.kind);
        let outcome = executor.execute(node, &inputs, context).await;
        let duration = node_started.elapsed();

        let (status, result) = match outcome {
            Ok(value) => {
                bind_outputs(node, value, state);
                (NodeStatus::Succeeded, NodeResult::success(bound_outputs(node, state)))
            }
            Err(error) => match node.error_policy {
                ErrorPolicy::Abort => {
                    tracing::warn!(node = %node.id, kind = error.kind(), error = %error, "node failed");
                    trace.push(NodeTrace {
                        step,
                        node_id: node.id.clone(),
                        kind: node.kind.type_tag(),
                        status: NodeStatus::Failed,
                        duration,
                        result: NodeResult::failure(&error),
                    });
                    return ExecutionState::Failed(PipelineError::Node {
                        node_id: node.id.clone(),
                        error,
                    });
                }
                ErrorPolicy::ContinueWithCapturedError => {
                    tracing::warn!(
                        node = %node.id,
                        kind = error.kind(),
                        error = %error,
                        "node failed, error captured into state"
                    );
                    bind_captured_error(node, &error, state);
                    (
                        NodeStatus::CapturedError,
                        NodeResult::captured(&error, bound_outputs(node, state)),
                    )
                }
            },
        };

        trace.push(NodeTrace {
            step,
            node_id: node.id.clone(),
            kind: node.kind.type_tag(),
            status,
            duration,
            result,
        });
        match &node.transition {
            Transition::End => ExecutionState::Completed,
            Transition::Node(next) => ExecutionState::Running(next.clone()),
        }
    }
}

fn bound_outputs(node: &NodeSpec, state: &State) -> Map<String, serde_json::Value> {
    node.output
        .iter()
        .filter_map(|name| state.get(name).map(|value| (name.clone(), value.clone())))
        .collect()
}

#[async_trait]
impl PipelineBackend for PipelineEngine {
    async fn run_pipeline(
        &self,
        definition: &PipelineDefinition,
        session: &Session,
    ) -> PipelineResult {
        self.execute(definition, session).await
    }
}
