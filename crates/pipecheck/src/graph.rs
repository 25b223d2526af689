use crate::{GraphError, NodeSpec, PipelineDefinition, Transition};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Id-indexed view over a pipeline's nodes. Built once per execution and
/// owned by it.
#[derive(Clone, Debug)]
pub struct PipelineGraph {
    entry_point: String,
    nodes: Vec<NodeSpec>,
    index: BTreeMap<String, usize>,
}

impl PipelineGraph {
    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    pub fn node(&self, id: &str) -> Option<&NodeSpec> {
        self.index.get(id).map(|position| &self.nodes[*position])
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node ids no transition chain from the entry point ever reaches, in
    /// declaration order.
    pub fn unreachable_nodes(&self) -> Vec<&str> {
        let mut visited = BTreeSet::new();
        let mut queue = VecDeque::from([self.entry_point.as_str()]);
        while let Some(id) = queue.pop_front() {
            if !visited.insert(id) {
                continue;
            }
            if let Some(Transition::Node(next)) = self.node(id).map(|node| &node.transition) {
                queue.push_back(next.as_str());
            }
        }
        self.nodes
            .iter()
            .map(|node| node.id.as_str())
            .filter(|id| !visited.contains(id))
            .collect()
    }
}

/// Validates the entry point and every transition target. Cycles are allowed.
pub fn build_graph(definition: &PipelineDefinition) -> Result<PipelineGraph, GraphError> {
    let index: BTreeMap<String, usize> = definition
        .nodes
        .iter()
        .enumerate()
        .map(|(position, node)| (node.id.clone(), position))
        .collect();

    if !index.contains_key(&definition.entry_point) {
        return Err(GraphError::MissingEntryPoint(definition.entry_point.clone()));
    }
    for node in &definition.nodes {
        if let Transition::Node(target) = &node.transition {
            if !index.contains_key(target) {
                return Err(GraphError::DanglingTransition {
                    node_id: node.id.clone(),
                    target: target.clone(),
                });
            }
        }
    }

    let graph = PipelineGraph {
        entry_point: definition.entry_point.clone(),
        nodes: definition.nodes.clone(),
        index,
    };
    let unreachable = graph.unreachable_nodes();
    if !unreachable.is_empty() {
        tracing::warn!(
            pipeline = %definition.name,
            nodes = ?unreachable,
            "pipeline declares nodes unreachable from the entry point"
        );
    }
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ErrorPolicy, NodeKind};

    fn code_node(id: &str, transition: Transition) -> NodeSpec {
        NodeSpec {
            id: id.to_string(),
            kind: NodeKind::Code {
                code: "function main() { return 1; }".to_string(),
            },
            input: Vec::new(),
            output: Vec::new(),
            input_mapping: BTreeMap::new(),
            error_policy: ErrorPolicy::Abort,
            transition,
        }
    }

    fn definition(entry_point: &str, nodes: Vec<NodeSpec>) -> PipelineDefinition {
        PipelineDefinition {
            name: "graph".to_string(),
            description: None,
            state: Vec::new(),
            entry_point: entry_point.to_string(),
            nodes,
        }
    }

    #[test]
    fn build_graph_resolved_transitions_expected_index() {
        let definition = definition(
            "a",
            vec![
                code_node("a", Transition::Node("b".to_string())),
                code_node("b", Transition::End),
            ],
        );
        let graph = build_graph(&definition).expect("graph should build");
        assert_eq!(graph.entry_point(), "a");
        assert_eq!(graph.len(), 2);
        assert!(graph.node("b").is_some());
        assert!(graph.node("c").is_none());
    }

    #[test]
    fn build_graph_missing_entry_point_expected_error() {
        let definition = definition("start", vec![code_node("a", Transition::End)]);
        let error = build_graph(&definition).expect_err("entry point should be rejected");
        assert_eq!(error, GraphError::MissingEntryPoint("start".to_string()));
    }

    #[test]
    fn build_graph_dangling_transition_expected_error() {
        let definition = definition(
            "a",
            vec![code_node("a", Transition::Node("ghost".to_string()))],
        );
        let error = build_graph(&definition).expect_err("dangling target should be rejected");
        assert_eq!(
            error,
            GraphError::DanglingTransition {
                node_id: "a".to_string(),
                target: "ghost".to_string(),
            }
        );
    }

    #[test]
    fn build_graph_cycle_expected_allowed() {
        let definition = definition(
            "a",
            vec![
                code_node("a", Transition::Node("b".to_string())),
                code_node("b", Transition::Node("a".to_string())),
            ],
        );
        let graph = build_graph(&definition).expect("cycles should be allowed");
        assert!(graph.unreachable_nodes().is_empty());
    }

    #[test]
    fn unreachable_nodes_orphan_expected_listed() {
        let definition = definition(
            "a",
            vec![
                code_node("a", Transition::End),
                code_node("orphan", Transition::End),
            ],
        );
        let graph = build_graph(&definition).expect("graph should build");
        assert_eq!(graph.unreachable_nodes(), vec!["orphan"]);
    }
}
