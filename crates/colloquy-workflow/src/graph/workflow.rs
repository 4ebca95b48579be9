use std::collections::HashMap;

use tracing::debug;

use colloquy_core::error::{ColloquyError, Result};
use colloquy_core::state::{SessionState, StageId, WorkflowNode};

use super::edge::{Edge, EdgeCondition};
use super::node::{Node, NodeKind};

/// A validated workflow graph.
///
/// Construction checks the shape the engine relies on: every stage leads to
/// its own gate, and every gate has exactly one predecessor, one retry edge
/// back to it, and one advance edge.
#[derive(Debug, Clone)]
pub struct WorkflowGraph {
    nodes: HashMap<WorkflowNode, Node>,
    edges: Vec<Edge>,
    entry_node: WorkflowNode,
}

impl WorkflowGraph {
    /// Build and validate a graph.
    pub fn new(nodes: Vec<Node>, edges: Vec<Edge>, entry_node: WorkflowNode) -> Result<Self> {
        let node_map: HashMap<WorkflowNode, Node> =
            nodes.into_iter().map(|n| (n.id, n)).collect();
        let graph = Self {
            nodes: node_map,
            edges,
            entry_node,
        };
        graph.validate()?;
        Ok(graph)
    }

    /// The four-stage research workflow.
    pub fn research() -> Result<Self> {
        let mut nodes = Vec::new();
        let mut edges = Vec::new();

        for stage in StageId::ALL {
            nodes.push(Node::stage(stage));
            nodes.push(Node::gate(stage));

            let advance = stage
                .next()
                .map(|s| s.node())
                .unwrap_or(WorkflowNode::Terminal);
            edges.push(Edge::always(stage.node(), stage.gate()));
            edges.push(Edge::on_feedback(stage.gate(), stage.node()));
            edges.push(Edge::on_continue(stage.gate(), advance));
        }
        nodes.push(Node::terminal());

        Self::new(nodes, edges, WorkflowNode::GenerateAnalysts)
    }

    pub fn entry(&self) -> WorkflowNode {
        self.entry_node
    }

    pub fn node(&self, id: WorkflowNode) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn outgoing(&self, from: WorkflowNode) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter(move |e| e.from == from)
    }

    /// Follow the first outgoing edge whose condition holds.
    /// `None` when the node has no matching edge (e.g. `Terminal`).
    pub fn next(&self, from: WorkflowNode, state: &SessionState) -> Option<WorkflowNode> {
        let next = self
            .outgoing(from)
            .find(|e| e.condition.matches(state))
            .map(|e| e.to);
        debug!(from = %from, to = ?next.map(|n| n.as_str()), "Edge evaluated");
        next
    }

    fn validate(&self) -> Result<()> {
        let invalid = |msg: String| -> Result<()> {
            Err(ColloquyError::Configuration(format!(
                "Invalid workflow graph: {}",
                msg
            )))
        };

        if !self.nodes.contains_key(&self.entry_node) {
            return invalid(format!("entry node '{}' is not in the graph", self.entry_node));
        }

        for edge in &self.edges {
            for end in [edge.from, edge.to] {
                if !self.nodes.contains_key(&end) {
                    return invalid(format!("edge references unknown node '{}'", end));
                }
            }
        }

        for node in self.nodes.values() {
            let out: Vec<&Edge> = self.outgoing(node.id).collect();
            match node.kind {
                NodeKind::Stage(stage) => {
                    if out.len() != 1
                        || out[0].condition != EdgeCondition::Always
                        || out[0].to != stage.gate()
                    {
                        return invalid(format!(
                            "stage '{}' must have a single edge to '{}'",
                            node.id,
                            stage.gate()
                        ));
                    }
                }
                NodeKind::Gate(stage) => {
                    let incoming = self.edges.iter().filter(|e| e.to == node.id).count();
                    if incoming != 1 {
                        return invalid(format!(
                            "gate '{}' must have exactly one predecessor, found {}",
                            node.id, incoming
                        ));
                    }
                    let retries: Vec<&&Edge> = out
                        .iter()
                        .filter(|e| e.condition == EdgeCondition::OnFeedback)
                        .collect();
                    let advances = out
                        .iter()
                        .filter(|e| e.condition == EdgeCondition::OnContinue)
                        .count();
                    if retries.len() != 1 || advances != 1 || out.len() != 2 {
                        return invalid(format!(
                            "gate '{}' needs exactly one retry and one advance edge",
                            node.id
                        ));
                    }
                    if retries[0].to != stage.node() {
                        return invalid(format!(
                            "gate '{}' must retry '{}'",
                            node.id,
                            stage.node()
                        ));
                    }
                }
                NodeKind::Terminal => {
                    if !out.is_empty() {
                        return invalid("terminal node must have no outgoing edges".into());
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(feedback: Option<&str>) -> SessionState {
        let mut state = SessionState::new("topic", 2, vec![]);
        state.pending_feedback = feedback.map(str::to_string);
        state
    }

    #[test]
    fn research_graph_is_valid() {
        let graph = WorkflowGraph::research().unwrap();
        assert_eq!(graph.entry(), WorkflowNode::GenerateAnalysts);
        for node in WorkflowNode::ALL {
            assert!(graph.node(node).is_some(), "missing {}", node);
        }
    }

    #[test]
    fn walk_without_feedback_reaches_terminal() {
        let graph = WorkflowGraph::research().unwrap();
        let s = state(None);
        let mut node = graph.entry();
        let mut path = vec![node];
        while let Some(next) = graph.next(node, &s) {
            node = next;
            path.push(node);
        }
        assert_eq!(path, WorkflowNode::ALL.to_vec());
    }

    #[test]
    fn feedback_loops_back_from_every_gate() {
        let graph = WorkflowGraph::research().unwrap();
        let s = state(Some("again"));
        for stage in StageId::ALL {
            assert_eq!(graph.next(stage.gate(), &s), Some(stage.node()));
            assert_eq!(graph.next(stage.node(), &s), Some(stage.gate()));
        }
        assert_eq!(graph.next(WorkflowNode::Terminal, &s), None);
    }

    #[test]
    fn gate_without_retry_edge_is_rejected() {
        let nodes = vec![
            Node::stage(StageId::GenerateReport),
            Node::gate(StageId::GenerateReport),
            Node::terminal(),
        ];
        let edges = vec![
            Edge::always(WorkflowNode::GenerateReport, WorkflowNode::ReviewReport),
            Edge::on_continue(WorkflowNode::ReviewReport, WorkflowNode::Terminal),
        ];
        let err = WorkflowGraph::new(nodes, edges, WorkflowNode::GenerateReport).unwrap_err();
        assert!(matches!(err, ColloquyError::Configuration(_)));
    }

    #[test]
    fn retry_to_wrong_stage_is_rejected() {
        let nodes = vec![
            Node::stage(StageId::PlanResearch),
            Node::gate(StageId::PlanResearch),
            Node::stage(StageId::ConductInterviews),
            Node::gate(StageId::ConductInterviews),
            Node::terminal(),
        ];
        let edges = vec![
            Edge::always(WorkflowNode::PlanResearch, WorkflowNode::ReviewPlan),
            Edge::on_feedback(WorkflowNode::ReviewPlan, WorkflowNode::ConductInterviews),
            Edge::on_continue(WorkflowNode::ReviewPlan, WorkflowNode::ConductInterviews),
            Edge::always(WorkflowNode::ConductInterviews, WorkflowNode::ReviewInterviews),
            Edge::on_feedback(WorkflowNode::ReviewInterviews, WorkflowNode::ConductInterviews),
            Edge::on_continue(WorkflowNode::ReviewInterviews, WorkflowNode::Terminal),
        ];
        assert!(WorkflowGraph::new(nodes, edges, WorkflowNode::PlanResearch).is_err());
    }

    #[test]
    fn unknown_entry_is_rejected() {
        let err = WorkflowGraph::new(vec![Node::terminal()], vec![], WorkflowNode::GenerateAnalysts)
            .unwrap_err();
        assert!(err.to_string().contains("entry node"));
    }
}
