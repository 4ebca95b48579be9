use serde::{Deserialize, Serialize};

use colloquy_core::state::{SessionState, WorkflowNode};

use crate::transition::feedback_pending;

/// An edge connecting two nodes in the workflow graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    /// Source node.
    pub from: WorkflowNode,
    /// Target node.
    pub to: WorkflowNode,
    /// Condition that must be true to traverse this edge.
    #[serde(default)]
    pub condition: EdgeCondition,
}

/// Condition for traversing an edge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeCondition {
    /// Always traverse this edge.
    #[default]
    Always,
    /// Traverse when the reviewer left non-blank feedback.
    OnFeedback,
    /// Traverse when there is no feedback to act on.
    OnContinue,
}

impl EdgeCondition {
    /// Evaluate the condition against the session state.
    pub fn matches(&self, state: &SessionState) -> bool {
        match self {
            Self::Always => true,
            Self::OnFeedback => feedback_pending(state),
            Self::OnContinue => !feedback_pending(state),
        }
    }
}

impl Edge {
    /// Create an unconditional edge.
    pub fn always(from: WorkflowNode, to: WorkflowNode) -> Self {
        Self {
            from,
            to,
            condition: EdgeCondition::Always,
        }
    }

    /// Create an edge that fires when feedback is pending.
    pub fn on_feedback(from: WorkflowNode, to: WorkflowNode) -> Self {
        Self {
            from,
            to,
            condition: EdgeCondition::OnFeedback,
        }
    }

    /// Create an edge that fires when no feedback is pending.
    pub fn on_continue(from: WorkflowNode, to: WorkflowNode) -> Self {
        Self {
            from,
            to,
            condition: EdgeCondition::OnContinue,
        }
    }
}
