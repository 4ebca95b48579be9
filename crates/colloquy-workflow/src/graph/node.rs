use serde::{Deserialize, Serialize};

use colloquy_core::state::{StageId, WorkflowNode};

/// What a node does when the engine reaches it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "stage", rename_all = "snake_case")]
pub enum NodeKind {
    /// Runs a stage function and commits its update.
    Stage(StageId),
    /// Suspends for human review of the given stage's output.
    Gate(StageId),
    /// End of the workflow.
    Terminal,
}

/// A node in the workflow graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Unique identifier for this node.
    pub id: WorkflowNode,
    /// Human-readable name.
    pub name: String,
    pub kind: NodeKind,
}

impl Node {
    /// Node that runs `stage`.
    pub fn stage(stage: StageId) -> Self {
        Self {
            id: stage.node(),
            name: title_case(stage.as_str()),
            kind: NodeKind::Stage(stage),
        }
    }

    /// Review gate placed after `stage`.
    pub fn gate(stage: StageId) -> Self {
        let id = stage.gate();
        Self {
            id,
            name: title_case(id.as_str()),
            kind: NodeKind::Gate(stage),
        }
    }

    pub fn terminal() -> Self {
        Self {
            id: WorkflowNode::Terminal,
            name: "Terminal".to_string(),
            kind: NodeKind::Terminal,
        }
    }
}

fn title_case(snake: &str) -> String {
    snake
        .split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}
