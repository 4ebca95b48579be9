//! Workflow graph: the research state machine as nodes and conditional edges.
//!
//! Each stage node has one `Always` edge to its review gate. Each gate has an
//! `OnFeedback` edge back to the stage it reviews and an `OnContinue` edge to
//! the next stage (or `Terminal`). Walking an edge evaluates its condition
//! against the session state; the first matching edge wins.

pub mod edge;
pub mod node;
pub mod workflow;

pub use edge::{Edge, EdgeCondition};
pub use node::{Node, NodeKind};
pub use workflow::WorkflowGraph;
