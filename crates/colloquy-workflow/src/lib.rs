pub mod engine;
pub mod gate;
pub mod graph;
pub mod session;
pub mod stages;
pub mod transition;

pub use engine::{SessionHandle, WorkflowEngine};
pub use gate::{review_prompt, review_summary};
pub use graph::{Edge, EdgeCondition, Node, NodeKind, WorkflowGraph};
pub use session::SessionTable;
pub use stages::{HeuristicQuestionExtractor, QuestionExtractor, StageRunner};
pub use transition::Route;
