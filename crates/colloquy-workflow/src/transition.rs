//! Transition policy: where a review gate routes the session next.

use colloquy_core::state::{SessionState, StageId, WorkflowNode};

/// Decision taken at a review gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Re-run the stage the gate reviews, with the pending feedback.
    Retry(StageId),
    /// Move on to the next stage, or to `Terminal` when `None`.
    Advance(Option<StageId>),
}

impl Route {
    /// The node this route leads to.
    pub fn target(&self) -> WorkflowNode {
        match self {
            Self::Retry(stage) => stage.node(),
            Self::Advance(Some(stage)) => stage.node(),
            Self::Advance(None) => WorkflowNode::Terminal,
        }
    }
}

/// Whether the reviewer left feedback that should trigger a retry.
pub fn feedback_pending(state: &SessionState) -> bool {
    state.feedback().is_some()
}

/// Route from `gate`. Returns `None` when `gate` is not a review gate.
pub fn decide(gate: WorkflowNode, state: &SessionState) -> Option<Route> {
    let reviewed = gate.reviewed_stage()?;
    if feedback_pending(state) {
        Some(Route::Retry(reviewed))
    } else {
        Some(Route::Advance(reviewed.next()))
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
    fn feedback_retries_the_reviewed_stage() {
        for stage in StageId::ALL {
            let route = decide(stage.gate(), &state(Some("focus on solar only"))).unwrap();
            assert_eq!(route, Route::Retry(stage));
            assert_eq!(route.target(), stage.node());
        }
    }

    #[test]
    fn no_feedback_advances_in_canonical_order() {
        let s = state(None);
        assert_eq!(
            decide(WorkflowNode::ReviewAnalysts, &s),
            Some(Route::Advance(Some(StageId::PlanResearch)))
        );
        assert_eq!(
            decide(WorkflowNode::ReviewPlan, &s),
            Some(Route::Advance(Some(StageId::ConductInterviews)))
        );
        assert_eq!(
            decide(WorkflowNode::ReviewInterviews, &s),
            Some(Route::Advance(Some(StageId::GenerateReport)))
        );
        let last = decide(WorkflowNode::ReviewReport, &s).unwrap();
        assert_eq!(last, Route::Advance(None));
        assert_eq!(last.target(), WorkflowNode::Terminal);
    }

    #[test]
    fn whitespace_feedback_counts_as_none() {
        assert_eq!(
            decide(WorkflowNode::ReviewPlan, &state(Some(" \t "))),
            Some(Route::Advance(Some(StageId::ConductInterviews)))
        );
    }

    #[test]
    fn routes_follow_the_declared_gate_edges() {
        let graph = crate::graph::WorkflowGraph::research().unwrap();
        for stage in StageId::ALL {
            for feedback in [None, Some("narrow the scope")] {
                let s = state(feedback);
                let route = decide(stage.gate(), &s).unwrap();
                assert_eq!(Some(route.target()), graph.next(stage.gate(), &s));
            }
        }
    }

    #[test]
    fn non_gates_have_no_route() {
        let s = state(Some("x"));
        assert_eq!(decide(WorkflowNode::GenerateAnalysts, &s), None);
        assert_eq!(decide(WorkflowNode::Terminal, &s), None);
    }
}
