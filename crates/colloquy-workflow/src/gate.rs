//! Review gates. A gate computes nothing: the engine suspends there and the
//! reviewer either continues or leaves feedback. This module renders what a
//! reviewer looks at while a session rests at a gate.

use std::fmt::Write;

use colloquy_core::state::{SessionState, StageId, WorkflowNode};

/// Prompt shown to the reviewer at `gate`.
pub fn review_prompt(gate: WorkflowNode) -> Option<&'static str> {
    let text = match gate.reviewed_stage()? {
        StageId::GenerateAnalysts => "Review the analysts. Leave feedback to regenerate them, or continue to plan research.",
        StageId::PlanResearch => "Review the research plan. Leave feedback to replan, or continue to the interviews.",
        StageId::ConductInterviews => "Review the interviews. Leave feedback to rerun them, or continue to the report.",
        StageId::GenerateReport => "Review the report. Leave feedback to rewrite it, or continue to finish.",
    };
    Some(text)
}

/// Render the output under review at the session's current gate.
///
/// At `Terminal` this is the final report; at a stage node it is empty.
pub fn review_summary(state: &SessionState) -> String {
    let mut out = String::new();
    let stage = match state.position {
        WorkflowNode::Terminal => Some(StageId::GenerateReport),
        node => node.reviewed_stage(),
    };

    match stage {
        Some(StageId::GenerateAnalysts) => {
            for (i, analyst) in state.analysts.iter().enumerate() {
                let _ = writeln!(out, "{}. {}", i + 1, analyst.persona().trim_end().replace('\n', "\n   "));
            }
        }
        Some(StageId::PlanResearch) => {
            for analyst in &state.analysts {
                let _ = writeln!(out, "{} ({})", analyst.name, analyst.role);
                let owned = state
                    .research_questions
                    .iter()
                    .filter(|q| q.owning_analyst.name() == analyst.name);
                let mut any = false;
                for question in owned {
                    any = true;
                    let _ = writeln!(out, "  - {}", question.text);
                }
                if !any {
                    let _ = writeln!(out, "  (no questions)");
                }
            }
        }
        Some(StageId::ConductInterviews) => {
            let transcripts: Vec<String> = state
                .interviews
                .iter()
                .map(|i| i.transcript(i.analyst().resolve(&state.analysts)))
                .collect();
            out.push_str(&transcripts.join("\n\n"));
        }
        Some(StageId::GenerateReport) => {
            if let Some(report) = &state.report {
                out.push_str(&report.to_markdown());
            }
        }
        None => {}
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use colloquy_test_utils::{analyst, sample_report, sample_state};

    #[test]
    fn every_gate_has_a_prompt() {
        for stage in StageId::ALL {
            assert!(review_prompt(stage.gate()).is_some());
        }
        assert!(review_prompt(WorkflowNode::PlanResearch).is_none());
    }

    #[test]
    fn analysts_are_numbered() {
        let mut state = sample_state();
        state.position = WorkflowNode::ReviewAnalysts;
        let text = review_summary(&state);
        assert!(text.starts_with("1. Name: Ada\n   Role: Researcher"));
        assert!(text.contains("2. Name: Grace"));
    }

    #[test]
    fn plan_groups_questions_by_analyst() {
        let mut state = sample_state();
        state.analysts.push(analyst("Quiet"));
        state.position = WorkflowNode::ReviewPlan;
        let text = review_summary(&state);
        assert!(text.contains("Ada (Researcher)\n  - What does Ada think?"));
        assert!(text.contains("Quiet (Researcher)\n  (no questions)"));
    }

    #[test]
    fn interviews_show_transcripts() {
        let text = review_summary(&sample_state());
        assert!(text.starts_with("Interview with Ada (Researcher)"));
        assert!(text.contains("A: An informed answer."));
    }

    #[test]
    fn terminal_shows_the_report() {
        let mut state = sample_state();
        state.report = Some(sample_report());
        state.position = WorkflowNode::Terminal;
        assert!(review_summary(&state).starts_with("# Energy"));
    }
}
