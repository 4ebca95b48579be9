//! Typed session state and the research state machine's vocabulary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ColloquyError, Result};
use crate::types::{Analyst, Interview, Question, Report, SessionId, SourceConfig};

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// One unit of generation work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    GenerateAnalysts,
    PlanResearch,
    ConductInterviews,
    GenerateReport,
}

impl StageId {
    /// Canonical execution order.
    pub const ALL: [StageId; 4] = [
        StageId::GenerateAnalysts,
        StageId::PlanResearch,
        StageId::ConductInterviews,
        StageId::GenerateReport,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GenerateAnalysts => "generate_analysts",
            Self::PlanResearch => "plan_research",
            Self::ConductInterviews => "conduct_interviews",
            Self::GenerateReport => "generate_report",
        }
    }

    /// The stage after this one, or `None` after the report.
    pub fn next(&self) -> Option<StageId> {
        match self {
            Self::GenerateAnalysts => Some(Self::PlanResearch),
            Self::PlanResearch => Some(Self::ConductInterviews),
            Self::ConductInterviews => Some(Self::GenerateReport),
            Self::GenerateReport => None,
        }
    }

    /// The graph node that runs this stage.
    pub fn node(&self) -> WorkflowNode {
        match self {
            Self::GenerateAnalysts => WorkflowNode::GenerateAnalysts,
            Self::PlanResearch => WorkflowNode::PlanResearch,
            Self::ConductInterviews => WorkflowNode::ConductInterviews,
            Self::GenerateReport => WorkflowNode::GenerateReport,
        }
    }

    /// The review gate placed after this stage.
    pub fn gate(&self) -> WorkflowNode {
        match self {
            Self::GenerateAnalysts => WorkflowNode::ReviewAnalysts,
            Self::PlanResearch => WorkflowNode::ReviewPlan,
            Self::ConductInterviews => WorkflowNode::ReviewInterviews,
            Self::GenerateReport => WorkflowNode::ReviewReport,
        }
    }
}

impl std::fmt::Display for StageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A state of the research state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowNode {
    GenerateAnalysts,
    ReviewAnalysts,
    PlanResearch,
    ReviewPlan,
    ConductInterviews,
    ReviewInterviews,
    GenerateReport,
    ReviewReport,
    Terminal,
}

impl WorkflowNode {
    pub const ALL: [WorkflowNode; 9] = [
        WorkflowNode::GenerateAnalysts,
        WorkflowNode::ReviewAnalysts,
        WorkflowNode::PlanResearch,
        WorkflowNode::ReviewPlan,
        WorkflowNode::ConductInterviews,
        WorkflowNode::ReviewInterviews,
        WorkflowNode::GenerateReport,
        WorkflowNode::ReviewReport,
        WorkflowNode::Terminal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GenerateAnalysts => "generate_analysts",
            Self::ReviewAnalysts => "review_analysts",
            Self::PlanResearch => "plan_research",
            Self::ReviewPlan => "review_plan",
            Self::ConductInterviews => "conduct_interviews",
            Self::ReviewInterviews => "review_interviews",
            Self::GenerateReport => "generate_report",
            Self::ReviewReport => "review_report",
            Self::Terminal => "terminal",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|n| n.as_str() == s)
    }

    /// The stage this node runs, if it is a stage node.
    pub fn stage(&self) -> Option<StageId> {
        match self {
            Self::GenerateAnalysts => Some(StageId::GenerateAnalysts),
            Self::PlanResearch => Some(StageId::PlanResearch),
            Self::ConductInterviews => Some(StageId::ConductInterviews),
            Self::GenerateReport => Some(StageId::GenerateReport),
            _ => None,
        }
    }

    /// The stage whose output this gate reviews, if it is a gate.
    pub fn reviewed_stage(&self) -> Option<StageId> {
        match self {
            Self::ReviewAnalysts => Some(StageId::GenerateAnalysts),
            Self::ReviewPlan => Some(StageId::PlanResearch),
            Self::ReviewInterviews => Some(StageId::ConductInterviews),
            Self::ReviewReport => Some(StageId::GenerateReport),
            _ => None,
        }
    }

    pub fn is_gate(&self) -> bool {
        self.reviewed_stage().is_some()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminal)
    }
}

impl std::fmt::Display for WorkflowNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stage's proposed change to the session state.
#[derive(Debug, Clone, PartialEq)]
pub enum StageUpdate {
    Analysts(Vec<Analyst>),
    ResearchQuestions(Vec<Question>),
    Interviews(Vec<Interview>),
    Report(Report),
}

impl StageUpdate {
    pub fn stage(&self) -> StageId {
        match self {
            Self::Analysts(_) => StageId::GenerateAnalysts,
            Self::ResearchQuestions(_) => StageId::PlanResearch,
            Self::Interviews(_) => StageId::ConductInterviews,
            Self::Report(_) => StageId::GenerateReport,
        }
    }
}

/// The record threaded through the engine for one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub topic: String,
    pub max_participants: usize,
    #[serde(default)]
    pub analysts: Vec<Analyst>,
    #[serde(default)]
    pub research_questions: Vec<Question>,
    #[serde(default)]
    pub interviews: Vec<Interview>,
    #[serde(default)]
    pub report: Option<Report>,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
    #[serde(default)]
    pub pending_feedback: Option<String>,
    pub position: WorkflowNode,
}

impl SessionState {
    /// Fresh state positioned at the first stage.
    pub fn new(topic: impl Into<String>, max_participants: usize, sources: Vec<SourceConfig>) -> Self {
        Self {
            topic: topic.into(),
            max_participants,
            analysts: Vec::new(),
            research_questions: Vec::new(),
            interviews: Vec::new(),
            report: None,
            sources,
            pending_feedback: None,
            position: WorkflowNode::GenerateAnalysts,
        }
    }

    /// The stage that is about to run or whose output is under review.
    /// `None` once the session is terminal.
    pub fn current_stage(&self) -> Option<StageId> {
        self.position.stage().or_else(|| self.position.reviewed_stage())
    }

    /// Pending feedback, trimmed; `None` when absent or blank.
    pub fn feedback(&self) -> Option<&str> {
        self.pending_feedback
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty())
    }

    pub fn enabled_sources(&self) -> impl Iterator<Item = &SourceConfig> {
        self.sources.iter().filter(|s| s.enabled)
    }

    pub fn is_terminal(&self) -> bool {
        self.position.is_terminal()
    }

    /// Commit a stage update, replacing the stage's output wholesale and
    /// clearing every downstream product that referenced the old output.
    pub fn apply(&mut self, update: StageUpdate) {
        match update {
            StageUpdate::Analysts(analysts) => {
                self.analysts = analysts;
                self.research_questions.clear();
                self.interviews.clear();
                self.report = None;
            }
            StageUpdate::ResearchQuestions(questions) => {
                self.research_questions = questions;
                self.interviews.clear();
                self.report = None;
            }
            StageUpdate::Interviews(interviews) => {
                self.interviews = interviews;
                self.report = None;
            }
            StageUpdate::Report(report) => {
                self.report = Some(report);
            }
        }
    }
}

/// Versioned, serializable record of a session at a suspension boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub version: u32,
    pub session_id: SessionId,
    pub state: SessionState,
    pub updated_at: DateTime<Utc>,
}

impl SessionSnapshot {
    pub fn capture(session_id: &SessionId, state: &SessionState) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            session_id: session_id.clone(),
            state: state.clone(),
            updated_at: Utc::now(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a snapshot, rejecting unknown format versions.
    pub fn from_json(json: &str) -> Result<Self> {
        let snapshot: Self = serde_json::from_str(json)
            .map_err(|e| ColloquyError::Persistence(format!("Malformed snapshot: {}", e)))?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(ColloquyError::Persistence(format!(
                "Unsupported snapshot version {} (expected {})",
                snapshot.version, SNAPSHOT_VERSION
            )));
        }
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AnalystRef;

    fn analyst(name: &str) -> Analyst {
        Analyst {
            name: name.into(),
            affiliation: "Lab".into(),
            role: "Engineer".into(),
            description: "Builds things".into(),
        }
    }

    fn populated_state() -> SessionState {
        let mut state = SessionState::new("grid storage", 2, vec![]);
        state.apply(StageUpdate::Analysts(vec![analyst("Ada")]));
        state.apply(StageUpdate::ResearchQuestions(vec![Question {
            text: "How cheap can batteries get?".into(),
            owning_analyst: AnalystRef("Ada".into()),
        }]));
        state.apply(StageUpdate::Interviews(vec![Interview::new(
            AnalystRef("Ada".into()),
            vec!["How cheap can batteries get?".into()],
        )]));
        state.apply(StageUpdate::Report(Report {
            title: "Storage".into(),
            summary: "Cheap".into(),
            sections: vec![],
            conclusion: "Build".into(),
            sources: vec![],
        }));
        state
    }

    #[test]
    fn stage_order_ends_at_report() {
        let mut order = vec![StageId::GenerateAnalysts];
        while let Some(next) = order.last().and_then(StageId::next) {
            order.push(next);
        }
        assert_eq!(order, StageId::ALL.to_vec());
    }

    #[test]
    fn gates_review_their_stage() {
        for stage in StageId::ALL {
            assert_eq!(stage.gate().reviewed_stage(), Some(stage));
            assert_eq!(stage.node().stage(), Some(stage));
            assert!(stage.gate().is_gate());
            assert!(!stage.node().is_gate());
        }
        assert!(!WorkflowNode::Terminal.is_gate());
    }

    #[test]
    fn node_names_round_trip() {
        for node in WorkflowNode::ALL {
            assert_eq!(WorkflowNode::parse(node.as_str()), Some(node));
        }
        assert_eq!(WorkflowNode::parse("nowhere"), None);
    }

    #[test]
    fn current_stage_follows_position() {
        let mut state = SessionState::new("t", 1, vec![]);
        assert_eq!(state.current_stage(), Some(StageId::GenerateAnalysts));
        state.position = WorkflowNode::ReviewPlan;
        assert_eq!(state.current_stage(), Some(StageId::PlanResearch));
        state.position = WorkflowNode::Terminal;
        assert_eq!(state.current_stage(), None);
    }

    #[test]
    fn blank_feedback_is_no_feedback() {
        let mut state = SessionState::new("t", 1, vec![]);
        state.pending_feedback = Some("   ".into());
        assert_eq!(state.feedback(), None);
        state.pending_feedback = Some("  more solar ".into());
        assert_eq!(state.feedback(), Some("more solar"));
    }

    #[test]
    fn regenerating_analysts_clears_downstream() {
        let mut state = populated_state();
        state.apply(StageUpdate::Analysts(vec![analyst("Grace")]));
        assert_eq!(state.analysts.len(), 1);
        assert!(state.research_questions.is_empty());
        assert!(state.interviews.is_empty());
        assert!(state.report.is_none());
    }

    #[test]
    fn replanning_keeps_analysts() {
        let mut state = populated_state();
        state.apply(StageUpdate::ResearchQuestions(vec![]));
        assert_eq!(state.analysts.len(), 1);
        assert!(state.interviews.is_empty());
        assert!(state.report.is_none());
    }

    #[test]
    fn report_regeneration_keeps_interviews() {
        let mut state = populated_state();
        let report = state.report.clone().unwrap();
        state.apply(StageUpdate::Report(report));
        assert_eq!(state.interviews.len(), 1);
    }

    #[test]
    fn snapshot_round_trip() {
        let state = populated_state();
        let id = SessionId::from_str("sess-1");
        let json = SessionSnapshot::capture(&id, &state).to_json().unwrap();
        let restored = SessionSnapshot::from_json(&json).unwrap();
        assert_eq!(restored.session_id, id);
        assert_eq!(restored.state, state);
    }

    #[test]
    fn snapshot_rejects_unknown_version() {
        let state = SessionState::new("t", 1, vec![]);
        let mut snapshot = SessionSnapshot::capture(&SessionId::new(), &state);
        snapshot.version = 99;
        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(matches!(
            SessionSnapshot::from_json(&json),
            Err(ColloquyError::Persistence(_))
        ));
    }
}
