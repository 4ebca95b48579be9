//! Stage functions. Each reads a typed view of the session state and returns
//! a proposed update; none of them mutate the state.

pub mod analysts;
pub mod extractor;
pub mod interviews;
pub mod plan;
pub mod prompts;
pub mod report;

use std::sync::Arc;
use std::time::Duration;

use tracing::error;

use colloquy_core::error::{ColloquyError, Result};
use colloquy_core::state::{SessionState, StageId, StageUpdate};
use colloquy_core::traits::StructuredGenerator;
use colloquy_core::types::{Analyst, Interview, Question, SourceConfig};
use colloquy_tools::ToolRegistry;

pub use extractor::{HeuristicQuestionExtractor, QuestionExtractor};

/// Input to GenerateAnalysts.
#[derive(Debug, Clone, Copy)]
pub struct AnalystsView<'a> {
    pub topic: &'a str,
    pub max_participants: usize,
}

/// Input to PlanResearch.
#[derive(Debug, Clone, Copy)]
pub struct PlanView<'a> {
    pub topic: &'a str,
    pub analysts: &'a [Analyst],
}

/// Input to ConductInterviews.
#[derive(Debug, Clone)]
pub struct InterviewView<'a> {
    pub topic: &'a str,
    pub analysts: &'a [Analyst],
    pub questions: &'a [Question],
    pub sources: Vec<&'a SourceConfig>,
}

/// Input to GenerateReport.
#[derive(Debug, Clone, Copy)]
pub struct ReportView<'a> {
    pub topic: &'a str,
    pub analysts: &'a [Analyst],
    pub interviews: &'a [Interview],
}

impl<'a> AnalystsView<'a> {
    pub fn of(state: &'a SessionState) -> Self {
        Self {
            topic: &state.topic,
            max_participants: state.max_participants,
        }
    }
}

impl<'a> PlanView<'a> {
    pub fn of(state: &'a SessionState) -> Self {
        Self {
            topic: &state.topic,
            analysts: &state.analysts,
        }
    }
}

impl<'a> InterviewView<'a> {
    pub fn of(state: &'a SessionState) -> Self {
        Self {
            topic: &state.topic,
            analysts: &state.analysts,
            questions: &state.research_questions,
            sources: state.enabled_sources().collect(),
        }
    }
}

impl<'a> ReportView<'a> {
    pub fn of(state: &'a SessionState) -> Self {
        Self {
            topic: &state.topic,
            analysts: &state.analysts,
            interviews: &state.interviews,
        }
    }
}

/// Attribute a collaborator failure to the stage that hit it.
pub(crate) fn in_stage(stage: StageId) -> impl Fn(ColloquyError) -> ColloquyError {
    move |e| match e {
        ColloquyError::Generation { .. } => e,
        other => ColloquyError::generation(stage, other.to_string()),
    }
}

/// Read a text-shaped generator value.
pub(crate) fn as_text(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Default upper bound on one stage run.
pub const DEFAULT_STAGE_TIMEOUT: Duration = Duration::from_secs(600);

/// Runs stage functions against their collaborators.
#[derive(Clone)]
pub struct StageRunner {
    generator: Arc<dyn StructuredGenerator>,
    tools: Arc<ToolRegistry>,
    extractor: Arc<dyn QuestionExtractor>,
    stage_timeout: Duration,
}

impl StageRunner {
    pub fn new(generator: Arc<dyn StructuredGenerator>, tools: Arc<ToolRegistry>) -> Self {
        Self {
            generator,
            tools,
            extractor: Arc::new(HeuristicQuestionExtractor::default()),
            stage_timeout: DEFAULT_STAGE_TIMEOUT,
        }
    }

    pub fn with_stage_timeout(mut self, timeout: Duration) -> Self {
        self.stage_timeout = timeout;
        self
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn QuestionExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Run `stage` against `state`, passing along any pending feedback.
    ///
    /// A run that outlives the stage timeout is abandoned with a
    /// `Generation` error.
    pub async fn run(&self, stage: StageId, state: &SessionState) -> Result<StageUpdate> {
        match tokio::time::timeout(self.stage_timeout, self.run_stage(stage, state)).await {
            Ok(result) => result,
            Err(_) => {
                let secs = self.stage_timeout.as_secs();
                error!(stage = %stage, timeout_secs = secs, "Stage timed out");
                Err(ColloquyError::generation(
                    stage,
                    format!("timed out after {}s", secs),
                ))
            }
        }
    }

    async fn run_stage(&self, stage: StageId, state: &SessionState) -> Result<StageUpdate> {
        let feedback = state.feedback();
        let generator = self.generator.as_ref();

        let update = match stage {
            StageId::GenerateAnalysts => StageUpdate::Analysts(
                analysts::generate_analysts(generator, AnalystsView::of(state), feedback).await?,
            ),
            StageId::PlanResearch => StageUpdate::ResearchQuestions(
                plan::plan_research(
                    generator,
                    self.extractor.as_ref(),
                    PlanView::of(state),
                    feedback,
                )
                .await?,
            ),
            StageId::ConductInterviews => StageUpdate::Interviews(
                interviews::conduct_interviews(
                    generator,
                    &self.tools,
                    InterviewView::of(state),
                    feedback,
                )
                .await?,
            ),
            StageId::GenerateReport => StageUpdate::Report(
                report::generate_report(generator, ReportView::of(state), feedback).await?,
            ),
        };
        Ok(update)
    }
}
