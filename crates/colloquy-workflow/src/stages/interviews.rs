use futures::future::join_all;
use tracing::{debug, info, warn};

use colloquy_core::error::{ColloquyError, Result};
use colloquy_core::state::StageId;
use colloquy_core::traits::StructuredGenerator;
use colloquy_core::types::{Analyst, Interview, OutputShape, SourceConfig};
use colloquy_tools::ToolRegistry;

use super::{as_text, in_stage, prompts, InterviewView};

const STAGE: StageId = StageId::ConductInterviews;

/// Query every enabled source for one question and fold the results, in
/// source order, into a single research context. Tool failures become part
/// of the text instead of failing the stage.
pub async fn gather_research(tools: &ToolRegistry, sources: &[&SourceConfig], query: &str) -> String {
    let searches = sources.iter().map(|source| tools.search(&source.name, query));
    let results = join_all(searches).await;

    let mut context = String::new();
    for (source, result) in sources.iter().zip(results) {
        match result {
            Ok(text) => {
                context.push_str(&format!("\n\nResults from {}:\n{}\n", source.name, text));
            }
            Err(e) => {
                warn!(tool = %source.name, error = %e, "Research tool failed");
                context.push_str(&format!("\n\nError using {}: {}\n", source.name, e));
            }
        }
    }
    context
}

async fn interview_analyst(
    generator: &dyn StructuredGenerator,
    tools: &ToolRegistry,
    view: &InterviewView<'_>,
    analyst: &Analyst,
    questions: Vec<String>,
    feedback: Option<&str>,
) -> Result<Interview> {
    let mut interview = Interview::new(analyst.reference(), questions.clone());

    for question in &questions {
        let query = format!("{} {}", view.topic, question);
        let research = gather_research(tools, &view.sources, &query).await;

        let system = prompts::expert_system(view.topic, analyst, question, feedback);
        let user = prompts::answer_user(question, &research);
        let answer = as_text(
            generator
                .generate(&system, &user, &OutputShape::Text)
                .await
                .map_err(in_stage(STAGE))?,
        );

        if answer.trim().is_empty() {
            return Err(ColloquyError::generation(
                STAGE,
                format!("empty answer for question '{}'", question),
            ));
        }
        interview.record_answer(answer);
    }

    debug!(analyst = %analyst.name, answered = interview.answers().len(), "Interview complete");
    Ok(interview)
}

/// Interview each analyst that owns at least one question.
pub async fn conduct_interviews(
    generator: &dyn StructuredGenerator,
    tools: &ToolRegistry,
    view: InterviewView<'_>,
    feedback: Option<&str>,
) -> Result<Vec<Interview>> {
    if view.analysts.is_empty() {
        return Err(ColloquyError::generation(STAGE, "no analysts to interview"));
    }
    if view.questions.is_empty() {
        return Err(ColloquyError::generation(STAGE, "no research questions"));
    }

    let mut interviews = Vec::new();
    for analyst in view.analysts {
        let owned: Vec<String> = view
            .questions
            .iter()
            .filter(|q| q.owning_analyst.name() == analyst.name)
            .map(|q| q.text.clone())
            .collect();
        if owned.is_empty() {
            continue;
        }

        interviews.push(
            interview_analyst(generator, tools, &view, analyst, owned, feedback).await?,
        );
    }

    info!(count = interviews.len(), "Interviews conducted");
    Ok(interviews)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    use colloquy_core::types::Question;
    use colloquy_test_utils::{analyst, sources, FailingTool, ScriptedGenerator, StaticTool};

    fn question(text: &str, owner: &str) -> Question {
        Question {
            text: text.into(),
            owning_analyst: analyst(owner).reference(),
        }
    }

    #[tokio::test]
    async fn tool_errors_are_folded_into_the_context() {
        let mut tools = ToolRegistry::new();
        tools.register(StaticTool::new("web", "solar is cheap"));
        tools.register(FailingTool::new("wiki", "rate limited"));
        let configured = sources(&[("web", true), ("wiki", true)]);
        let enabled: Vec<&SourceConfig> = configured.iter().collect();

        let context = gather_research(&tools, &enabled, "energy Who pays?").await;
        assert_eq!(
            context,
            "\n\nResults from web:\nsolar is cheap\n\n\nError using wiki: Tool execution failed: wiki: rate limited\n"
        );
    }

    #[tokio::test]
    async fn interviews_follow_analyst_and_plan_order() {
        let mut tools = ToolRegistry::new();
        let web = std::sync::Arc::new(StaticTool::new("web", "data"));
        tools.register_arc(web.clone());
        let generator = ScriptedGenerator::new().with_default_text("An answer.");

        let analysts = vec![analyst("Ada"), analyst("Grace"), analyst("Idle")];
        let questions = vec![
            question("Q1?", "Grace"),
            question("Q2?", "Ada"),
            question("Q3?", "Grace"),
        ];
        let configured = sources(&[("web", true), ("wiki", false)]);
        let view = InterviewView {
            topic: "energy",
            analysts: &analysts,
            questions: &questions,
            sources: configured.iter().filter(|s| s.enabled).collect(),
        };

        let interviews = conduct_interviews(&generator, &tools, view, None).await.unwrap();

        assert_eq!(interviews.len(), 2);
        assert_eq!(interviews[0].analyst().name(), "Ada");
        assert_eq!(interviews[1].analyst().name(), "Grace");
        assert_eq!(interviews[1].questions(), &["Q1?".to_string(), "Q3?".to_string()]);
        assert!(interviews.iter().all(|i| i.is_complete()));
        assert_eq!(web.queries(), vec!["energy Q2?", "energy Q1?", "energy Q3?"]);
    }

    #[tokio::test]
    async fn tools_for_one_question_run_concurrently() {
        let mut tools = ToolRegistry::new();
        tools.register(StaticTool::new("a", "A").with_delay(Duration::from_millis(200)));
        tools.register(StaticTool::new("b", "B").with_delay(Duration::from_millis(200)));
        let configured = sources(&[("a", true), ("b", true)]);
        let enabled: Vec<&SourceConfig> = configured.iter().collect();

        let start = Instant::now();
        let context = gather_research(&tools, &enabled, "q").await;
        assert!(start.elapsed() < Duration::from_millis(390));
        assert!(context.find("Results from a").unwrap() < context.find("Results from b").unwrap());
    }

    #[tokio::test]
    async fn empty_answer_fails_the_stage() {
        let mut tools = ToolRegistry::new();
        tools.register(StaticTool::new("web", "data"));
        let generator = ScriptedGenerator::new().with_default_text("  ");
        let analysts = vec![analyst("Ada")];
        let questions = vec![question("Why?", "Ada")];
        let configured = sources(&[("web", true)]);
        let view = InterviewView {
            topic: "t",
            analysts: &analysts,
            questions: &questions,
            sources: configured.iter().collect(),
        };
        let err = conduct_interviews(&generator, &tools, view, None).await.unwrap_err();
        assert!(matches!(
            err,
            ColloquyError::Generation { stage: StageId::ConductInterviews, .. }
        ));
    }

    #[tokio::test]
    async fn missing_questions_is_an_error() {
        let tools = ToolRegistry::new();
        let generator = ScriptedGenerator::new();
        let analysts = vec![analyst("Ada")];
        let view = InterviewView {
            topic: "t",
            analysts: &analysts,
            questions: &[],
            sources: vec![],
        };
        assert!(conduct_interviews(&generator, &tools, view, None).await.is_err());
    }
}
