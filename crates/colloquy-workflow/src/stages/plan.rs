use tracing::{debug, info};

use colloquy_core::error::{ColloquyError, Result};
use colloquy_core::state::StageId;
use colloquy_core::traits::StructuredGenerator;
use colloquy_core::types::{OutputShape, Question};

use super::extractor::QuestionExtractor;
use super::{as_text, in_stage, prompts, PlanView};

const STAGE: StageId = StageId::PlanResearch;

/// Ask each analyst, in order, for research questions.
///
/// Replies without recognisable questions contribute nothing.
pub async fn plan_research(
    generator: &dyn StructuredGenerator,
    extractor: &dyn QuestionExtractor,
    view: PlanView<'_>,
    feedback: Option<&str>,
) -> Result<Vec<Question>> {
    if view.analysts.is_empty() {
        return Err(ColloquyError::generation(STAGE, "no analysts to plan for"));
    }

    let mut questions = Vec::new();
    for analyst in view.analysts {
        let system = prompts::plan_system(view.topic, analyst, feedback);
        let reply = generator
            .generate(&system, prompts::PLAN_USER, &OutputShape::Text)
            .await
            .map_err(in_stage(STAGE))?;

        let extracted = extractor.extract(&as_text(reply));
        debug!(analyst = %analyst.name, count = extracted.len(), "Questions extracted");

        questions.extend(extracted.into_iter().map(|text| Question {
            text,
            owning_analyst: analyst.reference(),
        }));
    }

    info!(count = questions.len(), "Research planned");
    Ok(questions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::HeuristicQuestionExtractor;
    use colloquy_test_utils::{analyst, ScriptedGenerator};

    #[tokio::test]
    async fn questions_belong_to_the_analyst_that_asked_them() {
        let generator = ScriptedGenerator::new();
        generator
            .push_text("Who benefits?\nWhat does it cost?\nHow soon?\nAnd later?")
            .push_text("Sorry, nothing to ask.");
        let analysts = vec![analyst("Ada"), analyst("Grace")];
        let view = PlanView {
            topic: "solar subsidies",
            analysts: &analysts,
        };

        let questions = plan_research(
            &generator,
            &HeuristicQuestionExtractor::default(),
            view,
            None,
        )
        .await
        .unwrap();

        assert_eq!(questions.len(), 3);
        assert!(questions.iter().all(|q| q.owning_analyst.name() == "Ada"));
        assert!(questions
            .iter()
            .all(|q| q.owning_analyst.resolve(&analysts).is_some()));
        assert_eq!(generator.calls_for("text").len(), 2);
    }

    #[tokio::test]
    async fn feedback_reaches_every_prompt() {
        let generator = ScriptedGenerator::new().with_default_text("Why?");
        let analysts = vec![analyst("Ada"), analyst("Grace")];
        let view = PlanView {
            topic: "t",
            analysts: &analysts,
        };
        plan_research(
            &generator,
            &HeuristicQuestionExtractor::default(),
            view,
            Some("ask about storage"),
        )
        .await
        .unwrap();
        assert!(generator
            .calls()
            .iter()
            .all(|c| c.system.contains("ask about storage")));
    }

    #[tokio::test]
    async fn no_analysts_is_an_error() {
        let generator = ScriptedGenerator::new();
        let view = PlanView {
            topic: "t",
            analysts: &[],
        };
        let err = plan_research(&generator, &HeuristicQuestionExtractor::default(), view, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ColloquyError::Generation { stage: StageId::PlanResearch, .. }
        ));
    }
}
