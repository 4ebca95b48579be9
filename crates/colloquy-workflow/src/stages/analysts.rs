use std::collections::HashSet;

use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use colloquy_core::error::{ColloquyError, Result};
use colloquy_core::state::StageId;
use colloquy_core::traits::StructuredGenerator;
use colloquy_core::types::{Analyst, OutputShape};

use super::{in_stage, prompts, AnalystsView};

const STAGE: StageId = StageId::GenerateAnalysts;

#[derive(Deserialize)]
struct Perspectives {
    analysts: Vec<Analyst>,
}

/// Output shape requested from the generator.
pub fn analysts_shape() -> OutputShape {
    OutputShape::json(
        "analysts",
        json!({
            "type": "object",
            "properties": {
                "analysts": {
                    "type": "array",
                    "description": "Comprehensive list of analysts with their roles and affiliations.",
                    "items": {
                        "type": "object",
                        "properties": {
                            "name": {"type": "string", "description": "Name of the analyst."},
                            "affiliation": {"type": "string", "description": "Primary affiliation of the analyst."},
                            "role": {"type": "string", "description": "Role of the analyst in the context of the topic."},
                            "description": {"type": "string", "description": "Description of the analyst focus, concerns, and motives."}
                        },
                        "required": ["name", "affiliation", "role", "description"]
                    }
                }
            },
            "required": ["analysts"]
        }),
    )
}

/// Generate between one and `max_participants` analyst personas.
pub async fn generate_analysts(
    generator: &dyn StructuredGenerator,
    view: AnalystsView<'_>,
    feedback: Option<&str>,
) -> Result<Vec<Analyst>> {
    if view.topic.trim().is_empty() {
        return Err(ColloquyError::generation(STAGE, "topic is empty"));
    }
    if view.max_participants == 0 {
        return Err(ColloquyError::generation(STAGE, "max_participants must be at least 1"));
    }

    let system = prompts::analysts_system(view.topic, feedback, view.max_participants);
    let shape = analysts_shape();
    let value = generator
        .generate(&system, prompts::ANALYSTS_USER, &shape)
        .await
        .map_err(in_stage(STAGE))?;

    let Perspectives { mut analysts } = serde_json::from_value(value)
        .map_err(|e| ColloquyError::generation(STAGE, format!("malformed analysts: {}", e)))?;

    if analysts.is_empty() {
        return Err(ColloquyError::generation(STAGE, "generator returned no analysts"));
    }

    if analysts.len() > view.max_participants {
        warn!(
            generated = analysts.len(),
            max = view.max_participants,
            "Too many analysts generated, truncating"
        );
        analysts.truncate(view.max_participants);
    }

    let mut seen = HashSet::new();
    for (i, analyst) in analysts.iter().enumerate() {
        let blank = analyst.blank_fields();
        if !blank.is_empty() {
            return Err(ColloquyError::generation(
                STAGE,
                format!("analyst #{} has empty fields: {}", i + 1, blank.join(", ")),
            ));
        }
        if !seen.insert(analyst.name.trim()) {
            return Err(ColloquyError::generation(
                STAGE,
                format!("duplicate analyst name '{}'", analyst.name),
            ));
        }
    }

    info!(count = analysts.len(), "Analysts generated");
    Ok(analysts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use colloquy_test_utils::{analyst, analysts_json, ScriptedGenerator};

    fn view(max: usize) -> AnalystsView<'static> {
        AnalystsView {
            topic: "renewable energy policy",
            max_participants: max,
        }
    }

    #[tokio::test]
    async fn returns_generated_analysts_and_passes_feedback() {
        let generator = ScriptedGenerator::new();
        generator.push_json("analysts", analysts_json(&["Ada", "Grace"]));

        let analysts = generate_analysts(&generator, view(2), Some("focus on solar only"))
            .await
            .unwrap();
        assert_eq!(analysts, vec![analyst("Ada"), analyst("Grace")]);

        let calls = generator.calls_for("analysts");
        assert_eq!(calls.len(), 1);
        assert!(calls[0].system.contains("focus on solar only"));
        assert!(calls[0].system.contains("Pick the top 2 themes."));
    }

    #[tokio::test]
    async fn truncates_to_max_participants() {
        let generator = ScriptedGenerator::new();
        generator.push_json("analysts", analysts_json(&["A", "B", "C"]));
        let analysts = generate_analysts(&generator, view(2), None).await.unwrap();
        assert_eq!(analysts.len(), 2);
        assert_eq!(analysts[1].name, "B");
    }

    #[tokio::test]
    async fn zero_analysts_is_an_error() {
        let generator = ScriptedGenerator::new();
        generator.push_json("analysts", json!({"analysts": []}));
        let err = generate_analysts(&generator, view(2), None).await.unwrap_err();
        assert!(matches!(
            err,
            ColloquyError::Generation { stage: StageId::GenerateAnalysts, .. }
        ));
    }

    #[tokio::test]
    async fn blank_field_is_an_error() {
        let generator = ScriptedGenerator::new();
        let mut value = analysts_json(&["Ada"]);
        value["analysts"][0]["role"] = json!("  ");
        generator.push_json("analysts", value);
        let err = generate_analysts(&generator, view(2), None).await.unwrap_err();
        assert!(err.to_string().contains("role"));
    }

    #[tokio::test]
    async fn duplicate_names_are_an_error() {
        let generator = ScriptedGenerator::new();
        generator.push_json("analysts", analysts_json(&["Ada", "Ada"]));
        let err = generate_analysts(&generator, view(3), None).await.unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[tokio::test]
    async fn malformed_structure_is_an_error() {
        let generator = ScriptedGenerator::new();
        generator.push_json("analysts", json!({"analysts": [{"name": "Ada"}]}));
        assert!(generate_analysts(&generator, view(2), None).await.is_err());
    }

    #[tokio::test]
    async fn generator_failure_is_attributed_to_the_stage() {
        let generator = ScriptedGenerator::new();
        generator.push_error("analysts", "not json");
        let err = generate_analysts(&generator, view(2), None).await.unwrap_err();
        assert!(matches!(err, ColloquyError::Generation { .. }));
        assert!(err.is_recoverable());
    }

    #[tokio::test]
    async fn empty_topic_fails_without_calling_generator() {
        let generator = ScriptedGenerator::new();
        let view = AnalystsView {
            topic: "  ",
            max_participants: 2,
        };
        assert!(generate_analysts(&generator, view, None).await.is_err());
        assert_eq!(generator.call_count(), 0);
    }
}
