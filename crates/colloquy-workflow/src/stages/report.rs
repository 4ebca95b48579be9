use serde_json::{json, Value};
use tracing::info;

use colloquy_core::error::{ColloquyError, Result};
use colloquy_core::state::StageId;
use colloquy_core::traits::StructuredGenerator;
use colloquy_core::types::{OutputShape, Report, ReportSection};

use super::{in_stage, prompts, ReportView};

const STAGE: StageId = StageId::GenerateReport;

pub fn report_shape() -> OutputShape {
    OutputShape::json(
        "report",
        json!({
            "type": "object",
            "properties": {
                "title": {"type": "string", "description": "The title of the report."},
                "summary": {"type": "string", "description": "Executive summary of the report."},
                "sections": {
                    "type": "array",
                    "description": "Sections of the report. Each item is an object with one key-value pair where the key is the section heading and the value is the section content.",
                    "items": {"type": "object", "additionalProperties": {"type": "string"}}
                },
                "conclusion": {"type": "string", "description": "Conclusion of the report."},
                "sources": {"type": "array", "items": {"type": "string"}, "description": "Sources used in the report."}
            },
            "required": ["title", "summary", "conclusion"]
        }),
    )
}

fn text_field(value: &Value, key: &str) -> Result<String> {
    match value.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.clone()),
        _ => Err(ColloquyError::generation(
            STAGE,
            format!("report is missing '{}'", key),
        )),
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Read one section, either `{"heading": h, "body"|"content": b}` or the
/// single-entry form `{h: b}`.
fn parse_section(value: &Value) -> Option<ReportSection> {
    let obj = value.as_object()?;
    if let Some(heading) = obj.get("heading").and_then(Value::as_str) {
        let body = obj
            .get("body")
            .or_else(|| obj.get("content"))
            .map(scalar_text)
            .unwrap_or_default();
        return Some(ReportSection {
            heading: heading.to_string(),
            body,
        });
    }
    let (heading, body) = obj.iter().next()?;
    Some(ReportSection {
        heading: heading.clone(),
        body: scalar_text(body),
    })
}

/// Turn the generator's report object into a [`Report`].
pub fn parse_report(value: &Value) -> Result<Report> {
    let sections = match value.get("sections") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.iter().filter_map(parse_section).collect(),
        Some(_) => {
            return Err(ColloquyError::generation(
                STAGE,
                "report 'sections' is not a list",
            ))
        }
    };

    let sources = value
        .get("sources")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .map(scalar_text)
                .filter(|s| !s.trim().is_empty())
                .collect()
        })
        .unwrap_or_default();

    Ok(Report {
        title: text_field(value, "title")?,
        summary: text_field(value, "summary")?,
        sections,
        conclusion: text_field(value, "conclusion")?,
        sources,
    })
}

/// Synthesize every interview transcript into one report.
pub async fn generate_report(
    generator: &dyn StructuredGenerator,
    view: ReportView<'_>,
    feedback: Option<&str>,
) -> Result<Report> {
    if view.interviews.is_empty() {
        return Err(ColloquyError::generation(STAGE, "no interviews to report on"));
    }

    let transcripts = view
        .interviews
        .iter()
        .map(|i| i.transcript(i.analyst().resolve(view.analysts)))
        .collect::<Vec<_>>()
        .join("\n\n");

    let system = prompts::report_system(view.topic, &transcripts, feedback);
    let value = generator
        .generate(&system, prompts::REPORT_USER, &report_shape())
        .await
        .map_err(in_stage(STAGE))?;

    let report = parse_report(&value)?;
    info!(title = %report.title, sections = report.sections.len(), "Report generated");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use colloquy_test_utils::{report_json, sample_state, ScriptedGenerator};

    #[test]
    fn single_key_sections_are_accepted() {
        let report = parse_report(&report_json("Energy")).unwrap();
        assert_eq!(report.title, "Energy");
        assert_eq!(report.sections.len(), 1);
        assert_eq!(report.sections[0].heading, "Findings");
        assert_eq!(report.sections[0].body, "Things were found.");
        assert_eq!(report.sources, vec!["https://example.org/source"]);
    }

    #[test]
    fn explicit_heading_sections_are_accepted() {
        let mut value = report_json("T");
        value["sections"] = json!([{"heading": "Costs", "content": "Falling."}]);
        let report = parse_report(&value).unwrap();
        assert_eq!(report.sections[0].heading, "Costs");
        assert_eq!(report.sections[0].body, "Falling.");
    }

    #[test]
    fn missing_or_null_sections_are_empty() {
        let mut value = report_json("T");
        value["sections"] = Value::Null;
        assert!(parse_report(&value).unwrap().sections.is_empty());
        value.as_object_mut().unwrap().remove("sections");
        value.as_object_mut().unwrap().remove("sources");
        let report = parse_report(&value).unwrap();
        assert!(report.sections.is_empty());
        assert!(report.sources.is_empty());
    }

    #[test]
    fn missing_title_is_an_error() {
        let mut value = report_json("T");
        value["title"] = json!("");
        assert!(parse_report(&value).is_err());
    }

    #[tokio::test]
    async fn transcripts_are_joined_in_interview_order() {
        let state = sample_state();
        let generator = ScriptedGenerator::new();
        generator.push_json("report", report_json("Energy"));

        let report = generate_report(&generator, ReportView::of(&state), None)
            .await
            .unwrap();
        assert_eq!(report.title, "Energy");

        let system = &generator.calls()[0].system;
        let ada = system.find("Interview with Ada (Researcher)").unwrap();
        let grace = system.find("Interview with Grace (Researcher)").unwrap();
        assert!(ada < grace);
        assert!(system.contains("A: An informed answer.\n\n\n\nInterview with Grace"));
    }

    #[tokio::test]
    async fn no_interviews_is_an_error() {
        let mut state = sample_state();
        state.interviews.clear();
        let generator = ScriptedGenerator::new();
        let err = generate_report(&generator, ReportView::of(&state), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ColloquyError::Generation { stage: StageId::GenerateReport, .. }
        ));
        assert_eq!(generator.call_count(), 0);
    }
}
