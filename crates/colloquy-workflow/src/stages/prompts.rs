//! Prompt templates for the research stages.

use colloquy_core::types::Analyst;

pub const ANALYSTS_USER: &str = "Generate the set of analysts.";
pub const PLAN_USER: &str = "Generate the research questions.";
pub const REPORT_USER: &str =
    "Generate the research report with all required fields including sections.";

pub fn analysts_system(topic: &str, feedback: Option<&str>, max_analysts: usize) -> String {
    format!(
        "You are tasked with creating a set of AI analyst personas. Follow these instructions carefully:

1. First, review the research topic:
{topic}

2. Examine any editorial feedback that has been optionally provided to guide creation of the analysts:

{feedback}

3. Determine the most interesting themes based upon the topic and feedback above.

4. Pick the top {max_analysts} themes.

5. Assign one analyst to each theme.

Each analyst should have a unique perspective and expertise relevant to the research topic.",
        feedback = feedback.unwrap_or_default(),
    )
}

pub fn plan_system(topic: &str, analyst: &Analyst, feedback: Option<&str>) -> String {
    with_feedback(
        format!(
            "You are helping to generate research questions for an analyst with the following profile:

{persona}
The research topic is: {topic}

Based on this analyst's perspective and expertise, generate 3 specific, focused research questions that this analyst would want to investigate.
Each question should be directly relevant to the analyst's role and interests.
Write each question on its own line.",
            persona = analyst.persona(),
        ),
        feedback,
    )
}

pub fn expert_system(topic: &str, analyst: &Analyst, question: &str, feedback: Option<&str>) -> String {
    with_feedback(
        format!(
            "You are an expert being interviewed by {name}, a {role} from {affiliation}.

The interview is about: {topic}

The question you need to answer is: {question}

Use the research results you are given to provide a comprehensive, well-informed answer.
Your answer should be detailed, factual, and directly address the question from the perspective of an expert in this field.",
            name = analyst.name,
            role = analyst.role,
            affiliation = analyst.affiliation,
        ),
        feedback,
    )
}

pub fn answer_user(question: &str, research: &str) -> String {
    format!(
        "Based on the following research results, provide a comprehensive answer to the question: {question}

Research results:
{research}

Your answer should be detailed, factual, and directly address the question from the perspective of an expert in this field."
    )
}

pub fn report_system(topic: &str, transcripts: &str, feedback: Option<&str>) -> String {
    with_feedback(
        format!(
            "You are tasked with creating a comprehensive research report on the following topic:

{topic}

The report should be based on the following interview transcripts with various analysts:

{transcripts}

Create a well-structured report that synthesizes the insights from all interviews.
The report should include:
1. An executive summary
2. Sections covering the main themes and findings (at least 3-5 sections)
3. A conclusion with recommendations
4. Citations of sources mentioned in the interviews

Format the report professionally and ensure it provides valuable insights for decision-makers.

IMPORTANT: Make sure to include sections in your report with headings and content."
        ),
        feedback,
    )
}

/// Append reviewer guidance when a stage is re-run on feedback.
fn with_feedback(prompt: String, feedback: Option<&str>) -> String {
    match feedback {
        Some(fb) => format!("{prompt}\n\nReviewer feedback to address:\n{fb}"),
        None => prompt,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analysts_prompt_carries_topic_feedback_and_bound() {
        let prompt = analysts_system("grid storage", Some("focus on batteries"), 4);
        assert!(prompt.contains("grid storage"));
        assert!(prompt.contains("focus on batteries"));
        assert!(prompt.contains("Pick the top 4 themes."));
    }

    #[test]
    fn feedback_is_appended_only_when_present() {
        let analyst = Analyst {
            name: "Ada".into(),
            affiliation: "Lab".into(),
            role: "Economist".into(),
            description: "Costs".into(),
        };
        let plain = plan_system("t", &analyst, None);
        assert!(!plain.contains("Reviewer feedback"));
        assert!(plain.contains("Name: Ada\nRole: Economist"));

        let guided = plan_system("t", &analyst, Some("ask about tariffs"));
        assert!(guided.ends_with("Reviewer feedback to address:\nask about tariffs"));
    }
}
