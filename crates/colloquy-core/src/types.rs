use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique session identifier.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_str(s: &str) -> Self {
        Self(s.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Role in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A chat message sent to the language model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: text.into(),
            timestamp: Some(Utc::now()),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: text.into(),
            timestamp: Some(Utc::now()),
        }
    }

    pub fn text(&self) -> &str {
        &self.content
    }
}

/// Stop reason from the LLM.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    StopSequence,
}

/// Streaming delta from the LLM.
#[derive(Debug, Clone)]
pub enum StreamDelta {
    TextDelta(String),
    Stop(StopReason),
    Usage {
        input_tokens: u64,
        output_tokens: u64,
    },
}

/// Shape requested from the structured generator.
#[derive(Debug, Clone)]
pub enum OutputShape {
    /// Free text, returned as a JSON string.
    Text,
    /// A JSON object described by a JSON Schema.
    Json {
        name: String,
        schema: serde_json::Value,
    },
}

impl OutputShape {
    pub fn json(name: impl Into<String>, schema: serde_json::Value) -> Self {
        Self::Json {
            name: name.into(),
            schema,
        }
    }

    /// Top-level keys the schema marks as required.
    pub fn required_keys(&self) -> Vec<String> {
        match self {
            Self::Text => vec![],
            Self::Json { schema, .. } => schema["required"]
                .as_array()
                .map(|keys| {
                    keys.iter()
                        .filter_map(|k| k.as_str().map(String::from))
                        .collect()
                })
                .unwrap_or_default(),
        }
    }
}

/// A generated research persona.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Analyst {
    pub name: String,
    pub affiliation: String,
    pub role: String,
    pub description: String,
}

impl Analyst {
    /// Textual persona used in prompts.
    pub fn persona(&self) -> String {
        format!(
            "Name: {}\nRole: {}\nAffiliation: {}\nDescription: {}\n",
            self.name, self.role, self.affiliation, self.description
        )
    }

    /// Names of required fields that are blank.
    pub fn blank_fields(&self) -> Vec<&'static str> {
        [
            ("name", &self.name),
            ("affiliation", &self.affiliation),
            ("role", &self.role),
            ("description", &self.description),
        ]
        .into_iter()
        .filter(|(_, v)| v.trim().is_empty())
        .map(|(k, _)| k)
        .collect()
    }

    pub fn reference(&self) -> AnalystRef {
        AnalystRef(self.name.clone())
    }
}

/// Weak reference to an analyst, by name.
#[derive(Debug, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnalystRef(pub String);

impl AnalystRef {
    pub fn name(&self) -> &str {
        &self.0
    }

    /// Look the referenced analyst up in `analysts`.
    pub fn resolve<'a>(&self, analysts: &'a [Analyst]) -> Option<&'a Analyst> {
        analysts.iter().find(|a| a.name == self.0)
    }
}

impl std::fmt::Display for AnalystRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A research question owned by one analyst.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub text: String,
    pub owning_analyst: AnalystRef,
}

/// Questions and answers from one analyst's interview.
///
/// Answers fill in progressively; there are never more answers than questions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "InterviewRecord")]
pub struct Interview {
    analyst: AnalystRef,
    questions: Vec<String>,
    answers: Vec<String>,
}

#[derive(Deserialize)]
struct InterviewRecord {
    analyst: AnalystRef,
    questions: Vec<String>,
    #[serde(default)]
    answers: Vec<String>,
}

impl TryFrom<InterviewRecord> for Interview {
    type Error = String;

    fn try_from(record: InterviewRecord) -> std::result::Result<Self, Self::Error> {
        if record.answers.len() > record.questions.len() {
            return Err(format!(
                "interview with {} has {} answers for {} questions",
                record.analyst,
                record.answers.len(),
                record.questions.len()
            ));
        }
        Ok(Self {
            analyst: record.analyst,
            questions: record.questions,
            answers: record.answers,
        })
    }
}

impl Interview {
    /// Start an interview with no answers yet.
    pub fn new(analyst: AnalystRef, questions: Vec<String>) -> Self {
        Self {
            analyst,
            questions,
            answers: Vec::new(),
        }
    }

    pub fn analyst(&self) -> &AnalystRef {
        &self.analyst
    }

    pub fn questions(&self) -> &[String] {
        &self.questions
    }

    pub fn answers(&self) -> &[String] {
        &self.answers
    }

    /// The next question still waiting for an answer.
    pub fn next_unanswered(&self) -> Option<&str> {
        self.questions.get(self.answers.len()).map(String::as_str)
    }

    pub fn is_complete(&self) -> bool {
        self.answers.len() == self.questions.len()
    }

    /// Record the answer to the next unanswered question.
    ///
    /// Returns `false` (and records nothing) when every question is already answered.
    pub fn record_answer(&mut self, answer: impl Into<String>) -> bool {
        if self.is_complete() {
            return false;
        }
        self.answers.push(answer.into());
        true
    }

    /// Q/A transcript. `analyst` supplies the role shown in the header when known.
    pub fn transcript(&self, analyst: Option<&Analyst>) -> String {
        let mut out = match analyst {
            Some(a) => format!("Interview with {} ({})\n\n", a.name, a.role),
            None => format!("Interview with {}\n\n", self.analyst),
        };
        for (i, question) in self.questions.iter().enumerate() {
            out.push_str(&format!("Q: {}\n", question));
            if let Some(answer) = self.answers.get(i) {
                out.push_str(&format!("A: {}\n\n", answer));
            }
        }
        out
    }
}

/// One headed section of a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSection {
    pub heading: String,
    pub body: String,
}

/// The synthesized research report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub title: String,
    pub summary: String,
    #[serde(default)]
    pub sections: Vec<ReportSection>,
    pub conclusion: String,
    #[serde(default)]
    pub sources: Vec<String>,
}

impl Report {
    /// Render as Markdown.
    pub fn to_markdown(&self) -> String {
        let mut out = format!("# {}\n\n## Summary\n\n{}\n\n", self.title, self.summary);
        for section in &self.sections {
            out.push_str(&format!("## {}\n\n{}\n\n", section.heading, section.body));
        }
        out.push_str(&format!("## Conclusion\n\n{}\n", self.conclusion));
        if !self.sources.is_empty() {
            out.push_str("\n## Sources\n\n");
            for source in &self.sources {
                out.push_str(&format!("- {}\n", source));
            }
        }
        out
    }
}

/// An information source the interviews may draw on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_source_enabled")]
    pub enabled: bool,
}

fn default_source_enabled() -> bool { true }

impl SourceConfig {
    pub fn new(name: impl Into<String>, description: impl Into<String>, enabled: bool) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            enabled,
        }
    }
}
