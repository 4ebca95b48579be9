//! Scripted collaborators and fixtures shared by the colloquy test suites.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::{json, Value};

use colloquy_core::error::{ColloquyError, Result};
use colloquy_core::state::{SessionState, WorkflowNode};
use colloquy_core::traits::{ResearchTool, StructuredGenerator};
use colloquy_core::types::{Analyst, Interview, OutputShape, Question, Report, SourceConfig};

/// Queue key used for `OutputShape::Text` requests.
pub const TEXT: &str = "text";

fn shape_key(shape: &OutputShape) -> String {
    match shape {
        OutputShape::Text => TEXT.to_string(),
        OutputShape::Json { name, .. } => name.clone(),
    }
}

/// One recorded generator request.
#[derive(Debug, Clone)]
pub struct GeneratorCall {
    pub system: String,
    pub user: String,
    pub shape: String,
}

enum Scripted {
    Value(Value),
    Error(String),
    Hang,
}

/// A [`StructuredGenerator`] that replays queued responses.
///
/// Responses are queued per output shape (`"text"` or the JSON shape's
/// name) and consumed in order. When a text queue is empty the default text
/// is returned if one was set; an empty JSON queue is a parse error.
#[derive(Default)]
pub struct ScriptedGenerator {
    queues: Mutex<HashMap<String, VecDeque<Scripted>>>,
    default_text: Option<String>,
    calls: Mutex<Vec<GeneratorCall>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every unscripted text request with `text`.
    pub fn with_default_text(mut self, text: impl Into<String>) -> Self {
        self.default_text = Some(text.into());
        self
    }

    fn push(&self, key: &str, item: Scripted) {
        self.queues
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_default()
            .push_back(item);
    }

    pub fn push_json(&self, shape_name: &str, value: Value) -> &Self {
        self.push(shape_name, Scripted::Value(value));
        self
    }

    pub fn push_text(&self, text: &str) -> &Self {
        self.push(TEXT, Scripted::Value(Value::String(text.to_string())));
        self
    }

    /// Make the next request for `key` fail.
    pub fn push_error(&self, key: &str, message: &str) -> &Self {
        self.push(key, Scripted::Error(message.to_string()));
        self
    }

    /// Make the next request for `key` never complete.
    pub fn push_hang(&self, key: &str) -> &Self {
        self.push(key, Scripted::Hang);
        self
    }

    pub fn calls(&self) -> Vec<GeneratorCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Requests recorded for one shape key.
    pub fn calls_for(&self, key: &str) -> Vec<GeneratorCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.shape == key)
            .collect()
    }
}

impl StructuredGenerator for ScriptedGenerator {
    fn generate<'a>(
        &'a self,
        system_prompt: &'a str,
        user_prompt: &'a str,
        shape: &'a OutputShape,
    ) -> BoxFuture<'a, Result<Value>> {
        Box::pin(async move {
            let key = shape_key(shape);
            self.calls.lock().unwrap().push(GeneratorCall {
                system: system_prompt.to_string(),
                user: user_prompt.to_string(),
                shape: key.clone(),
            });

            let next = self
                .queues
                .lock()
                .unwrap()
                .get_mut(&key)
                .and_then(|q| q.pop_front());

            match next {
                Some(Scripted::Value(v)) => Ok(v),
                Some(Scripted::Error(msg)) => Err(ColloquyError::LlmParse(msg)),
                Some(Scripted::Hang) => futures::future::pending().await,
                None if key == TEXT => match &self.default_text {
                    Some(text) => Ok(Value::String(text.clone())),
                    None => Err(ColloquyError::LlmParse("script exhausted for text".into())),
                },
                None => Err(ColloquyError::LlmParse(format!("script exhausted for {}", key))),
            }
        })
    }
}

/// A tool that always returns the same text and records its queries.
pub struct StaticTool {
    name: String,
    response: String,
    delay: Option<Duration>,
    queries: Mutex<Vec<String>>,
}

impl StaticTool {
    pub fn new(name: &str, response: &str) -> Self {
        Self {
            name: name.to_string(),
            response: response.to_string(),
            delay: None,
            queries: Mutex::new(Vec::new()),
        }
    }

    /// Sleep before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

impl ResearchTool for StaticTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Static test tool"
    }

    fn search(&self, query: String) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            self.queries.lock().unwrap().push(query);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            Ok(self.response.clone())
        })
    }
}

/// A tool whose every search fails.
pub struct FailingTool {
    name: String,
    message: String,
}

impl FailingTool {
    pub fn new(name: &str, message: &str) -> Self {
        Self {
            name: name.to_string(),
            message: message.to_string(),
        }
    }
}

impl ResearchTool for FailingTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Always fails"
    }

    fn search(&self, _query: String) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            Err(ColloquyError::Tool {
                tool: self.name.clone(),
                message: self.message.clone(),
            })
        })
    }
}

// Fixtures

pub fn analyst(name: &str) -> Analyst {
    Analyst {
        name: name.to_string(),
        affiliation: format!("{} Institute", name),
        role: "Researcher".to_string(),
        description: format!("{} studies the topic closely.", name),
    }
}

/// Generator output for the `analysts` shape.
pub fn analysts_json(names: &[&str]) -> Value {
    let analysts: Vec<Value> = names
        .iter()
        .map(|n| serde_json::to_value(analyst(n)).unwrap())
        .collect();
    json!({ "analysts": analysts })
}

/// Generator output for the `report` shape.
pub fn report_json(title: &str) -> Value {
    json!({
        "title": title,
        "summary": "A short summary.",
        "sections": [{"Findings": "Things were found."}],
        "conclusion": "In conclusion.",
        "sources": ["https://example.org/source"]
    })
}

pub fn sources(entries: &[(&str, bool)]) -> Vec<SourceConfig> {
    entries
        .iter()
        .map(|(name, enabled)| SourceConfig::new(*name, format!("{} source", name), *enabled))
        .collect()
}

/// A state resting at ReviewInterviews with two analysts fully interviewed.
pub fn sample_state() -> SessionState {
    let mut state = SessionState::new("renewable energy policy", 2, sources(&[("web", true)]));
    state.analysts = vec![analyst("Ada"), analyst("Grace")];
    state.research_questions = state
        .analysts
        .iter()
        .map(|a| Question {
            text: format!("What does {} think?", a.name),
            owning_analyst: a.reference(),
        })
        .collect();
    state.interviews = state
        .research_questions
        .iter()
        .map(|q| {
            let mut interview = Interview::new(q.owning_analyst.clone(), vec![q.text.clone()]);
            interview.record_answer("An informed answer.");
            interview
        })
        .collect();
    state.position = WorkflowNode::ReviewInterviews;
    state
}

pub fn sample_report() -> Report {
    Report {
        title: "Energy".into(),
        summary: "Summary".into(),
        sections: Vec::new(),
        conclusion: "Done".into(),
        sources: Vec::new(),
    }
}
