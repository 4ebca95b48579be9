/// Pulls research questions out of free-text generator output.
pub trait QuestionExtractor: Send + Sync + 'static {
    fn extract(&self, text: &str) -> Vec<String>;
}

/// Keeps trimmed, non-empty lines containing a `?`, up to a limit.
#[derive(Debug, Clone)]
pub struct HeuristicQuestionExtractor {
    max_questions: usize,
}

impl HeuristicQuestionExtractor {
    pub fn new(max_questions: usize) -> Self {
        Self { max_questions }
    }
}

impl Default for HeuristicQuestionExtractor {
    fn default() -> Self {
        Self::new(3)
    }
}

impl QuestionExtractor for HeuristicQuestionExtractor {
    fn extract(&self, text: &str) -> Vec<String> {
        text.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && line.contains('?'))
            .take(self.max_questions)
            .map(str::to_string)
            .collect()
    }
}
