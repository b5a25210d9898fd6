//! Extractive question answering.

use super::ModelError;

/// An answer span extracted from the context.
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub answer: String,
    pub score: f64,
    /// Character offsets into the context, as reported by the model.
    pub start: usize,
    pub end: usize,
}

pub trait QuestionAnswerer: Send + Sync {
    /// Best answer span, or `None` when the model finds nothing.
    fn answer(&self, question: &str, context: &str) -> Result<Option<Answer>, ModelError>;

    /// Answer several questions against one context, in order.
    fn answer_multiple(
        &self,
        questions: &[&str],
        context: &str,
    ) -> Result<Vec<Option<Answer>>, ModelError> {
        questions.iter().map(|q| self.answer(q, context)).collect()
    }
}
