//! Model seams - the pretrained pipelines the bot forwards text to.
//!
//! Every trait here is blocking: implementations run libtorch inference on
//! the calling thread. Async callers go through [`run_blocking`].

pub mod dialogue;
pub mod generation;
pub mod moderation;
pub mod pipelines;
pub mod qa;

use std::fmt;
use std::sync::Arc;

pub use dialogue::{Dialogue, DialogueHistory, DialogueTurn};
pub use generation::{GenerationOptions, TextGenerator};
pub use moderation::{ContentModerator, ModerationVerdict};
pub use qa::{Answer, QuestionAnswerer};

/// The model kinds the registry can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelKind {
    Sentiment,
    Moderation,
    Generation,
    QuestionAnswering,
    Dialogue,
}

impl ModelKind {
    pub const ALL: [ModelKind; 5] = [
        ModelKind::Sentiment,
        ModelKind::Moderation,
        ModelKind::Generation,
        ModelKind::QuestionAnswering,
        ModelKind::Dialogue,
    ];

    /// Human readable name, used in logs and `/models`.
    pub fn display_name(&self) -> &'static str {
        match self {
            ModelKind::Sentiment => "Sentiment Analyzer",
            ModelKind::Moderation => "Content Moderator",
            ModelKind::Generation => "Text Generator",
            ModelKind::QuestionAnswering => "Q&A System",
            ModelKind::Dialogue => "Chatbot",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Errors raised while loading or running a model.
#[derive(Debug)]
pub enum ModelError {
    /// Weights, config or vocabulary could not be loaded.
    Load { kind: ModelKind, reason: String },
    /// The pipeline failed during inference.
    Inference { kind: ModelKind, reason: String },
    /// The pipeline returned nothing for a non-empty input.
    EmptyOutput(ModelKind),
    /// A previous inference panicked while holding the model lock.
    Poisoned(ModelKind),
    /// The blocking worker thread died.
    Worker(String),
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Load { kind, reason } => write!(f, "failed to load {kind}: {reason}"),
            Self::Inference { kind, reason } => write!(f, "{kind} inference failed: {reason}"),
            Self::EmptyOutput(kind) => write!(f, "{kind} returned no output"),
            Self::Poisoned(kind) => write!(f, "{kind} is unusable after an earlier crash"),
            Self::Worker(e) => write!(f, "inference worker failed: {e}"),
        }
    }
}

impl std::error::Error for ModelError {}

/// One label predicted by a text classifier.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub label: String,
    /// Confidence in `[0, 1]`.
    pub score: f64,
}

/// A sequence classifier (sentiment, toxicity, hate speech).
pub trait TextClassifier: Send + Sync {
    /// Classify each input. The output has one entry per input, in order.
    fn classify(&self, texts: &[&str]) -> Result<Vec<Classification>, ModelError>;

    /// Kind reported in errors.
    fn kind(&self) -> ModelKind;

    fn classify_one(&self, text: &str) -> Result<Classification, ModelError> {
        self.classify(&[text])?
            .into_iter()
            .next()
            .ok_or(ModelError::EmptyOutput(self.kind()))
    }
}

/// Builds model instances. Construction is expensive (weights are loaded,
/// possibly downloaded) and happens on a blocking thread.
pub trait ModelProvider: Send + Sync + 'static {
    fn sentiment(&self) -> Result<Arc<dyn TextClassifier>, ModelError>;
    fn moderation(&self) -> Result<Arc<dyn TextClassifier>, ModelError>;
    fn generator(&self) -> Result<Arc<dyn TextGenerator>, ModelError>;
    fn question_answering(&self) -> Result<Arc<dyn QuestionAnswerer>, ModelError>;
    fn dialogue(&self) -> Result<Arc<dyn Dialogue>, ModelError>;
}

/// Run blocking model work off the async runtime.
pub async fn run_blocking<T, F>(f: F) -> Result<T, ModelError>
where
    F: FnOnce() -> Result<T, ModelError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ModelError::Worker(e.to_string()))?
}
