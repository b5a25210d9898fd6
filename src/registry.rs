//! Lazily constructed, process-lifetime model instances.
//!
//! Each kind is built on first use behind a `OnceCell`, so concurrent first
//! callers wait for a single construction. A failed construction is not
//! remembered: the next caller tries again.

use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::{error, info};

use crate::models::{
    run_blocking, Dialogue, ModelError, ModelKind, ModelProvider, QuestionAnswerer,
    TextClassifier, TextGenerator,
};

pub struct ModelRegistry {
    provider: Arc<dyn ModelProvider>,
    sentiment: OnceCell<Arc<dyn TextClassifier>>,
    moderation: OnceCell<Arc<dyn TextClassifier>>,
    generator: OnceCell<Arc<dyn TextGenerator>>,
    question_answering: OnceCell<Arc<dyn QuestionAnswerer>>,
    dialogue: OnceCell<Arc<dyn Dialogue>>,
}

impl ModelRegistry {
    pub fn new(provider: Arc<dyn ModelProvider>) -> Self {
        Self {
            provider,
            sentiment: OnceCell::new(),
            moderation: OnceCell::new(),
            generator: OnceCell::new(),
            question_answering: OnceCell::new(),
            dialogue: OnceCell::new(),
        }
    }

    pub async fn sentiment(&self) -> Result<Arc<dyn TextClassifier>, ModelError> {
        self.load(&self.sentiment, ModelKind::Sentiment, |p| p.sentiment()).await
    }

    pub async fn moderation(&self) -> Result<Arc<dyn TextClassifier>, ModelError> {
        self.load(&self.moderation, ModelKind::Moderation, |p| p.moderation()).await
    }

    pub async fn generator(&self) -> Result<Arc<dyn TextGenerator>, ModelError> {
        self.load(&self.generator, ModelKind::Generation, |p| p.generator()).await
    }

    pub async fn question_answering(&self) -> Result<Arc<dyn QuestionAnswerer>, ModelError> {
        self.load(&self.question_answering, ModelKind::QuestionAnswering, |p| {
            p.question_answering()
        })
        .await
    }

    pub async fn dialogue(&self) -> Result<Arc<dyn Dialogue>, ModelError> {
        self.load(&self.dialogue, ModelKind::Dialogue, |p| p.dialogue()).await
    }

    /// Whether `kind` has been constructed.
    pub fn is_loaded(&self, kind: ModelKind) -> bool {
        match kind {
            ModelKind::Sentiment => self.sentiment.initialized(),
            ModelKind::Moderation => self.moderation.initialized(),
            ModelKind::Generation => self.generator.initialized(),
            ModelKind::QuestionAnswering => self.question_answering.initialized(),
            ModelKind::Dialogue => self.dialogue.initialized(),
        }
    }

    async fn load<T: ?Sized + Send + Sync + 'static>(
        &self,
        cell: &OnceCell<Arc<T>>,
        kind: ModelKind,
        build: fn(&dyn ModelProvider) -> Result<Arc<T>, ModelError>,
    ) -> Result<Arc<T>, ModelError> {
        cell.get_or_try_init(|| async {
            info!("Loading {kind}...");
            let provider = self.provider.clone();
            match run_blocking(move || build(provider.as_ref())).await {
                Ok(model) => {
                    info!("✓ {kind} loaded");
                    Ok(model)
                }
                Err(e) => {
                    error!("Failed to load {kind}: {e}");
                    Err(e)
                }
            }
        })
        .await
        .cloned()
    }
}
