//! Deterministic stand-ins for the pretrained pipelines.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::models::{
    Answer, Classification, Dialogue, DialogueHistory, DialogueTurn, GenerationOptions,
    ModelError, ModelKind, ModelProvider, QuestionAnswerer, TextClassifier, TextGenerator,
};

/// Counts constructions and inferences per kind; can be told to fail the
/// first N constructions of a kind or to load slowly.
#[derive(Default)]
pub struct StubProvider {
    constructions: Mutex<HashMap<ModelKind, usize>>,
    failures: Mutex<HashMap<ModelKind, usize>>,
    calls: Arc<Calls>,
    load_delay: Duration,
}

#[derive(Default)]
pub struct Calls {
    counts: Mutex<HashMap<ModelKind, usize>>,
}

impl Calls {
    fn record(&self, kind: ModelKind) {
        *self.counts.lock().unwrap().entry(kind).or_insert(0) += 1;
    }
}

impl StubProvider {
    pub fn with_load_delay_ms(mut self, ms: u64) -> Self {
        self.load_delay = Duration::from_millis(ms);
        self
    }

    pub fn failing(self, kind: ModelKind, times: usize) -> Self {
        self.failures.lock().unwrap().insert(kind, times);
        self
    }

    pub fn constructions(&self, kind: ModelKind) -> usize {
        self.constructions.lock().unwrap().get(&kind).copied().unwrap_or(0)
    }

    /// Inference calls made on models built by this provider.
    pub fn calls(&self, kind: ModelKind) -> usize {
        self.calls.counts.lock().unwrap().get(&kind).copied().unwrap_or(0)
    }

    fn construct(&self, kind: ModelKind) -> Result<(), ModelError> {
        std::thread::sleep(self.load_delay);
        *self.constructions.lock().unwrap().entry(kind).or_insert(0) += 1;
        let mut failures = self.failures.lock().unwrap();
        if let Some(left) = failures.get_mut(&kind)
            && *left > 0
        {
            *left -= 1;
            return Err(ModelError::Load { kind, reason: "stub: weights unavailable".into() });
        }
        Ok(())
    }
}

impl ModelProvider for StubProvider {
    fn sentiment(&self) -> Result<Arc<dyn TextClassifier>, ModelError> {
        self.construct(ModelKind::Sentiment)?;
        Ok(Arc::new(StubSentiment { calls: self.calls.clone() }))
    }

    fn moderation(&self) -> Result<Arc<dyn TextClassifier>, ModelError> {
        self.construct(ModelKind::Moderation)?;
        Ok(Arc::new(StubToxicity { calls: self.calls.clone() }))
    }

    fn generator(&self) -> Result<Arc<dyn TextGenerator>, ModelError> {
        self.construct(ModelKind::Generation)?;
        Ok(Arc::new(StubGenerator { calls: self.calls.clone() }))
    }

    fn question_answering(&self) -> Result<Arc<dyn QuestionAnswerer>, ModelError> {
        self.construct(ModelKind::QuestionAnswering)?;
        Ok(Arc::new(StubQa { calls: self.calls.clone() }))
    }

    fn dialogue(&self) -> Result<Arc<dyn Dialogue>, ModelError> {
        self.construct(ModelKind::Dialogue)?;
        Ok(Arc::new(StubDialogue { calls: self.calls.clone(), served: AtomicUsize::new(0) }))
    }
}

/// POSITIVE when the text mentions love/great/good.
struct StubSentiment {
    calls: Arc<Calls>,
}

impl TextClassifier for StubSentiment {
    fn classify(&self, texts: &[&str]) -> Result<Vec<Classification>, ModelError> {
        self.calls.record(ModelKind::Sentiment);
        Ok(texts
            .iter()
            .map(|t| {
                let t = t.to_lowercase();
                let positive = ["love", "great", "good"].iter().any(|w| t.contains(w));
                Classification {
                    label: if positive { "POSITIVE" } else { "NEGATIVE" }.to_string(),
                    score: 0.9987,
                }
            })
            .collect())
    }

    fn kind(&self) -> ModelKind {
        ModelKind::Sentiment
    }
}

/// Label "toxic" for every input; high score only when it says "stupid".
struct StubToxicity {
    calls: Arc<Calls>,
}

impl TextClassifier for StubToxicity {
    fn classify(&self, texts: &[&str]) -> Result<Vec<Classification>, ModelError> {
        self.calls.record(ModelKind::Moderation);
        Ok(texts
            .iter()
            .map(|t| Classification {
                label: "toxic".to_string(),
                score: if t.to_lowercase().contains("stupid") { 0.95 } else { 0.02 },
            })
            .collect())
    }

    fn kind(&self) -> ModelKind {
        ModelKind::Moderation
    }
}

struct StubGenerator {
    calls: Arc<Calls>,
}

impl TextGenerator for StubGenerator {
    fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<Vec<String>, ModelError> {
        self.calls.record(ModelKind::Generation);
        Ok((0..options.num_return_sequences)
            .map(|i| format!("{prompt} and then sample {i} ({} tokens)", options.max_new_tokens))
            .collect())
    }
}

/// Answers with the last word of the context.
struct StubQa {
    calls: Arc<Calls>,
}

impl QuestionAnswerer for StubQa {
    fn answer(&self, _question: &str, context: &str) -> Result<Option<Answer>, ModelError> {
        self.calls.record(ModelKind::QuestionAnswering);
        Ok(context.split_whitespace().last().map(|word| {
            let start = context.rfind(word).unwrap_or(0);
            Answer {
                answer: word.to_string(),
                score: 0.87,
                start: context[..start].chars().count(),
                end: context[..start].chars().count() + word.chars().count(),
            }
        }))
    }
}

/// Replies by echoing the input and the prior inputs it was given.
struct StubDialogue {
    calls: Arc<Calls>,
    served: AtomicUsize,
}

impl Dialogue for StubDialogue {
    fn respond(&self, history: &DialogueHistory, input: &str) -> Result<DialogueTurn, ModelError> {
        self.calls.record(ModelKind::Dialogue);
        let n = self.served.fetch_add(1, Ordering::SeqCst);
        let prior = history.user_inputs().join(", ");
        Ok(DialogueTurn {
            user: input.to_string(),
            reply: format!("re: {input} [prior: {prior}]"),
            tokens: vec![vec![n as i64]],
        })
    }
}
