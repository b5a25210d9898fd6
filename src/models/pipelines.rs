//! rust-bert backed pipelines.
//!
//! Each model sits behind a `Mutex`: libtorch modules are not safe to drive
//! from two threads at once, so one instance serves one inference at a time.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use rust_bert::gpt2::GPT2Generator;
use rust_bert::pipelines::common::{ModelResource, ModelType};
use rust_bert::pipelines::conversation::{
    Conversation, ConversationConfig, ConversationManager, ConversationModel,
};
use rust_bert::pipelines::generation_utils::{GenerateConfig, GenerateOptions, LanguageGenerator};
use rust_bert::pipelines::question_answering::{
    QaInput, QuestionAnsweringConfig, QuestionAnsweringModel,
};
use rust_bert::pipelines::sentiment::{SentimentConfig, SentimentModel, SentimentPolarity};
use rust_bert::pipelines::sequence_classification::{
    Label, SequenceClassificationConfig, SequenceClassificationModel,
};
use rust_bert::resources::{LocalResource, RemoteResource, ResourceProvider};
use rust_bert::RustBertError;
use tracing::debug;

use super::{
    Answer, Classification, Dialogue, DialogueHistory, DialogueTurn, GenerationOptions,
    ModelError, ModelKind, ModelProvider, QuestionAnswerer, TextClassifier, TextGenerator,
};
use crate::config::{is_remote, Architecture, ChatSettings, ClassifierModel};

/// Builds the pretrained pipelines.
///
/// Sentiment (distilbert SST-2), generation (GPT-2), question answering
/// (distilbert SQuAD) and dialogue (DialoGPT-medium) use rust-bert's default
/// resources; the moderation classifier is configurable.
pub struct BertProvider {
    moderation: ClassifierModel,
    chat: ChatSettings,
}

impl BertProvider {
    pub fn new(moderation: ClassifierModel, chat: ChatSettings) -> Self {
        Self { moderation, chat }
    }
}

fn load_error(kind: ModelKind) -> impl Fn(RustBertError) -> ModelError {
    move |e| ModelError::Load { kind, reason: e.to_string() }
}

fn inference_error(kind: ModelKind) -> impl Fn(RustBertError) -> ModelError {
    move |e| ModelError::Inference { kind, reason: e.to_string() }
}

fn lock<T>(model: &Mutex<T>, kind: ModelKind) -> Result<MutexGuard<'_, T>, ModelError> {
    model.lock().map_err(|_| ModelError::Poisoned(kind))
}

fn resource(location: &str, cache_subdir: &str) -> Box<dyn ResourceProvider + Send> {
    if is_remote(location) {
        Box::new(RemoteResource::new(location, cache_subdir))
    } else {
        Box::new(LocalResource::from(PathBuf::from(location)))
    }
}

fn model_type(architecture: Architecture) -> ModelType {
    match architecture {
        Architecture::Bert => ModelType::Bert,
        Architecture::DistilBert => ModelType::DistilBert,
        Architecture::Roberta => ModelType::Roberta,
    }
}

impl ModelProvider for BertProvider {
    fn sentiment(&self) -> Result<Arc<dyn TextClassifier>, ModelError> {
        let model = SentimentModel::new(SentimentConfig::default())
            .map_err(load_error(ModelKind::Sentiment))?;
        Ok(Arc::new(BertSentiment { model: Mutex::new(model) }))
    }

    fn moderation(&self) -> Result<Arc<dyn TextClassifier>, ModelError> {
        let m = &self.moderation;
        let missing = m.missing_local_files();
        if !missing.is_empty() {
            return Err(ModelError::Load {
                kind: ModelKind::Moderation,
                reason: format!(
                    "missing {} (convert the checkpoint to rust_model.ot with rust-bert's utils/convert_model.py)",
                    missing.join(", ")
                ),
            });
        }
        let cache = format!("{}/", m.name);
        let config = SequenceClassificationConfig::new(
            model_type(m.architecture),
            ModelResource::Torch(resource(&m.weights, &format!("{cache}model"))),
            resource(&m.config, &format!("{cache}config")),
            resource(&m.vocab, &format!("{cache}vocab")),
            m.merges.as_deref().map(|merges| resource(merges, &format!("{cache}merges"))),
            m.lower_case,
            None::<bool>,
            None::<bool>,
        );
        let model = SequenceClassificationModel::new(config)
            .map_err(load_error(ModelKind::Moderation))?;
        Ok(Arc::new(BertClassifier { model: Mutex::new(model), multi_label: m.multi_label }))
    }

    fn generator(&self) -> Result<Arc<dyn TextGenerator>, ModelError> {
        let model = GPT2Generator::new(GenerateConfig { do_sample: true, ..Default::default() })
            .map_err(load_error(ModelKind::Generation))?;
        Ok(Arc::new(BertGenerator { model: Mutex::new(model) }))
    }

    fn question_answering(&self) -> Result<Arc<dyn QuestionAnswerer>, ModelError> {
        let model = QuestionAnsweringModel::new(QuestionAnsweringConfig::default())
            .map_err(load_error(ModelKind::QuestionAnswering))?;
        Ok(Arc::new(BertQa { model: Mutex::new(model) }))
    }

    fn dialogue(&self) -> Result<Arc<dyn Dialogue>, ModelError> {
        let config = ConversationConfig {
            max_length: Some(self.chat.max_length),
            do_sample: true,
            temperature: self.chat.temperature,
            top_k: self.chat.top_k,
            top_p: self.chat.top_p,
            ..Default::default()
        };
        let model = ConversationModel::new(config).map_err(load_error(ModelKind::Dialogue))?;
        Ok(Arc::new(BertDialogue { model: Mutex::new(model) }))
    }
}

struct BertSentiment {
    model: Mutex<SentimentModel>,
}

impl TextClassifier for BertSentiment {
    fn classify(&self, texts: &[&str]) -> Result<Vec<Classification>, ModelError> {
        let model = lock(&self.model, ModelKind::Sentiment)?;
        Ok(model
            .predict(texts)
            .into_iter()
            .map(|s| Classification {
                label: match s.polarity {
                    SentimentPolarity::Positive => "POSITIVE",
                    SentimentPolarity::Negative => "NEGATIVE",
                }
                .to_string(),
                score: s.score,
            })
            .collect())
    }

    fn kind(&self) -> ModelKind {
        ModelKind::Sentiment
    }
}

struct BertClassifier {
    model: Mutex<SequenceClassificationModel>,
    multi_label: bool,
}

impl TextClassifier for BertClassifier {
    fn classify(&self, texts: &[&str]) -> Result<Vec<Classification>, ModelError> {
        let model = lock(&self.model, ModelKind::Moderation)?;
        if !self.multi_label {
            return Ok(model
                .predict(texts)
                .into_iter()
                .map(|label| Classification { label: label.text, score: label.score })
                .collect());
        }
        model
            .predict_multilabel(texts, 0.0)
            .map_err(inference_error(ModelKind::Moderation))?
            .into_iter()
            .map(|labels| strongest(labels).ok_or(ModelError::EmptyOutput(ModelKind::Moderation)))
            .collect()
    }

    fn kind(&self) -> ModelKind {
        ModelKind::Moderation
    }
}

/// Highest-scoring label of a multi-label prediction.
fn strongest(labels: Vec<Label>) -> Option<Classification> {
    labels
        .into_iter()
        .max_by(|a, b| a.score.total_cmp(&b.score))
        .map(|label| Classification { label: label.text, score: label.score })
}

struct BertGenerator {
    model: Mutex<GPT2Generator>,
}

impl TextGenerator for BertGenerator {
    fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<Vec<String>, ModelError> {
        let model = lock(&self.model, ModelKind::Generation)?;
        let generate_options = GenerateOptions {
            max_new_tokens: Some(options.max_new_tokens),
            num_return_sequences: Some(options.num_return_sequences),
            do_sample: Some(true),
            temperature: Some(options.temperature),
            top_k: Some(options.top_k),
            top_p: Some(options.top_p),
            ..Default::default()
        };
        let output = model
            .generate(Some(&[prompt][..]), Some(generate_options))
            .map_err(inference_error(ModelKind::Generation))?;
        debug!("Generated {} sequence(s)", output.len());
        Ok(output.into_iter().map(|o| o.text).collect())
    }
}

struct BertQa {
    model: Mutex<QuestionAnsweringModel>,
}

impl QuestionAnswerer for BertQa {
    fn answer(&self, question: &str, context: &str) -> Result<Option<Answer>, ModelError> {
        let model = lock(&self.model, ModelKind::QuestionAnswering)?;
        let input = QaInput { question: question.to_string(), context: context.to_string() };
        let best = model
            .predict(&[input], 1, 1)
            .into_iter()
            .next()
            .and_then(|answers| answers.into_iter().next());
        Ok(best.map(|a| Answer { answer: a.answer, score: a.score, start: a.start, end: a.end }))
    }
}

struct BertDialogue {
    model: Mutex<ConversationModel>,
}

impl Dialogue for BertDialogue {
    fn respond(&self, history: &DialogueHistory, input: &str) -> Result<DialogueTurn, ModelError> {
        let model = lock(&self.model, ModelKind::Dialogue)?;

        let prior_tokens = history.token_history();
        let prior_len = prior_tokens.len();
        let mut manager = ConversationManager::new();
        let id = manager.add(Conversation {
            past_user_inputs: history.user_inputs(),
            generated_responses: history.replies(),
            new_user_input: Some(input.to_string()),
            history: prior_tokens,
        });

        let reply = model
            .generate_responses(&mut manager)
            .map_err(inference_error(ModelKind::Dialogue))?
            .get(&id)
            .map(|r| r.to_string())
            .ok_or(ModelError::EmptyOutput(ModelKind::Dialogue))?;

        // The model appends this exchange's token ids to the conversation.
        let tokens = manager
            .remove(&id)
            .and_then(|c| c.history.get(prior_len..).map(<[Vec<i64>]>::to_vec))
            .unwrap_or_default();

        Ok(DialogueTurn { user: input.to_string(), reply, tokens })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label(text: &str, score: f64) -> Label {
        Label { text: text.to_string(), score, id: 0, sentence: 0 }
    }

    #[test]
    fn test_strongest_picks_highest_independent_score() {
        let labels = vec![label("toxic", 0.97), label("insult", 0.91), label("obscene", 0.42)];
        let top = strongest(labels).unwrap();
        assert_eq!(top.label, "toxic");
        assert_eq!(top.score, 0.97);
    }

    #[test]
    fn test_strongest_empty() {
        assert_eq!(strongest(Vec::new()), None);
    }

    #[test]
    fn test_missing_preset_weights_fail_before_loading() {
        let mut model = ClassifierModel::toxic();
        model.weights = "/nonexistent/toxic-bert/rust_model.ot".to_string();
        let provider = BertProvider::new(model, ChatSettings::default());
        match provider.moderation() {
            Err(ModelError::Load { kind, reason }) => {
                assert_eq!(kind, ModelKind::Moderation);
                assert!(reason.contains("/nonexistent/toxic-bert/rust_model.ot"));
                assert!(reason.contains("convert_model.py"));
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("expected a load error"),
        }
    }
}
