//! Open-ended text generation.

use super::{ModelError, ModelKind};

/// Sampling parameters, passed through to the model unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOptions {
    pub max_new_tokens: i64,
    pub temperature: f64,
    pub top_k: i64,
    pub top_p: f64,
    pub num_return_sequences: i64,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            max_new_tokens: 100,
            temperature: 0.8,
            top_k: 50,
            top_p: 0.95,
            num_return_sequences: 1,
        }
    }
}

/// A causal language model.
pub trait TextGenerator: Send + Sync {
    /// Generate `options.num_return_sequences` continuations of `prompt`.
    /// Each returned text includes the prompt.
    fn generate(&self, prompt: &str, options: &GenerationOptions)
    -> Result<Vec<String>, ModelError>;

    /// Generate a single continuation.
    fn generate_one(&self, prompt: &str, options: &GenerationOptions) -> Result<String, ModelError> {
        let options = GenerationOptions { num_return_sequences: 1, ..options.clone() };
        self.generate(prompt, &options)?
            .into_iter()
            .next()
            .ok_or(ModelError::EmptyOutput(ModelKind::Generation))
    }

    /// Finish an incomplete sentence with a conservative temperature.
    fn complete_sentence(&self, text: &str, max_new_tokens: i64) -> Result<String, ModelError> {
        let options = GenerationOptions {
            max_new_tokens,
            temperature: 0.7,
            ..GenerationOptions::default()
        };
        self.generate_one(text, &options)
    }
}
