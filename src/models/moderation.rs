//! Content moderation on top of a toxicity / hate-speech classifier.

use std::sync::Arc;

use super::{Classification, ModelError, TextClassifier};

/// Outcome of a moderation check.
#[derive(Debug, Clone, PartialEq)]
pub struct ModerationVerdict {
    pub is_inappropriate: bool,
    pub label: String,
    pub confidence: f64,
}

/// Flags text whose top label is one of `flag_labels` with a score strictly
/// above the caller's threshold.
pub struct ContentModerator {
    classifier: Arc<dyn TextClassifier>,
    /// Lowercased.
    flag_labels: Vec<String>,
}

impl ContentModerator {
    pub fn new(classifier: Arc<dyn TextClassifier>, flag_labels: &[String]) -> Self {
        Self {
            classifier,
            flag_labels: flag_labels.iter().map(|l| l.to_lowercase()).collect(),
        }
    }

    pub fn check(&self, text: &str, threshold: f64) -> Result<ModerationVerdict, ModelError> {
        let result = self.classifier.classify_one(text)?;
        Ok(self.verdict(result, threshold))
    }

    /// Check several texts at once. Verdicts come back in input order.
    pub fn check_batch(
        &self,
        texts: &[&str],
        threshold: f64,
    ) -> Result<Vec<ModerationVerdict>, ModelError> {
        let results = self.classifier.classify(texts)?;
        Ok(results.into_iter().map(|r| self.verdict(r, threshold)).collect())
    }

    fn verdict(&self, result: Classification, threshold: f64) -> ModerationVerdict {
        let flagged_label = self.flag_labels.contains(&result.label.to_lowercase());
        ModerationVerdict {
            is_inappropriate: result.score > threshold && flagged_label,
            label: result.label,
            confidence: result.score,
        }
    }
}
