use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use teloxide::types::ChatId;

use crate::models::GenerationOptions;

/// Environment variable that overrides `telegram_bot_token`.
pub const TOKEN_ENV: &str = "TELEGRAM_BOT_TOKEN";

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read the config file.
    ReadFile { path: PathBuf, source: std::io::Error },
    /// Failed to parse JSON.
    ParseJson { path: PathBuf, source: serde_json::Error },
    /// Validation error.
    Validation(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFile { path, source } => {
                write!(f, "failed to read config file '{}': {}", path.display(), source)
            }
            Self::ParseJson { path, source } => {
                write!(f, "failed to parse config file '{}': {}", path.display(), source)
            }
            Self::Validation(msg) => write!(f, "config validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ReadFile { source, .. } => Some(source),
            Self::ParseJson { source, .. } => Some(source),
            Self::Validation(_) => None,
        }
    }
}

/// Transformer architecture of a custom classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Architecture {
    Bert,
    DistilBert,
    Roberta,
}

/// Where to find a sequence classifier. Each location is an `http(s)://` URL
/// (downloaded into the rust-bert cache) or a local path.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ClassifierModel {
    /// Short name, also used as the cache directory for remote files.
    pub name: String,
    pub architecture: Architecture,
    pub weights: String,
    pub config: String,
    pub vocab: String,
    #[serde(default)]
    pub merges: Option<String>,
    #[serde(default)]
    pub lower_case: bool,
    /// Labels are scored independently (sigmoid) instead of competing
    /// (softmax), as for toxic-bert.
    #[serde(default)]
    pub multi_label: bool,
}

impl ClassifierModel {
    /// unitary/toxic-bert. Neither preset publishes rust-bert weights, so
    /// `weights` is a local `rust_model.ot` converted with rust-bert's
    /// `utils/convert_model.py`; config and vocab are fetched from the hub.
    pub fn toxic() -> Self {
        let base = "https://huggingface.co/unitary/toxic-bert/resolve/main";
        Self {
            name: "toxic-bert".to_string(),
            architecture: Architecture::Bert,
            weights: "models/toxic-bert/rust_model.ot".to_string(),
            config: format!("{base}/config.json"),
            vocab: format!("{base}/vocab.txt"),
            merges: None,
            lower_case: true,
            multi_label: true,
        }
    }

    /// facebook/roberta-hate-speech-dynabench-r4-target.
    pub fn hate() -> Self {
        let base =
            "https://huggingface.co/facebook/roberta-hate-speech-dynabench-r4-target/resolve/main";
        Self {
            name: "roberta-hate-speech".to_string(),
            architecture: Architecture::Roberta,
            weights: "models/roberta-hate-speech/rust_model.ot".to_string(),
            config: format!("{base}/config.json"),
            vocab: format!("{base}/vocab.json"),
            merges: Some(format!("{base}/merges.txt")),
            lower_case: false,
            multi_label: false,
        }
    }

    /// Local files (non-URL locations) that do not exist.
    pub fn missing_local_files(&self) -> Vec<&str> {
        [Some(&self.weights), Some(&self.config), Some(&self.vocab), self.merges.as_ref()]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .filter(|location| !is_remote(location) && !Path::new(location).exists())
            .collect()
    }
}

pub fn is_remote(location: &str) -> bool {
    location.starts_with("https://") || location.starts_with("http://")
}

/// Moderation model selection as written in the file: a preset name or a
/// full custom description.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ModerationModelFile {
    Preset(String),
    Custom(ClassifierModel),
}

#[derive(Debug, Deserialize)]
struct ModerationFile {
    #[serde(default = "default_moderation_model")]
    model: ModerationModelFile,
    #[serde(default = "default_threshold")]
    threshold: f64,
    /// Labels that count as inappropriate. Defaults depend on the model.
    #[serde(default)]
    flag_labels: Vec<String>,
    /// Converted weights for a preset. Defaults to
    /// `<data_dir>/models/<preset>/rust_model.ot`.
    #[serde(default)]
    weights: Option<String>,
}

impl Default for ModerationFile {
    fn default() -> Self {
        Self {
            model: default_moderation_model(),
            threshold: default_threshold(),
            flag_labels: Vec::new(),
            weights: None,
        }
    }
}

fn default_moderation_model() -> ModerationModelFile {
    ModerationModelFile::Preset("toxic".to_string())
}

fn default_threshold() -> f64 {
    0.7
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModerationSettings {
    pub model: ClassifierModel,
    pub threshold: f64,
    /// Lowercased.
    pub flag_labels: Vec<String>,
}

/// Sampling settings for `/generate`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    pub max_new_tokens: i64,
    pub temperature: f64,
    pub top_k: i64,
    pub top_p: f64,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self { max_new_tokens: 100, temperature: 0.8, top_k: 50, top_p: 0.95 }
    }
}

impl GenerationSettings {
    pub fn options(&self) -> GenerationOptions {
        GenerationOptions {
            max_new_tokens: self.max_new_tokens,
            temperature: self.temperature,
            top_k: self.top_k,
            top_p: self.top_p,
            num_return_sequences: 1,
        }
    }
}

/// Conversation model and session settings for `/chat`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ChatSettings {
    /// Turns kept per user; older turns are forgotten.
    pub max_turns: usize,
    /// Sessions idle this long are dropped (0 = never).
    pub idle_timeout_minutes: u64,
    /// Token budget the model truncates its input context to.
    pub max_length: i64,
    pub temperature: f64,
    pub top_k: i64,
    pub top_p: f64,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            max_turns: 8,
            idle_timeout_minutes: 720,
            max_length: 1000,
            temperature: 0.7,
            top_k: 50,
            top_p: 0.95,
        }
    }
}

#[derive(Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    telegram_bot_token: String,
    /// Chats the bot answers in. Empty = everywhere.
    #[serde(default)]
    allowed_chats: Vec<i64>,
    /// Directory for logs. Defaults to current directory.
    data_dir: Option<String>,
    #[serde(default)]
    moderation: ModerationFile,
    #[serde(default)]
    generation: GenerationSettings,
    #[serde(default)]
    chat: ChatSettings,
}

pub struct Config {
    pub telegram_bot_token: String,
    pub allowed_chats: HashSet<ChatId>,
    /// Directory for logs.
    pub data_dir: PathBuf,
    pub moderation: ModerationSettings,
    pub generation: GenerationSettings,
    pub chat: ChatSettings,
}

impl Config {
    /// Load the config file, letting `TELEGRAM_BOT_TOKEN` override the token.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Self::load_with_token(path, std::env::var(TOKEN_ENV).ok().filter(|t| !t.is_empty()))
    }

    /// Load with an explicit token override. A missing file is fine when the
    /// override supplies the token.
    pub fn load_with_token<P: AsRef<Path>>(
        path: P,
        token_override: Option<String>,
    ) -> Result<Self, ConfigError> {
        let config_path = path.as_ref().to_path_buf();
        let mut file: ConfigFile = if !config_path.exists() && token_override.is_some() {
            ConfigFile::default()
        } else {
            let content = std::fs::read_to_string(&config_path)
                .map_err(|e| ConfigError::ReadFile { path: config_path.clone(), source: e })?;
            serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseJson { path: config_path.clone(), source: e })?
        };

        if let Some(token) = token_override {
            file.telegram_bot_token = token;
        }

        if file.telegram_bot_token.is_empty() {
            return Err(ConfigError::Validation(format!(
                "telegram_bot_token is required (set it in the config file or {TOKEN_ENV})"
            )));
        }
        // Telegram tokens are formatted as {bot_id}:{secret} where bot_id is numeric
        let token_parts: Vec<&str> = file.telegram_bot_token.split(':').collect();
        if token_parts.len() != 2 || token_parts[0].parse::<u64>().is_err() || token_parts[1].is_empty() {
            return Err(ConfigError::Validation(
                "telegram_bot_token appears invalid (expected format: 123456789:ABCdefGHI...)".into()
            ));
        }

        let data_dir = file
            .data_dir
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        let moderation = validate_moderation(file.moderation, &data_dir)?;
        validate_generation(&file.generation)?;
        validate_chat(&file.chat)?;

        Ok(Self {
            telegram_bot_token: file.telegram_bot_token,
            allowed_chats: file.allowed_chats.into_iter().map(ChatId).collect(),
            data_dir,
            moderation,
            generation: file.generation,
            chat: file.chat,
        })
    }

    pub fn is_allowed_chat(&self, chat_id: ChatId) -> bool {
        self.allowed_chats.is_empty() || self.allowed_chats.contains(&chat_id)
    }
}

fn validate_moderation(file: ModerationFile, data_dir: &Path) -> Result<ModerationSettings, ConfigError> {
    let (model, default_labels) = match file.model {
        ModerationModelFile::Preset(name) => {
            let (mut model, labels) = match name.to_lowercase().as_str() {
                "toxic" => (ClassifierModel::toxic(), vec!["toxic"]),
                "hate" => (ClassifierModel::hate(), vec!["hate"]),
                other => {
                    return Err(ConfigError::Validation(format!(
                        "unknown moderation model '{other}' (expected \"toxic\", \"hate\" or a custom model)"
                    )));
                }
            };
            model.weights = match file.weights {
                Some(weights) if is_remote(&weights) => {
                    return Err(ConfigError::Validation(format!(
                        "moderation.weights must be a local path to a converted rust_model.ot, got '{weights}'"
                    )));
                }
                Some(weights) => weights,
                None => data_dir.join(&model.weights).to_string_lossy().into_owned(),
            };
            (model, labels)
        }
        ModerationModelFile::Custom(custom) => {
            if file.weights.is_some() {
                return Err(ConfigError::Validation(
                    "moderation.weights only applies to presets; set weights inside the custom model".into(),
                ));
            }
            (custom, vec!["toxic", "hate", "label_1"])
        }
    };

    if !(0.0..=1.0).contains(&file.threshold) {
        return Err(ConfigError::Validation(format!(
            "moderation.threshold must be between 0 and 1, got {}",
            file.threshold
        )));
    }

    let flag_labels: Vec<String> = if file.flag_labels.is_empty() {
        default_labels.into_iter().map(String::from).collect()
    } else {
        file.flag_labels.iter().map(|l| l.trim().to_lowercase()).collect()
    };
    if flag_labels.iter().any(|l| l.is_empty()) {
        return Err(ConfigError::Validation("moderation.flag_labels contains an empty label".into()));
    }

    Ok(ModerationSettings { model, threshold: file.threshold, flag_labels })
}

fn validate_sampling(section: &str, temperature: f64, top_p: f64, top_k: i64) -> Result<(), ConfigError> {
    if temperature <= 0.0 {
        return Err(ConfigError::Validation(format!("{section}.temperature must be positive")));
    }
    if !(top_p > 0.0 && top_p <= 1.0) {
        return Err(ConfigError::Validation(format!("{section}.top_p must be in (0, 1]")));
    }
    if top_k < 0 {
        return Err(ConfigError::Validation(format!("{section}.top_k must not be negative")));
    }
    Ok(())
}

fn validate_generation(generation: &GenerationSettings) -> Result<(), ConfigError> {
    if generation.max_new_tokens < 1 {
        return Err(ConfigError::Validation("generation.max_new_tokens must be at least 1".into()));
    }
    validate_sampling("generation", generation.temperature, generation.top_p, generation.top_k)
}

fn validate_chat(chat: &ChatSettings) -> Result<(), ConfigError> {
    if chat.max_turns < 1 {
        return Err(ConfigError::Validation("chat.max_turns must be at least 1".into()));
    }
    if chat.max_length < 1 {
        return Err(ConfigError::Validation("chat.max_length must be at least 1".into()));
    }
    validate_sampling("chat", chat.temperature, chat.top_p, chat.top_k)
}
