
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

use crate::document::chunking::ChunkingConfig;
use crate::language::NonEnglishRouting;
use crate::language::lexicon::LexiconEntry;

/// Environment variable overriding the base directory
pub const HOME_ENV_VAR: &str = "PDF_QA_HOME";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub translation: TranslationConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub language: LanguageConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OllamaConfig {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub embedding_model: String,
    pub chat_model: String,
    pub batch_size: u32,
    pub timeout_seconds: u64,
    pub retry_attempts: u32,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            protocol: "http".to_string(),
            host: "localhost".to_string(),
            port: 11434,
            embedding_model: "nomic-embed-text:latest".to_string(),
            chat_model: "llama3".to_string(),
            batch_size: 16,
            timeout_seconds: 120,
            retry_attempts: 3,
        }
    }
}

/// Connection settings for the machine translation service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TranslationConfig {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub path: String,
    pub timeout_seconds: u64,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            protocol: "http".to_string(),
            host: "localhost".to_string(),
            port: 5005,
            path: "/translate".to_string(),
            timeout_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { top_k: 5 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LanguageConfig {
    pub non_english_routing: NonEnglishRouting,
    pub lexicon: Vec<LexiconEntry>,
}

impl Default for LanguageConfig {
    fn default() -> Self {
        Self {
            non_english_routing: NonEnglishRouting::default(),
            lexicon: LexiconEntry::defaults(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SessionConfig {
    /// Idle time after which a session is evicted
    pub ttl_seconds: u64,
    /// Oldest turns are dropped beyond this many messages; 0 keeps everything
    pub max_history_messages: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: 3600,
            max_history_messages: 0,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ollama: OllamaConfig::default(),
            translation: TranslationConfig::default(),
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig::default(),
            language: LanguageConfig::default(),
            session: SessionConfig::default(),
            base_dir: PathBuf::new(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid port: {0} (must be between 1 and 65535)")]
    InvalidPort(u16),
    #[error("Invalid batch size: {0} (must be between 1 and 1000)")]
    InvalidBatchSize(u32),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid protocol: {0} (must be 'http' or 'https')")]
    InvalidProtocol(String),
    #[error("Invalid timeout: {0} (must be between 1 and 3600 seconds)")]
    InvalidTimeout(u64),
    #[error("Invalid retry attempts: {0} (must be between 1 and 10)")]
    InvalidRetryAttempts(u32),
    #[error("Invalid top_k: {0} (must be between 1 and 100)")]
    InvalidTopK(usize),
    #[error("Invalid minimum text length: {0} (must be between 1 and 200)")]
    InvalidMinTextLength(usize),
    #[error("Invalid window size: {0} words (must be between 10 and 5000)")]
    InvalidWindowWords(usize),
    #[error("Invalid summary budget: {0} characters (must be at least 1000)")]
    InvalidSummaryBudget(usize),
    #[error("Invalid session TTL: {0} seconds (must be between 1 and 604800)")]
    InvalidSessionTtl(u64),
    #[error("Invalid history limit: {0} messages (must be 0 or an even number of whole exchanges)")]
    InvalidHistoryLimit(usize),
    #[error("Invalid lexicon entry: '{0}' (terms must be non-empty lowercase words)")]
    InvalidLexiconEntry(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    /// Base directory: `$PDF_QA_HOME` when set, otherwise `~/.pdf-qa`
    #[inline]
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        if let Some(dir) = std::env::var_os(HOME_ENV_VAR).filter(|v| !v.is_empty()) {
            return Ok(PathBuf::from(dir));
        }

        dirs::home_dir()
            .map(|home| home.join(".pdf-qa"))
            .or_else(|| dirs::data_dir().map(|data| data.join("pdf-qa")))
            .ok_or(ConfigError::DirectoryError)
    }

    #[inline]
    pub fn load() -> Result<Self> {
        let config_dir = Self::config_dir().context("Failed to determine config directory")?;
        Self::load_from(config_dir)
    }

    #[inline]
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join("config.toml");

        if !config_path.exists() {
            return Ok(Self {
                base_dir: config_dir.as_ref().to_path_buf(),
                ..Self::default()
            });
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.base_dir = config_dir.as_ref().to_path_buf();

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        let config_dir = self.get_base_dir();

        fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        let config_path = self.config_file_path();
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    /// Get the base directory for the application
    #[inline]
    pub fn get_base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.get_base_dir().join("config.toml")
    }

    /// Directory holding the per-session vector tables and chunk metadata files
    #[inline]
    pub fn index_dir(&self) -> PathBuf {
        self.get_base_dir().join("indexes")
    }

    #[inline]
    pub fn ollama_url(&self) -> Result<Url, ConfigError> {
        self.ollama.ollama_url()
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ollama.validate()?;
        self.translation.validate()?;
        self.validate_chunking_config()?;

        if !(1..=100).contains(&self.retrieval.top_k) {
            return Err(ConfigError::InvalidTopK(self.retrieval.top_k));
        }

        if !(1..=604_800).contains(&self.session.ttl_seconds) {
            return Err(ConfigError::InvalidSessionTtl(self.session.ttl_seconds));
        }

        if self.session.max_history_messages % 2 != 0 {
            return Err(ConfigError::InvalidHistoryLimit(
                self.session.max_history_messages,
            ));
        }

        for entry in &self.language.lexicon {
            let term = entry.term.trim();
            if term.is_empty() || term != entry.term || term.to_lowercase() != term {
                return Err(ConfigError::InvalidLexiconEntry(entry.term.clone()));
            }
        }

        Ok(())
    }

    fn validate_chunking_config(&self) -> Result<(), ConfigError> {
        let config = &self.chunking;

        if !(1..=200).contains(&config.min_text_length) {
            return Err(ConfigError::InvalidMinTextLength(config.min_text_length));
        }

        if !(10..=5000).contains(&config.window_words) {
            return Err(ConfigError::InvalidWindowWords(config.window_words));
        }

        if config.summary_max_chars < 1000 {
            return Err(ConfigError::InvalidSummaryBudget(config.summary_max_chars));
        }

        Ok(())
    }
}

fn validate_endpoint(protocol: &str, host: &str, port: u16) -> Result<Url, ConfigError> {
    if protocol != "http" && protocol != "https" {
        return Err(ConfigError::InvalidProtocol(protocol.to_string()));
    }

    if port == 0 {
        return Err(ConfigError::InvalidPort(port));
    }

    let url_str = format!("{}://{}:{}", protocol, host, port);
    Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))
}

impl OllamaConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_endpoint(&self.protocol, &self.host, self.port)?;

        if self.embedding_model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.embedding_model.clone()));
        }

        if self.chat_model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.chat_model.clone()));
        }

        if self.batch_size == 0 || self.batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(self.batch_size));
        }

        if !(1..=3600).contains(&self.timeout_seconds) {
            return Err(ConfigError::InvalidTimeout(self.timeout_seconds));
        }

        if !(1..=10).contains(&self.retry_attempts) {
            return Err(ConfigError::InvalidRetryAttempts(self.retry_attempts));
        }

        Ok(())
    }

    pub fn ollama_url(&self) -> Result<Url, ConfigError> {
        validate_endpoint(&self.protocol, &self.host, self.port)
    }

    pub fn set_protocol(&mut self, protocol: String) -> Result<(), ConfigError> {
        if protocol != "http" && protocol != "https" {
            return Err(ConfigError::InvalidProtocol(protocol));
        }
        self.protocol = protocol;
        Ok(())
    }

    pub fn set_host(&mut self, host: String) -> Result<(), ConfigError> {
        let temp_config = OllamaConfig {
            host: host.clone(),
            ..self.clone()
        };
        temp_config.validate()?;
        self.host = host;
        Ok(())
    }

    pub fn set_port(&mut self, port: u16) -> Result<(), ConfigError> {
        if port == 0 {
            return Err(ConfigError::InvalidPort(port));
        }
        self.port = port;
        Ok(())
    }

    pub fn set_embedding_model(&mut self, model: String) -> Result<(), ConfigError> {
        if model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(model));
        }
        self.embedding_model = model;
        Ok(())
    }

    pub fn set_chat_model(&mut self, model: String) -> Result<(), ConfigError> {
        if model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(model));
        }
        self.chat_model = model;
        Ok(())
    }

    pub fn set_batch_size(&mut self, batch_size: u32) -> Result<(), ConfigError> {
        if batch_size == 0 || batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(batch_size));
        }
        self.batch_size = batch_size;
        Ok(())
    }
}

impl TranslationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.endpoint_url().map(|_| ())?;

        if !(1..=3600).contains(&self.timeout_seconds) {
            return Err(ConfigError::InvalidTimeout(self.timeout_seconds));
        }

        Ok(())
    }

    /// Full URL of the translate endpoint
    pub fn endpoint_url(&self) -> Result<Url, ConfigError> {
        let base = validate_endpoint(&self.protocol, &self.host, self.port)?;
        base.join(&self.path)
            .map_err(|_| ConfigError::InvalidUrl(format!("{}{}", base, self.path)))
    }
}
