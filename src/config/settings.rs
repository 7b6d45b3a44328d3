//! Configuration settings for askvid.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub generation: GenerationSettings,
    pub embedding: EmbeddingSettings,
    pub transcript: TranscriptSettings,
    pub remote_cache: RemoteCacheSettings,
    pub dispatch: DispatchSettings,
    pub context: ContextSettings,
    pub batch: BatchSettings,
    pub prompts: PromptSettings,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Directory holding the per-video caches.
    pub data_dir: String,
    /// Directory for temporary files (subtitle downloads).
    pub temp_dir: String,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            data_dir: "~/.askvid".to_string(),
            temp_dir: "/tmp/askvid".to_string(),
            log_level: "warn".to_string(),
        }
    }
}

/// Answer-generation backend.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GenerationProvider {
    /// OpenAI chat completions (no server-side transcript cache).
    #[default]
    OpenAI,
    /// Google Gemini with `cachedContents` support.
    Gemini,
}

impl GenerationProvider {
    /// Environment variable holding this provider's API key.
    pub fn api_key_var(&self) -> &'static str {
        match self {
            GenerationProvider::OpenAI => "OPENAI_API_KEY",
            GenerationProvider::Gemini => "GEMINI_API_KEY",
        }
    }

    /// Model used when none is configured for this provider.
    pub fn default_model(&self) -> &'static str {
        match self {
            GenerationProvider::OpenAI => "gpt-4o-mini",
            GenerationProvider::Gemini => "gemini-1.5-flash-001",
        }
    }
}

impl std::str::FromStr for GenerationProvider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(GenerationProvider::OpenAI),
            "gemini" | "google" => Ok(GenerationProvider::Gemini),
            _ => Err(format!("Unknown generation provider: {}", s)),
        }
    }
}

impl std::fmt::Display for GenerationProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GenerationProvider::OpenAI => write!(f, "openai"),
            GenerationProvider::Gemini => write!(f, "gemini"),
        }
    }
}

/// Answer-generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    pub provider: GenerationProvider,
    /// Model name for the selected provider.
    pub model: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
    /// Base URL of the Gemini REST API.
    pub gemini_base_url: String,
    /// Per-request HTTP timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            provider: GenerationProvider::OpenAI,
            model: GenerationProvider::OpenAI.default_model().to_string(),
            temperature: 0.2,
            max_output_tokens: 1024,
            gemini_base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            request_timeout_secs: crate::openai::DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// Embedding generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// Disable to run without semantic neighbors.
    pub enabled: bool,
    /// Embedding model to use.
    pub model: String,
    /// Embedding dimensions.
    pub dimensions: u32,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            model: "text-embedding-3-small".to_string(),
            dimensions: 1536,
        }
    }
}

/// Transcript fetching and chunking settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptSettings {
    /// Subtitle language requested from yt-dlp.
    pub language: String,
    /// Maximum characters per transcript chunk.
    pub max_chunk_chars: usize,
    /// Token budget for transcript text inlined into a prompt.
    pub context_budget_tokens: usize,
}

impl Default for TranscriptSettings {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            max_chunk_chars: 8000,
            context_budget_tokens: 24_000,
        }
    }
}

/// Server-side transcript cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteCacheSettings {
    pub enabled: bool,
    /// Minimum estimated transcript tokens before a remote cache is created.
    pub min_tokens: usize,
    /// Lifetime requested for the remote cache.
    pub ttl_secs: u64,
}

impl Default for RemoteCacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            min_tokens: crate::cache::REMOTE_CACHE_MIN_TOKENS,
            ttl_secs: 3600,
        }
    }
}

/// Rate limiting and retry settings for model calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchSettings {
    /// Maximum requests started per window.
    pub max_per_window: u32,
    /// Window length in seconds.
    pub window_secs: u64,
    /// Maximum concurrently in-flight requests.
    pub max_concurrent: usize,
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            max_per_window: 60,
            window_secs: 60,
            max_concurrent: 4,
            max_retries: 3,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
        }
    }
}

/// How semantic neighbors are included in a prompt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NeighborPolicy {
    /// Include the top-k question/answer pairs as stored.
    #[default]
    Verbatim,
    /// Include only the neighbor questions.
    QuestionsOnly,
    /// Do not include neighbors.
    Off,
}

/// Prompt context assembly settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextSettings {
    /// Number of related prior questions to retrieve.
    pub neighbors: usize,
    pub neighbor_policy: NeighborPolicy,
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            neighbors: 3,
            neighbor_policy: NeighborPolicy::Verbatim,
        }
    }
}

/// Batch run settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchSettings {
    /// Question set used when no question file is given.
    pub questions: Vec<String>,
    /// Default path of the batch report.
    pub output: String,
    /// Per-question timeout; 0 disables it.
    pub question_timeout_secs: u64,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            questions: vec![
                "What is the main topic of this video?".to_string(),
                "What are the key points the speaker makes?".to_string(),
                "Are there any examples or case studies mentioned?".to_string(),
                "What conclusions does the speaker reach?".to_string(),
                "Does the speaker recommend any next steps or resources?".to_string(),
            ],
            output: "results.json".to_string(),
            question_timeout_secs: 0,
        }
    }
}

/// Prompt customization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct PromptSettings {
    /// Directory for custom prompts (overrides defaults).
    pub custom_dir: Option<String>,
    /// Custom variables available in all prompts as {{variable_name}}.
    pub variables: std::collections::HashMap<String, String>,
}

impl Settings {
    /// Load settings from the default configuration file.
    pub fn load() -> crate::error::Result<Self> {
        Self::load_from(None)
    }

    /// Load settings from a specific path, or default location if None.
    pub fn load_from(path: Option<&PathBuf>) -> crate::error::Result<Self> {
        let config_path = match path {
            Some(p) => p.clone(),
            None => Self::default_config_path(),
        };

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let settings: Settings = toml::from_str(&content)?;
            Ok(settings)
        } else {
            Ok(Settings::default())
        }
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("askvid")
            .join("config.toml")
    }

    /// Expand shell variables in paths (e.g., ~).
    pub fn expand_path(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).to_string())
    }

    /// Get the expanded data directory path.
    pub fn data_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.data_dir)
    }

    /// Get the expanded temp directory path.
    pub fn temp_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.temp_dir)
    }

    /// Directory holding one cache store per video.
    pub fn videos_dir(&self) -> PathBuf {
        self.data_dir().join("videos")
    }

    /// Switch the generation provider, picking that provider's default model
    /// when the configured one belongs to the other provider.
    pub fn with_provider(mut self, provider: GenerationProvider) -> Self {
        if self.generation.provider != provider {
            self.generation.provider = provider;
            self.generation.model = provider.default_model().to_string();
        }
        self
    }
}
