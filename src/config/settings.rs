//! Configuration settings for vidlens.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::analysis::{AnalysisType, ProviderKind};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub analysis: AnalysisSettings,
    pub frames: FrameSettings,
    pub retry: RetrySettings,
    pub gemini: GeminiSettings,
    pub openai: OpenAiSettings,
    pub server: ServerSettings,
    pub prompts: PromptSettings,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Parent directory for per-job temporary directories.
    pub temp_dir: String,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            temp_dir: "/tmp/vidlens".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Defaults applied to jobs that do not specify their own parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
    pub analysis_type: AnalysisType,
    pub output_language: String,
    /// Number of segments to analyze.
    pub segment_count: u32,
    /// Length of each segment in seconds.
    pub segment_duration_seconds: f64,
    /// Seconds between extracted frames.
    pub frame_interval_seconds: f64,
    pub provider: ProviderKind,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            analysis_type: AnalysisType::General,
            output_language: "English".to_string(),
            segment_count: 2,
            segment_duration_seconds: 20.0,
            frame_interval_seconds: 2.0,
            provider: ProviderKind::Gemini,
        }
    }
}

/// Image format for extracted frames.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FrameFormat {
    #[default]
    Jpg,
    Png,
}

impl FrameFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            FrameFormat::Jpg => "jpg",
            FrameFormat::Png => "png",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            FrameFormat::Jpg => "image/jpeg",
            FrameFormat::Png => "image/png",
        }
    }
}

/// Frame extraction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameSettings {
    /// Downscale width in pixels; height keeps the aspect ratio. None keeps the source size.
    pub width: Option<u32>,
    /// ffmpeg `-qscale:v` value (2 = best, 31 = worst).
    pub quality: u8,
    pub format: FrameFormat,
}

impl Default for FrameSettings {
    fn default() -> Self {
        Self {
            width: Some(768),
            quality: 5,
            format: FrameFormat::Jpg,
        }
    }
}

/// Provider retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Total attempts per provider call, including the first.
    pub max_retries: u32,
    /// Backoff before the second attempt; doubles after each failure.
    pub initial_delay_ms: u64,
    /// Upper bound for a single provider attempt.
    pub attempt_timeout_secs: u64,
    /// Treat per-attempt timeouts as transient.
    pub retry_on_timeout: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 2000,
            attempt_timeout_secs: 300,
            retry_on_timeout: true,
        }
    }
}

impl RetrySettings {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }
}

/// Gemini (stateful multimodal chat) backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiSettings {
    pub model: String,
    pub api_base: String,
    /// API key. Falls back to the GOOGLE_API_KEY environment variable.
    pub api_key: Option<String>,
}

impl Default for GeminiSettings {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-flash".to_string(),
            api_base: "https://generativelanguage.googleapis.com".to_string(),
            api_key: None,
        }
    }
}

impl GeminiSettings {
    /// Resolve the API key from config or environment.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var("GOOGLE_API_KEY").ok())
            .filter(|k| !k.is_empty())
    }
}

/// OpenAI (transcribe then summarize) backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiSettings {
    pub transcription_model: String,
    pub summary_model: String,
}

impl Default for OpenAiSettings {
    fn default() -> Self {
        Self {
            transcription_model: "whisper-1".to_string(),
            summary_model: "gpt-4o-mini".to_string(),
        }
    }
}

/// HTTP transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Where uploaded videos are stored until their job finishes.
    pub upload_dir: String,
    /// Allowed CORS origins. Empty allows any origin.
    pub cors_origins: Vec<String>,
    pub max_upload_bytes: usize,
    pub max_concurrent_jobs: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5001,
            upload_dir: "/tmp/vidlens/uploads".to_string(),
            cors_origins: vec!["http://localhost:3000".to_string()],
            max_upload_bytes: 1024 * 1024 * 1024,
            max_concurrent_jobs: 1,
        }
    }
}

/// Prompt customization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct PromptSettings {
    /// Directory containing an `analysis.toml` that overrides the default prompts.
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

    /// Save settings to a specific path.
    pub fn save_to(&self, path: &PathBuf) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::VidlensError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("vidlens")
            .join("config.toml")
    }

    /// Expand shell variables in paths (e.g., ~).
    pub fn expand_path(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).to_string())
    }

    /// Get the expanded temp directory path.
    pub fn temp_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.temp_dir)
    }

    /// Get the expanded upload directory path.
    pub fn upload_dir(&self) -> PathBuf {
        Self::expand_path(&self.server.upload_dir)
    }
}
