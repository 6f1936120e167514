//! Analysis job definition.

use crate::config::AnalysisSettings;
use crate::error::{Result, VidlensError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Kind of report to produce.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisType {
    /// General description of the video content.
    #[default]
    General,
    /// Meeting minutes.
    Meeting,
}

impl std::str::FromStr for AnalysisType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "general" | "video" => Ok(AnalysisType::General),
            "meeting" => Ok(AnalysisType::Meeting),
            _ => Err(format!("Unknown analysis type: {}", s)),
        }
    }
}

impl std::fmt::Display for AnalysisType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnalysisType::General => write!(f, "general"),
            AnalysisType::Meeting => write!(f, "meeting"),
        }
    }
}

/// AI backend used for a job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub enum ProviderKind {
    /// Gemini multimodal chat.
    #[default]
    #[serde(rename = "gemini")]
    Gemini,
    /// OpenAI transcription followed by a summary.
    #[serde(rename = "openai")]
    OpenAi,
}

impl std::str::FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gemini" | "google" => Ok(ProviderKind::Gemini),
            "openai" => Ok(ProviderKind::OpenAi),
            _ => Err(format!("Unknown provider: {}", s)),
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::Gemini => write!(f, "gemini"),
            ProviderKind::OpenAi => write!(f, "openai"),
        }
    }
}

/// One analysis request. Not modified after submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisJob {
    pub id: Uuid,
    pub video_source: PathBuf,
    pub analysis_type: AnalysisType,
    pub output_language: String,
    pub segment_count: u32,
    pub segment_duration_sec: f64,
    pub frame_interval_sec: f64,
    pub provider_kind: ProviderKind,
}

impl AnalysisJob {
    /// Create a job for `video_source` using the configured defaults.
    pub fn new(video_source: impl Into<PathBuf>, defaults: &AnalysisSettings) -> Self {
        Self {
            id: Uuid::new_v4(),
            video_source: video_source.into(),
            analysis_type: defaults.analysis_type,
            output_language: defaults.output_language.clone(),
            segment_count: defaults.segment_count,
            segment_duration_sec: defaults.segment_duration_seconds,
            frame_interval_sec: defaults.frame_interval_seconds,
            provider_kind: defaults.provider,
        }
    }

    pub fn with_analysis_type(mut self, analysis_type: AnalysisType) -> Self {
        self.analysis_type = analysis_type;
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.output_language = language.into();
        self
    }

    pub fn with_segments(mut self, count: u32, duration_sec: f64) -> Self {
        self.segment_count = count;
        self.segment_duration_sec = duration_sec;
        self
    }

    pub fn with_frame_interval(mut self, interval_sec: f64) -> Self {
        self.frame_interval_sec = interval_sec;
        self
    }

    pub fn with_provider(mut self, provider: ProviderKind) -> Self {
        self.provider_kind = provider;
        self
    }

    /// Check that the job parameters describe a runnable analysis.
    pub fn validate(&self) -> Result<()> {
        if self.segment_count == 0 {
            return Err(VidlensError::InvalidInput("segment count must be at least 1".into()));
        }
        if !(self.segment_duration_sec.is_finite() && self.segment_duration_sec > 0.0) {
            return Err(VidlensError::InvalidInput(format!(
                "segment duration must be positive, got {}",
                self.segment_duration_sec
            )));
        }
        if !(self.frame_interval_sec.is_finite() && self.frame_interval_sec > 0.0) {
            return Err(VidlensError::InvalidInput(format!(
                "frame interval must be positive, got {}",
                self.frame_interval_sec
            )));
        }
        if self.output_language.trim().is_empty() {
            return Err(VidlensError::InvalidInput("output language is empty".into()));
        }
        Ok(())
    }
}
