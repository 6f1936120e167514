//! Configuration module for vidlens.
//!
//! Handles loading and managing application settings and prompt templates.

mod prompts;
mod settings;

pub use prompts::{AnalysisPrompts, Prompts};
pub use settings::{
    AnalysisSettings, FrameFormat, FrameSettings, GeminiSettings, GeneralSettings,
    OpenAiSettings, PromptSettings, RetrySettings, ServerSettings, Settings,
};
