//! AI provider abstraction.
//!
//! Two kinds of backend are supported, selected once per job:
//!
//! - **Chat** providers hold a multi-turn multimodal conversation. Each segment
//!   is one turn carrying frames and an optional uploaded audio clip.
//! - **Transcribe-then-summarize** providers have no conversation state. Each
//!   segment's audio is transcribed, and one summary call runs at the end.
//!
//! Retryability of a failed call is carried by the error variant
//! ([`VidlensError::ProviderOverloaded`], [`VidlensError::ProviderTimeout`]).

mod gemini;
mod openai;

pub use gemini::GeminiClient;
pub use openai::OpenAiProvider;

use crate::analysis::ProviderKind;
use crate::config::Settings;
use crate::error::{Result, VidlensError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// A file stored on the provider side that must be deleted when the job ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteAsset {
    /// Provider handle used for deletion (e.g. `files/abc123`).
    pub handle: String,
    /// URI used to reference the file in a request.
    pub uri: String,
    pub mime_type: String,
}

/// An inline image attached to a turn.
#[derive(Debug, Clone)]
pub struct ImagePart {
    pub mime_type: String,
    pub data: Vec<u8>,
}

/// Everything sent to a chat provider for one segment.
#[derive(Debug, Clone, Default)]
pub struct TurnContent {
    pub prompt: String,
    pub images: Vec<ImagePart>,
    pub audio: Option<RemoteAsset>,
}

/// Uploads local media so it can be referenced by a later request.
#[async_trait]
pub trait AssetUploader: Send + Sync {
    /// Single upload attempt.
    async fn upload(&self, path: &Path, mime_type: &str) -> Result<RemoteAsset>;

    async fn delete(&self, asset: &RemoteAsset) -> Result<()>;
}

/// A stateful multimodal chat backend.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn start_conversation(&self) -> Result<Box<dyn ChatSession>>;
}

/// One conversation. History only grows when a turn succeeds, so a failed
/// attempt can be retried with the same content.
#[async_trait]
pub trait ChatSession: Send + Sync {
    async fn send_turn(&self, turn: &TurnContent) -> Result<String>;
}

/// A stateless transcription + summarization backend.
#[async_trait]
pub trait TranscribeSummarizeProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn transcribe(&self, audio_path: &Path) -> Result<String>;

    async fn summarize(&self, prompt: &str) -> Result<String>;
}

/// The provider selected for a job.
#[derive(Clone)]
pub enum ProviderAdapter {
    Chat {
        chat: Arc<dyn ChatProvider>,
        uploader: Arc<dyn AssetUploader>,
    },
    TranscribeSummarize(Arc<dyn TranscribeSummarizeProvider>),
}

impl ProviderAdapter {
    /// Build the adapter for a provider kind from settings.
    ///
    /// Fails with a configuration error when credentials are missing.
    pub fn from_settings(kind: ProviderKind, settings: &Settings) -> Result<Self> {
        let timeout = settings.retry.attempt_timeout();
        match kind {
            ProviderKind::Gemini => {
                let client = Arc::new(GeminiClient::new(&settings.gemini, timeout)?);
                Ok(ProviderAdapter::Chat {
                    chat: client.clone(),
                    uploader: client,
                })
            }
            ProviderKind::OpenAi => {
                if !crate::openai::is_api_key_configured() {
                    return Err(VidlensError::Config(
                        "OPENAI_API_KEY not set. Set it with: export OPENAI_API_KEY='sk-...'"
                            .to_string(),
                    ));
                }
                Ok(ProviderAdapter::TranscribeSummarize(Arc::new(
                    OpenAiProvider::with_config(&settings.openai, timeout)?,
                )))
            }
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ProviderAdapter::Chat { chat, .. } => chat.name(),
            ProviderAdapter::TranscribeSummarize(p) => p.name(),
        }
    }
}
