//! OpenAI backend: Whisper transcription per segment and a chat completion summary.

use super::TranscribeSummarizeProvider;
use crate::config::OpenAiSettings;
use crate::error::{Result, VidlensError};
use crate::openai::create_client_with_timeout;
use async_openai::error::OpenAIError;
use async_openai::types::{
    AudioResponseFormat, ChatCompletionRequestMessage, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs, CreateTranscriptionRequestArgs,
};
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, instrument};

/// Transcribe-then-summarize provider backed by OpenAI.
pub struct OpenAiProvider {
    client: async_openai::Client<async_openai::config::OpenAIConfig>,
    transcription_model: String,
    summary_model: String,
}

impl OpenAiProvider {
    pub fn with_config(settings: &OpenAiSettings, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: create_client_with_timeout(timeout)?,
            transcription_model: settings.transcription_model.clone(),
            summary_model: settings.summary_model.clone(),
        })
    }
}

#[async_trait]
impl TranscribeSummarizeProvider for OpenAiProvider {
    fn name(&self) -> &str {
        &self.summary_model
    }

    #[instrument(skip(self), fields(audio_path = %audio_path.display()))]
    async fn transcribe(&self, audio_path: &Path) -> Result<String> {
        let file_bytes = tokio::fs::read(audio_path).await?;

        let request = CreateTranscriptionRequestArgs::default()
            .file(async_openai::types::AudioInput::from_vec_u8(
                audio_path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or("audio.mp3")
                    .to_string(),
                file_bytes,
            ))
            .model(&self.transcription_model)
            .response_format(AudioResponseFormat::Json)
            .build()
            .map_err(|e| VidlensError::ProviderFatal(format!("Failed to build request: {}", e)))?;

        let response = self
            .client
            .audio()
            .transcribe(request)
            .await
            .map_err(classify_error)?;

        debug!("Transcribed {} chars", response.text.len());
        Ok(response.text.trim().to_string())
    }

    #[instrument(skip(self, prompt), fields(prompt_len = prompt.len()))]
    async fn summarize(&self, prompt: &str) -> Result<String> {
        let messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestUserMessageArgs::default()
                .content(prompt.to_string())
                .build()
                .map_err(|e| VidlensError::ProviderFatal(e.to_string()))?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.summary_model)
            .messages(messages)
            .temperature(0.3)
            .build()
            .map_err(|e| VidlensError::ProviderFatal(e.to_string()))?;

        let response = self.client.chat().create(request).await.map_err(classify_error)?;

        response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| VidlensError::ProviderFatal("Empty response from LLM".to_string()))
    }
}

/// Map an OpenAI client error to a typed provider error.
fn classify_error(e: OpenAIError) -> VidlensError {
    match &e {
        OpenAIError::Reqwest(err) if err.is_timeout() => {
            VidlensError::ProviderTimeout(e.to_string())
        }
        OpenAIError::ApiError(api) if api.r#type.as_deref() == Some("server_error") => {
            VidlensError::ProviderOverloaded(api.message.clone())
        }
        _ => VidlensError::ProviderFatal(format!("OpenAI API error: {}", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_openai::error::ApiError;

    fn api_error(kind: Option<&str>) -> OpenAIError {
        OpenAIError::ApiError(ApiError {
            message: "The server is overloaded".to_string(),
            r#type: kind.map(str::to_string),
            param: None,
            code: None,
        })
    }

    #[test]
    fn test_rate_limit_is_fatal() {
        let rate_limited = OpenAIError::ApiError(ApiError {
            message: "Rate limit reached for requests".to_string(),
            r#type: Some("requests".to_string()),
            param: None,
            code: None,
        });
        let err = classify_error(rate_limited);
        assert!(matches!(err, VidlensError::ProviderFatal(_)));
        assert!(!err.is_retryable());
        assert!(!err.is_timeout());
    }

    #[test]
    fn test_server_error_is_overloaded() {
        assert!(classify_error(api_error(Some("server_error"))).is_retryable());
    }

    #[test]
    fn test_other_api_errors_are_fatal() {
        assert!(matches!(
            classify_error(api_error(Some("invalid_request_error"))),
            VidlensError::ProviderFatal(_)
        ));
        assert!(matches!(classify_error(api_error(None)), VidlensError::ProviderFatal(_)));
        assert!(matches!(
            classify_error(OpenAIError::InvalidArgument("bad".into())),
            VidlensError::ProviderFatal(_)
        ));
    }

    #[test]
    fn test_provider_creation() {
        let provider =
            OpenAiProvider::with_config(&OpenAiSettings::default(), Duration::from_secs(10))
                .unwrap();
        assert_eq!(provider.name(), "gpt-4o-mini");
        assert_eq!(provider.transcription_model, "whisper-1");
    }
}
