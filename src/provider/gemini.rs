//! Gemini REST backend: raw file upload, file deletion and multi-turn `generateContent`.

use super::{AssetUploader, ChatProvider, ChatSession, RemoteAsset, TurnContent};
use crate::config::GeminiSettings;
use crate::error::{Result, VidlensError};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info, instrument};
use url::Url;

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Gemini API client. Cheap to clone.
#[derive(Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    api_base: Url,
    api_key: String,
    model: String,
}

impl GeminiClient {
    /// Create a client from settings. Requests are bounded by `timeout`.
    pub fn new(settings: &GeminiSettings, timeout: Duration) -> Result<Self> {
        let api_key = settings.resolve_api_key().ok_or_else(|| {
            VidlensError::Config(
                "GOOGLE_API_KEY not set. Set it with: export GOOGLE_API_KEY='...' \
                 or [gemini] api_key"
                    .to_string(),
            )
        })?;

        let api_base = Url::parse(&settings.api_base)
            .map_err(|e| VidlensError::Config(format!("Invalid Gemini API base: {}", e)))?;

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VidlensError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            api_base,
            api_key,
            model: settings.model.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.api_base
            .join(path)
            .map_err(|e| VidlensError::Config(format!("Invalid Gemini endpoint {}: {}", path, e)))
    }

    /// Run one `generateContent` call over the full conversation.
    async fn generate(&self, contents: &[Content]) -> Result<String> {
        let url = self.endpoint(&format!("v1beta/models/{}:generateContent", self.model))?;

        let response = self
            .http
            .post(url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&GenerateContentRequest { contents })
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(classify_transport_error)?;

        if !status.is_success() {
            return Err(classify_status(status, &body));
        }

        let parsed: GenerateContentResponse = serde_json::from_str(&body)?;
        parsed.text()
    }
}

#[async_trait]
impl AssetUploader for GeminiClient {
    #[instrument(skip(self), fields(path = %path.display()))]
    async fn upload(&self, path: &Path, mime_type: &str) -> Result<RemoteAsset> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("media")
            .to_string();

        let url = self.endpoint("upload/v1beta/files")?;
        let response = self
            .http
            .post(url)
            .header(API_KEY_HEADER, &self.api_key)
            .header("X-Goog-Upload-Protocol", "raw")
            .header("X-Goog-File-Name", file_name)
            .header(reqwest::header::CONTENT_TYPE, mime_type)
            .body(bytes)
            .send()
            .await
            .map_err(|e| VidlensError::Upload(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| VidlensError::Upload(e.to_string()))?;

        if !status.is_success() {
            return Err(VidlensError::Upload(format!("{}: {}", status, error_message(&body))));
        }

        let uploaded: UploadResponse = serde_json::from_str(&body)
            .map_err(|e| VidlensError::Upload(format!("Unexpected upload response: {}", e)))?;

        info!("Uploaded {} as {}", path.display(), uploaded.file.name);
        Ok(RemoteAsset {
            handle: uploaded.file.name,
            uri: uploaded.file.uri,
            mime_type: uploaded.file.mime_type.unwrap_or_else(|| mime_type.to_string()),
        })
    }

    async fn delete(&self, asset: &RemoteAsset) -> Result<()> {
        let url = self.endpoint(&format!("v1beta/{}", asset.handle))?;
        let response = self
            .http
            .delete(url)
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() && status != StatusCode::NOT_FOUND {
            let body = response.text().await.unwrap_or_default();
            return Err(VidlensError::ProviderFatal(format!(
                "Failed to delete {}: {}: {}",
                asset.handle,
                status,
                error_message(&body)
            )));
        }

        debug!("Deleted remote file {}", asset.handle);
        Ok(())
    }
}

#[async_trait]
impl ChatProvider for GeminiClient {
    fn name(&self) -> &str {
        &self.model
    }

    async fn start_conversation(&self) -> Result<Box<dyn ChatSession>> {
        Ok(Box::new(GeminiChat {
            client: self.clone(),
            history: Mutex::new(Vec::new()),
        }))
    }
}

/// A Gemini conversation with client-side history.
struct GeminiChat {
    client: GeminiClient,
    history: Mutex<Vec<Content>>,
}

impl GeminiChat {
    fn snapshot(&self) -> Vec<Content> {
        self.history
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl ChatSession for GeminiChat {
    async fn send_turn(&self, turn: &TurnContent) -> Result<String> {
        let user = Content::from_turn(turn);

        let mut contents = self.snapshot();
        contents.push(user.clone());

        let text = self.client.generate(&contents).await?;

        let mut history = self
            .history
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        history.push(user);
        history.push(Content::model(&text));

        Ok(text)
    }
}

/// Map an HTTP error status to a typed provider error.
fn classify_status(status: StatusCode, body: &str) -> VidlensError {
    let message = error_message(body);
    if status == StatusCode::SERVICE_UNAVAILABLE {
        VidlensError::ProviderOverloaded(format!("{}: {}", status, message))
    } else {
        VidlensError::ProviderFatal(format!("{}: {}", status, message))
    }
}

fn classify_transport_error(e: reqwest::Error) -> VidlensError {
    if e.is_timeout() {
        VidlensError::ProviderTimeout(e.to_string())
    } else if e.status() == Some(StatusCode::SERVICE_UNAVAILABLE) {
        VidlensError::ProviderOverloaded(e.to_string())
    } else {
        VidlensError::ProviderFatal(e.to_string())
    }
}

/// Pull the human-readable message out of a Gemini error body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorResponse>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.trim().to_string())
}

// === Wire types ===

#[derive(Serialize)]
struct GenerateContentRequest<'a> {
    contents: &'a [Content],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Content {
    role: String,
    #[serde(default)]
    parts: Vec<Part>,
}

impl Content {
    fn from_turn(turn: &TurnContent) -> Self {
        let mut parts = Vec::with_capacity(turn.images.len() + 2);
        parts.push(Part::text(&turn.prompt));

        for image in &turn.images {
            parts.push(Part {
                inline_data: Some(Blob {
                    mime_type: image.mime_type.clone(),
                    data: general_purpose::STANDARD.encode(&image.data),
                }),
                ..Part::default()
            });
        }

        if let Some(audio) = &turn.audio {
            parts.push(Part {
                file_data: Some(FileData {
                    mime_type: audio.mime_type.clone(),
                    file_uri: audio.uri.clone(),
                }),
                ..Part::default()
            });
        }

        Self {
            role: "user".to_string(),
            parts,
        }
    }

    fn model(text: &str) -> Self {
        Self {
            role: "model".to_string(),
            parts: vec![Part::text(text)],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<Blob>,
    #[serde(skip_serializing_if = "Option::is_none")]
    file_data: Option<FileData>,
}

impl Part {
    fn text(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Blob {
    mime_type: String,
    data: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileData {
    mime_type: String,
    file_uri: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

impl GenerateContentResponse {
    fn text(self) -> Result<String> {
        let candidate = self.candidates.into_iter().next();

        let text: String = candidate
            .as_ref()
            .and_then(|c| c.content.as_ref())
            .map(|c| {
                c.parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if !text.trim().is_empty() {
            return Ok(text);
        }

        let reason = self
            .prompt_feedback
            .and_then(|f| f.block_reason)
            .or_else(|| candidate.and_then(|c| c.finish_reason))
            .unwrap_or_else(|| "no candidates".to_string());

        Err(VidlensError::ProviderFatal(format!("Empty response from model ({})", reason)))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    file: UploadedFile,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadedFile {
    name: String,
    uri: String,
    mime_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}
