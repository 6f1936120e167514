//! In-memory extractor and providers for engine tests.

use super::cancel::CancelFlag;
use crate::error::{Result, VidlensError};
use crate::media::{MediaExtractor, Segment, SegmentMedia};
use crate::provider::{
    AssetUploader, ChatProvider, ChatSession, ProviderAdapter, RemoteAsset,
    TranscribeSummarizeProvider, TurnContent,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Writes fake frames and audio for each requested window.
#[derive(Default)]
pub struct FakeExtractor {
    /// Length of the pretend video; windows starting past it have no frames.
    pub video_length: Option<f64>,
    pub fail_frames_on: Option<u32>,
    pub without_audio: bool,
    pub panic_on: Option<u32>,
    /// Raise the flag while extracting this segment.
    pub cancel_on: Option<(u32, CancelFlag)>,
    pub requested: Mutex<Vec<Segment>>,
    pub work_dirs: Mutex<Vec<PathBuf>>,
}

#[async_trait]
impl MediaExtractor for FakeExtractor {
    async fn extract(
        &self,
        _source: &Path,
        segment: &Segment,
        frame_interval_sec: f64,
        work_dir: &Path,
    ) -> Result<SegmentMedia> {
        self.requested.lock().unwrap().push(*segment);
        self.work_dirs.lock().unwrap().push(work_dir.to_path_buf());

        if self.panic_on == Some(segment.index) {
            panic!("extractor exploded on segment {}", segment.index);
        }
        if let Some((index, flag)) = &self.cancel_on {
            if *index == segment.index {
                flag.cancel();
            }
        }
        if self.fail_frames_on == Some(segment.index) {
            return Err(VidlensError::Extraction("ffmpeg exited with status 1".into()));
        }

        let end = match self.video_length {
            Some(length) => segment.end_sec().min(length),
            None => segment.end_sec(),
        };
        let span = end - segment.start_offset_sec;
        if span <= 0.0 {
            return Err(VidlensError::Extraction(format!(
                "no frames extracted for window starting at {}s",
                segment.start_offset_sec
            )));
        }

        tokio::fs::create_dir_all(work_dir).await?;
        let count = (span / frame_interval_sec).ceil().max(1.0) as usize;
        let mut frames = Vec::with_capacity(count);
        for i in 0..count {
            let path = work_dir.join(format!("frame-{:04}.jpg", i + 1));
            tokio::fs::write(&path, format!("frame {} of segment {}", i, segment.index)).await?;
            frames.push(path);
        }

        let audio = if self.without_audio {
            Err("no audio stream".to_string())
        } else {
            let path = work_dir.join("audio.mp3");
            tokio::fs::write(&path, b"ID3").await?;
            Ok(path)
        };
        Ok(SegmentMedia::new(frames, audio))
    }
}

/// What a chat session received for one attempt.
#[derive(Debug, Clone)]
pub struct SentTurn {
    pub prompt: String,
    pub image_count: usize,
    pub audio: Option<RemoteAsset>,
}

/// Chat provider replaying a script of outcomes. When the script runs out,
/// every turn succeeds with a report naming the turn count.
#[derive(Default)]
pub struct ScriptedChat {
    pub script: Mutex<VecDeque<Result<String>>>,
    pub sent: Arc<Mutex<Vec<SentTurn>>>,
    pub fail_start: bool,
}

impl ScriptedChat {
    pub fn with_script(script: Vec<Result<String>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            ..Default::default()
        }
    }

    pub fn sent(&self) -> Vec<SentTurn> {
        self.sent.lock().unwrap().clone()
    }
}

struct ScriptedSession {
    provider: Arc<ScriptedChat>,
    accepted: Mutex<usize>,
}

#[async_trait]
impl ChatProvider for Arc<ScriptedChat> {
    fn name(&self) -> &str {
        "scripted-chat"
    }

    async fn start_conversation(&self) -> Result<Box<dyn ChatSession>> {
        if self.fail_start {
            return Err(VidlensError::ProviderFatal("API key not valid".into()));
        }
        Ok(Box::new(ScriptedSession {
            provider: Arc::clone(self),
            accepted: Mutex::new(0),
        }))
    }
}

#[async_trait]
impl ChatSession for ScriptedSession {
    async fn send_turn(&self, turn: &TurnContent) -> Result<String> {
        self.provider.sent.lock().unwrap().push(SentTurn {
            prompt: turn.prompt.clone(),
            image_count: turn.images.len(),
            audio: turn.audio.clone(),
        });
        let scripted = self.provider.script.lock().unwrap().pop_front();
        let outcome = scripted.unwrap_or_else(|| {
            let accepted = *self.accepted.lock().unwrap() + 1;
            Ok(format!("report after {} turns", accepted))
        });
        if outcome.is_ok() {
            *self.accepted.lock().unwrap() += 1;
        }
        outcome
    }
}

/// Uploader that hands out sequential handles and records deletions.
#[derive(Default)]
pub struct FakeUploader {
    pub fail: bool,
    pub uploaded: Mutex<Vec<RemoteAsset>>,
    pub deleted: Mutex<Vec<String>>,
}

#[async_trait]
impl AssetUploader for FakeUploader {
    async fn upload(&self, path: &Path, mime_type: &str) -> Result<RemoteAsset> {
        if self.fail {
            return Err(VidlensError::Upload("HTTP 500 from upload endpoint".into()));
        }
        let mut uploaded = self.uploaded.lock().unwrap();
        let asset = RemoteAsset {
            handle: format!("files/{}", uploaded.len() + 1),
            uri: format!("https://files.example/{}", path.display()),
            mime_type: mime_type.to_string(),
        };
        uploaded.push(asset.clone());
        Ok(asset)
    }

    async fn delete(&self, asset: &RemoteAsset) -> Result<()> {
        self.deleted.lock().unwrap().push(asset.handle.clone());
        Ok(())
    }
}

/// Transcribe provider returning canned transcripts.
#[derive(Default)]
pub struct FakeTranscriber {
    pub transcripts: Mutex<VecDeque<Result<String>>>,
    pub summary_prompts: Mutex<Vec<String>>,
}

impl FakeTranscriber {
    pub fn with_transcripts(transcripts: Vec<Result<String>>) -> Self {
        Self {
            transcripts: Mutex::new(transcripts.into()),
            ..Default::default()
        }
    }
}

#[async_trait]
impl TranscribeSummarizeProvider for FakeTranscriber {
    fn name(&self) -> &str {
        "fake-transcriber"
    }

    async fn transcribe(&self, _audio_path: &Path) -> Result<String> {
        self.transcripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok("more talking".to_string()))
    }

    async fn summarize(&self, prompt: &str) -> Result<String> {
        self.summary_prompts.lock().unwrap().push(prompt.to_string());
        Ok("summary of transcripts".to_string())
    }
}

pub fn chat_adapter(chat: &Arc<ScriptedChat>, uploader: &Arc<FakeUploader>) -> ProviderAdapter {
    ProviderAdapter::Chat {
        chat: Arc::new(Arc::clone(chat)),
        uploader: uploader.clone(),
    }
}
