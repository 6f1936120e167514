//! ffmpeg-backed segment extraction.

use super::{MediaExtractor, Segment, SegmentMedia};
use crate::config::FrameSettings;
use crate::error::{Result, VidlensError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

const FRAME_PREFIX: &str = "frame-";
const AUDIO_FILE: &str = "audio.mp3";

/// Extracts frames and audio for a segment with two independent ffmpeg runs.
pub struct FfmpegExtractor {
    frames: FrameSettings,
    ffmpeg: String,
}

impl FfmpegExtractor {
    pub fn new(frames: FrameSettings) -> Self {
        Self {
            frames,
            ffmpeg: "ffmpeg".to_string(),
        }
    }

    /// Use a specific ffmpeg binary instead of the one on PATH.
    pub fn with_binary(mut self, ffmpeg: impl Into<String>) -> Self {
        self.ffmpeg = ffmpeg.into();
        self
    }

    fn video_filter(&self, frame_interval_sec: f64) -> String {
        let mut filter = format!("fps=1/{}", frame_interval_sec);
        if let Some(width) = self.frames.width {
            filter.push_str(&format!(",scale={}:-2", width));
        }
        filter
    }

    /// Sample frames over the segment window. Fails if no frame was produced.
    async fn extract_frames(
        &self,
        source: &Path,
        segment: &Segment,
        frame_interval_sec: f64,
        work_dir: &Path,
    ) -> Result<Vec<PathBuf>> {
        let ext = self.frames.format.extension();
        let pattern = work_dir.join(format!("{}%04d.{}", FRAME_PREFIX, ext));

        let result = Command::new(&self.ffmpeg)
            .arg("-ss").arg(format!("{:.3}", segment.start_offset_sec))
            .arg("-i").arg(source)
            .arg("-t").arg(format!("{:.3}", segment.duration_sec))
            .arg("-vf").arg(self.video_filter(frame_interval_sec))
            .arg("-qscale:v").arg(self.frames.quality.to_string())
            .arg("-an")
            .arg("-y")
            .arg("-loglevel").arg("error")
            .arg(&pattern)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await;

        let output = match result {
            Ok(o) => o,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(VidlensError::ToolNotFound(self.ffmpeg.clone()));
            }
            Err(e) => {
                return Err(VidlensError::Extraction(format!("ffmpeg execution failed: {e}")));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(VidlensError::Extraction(format!(
                "frame extraction failed: {}",
                stderr.trim()
            )));
        }

        let frames = list_frames(work_dir, ext).await?;
        if frames.is_empty() {
            return Err(VidlensError::Extraction(format!(
                "no frames found between {} and {}",
                Segment::format_offset(segment.start_offset_sec),
                Segment::format_offset(segment.end_sec())
            )));
        }

        debug!("Extracted {} frames for segment {}", frames.len(), segment.index);
        Ok(frames)
    }

    /// Cut the segment's audio to MP3. Errors are soft and returned as a note.
    async fn extract_audio(
        &self,
        source: &Path,
        segment: &Segment,
        work_dir: &Path,
    ) -> std::result::Result<PathBuf, String> {
        let dest = work_dir.join(AUDIO_FILE);

        let output = Command::new(&self.ffmpeg)
            .arg("-ss").arg(format!("{:.3}", segment.start_offset_sec))
            .arg("-i").arg(source)
            .arg("-t").arg(format!("{:.3}", segment.duration_sec))
            .arg("-vn")
            .arg("-codec:a").arg("libmp3lame")
            .arg("-qscale:a").arg("4")
            .arg("-y")
            .arg("-loglevel").arg("error")
            .arg(&dest)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| format!("ffmpeg execution failed: {e}"))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = stderr.lines().last().unwrap_or("unknown error").trim().to_string();
            return Err(reason);
        }

        match tokio::fs::metadata(&dest).await {
            Ok(meta) if meta.len() > 0 => Ok(dest),
            _ => Err("audio track is empty for this segment".to_string()),
        }
    }
}

#[async_trait]
impl MediaExtractor for FfmpegExtractor {
    #[instrument(skip(self, work_dir), fields(source = %source.display(), segment = segment.index))]
    async fn extract(
        &self,
        source: &Path,
        segment: &Segment,
        frame_interval_sec: f64,
        work_dir: &Path,
    ) -> Result<SegmentMedia> {
        tokio::fs::create_dir_all(work_dir).await?;

        let (frames, audio) = tokio::join!(
            self.extract_frames(source, segment, frame_interval_sec, work_dir),
            self.extract_audio(source, segment, work_dir),
        );

        let frames = frames?;
        if let Err(note) = &audio {
            warn!("Audio unavailable for segment {}: {}", segment.index, note);
        }

        Ok(SegmentMedia::new(frames, audio))
    }
}

/// Collect extracted frames in frame-number order.
async fn list_frames(dir: &Path, ext: &str) -> Result<Vec<PathBuf>> {
    let mut frames = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let name = entry.file_name();
        let name = name.to_string_lossy();
        let matches_ext = path.extension().and_then(|e| e.to_str()) == Some(ext);
        if name.starts_with(FRAME_PREFIX) && matches_ext {
            frames.push(path);
        }
    }

    // Zero-padded names sort chronologically.
    frames.sort();
    Ok(frames)
}

/// Queries the duration of a media file using ffprobe with JSON output.
pub async fn probe_duration(path: &Path) -> Result<f64> {
    let result = Command::new("ffprobe")
        .arg("-v").arg("quiet")
        .arg("-print_format").arg("json")
        .arg("-show_format")
        .arg(path)
        .output()
        .await;

    let output = match result {
        Ok(o) => o,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(VidlensError::ToolNotFound("ffprobe".into()));
        }
        Err(e) => {
            return Err(VidlensError::ToolFailed(format!("ffprobe failed: {e}")));
        }
    };

    if !output.status.success() {
        return Err(VidlensError::ToolFailed("ffprobe returned error".into()));
    }

    let json_str = String::from_utf8_lossy(&output.stdout);
    let parsed: serde_json::Value = serde_json::from_str(&json_str)
        .map_err(|_| VidlensError::ToolFailed("Invalid ffprobe output".into()))?;

    let duration = parsed["format"]["duration"]
        .as_str()
        .and_then(|s| s.parse::<f64>().ok())
        .ok_or_else(|| VidlensError::ToolFailed("Could not determine media duration".into()))?;

    info!("Media duration: {:.1}s", duration);
    Ok(duration)
}
