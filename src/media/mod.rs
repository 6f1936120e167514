//! Media segmentation and extraction.
//!
//! A video is analyzed as a sequence of fixed-length time windows. For each
//! window a [`MediaExtractor`] produces sampled frames and an optional audio clip.

mod ffmpeg;

pub use ffmpeg::{probe_duration, FfmpegExtractor};

use crate::error::{Result, VidlensError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A contiguous time window of the source video.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub index: u32,
    pub start_offset_sec: f64,
    pub duration_sec: f64,
}

impl Segment {
    pub fn end_sec(&self) -> f64 {
        self.start_offset_sec + self.duration_sec
    }

    /// Format an offset as MM:SS or HH:MM:SS.
    pub fn format_offset(seconds: f64) -> String {
        let total_seconds = seconds.max(0.0) as u32;
        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;
        let secs = total_seconds % 60;

        if hours > 0 {
            format!("{:02}:{:02}:{:02}", hours, minutes, secs)
        } else {
            format!("{:02}:{:02}", minutes, secs)
        }
    }
}

/// Compute the segment windows for a job.
///
/// Segment `i` starts at `i * duration_sec`. Windows are never clamped to the
/// real video length; extraction past the end yields empty or partial media.
pub fn plan_segments(count: u32, duration_sec: f64, known_duration: Option<f64>) -> Vec<Segment> {
    let segments: Vec<Segment> = (0..count)
        .map(|index| Segment {
            index,
            start_offset_sec: index as f64 * duration_sec,
            duration_sec,
        })
        .collect();

    if let Some(total) = known_duration {
        let beyond = segments
            .iter()
            .filter(|s| s.start_offset_sec >= total)
            .count();
        if beyond > 0 {
            warn!(
                "{} of {} segments start past the end of the {:.1}s video",
                beyond,
                segments.len(),
                total
            );
        }
    }

    segments
}

/// Media extracted for one segment.
#[derive(Debug, Clone, Default)]
pub struct SegmentMedia {
    /// Frame images in chronological order.
    pub frame_paths: Vec<PathBuf>,
    pub audio_path: Option<PathBuf>,
    pub audio_present: bool,
    /// Why audio is missing, when extraction failed softly.
    pub audio_note: Option<String>,
}

impl SegmentMedia {
    /// Build from frames and an audio result, treating a missing clip as a soft failure.
    pub fn new(frame_paths: Vec<PathBuf>, audio: std::result::Result<PathBuf, String>) -> Self {
        match audio {
            Ok(path) => Self {
                frame_paths,
                audio_path: Some(path),
                audio_present: true,
                audio_note: None,
            },
            Err(note) => Self {
                frame_paths,
                audio_path: None,
                audio_present: false,
                audio_note: Some(note),
            },
        }
    }
}

/// Guess a MIME type from a media file extension.
pub fn mime_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "png" => "image/png",
        "webp" => "image/webp",
        "jpg" | "jpeg" => "image/jpeg",
        "mp3" => "audio/mp3",
        "wav" => "audio/wav",
        "m4a" => "audio/mp4",
        "aac" => "audio/aac",
        "ogg" | "opus" => "audio/ogg",
        "flac" => "audio/flac",
        _ => "application/octet-stream",
    }
}

/// Extracts one segment's frames and audio into `work_dir`.
///
/// Frame extraction failure is an error; audio failure is reported through
/// [`SegmentMedia::audio_note`].
#[async_trait]
pub trait MediaExtractor: Send + Sync {
    async fn extract(
        &self,
        source: &Path,
        segment: &Segment,
        frame_interval_sec: f64,
        work_dir: &Path,
    ) -> Result<SegmentMedia>;
}

/// Media that was already extracted elsewhere (e.g. on the client device).
///
/// Serves its single batch for segment 0, copying the files into the
/// segment's work directory so they are cleaned up with the job.
pub struct PreExtracted {
    frames: Vec<PathBuf>,
    audio: Option<PathBuf>,
}

impl PreExtracted {
    pub fn new(frames: Vec<PathBuf>, audio: Option<PathBuf>) -> Self {
        Self { frames, audio }
    }
}

#[async_trait]
impl MediaExtractor for PreExtracted {
    async fn extract(
        &self,
        _source: &Path,
        segment: &Segment,
        _frame_interval_sec: f64,
        work_dir: &Path,
    ) -> Result<SegmentMedia> {
        if segment.index != 0 {
            return Err(VidlensError::Extraction(format!(
                "pre-extracted media has a single batch, segment {} requested",
                segment.index
            )));
        }
        if self.frames.is_empty() {
            return Err(VidlensError::Extraction("no frames supplied".into()));
        }

        tokio::fs::create_dir_all(work_dir).await?;

        let mut frame_paths = Vec::with_capacity(self.frames.len());
        for (i, frame) in self.frames.iter().enumerate() {
            let ext = frame.extension().and_then(|e| e.to_str()).unwrap_or("jpg");
            let dest = work_dir.join(format!("frame-{:04}.{}", i + 1, ext));
            tokio::fs::copy(frame, &dest).await.map_err(|e| {
                VidlensError::Extraction(format!("cannot read frame {}: {}", frame.display(), e))
            })?;
            frame_paths.push(dest);
        }

        let audio = match &self.audio {
            Some(path) => {
                let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("mp3");
                let dest = work_dir.join(format!("audio.{}", ext));
                tokio::fs::copy(path, &dest)
                    .await
                    .map(|_| dest)
                    .map_err(|e| format!("cannot read audio {}: {}", path.display(), e))
            }
            None => Err("no audio track supplied".to_string()),
        };

        debug!("Using {} pre-extracted frames", frame_paths.len());
        Ok(SegmentMedia::new(frame_paths, audio))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_offsets_are_index_times_duration() {
        for count in 1..=6u32 {
            for duration in [0.5, 1.0, 20.0, 30.0, 45.5] {
                let segments = plan_segments(count, duration, None);
                assert_eq!(segments.len(), count as usize);
                for (i, s) in segments.iter().enumerate() {
                    assert_eq!(s.index, i as u32);
                    assert_eq!(s.start_offset_sec, i as f64 * duration);
                    assert_eq!(s.duration_sec, duration);
                }
            }
        }
    }

    #[test]
    fn test_no_clamping_past_known_duration() {
        let segments = plan_segments(3, 30.0, Some(45.0));
        assert_eq!(segments[1].start_offset_sec, 30.0);
        assert_eq!(segments[1].end_sec(), 60.0);
        assert_eq!(segments[2].start_offset_sec, 60.0);
    }

    #[test]
    fn test_format_offset() {
        assert_eq!(Segment::format_offset(0.0), "00:00");
        assert_eq!(Segment::format_offset(95.0), "01:35");
        assert_eq!(Segment::format_offset(3725.0), "01:02:05");
    }

    #[test]
    fn test_mime_for_path() {
        assert_eq!(mime_for_path(Path::new("a/frame-0001.JPG")), "image/jpeg");
        assert_eq!(mime_for_path(Path::new("frame.png")), "image/png");
        assert_eq!(mime_for_path(Path::new("audio.mp3")), "audio/mp3");
        assert_eq!(mime_for_path(Path::new("noext")), "application/octet-stream");
    }

    #[tokio::test]
    async fn test_pre_extracted_copies_into_work_dir() {
        let src = tempfile::tempdir().unwrap();
        let frame = src.path().join("shot.png");
        let audio = src.path().join("voice.mp3");
        std::fs::write(&frame, b"png").unwrap();
        std::fs::write(&audio, b"mp3").unwrap();

        let work = tempfile::tempdir().unwrap();
        let extractor = PreExtracted::new(vec![frame.clone()], Some(audio));
        let segment = plan_segments(1, 10.0, None)[0];

        let media = extractor
            .extract(Path::new("unused"), &segment, 1.0, work.path())
            .await
            .unwrap();

        assert_eq!(media.frame_paths, vec![work.path().join("frame-0001.png")]);
        assert!(media.audio_present);
        assert!(media.audio_path.unwrap().starts_with(work.path()));
        assert!(frame.exists());
    }

    #[tokio::test]
    async fn test_pre_extracted_without_audio_is_soft() {
        let src = tempfile::tempdir().unwrap();
        let frame = src.path().join("shot.jpg");
        std::fs::write(&frame, b"jpg").unwrap();

        let work = tempfile::tempdir().unwrap();
        let extractor = PreExtracted::new(vec![frame], None);
        let segment = plan_segments(1, 10.0, None)[0];

        let media = extractor
            .extract(Path::new("unused"), &segment, 1.0, work.path())
            .await
            .unwrap();
        assert!(!media.audio_present);
        assert!(media.audio_note.is_some());
    }

    #[tokio::test]
    async fn test_pre_extracted_rejects_later_segments() {
        let work = tempfile::tempdir().unwrap();
        let extractor = PreExtracted::new(vec![PathBuf::from("x.jpg")], None);
        let segment = plan_segments(2, 10.0, None)[1];

        let err = extractor
            .extract(Path::new("unused"), &segment, 1.0, work.path())
            .await
            .unwrap_err();
        assert!(matches!(err, VidlensError::Extraction(_)));
    }
}
