//! Drives a job through its segments, one provider turn per segment.

use super::cancel::CancelFlag;
use super::cleanup::CleanupManager;
use super::job::{AnalysisJob, AnalysisType};
use super::progress::{percent, ProgressEvent, ProgressReporter};
use super::retry::RetryPolicy;
use super::state::{ConversationState, Turn};
use crate::config::Prompts;
use crate::error::{Result, VidlensError};
use crate::media::{mime_for_path, plan_segments, MediaExtractor, Segment, SegmentMedia};
use crate::provider::{
    AssetUploader, ChatSession, ImagePart, ProviderAdapter, RemoteAsset,
    TranscribeSummarizeProvider, TurnContent,
};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// How a job's conversation ended.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EngineOutcome {
    pub total_segments: u32,
    pub completed_segments: u32,
    pub report: Option<String>,
    /// The report covers only the completed segments.
    pub partial: bool,
    pub error: Option<String>,
}

impl EngineOutcome {
    pub(crate) fn failed(total_segments: u32, error: String) -> Self {
        Self {
            total_segments,
            error: Some(error),
            ..Default::default()
        }
    }
}

/// Per-job collaborators that are not part of the job itself.
#[derive(Clone, Copy)]
pub struct JobContext<'a> {
    pub extractor: &'a dyn MediaExtractor,
    pub reporter: &'a dyn ProgressReporter,
    pub cleanup: &'a CleanupManager,
    pub cancel: &'a CancelFlag,
}

enum Session {
    Chat {
        session: Box<dyn ChatSession>,
        uploader: Arc<dyn AssetUploader>,
    },
    Transcribe(Arc<dyn TranscribeSummarizeProvider>),
}

pub struct ConversationEngine<'a> {
    job: &'a AnalysisJob,
    prompts: &'a Prompts,
    provider: &'a ProviderAdapter,
    retry: &'a RetryPolicy,
    ctx: JobContext<'a>,
    known_duration: Option<f64>,
    state: ConversationState,
    last_percent: u8,
}

impl<'a> ConversationEngine<'a> {
    pub fn new(
        job: &'a AnalysisJob,
        prompts: &'a Prompts,
        provider: &'a ProviderAdapter,
        retry: &'a RetryPolicy,
        ctx: JobContext<'a>,
    ) -> Self {
        Self {
            job,
            prompts,
            provider,
            retry,
            ctx,
            known_duration: None,
            state: ConversationState::new(),
            last_percent: 0,
        }
    }

    /// Source length, when known, only used to warn about windows past the end.
    pub fn with_known_duration(mut self, duration: Option<f64>) -> Self {
        self.known_duration = duration;
        self
    }

    #[instrument(skip(self), fields(job_id = %self.job.id, provider = self.provider.name()))]
    pub async fn run(mut self) -> EngineOutcome {
        let segments = plan_segments(
            self.job.segment_count,
            self.job.segment_duration_sec,
            self.known_duration,
        );

        let session = match self.open_session().await {
            Ok(session) => session,
            Err(e) => return self.fail_before_first_segment(&e).await,
        };

        for segment in &segments {
            if self.ctx.cancel.is_cancelled() {
                info!("Cancelled before segment {}", segment.index + 1);
                return self.finish(&session, Some(VidlensError::Cancelled)).await;
            }
            if let Err(e) = self.process_segment(&session, segment).await {
                warn!("Segment {} failed: {}", segment.index + 1, e);
                return self.finish(&session, Some(e)).await;
            }
        }

        self.finish(&session, None).await
    }

    async fn open_session(&self) -> Result<Session> {
        match self.provider {
            ProviderAdapter::Chat { chat, uploader } => Ok(Session::Chat {
                session: chat.start_conversation().await?,
                uploader: uploader.clone(),
            }),
            ProviderAdapter::TranscribeSummarize(provider) => {
                Ok(Session::Transcribe(provider.clone()))
            }
        }
    }

    async fn emit(&self, event: ProgressEvent) {
        self.ctx.reporter.send(event).await;
    }

    /// Progress never moves backwards.
    async fn emit_progress(&mut self, percent: u8, message: String) {
        let percent = percent.max(self.last_percent).min(100);
        self.last_percent = percent;
        self.emit(ProgressEvent::progress(message, percent)).await;
    }

    async fn process_segment(&mut self, session: &Session, segment: &Segment) -> Result<()> {
        let total = self.job.segment_count as u64;
        let index = segment.index as u64;
        let label = format!("[{}/{}]", index + 1, total);

        self.emit_progress(
            percent(index, total),
            format!("{} Extracting media chunks...", label),
        )
        .await;

        let work_dir = self.segment_dir(segment);
        let outcome = self.analyze_segment(session, segment, &work_dir, &label).await;

        match tokio::fs::remove_dir_all(&work_dir).await {
            Ok(()) => debug!("Removed {}", work_dir.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove {}: {}", work_dir.display(), e),
        }
        outcome?;

        self.emit_progress(
            percent(index + 1, total),
            format!("Batch {}/{} complete.", index + 1, total),
        )
        .await;
        Ok(())
    }

    fn segment_dir(&self, segment: &Segment) -> PathBuf {
        self.ctx
            .cleanup
            .path()
            .join(format!("segment_{:03}", segment.index))
    }

    async fn analyze_segment(
        &mut self,
        session: &Session,
        segment: &Segment,
        work_dir: &Path,
        label: &str,
    ) -> Result<()> {
        tokio::fs::create_dir_all(work_dir).await?;
        let media = self
            .ctx
            .extractor
            .extract(
                &self.job.video_source,
                segment,
                self.job.frame_interval_sec,
                work_dir,
            )
            .await?;

        if let Some(note) = &media.audio_note {
            debug!("Segment {} audio unavailable: {}", segment.index + 1, note);
            self.emit(ProgressEvent::status(format!(
                "{} No audio stream detected. Continuing with frames only.",
                label
            )))
            .await;
        }

        let total = self.job.segment_count as u64;
        let index = segment.index as u64;
        let analyzing = percent(index, total).saturating_add(percent(1, 2 * total));

        match session {
            Session::Chat { session, uploader } => {
                let audio = self.upload_audio(uploader, &media, label).await;
                let images = load_images(&media.frame_paths).await;
                if images.is_empty() {
                    return Err(VidlensError::Extraction(
                        "none of the extracted frames could be read".into(),
                    ));
                }

                let turn = TurnContent {
                    prompt: self.segment_prompt(segment),
                    images,
                    audio,
                };
                self.emit_progress(
                    analyzing,
                    format!(
                        "{} Analyzing {} frames with {}...",
                        label,
                        turn.images.len(),
                        self.provider.name()
                    ),
                )
                .await;

                let session: &dyn ChatSession = session.as_ref();
                let content = &turn;
                let reply = self
                    .retry
                    .run(self.ctx.reporter, move || session.send_turn(content))
                    .await?;

                self.state.record_reply(Turn {
                    segment_index: segment.index,
                    image_count: turn.images.len(),
                    had_audio: turn.audio.is_some(),
                    prompt: turn.prompt,
                    response: reply,
                });
            }
            Session::Transcribe(provider) => {
                self.emit_progress(
                    analyzing,
                    format!("{} Transcribing audio with {}...", label, provider.name()),
                )
                .await;

                let transcript = match media.audio_path.as_deref() {
                    Some(path) if media.audio_present => {
                        let provider: &dyn TranscribeSummarizeProvider = provider.as_ref();
                        self.retry
                            .run(self.ctx.reporter, move || provider.transcribe(path))
                            .await?
                    }
                    _ => String::new(),
                };

                self.state.record_transcript(
                    segment,
                    Turn {
                        segment_index: segment.index,
                        prompt: String::new(),
                        response: transcript,
                        image_count: 0,
                        had_audio: media.audio_present,
                    },
                );
            }
        }
        Ok(())
    }

    /// Upload the segment's audio. A failed upload degrades to a frames-only turn.
    async fn upload_audio(
        &self,
        uploader: &Arc<dyn AssetUploader>,
        media: &SegmentMedia,
        label: &str,
    ) -> Option<RemoteAsset> {
        let path = media.audio_path.as_deref().filter(|_| media.audio_present)?;

        self.emit(ProgressEvent::status(format!("{} Uploading audio...", label)))
            .await;
        match uploader.upload(path, mime_for_path(path)).await {
            Ok(asset) => {
                self.ctx.cleanup.register(uploader.clone(), asset.clone());
                self.emit(ProgressEvent::status(format!(
                    "{} Audio uploaded successfully.",
                    label
                )))
                .await;
                Some(asset)
            }
            Err(e) => {
                warn!("Audio upload failed: {}", e);
                self.emit(ProgressEvent::status(format!(
                    "{} Audio upload failed ({}). Continuing with frames only.",
                    label, e
                )))
                .await;
                None
            }
        }
    }

    fn template_vars(&self, segment: Option<&Segment>) -> HashMap<String, String> {
        let mut vars = HashMap::new();
        vars.insert("language".to_string(), self.job.output_language.clone());
        vars.insert("total".to_string(), self.job.segment_count.to_string());
        if let Some(segment) = segment {
            vars.insert("segment".to_string(), (segment.index + 1).to_string());
            vars.insert(
                "start".to_string(),
                Segment::format_offset(segment.start_offset_sec),
            );
            vars.insert("end".to_string(), Segment::format_offset(segment.end_sec()));
        }
        vars
    }

    fn segment_prompt(&self, segment: &Segment) -> String {
        let templates = &self.prompts.analysis;
        let body = match (segment.index, self.job.analysis_type) {
            (0, AnalysisType::General) => &templates.general_start,
            (0, AnalysisType::Meeting) => &templates.meeting_start,
            _ => &templates.continuation,
        };
        let template = format!("{}\n\n{}", templates.language_rule, body);
        self.prompts
            .render_with_custom(&template, &self.template_vars(Some(segment)))
    }

    fn summary_prompt(&self) -> String {
        let templates = &self.prompts.analysis;
        let body = match self.job.analysis_type {
            AnalysisType::General => &templates.general_summary,
            AnalysisType::Meeting => &templates.meeting_summary,
        };
        let template = format!("{}\n\n{}", templates.language_rule, body);
        let mut vars = self.template_vars(None);
        vars.insert(
            "transcript".to_string(),
            self.state.cumulative_text().to_string(),
        );
        self.prompts.render_with_custom(&template, &vars)
    }

    /// The report covering every completed segment.
    async fn build_report(&self, session: &Session) -> Result<String> {
        match session {
            Session::Chat { .. } => Ok(self.state.cumulative_text().to_string()),
            Session::Transcribe(provider) => {
                if self.state.cumulative_text().trim().is_empty() {
                    return Err(VidlensError::Extraction(
                        "no speech could be transcribed from the video".into(),
                    ));
                }
                self.emit(ProgressEvent::status("Generating final summary..."))
                    .await;
                let prompt = self.summary_prompt();
                let provider: &dyn TranscribeSummarizeProvider = provider.as_ref();
                let prompt = prompt.as_str();
                self.retry
                    .run(self.ctx.reporter, move || provider.summarize(prompt))
                    .await
            }
        }
    }

    async fn fail_before_first_segment(&self, cause: &VidlensError) -> EngineOutcome {
        let message = match cause {
            VidlensError::Cancelled => {
                "Analysis cancelled before any segment was analyzed.".to_string()
            }
            other => format!(
                "Video could not be analyzed: {}. Please choose a longer or different video.",
                other
            ),
        };
        self.emit(ProgressEvent::error(message.clone())).await;
        EngineOutcome::failed(self.job.segment_count, message)
    }

    async fn finish(&self, session: &Session, abort: Option<VidlensError>) -> EngineOutcome {
        let total = self.job.segment_count;
        let completed = self.state.completed() as u32;

        let Some(cause) = abort else {
            return match self.build_report(session).await {
                Ok(report) => {
                    info!("Analysis complete ({} segments)", completed);
                    self.emit(ProgressEvent::Result {
                        data: report.clone(),
                        partial: false,
                    })
                    .await;
                    EngineOutcome {
                        total_segments: total,
                        completed_segments: completed,
                        report: Some(report),
                        partial: false,
                        error: None,
                    }
                }
                Err(e) => {
                    let message = format!("Analysis failed: {}", e);
                    self.emit(ProgressEvent::error(message.clone())).await;
                    EngineOutcome {
                        completed_segments: completed,
                        ..EngineOutcome::failed(total, message)
                    }
                }
            };
        };

        if completed == 0 {
            return self.fail_before_first_segment(&cause).await;
        }

        let message = format!(
            "Analysis stopped after {} of {} segments: {}",
            completed, total, cause
        );
        self.emit(ProgressEvent::error(message.clone())).await;

        let mut outcome = EngineOutcome {
            completed_segments: completed,
            ..EngineOutcome::failed(total, message)
        };
        match self.build_report(session).await {
            Ok(report) => {
                self.emit(ProgressEvent::Result {
                    data: report.clone(),
                    partial: true,
                })
                .await;
                outcome.report = Some(report);
                outcome.partial = true;
            }
            Err(e) => warn!("No partial report available: {}", e),
        }
        outcome
    }
}

/// Read frames as inline images. Unreadable frames are skipped.
async fn load_images(paths: &[PathBuf]) -> Vec<ImagePart> {
    let mut images = Vec::with_capacity(paths.len());
    for path in paths {
        match tokio::fs::read(path).await {
            Ok(data) => images.push(ImagePart {
                mime_type: mime_for_path(path).to_string(),
                data,
            }),
            Err(e) => warn!("Skipping unreadable frame {}: {}", path.display(), e),
        }
    }
    images
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::progress::RecordingReporter;
    use crate::analysis::testing::*;
    use crate::config::AnalysisSettings;
    use std::time::Duration;
    use uuid::Uuid;

    struct Harness {
        _parent: tempfile::TempDir,
        cleanup: CleanupManager,
        reporter: RecordingReporter,
        cancel: CancelFlag,
        prompts: Prompts,
        retry: RetryPolicy,
    }

    impl Harness {
        fn new() -> Self {
            let parent = tempfile::tempdir().unwrap();
            let cleanup = CleanupManager::create(parent.path(), &Uuid::new_v4()).unwrap();
            Self {
                _parent: parent,
                cleanup,
                reporter: RecordingReporter::new(),
                cancel: CancelFlag::new(),
                prompts: Prompts::default(),
                retry: RetryPolicy {
                    max_attempts: 3,
                    initial_delay: Duration::from_secs(2),
                    attempt_timeout: Duration::from_secs(60),
                    retry_on_timeout: true,
                },
            }
        }

        async fn run(
            &self,
            job: &AnalysisJob,
            provider: &ProviderAdapter,
            extractor: &dyn MediaExtractor,
        ) -> EngineOutcome {
            let ctx = JobContext {
                extractor,
                reporter: &self.reporter,
                cleanup: &self.cleanup,
                cancel: &self.cancel,
            };
            ConversationEngine::new(job, &self.prompts, provider, &self.retry, ctx)
                .run()
                .await
        }
    }

    fn job(count: u32, duration: f64) -> AnalysisJob {
        AnalysisJob::new("talk.mp4", &AnalysisSettings::default())
            .with_segments(count, duration)
            .with_frame_interval(2.0)
    }

    fn assert_non_decreasing(percents: &[u8]) {
        for pair in percents.windows(2) {
            assert!(pair[0] <= pair[1], "progress went backwards: {:?}", percents);
        }
    }

    #[tokio::test]
    async fn test_full_run_emits_one_result_and_reaches_100() {
        let h = Harness::new();
        let chat = Arc::new(ScriptedChat::default());
        let uploader = Arc::new(FakeUploader::default());
        let extractor = FakeExtractor::default();

        let outcome = h
            .run(&job(3, 10.0), &chat_adapter(&chat, &uploader), &extractor)
            .await;

        assert_eq!(outcome.completed_segments, 3);
        assert!(!outcome.partial);
        assert_eq!(
            h.reporter.results(),
            vec![("report after 3 turns".to_string(), false)]
        );
        assert!(h.reporter.errors().is_empty());

        let percents = h.reporter.percents();
        assert_non_decreasing(&percents);
        assert_eq!(percents.last(), Some(&100));

        assert_eq!(uploader.uploaded.lock().unwrap().len(), 3);
        assert_eq!(h.cleanup.registered(), 3);
        for dir in extractor.work_dirs.lock().unwrap().iter() {
            assert!(!dir.exists(), "segment media left behind: {}", dir.display());
        }
    }

    #[tokio::test]
    async fn test_analyzing_percent_adds_half_a_segment() {
        let h = Harness::new();
        let chat = Arc::new(ScriptedChat::default());
        let uploader = Arc::new(FakeUploader::default());

        h.run(&job(3, 10.0), &chat_adapter(&chat, &uploader), &FakeExtractor::default())
            .await;

        let analyzing: Vec<u8> = h
            .reporter
            .events()
            .into_iter()
            .filter_map(|e| match e {
                ProgressEvent::Progress { message, percent } if message.contains("Analyzing") => {
                    Some(percent)
                }
                _ => None,
            })
            .collect();
        assert_eq!(analyzing, vec![17, 50, 84]);
    }

    #[tokio::test]
    async fn test_prompts_follow_segment_position() {
        let h = Harness::new();
        let chat = Arc::new(ScriptedChat::default());
        let uploader = Arc::new(FakeUploader::default());
        let job = job(2, 20.0)
            .with_language("Norwegian")
            .with_analysis_type(AnalysisType::Meeting);

        h.run(&job, &chat_adapter(&chat, &uploader), &FakeExtractor::default())
            .await;

        let sent = chat.sent();
        assert_eq!(sent.len(), 2);
        assert!(sent[0].prompt.contains("\"Norwegian\""));
        assert!(sent[0].prompt.contains("meeting analysis"));
        assert!(sent[0].prompt.contains("part 1 of 2, covering 00:00 to 00:20"));
        assert!(sent[1].prompt.contains("continuing our analysis"));
        assert!(sent[1].prompt.contains("part 2 of 2, covering 00:20 to 00:40"));
        assert_eq!(sent[0].image_count, 10);
        assert!(sent[0].audio.is_some());
    }

    #[tokio::test]
    async fn test_frame_failure_on_first_segment_is_single_error() {
        let h = Harness::new();
        let chat = Arc::new(ScriptedChat::default());
        let uploader = Arc::new(FakeUploader::default());
        let extractor = FakeExtractor {
            fail_frames_on: Some(0),
            ..Default::default()
        };

        let outcome = h
            .run(&job(2, 20.0), &chat_adapter(&chat, &uploader), &extractor)
            .await;

        let errors = h.reporter.errors();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("Video could not be analyzed"));
        assert!(h.reporter.results().is_empty());
        assert!(chat.sent().is_empty());
        assert_eq!(outcome.completed_segments, 0);
        assert!(outcome.report.is_none());
    }

    #[tokio::test]
    async fn test_missing_audio_still_produces_result() {
        let h = Harness::new();
        let chat = Arc::new(ScriptedChat::default());
        let uploader = Arc::new(FakeUploader::default());
        let extractor = FakeExtractor {
            without_audio: true,
            ..Default::default()
        };

        h.run(&job(2, 10.0), &chat_adapter(&chat, &uploader), &extractor)
            .await;

        assert_eq!(h.reporter.results().len(), 1);
        assert!(chat.sent().iter().all(|t| t.audio.is_none()));
        assert!(uploader.uploaded.lock().unwrap().is_empty());
        assert!(h
            .reporter
            .statuses()
            .iter()
            .any(|s| s.contains("No audio stream detected")));
    }

    #[tokio::test]
    async fn test_upload_failure_degrades_to_frames_only() {
        let h = Harness::new();
        let chat = Arc::new(ScriptedChat::default());
        let uploader = Arc::new(FakeUploader {
            fail: true,
            ..Default::default()
        });

        let outcome = h
            .run(&job(1, 10.0), &chat_adapter(&chat, &uploader), &FakeExtractor::default())
            .await;

        assert_eq!(outcome.completed_segments, 1);
        assert!(chat.sent()[0].audio.is_none());
        assert!(chat.sent()[0].image_count > 0);
        assert_eq!(h.cleanup.registered(), 0);
        assert!(h
            .reporter
            .statuses()
            .iter()
            .any(|s| s.contains("Audio upload failed")));
    }

    #[tokio::test]
    async fn test_failure_after_progress_yields_partial_result() {
        let h = Harness::new();
        let chat = Arc::new(ScriptedChat::with_script(vec![
            Ok("segment one report".into()),
            Err(VidlensError::ProviderFatal("safety block".into())),
        ]));
        let uploader = Arc::new(FakeUploader::default());

        let outcome = h
            .run(&job(3, 10.0), &chat_adapter(&chat, &uploader), &FakeExtractor::default())
            .await;

        let events = h.reporter.events();
        let error_pos = events
            .iter()
            .position(|e| matches!(e, ProgressEvent::Error { .. }))
            .unwrap();
        let result_pos = events
            .iter()
            .position(|e| matches!(e, ProgressEvent::Result { .. }))
            .unwrap();
        assert!(error_pos < result_pos);
        assert_eq!(h.reporter.errors().len(), 1);
        assert!(h.reporter.errors()[0].contains("after 1 of 3 segments"));
        assert_eq!(
            h.reporter.results(),
            vec![("segment one report".to_string(), true)]
        );
        assert!(outcome.partial);
        assert_eq!(chat.sent().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overloaded_turn_is_retried_with_backoff() {
        let h = Harness::new();
        let chat = Arc::new(ScriptedChat::with_script(vec![
            Err(VidlensError::ProviderOverloaded("503".into())),
            Err(VidlensError::ProviderOverloaded("503".into())),
        ]));
        let uploader = Arc::new(FakeUploader::default());
        let start = tokio::time::Instant::now();

        h.run(&job(1, 10.0), &chat_adapter(&chat, &uploader), &FakeExtractor::default())
            .await;

        assert_eq!(chat.sent().len(), 3);
        assert!(start.elapsed() >= Duration::from_secs(6));
        assert_eq!(
            h.reporter.results(),
            vec![("report after 1 turns".to_string(), false)]
        );
        assert_eq!(
            h.reporter
                .statuses()
                .iter()
                .filter(|s| s.contains("Retrying in"))
                .count(),
            2
        );
    }

    #[tokio::test]
    async fn test_window_past_end_of_video() {
        let h = Harness::new();
        let chat = Arc::new(ScriptedChat::default());
        let uploader = Arc::new(FakeUploader::default());
        let extractor = FakeExtractor {
            video_length: Some(45.0),
            ..Default::default()
        };

        let outcome = h
            .run(&job(2, 30.0), &chat_adapter(&chat, &uploader), &extractor)
            .await;

        let requested = extractor.requested.lock().unwrap().clone();
        assert_eq!(requested[1].start_offset_sec, 30.0);
        assert_eq!(requested[1].duration_sec, 30.0);
        assert_eq!(outcome.completed_segments, 2);
        assert_eq!(chat.sent()[1].image_count, 8);
        assert_eq!(h.reporter.results().len(), 1);
    }

    #[tokio::test]
    async fn test_window_entirely_past_end_is_extraction_error() {
        let h = Harness::new();
        let chat = Arc::new(ScriptedChat::default());
        let uploader = Arc::new(FakeUploader::default());
        let extractor = FakeExtractor {
            video_length: Some(25.0),
            ..Default::default()
        };

        let outcome = h
            .run(&job(3, 20.0), &chat_adapter(&chat, &uploader), &extractor)
            .await;

        assert_eq!(outcome.completed_segments, 2);
        assert!(outcome.partial);
        assert_eq!(h.reporter.errors().len(), 1);
        assert_eq!(h.reporter.results().len(), 1);
    }

    #[tokio::test]
    async fn test_cancellation_stops_at_segment_boundary() {
        let h = Harness::new();
        let chat = Arc::new(ScriptedChat::default());
        let uploader = Arc::new(FakeUploader::default());
        let extractor = FakeExtractor {
            cancel_on: Some((1, h.cancel.clone())),
            ..Default::default()
        };

        let outcome = h
            .run(&job(4, 10.0), &chat_adapter(&chat, &uploader), &extractor)
            .await;

        assert_eq!(outcome.completed_segments, 2);
        assert_eq!(extractor.requested.lock().unwrap().len(), 2);
        assert!(outcome.partial);
        assert!(h.reporter.errors()[0].contains("cancelled"));
    }

    #[tokio::test]
    async fn test_failed_session_start_is_single_error() {
        let h = Harness::new();
        let chat = Arc::new(ScriptedChat {
            fail_start: true,
            ..Default::default()
        });
        let uploader = Arc::new(FakeUploader::default());
        let extractor = FakeExtractor::default();

        h.run(&job(2, 10.0), &chat_adapter(&chat, &uploader), &extractor)
            .await;

        assert_eq!(h.reporter.errors().len(), 1);
        assert!(h.reporter.results().is_empty());
        assert!(extractor.requested.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_transcribe_provider_summarizes_at_end() {
        let h = Harness::new();
        let transcriber = Arc::new(FakeTranscriber::with_transcripts(vec![
            Ok("welcome everyone".into()),
            Ok("let's wrap up".into()),
        ]));
        let provider = ProviderAdapter::TranscribeSummarize(transcriber.clone());

        let outcome = h
            .run(&job(2, 30.0), &provider, &FakeExtractor::default())
            .await;

        assert_eq!(outcome.report.as_deref(), Some("summary of transcripts"));
        assert_eq!(
            h.reporter.results(),
            vec![("summary of transcripts".to_string(), false)]
        );
        let prompts = transcriber.summary_prompts.lock().unwrap().clone();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("[00:00 - 00:30]\nwelcome everyone"));
        assert!(prompts[0].contains("[00:30 - 01:00]\nlet's wrap up"));
        assert_eq!(h.reporter.percents().last(), Some(&100));
    }

    #[tokio::test]
    async fn test_transcribe_provider_without_any_audio_fails() {
        let h = Harness::new();
        let transcriber = Arc::new(FakeTranscriber::default());
        let provider = ProviderAdapter::TranscribeSummarize(transcriber.clone());
        let extractor = FakeExtractor {
            without_audio: true,
            ..Default::default()
        };

        let outcome = h.run(&job(1, 10.0), &provider, &extractor).await;

        assert!(outcome.report.is_none());
        assert_eq!(h.reporter.errors().len(), 1);
        assert!(h.reporter.results().is_empty());
        assert!(transcriber.summary_prompts.lock().unwrap().is_empty());
    }
}
