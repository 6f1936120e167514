//! Job orchestrator for vidlens.
//!
//! Owns the long-lived components (settings, prompts, extractor) and runs one
//! job at a time per call: resolve the provider, drive the conversation, and
//! clean up on every exit path, including panics.

use crate::analysis::{
    AnalysisJob, CancelFlag, CleanupManager, CleanupReport, ConversationEngine, EngineOutcome,
    JobContext, ProgressEvent, ProgressReporter, RetryPolicy,
};
use crate::config::{Prompts, Settings};
use crate::error::Result;
use crate::media::{probe_duration, FfmpegExtractor, MediaExtractor, PreExtracted};
use crate::provider::ProviderAdapter;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Summary of a finished job.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisOutcome {
    pub job_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    #[serde(flatten)]
    pub engine: EngineOutcome,
    pub cleanup: CleanupReport,
}

impl AnalysisOutcome {
    pub fn succeeded(&self) -> bool {
        self.engine.report.is_some() && !self.engine.partial
    }
}

/// The main orchestrator for analysis jobs.
pub struct Orchestrator {
    settings: Settings,
    prompts: Prompts,
    extractor: Arc<dyn MediaExtractor>,
    /// Fixed provider; when absent one is built from settings per job.
    provider: Option<ProviderAdapter>,
    retry: RetryPolicy,
    temp_dir: PathBuf,
    probe_source: bool,
}

impl Orchestrator {
    /// Create an orchestrator using ffmpeg and providers configured in `settings`.
    pub fn new(settings: Settings) -> Result<Self> {
        let prompts = Prompts::load(
            settings.prompts.custom_dir.as_deref(),
            Some(&settings.prompts.variables),
        )?;
        let extractor: Arc<dyn MediaExtractor> =
            Arc::new(FfmpegExtractor::new(settings.frames.clone()));

        let temp_dir = settings.temp_dir();
        std::fs::create_dir_all(&temp_dir)?;

        Ok(Self {
            retry: RetryPolicy::from(&settings.retry),
            settings,
            prompts,
            extractor,
            provider: None,
            temp_dir,
            probe_source: true,
        })
    }

    /// Create an orchestrator with custom components. The given provider is
    /// used for every job regardless of its provider kind.
    pub fn with_components(
        settings: Settings,
        prompts: Prompts,
        extractor: Arc<dyn MediaExtractor>,
        provider: ProviderAdapter,
    ) -> Result<Self> {
        let temp_dir = settings.temp_dir();
        std::fs::create_dir_all(&temp_dir)?;

        Ok(Self {
            retry: RetryPolicy::from(&settings.retry),
            settings,
            prompts,
            extractor,
            provider: Some(provider),
            temp_dir,
            probe_source: false,
        })
    }

    /// Get the settings.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// A job for `video` using the configured analysis defaults.
    pub fn default_job(&self, video: impl Into<PathBuf>) -> AnalysisJob {
        AnalysisJob::new(video, &self.settings.analysis)
    }

    /// Analyze a video file segment by segment.
    #[instrument(skip_all, fields(job_id = %job.id, video = %job.video_source.display()))]
    pub async fn run(
        &self,
        job: &AnalysisJob,
        reporter: &dyn ProgressReporter,
        cancel: &CancelFlag,
    ) -> AnalysisOutcome {
        self.execute(job, self.extractor.as_ref(), reporter, cancel)
            .await
    }

    /// Analyze frames and audio that were extracted beforehand, as one batch.
    #[instrument(skip_all, fields(job_id = %job.id))]
    pub async fn run_prepared(
        &self,
        job: &AnalysisJob,
        media: PreExtracted,
        reporter: &dyn ProgressReporter,
        cancel: &CancelFlag,
    ) -> AnalysisOutcome {
        let job = job.clone().with_segments(1, job.segment_duration_sec);
        self.execute(&job, &media, reporter, cancel).await
    }

    async fn execute(
        &self,
        job: &AnalysisJob,
        extractor: &dyn MediaExtractor,
        reporter: &dyn ProgressReporter,
        cancel: &CancelFlag,
    ) -> AnalysisOutcome {
        let started_at = Utc::now();
        let finish = |engine: EngineOutcome, cleanup: CleanupReport| AnalysisOutcome {
            job_id: job.id,
            started_at,
            finished_at: Utc::now(),
            engine,
            cleanup,
        };

        if let Err(e) = job.validate() {
            reporter.send(ProgressEvent::error(e.to_string())).await;
            return finish(
                EngineOutcome::failed(job.segment_count, e.to_string()),
                CleanupReport::default(),
            );
        }

        let cleanup = match CleanupManager::create(&self.temp_dir, &job.id) {
            Ok(cleanup) => cleanup,
            Err(e) => {
                let message = format!("Could not create working directory: {}", e);
                reporter.send(ProgressEvent::error(message.clone())).await;
                return finish(
                    EngineOutcome::failed(job.segment_count, message),
                    CleanupReport::default(),
                );
            }
        };

        let analysis = self.analyze(job, extractor, reporter, cancel, &cleanup);
        let engine = match AssertUnwindSafe(analysis).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(panic) => {
                // The engine's state is lost with the panic, so no partial report is sent.
                let detail = panic
                    .downcast_ref::<String>()
                    .map(String::as_str)
                    .or_else(|| panic.downcast_ref::<&str>().copied())
                    .unwrap_or("unknown panic");
                error!("Analysis task panicked: {}", detail);
                let message = "An unexpected error occurred on the server.".to_string();
                reporter.send(ProgressEvent::error(message.clone())).await;
                EngineOutcome::failed(job.segment_count, message)
            }
        };

        reporter.send(ProgressEvent::status("Cleaning up...")).await;
        let cleanup_report = cleanup.run().await;
        reporter
            .send(ProgressEvent::status("Cleanup complete."))
            .await;

        info!(
            "Job finished: {}/{} segments, partial: {}",
            engine.completed_segments, engine.total_segments, engine.partial
        );
        finish(engine, cleanup_report)
    }

    async fn analyze(
        &self,
        job: &AnalysisJob,
        extractor: &dyn MediaExtractor,
        reporter: &dyn ProgressReporter,
        cancel: &CancelFlag,
        cleanup: &CleanupManager,
    ) -> EngineOutcome {
        let provider = match self.resolve_provider(job) {
            Ok(provider) => provider,
            Err(e) => {
                reporter.send(ProgressEvent::error(e.to_string())).await;
                return EngineOutcome::failed(job.segment_count, e.to_string());
            }
        };

        let source_name = job
            .video_source
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| job.video_source.display().to_string());
        reporter
            .send(ProgressEvent::status(format!(
                "Analyzing '{}' with {}: {} segments of {}s",
                source_name,
                provider.name(),
                job.segment_count,
                job.segment_duration_sec
            )))
            .await;

        let known_duration = if self.probe_source {
            match probe_duration(&job.video_source).await {
                Ok(duration) => Some(duration),
                Err(e) => {
                    warn!("Could not determine video length: {}", e);
                    None
                }
            }
        } else {
            None
        };

        let ctx = JobContext {
            extractor,
            reporter,
            cleanup,
            cancel,
        };
        ConversationEngine::new(job, &self.prompts, &provider, &self.retry, ctx)
            .with_known_duration(known_duration)
            .run()
            .await
    }

    fn resolve_provider(&self, job: &AnalysisJob) -> Result<ProviderAdapter> {
        match &self.provider {
            Some(provider) => Ok(provider.clone()),
            None => ProviderAdapter::from_settings(job.provider_kind, &self.settings),
        }
    }
}
