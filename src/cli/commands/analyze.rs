//! Analyze command implementation.

use crate::analysis::{AnalysisType, CancelFlag, ProviderKind};
use crate::cli::preflight::{self, Operation};
use crate::cli::{ConsoleReporter, Output};
use crate::config::Settings;
use crate::orchestrator::Orchestrator;
use anyhow::Result;
use std::path::PathBuf;
use tracing::debug;

/// Per-run overrides of the configured analysis defaults.
#[derive(Debug, Default)]
pub struct AnalyzeOptions {
    pub analysis_type: Option<AnalysisType>,
    pub language: Option<String>,
    pub segments: Option<u32>,
    pub segment_duration: Option<f64>,
    pub frame_interval: Option<f64>,
    pub provider: Option<ProviderKind>,
    pub output: Option<String>,
    pub json: bool,
}

/// Run the analyze command.
pub async fn run_analyze(input: &str, options: AnalyzeOptions, settings: Settings) -> Result<()> {
    let video = Settings::expand_path(input);
    if !video.is_file() {
        Output::error(&format!("Video file not found: {}", video.display()));
        return Err(anyhow::anyhow!("video file not found: {}", video.display()));
    }

    let orchestrator = Orchestrator::new(settings)?;
    let defaults = &orchestrator.settings().analysis;

    let mut job = orchestrator.default_job(video.clone()).with_segments(
        options.segments.unwrap_or(defaults.segment_count),
        options
            .segment_duration
            .unwrap_or(defaults.segment_duration_seconds),
    );
    if let Some(analysis_type) = options.analysis_type {
        job = job.with_analysis_type(analysis_type);
    }
    if let Some(language) = options.language {
        job = job.with_language(language);
    }
    if let Some(interval) = options.frame_interval {
        job = job.with_frame_interval(interval);
    }
    if let Some(provider) = options.provider {
        job = job.with_provider(provider);
    }
    job.validate()?;

    let operation = Operation::Analyze(job.provider_kind);
    if let Err(e) = preflight::check(operation, orchestrator.settings()) {
        Output::error(&format!("{}", e));
        Output::info("Run 'vidlens doctor' for detailed diagnostics.");
        return Err(e.into());
    }

    Output::info(&format!(
        "Analyzing {} ({} x {}s segments, {} report in {}, {})",
        video.display(),
        job.segment_count,
        job.segment_duration_sec,
        job.analysis_type,
        job.output_language,
        job.provider_kind
    ));

    let cancel = CancelFlag::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                debug!("Interrupt received");
                cancel.cancel();
            }
        })
    };

    let reporter = ConsoleReporter::new();
    let outcome = orchestrator.run(&job, &reporter, &cancel).await;
    drop(reporter);
    watcher.abort();

    if let Some(report) = &outcome.engine.report {
        match &options.output {
            Some(path) => {
                let path = Settings::expand_path(path);
                std::fs::write(&path, report)?;
                Output::success(&format!("Report written to {}", path.display()));
            }
            None => {
                Output::header("Report");
                println!("{}", report);
            }
        }
        if outcome.engine.partial {
            Output::warning(&format!(
                "Report covers only {} of {} segments.",
                outcome.engine.completed_segments, outcome.engine.total_segments
            ));
        }
    }

    if options.json {
        let json = serde_json::to_string_pretty(&outcome)?;
        match &options.output {
            Some(path) => {
                let path = PathBuf::from(format!("{}.json", Settings::expand_path(path).display()));
                std::fs::write(&path, json)?;
                Output::info(&format!("Job summary written to {}", path.display()));
            }
            None => println!("{}", json),
        }
    }

    match (&outcome.engine.report, &outcome.engine.error) {
        (Some(_), _) => Ok(()),
        (None, Some(error)) => Err(anyhow::anyhow!("analysis failed: {}", error)),
        (None, None) => Err(anyhow::anyhow!("analysis produced no report")),
    }
}
