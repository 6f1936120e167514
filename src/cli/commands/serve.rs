//! HTTP API server for browser clients.
//!
//! A client first opens `GET /api/events/{subscriberId}` and then uploads a
//! video with `POST /api/analyze`. Progress for that job is streamed on the
//! event stream as server-sent `progressUpdate` events.

use crate::analysis::{
    AnalysisJob, AnalysisType, CancelFlag, ChannelReporter, ProgressEvent, ProviderKind,
};
use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::{AnalysisSettings, Settings};
use crate::orchestrator::Orchestrator;
use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{HeaderValue, Method, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures::stream::{self, Stream};
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, Semaphore};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Events buffered per subscriber before status updates start being dropped.
const SUBSCRIBER_BUFFER: usize = 64;

const EVENT_NAME: &str = "progressUpdate";

/// Open event streams, keyed by subscriber id.
#[derive(Default)]
struct SubscriberHub {
    senders: Mutex<HashMap<String, mpsc::Sender<ProgressEvent>>>,
}

impl SubscriberHub {
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, mpsc::Sender<ProgressEvent>>> {
        self.senders
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a subscriber, replacing any previous stream with the same id.
    fn subscribe(&self, id: &str) -> mpsc::Receiver<ProgressEvent> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        self.lock().insert(id.to_string(), tx);
        rx
    }

    /// Sender for a connected subscriber.
    fn sender(&self, id: &str) -> Option<mpsc::Sender<ProgressEvent>> {
        self.lock()
            .get(id)
            .filter(|tx| !tx.is_closed())
            .cloned()
    }

    /// Forget the subscriber if it still owns the given channel.
    fn release(&self, id: &str, tx: &mpsc::Sender<ProgressEvent>) {
        let mut senders = self.lock();
        if senders.get(id).is_some_and(|current| current.same_channel(tx)) {
            senders.remove(id);
        }
    }
}

/// Shared application state.
struct AppState {
    orchestrator: Orchestrator,
    hub: SubscriberHub,
    jobs: Arc<Semaphore>,
    upload_dir: PathBuf,
}

/// Run the HTTP API server.
pub async fn run_serve(
    host: Option<String>,
    port: Option<u16>,
    settings: Settings,
) -> anyhow::Result<()> {
    if let Err(e) = preflight::check(Operation::Serve, &settings) {
        Output::error(&format!("{}", e));
        Output::info("Run 'vidlens doctor' for detailed diagnostics.");
        return Err(e.into());
    }

    let host = host.unwrap_or_else(|| settings.server.host.clone());
    let port = port.unwrap_or(settings.server.port);
    let upload_dir = settings.upload_dir();
    tokio::fs::create_dir_all(&upload_dir).await?;

    let cors = cors_layer(&settings.server.cors_origins);
    let body_limit = settings.server.max_upload_bytes;
    let max_jobs = settings.server.max_concurrent_jobs.max(1);

    let state = Arc::new(AppState {
        orchestrator: Orchestrator::new(settings)?,
        hub: SubscriberHub::default(),
        jobs: Arc::new(Semaphore::new(max_jobs)),
        upload_dir,
    });

    let app = Router::new()
        .route("/health", get(health))
        .route("/api/analyze", post(analyze))
        .route("/api/events/{subscriber_id}", get(events))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .with_state(state);

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    Output::header("vidlens API Server");
    println!();
    Output::success(&format!("Listening on http://{}", addr));
    println!();
    println!("Endpoints:");
    Output::kv("Health", "GET  /health");
    Output::kv("Analyze", "POST /api/analyze (multipart)");
    Output::kv("Events", "GET  /api/events/{subscriberId} (SSE)");
    println!();
    Output::info("Press Ctrl+C to stop the server.");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    Ok(())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", o);
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(parsed))
}

// === Request/Response Types ===

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AcceptedResponse {
    message: String,
    job_id: Uuid,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

/// Build a job from multipart text fields. Missing or unusable values fall
/// back to the configured defaults.
fn job_from_fields(
    video: PathBuf,
    fields: &HashMap<String, String>,
    defaults: &AnalysisSettings,
) -> AnalysisJob {
    let field = |name: &str| fields.get(name).map(|v| v.trim()).filter(|v| !v.is_empty());
    let positive = |name: &str| {
        field(name)
            .and_then(|v| v.parse::<f64>().ok())
            .filter(|v| v.is_finite() && *v > 0.0)
    };

    let segment_count = field("segmentCount")
        .and_then(|v| v.parse::<u32>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(defaults.segment_count);
    let segment_duration =
        positive("segmentDurationSec").unwrap_or(defaults.segment_duration_seconds);
    let frame_interval = positive("frameIntervalSec").unwrap_or(defaults.frame_interval_seconds);

    let mut job = AnalysisJob::new(video, defaults)
        .with_segments(segment_count, segment_duration)
        .with_frame_interval(frame_interval);

    let analysis_type = field("analysisType").and_then(|v| v.parse::<AnalysisType>().ok());
    if let Some(analysis_type) = analysis_type {
        job = job.with_analysis_type(analysis_type);
    }
    if let Some(language) = field("outputLanguage") {
        job = job.with_language(language);
    }
    if let Some(provider) = field("providerKind").and_then(|v| v.parse::<ProviderKind>().ok()) {
        job = job.with_provider(provider);
    }
    job
}

// === Handlers ===

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn events(
    State(state): State<Arc<AppState>>,
    Path(subscriber_id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    info!("Subscriber connected: {}", subscriber_id);
    let rx = state.hub.subscribe(&subscriber_id);

    let stream = stream::unfold(rx, |mut rx| async move {
        let event = rx.recv().await?;
        Some((Event::default().event(EVENT_NAME).json_data(&event), rx))
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

/// Multipart contents of an analyze request.
struct Upload {
    video: Option<PathBuf>,
    fields: HashMap<String, String>,
}

/// Stream the `video` part into `upload_dir` and collect the text fields.
///
/// On failure nothing stored by this request is left behind.
async fn receive_upload(
    multipart: &mut Multipart,
    upload_dir: &std::path::Path,
) -> Result<Upload, Response> {
    let mut fields = HashMap::new();
    let mut video: Option<PathBuf> = None;

    loop {
        let mut field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                discard(video.as_ref()).await;
                return Err(error_response(
                    StatusCode::BAD_REQUEST,
                    format!("Invalid upload: {}", e),
                ));
            }
        };
        let name = field.name().unwrap_or_default().to_string();

        if name == "video" {
            if video.is_some() {
                discard(video.as_ref()).await;
                return Err(error_response(
                    StatusCode::BAD_REQUEST,
                    "Only one video file can be analyzed per request.",
                ));
            }
            let ext = field
                .file_name()
                .and_then(|n| std::path::Path::new(n).extension())
                .and_then(|e| e.to_str())
                .unwrap_or("mp4")
                .to_string();
            let path = upload_dir.join(format!("{}.{}", Uuid::new_v4(), ext));
            let mut file = match tokio::fs::File::create(&path).await {
                Ok(file) => file,
                Err(e) => {
                    error!("Failed to create {}: {}", path.display(), e);
                    return Err(error_response(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Could not store upload.",
                    ));
                }
            };
            video = Some(path.clone());
            loop {
                match field.chunk().await {
                    Ok(Some(chunk)) => {
                        if let Err(e) = file.write_all(&chunk).await {
                            error!("Failed to write {}: {}", path.display(), e);
                            discard(video.as_ref()).await;
                            return Err(error_response(
                                StatusCode::INTERNAL_SERVER_ERROR,
                                "Could not store upload.",
                            ));
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        discard(video.as_ref()).await;
                        return Err(error_response(
                            StatusCode::BAD_REQUEST,
                            format!("Upload interrupted: {}", e),
                        ));
                    }
                }
            }
            if let Err(e) = file.flush().await {
                warn!("Failed to flush {}: {}", path.display(), e);
            }
        } else {
            match field.text().await {
                Ok(value) => {
                    fields.insert(name, value);
                }
                Err(e) => warn!("Ignoring unreadable field {}: {}", name, e),
            }
        }
    }

    Ok(Upload { video, fields })
}

async fn analyze(State(state): State<Arc<AppState>>, mut multipart: Multipart) -> Response {
    let Upload { video, fields } = match receive_upload(&mut multipart, &state.upload_dir).await {
        Ok(upload) => upload,
        Err(response) => return response,
    };

    let Some(video) = video else {
        return error_response(StatusCode::BAD_REQUEST, "Video file not found.");
    };
    let Some(subscriber_id) = fields
        .get("subscriberId")
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
    else {
        discard(Some(&video)).await;
        return error_response(StatusCode::BAD_REQUEST, "Subscriber ID not found.");
    };
    let Some(tx) = state.hub.sender(&subscriber_id) else {
        discard(Some(&video)).await;
        return error_response(
            StatusCode::BAD_REQUEST,
            "Event stream not open. Connect to /api/events/{subscriberId} first.",
        );
    };

    let job = job_from_fields(video, &fields, &state.orchestrator.settings().analysis);
    let job_id = job.id;
    info!("Analysis request received (subscriber {}, job {})", subscriber_id, job_id);

    tokio::spawn(run_job(state, job, subscriber_id, tx));

    (
        StatusCode::ACCEPTED,
        Json(AcceptedResponse {
            message: "Analysis request accepted.".to_string(),
            job_id,
        }),
    )
        .into_response()
}

async fn run_job(
    state: Arc<AppState>,
    job: AnalysisJob,
    subscriber_id: String,
    tx: mpsc::Sender<ProgressEvent>,
) {
    let cancel = CancelFlag::new();
    let reporter = ChannelReporter::new(tx.clone(), cancel.clone());

    if state.jobs.available_permits() == 0 {
        let _ = tx.try_send(ProgressEvent::status("Waiting for a free analysis slot..."));
    }
    match state.jobs.clone().acquire_owned().await {
        Ok(_permit) => {
            let outcome = state.orchestrator.run(&job, &reporter, &cancel).await;
            info!(
                "Job {} done: {}/{} segments",
                job.id, outcome.engine.completed_segments, outcome.engine.total_segments
            );
        }
        Err(e) => {
            error!("Job queue closed: {}", e);
            let failed = ProgressEvent::error("An unexpected error occurred on the server.");
            let _ = tx.send(failed).await;
        }
    }

    match tokio::fs::remove_file(&job.video_source).await {
        Ok(()) => info!("Temporary uploaded video deleted: {}", job.video_source.display()),
        Err(e) => warn!("Could not delete uploaded video {}: {}", job.video_source.display(), e),
    }
    state.hub.release(&subscriber_id, &tx);
}

async fn discard(path: Option<&PathBuf>) {
    if let Some(path) = path {
        if let Err(e) = tokio::fs::remove_file(path).await {
            warn!("Could not delete {}: {}", path.display(), e);
        }
    }
}
