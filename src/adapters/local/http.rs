//! HTTP inbound adapter: upload a file, get the compressed MP4 back.

use crate::application::orchestrator::{JobFailure, PipelineOrchestrator};
use crate::domain::av::metadata::Metadata;
use crate::domain::av::stages::Stage;
use crate::domain::av::stream::{AudioStream, VideoStream};
use crate::domain::jobs::InputFile;
use crate::domain::paths::validate_component;
use crate::error::TranscodeError;
use crate::ports::engine::CodecEngine;
use crate::ports::probe::MetadataProbe;
use crate::ports::workspace::WorkspacePort;
use axum::{
    extract::{DefaultBodyLimit, Multipart, Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub struct AppState<W, E, P> {
    pipeline: Arc<PipelineOrchestrator<W, E, P>>,
    /// Caps the number of jobs running at once.
    jobs: Arc<Semaphore>,
}

impl<W, E, P> Clone for AppState<W, E, P> {
    fn clone(&self) -> Self {
        Self {
            pipeline: self.pipeline.clone(),
            jobs: self.jobs.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct VideoSummary {
    #[serde(flatten)]
    pub stream: VideoStream,
    pub horizontal: bool,
}

/// Probed metadata plus the typed stream summaries shown next to it.
#[derive(Debug, Serialize)]
pub struct MediaReport {
    #[serde(flatten)]
    pub metadata: Metadata,
    pub duration: Option<f64>,
    pub video: Vec<VideoSummary>,
    pub audio: Vec<AudioStream>,
}

impl From<Metadata> for MediaReport {
    fn from(metadata: Metadata) -> Self {
        let video = metadata
            .video_streams()
            .into_iter()
            .map(|stream| VideoSummary {
                horizontal: stream.is_horizontal(),
                stream,
            })
            .collect();
        Self {
            duration: metadata.duration(),
            audio: metadata.audio_streams(),
            video,
            metadata,
        }
    }
}

/// JSON answer of `/compress?report=true`: both sides of the conversion.
#[derive(Debug, Serialize)]
pub struct CompressReport {
    pub job_id: String,
    pub file_name: String,
    pub size: usize,
    pub source: MediaReport,
    pub output: MediaReport,
}

#[derive(Debug, Default, Deserialize)]
struct CompressParams {
    /// Answer with a report instead of the file.
    #[serde(default)]
    report: bool,
}

type ApiError = (StatusCode, Json<ErrorBody>);

fn plain_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorBody {
            job_id: None,
            stage: None,
            error: message.into(),
        }),
    )
}

fn bad_request(message: impl Into<String>) -> ApiError {
    plain_error(StatusCode::BAD_REQUEST, message)
}

fn status_for(error: &TranscodeError) -> StatusCode {
    match error {
        TranscodeError::Stage { .. } | TranscodeError::EmptyStream { .. } | TranscodeError::Probe(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn job_error(failure: JobFailure) -> ApiError {
    (
        status_for(&failure.error),
        Json(ErrorBody {
            stage: Some(failure.stage()),
            error: failure.error.to_string(),
            job_id: Some(failure.job_id),
        }),
    )
}

pub fn router<W, E, P>(pipeline: PipelineOrchestrator<W, E, P>, max_concurrent_jobs: usize) -> Router
where
    W: WorkspacePort + Clone + 'static,
    E: CodecEngine + 'static,
    P: MetadataProbe + 'static,
{
    let state = AppState {
        pipeline: Arc::new(pipeline),
        jobs: Arc::new(Semaphore::new(max_concurrent_jobs.max(1))),
    };

    Router::new()
        .route("/", get(root))
        .route("/compress", post(compress::<W, E, P>))
        .route("/probe", post(probe::<W, E, P>))
        .layer(DefaultBodyLimit::disable())
        .with_state(state)
}

/// First file field of the form.
async fn read_upload(mut multipart: Multipart) -> Result<InputFile, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(e.to_string()))?
    {
        let Some(file_name) = field.file_name().map(str::to_owned) else {
            continue;
        };
        if validate_component(&file_name).is_err() {
            warn!("Rejected upload name {:?}", file_name);
            return Err(bad_request("Invalid file name"));
        }
        let bytes = field.bytes().await.map_err(|e| bad_request(e.to_string()))?;
        return Ok(InputFile::new(file_name, bytes.to_vec()));
    }
    Err(bad_request("No file in upload"))
}

fn download_name(input_name: &str) -> String {
    let stem = Path::new(input_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    format!("{}-compressed.mp4", stem)
}

async fn compress<W, E, P>(
    State(state): State<AppState<W, E, P>>,
    Query(params): Query<CompressParams>,
    multipart: Multipart,
) -> Result<Response, ApiError>
where
    W: WorkspacePort + Clone + 'static,
    E: CodecEngine + 'static,
    P: MetadataProbe + 'static,
{
    let input = read_upload(multipart).await?;
    let permit = state
        .jobs
        .clone()
        .acquire_owned()
        .await
        .map_err(|e| plain_error(StatusCode::SERVICE_UNAVAILABLE, e.to_string()))?;

    let name = download_name(&input.name);
    // The job lives in its own task: a client going away cancels it, and the
    // task still finishes its cleanup.
    let cancel = CancellationToken::new();
    let _cancel_on_disconnect = cancel.clone().drop_guard();
    let pipeline = state.pipeline.clone();
    let job = tokio::spawn(async move {
        let _permit = permit;
        pipeline.submit_with_cancel(input, cancel).await
    });
    let output = job
        .await
        .map_err(|e| {
            error!("Job task aborted: {}", e);
            plain_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })?
        .map_err(job_error)?;
    info!("Job {} served as {}", output.job_id, name);

    if params.report {
        return Ok(Json(CompressReport {
            job_id: output.job_id,
            file_name: name,
            size: output.bytes.len(),
            source: output.source_metadata.into(),
            output: output.metadata.into(),
        })
        .into_response());
    }

    Ok((
        [
            (header::CONTENT_TYPE, "video/mp4".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", name),
            ),
        ],
        output.bytes,
    )
        .into_response())
}

async fn probe<W, E, P>(
    State(state): State<AppState<W, E, P>>,
    multipart: Multipart,
) -> Result<Response, ApiError>
where
    W: WorkspacePort + Clone + 'static,
    E: CodecEngine + 'static,
    P: MetadataProbe + 'static,
{
    let input = read_upload(multipart).await?;
    let metadata = state.pipeline.describe(&input).await.map_err(|error| {
        (
            status_for(&error),
            Json(ErrorBody {
                job_id: None,
                stage: Some(error.stage()),
                error: error.to_string(),
            }),
        )
    })?;
    Ok(Json(MediaReport::from(metadata)).into_response())
}

async fn root() -> Html<&'static str> {
    Html(
        r#"
        <!doctype html>
        <html>
            <head>
                <title>minivid</title>
            </head>
            <body>
                <h2>Compress</h2>
                <form action="/compress" method="post" enctype="multipart/form-data">
                    <input type="file" name="file" accept="video/*,audio/*">
                    <input type="submit" value="Compress">
                </form>
                <form action="/compress?report=true" method="post" enctype="multipart/form-data">
                    <input type="file" name="file" accept="video/*,audio/*">
                    <input type="submit" value="Compress and compare metadata">
                </form>
                <h2>Inspect</h2>
                <form action="/probe" method="post" enctype="multipart/form-data">
                    <input type="file" name="file" accept="video/*,audio/*">
                    <input type="submit" value="Show metadata">
                </form>
            </body>
        </html>
        "#,
    )
}
