//! # Transcription Endpoints
//!
//! ## Endpoints:
//! - `POST /transcribe`: JSON submission. Background job by default (`async_mode`),
//!   or run while the client waits
//! - `POST /transcribe/upload`: Multipart file upload, always synchronous
//! - `POST /run`: Serverless-worker event (`{"input": {...}}`), always synchronous
//!
//! ## Response shapes:
//! - Background job: `{"job_id", "status": "queued", "message"}`
//! - Synchronous, no `result_url`: the full transcription result
//! - Synchronous with `result_url`: an upload receipt with the result summary
//!
//! Synchronous requests take a transcription slot like background jobs do, so a burst of
//! direct requests waits its turn instead of overcommitting the accelerator.

use crate::audio::{extension_from_filename, AudioSource};
use crate::delivery::Delivery;
use crate::error::{AppError, AppResult};
use crate::request::{TranscribeRequest, TranscriptionJob};
use crate::state::AppState;
use crate::transcription::result::round_seconds;
use crate::transcription::{ResultSummary, TranscriptionResult};
use actix_multipart::{Field, Multipart};
use actix_web::{web, HttpResponse};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Sent instead of the result when it was uploaded to `result_url`.
#[derive(Debug, Serialize)]
struct UploadReceipt {
    status: &'static str,
    message: &'static str,
    #[serde(flatten)]
    summary: ResultSummary,
    total_time_seconds: f64,
}

/// Result of `/transcribe/upload`, which also echoes the uploaded file name.
#[derive(Debug, Serialize)]
struct NamedResult<'a> {
    #[serde(flatten)]
    result: &'a TranscriptionResult,
    filename: &'a str,
}

/// `POST /transcribe`
pub async fn submit(
    state: web::Data<AppState>,
    body: web::Json<TranscribeRequest>,
) -> AppResult<HttpResponse> {
    let request = body.into_inner();
    let async_mode = request.async_mode;
    let job = request.into_job(state.config.transcriber.enable_diarization)?;

    info!(
        source = %job.source.describe(),
        async_mode,
        diarize = job.options.diarize,
        upload = job.result_url.is_some(),
        "Transcription requested"
    );

    if async_mode {
        let record = state.runner.submit(job);
        return Ok(HttpResponse::Ok().json(json!({
            "job_id": record.id,
            "status": record.status,
            "message": format!("Job queued. Poll /status/{} for progress.", record.id)
        })));
    }

    let started = Instant::now();
    let delivery = run_now(&state, job).await?;
    Ok(delivery_response(delivery, started))
}

/// `POST /transcribe/upload`
pub async fn upload(state: web::Data<AppState>, payload: Multipart) -> AppResult<HttpResponse> {
    let started = Instant::now();
    let form = UploadForm::read(payload, state.config.max_request_bytes()).await?;

    let data = form
        .file
        .ok_or_else(|| AppError::Validation("Missing 'file' field".to_string()))?;
    if data.is_empty() {
        return Err(AppError::Validation("Uploaded file is empty".to_string()));
    }
    let filename = form.filename.unwrap_or_else(|| "upload".to_string());

    let options = TranscriptionJob::options(
        form.language,
        form.diarize.unwrap_or(true) && state.config.transcriber.enable_diarization,
        form.min_speakers,
        form.max_speakers,
    )?;
    let job = TranscriptionJob {
        source: AudioSource::Bytes {
            extension: extension_from_filename(&filename),
            data,
        },
        options,
        result_url: None,
    };
    info!(filename = %filename, source = %job.source.describe(), "Upload transcription requested");

    match run_now(&state, job).await? {
        Delivery::Inline(result) => Ok(HttpResponse::Ok().json(NamedResult {
            result: &result,
            filename: &filename,
        })),
        uploaded => Ok(delivery_response(uploaded, started)),
    }
}

/// A serverless invocation: `{"id": "...", "input": { <TranscribeRequest> }}`.
#[derive(Debug, Deserialize)]
struct ServerlessEvent {
    #[serde(default)]
    id: Option<String>,
    input: TranscribeRequest,
}

/// `POST /run`
///
/// Serverless platforms treat any non-2xx as an infrastructure fault and retry, so
/// failures are reported in the body as `{"error": "..."}` with status 200. That
/// includes bodies that are not valid JSON, hence the raw payload.
pub async fn serverless_run(state: web::Data<AppState>, body: web::Bytes) -> HttpResponse {
    let started = Instant::now();
    match run_event(&state, &body).await {
        Ok(delivery) => delivery_response(delivery, started),
        Err(err) => {
            warn!(error = %err, "Serverless job failed");
            HttpResponse::Ok().json(json!({ "error": err.to_string() }))
        }
    }
}

async fn run_event(state: &AppState, body: &[u8]) -> AppResult<Delivery> {
    let event: ServerlessEvent = serde_json::from_slice(body)?;
    info!(event_id = event.id.as_deref().unwrap_or("-"), "Serverless job received");
    let job = event
        .input
        .into_job(state.config.transcriber.enable_diarization)?;
    run_now(state, job).await
}

/// Wait for a slot, then run the job on its own task so a client that disconnects
/// mid-transcription cannot release the slot or the audio early.
async fn run_now(state: &AppState, job: TranscriptionJob) -> AppResult<Delivery> {
    let permit = state.pipeline.admit().await?;
    state.pipeline.clone().run_admitted(permit, job).await
}

fn delivery_response(delivery: Delivery, started: Instant) -> HttpResponse {
    match delivery {
        Delivery::Inline(result) => HttpResponse::Ok().json(result),
        Delivery::Uploaded(summary) => HttpResponse::Ok().json(UploadReceipt {
            status: "completed",
            message: "Result uploaded to result_url",
            summary,
            total_time_seconds: round_seconds(started.elapsed().as_secs_f64()),
        }),
    }
}

/// Fields accepted by `/transcribe/upload`.
#[derive(Debug, Default)]
struct UploadForm {
    file: Option<Vec<u8>>,
    filename: Option<String>,
    language: Option<String>,
    diarize: Option<bool>,
    min_speakers: Option<u32>,
    max_speakers: Option<u32>,
}

impl UploadForm {
    async fn read(mut payload: Multipart, limit: usize) -> AppResult<Self> {
        let mut form = Self::default();

        while let Some(item) = payload.next().await {
            let mut field: Field =
                item.map_err(|e| AppError::Validation(format!("Multipart error: {}", e)))?;
            let (name, filename) = match field.content_disposition() {
                Some(disposition) => (
                    disposition.get_name().unwrap_or_default().to_string(),
                    disposition.get_filename().map(str::to_string),
                ),
                None => (String::new(), None),
            };

            let bytes = read_field(&mut field, limit).await?;
            match name.as_str() {
                "file" => {
                    form.filename = filename;
                    form.file = Some(bytes);
                }
                "language" => form.language = Some(text(&name, bytes)?),
                "diarize" => form.diarize = Some(parse_flag(&text(&name, bytes)?)?),
                "min_speakers" => form.min_speakers = parse_count(&name, &text(&name, bytes)?)?,
                "max_speakers" => form.max_speakers = parse_count(&name, &text(&name, bytes)?)?,
                other => debug!(field = other, "Ignoring unknown multipart field"),
            }
        }

        Ok(form)
    }
}

async fn read_field(field: &mut Field, limit: usize) -> AppResult<Vec<u8>> {
    let mut bytes = Vec::new();
    while let Some(chunk) = field.next().await {
        let chunk = chunk.map_err(|e| AppError::Validation(format!("Chunk error: {}", e)))?;
        if bytes.len() + chunk.len() > limit {
            return Err(AppError::Validation(format!(
                "File too large (max: {} bytes)",
                limit
            )));
        }
        bytes.extend_from_slice(&chunk);
    }
    Ok(bytes)
}

fn text(name: &str, bytes: Vec<u8>) -> AppResult<String> {
    String::from_utf8(bytes)
        .map(|value| value.trim().to_string())
        .map_err(|_| AppError::Validation(format!("Field '{}' is not valid UTF-8", name)))
}

fn parse_flag(value: &str) -> AppResult<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(AppError::Validation(format!(
            "Field 'diarize' must be true or false, got '{}'",
            other
        ))),
    }
}

fn parse_count(name: &str, value: &str) -> AppResult<Option<u32>> {
    if value.is_empty() {
        return Ok(None);
    }
    value
        .parse()
        .map(Some)
        .map_err(|_| AppError::Validation(format!("Field '{}' must be a positive integer", name)))
}
