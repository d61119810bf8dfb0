//! # HTTP Handlers
//!
//! Route table of the service. `configure_routes` is shared by `main` and the tests so
//! both exercise exactly the same routing.
//!
//! ## Routes:
//! - `GET  /` and `GET /health` (plus `/api/v1/health`, `/api/v1/metrics`)
//! - `POST /transcribe`, `POST /transcribe/upload`, `POST /run`
//! - `GET  /status/{job_id}`, `GET /status/{job_id}/result`
//! - `GET  /debug/config`, `/debug/jobs`, `/debug/environment`

pub mod debug;
pub mod status;
pub mod transcribe;

use crate::error::AppError;
use crate::health;
use crate::state::AppState;
use actix_web::{error::JsonPayloadError, web, HttpRequest, HttpResponse};
use serde_json::json;

pub fn configure_routes(cfg: &mut web::ServiceConfig, max_request_bytes: usize) {
    cfg.app_data(
        web::JsonConfig::default()
            .limit(max_request_bytes)
            .error_handler(json_error),
    )
    .app_data(web::PayloadConfig::new(max_request_bytes))
    .route("/", web::get().to(index))
    .route("/health", web::get().to(health::health_check))
    .route("/transcribe", web::post().to(transcribe::submit))
    .route("/transcribe/upload", web::post().to(transcribe::upload))
    .route("/run", web::post().to(transcribe::serverless_run))
    .route("/status/{job_id}", web::get().to(status::job_status))
    .route("/status/{job_id}/result", web::get().to(status::job_result))
    .service(
        web::scope("/api/v1")
            .route("/health", web::get().to(health::health_check))
            .route("/metrics", web::get().to(health::detailed_metrics)),
    )
    .configure(debug::configure_debug_routes);
}

/// Unparsable JSON bodies get the same error envelope as every other client error.
fn json_error(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    let message = match &err {
        JsonPayloadError::Overflow { limit } | JsonPayloadError::OverflowKnownLength { limit, .. } => {
            format!("Request body exceeds {} bytes", limit)
        }
        other => format!("Invalid JSON body: {}", other),
    };
    AppError::Validation(message).into()
}

/// `GET /`
async fn index(state: web::Data<AppState>) -> HttpResponse {
    let transcriber = state.pipeline.transcriber();
    HttpResponse::Ok().json(json!({
        "service": "WhisperX transcription server",
        "version": env!("CARGO_PKG_VERSION"),
        "model": transcriber.model_name(),
        "diarization": transcriber.diarization_ready(),
        "endpoints": {
            "health": "GET /health",
            "transcribe": "POST /transcribe",
            "upload": "POST /transcribe/upload",
            "status": "GET /status/{job_id}",
            "result": "GET /status/{job_id}/result",
            "serverless": "POST /run"
        }
    }))
}
