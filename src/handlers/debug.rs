//! Debug endpoints for inspecting a running server without shell access to the pod.
//!
//! Nothing here exposes secrets: the configuration is redacted and environment
//! variables holding tokens are reported as "set" / "not set" only. Proxy URLs are
//! shown with their credentials masked.

use crate::redact::redact_url;
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde_json::json;

/// Jobs listed by `/debug/jobs`, newest first.
const JOB_LISTING_LIMIT: usize = 50;

/// `GET /debug/config`
pub async fn debug_config(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "config": state.config.redacted()
    }))
}

/// `GET /debug/jobs`
pub async fn debug_jobs(state: web::Data<AppState>) -> HttpResponse {
    let jobs = state.jobs.snapshot();
    let listed: Vec<_> = jobs.iter().take(JOB_LISTING_LIMIT).collect();

    HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "summary": state.jobs.summary(),
        "counters": state.runner.counters(),
        "retention_seconds": state.config.jobs.retention_seconds,
        "slots": {
            "total": state.pipeline.capacity(),
            "available": state.pipeline.available_slots()
        },
        "jobs": listed,
        "truncated": jobs.len() > JOB_LISTING_LIMIT
    }))
}

/// `GET /debug/environment`
pub async fn debug_environment(state: web::Data<AppState>) -> HttpResponse {
    let var = |name: &str| std::env::var(name).unwrap_or_else(|_| "not set".to_string());
    // Proxy URLs routinely embed credentials
    let proxy = |name: &str| {
        std::env::var(name)
            .map(|value| redact_url(&value))
            .unwrap_or_else(|_| "not set".to_string())
    };
    let presence = |name: &str| if std::env::var(name).is_ok() { "set" } else { "not set" };
    let transcriber = state.pipeline.transcriber();

    HttpResponse::Ok().json(json!({
        "hf_home": var("HF_HOME"),
        "hf_token": presence("HF_TOKEN"),
        "http_proxy": proxy("HTTP_PROXY"),
        "https_proxy": proxy("HTTPS_PROXY"),
        "no_proxy": var("NO_PROXY"),
        "cuda_visible_devices": var("CUDA_VISIBLE_DEVICES"),
        "transcriber": {
            "binary": state.config.transcriber.binary,
            "model": transcriber.model_name(),
            "device": transcriber.device(),
            "diarization": transcriber.diarization_ready()
        },
        "temp_dir": state.config.temp_dir()
    }))
}

pub fn configure_debug_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/debug")
            .route("/config", web::get().to(debug_config))
            .route("/jobs", web::get().to(debug_jobs))
            .route("/environment", web::get().to(debug_environment)),
    );
}
