//! Job status polling.
//!
//! Finished jobs past their retention window are evicted before every lookup, so an
//! expired job answers exactly like one that never existed.

use crate::error::{AppError, AppResult};
use crate::jobs::{Job, JobId, JobStatus};
use crate::state::AppState;
use actix_web::{web, HttpResponse};

fn lookup(state: &AppState, raw_id: &str) -> AppResult<Job> {
    state.jobs.evict_stale(state.config.retention());

    JobId::parse(raw_id)
        .and_then(|id| state.jobs.get(id))
        .ok_or_else(|| AppError::NotFound(format!("Job {} not found", raw_id)))
}

/// `GET /status/{job_id}`
pub async fn job_status(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let job = lookup(&state, &path)?;
    Ok(HttpResponse::Ok().json(job))
}

/// `GET /status/{job_id}/result`: the full result of a completed job that was not
/// uploaded elsewhere.
pub async fn job_result(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let job = lookup(&state, &path)?;

    if job.status != JobStatus::Completed {
        return Err(AppError::Conflict(format!(
            "Job {} is {}, result not available",
            job.id, job.status
        )));
    }
    match job.result {
        Some(result) => Ok(HttpResponse::Ok().json(result.as_ref())),
        None => Err(AppError::Conflict(format!(
            "Result of job {} was delivered to its result_url",
            job.id
        ))),
    }
}
