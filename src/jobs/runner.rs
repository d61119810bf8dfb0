//! # Background Job Runner
//!
//! Runs submitted jobs to completion after the HTTP request that created them has
//! already returned.
//!
//! ## How a job runs:
//! 1. `submit` registers the job as `queued` and spawns a task, then returns at once
//! 2. The task waits for a transcription slot (the job stays `queued` meanwhile)
//! 3. The pipeline runs, and every stage it enters is written to the registry
//! 4. The outcome is recorded exactly once: `completed` with a summary, or `failed`
//!    with the error text
//!
//! ## Failure containment:
//! Errors and panics inside a job never escape the task. A panic is caught and turned
//! into a `failed` job like any other error, so no job is left stuck mid-lifecycle.

use super::model::{Job, JobId, JobUpdate};
use super::registry::JobRegistry;
use crate::delivery::Delivery;
use crate::error::AppResult;
use crate::pipeline::Pipeline;
use crate::request::TranscriptionJob;
use futures_util::FutureExt;
use serde::Serialize;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, info_span, warn, Instrument};

/// Lifetime job counters, reported by the health and metrics endpoints.
#[derive(Debug, Default)]
pub struct JobCounters {
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    active: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
    /// Jobs holding a transcription slot right now
    pub active: u64,
}

impl JobCounters {
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            active: self.active.load(Ordering::Relaxed),
        }
    }
}

/// Decrements the active count when the job leaves its slot.
struct ActiveGuard(Arc<JobCounters>);

impl ActiveGuard {
    fn enter(counters: &Arc<JobCounters>) -> Self {
        counters.active.fetch_add(1, Ordering::Relaxed);
        Self(counters.clone())
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::Relaxed);
    }
}

#[derive(Clone)]
pub struct JobRunner {
    registry: JobRegistry,
    pipeline: Arc<Pipeline>,
    counters: Arc<JobCounters>,
}

impl JobRunner {
    pub fn new(registry: JobRegistry, pipeline: Arc<Pipeline>) -> Self {
        Self {
            registry,
            pipeline,
            counters: Arc::new(JobCounters::default()),
        }
    }

    pub fn counters(&self) -> CounterSnapshot {
        self.counters.snapshot()
    }

    /// Register `job` and start it in the background. Returns the `queued` record.
    pub fn submit(&self, job: TranscriptionJob) -> Job {
        let record = self.registry.create();
        self.counters.submitted.fetch_add(1, Ordering::Relaxed);

        let span = info_span!("job", job_id = %record.id);
        tokio::spawn(self.clone().run(record.id, job).instrument(span));

        record
    }

    async fn run(self, id: JobId, job: TranscriptionJob) {
        let started = Instant::now();
        info!(source = %job.source.describe(), "Job started");

        let outcome = AssertUnwindSafe(self.drive(id, &job)).catch_unwind().await;
        let update = match outcome {
            Ok(Ok(delivery)) => {
                self.counters.completed.fetch_add(1, Ordering::Relaxed);
                info!(elapsed_ms = started.elapsed().as_millis() as u64, "Job completed");
                match delivery {
                    Delivery::Inline(result) => {
                        JobUpdate::completed(result.summary(), Some(Arc::new(result)))
                    }
                    Delivery::Uploaded(summary) => JobUpdate::completed(summary, None),
                }
            }
            Ok(Err(err)) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                warn!(error = %err, "Job failed");
                JobUpdate::failed(err.to_string())
            }
            Err(panic) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                let reason = panic_message(panic.as_ref());
                error!(reason = %reason, "Job panicked");
                JobUpdate::failed(format!("Internal error: job panicked: {}", reason))
            }
        };

        if let Err(e) = self.registry.update(id, update) {
            error!(error = %e, "Could not record job outcome");
        }
    }

    async fn drive(&self, id: JobId, job: &TranscriptionJob) -> AppResult<Delivery> {
        let _permit = match self.pipeline.try_admit() {
            Some(permit) => permit,
            None => {
                self.registry
                    .update(id, JobUpdate::message("Waiting for a free transcription slot"))?;
                self.pipeline.admit().await?
            }
        };
        let _active = ActiveGuard::enter(&self.counters);

        let registry = &self.registry;
        self.pipeline
            .execute(job, move |stage| {
                if let Err(e) = registry.update(id, JobUpdate::stage(stage)) {
                    warn!(error = %e, "Stage update rejected");
                }
            })
            .await
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
