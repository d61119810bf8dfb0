//! # Job Records
//!
//! The data a client sees when polling `GET /status/{job_id}`, and the rules for how it
//! may change.
//!
//! ## Lifecycle:
//! ```text
//! queued → downloading → processing ─┬→ uploading → completed
//!                                    └────────────→ completed
//!   (any non-terminal state) → failed
//! ```
//! `completed` and `failed` are terminal: once there, a job never changes again.
//!
//! ## Progress:
//! Each stage carries a fixed progress percentage (0, 5, 20, 90, 100). Progress never
//! goes down; a failed job keeps whatever progress it had reached.

use crate::transcription::{ResultSummary, TranscriptionResult};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Opaque job identifier handed to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a client-supplied id. Anything that is not a UUID cannot name a job.
    pub fn parse(raw: &str) -> Option<Self> {
        Uuid::parse_str(raw.trim()).ok().map(Self)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Downloading,
    Processing,
    Uploading,
    Completed,
    Failed,
}

impl JobStatus {
    pub const ALL: [JobStatus; 6] = [
        JobStatus::Queued,
        JobStatus::Downloading,
        JobStatus::Processing,
        JobStatus::Uploading,
        JobStatus::Completed,
        JobStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Downloading => "downloading",
            JobStatus::Processing => "processing",
            JobStatus::Uploading => "uploading",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Whether the lifecycle allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        match (*self, next) {
            (from, _) if from.is_terminal() => false,
            (_, Failed) => true,
            (Queued, Downloading)
            | (Downloading, Processing)
            | (Processing, Uploading)
            | (Processing, Completed)
            | (Uploading, Completed) => true,
            _ => false,
        }
    }

    /// Progress reported on entering this status. `None` for `failed`, which keeps the
    /// progress the job had reached.
    pub fn entry_progress(&self) -> Option<u8> {
        match self {
            JobStatus::Queued => Some(0),
            JobStatus::Downloading => Some(5),
            JobStatus::Processing => Some(20),
            JobStatus::Uploading => Some(90),
            JobStatus::Completed => Some(100),
            JobStatus::Failed => None,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline stages reported while a job runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Downloading,
    Processing,
    Uploading,
}

impl Stage {
    pub fn status(&self) -> JobStatus {
        match self {
            Stage::Downloading => JobStatus::Downloading,
            Stage::Processing => JobStatus::Processing,
            Stage::Uploading => JobStatus::Uploading,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Stage::Downloading => "Fetching audio",
            Stage::Processing => "Transcribing audio",
            Stage::Uploading => "Uploading result",
        }
    }
}

/// A job as stored in the registry and returned by the status endpoint.
///
/// The summary fields (`segments_count`, `speakers_count`, ...) appear at the top
/// level once the job completes. The full result is kept for `GET /status/{id}/result`
/// but never included in the status payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Job {
    #[serde(rename = "job_id")]
    pub id: JobId,
    pub status: JobStatus,
    pub progress: u8,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub summary: Option<ResultSummary>,
    #[serde(skip)]
    pub result: Option<Arc<TranscriptionResult>>,
}

impl Job {
    pub fn queued(id: JobId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            status: JobStatus::Queued,
            progress: 0,
            message: "Job queued".to_string(),
            error: None,
            created_at: now,
            started_at: None,
            completed_at: None,
            failed_at: None,
            summary: None,
            result: None,
        }
    }

    /// When the job reached its terminal state.
    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        match self.status {
            JobStatus::Completed => self.completed_at,
            JobStatus::Failed => self.failed_at,
            _ => None,
        }
    }

    /// Apply `update`, enforcing the lifecycle. Nothing is modified on error.
    pub(crate) fn apply(&mut self, update: JobUpdate, now: DateTime<Utc>) -> Result<(), Rejection> {
        if self.status.is_terminal() {
            return Err(Rejection::Terminal(self.status));
        }

        let next = update.status.unwrap_or(self.status);
        if next != self.status && !self.status.can_transition_to(next) {
            return Err(Rejection::Transition {
                from: self.status,
                to: next,
            });
        }

        if next != self.status {
            match next {
                JobStatus::Downloading => {
                    self.started_at.get_or_insert(now);
                }
                JobStatus::Completed => self.completed_at = Some(now),
                JobStatus::Failed => self.failed_at = Some(now),
                _ => {}
            }
            if let Some(progress) = next.entry_progress() {
                self.progress = self.progress.max(progress);
            }
            self.status = next;
        }

        if let Some(progress) = update.progress {
            // 100 is reserved for completion
            let cap = if next == JobStatus::Completed { 100 } else { 99 };
            self.progress = self.progress.max(progress.min(cap));
        }
        if let Some(message) = update.message {
            self.message = message;
        }
        if next == JobStatus::Failed && update.error.is_some() {
            self.error = update.error;
        }
        if next == JobStatus::Completed {
            self.summary = update.summary;
            self.result = update.result;
        }

        Ok(())
    }
}

/// Why `Job::apply` refused an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Rejection {
    Terminal(JobStatus),
    Transition { from: JobStatus, to: JobStatus },
}

/// A change to a job, built with the constructors below.
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub progress: Option<u8>,
    pub message: Option<String>,
    pub error: Option<String>,
    pub summary: Option<ResultSummary>,
    pub result: Option<Arc<TranscriptionResult>>,
}

impl JobUpdate {
    pub fn stage(stage: Stage) -> Self {
        Self {
            status: Some(stage.status()),
            message: Some(stage.message().to_string()),
            ..Self::default()
        }
    }

    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::default()
        }
    }

    /// `result` is `None` when the result went to an upload destination instead.
    pub fn completed(summary: ResultSummary, result: Option<Arc<TranscriptionResult>>) -> Self {
        let message = if result.is_some() {
            format!("Transcription complete: {} segments", summary.segments_count)
        } else {
            format!(
                "Transcription complete: {} segments uploaded to result_url",
                summary.segments_count
            )
        };
        Self {
            status: Some(JobStatus::Completed),
            message: Some(message),
            summary: Some(summary),
            result,
            ..Self::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: Some(JobStatus::Failed),
            message: Some("Transcription failed".to_string()),
            error: Some(error.into()),
            ..Self::default()
        }
    }
}
