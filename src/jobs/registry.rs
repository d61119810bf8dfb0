//! # Job Registry
//!
//! In-memory map of job records shared by the HTTP handlers and the background runner.
//!
//! ## Concurrency:
//! All access goes through one `RwLock`. Every operation takes the lock once, does its
//! work, and hands back an owned clone, so readers never observe a half-applied update
//! and no lock is ever held across an `.await`.
//!
//! ## Retention:
//! Finished jobs are evicted lazily: the status endpoint calls `evict_stale` before each
//! lookup. Jobs that are still running are never evicted.

use super::model::{Job, JobId, JobStatus, JobUpdate, Rejection};
use crate::error::AppError;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

/// Why an update was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    NotFound(JobId),
    /// The job already reached `completed` or `failed`
    Terminal { id: JobId, status: JobStatus },
    /// The lifecycle does not allow this move
    InvalidTransition { id: JobId, from: JobStatus, to: JobStatus },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::NotFound(id) => write!(f, "Job {} not found", id),
            RegistryError::Terminal { id, status } => {
                write!(f, "Job {} is already {}", id, status)
            }
            RegistryError::InvalidTransition { id, from, to } => {
                write!(f, "Job {} cannot move from {} to {}", id, from, to)
            }
        }
    }
}

impl std::error::Error for RegistryError {}

impl From<RegistryError> for AppError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound(_) => AppError::NotFound(err.to_string()),
            _ => AppError::Conflict(err.to_string()),
        }
    }
}

/// Job counts for health and debug endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct RegistrySummary {
    pub total: usize,
    pub by_status: BTreeMap<&'static str, usize>,
}

#[derive(Clone, Default)]
pub struct JobRegistry {
    jobs: Arc<RwLock<HashMap<JobId, Job>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic elsewhere must not take job tracking down with it; the map itself is
    // only ever mutated through `Job::apply`, which validates before writing.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<JobId, Job>> {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<JobId, Job>> {
        self.jobs.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new job in `queued` with a fresh id.
    pub fn create(&self) -> Job {
        let mut jobs = self.write();
        let mut id = JobId::new();
        while jobs.contains_key(&id) {
            id = JobId::new();
        }
        let job = Job::queued(id, Utc::now());
        jobs.insert(id, job.clone());
        info!(job_id = %id, "Job created");
        job
    }

    pub fn get(&self, id: JobId) -> Option<Job> {
        self.read().get(&id).cloned()
    }

    /// Apply an update atomically and return the new snapshot.
    pub fn update(&self, id: JobId, update: JobUpdate) -> Result<Job, RegistryError> {
        let mut jobs = self.write();
        let job = jobs.get_mut(&id).ok_or(RegistryError::NotFound(id))?;
        job.apply(update, Utc::now()).map_err(|rejection| match rejection {
            Rejection::Terminal(status) => RegistryError::Terminal { id, status },
            Rejection::Transition { from, to } => RegistryError::InvalidTransition { id, from, to },
        })?;
        debug!(job_id = %id, status = %job.status, progress = job.progress, "Job updated");
        Ok(job.clone())
    }

    /// Drop finished jobs older than `retention`. Returns how many were removed.
    pub fn evict_stale(&self, retention: Duration) -> usize {
        self.evict_stale_as_of(Utc::now(), retention)
    }

    pub fn evict_stale_as_of(&self, now: DateTime<Utc>, retention: Duration) -> usize {
        let mut jobs = self.write();
        let before = jobs.len();
        jobs.retain(|_, job| match job.finished_at() {
            Some(finished) => now.signed_duration_since(finished) <= retention,
            None => true,
        });
        let evicted = before - jobs.len();
        if evicted > 0 {
            info!(evicted, remaining = jobs.len(), "Evicted finished jobs");
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn summary(&self) -> RegistrySummary {
        let jobs = self.read();
        let mut by_status: BTreeMap<&'static str, usize> =
            JobStatus::ALL.iter().map(|status| (status.as_str(), 0)).collect();
        for job in jobs.values() {
            *by_status.entry(job.status.as_str()).or_default() += 1;
        }
        RegistrySummary {
            total: jobs.len(),
            by_status,
        }
    }

    /// All jobs, newest first.
    pub fn snapshot(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.read().values().cloned().collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::model::Stage;
    use crate::transcription::ResultSummary;
    use std::collections::HashSet;
    use std::thread;

    fn summary() -> ResultSummary {
        ResultSummary {
            segments_count: 1,
            speakers_count: 0,
            duration_seconds: 1.0,
            processing_time_seconds: 0.5,
        }
    }

    fn complete(registry: &JobRegistry, id: JobId) -> Job {
        registry.update(id, JobUpdate::stage(Stage::Downloading)).unwrap();
        registry.update(id, JobUpdate::stage(Stage::Processing)).unwrap();
        registry.update(id, JobUpdate::completed(summary(), None)).unwrap()
    }

    #[test]
    fn test_create_and_get() {
        let registry = JobRegistry::new();
        let job = registry.create();
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(registry.get(job.id), Some(job));
        assert_eq!(registry.get(JobId::new()), None);
    }

    #[test]
    fn test_concurrent_creates_yield_unique_ids() {
        let registry = JobRegistry::new();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                thread::spawn(move || (0..100).map(|_| registry.create().id).collect::<Vec<_>>())
            })
            .collect();

        let ids: HashSet<JobId> = handles
            .into_iter()
            .flat_map(|handle| handle.join().unwrap())
            .collect();
        assert_eq!(ids.len(), 800);
        assert_eq!(registry.len(), 800);
    }

    #[test]
    fn test_concurrent_updates_on_distinct_jobs() {
        let registry = JobRegistry::new();
        let ids: Vec<JobId> = (0..16).map(|_| registry.create().id).collect();

        let handles: Vec<_> = ids
            .iter()
            .map(|&id| {
                let registry = registry.clone();
                thread::spawn(move || complete(&registry, id))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        for id in ids {
            let job = registry.get(id).unwrap();
            assert_eq!(job.status, JobStatus::Completed);
            assert_eq!(job.progress, 100);
        }
        assert_eq!(registry.summary().by_status["completed"], 16);
    }

    #[test]
    fn test_update_errors() {
        let registry = JobRegistry::new();
        let missing = JobId::new();
        assert_eq!(
            registry.update(missing, JobUpdate::message("hi")),
            Err(RegistryError::NotFound(missing))
        );

        let id = registry.create().id;
        assert!(matches!(
            registry.update(id, JobUpdate::stage(Stage::Processing)),
            Err(RegistryError::InvalidTransition { .. })
        ));

        complete(&registry, id);
        let err = registry.update(id, JobUpdate::failed("late")).unwrap_err();
        assert!(matches!(err, RegistryError::Terminal { status: JobStatus::Completed, .. }));
        assert!(matches!(AppError::from(err), AppError::Conflict(_)));
    }

    #[test]
    fn test_reads_are_stable_after_completion() {
        let registry = JobRegistry::new();
        let id = registry.create().id;
        let done = complete(&registry, id);

        let first = registry.get(id).unwrap();
        let second = registry.get(id).unwrap();
        assert_eq!(first, done);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn test_eviction_only_removes_old_finished_jobs() {
        let registry = JobRegistry::new();
        let running = registry.create().id;
        registry.update(running, JobUpdate::stage(Stage::Downloading)).unwrap();
        let completed = registry.create().id;
        complete(&registry, completed);
        let failed = registry.create().id;
        registry.update(failed, JobUpdate::failed("boom")).unwrap();

        let retention = Duration::seconds(3600);
        assert_eq!(registry.evict_stale(retention), 0);
        assert_eq!(registry.len(), 3);

        let later = Utc::now() + Duration::seconds(3601);
        assert_eq!(registry.evict_stale_as_of(later, retention), 2);
        assert!(registry.get(running).is_some());
        assert!(registry.get(completed).is_none());
        assert!(registry.get(failed).is_none());
    }

    #[test]
    fn test_summary_counts_every_status() {
        let registry = JobRegistry::new();
        registry.create();
        let summary = registry.summary();
        assert_eq!(summary.total, 1);
        assert_eq!(summary.by_status.len(), 6);
        assert_eq!(summary.by_status["queued"], 1);
        assert_eq!(summary.by_status["failed"], 0);
    }
}
