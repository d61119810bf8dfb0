//! # Transcription Pipeline
//!
//! The single code path that turns a validated request into a delivered result. Both
//! the synchronous endpoints and the background job runner go through it.
//!
//! ## Steps:
//! 1. **Acquire** the audio into a scratch file (`Stage::Downloading`)
//! 2. **Transcribe** on the blocking thread pool (`Stage::Processing`)
//! 3. **Release** the scratch file as soon as the transcriber is done with it
//! 4. **Deliver** inline or to the upload destination (`Stage::Uploading` when uploading)
//!
//! ## Admission:
//! The transcriber owns an accelerator that only fits so many jobs. `admit()` hands out
//! one of `jobs.max_concurrent_jobs` slots; callers hold the permit for the whole run.
//! Request handlers go through `run_admitted`, which moves the permit and the job onto
//! their own task: a client that disconnects detaches from the run instead of
//! cancelling it halfway through a blocking transcription.
//!
//! ## Cleanup:
//! A `ReclaimGuard` spans the run, so the transcriber frees its caches whether the
//! pipeline succeeds, fails or panics. The scratch file is deleted on every path.

use crate::audio::{AudioFetcher, ReclaimGuard, ScratchFile};
use crate::config::AppConfig;
use crate::delivery::{Delivery, ResultUploader};
use crate::error::{AppError, AppResult};
use crate::jobs::Stage;
use crate::redact::format_duration;
use crate::request::TranscriptionJob;
use crate::transcription::{Transcriber, TranscriptionOptions, TranscriptionResult};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info};

pub struct Pipeline {
    transcriber: Arc<dyn Transcriber>,
    fetcher: AudioFetcher,
    uploader: ResultUploader,
    scratch_dir: PathBuf,
    slots: Arc<Semaphore>,
    capacity: usize,
}

impl Pipeline {
    pub fn new(transcriber: Arc<dyn Transcriber>, client: reqwest::Client, config: &AppConfig) -> Self {
        let capacity = config.jobs.max_concurrent_jobs.max(1);
        Self {
            transcriber,
            fetcher: AudioFetcher::new(client.clone(), config.download_timeout()),
            uploader: ResultUploader::new(client, config.upload_timeout()),
            scratch_dir: config.temp_dir(),
            slots: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn transcriber(&self) -> &Arc<dyn Transcriber> {
        &self.transcriber
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }

    /// Take a slot without waiting, if one is free.
    pub fn try_admit(&self) -> Option<OwnedSemaphorePermit> {
        self.slots.clone().try_acquire_owned().ok()
    }

    /// Wait for a free slot.
    pub async fn admit(&self) -> AppResult<OwnedSemaphorePermit> {
        self.slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| AppError::Internal("Transcription slots are closed".to_string()))
    }

    /// Run `job` to completion on a separate task that owns `permit`.
    ///
    /// The slot, the scratch file and memory reclamation are released only when the
    /// pipeline itself finishes, even if the caller stops waiting.
    pub async fn run_admitted(
        self: Arc<Self>,
        permit: OwnedSemaphorePermit,
        job: TranscriptionJob,
    ) -> AppResult<Delivery> {
        let task = tokio::spawn(async move {
            let _permit = permit;
            self.execute(&job, |stage| debug!(stage = ?stage, "Synchronous stage"))
                .await
        });
        task.await
            .map_err(|e| AppError::Internal(format!("Transcription task failed: {}", e)))?
    }

    /// Run one job. `on_stage` is called as each stage begins.
    pub async fn execute<F>(&self, job: &TranscriptionJob, on_stage: F) -> AppResult<Delivery>
    where
        F: Fn(Stage) + Send + Sync,
    {
        let _reclaim = ReclaimGuard::new(self.transcriber.clone());
        let started = Instant::now();

        on_stage(Stage::Downloading);
        let scratch = self.fetcher.acquire(&job.source, &self.scratch_dir).await?;

        on_stage(Stage::Processing);
        let transcribed = self.transcribe(&scratch, &job.options).await;
        scratch.release();
        let result = transcribed?;

        if job.result_url.is_some() {
            on_stage(Stage::Uploading);
        }
        let delivery = self.uploader.deliver(result, job.result_url.as_ref()).await?;

        info!(
            segments = delivery.summary().segments_count,
            total = %format_duration(started.elapsed().as_secs_f64()),
            uploaded = matches!(delivery, Delivery::Uploaded(_)),
            "Pipeline finished"
        );
        Ok(delivery)
    }

    async fn transcribe(
        &self,
        scratch: &ScratchFile,
        options: &TranscriptionOptions,
    ) -> AppResult<TranscriptionResult> {
        let transcriber = self.transcriber.clone();
        let path = scratch.path().to_path_buf();
        let options = options.clone();
        let started = Instant::now();

        info!(
            model = transcriber.model_name(),
            language = options.language.as_deref().unwrap_or("auto"),
            diarize = options.diarize,
            "Transcribing"
        );

        // The transcriber blocks for minutes; keep it off the async workers
        let transcript = tokio::task::spawn_blocking(move || transcriber.transcribe(&path, &options))
            .await
            .map_err(|e| AppError::Transcription(format!("Transcriber task failed: {}", e)))??;

        let result = TranscriptionResult::from_transcript(transcript, started.elapsed());
        info!(
            segments = result.segments.len(),
            language = %result.language,
            speakers = result.speakers.as_ref().map(Vec::len).unwrap_or(0),
            took = %format_duration(result.processing_time_seconds),
            "Transcription finished"
        );
        Ok(result)
    }
}
