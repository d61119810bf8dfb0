//! # Scratch Assets
//!
//! Temporary resources held while one job runs, and the guarantees for releasing them.
//!
//! ## Lifecycle:
//! 1. **Created**: `ScratchFile::create_in` reserves a uniquely named file
//! 2. **Filled**: audio acquisition writes the payload into it
//! 3. **Released**: `release()` deletes it explicitly once the transcriber is done;
//!    if a step fails first, dropping the value deletes it instead
//!
//! `ReclaimGuard` pairs with this: it asks the transcriber to free its caches when
//! the job scope ends, however the scope ends.

use crate::error::{AppError, AppResult};
use crate::transcription::Transcriber;
use std::path::Path;
use std::sync::Arc;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// A uniquely named audio file that is deleted when released or dropped.
#[derive(Debug)]
pub struct ScratchFile {
    file: NamedTempFile,
    extension: &'static str,
    bytes_written: u64,
}

impl ScratchFile {
    /// Reserve a new scratch file in `dir` with the given extension (".mp3", ".wav", ...).
    ///
    /// Names are random, so concurrent jobs never collide.
    pub fn create_in(dir: &Path, extension: &'static str) -> AppResult<Self> {
        let file = tempfile::Builder::new()
            .prefix("audio-")
            .suffix(extension)
            .tempfile_in(dir)
            .map_err(|e| {
                AppError::Internal(format!(
                    "Failed to create scratch file in {}: {}",
                    dir.display(),
                    e
                ))
            })?;
        debug!(path = %file.path().display(), "Scratch file created");

        Ok(Self {
            file,
            extension,
            bytes_written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn extension(&self) -> &'static str {
        self.extension
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Async writer positioned at the start of the file.
    pub(crate) fn writer(&self) -> AppResult<tokio::fs::File> {
        let handle = self
            .file
            .as_file()
            .try_clone()
            .map_err(|e| AppError::Internal(format!("Failed to open scratch file: {}", e)))?;
        Ok(tokio::fs::File::from_std(handle))
    }

    pub(crate) fn record_written(&mut self, bytes: u64) {
        self.bytes_written += bytes;
    }

    /// Delete the file now, logging (not failing) if the filesystem refuses.
    pub fn release(self) {
        let path = self.file.path().to_path_buf();
        match self.file.close() {
            Ok(()) => debug!(path = %path.display(), "Scratch file removed"),
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove scratch file"),
        }
    }
}

/// Runs the transcriber's memory reclamation when dropped.
pub struct ReclaimGuard {
    transcriber: Arc<dyn Transcriber>,
}

impl ReclaimGuard {
    pub fn new(transcriber: Arc<dyn Transcriber>) -> Self {
        Self { transcriber }
    }
}

impl Drop for ReclaimGuard {
    fn drop(&mut self) {
        self.transcriber.reclaim_memory();
        debug!("Transcriber memory reclaimed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcription::testing::ScriptedTranscriber;

    #[test]
    fn test_scratch_names_are_unique() {
        let dir = tempfile::tempdir().unwrap();
        let a = ScratchFile::create_in(dir.path(), ".mp3").unwrap();
        let b = ScratchFile::create_in(dir.path(), ".mp3").unwrap();
        assert_ne!(a.path(), b.path());
        assert!(a.path().to_string_lossy().ends_with(".mp3"));
    }

    #[test]
    fn test_release_and_drop_both_delete() {
        let dir = tempfile::tempdir().unwrap();

        let released = ScratchFile::create_in(dir.path(), ".wav").unwrap();
        let released_path = released.path().to_path_buf();
        released.release();
        assert!(!released_path.exists());

        let dropped = ScratchFile::create_in(dir.path(), ".wav").unwrap();
        let dropped_path = dropped.path().to_path_buf();
        drop(dropped);
        assert!(!dropped_path.exists());
    }

    #[test]
    fn test_reclaim_guard_runs_on_drop() {
        let transcriber = Arc::new(ScriptedTranscriber::succeeding());
        {
            let _guard = ReclaimGuard::new(transcriber.clone());
            assert_eq!(transcriber.reclaim_count(), 0);
        }
        assert_eq!(transcriber.reclaim_count(), 1);
    }
}
