//! The `Transcriber` capability and the data it exchanges with the rest of the service.
//!
//! A transcriber is loaded once at start-up and shared by every job. Calls are
//! blocking (they keep a GPU busy for minutes), so callers run them on the blocking
//! thread pool.

use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Per-request options forwarded to the transcriber.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TranscriptionOptions {
    /// ISO 639-1 language code, `None` for auto-detection
    pub language: Option<String>,
    /// Whether speaker labels should be assigned (if the transcriber can)
    pub diarize: bool,
    pub min_speakers: Option<u32>,
    pub max_speakers: Option<u32>,
}

/// One word with its alignment and, after diarization, its speaker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Word {
    pub word: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
}

/// A timed span of transcribed text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start: f64,
    pub end: f64,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub words: Vec<Word>,
}

/// Raw output of one transcription call.
#[derive(Debug, Clone, PartialEq)]
pub struct Transcript {
    pub segments: Vec<Segment>,
    /// Detected or requested language
    pub language: String,
    /// True when the diarization stage actually ran on this audio
    pub diarized: bool,
}

/// Speech-to-text (and optionally diarization) backend.
///
/// ## Contract:
/// - `transcribe` either returns segments or fails with `AppError::Transcription`.
/// - Implementations must be safe to call from several threads at once; whether they
///   run calls in parallel or serialize them internally is their business.
/// - `reclaim_memory` is called once after every job, on success and on failure.
pub trait Transcriber: Send + Sync {
    fn model_name(&self) -> &str;

    fn device(&self) -> &str;

    /// Whether the diarization stage is loaded and usable, not merely switched on.
    fn diarization_ready(&self) -> bool;

    fn transcribe(
        &self,
        audio_path: &Path,
        options: &TranscriptionOptions,
    ) -> Result<Transcript, AppError>;

    /// Release caches held between calls (accelerator memory, scratch output).
    fn reclaim_memory(&self) {}
}
