//! # Transcription Module
//!
//! The speech-to-text side of the service, seen from the job pipeline.
//!
//! ## Key Components:
//! - **Transcriber trait**: The capability the pipeline depends on (`transcriber`)
//! - **Results**: Enriched results and compact summaries (`result`)
//! - **WhisperX adapter**: The production transcriber, driving the `whisperx` CLI (`whisperx`)
//!
//! Everything model-specific (loading, alignment, diarization internals) lives behind
//! the trait; the rest of the crate only sees segments, a language and speaker labels.

pub mod result;
pub mod transcriber;
pub mod whisperx;

#[cfg(test)]
pub mod testing;

pub use result::{ResultSummary, TranscriptionResult};
pub use transcriber::{Transcriber, TranscriptionOptions};
pub use whisperx::WhisperxCli;
