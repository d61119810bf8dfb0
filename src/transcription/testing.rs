//! In-memory transcriber used by tests across the crate.

use super::transcriber::{Segment, Transcriber, Transcript, TranscriptionOptions};
use crate::error::AppError;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub enum Script {
    Succeed,
    Fail(String),
    Panic,
}

/// Returns a fixed transcript (or failure) and records what it was asked to do.
pub struct ScriptedTranscriber {
    script: Script,
    delay: Duration,
    diarization: bool,
    pub calls: AtomicUsize,
    pub reclaims: AtomicUsize,
    /// Path and on-disk contents observed by each call
    pub seen: Mutex<Vec<(PathBuf, Vec<u8>)>>,
    pub last_options: Mutex<Option<TranscriptionOptions>>,
}

impl ScriptedTranscriber {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            delay: Duration::ZERO,
            diarization: true,
            calls: AtomicUsize::new(0),
            reclaims: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
            last_options: Mutex::new(None),
        }
    }

    pub fn succeeding() -> Self {
        Self::new(Script::Succeed)
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn without_diarization(mut self) -> Self {
        self.diarization = false;
        self
    }

    pub fn reclaim_count(&self) -> usize {
        self.reclaims.load(Ordering::SeqCst)
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

pub fn sample_segments() -> Vec<Segment> {
    vec![
        Segment {
            start: 0.0,
            end: 2.5,
            text: "Good morning everyone.".to_string(),
            speaker: Some("SPEAKER_01".to_string()),
            words: Vec::new(),
        },
        Segment {
            start: 2.5,
            end: 7.25,
            text: "Let's get started.".to_string(),
            speaker: Some("SPEAKER_00".to_string()),
            words: Vec::new(),
        },
        Segment {
            start: 7.25,
            end: 9.0,
            text: "Sounds good.".to_string(),
            speaker: Some("SPEAKER_01".to_string()),
            words: Vec::new(),
        },
    ]
}

impl Transcriber for ScriptedTranscriber {
    fn model_name(&self) -> &str {
        "scripted"
    }

    fn device(&self) -> &str {
        "cpu"
    }

    fn diarization_ready(&self) -> bool {
        self.diarization
    }

    fn transcribe(
        &self,
        audio_path: &Path,
        options: &TranscriptionOptions,
    ) -> Result<Transcript, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let contents = std::fs::read(audio_path).unwrap_or_default();
        self.seen.lock().unwrap().push((audio_path.to_path_buf(), contents));
        *self.last_options.lock().unwrap() = Some(options.clone());

        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }

        match &self.script {
            Script::Succeed => Ok(Transcript {
                segments: sample_segments(),
                language: options.language.clone().unwrap_or_else(|| "en".to_string()),
                diarized: options.diarize && self.diarization,
            }),
            Script::Fail(message) => Err(AppError::Transcription(message.clone())),
            Script::Panic => panic!("scripted transcriber panic"),
        }
    }

    fn reclaim_memory(&self) {
        self.reclaims.fetch_add(1, Ordering::SeqCst);
    }
}
