//! # WhisperX CLI Transcriber
//!
//! Runs the `whisperx` command-line tool as a child process and reads back the JSON
//! transcript it writes. The Python side does the heavy lifting: faster-whisper
//! transcription, wav2vec2 alignment and pyannote diarization.
//!
//! ## Diarization availability:
//! Diarization needs three things: the feature switched on, a HuggingFace token for
//! the pyannote models, and a working binary. If any is missing we still
//! transcribe, just without speaker labels.
//!
//! ## Memory:
//! Model weights live in the child process, so the process exit is what frees
//! accelerator memory after each job.
//!
//! ## Scratch output:
//! Every call gets its own output directory (a `TempDir`), removed when the call
//! returns, whatever the outcome.

use super::transcriber::{Segment, Transcriber, Transcript, TranscriptionOptions};
use crate::config::TranscriberConfig;
use crate::error::AppError;
use serde::Deserialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info, warn};

/// Lines of stderr kept when the tool fails.
const STDERR_TAIL_LINES: usize = 20;

/// Shape of the JSON file written by `whisperx --output_format json`.
#[derive(Debug, Deserialize)]
struct WhisperxOutput {
    #[serde(default)]
    segments: Vec<Segment>,
    #[serde(default)]
    language: Option<String>,
}

/// `Transcriber` backed by one `whisperx` process per call.
///
/// Models are loaded by the child process and live exactly as long as it does, so
/// accelerator memory is returned to the system when each call's process exits. The
/// trait's `reclaim_memory` therefore has nothing left to release here. What persists
/// across calls is the probed binary, the resolved settings and the HuggingFace model
/// cache on disk, which keeps the per-call load a warm-cache read rather than a download.
pub struct WhisperxCli {
    config: TranscriberConfig,
    scratch_root: PathBuf,
    diarization: bool,
    version: Option<String>,
}

impl WhisperxCli {
    /// Check that the binary runs and work out which features are usable.
    ///
    /// Fails when the executable cannot be started at all: a pod without its
    /// transcriber should not report itself as ready.
    pub fn initialize(config: TranscriberConfig, scratch_root: PathBuf) -> anyhow::Result<Self> {
        info!(
            binary = %config.binary,
            model = %config.model,
            compute_type = %config.compute_type,
            batch_size = config.batch_size,
            "Initializing WhisperX transcriber"
        );

        let probe = Command::new(&config.binary)
            .arg("--help")
            .output()
            .map_err(|e| anyhow::anyhow!("Failed to run '{}': {}", config.binary, e))?;
        if !probe.status.success() {
            return Err(anyhow::anyhow!(
                "'{} --help' exited with {}",
                config.binary,
                probe.status
            ));
        }
        let version = String::from_utf8_lossy(&probe.stdout)
            .lines()
            .next()
            .map(|line| line.trim().to_string())
            .filter(|line| !line.is_empty());

        if config.device == "cpu" {
            warn!("Running on CPU - performance will be significantly slower");
        }

        let diarization = match (config.enable_diarization, config.hf_token.is_some()) {
            (true, true) => true,
            (true, false) => {
                warn!("Diarization enabled but HF_TOKEN not provided - diarization will be skipped");
                false
            }
            (false, _) => false,
        };
        info!(diarization, "WhisperX transcriber ready");

        Ok(Self {
            config,
            scratch_root,
            diarization,
            version,
        })
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Command-line arguments for one call.
    fn build_args(
        &self,
        audio_path: &Path,
        output_dir: &Path,
        options: &TranscriptionOptions,
        diarize: bool,
    ) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            audio_path.as_os_str().to_owned(),
            "--model".into(),
            self.config.model.clone().into(),
            "--compute_type".into(),
            self.config.compute_type.clone().into(),
            "--batch_size".into(),
            self.config.batch_size.to_string().into(),
            "--device".into(),
            self.config.device.clone().into(),
            "--output_format".into(),
            "json".into(),
            "--output_dir".into(),
            output_dir.as_os_str().to_owned(),
        ];

        if let Some(language) = &options.language {
            args.push("--language".into());
            args.push(language.clone().into());
        }

        if diarize {
            args.push("--diarize".into());
            if let Some(token) = &self.config.hf_token {
                args.push("--hf_token".into());
                args.push(token.clone().into());
            }
            if let Some(min) = options.min_speakers {
                args.push("--min_speakers".into());
                args.push(min.to_string().into());
            }
            if let Some(max) = options.max_speakers {
                args.push("--max_speakers".into());
                args.push(max.to_string().into());
            }
        }

        args
    }
}

impl Transcriber for WhisperxCli {
    fn model_name(&self) -> &str {
        &self.config.model
    }

    fn device(&self) -> &str {
        &self.config.device
    }

    fn diarization_ready(&self) -> bool {
        self.diarization
    }

    fn transcribe(
        &self,
        audio_path: &Path,
        options: &TranscriptionOptions,
    ) -> Result<Transcript, AppError> {
        let diarize = options.diarize && self.diarization;
        if options.diarize && !diarize {
            info!("Diarization requested but not available (missing HF_TOKEN or disabled)");
        }

        let output_dir = tempfile::Builder::new()
            .prefix("whisperx-out-")
            .tempdir_in(&self.scratch_root)
            .map_err(|e| AppError::Internal(format!("Failed to create output directory: {}", e)))?;

        let args = self.build_args(audio_path, output_dir.path(), options, diarize);
        debug!(audio = %audio_path.display(), diarize, "Running whisperx");

        let output = Command::new(&self.config.binary)
            .args(&args)
            .output()
            .map_err(|e| AppError::Transcription(format!("Failed to run whisperx: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let lines: Vec<&str> = stderr.lines().collect();
            let tail = lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..].join("\n");
            return Err(AppError::Transcription(format!(
                "whisperx exited with {}: {}",
                output.status, tail
            )));
        }

        let stem = audio_path
            .file_stem()
            .ok_or_else(|| AppError::Internal("Audio path has no file name".to_string()))?;
        let json_path = output_dir.path().join(stem).with_extension("json");
        let raw = std::fs::read_to_string(&json_path).map_err(|e| {
            AppError::Transcription(format!(
                "whisperx produced no transcript at {}: {}",
                json_path.display(),
                e
            ))
        })?;
        let parsed: WhisperxOutput = serde_json::from_str(&raw)
            .map_err(|e| AppError::Transcription(format!("Unreadable whisperx output: {}", e)))?;

        let language = parsed
            .language
            .or_else(|| options.language.clone())
            .unwrap_or_else(|| "unknown".to_string());

        Ok(Transcript {
            segments: parsed.segments,
            language,
            diarized: diarize,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(hf_token: Option<&str>) -> WhisperxCli {
        let config = TranscriberConfig {
            hf_token: hf_token.map(str::to_string),
            ..crate::config::AppConfig::default().transcriber
        };
        WhisperxCli {
            diarization: config.enable_diarization && config.hf_token.is_some(),
            config,
            scratch_root: std::env::temp_dir(),
            version: None,
        }
    }

    fn args_of(cli: &WhisperxCli, options: &TranscriptionOptions, diarize: bool) -> Vec<String> {
        cli.build_args(Path::new("/tmp/in.mp3"), Path::new("/tmp/out"), options, diarize)
            .into_iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_args_without_diarization() {
        let cli = cli(None);
        let options = TranscriptionOptions {
            language: Some("de".to_string()),
            diarize: true,
            min_speakers: Some(2),
            max_speakers: None,
        };
        let args = args_of(&cli, &options, false);

        assert_eq!(args[0], "/tmp/in.mp3");
        assert!(args.windows(2).any(|w| w == ["--language", "de"]));
        assert!(args.windows(2).any(|w| w == ["--output_format", "json"]));
        assert!(!args.contains(&"--diarize".to_string()));
        assert!(!args.contains(&"--min_speakers".to_string()));
    }

    #[test]
    fn test_args_with_diarization_hints() {
        let cli = cli(Some("hf_abc"));
        assert!(cli.diarization_ready());
        let options = TranscriptionOptions {
            language: None,
            diarize: true,
            min_speakers: Some(1),
            max_speakers: Some(4),
        };
        let args = args_of(&cli, &options, true);

        assert!(args.contains(&"--diarize".to_string()));
        assert!(args.windows(2).any(|w| w == ["--hf_token", "hf_abc"]));
        assert!(args.windows(2).any(|w| w == ["--min_speakers", "1"]));
        assert!(args.windows(2).any(|w| w == ["--max_speakers", "4"]));
        assert!(!args.contains(&"--language".to_string()));
    }

    #[test]
    fn test_diarization_not_ready_without_token() {
        assert!(!cli(None).diarization_ready());
    }

    #[test]
    fn test_parse_whisperx_output() {
        let raw = r#"{
            "segments": [
                {"start": 0.0, "end": 1.5, "text": " Hello", "speaker": "SPEAKER_00",
                 "words": [{"word": "Hello", "start": 0.1, "end": 0.6, "score": 0.93, "speaker": "SPEAKER_00"}]},
                {"start": 1.5, "end": 2.0, "text": " there"}
            ],
            "word_segments": [],
            "language": "en"
        }"#;
        let parsed: WhisperxOutput = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.segments.len(), 2);
        assert_eq!(parsed.language.as_deref(), Some("en"));
        assert_eq!(parsed.segments[0].words[0].speaker.as_deref(), Some("SPEAKER_00"));
        assert!(parsed.segments[1].words.is_empty());
    }
}
