//! # Configuration Management
//!
//! This module handles loading and managing application configuration from multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP_ prefix, nested keys separated by `__`)
//! - Legacy environment variables used by the WhisperX deployment images
//!   (`WHISPER_MODEL`, `HF_TOKEN`, `ENABLE_DIARIZATION`, ...)
//! - Default values (built into the code)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Platform/legacy variables (PORT, HOST, WHISPER_MODEL, HF_TOKEN, ...)
//! 2. Environment variables (APP_SERVER__PORT, APP_JOBS__RETENTION_SECONDS, ...)
//! 3. Configuration file (config.toml)
//! 4. Default values (defined in the Default impl)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration that contains all settings.
///
/// ## Why separate config structs:
/// Each group maps to one concern of the service: where we listen, how the
/// transcriber is launched, how long finished jobs are kept, how patient we are with
/// remote servers, and where scratch audio is written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub transcriber: TranscriberConfig,
    pub jobs: JobsConfig,
    pub network: NetworkConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

/// Server-specific configuration settings.
///
/// ## Common values:
/// - `host = "0.0.0.0"`: Accept connections from any IP address (pods, containers)
/// - `port = 8000`: Port exposed by the pod image
/// - `max_request_mb`: Ceiling for JSON bodies, which carry base64 audio
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_request_mb: usize,
}

/// How the WhisperX transcriber is launched.
///
/// ## Fields:
/// - `binary`: Executable to run (looked up on PATH when not absolute)
/// - `model`: Whisper model name ("tiny", "base", "small", "medium", "large-v3")
/// - `compute_type`: Precision passed to faster-whisper ("float16", "int8")
/// - `batch_size`: Inference batch size
/// - `device`: "cuda" or "cpu"
/// - `hf_token`: HuggingFace token required by the diarization pipeline
/// - `enable_diarization`: Master switch; requests cannot turn diarization on when this is off
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriberConfig {
    pub binary: String,
    pub model: String,
    pub compute_type: String,
    pub batch_size: usize,
    pub device: String,
    pub hf_token: Option<String>,
    pub enable_diarization: bool,
}

/// Job lifecycle settings.
///
/// ## Fields:
/// - `retention_seconds`: How long a finished job stays visible to status polling
/// - `max_concurrent_jobs`: Number of jobs allowed to run the pipeline at once.
///   Jobs beyond this limit wait in `queued`. One per accelerator is the safe value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    pub retention_seconds: u64,
    pub max_concurrent_jobs: usize,
}

/// Timeouts for calls to remote servers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub download_timeout_seconds: u64,
    pub upload_timeout_seconds: u64,
}

/// Where scratch audio files are written. `None` means the OS temp directory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    pub temp_dir: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8000,
                max_request_mb: 200,
            },
            transcriber: TranscriberConfig {
                binary: "whisperx".to_string(),
                model: "small".to_string(),
                compute_type: "float16".to_string(),
                batch_size: 16,
                device: "cuda".to_string(),
                hf_token: None,
                enable_diarization: true,
            },
            jobs: JobsConfig {
                retention_seconds: 3600,  // finished jobs stay pollable for an hour
                max_concurrent_jobs: 1,   // one GPU, one job
            },
            network: NetworkConfig {
                download_timeout_seconds: 600,  // large audio files
                upload_timeout_seconds: 300,
            },
            storage: StorageConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER__PORT=3000`: Override server port
    /// - `APP_JOBS__MAX_CONCURRENT_JOBS=2`: Allow two jobs at once
    /// - `WHISPER_MODEL=large-v3`: Legacy model override
    /// - `HF_TOKEN=hf_xxx`: Token for the diarization pipeline
    /// - `PORT=3000`: Special case for deployment platforms
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        // Variables understood by the deployment images; they don't follow the APP_ convention
        let legacy = [
            ("HOST", "server.host"),
            ("PORT", "server.port"),
            ("WHISPER_MODEL", "transcriber.model"),
            ("WHISPER_COMPUTE_TYPE", "transcriber.compute_type"),
            ("WHISPER_BATCH_SIZE", "transcriber.batch_size"),
            ("WHISPER_DEVICE", "transcriber.device"),
            ("WHISPERX_BIN", "transcriber.binary"),
            ("HF_TOKEN", "transcriber.hf_token"),
            ("LOG_LEVEL", "logging.level"),
        ];
        for (var, key) in legacy {
            if let Ok(value) = env::var(var) {
                settings = settings.set_override(key, value)?;
            }
        }

        if let Ok(flag) = env::var("ENABLE_DIARIZATION") {
            settings = settings
                .set_override("transcriber.enable_diarization", flag.eq_ignore_ascii_case("true"))?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.server.max_request_mb == 0 {
            return Err(anyhow::anyhow!("Max request size must be greater than 0"));
        }

        if self.transcriber.binary.trim().is_empty() {
            return Err(anyhow::anyhow!("Transcriber binary cannot be empty"));
        }

        if self.transcriber.batch_size == 0 {
            return Err(anyhow::anyhow!("Transcriber batch size must be greater than 0"));
        }

        if self.jobs.max_concurrent_jobs == 0 {
            return Err(anyhow::anyhow!("Max concurrent jobs must be greater than 0"));
        }

        if self.network.download_timeout_seconds == 0 || self.network.upload_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("Network timeouts must be greater than 0"));
        }

        Ok(())
    }

    pub fn max_request_bytes(&self) -> usize {
        self.server.max_request_mb.saturating_mul(1024 * 1024)
    }

    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.jobs.retention_seconds.min(i64::MAX as u64) as i64)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.network.download_timeout_seconds)
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.network.upload_timeout_seconds)
    }

    /// Directory for scratch audio files.
    pub fn temp_dir(&self) -> PathBuf {
        match &self.storage.temp_dir {
            Some(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
            _ => env::temp_dir(),
        }
    }

    /// Configuration as JSON with secrets masked, for introspection endpoints.
    pub fn redacted(&self) -> serde_json::Value {
        let mut copy = self.clone();
        if copy.transcriber.hf_token.is_some() {
            copy.transcriber.hf_token = Some("***".to_string());
        }
        serde_json::to_value(copy).unwrap_or_default()
    }
}
