//! # Audio Acquisition
//!
//! Turns the audio named by a request into a local scratch file the transcriber can read.
//!
//! ## Supported Sources:
//! - **Inline base64**: decoded and written verbatim (a `data:` URI prefix is tolerated)
//! - **Remote URL**: streamed to disk chunk by chunk, never buffered whole in memory
//! - **Uploaded bytes**: multipart uploads already read by the HTTP layer
//!
//! ## File Extensions:
//! The transcriber's decoder sniffs formats poorly from content alone, so the scratch file
//! carries a meaningful extension. For URLs it is inferred from the path with the
//! query string removed (`...file.mp3?sig=abc123` → `.mp3`); anything unrecognised
//! falls back to `.wav`.
//!
//! ## Cleanup Contract:
//! On success the caller owns the returned `ScratchFile` and must release it. On failure
//! the partially written file is dropped (and deleted) before the error is returned,
//! so nothing is left behind that the caller does not know about.

use super::scratch::ScratchFile;
use crate::error::{AppError, AppResult};
use crate::redact::{redact_url, truncate_for_log};
use base64::{engine::general_purpose, Engine as _};
use futures_util::StreamExt;
use reqwest::Url;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::info;

/// Extensions we recognise, checked against the end of the URL path.
pub const SUPPORTED_EXTENSIONS: [&str; 7] =
    [".mp3", ".wav", ".m4a", ".flac", ".ogg", ".opus", ".webm"];

pub const DEFAULT_EXTENSION: &str = ".wav";

/// Where a job's audio comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum AudioSource {
    Base64(String),
    Url(Url),
    Bytes { data: Vec<u8>, extension: &'static str },
}

impl AudioSource {
    /// Extension to give the scratch file.
    pub fn extension(&self) -> &'static str {
        match self {
            AudioSource::Base64(_) => DEFAULT_EXTENSION,
            AudioSource::Url(url) => extension_from_url(url.as_str()),
            AudioSource::Bytes { extension, .. } => extension,
        }
    }

    /// Short description that is safe to log.
    pub fn describe(&self) -> String {
        match self {
            AudioSource::Base64(payload) => format!("base64 ({} chars)", payload.len()),
            AudioSource::Url(url) => redact_url(url.as_str()),
            AudioSource::Bytes { data, .. } => format!("upload ({} bytes)", data.len()),
        }
    }
}

/// Infer the audio extension from a URL, ignoring its query string and fragment.
pub fn extension_from_url(url: &str) -> &'static str {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    extension_from_filename(&url[..end])
}

/// Infer the audio extension from a file name or path.
pub fn extension_from_filename(name: &str) -> &'static str {
    let lower = name.to_ascii_lowercase();
    SUPPORTED_EXTENSIONS
        .iter()
        .find(|ext| lower.ends_with(*ext))
        .copied()
        .unwrap_or(DEFAULT_EXTENSION)
}

/// Decode inline audio, accepting either raw base64 or a `data:<mime>;base64,` URI.
pub fn decode_base64_audio(payload: &str) -> AppResult<Vec<u8>> {
    let trimmed = payload.trim();
    let encoded = match trimmed.strip_prefix("data:") {
        Some(rest) => rest
            .split_once(',')
            .map(|(_, data)| data)
            .ok_or_else(|| AppError::Decode("Malformed data URI".to_string()))?,
        None => trimmed,
    };

    general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| AppError::Decode(format!("Invalid base64 audio: {}", e)))
}

/// Fetches audio into scratch files.
#[derive(Clone)]
pub struct AudioFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl AudioFetcher {
    pub fn new(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Materialize `source` as a new scratch file in `scratch_dir`.
    pub async fn acquire(&self, source: &AudioSource, scratch_dir: &Path) -> AppResult<ScratchFile> {
        let mut scratch = ScratchFile::create_in(scratch_dir, source.extension())?;

        match source {
            AudioSource::Base64(payload) => {
                info!(payload = %truncate_for_log(payload), "Decoding base64 audio");
                let bytes = decode_base64_audio(payload)?;
                write_chunk(&mut scratch, &bytes).await?;
            }
            AudioSource::Url(url) => {
                info!(url = %redact_url(url.as_str()), "Downloading audio");
                self.download(url, &mut scratch).await?;
            }
            AudioSource::Bytes { data, .. } => {
                write_chunk(&mut scratch, data).await?;
            }
        }

        info!(
            path = %scratch.path().display(),
            extension = scratch.extension(),
            bytes = scratch.bytes_written(),
            "Audio ready"
        );
        Ok(scratch)
    }

    async fn download(&self, url: &Url, scratch: &mut ScratchFile) -> AppResult<()> {
        let response = self
            .client
            .get(url.clone())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| AppError::Download(describe_transport_error(e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Download(format!("HTTP {}", status)));
        }

        let mut writer = scratch.writer()?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| AppError::Download(describe_transport_error(e)))?;
            writer.write_all(&chunk).await.map_err(write_error)?;
            written += chunk.len() as u64;
        }
        writer.flush().await.map_err(write_error)?;
        scratch.record_written(written);

        Ok(())
    }
}

async fn write_chunk(scratch: &mut ScratchFile, bytes: &[u8]) -> AppResult<()> {
    let mut writer = scratch.writer()?;
    writer.write_all(bytes).await.map_err(write_error)?;
    writer.flush().await.map_err(write_error)?;
    scratch.record_written(bytes.len() as u64);
    Ok(())
}

fn write_error(err: std::io::Error) -> AppError {
    AppError::Internal(format!("Failed to write scratch audio: {}", err))
}

/// reqwest errors embed the full URL, signature included; strip it.
pub(crate) fn describe_transport_error(err: reqwest::Error) -> String {
    let kind = if err.is_timeout() {
        "timed out"
    } else if err.is_connect() {
        "connection failed"
    } else {
        "request failed"
    };
    format!("{}: {}", kind, err.without_url())
}
