//! Submission contract: the JSON body clients send, and its validated form.

use crate::audio::AudioSource;
use crate::error::{AppError, AppResult};
use crate::transcription::TranscriptionOptions;
use reqwest::Url;
use serde::Deserialize;

fn default_true() -> bool {
    true
}

/// Body of `POST /transcribe` (and the `input` of a serverless event).
#[derive(Debug, Clone, Deserialize)]
pub struct TranscribeRequest {
    #[serde(default)]
    pub audio_base64: Option<String>,
    #[serde(default)]
    pub audio_url: Option<String>,
    /// Presigned PUT destination for the full result
    #[serde(default)]
    pub result_url: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default = "default_true")]
    pub diarize: bool,
    #[serde(default)]
    pub min_speakers: Option<u32>,
    #[serde(default)]
    pub max_speakers: Option<u32>,
    #[serde(default = "default_true")]
    pub async_mode: bool,
}

/// A request that passed validation, ready for the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptionJob {
    pub source: AudioSource,
    pub options: TranscriptionOptions,
    pub result_url: Option<Url>,
}

impl TranscribeRequest {
    /// Validate the request.
    ///
    /// `diarization_enabled` is the server-wide switch; a request can only narrow it.
    pub fn into_job(self, diarization_enabled: bool) -> AppResult<TranscriptionJob> {
        let audio_base64 = non_empty(self.audio_base64);
        let audio_url = non_empty(self.audio_url);

        let source = match (audio_base64, audio_url) {
            (Some(payload), None) => AudioSource::Base64(payload),
            (None, Some(url)) => AudioSource::Url(parse_http_url("audio_url", &url)?),
            (Some(_), Some(_)) => {
                return Err(AppError::Validation(
                    "Provide either audio_base64 or audio_url, not both".to_string(),
                ))
            }
            (None, None) => {
                return Err(AppError::Validation(
                    "Must provide audio_base64 or audio_url".to_string(),
                ))
            }
        };

        let result_url = non_empty(self.result_url)
            .map(|url| parse_http_url("result_url", &url))
            .transpose()?;

        let options = TranscriptionJob::options(
            self.language,
            self.diarize && diarization_enabled,
            self.min_speakers,
            self.max_speakers,
        )?;

        Ok(TranscriptionJob {
            source,
            options,
            result_url,
        })
    }
}

impl TranscriptionJob {
    /// Validated transcriber options; shared with the multipart upload endpoint.
    pub fn options(
        language: Option<String>,
        diarize: bool,
        min_speakers: Option<u32>,
        max_speakers: Option<u32>,
    ) -> AppResult<TranscriptionOptions> {
        if min_speakers == Some(0) || max_speakers == Some(0) {
            return Err(AppError::Validation(
                "Speaker hints must be at least 1".to_string(),
            ));
        }
        if let (Some(min), Some(max)) = (min_speakers, max_speakers) {
            if min > max {
                return Err(AppError::Validation(format!(
                    "min_speakers ({}) cannot exceed max_speakers ({})",
                    min, max
                )));
            }
        }

        Ok(TranscriptionOptions {
            language: non_empty(language),
            diarize,
            min_speakers,
            max_speakers,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_http_url(field: &str, value: &str) -> AppResult<Url> {
    let url = Url::parse(value)
        .map_err(|e| AppError::Validation(format!("{} is not a valid URL: {}", field, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(AppError::Validation(format!(
            "{} must use http or https, got '{}'",
            field, other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(body: serde_json::Value) -> TranscribeRequest {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn test_defaults() {
        let req = request(json!({"audio_url": "https://x/a.mp3"}));
        assert!(req.diarize);
        assert!(req.async_mode);
        assert!(req.result_url.is_none());
    }

    #[test]
    fn test_exactly_one_source() {
        let neither = request(json!({}));
        assert!(matches!(neither.into_job(true), Err(AppError::Validation(_))));

        let empty = request(json!({"audio_base64": "", "audio_url": "  "}));
        assert!(matches!(empty.into_job(true), Err(AppError::Validation(_))));

        let both = request(json!({"audio_base64": "UklGRg==", "audio_url": "https://x/a.mp3"}));
        assert!(matches!(both.into_job(true), Err(AppError::Validation(_))));

        let url = request(json!({"audio_url": "https://x/a.mp3"})).into_job(true).unwrap();
        assert!(matches!(url.source, AudioSource::Url(_)));
    }

    #[test]
    fn test_urls_must_be_http() {
        let ftp = request(json!({"audio_url": "ftp://x/a.mp3"}));
        assert!(matches!(ftp.into_job(true), Err(AppError::Validation(_))));

        let bad_result = request(json!({"audio_base64": "UklGRg==", "result_url": "not a url"}));
        assert!(matches!(bad_result.into_job(true), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_server_switch_overrides_diarize() {
        let job = request(json!({"audio_base64": "UklGRg==", "diarize": true}))
            .into_job(false)
            .unwrap();
        assert!(!job.options.diarize);

        let job = request(json!({"audio_base64": "UklGRg==", "diarize": false}))
            .into_job(true)
            .unwrap();
        assert!(!job.options.diarize);
    }

    #[test]
    fn test_speaker_hints_validated() {
        let inverted = request(json!({"audio_base64": "UklGRg==", "min_speakers": 4, "max_speakers": 2}));
        assert!(matches!(inverted.into_job(true), Err(AppError::Validation(_))));

        let zero = request(json!({"audio_base64": "UklGRg==", "max_speakers": 0}));
        assert!(matches!(zero.into_job(true), Err(AppError::Validation(_))));

        let ok = request(json!({"audio_base64": "UklGRg==", "min_speakers": 2, "max_speakers": 2, "language": " en "}))
            .into_job(true)
            .unwrap();
        assert_eq!(ok.options.min_speakers, Some(2));
        assert_eq!(ok.options.language.as_deref(), Some("en"));
    }
}
