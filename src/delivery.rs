//! # Result Delivery
//!
//! Decides how a finished transcription reaches the caller.
//!
//! ## Two Modes:
//! - **Inline** (no `result_url`): the full result is the response payload
//! - **Presigned upload** (`result_url` given): the full result is PUT to the URL as JSON
//!   and the caller only receives a compact `ResultSummary`
//!
//! Long transcripts with word timings easily run to tens of megabytes, more than
//! serverless response limits allow, hence the upload mode. The decision is the same for
//! synchronous requests and background jobs.

use crate::audio::source::describe_transport_error;
use crate::error::{AppError, AppResult};
use crate::redact::redact_url;
use crate::transcription::{ResultSummary, TranscriptionResult};
use reqwest::header::CONTENT_TYPE;
use reqwest::Url;
use std::time::Duration;
use tracing::info;

/// Upstream error bodies (S3 XML and friends) are cut to this many characters.
const ERROR_BODY_LIMIT: usize = 200;

/// Outcome of delivery.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    Inline(TranscriptionResult),
    Uploaded(ResultSummary),
}

impl Delivery {
    pub fn summary(&self) -> ResultSummary {
        match self {
            Delivery::Inline(result) => result.summary(),
            Delivery::Uploaded(summary) => *summary,
        }
    }
}

/// PUTs results to presigned destinations.
#[derive(Clone)]
pub struct ResultUploader {
    client: reqwest::Client,
    timeout: Duration,
}

impl ResultUploader {
    pub fn new(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Return the result inline, or upload it and return its summary.
    pub async fn deliver(
        &self,
        result: TranscriptionResult,
        destination: Option<&Url>,
    ) -> AppResult<Delivery> {
        match destination {
            None => Ok(Delivery::Inline(result)),
            Some(url) => {
                self.upload(url, &result).await?;
                Ok(Delivery::Uploaded(result.summary()))
            }
        }
    }

    pub async fn upload(&self, destination: &Url, result: &TranscriptionResult) -> AppResult<()> {
        let body = serde_json::to_vec(result)
            .map_err(|e| AppError::Internal(format!("Failed to serialize result: {}", e)))?;
        let size = body.len();
        info!(url = %redact_url(destination.as_str()), bytes = size, "Uploading result");

        let response = self
            .client
            .put(destination.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| AppError::Upload(describe_transport_error(e)))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            let detail: String = detail.chars().take(ERROR_BODY_LIMIT).collect();
            return Err(AppError::Upload(if detail.is_empty() {
                format!("HTTP {}", status)
            } else {
                format!("HTTP {}: {}", status, detail)
            }));
        }

        info!(bytes = size, "Result uploaded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::start_origin;
    use crate::transcription::testing::sample_segments;
    use crate::transcription::transcriber::Transcript;

    fn result() -> TranscriptionResult {
        TranscriptionResult::from_transcript(
            Transcript {
                segments: sample_segments(),
                language: "en".to_string(),
                diarized: true,
            },
            Duration::from_millis(4200),
        )
    }

    fn uploader() -> ResultUploader {
        ResultUploader::new(reqwest::Client::new(), Duration::from_secs(5))
    }

    #[actix_web::test]
    async fn test_inline_without_destination() {
        let delivery = uploader().deliver(result(), None).await.unwrap();
        assert_eq!(delivery, Delivery::Inline(result()));
        assert_eq!(delivery.summary().segments_count, 3);
    }

    #[actix_web::test]
    async fn test_upload_sends_full_json() {
        let origin = start_origin().await;
        let url = Url::parse(&format!("{}/upload/result.json?X-Amz-Signature=abc", origin.base)).unwrap();

        let delivery = uploader().deliver(result(), Some(&url)).await.unwrap();
        let summary = match delivery {
            Delivery::Uploaded(summary) => summary,
            other => panic!("expected upload, got {:?}", other),
        };
        assert_eq!(summary.segments_count, 3);
        assert_eq!(summary.speakers_count, 2);
        assert_eq!(summary.duration_seconds, 9.0);
        assert_eq!(summary.processing_time_seconds, 4.2);

        let uploads = origin.uploads();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].path, "/upload/result.json");
        assert_eq!(uploads[0].content_type.as_deref(), Some("application/json"));
        let received: TranscriptionResult = serde_json::from_slice(&uploads[0].body).unwrap();
        assert_eq!(received, result());
    }

    #[actix_web::test]
    async fn test_rejected_upload_is_an_upload_error() {
        let origin = start_origin().await;
        let url = Url::parse(&format!("{}/reject/result.json", origin.base)).unwrap();

        let err = uploader().deliver(result(), Some(&url)).await.unwrap_err();
        assert!(matches!(&err, AppError::Upload(msg) if msg.contains("403") && msg.contains("SignatureDoesNotMatch")));
    }
}
