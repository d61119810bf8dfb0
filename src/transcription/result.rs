//! Transcription results as returned to callers, and the compact summary used when
//! the full result is delivered elsewhere.

use super::transcriber::{Segment, Transcript};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

/// Full transcription result: the transcriber's output plus timing and speakers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionResult {
    pub segments: Vec<Segment>,
    pub language: String,
    /// Sorted, deduplicated speaker labels; present only when diarization found speakers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speakers: Option<Vec<String>>,
    pub processing_time_seconds: f64,
}

/// What a caller gets instead of the full result once it has been uploaded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResultSummary {
    pub segments_count: usize,
    pub speakers_count: usize,
    pub duration_seconds: f64,
    pub processing_time_seconds: f64,
}

impl TranscriptionResult {
    pub fn from_transcript(transcript: Transcript, elapsed: Duration) -> Self {
        let speakers = if transcript.diarized {
            Some(extract_speakers(&transcript.segments)).filter(|labels| !labels.is_empty())
        } else {
            None
        };

        Self {
            segments: transcript.segments,
            language: transcript.language,
            speakers,
            processing_time_seconds: round_seconds(elapsed.as_secs_f64()),
        }
    }

    /// Audio duration: end of the last segment, or 0 without segments.
    pub fn duration_seconds(&self) -> f64 {
        self.segments.last().map(|segment| segment.end).unwrap_or(0.0)
    }

    pub fn summary(&self) -> ResultSummary {
        ResultSummary {
            segments_count: self.segments.len(),
            speakers_count: self.speakers.as_ref().map(Vec::len).unwrap_or(0),
            duration_seconds: round_seconds(self.duration_seconds()),
            processing_time_seconds: self.processing_time_seconds,
        }
    }
}

/// Collect speaker labels from segments and their words.
pub fn extract_speakers(segments: &[Segment]) -> Vec<String> {
    let mut speakers = BTreeSet::new();
    for segment in segments {
        if let Some(speaker) = &segment.speaker {
            speakers.insert(speaker.clone());
        }
        for word in &segment.words {
            if let Some(speaker) = &word.speaker {
                speakers.insert(speaker.clone());
            }
        }
    }
    speakers.into_iter().collect()
}

/// Round to two decimals, the precision used in every response.
pub fn round_seconds(seconds: f64) -> f64 {
    (seconds * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcription::transcriber::Word;

    fn segment(start: f64, end: f64, speaker: Option<&str>) -> Segment {
        Segment {
            start,
            end,
            text: "hello".to_string(),
            speaker: speaker.map(str::to_string),
            words: Vec::new(),
        }
    }

    #[test]
    fn test_speakers_are_sorted_and_deduplicated() {
        let mut with_words = segment(2.0, 3.0, None);
        with_words.words.push(Word {
            word: "hi".to_string(),
            start: Some(2.0),
            end: Some(2.5),
            score: None,
            speaker: Some("SPEAKER_02".to_string()),
        });
        let segments = vec![
            segment(0.0, 1.0, Some("SPEAKER_01")),
            segment(1.0, 2.0, Some("SPEAKER_00")),
            segment(1.5, 2.0, Some("SPEAKER_01")),
            with_words,
        ];

        assert_eq!(
            extract_speakers(&segments),
            vec!["SPEAKER_00", "SPEAKER_01", "SPEAKER_02"]
        );
    }

    #[test]
    fn test_speakers_omitted_without_diarization() {
        let transcript = Transcript {
            segments: vec![segment(0.0, 1.0, Some("SPEAKER_00"))],
            language: "en".to_string(),
            diarized: false,
        };
        let result = TranscriptionResult::from_transcript(transcript, Duration::from_millis(1234));
        assert_eq!(result.speakers, None);
        assert_eq!(result.processing_time_seconds, 1.23);

        let json = serde_json::to_value(&result).unwrap();
        assert!(json.get("speakers").is_none());
    }

    #[test]
    fn test_summary_uses_last_segment_end() {
        let transcript = Transcript {
            segments: vec![
                segment(0.0, 4.5, Some("SPEAKER_00")),
                segment(4.5, 61.237, Some("SPEAKER_01")),
            ],
            language: "en".to_string(),
            diarized: true,
        };
        let summary = TranscriptionResult::from_transcript(transcript, Duration::from_secs(3)).summary();
        assert_eq!(summary.segments_count, 2);
        assert_eq!(summary.speakers_count, 2);
        assert_eq!(summary.duration_seconds, 61.24);
        assert_eq!(summary.processing_time_seconds, 3.0);
    }

    #[test]
    fn test_summary_of_empty_result() {
        let transcript = Transcript {
            segments: Vec::new(),
            language: "en".to_string(),
            diarized: true,
        };
        let summary = TranscriptionResult::from_transcript(transcript, Duration::ZERO).summary();
        assert_eq!(summary.segments_count, 0);
        assert_eq!(summary.speakers_count, 0);
        assert_eq!(summary.duration_seconds, 0.0);
    }
}
