//! The external transcription contract. Grounded on
//! `original_source/main.py`'s use of `faster_whisper`/`WhisperModel`
//! and `original_source/models/model_manager.py`; expressed as an
//! `async_trait` per the teacher's `tasker-shared`/`tasker-orchestration`
//! pattern for trait objects crossing an await boundary.

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::ModelSize;

#[derive(Debug, thiserror::Error)]
pub enum TranscriberError {
    #[error("transcription backend failed: {0}")]
    Backend(String),
    #[error("input file is not readable: {0}")]
    UnreadableInput(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Segment {
    pub start: f64,
    pub end: f64,
    pub text: String,
    pub speaker: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TranscriptResult {
    pub text: String,
    pub language: String,
    pub segments: Vec<Segment>,
    /// Audio duration of the source, in seconds. Persisted as
    /// `Task.duration_seconds`; distinct from how long processing took.
    pub duration: f64,
    pub speakers: Option<Vec<serde_json::Value>>,
    pub diarization_type: Option<String>,
}

/// Collaborator boundary between the service's lifecycle machinery and
/// whichever speech-recognition backend actually runs inference.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe_simple(
        &self,
        path: &Path,
        language: &str,
        model_size: ModelSize,
    ) -> Result<TranscriptResult, TranscriberError>;

    async fn transcribe_with_diarization(
        &self,
        path: &Path,
        language: &str,
        model_size: ModelSize,
    ) -> Result<TranscriptResult, TranscriberError>;
}

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils {
    use super::*;

    /// A stub `Transcriber` for worker-pool and intake tests: it never
    /// touches a real model, just echoes back a fixed transcript after
    /// confirming the staged file exists.
    pub struct NullTranscriber;

    #[async_trait]
    impl Transcriber for NullTranscriber {
        async fn transcribe_simple(
            &self,
            path: &Path,
            language: &str,
            _model_size: ModelSize,
        ) -> Result<TranscriptResult, TranscriberError> {
            if !path.exists() {
                return Err(TranscriberError::UnreadableInput(
                    path.display().to_string(),
                ));
            }
            Ok(TranscriptResult {
                text: "stub transcript".to_string(),
                language: language.to_string(),
                segments: vec![Segment {
                    start: 0.0,
                    end: 1.0,
                    text: "stub transcript".to_string(),
                    speaker: None,
                }],
                duration: 1.0,
                speakers: None,
                diarization_type: None,
            })
        }

        async fn transcribe_with_diarization(
            &self,
            path: &Path,
            language: &str,
            _model_size: ModelSize,
        ) -> Result<TranscriptResult, TranscriberError> {
            if !path.exists() {
                return Err(TranscriberError::UnreadableInput(
                    path.display().to_string(),
                ));
            }
            Ok(TranscriptResult {
                text: "stub transcript".to_string(),
                language: language.to_string(),
                segments: vec![
                    Segment {
                        start: 0.0,
                        end: 1.0,
                        text: "stub transcript".to_string(),
                        speaker: Some("SPEAKER_00".to_string()),
                    },
                ],
                duration: 1.0,
                speakers: Some(vec![serde_json::json!({"speaker": "SPEAKER_00"})]),
                diarization_type: Some("stub".to_string()),
            })
        }
    }
}
