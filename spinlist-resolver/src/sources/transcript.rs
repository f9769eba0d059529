//! Transcript acquisition boundary

use crate::error::TranscriptError;
use crate::types::Transcript;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;

/// Supplies transcript text for an identifier (file path, video id, ...)
#[async_trait]
pub trait TranscriptSource: Send + Sync {
    async fn get_transcript(&self, identifier: &str) -> Result<Transcript, TranscriptError>;
}

/// Timed transcript document
#[derive(Debug, Deserialize)]
struct SegmentDocument {
    segments: Vec<SegmentEntry>,
}

#[derive(Debug, Deserialize)]
struct SegmentEntry {
    /// Segment start in seconds
    start: f64,
    text: String,
}

/// Reads transcripts from local files
///
/// Identifiers are paths, resolved against `root` when relative. A file
/// whose content starts with `{` is parsed as a segment document
/// (`{"segments": [{"start": 12.5, "text": "..."}]}`); anything else is
/// plain untimed text.
#[derive(Debug, Clone, Default)]
pub struct FileTranscriptSource {
    root: Option<PathBuf>,
}

impl FileTranscriptSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve relative identifiers against `root`
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    fn path_for(&self, identifier: &str) -> PathBuf {
        let path = PathBuf::from(identifier);
        match &self.root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path,
        }
    }

    /// Parse file content into a transcript
    pub fn parse(identifier: &str, content: &str) -> Result<Transcript, TranscriptError> {
        if !content.trim_start().starts_with('{') {
            return Ok(Transcript::new(content));
        }

        let document: SegmentDocument =
            serde_json::from_str(content).map_err(|e| TranscriptError::TranscriptUnavailable {
                id: identifier.to_string(),
                reason: format!("invalid segment document: {}", e),
            })?;

        Ok(Transcript::from_segments(
            document.segments.into_iter().map(|s| (s.start, s.text)),
        ))
    }
}

#[async_trait]
impl TranscriptSource for FileTranscriptSource {
    async fn get_transcript(&self, identifier: &str) -> Result<Transcript, TranscriptError> {
        let path = self.path_for(identifier);

        let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
            TranscriptError::TranscriptUnavailable {
                id: identifier.to_string(),
                reason: e.to_string(),
            }
        })?;

        let transcript = Self::parse(identifier, &content)?;

        tracing::info!(
            path = %path.display(),
            bytes = transcript.text().len(),
            segments = transcript.segments().len(),
            "Loaded transcript"
        );

        Ok(transcript)
    }
}
