//! Core Types for spinlist-resolver
//!
//! Values flow strictly forward through the pipeline:
//! `Transcript` → `MentionCandidate` → `ScoredMention` → `MusicRecommendation`
//! → `TrackMatchResult` → `ProcessingReport`.
//!
//! All of them are immutable once built and live for a single run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Range;
use uuid::Uuid;

// ============================================================================
// Transcript
// ============================================================================

/// Start of a timed transcript segment
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Byte offset of the segment's first character in the transcript text
    pub start_byte: usize,
    /// Segment start time in seconds
    pub start_secs: f64,
}

/// Transcript text with optional segment timing
#[derive(Debug, Clone, PartialEq)]
pub struct Transcript {
    text: String,
    segments: Vec<Segment>,
}

impl Transcript {
    /// Untimed transcript
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            segments: Vec::new(),
        }
    }

    /// Build a timed transcript from `(start_secs, text)` pieces
    ///
    /// Pieces are joined with newlines; each piece becomes one segment.
    pub fn from_segments<I, S>(pieces: I) -> Self
    where
        I: IntoIterator<Item = (f64, S)>,
        S: AsRef<str>,
    {
        let mut text = String::new();
        let mut segments = Vec::new();

        for (start_secs, piece) in pieces {
            if !text.is_empty() {
                text.push('\n');
            }
            segments.push(Segment {
                start_byte: text.len(),
                start_secs,
            });
            text.push_str(piece.as_ref());
        }

        Self { text, segments }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Start time of the segment containing `offset`, if the transcript is timed
    pub fn timestamp_at(&self, offset: usize) -> Option<f64> {
        self.segments
            .iter()
            .take_while(|s| s.start_byte <= offset)
            .last()
            .map(|s| s.start_secs)
    }
}

// ============================================================================
// Mentions
// ============================================================================

/// Raw pattern match, before scoring
#[derive(Debug, Clone, PartialEq)]
pub struct MentionCandidate {
    /// Artist fragment as matched
    pub artist_raw: String,
    /// Title fragment as matched
    pub title_raw: String,
    /// Album fragment, for rules that capture one
    pub album_raw: Option<String>,
    /// Byte offset of the match start
    pub offset: usize,
    /// Id of the rule that produced the match
    pub pattern_id: String,
    /// Rule base weight
    pub base_weight: f32,
    /// Byte span of the artist fragment
    pub artist_span: Range<usize>,
    /// Byte span of the title fragment
    pub title_span: Range<usize>,
}

/// Candidate plus its confidence (0.0-1.0)
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredMention {
    pub candidate: MentionCandidate,
    pub confidence: f32,
}

/// Deduplicated, confidence-scored mention ready for resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MusicRecommendation {
    /// Cleaned artist name (case preserved)
    pub artist: String,
    /// Cleaned title (case preserved)
    pub title: String,
    /// Confidence of the surviving mention (0.0-1.0)
    pub confidence: f32,
    /// Earliest byte offset at which this identity was mentioned
    pub first_offset: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    /// Rule that produced the surviving mention
    pub pattern_id: String,
    /// Segment start time of the first mention, for timed transcripts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp_secs: Option<f64>,
}

// ============================================================================
// Catalog
// ============================================================================

/// One track returned by a catalog search
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogSearchResult {
    pub artist: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    /// Service-specific track id
    pub service_id: String,
    /// Canonical URI of the track on the service
    pub service_uri: String,
}

/// Why a recommendation was not resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnresolvedReason {
    /// No search result was similar enough
    NoMatch,
    /// The search itself did not complete
    SearchFailed,
}

/// Outcome of resolving one recommendation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TrackMatchResult {
    Resolved {
        recommendation: MusicRecommendation,
        track: CatalogSearchResult,
        similarity: f32,
    },
    Unresolved {
        recommendation: MusicRecommendation,
        reason: UnresolvedReason,
    },
}

impl TrackMatchResult {
    pub fn recommendation(&self) -> &MusicRecommendation {
        match self {
            TrackMatchResult::Resolved { recommendation, .. }
            | TrackMatchResult::Unresolved { recommendation, .. } => recommendation,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, TrackMatchResult::Resolved { .. })
    }

    /// Matched track, for resolved results
    pub fn track(&self) -> Option<&CatalogSearchResult> {
        match self {
            TrackMatchResult::Resolved { track, .. } => Some(track),
            TrackMatchResult::Unresolved { .. } => None,
        }
    }
}

// ============================================================================
// Report
// ============================================================================

/// Category of a per-item pipeline error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineErrorKind {
    RateLimitTimeout,
    SearchFailed,
    DeadlineExceeded,
}

impl PipelineErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineErrorKind::RateLimitTimeout => "rate_limit_timeout",
            PipelineErrorKind::SearchFailed => "search_failed",
            PipelineErrorKind::DeadlineExceeded => "deadline_exceeded",
        }
    }
}

/// Structured per-item error recorded alongside an `Unresolved` entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineError {
    /// Position of the recommendation in deduplicated order
    pub index: usize,
    pub artist: String,
    pub title: String,
    pub kind: PipelineErrorKind,
    /// Stable root-cause key (e.g. `http-401`, `network`)
    pub cause: String,
    /// Human-readable detail
    pub message: String,
}

/// Final artifact of a pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// `Resolved` entries in recommendation order
    pub resolved: Vec<TrackMatchResult>,
    /// `Unresolved` entries in recommendation order
    pub unresolved: Vec<TrackMatchResult>,
    pub errors: Vec<PipelineError>,
}

/// Counts derived from a report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportSummary {
    pub recommendations: usize,
    pub resolved: usize,
    pub no_match: usize,
    pub search_failed: usize,
    pub errors_by_kind: BTreeMap<PipelineErrorKind, usize>,
}

impl ProcessingReport {
    /// Matched tracks, in recommendation order
    pub fn resolved_tracks(&self) -> Vec<&CatalogSearchResult> {
        self.resolved.iter().filter_map(|r| r.track()).collect()
    }

    pub fn summary(&self) -> ReportSummary {
        let mut no_match = 0;
        let mut search_failed = 0;
        for result in &self.unresolved {
            match result {
                TrackMatchResult::Unresolved {
                    reason: UnresolvedReason::NoMatch,
                    ..
                } => no_match += 1,
                TrackMatchResult::Unresolved {
                    reason: UnresolvedReason::SearchFailed,
                    ..
                } => search_failed += 1,
                TrackMatchResult::Resolved { .. } => {}
            }
        }

        let mut errors_by_kind = BTreeMap::new();
        for error in &self.errors {
            *errors_by_kind.entry(error.kind).or_insert(0) += 1;
        }

        ReportSummary {
            recommendations: self.resolved.len() + self.unresolved.len(),
            resolved: self.resolved.len(),
            no_match,
            search_failed,
            errors_by_kind,
        }
    }
}
