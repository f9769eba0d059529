//! Pipeline Orchestrator
//!
//! Extractor → Scorer → Deduplicator → (per recommendation, concurrently)
//! Resolver Client + Track Matcher → [`ProcessingReport`]
//!
//! # Architecture
//! - Extraction, scoring and deduplication are synchronous and run in order
//! - Resolution fans out via `futures::stream::buffer_unordered(fan_out)`;
//!   all workers share the resolver client's single rate-limit bucket
//! - Results are buffered and re-sorted by recommendation index, so report
//!   order never depends on completion order
//!
//! # Failure isolation
//! A failed resolution becomes an `Unresolved { reason: SearchFailed }` entry
//! plus a [`PipelineError`]; the run continues. The run fails only on an
//! extraction error, or when every recommendation (at least two) failed with
//! `SearchFailed` for the same root cause.
//!
//! # Deadline and cancellation
//! Both are checked before every catalog search, including searches still
//! waiting for a rate-limit token or a retry delay. A search already
//! dispatched finishes; a recommendation stopped before its next search is
//! reported as `DeadlineExceeded`.

use crate::deduplicator::deduplicate;
use crate::error::{ExtractionError, PatternError, ResolveError, RunError};
use crate::extractor::MentionExtractor;
use crate::patterns::PatternLibrary;
use crate::resolver_client::{ResolverClient, StopSignal};
use crate::scorer::ConfidenceScorer;
use crate::sources::{CatalogSearch, TranscriptSource};
use crate::track_matcher::TrackMatcher;
use crate::types::{
    MusicRecommendation, PipelineError, PipelineErrorKind, ProcessingReport, TrackMatchResult,
    Transcript, UnresolvedReason,
};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use spinlist_common::config::TomlConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Fewest recommendations for which a shared failure counts as systemic
const SYSTEMIC_FAILURE_MIN: usize = 2;

/// Result of one resolution attempt, before aggregation
#[derive(Debug)]
enum Outcome {
    Matched(TrackMatchResult),
    Failed(ResolveError),
    /// Stopped before a search: deadline passed or run cancelled
    Stopped { cancelled: bool },
}

/// Pipeline Orchestrator
pub struct Pipeline {
    extractor: MentionExtractor,
    scorer: ConfidenceScorer,
    matcher: TrackMatcher,
    resolver: Arc<ResolverClient>,
    deadline: Option<Duration>,
}

impl Pipeline {
    pub fn new(
        extractor: MentionExtractor,
        scorer: ConfidenceScorer,
        matcher: TrackMatcher,
        resolver: Arc<ResolverClient>,
    ) -> Self {
        Self {
            extractor,
            scorer,
            matcher,
            resolver,
            deadline: None,
        }
    }

    /// Build every stage from configuration
    ///
    /// # Errors
    /// A configured extra pattern that fails validation.
    pub fn from_config(
        config: &TomlConfig,
        search: Arc<dyn CatalogSearch>,
    ) -> Result<Self, PatternError> {
        let library = PatternLibrary::with_extra(&config.extraction.patterns)?;
        let resolver = Arc::new(ResolverClient::from_config(search, &config.resolver));

        Ok(Self::new(
            MentionExtractor::new(library),
            ConfidenceScorer::from_config(&config.extraction),
            TrackMatcher::from_config(&config.matching),
            resolver,
        )
        .with_deadline(config.resolver.deadline_secs.map(Duration::from_secs)))
    }

    /// Overall time budget for the resolution stage
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Synchronous stages: extract, score, deduplicate
    pub fn extract_recommendations(
        &self,
        transcript: &Transcript,
    ) -> Result<Vec<MusicRecommendation>, ExtractionError> {
        let candidates = self.extractor.extract(transcript)?;
        let scored = self.scorer.score_all(transcript.text(), &candidates);

        let recommendations: Vec<MusicRecommendation> = deduplicate(&scored)
            .into_iter()
            .map(|mut rec| {
                rec.timestamp_secs = transcript.timestamp_at(rec.first_offset);
                rec
            })
            .collect();

        tracing::info!(
            candidates = candidates.len(),
            recommendations = recommendations.len(),
            "Extraction stage complete"
        );

        Ok(recommendations)
    }

    /// Run the full pipeline on a transcript
    pub async fn run(&self, transcript: &Transcript) -> Result<ProcessingReport, RunError> {
        self.run_with_cancel(transcript, CancellationToken::new()).await
    }

    /// Fetch a transcript from a source, then run
    pub async fn run_from_source(
        &self,
        source: &dyn TranscriptSource,
        identifier: &str,
    ) -> Result<ProcessingReport, RunError> {
        let transcript = source.get_transcript(identifier).await?;
        self.run(&transcript).await
    }

    /// Run the full pipeline, stopping new resolutions once `cancel_token` fires
    pub async fn run_with_cancel(
        &self,
        transcript: &Transcript,
        cancel_token: CancellationToken,
    ) -> Result<ProcessingReport, RunError> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let stop = StopSignal::new(self.deadline.map(|d| Instant::now() + d), cancel_token);

        tracing::info!(run_id = %run_id, bytes = transcript.text().len(), "Starting pipeline run");

        let recommendations = match self.extract_recommendations(transcript) {
            Ok(recs) => recs,
            Err(e) => {
                tracing::error!(run_id = %run_id, error = %e, "Extraction failed");
                return Err(e.into());
            }
        };

        let outcomes = self
            .resolve_all(&recommendations, &stop)
            .await;

        if let Some(err) = systemic_failure(&outcomes) {
            tracing::error!(run_id = %run_id, error = %err, "Systemic resolution failure");
            return Err(err);
        }

        let mut report = ProcessingReport {
            run_id,
            started_at,
            finished_at: started_at,
            resolved: Vec::new(),
            unresolved: Vec::new(),
            errors: Vec::new(),
        };

        for (index, (rec, outcome)) in recommendations.iter().zip(outcomes).enumerate() {
            match outcome {
                Outcome::Matched(result) if result.is_resolved() => report.resolved.push(result),
                Outcome::Matched(result) => report.unresolved.push(result),
                Outcome::Failed(err) => {
                    let (kind, cause) = match &err {
                        ResolveError::RateLimitTimeout { .. } => (
                            PipelineErrorKind::RateLimitTimeout,
                            "rate-limit-timeout".to_string(),
                        ),
                        ResolveError::SearchFailed { cause, .. } => {
                            (PipelineErrorKind::SearchFailed, cause.signature())
                        }
                        ResolveError::Stopped { cancelled } => (
                            PipelineErrorKind::DeadlineExceeded,
                            stop_cause(*cancelled).to_string(),
                        ),
                    };
                    record_failure(&mut report, index, rec, kind, cause, err.to_string());
                }
                Outcome::Stopped { cancelled } => {
                    let cause = stop_cause(cancelled);
                    let message = if cancelled {
                        "Run cancelled before the catalog search started"
                    } else {
                        "Run deadline passed before the catalog search started"
                    };
                    record_failure(
                        &mut report,
                        index,
                        rec,
                        PipelineErrorKind::DeadlineExceeded,
                        cause.to_string(),
                        message.to_string(),
                    );
                }
            }
        }

        report.finished_at = Utc::now();

        let summary = report.summary();
        tracing::info!(
            run_id = %run_id,
            recommendations = summary.recommendations,
            resolved = summary.resolved,
            no_match = summary.no_match,
            search_failed = summary.search_failed,
            errors = report.errors.len(),
            "Pipeline run complete"
        );

        Ok(report)
    }

    /// Resolve every recommendation; outcomes come back in input order
    async fn resolve_all(
        &self,
        recommendations: &[MusicRecommendation],
        stop: &StopSignal,
    ) -> Vec<Outcome> {
        let fan_out = self.resolver.fan_out();

        tracing::info!(
            recommendations = recommendations.len(),
            fan_out,
            "Resolving recommendations"
        );

        let mut outcomes: Vec<(usize, Outcome)> = stream::iter(recommendations.iter().enumerate())
            .map(|(index, rec)| async move {
                tracing::debug!(
                    index,
                    artist = %rec.artist,
                    title = %rec.title,
                    "Resolving recommendation"
                );

                let resolved = self
                    .resolver
                    .resolve_until(&rec.artist, &rec.title, stop)
                    .await;
                let outcome = match resolved {
                    Ok(results) => Outcome::Matched(self.matcher.match_results(rec, &results)),
                    Err(ResolveError::Stopped { cancelled }) => Outcome::Stopped { cancelled },
                    Err(e) => Outcome::Failed(e),
                };
                (index, outcome)
            })
            .buffer_unordered(fan_out)
            .collect()
            .await;

        outcomes.sort_by_key(|(index, _)| *index);
        outcomes.into_iter().map(|(_, outcome)| outcome).collect()
    }
}

fn stop_cause(cancelled: bool) -> &'static str {
    if cancelled {
        "cancelled"
    } else {
        "deadline"
    }
}

fn record_failure(
    report: &mut ProcessingReport,
    index: usize,
    rec: &MusicRecommendation,
    kind: PipelineErrorKind,
    cause: String,
    message: String,
) {
    tracing::warn!(
        index,
        artist = %rec.artist,
        title = %rec.title,
        kind = kind.as_str(),
        cause = %cause,
        "Recommendation not resolved: {}",
        message
    );

    report.unresolved.push(TrackMatchResult::Unresolved {
        recommendation: rec.clone(),
        reason: UnresolvedReason::SearchFailed,
    });
    report.errors.push(PipelineError {
        index,
        artist: rec.artist.clone(),
        title: rec.title.clone(),
        kind,
        cause,
        message,
    });
}

/// Every outcome is `SearchFailed` with one shared cause signature
fn systemic_failure(outcomes: &[Outcome]) -> Option<RunError> {
    if outcomes.len() < SYSTEMIC_FAILURE_MIN {
        return None;
    }

    let failures: Option<Vec<(&ResolveError, String)>> = outcomes
        .iter()
        .map(|outcome| match outcome {
            Outcome::Failed(err @ ResolveError::SearchFailed { cause, .. }) => {
                Some((err, cause.signature()))
            }
            _ => None,
        })
        .collect();
    let failures = failures?;

    let (example, signature) = failures.first()?;
    if failures.iter().any(|(_, s)| s != signature) {
        return None;
    }

    Some(RunError::SystemicResolutionFailure {
        signature: signature.clone(),
        count: failures.len(),
        example: example.to_string(),
    })
}
