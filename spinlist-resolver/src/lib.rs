//! spinlist-resolver library
//!
//! Finds music recommendations in podcast/video transcripts and resolves
//! them to catalog tracks.
//!
//! **Stages:** [`extractor`] → [`scorer`] → [`deduplicator`] →
//! [`resolver_client`] + [`track_matcher`], driven by [`pipeline`].
//! External collaborators (transcript source, catalog search, playlist sink)
//! live under [`sources`].

pub mod deduplicator;
pub mod error;
pub mod extractor;
pub mod normalize;
pub mod patterns;
pub mod pipeline;
pub mod rate_limiter;
pub mod resolver_client;
pub mod scorer;
pub mod sources;
pub mod track_matcher;
pub mod types;

pub use crate::error::{CatalogError, ExtractionError, PatternError, ResolveError, RunError};
pub use crate::pipeline::Pipeline;
pub use crate::types::{
    CatalogSearchResult, MusicRecommendation, PipelineError, PipelineErrorKind, ProcessingReport,
    TrackMatchResult, Transcript, UnresolvedReason,
};
