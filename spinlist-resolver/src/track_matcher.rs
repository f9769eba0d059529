//! Track Matcher
//!
//! Picks the catalog result that best matches a recommendation.
//!
//! **Similarity:**
//! ```text
//! similarity = clamp01(0.5 * jw(artist) + 0.5 * jw(title) + album_bonus?)
//! ```
//! where `jw` is Jaro-Winkler over [`matching_key`]s, so case, punctuation
//! and bracketed edition suffixes ("(Remastered 2009)") do not count. The
//! album bonus applies when the recommendation carries an album and the
//! result's album is a close match.
//!
//! Results with artist or title similarity below the per-field floor are
//! not eligible. The best eligible result wins, earlier service rank
//! breaking ties; it resolves only at or above the threshold.

use crate::normalize::matching_key;
use crate::types::{CatalogSearchResult, MusicRecommendation, TrackMatchResult, UnresolvedReason};
use spinlist_common::config::MatchingConfig;

const ARTIST_WEIGHT: f32 = 0.5;
const TITLE_WEIGHT: f32 = 0.5;
/// Album similarity needed for the album bonus
const ALBUM_MATCH_SIMILARITY: f32 = 0.9;

/// Track Matcher
#[derive(Debug, Clone, PartialEq)]
pub struct TrackMatcher {
    threshold: f32,
    field_floor: f32,
    album_bonus: f32,
}

impl TrackMatcher {
    pub fn new(threshold: f32, field_floor: f32, album_bonus: f32) -> Self {
        Self {
            threshold,
            field_floor,
            album_bonus,
        }
    }

    pub fn from_config(config: &MatchingConfig) -> Self {
        Self::new(config.threshold, config.field_floor, config.album_bonus)
    }

    /// Match a recommendation against ranked search results
    ///
    /// Never fails: an empty or entirely dissimilar result list yields
    /// `Unresolved { reason: NoMatch }`.
    pub fn match_results(
        &self,
        recommendation: &MusicRecommendation,
        results: &[CatalogSearchResult],
    ) -> TrackMatchResult {
        let mut best: Option<(&CatalogSearchResult, f32)> = None;

        for result in results {
            let Some(similarity) = self.similarity(recommendation, result) else {
                continue;
            };
            // Strictly greater: earlier rank keeps ties
            if best.map_or(true, |(_, s)| similarity > s) {
                best = Some((result, similarity));
            }
        }

        match best {
            Some((track, similarity)) if similarity >= self.threshold => {
                tracing::debug!(
                    artist = %recommendation.artist,
                    title = %recommendation.title,
                    matched_artist = %track.artist,
                    matched_title = %track.title,
                    similarity,
                    "Resolved recommendation"
                );
                TrackMatchResult::Resolved {
                    recommendation: recommendation.clone(),
                    track: track.clone(),
                    similarity,
                }
            }
            best => {
                tracing::debug!(
                    artist = %recommendation.artist,
                    title = %recommendation.title,
                    candidates = results.len(),
                    best_similarity = best.map(|(_, s)| s),
                    "No catalog result above threshold"
                );
                TrackMatchResult::Unresolved {
                    recommendation: recommendation.clone(),
                    reason: UnresolvedReason::NoMatch,
                }
            }
        }
    }

    /// Combined similarity, or `None` if a field is below the floor
    pub fn similarity(
        &self,
        recommendation: &MusicRecommendation,
        result: &CatalogSearchResult,
    ) -> Option<f32> {
        let artist_sim = fuzzy_similarity(&recommendation.artist, &result.artist);
        let title_sim = fuzzy_similarity(&recommendation.title, &result.title);

        if artist_sim < self.field_floor || title_sim < self.field_floor {
            return None;
        }

        let mut similarity = ARTIST_WEIGHT * artist_sim + TITLE_WEIGHT * title_sim;

        if let (Some(wanted), Some(found)) = (&recommendation.album, &result.album) {
            if fuzzy_similarity(wanted, found) >= ALBUM_MATCH_SIMILARITY {
                similarity += self.album_bonus;
            }
        }

        Some(similarity.clamp(0.0, 1.0))
    }
}

impl Default for TrackMatcher {
    fn default() -> Self {
        Self::from_config(&MatchingConfig::default())
    }
}

/// Jaro-Winkler similarity of the matching keys
fn fuzzy_similarity(a: &str, b: &str) -> f32 {
    strsim::jaro_winkler(&matching_key(a), &matching_key(b)) as f32
}
