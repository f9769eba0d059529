//! Confidence Scorer
//!
//! Flat weighted sum over declared signals:
//!
//! ```text
//! confidence = clamp01(base_weight
//!                      + 0.10  music keyword within N tokens before the match
//!                      + 0.05  artist and title both quoted in the source text
//!                      + 0.05  every artist word starts uppercase
//!                      - 0.20  a field is empty or shorter than 2 characters
//!                      - 0.10  artist and title are identical)
//! ```
//!
//! Pure and deterministic: the same text, candidate and settings always
//! produce the same score.

use crate::normalize::{identity_key, QUOTE_CHARS};
use crate::types::{MentionCandidate, ScoredMention};
use spinlist_common::config::ExtractionConfig;
use std::ops::Range;

const KEYWORD_BONUS: f32 = 0.10;
const QUOTED_BONUS: f32 = 0.05;
const PROPER_NOUN_BONUS: f32 = 0.05;
const SHORT_FIELD_PENALTY: f32 = 0.20;
const SELF_REFERENCE_PENALTY: f32 = 0.10;

/// Endings a token may add to a single-word keyword ("song" → "songs")
const INFLECTIONS: &[&str] = &["s", "es", "ed", "ation", "ations"];

/// Music keyword, matched against lowercased tokens
#[derive(Debug, Clone, PartialEq, Eq)]
enum Keyword {
    /// Matches the word or an inflected form ("recommend" → "recommended")
    Word(String),
    /// Matches consecutive tokens exactly ("listening to")
    Phrase(Vec<String>),
}

impl Keyword {
    fn parse(raw: &str) -> Option<Self> {
        let tokens: Vec<String> = raw.split_whitespace().map(identity_key).collect();
        match tokens.len() {
            0 => None,
            1 => tokens.into_iter().next().map(Keyword::Word),
            _ => Some(Keyword::Phrase(tokens)),
        }
    }

    fn found_in(&self, window: &[String]) -> bool {
        match self {
            Keyword::Word(word) => window.iter().any(|t| is_inflection_of(t, word)),
            Keyword::Phrase(phrase) => window
                .windows(phrase.len())
                .any(|w| w.iter().zip(phrase).all(|(t, p)| t == p)),
        }
    }
}

/// Confidence Scorer
#[derive(Debug, Clone)]
pub struct ConfidenceScorer {
    keyword_window: usize,
    keywords: Vec<Keyword>,
}

impl ConfidenceScorer {
    pub fn new(keyword_window: usize, keywords: &[String]) -> Self {
        Self {
            keyword_window,
            keywords: keywords.iter().filter_map(|k| Keyword::parse(k)).collect(),
        }
    }

    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self::new(config.keyword_window, &config.keywords)
    }

    /// Score one candidate against the text it was extracted from
    pub fn score(&self, text: &str, candidate: &MentionCandidate) -> ScoredMention {
        let mut confidence = candidate.base_weight;

        if self.keyword_before(text, candidate.offset) {
            confidence += KEYWORD_BONUS;
        }
        if is_quoted(text, &candidate.artist_span) && is_quoted(text, &candidate.title_span) {
            confidence += QUOTED_BONUS;
        }
        if is_proper_noun(&candidate.artist_raw) {
            confidence += PROPER_NOUN_BONUS;
        }
        if is_degenerate(&candidate.artist_raw) || is_degenerate(&candidate.title_raw) {
            confidence -= SHORT_FIELD_PENALTY;
        }
        if is_self_referential(&candidate.artist_raw, &candidate.title_raw) {
            confidence -= SELF_REFERENCE_PENALTY;
        }

        let confidence = clamp01(confidence);

        tracing::debug!(
            pattern = %candidate.pattern_id,
            artist = %candidate.artist_raw,
            title = %candidate.title_raw,
            offset = candidate.offset,
            confidence,
            "Scored mention"
        );

        ScoredMention {
            candidate: candidate.clone(),
            confidence,
        }
    }

    /// Score candidates, preserving order
    pub fn score_all(&self, text: &str, candidates: &[MentionCandidate]) -> Vec<ScoredMention> {
        candidates.iter().map(|c| self.score(text, c)).collect()
    }

    /// Whether a music keyword occurs within the token window preceding `offset`
    pub fn keyword_before(&self, text: &str, offset: usize) -> bool {
        let preceding = text.get(..offset).unwrap_or(text);
        let tokens: Vec<String> = preceding
            .split_whitespace()
            .map(identity_key)
            .filter(|t| !t.is_empty())
            .collect();

        let start = tokens.len().saturating_sub(self.keyword_window);
        let window = &tokens[start..];

        self.keywords.iter().any(|k| k.found_in(window))
    }
}

impl Default for ConfidenceScorer {
    fn default() -> Self {
        Self::from_config(&ExtractionConfig::default())
    }
}

fn is_inflection_of(token: &str, word: &str) -> bool {
    token
        .strip_prefix(word)
        .map_or(false, |ending| ending.is_empty() || INFLECTIONS.contains(&ending))
}

fn clamp01(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Field immediately surrounded by quote characters in the source text
fn is_quoted(text: &str, span: &Range<usize>) -> bool {
    let before = text.get(..span.start).and_then(|s| s.chars().next_back());
    let after = text.get(span.end..).and_then(|s| s.chars().next());
    matches!(
        (before, after),
        (Some(b), Some(a)) if QUOTE_CHARS.contains(&b) && QUOTE_CHARS.contains(&a)
    )
}

fn is_proper_noun(artist: &str) -> bool {
    let mut words = artist.split_whitespace().peekable();
    words.peek().is_some()
        && words.all(|w| w.chars().next().map_or(false, char::is_uppercase))
}

fn is_degenerate(field: &str) -> bool {
    field.trim().chars().count() < 2
}

fn is_self_referential(artist: &str, title: &str) -> bool {
    let artist = identity_key(artist);
    !artist.is_empty() && artist == identity_key(title)
}
