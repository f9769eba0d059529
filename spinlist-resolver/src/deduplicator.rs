//! Deduplicator
//!
//! Merges mentions that share an identity into one [`MusicRecommendation`].
//!
//! **Identity:** (artist, title) after case-folding, collapsing internal
//! whitespace and stripping leading/trailing punctuation.
//!
//! **Survivor selection:** highest confidence; on a tie, smallest offset.
//!
//! **Output order:** order in which each identity was first seen in the input.
//!
//! Deduplication is idempotent: feeding its output back in returns the same
//! recommendations, since each identity then occurs exactly once.

use crate::normalize::{clean_field, identity_key};
use crate::types::{MusicRecommendation, ScoredMention};
use std::collections::HashMap;

/// Anything the deduplicator can group
pub trait DedupItem {
    fn artist(&self) -> &str;
    fn title(&self) -> &str;
    fn album(&self) -> Option<&str>;
    fn confidence(&self) -> f32;
    fn offset(&self) -> usize;
    fn pattern_id(&self) -> &str;
    fn timestamp_secs(&self) -> Option<f64> {
        None
    }
}

impl DedupItem for ScoredMention {
    fn artist(&self) -> &str {
        &self.candidate.artist_raw
    }
    fn title(&self) -> &str {
        &self.candidate.title_raw
    }
    fn album(&self) -> Option<&str> {
        self.candidate.album_raw.as_deref()
    }
    fn confidence(&self) -> f32 {
        self.confidence
    }
    fn offset(&self) -> usize {
        self.candidate.offset
    }
    fn pattern_id(&self) -> &str {
        &self.candidate.pattern_id
    }
}

impl DedupItem for MusicRecommendation {
    fn artist(&self) -> &str {
        &self.artist
    }
    fn title(&self) -> &str {
        &self.title
    }
    fn album(&self) -> Option<&str> {
        self.album.as_deref()
    }
    fn confidence(&self) -> f32 {
        self.confidence
    }
    fn offset(&self) -> usize {
        self.first_offset
    }
    fn pattern_id(&self) -> &str {
        &self.pattern_id
    }
    fn timestamp_secs(&self) -> Option<f64> {
        self.timestamp_secs
    }
}

/// Normalized identity of a mention
pub fn identity_of(artist: &str, title: &str) -> (String, String) {
    (identity_key(artist), identity_key(title))
}

struct Group<'a, T> {
    survivor: &'a T,
    first_offset: usize,
    first_timestamp: Option<f64>,
    album: Option<&'a str>,
}

/// Collapse mentions to one recommendation per identity
pub fn deduplicate<T: DedupItem>(items: &[T]) -> Vec<MusicRecommendation> {
    let mut index: HashMap<(String, String), usize> = HashMap::new();
    let mut groups: Vec<Group<'_, T>> = Vec::new();

    for item in items {
        let key = identity_of(item.artist(), item.title());
        let album = item.album().filter(|a| !clean_field(a).is_empty());

        match index.get(&key) {
            Some(&i) => {
                let group = &mut groups[i];

                if item.offset() < group.first_offset {
                    group.first_offset = item.offset();
                    group.first_timestamp = item.timestamp_secs();
                }

                let survivor = group.survivor;
                if item.confidence() > survivor.confidence()
                    || (item.confidence() == survivor.confidence()
                        && item.offset() < survivor.offset())
                {
                    group.survivor = item;
                    if album.is_some() {
                        group.album = album;
                    }
                } else if group.album.is_none() {
                    group.album = album;
                }
            }
            None => {
                index.insert(key, groups.len());
                groups.push(Group {
                    survivor: item,
                    first_offset: item.offset(),
                    first_timestamp: item.timestamp_secs(),
                    album,
                });
            }
        }
    }

    let merged = items.len() - groups.len();
    tracing::debug!(
        input = items.len(),
        recommendations = groups.len(),
        merged,
        "Deduplication complete"
    );

    groups
        .into_iter()
        .map(|g| MusicRecommendation {
            artist: clean_field(g.survivor.artist()),
            title: clean_field(g.survivor.title()),
            confidence: g.survivor.confidence(),
            first_offset: g.first_offset,
            album: g.album.map(clean_field),
            pattern_id: g.survivor.pattern_id().to_string(),
            timestamp_secs: g.first_timestamp,
        })
        .collect()
}
