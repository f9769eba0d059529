//! Mention Extractor
//!
//! Applies every rule of a [`PatternLibrary`] to the whole transcript and
//! collects raw (artist, title) candidates.
//!
//! **Algorithm:**
//! 1. Reject empty/whitespace-only transcripts
//! 2. For each rule (declaration order), collect all non-overlapping matches of that rule
//! 3. Narrow a field that opens the match past sentence openers ("Then
//!    Radiohead" → "Radiohead"); drop the match if nothing is left, or if
//!    the artist is a contraction stem followed by `'s` ("Let's Dance")
//! 4. Stable-sort candidates by offset, so ties keep rule declaration order
//!
//! Rules do not exclude each other: a phrase matched by two rules yields two
//! candidates, merged later by the deduplicator.

use crate::error::ExtractionError;
use crate::patterns::{is_contraction_stem, skip_sentence_openers, PatternLibrary};
use crate::types::{MentionCandidate, Transcript};
use std::ops::Range;

/// Mention Extractor
#[derive(Debug, Clone)]
pub struct MentionExtractor {
    library: PatternLibrary,
}

impl MentionExtractor {
    pub fn new(library: PatternLibrary) -> Self {
        Self { library }
    }

    /// Extract raw mention candidates ordered by ascending offset
    ///
    /// # Errors
    /// `ExtractionError::EmptyTranscript` if the text is empty after trimming.
    /// No matches is not an error; it yields an empty vector.
    pub fn extract(
        &self,
        transcript: &Transcript,
    ) -> Result<Vec<MentionCandidate>, ExtractionError> {
        let text = transcript.text();
        if text.trim().is_empty() {
            return Err(ExtractionError::EmptyTranscript);
        }

        let mut candidates = Vec::new();

        for rule in self.library.rules() {
            for caps in rule.regex().captures_iter(text) {
                let (Some(whole), Some(artist), Some(title)) =
                    (caps.get(0), caps.name("artist"), caps.name("title"))
                else {
                    continue;
                };

                let (Some(artist_span), Some(title_span)) = (
                    open_field(text, artist.range(), whole.start()),
                    open_field(text, title.range(), whole.start()),
                ) else {
                    tracing::debug!(
                        pattern = %rule.id(),
                        text = whole.as_str(),
                        "Skipping sentence opener"
                    );
                    continue;
                };

                let artist_raw = &text[artist_span.clone()];
                if is_contraction(text, artist_raw, artist_span.end) {
                    tracing::debug!(
                        pattern = %rule.id(),
                        text = whole.as_str(),
                        "Skipping contraction"
                    );
                    continue;
                }

                // Only a field that opens the match can move
                let shift =
                    (artist_span.start - artist.start()) + (title_span.start - title.start());

                candidates.push(MentionCandidate {
                    artist_raw: artist_raw.to_string(),
                    title_raw: text[title_span.clone()].to_string(),
                    album_raw: caps.name("album").map(|m| m.as_str().to_string()),
                    offset: whole.start() + shift,
                    pattern_id: rule.id().to_string(),
                    base_weight: rule.base_weight(),
                    artist_span,
                    title_span,
                });
            }
        }

        // Stable: equal offsets keep rule declaration order
        candidates.sort_by_key(|c| c.offset);

        tracing::debug!(
            candidates = candidates.len(),
            rules = self.library.rules().len(),
            "Mention extraction complete"
        );

        Ok(candidates)
    }
}

/// Narrow a field that opens the match past any sentence openers
fn open_field(text: &str, span: Range<usize>, match_start: usize) -> Option<Range<usize>> {
    if span.start != match_start {
        return Some(span);
    }
    let skip = skip_sentence_openers(&text[span.clone()])?;
    Some(span.start + skip..span.end)
}

/// A single-word artist like "Let" directly followed by `'s`
fn is_contraction(text: &str, artist: &str, artist_end: usize) -> bool {
    let rest = &text[artist_end..];
    (rest.starts_with("'s") || rest.starts_with("’s"))
        && !artist.contains(char::is_whitespace)
        && is_contraction_stem(artist)
}

impl Default for MentionExtractor {
    fn default() -> Self {
        Self::new(PatternLibrary::canonical())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spinlist_common::config::PatternSpec;

    #[test]
    fn test_empty_transcript_rejected() {
        let extractor = MentionExtractor::default();
        assert_eq!(
            extractor.extract(&Transcript::new("   \n\t ")),
            Err(ExtractionError::EmptyTranscript)
        );
        assert_eq!(
            extractor.extract(&Transcript::new("")),
            Err(ExtractionError::EmptyTranscript)
        );
    }

    #[test]
    fn test_no_matches_is_empty_not_error() {
        let extractor = MentionExtractor::default();
        let result = extractor.extract(&Transcript::new("nothing musical here at all"));
        assert_eq!(result, Ok(Vec::new()));
    }

    #[test]
    fn test_candidates_sorted_by_offset() {
        let extractor = MentionExtractor::default();
        let text = "we heard Creep by Radiohead. Before that, Bonobo - Kerala.";
        let candidates = extractor.extract(&Transcript::new(text)).unwrap();

        let offsets: Vec<usize> = candidates.iter().map(|c| c.offset).collect();
        let mut sorted = offsets.clone();
        sorted.sort();
        assert_eq!(offsets, sorted);

        assert!(candidates
            .iter()
            .any(|c| c.pattern_id == "bare-by" && c.title_raw == "Creep"));
        assert!(candidates
            .iter()
            .any(|c| c.pattern_id == "dash-separated" && c.artist_raw == "Bonobo"));
    }

    #[test]
    fn test_overlapping_rules_all_retained() {
        let extractor = MentionExtractor::default();
        let candidates = extractor
            .extract(&Transcript::new("He plays 'Creep' by Radiohead around the 10 minute mark"))
            .unwrap();

        let ids: Vec<&str> = candidates.iter().map(|c| c.pattern_id.as_str()).collect();
        assert!(ids.contains(&"quoted-by"));
        assert!(ids.contains(&"bare-by"));
    }

    #[test]
    fn test_spans_point_into_text() {
        let extractor = MentionExtractor::default();
        let text = r#"Tonight's pick is "Kerala" by Bonobo"#;
        let candidates = extractor.extract(&Transcript::new(text)).unwrap();
        let quoted = candidates
            .iter()
            .find(|c| c.pattern_id == "quoted-by")
            .unwrap();

        assert_eq!(&text[quoted.artist_span.clone()], "Bonobo");
        assert_eq!(&text[quoted.title_span.clone()], "Kerala");
        assert_eq!(quoted.offset, text.find('"').unwrap());
        assert_eq!(quoted.base_weight, 0.9);
    }

    fn mentions(text: &str) -> Vec<(String, String, String)> {
        MentionExtractor::default()
            .extract(&Transcript::new(text))
            .unwrap()
            .into_iter()
            .map(|c| (c.artist_raw, c.title_raw, c.pattern_id))
            .collect()
    }

    fn mention(artist: &str, title: &str, pattern_id: &str) -> (String, String, String) {
        (artist.to_string(), title.to_string(), pattern_id.to_string())
    }

    #[test]
    fn test_sentence_opener_not_part_of_artist() {
        let text = "Tonight Radiohead - Creep.";
        let candidates = MentionExtractor::default()
            .extract(&Transcript::new(text))
            .unwrap();

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].artist_raw, "Radiohead");
        assert_eq!(&text[candidates[0].artist_span.clone()], "Radiohead");
        assert_eq!(candidates[0].offset, text.find("Radiohead").unwrap());
    }

    #[test]
    fn test_opener_and_bare_by_share_identity() {
        assert_eq!(
            mentions("Then Radiohead - Creep, and later Creep by Radiohead."),
            vec![
                mention("Radiohead", "Creep", "dash-separated"),
                mention("Radiohead", "Creep", "bare-by"),
            ]
        );
    }

    #[test]
    fn test_opener_before_possessive_and_bare_by() {
        assert_eq!(
            mentions("So Radiohead's Karma Police."),
            vec![mention("Radiohead", "Karma Police", "possessive")]
        );
        assert_eq!(
            mentions("Next Creep by Radiohead."),
            vec![mention("Radiohead", "Creep", "bare-by")]
        );
    }

    #[test]
    fn test_contraction_is_not_possessive() {
        assert_eq!(
            mentions("David Bowie - Let's Dance is next."),
            vec![mention("David Bowie", "Let's Dance", "dash-separated")]
        );
        assert!(mentions("It's Showtime again").is_empty());
        assert!(mentions("Tonight's Playlist is short").is_empty());
    }

    #[test]
    fn test_ties_keep_declaration_order() {
        let specs = vec![
            PatternSpec {
                id: "first".into(),
                pattern: r"(?P<artist>Alpha) (?P<title>Beta)".into(),
                base_weight: 0.5,
            },
            PatternSpec {
                id: "second".into(),
                pattern: r"(?P<artist>Alpha) (?P<title>Beta)".into(),
                base_weight: 0.6,
            },
        ];
        let extractor = MentionExtractor::new(PatternLibrary::from_specs(&specs).unwrap());
        let candidates = extractor.extract(&Transcript::new("Alpha Beta")).unwrap();

        let ids: Vec<&str> = candidates.iter().map(|c| c.pattern_id.as_str()).collect();
        assert_eq!(ids, vec!["first", "second"]);
    }
}
