//! Pattern Library
//!
//! Ordered table of text-matching rules. Each rule is plain data, an id, a
//! regular expression with named groups `artist` and `title` (optionally
//! `album`) and a base weight, so new mention formats are added by
//! appending a [`PatternSpec`] rather than touching the extractor.
//!
//! # Built-in Rules
//!
//! | id | shape | base weight |
//! |---|---|---|
//! | `quoted-by` | `"<title>" by <artist>` | 0.90 |
//! | `dash-separated` | `<artist> - <title>` | 0.70 |
//! | `possessive` | `<artist>'s <title>` | 0.60 |
//! | `labeled` | `artist "<artist>" song "<title>"` | 0.95 |
//! | `bare-by` | `<Title> by <Artist>` | 0.50 |
//!
//! Unquoted fields are recognised as runs of capitalized words, optionally
//! joined by short lowercase connectors ("Florence and the Machine").
//! Capitalization alone cannot tell a sentence opener from a name, so a
//! run that opens a match is narrowed past words like "Then" or "Tonight"
//! (see [`skip_sentence_openers`]), and a contraction such as "Let's" is
//! never read as a possessive.

use crate::error::PatternError;
use regex::Regex;
use spinlist_common::config::PatternSpec;
use std::collections::HashSet;

/// Capitalized word; internal dots only when followed by a letter (R.E.M)
const CAP_WORD: &str = r"[\p{Lu}\d](?:[\p{L}\p{N}&-]|\.[\p{L}\p{N}])*";

/// Capitalized word that may contain apostrophes (Don't, Rock'n'Roll)
const CAP_WORD_APOS: &str = r"[\p{Lu}\d](?:[\p{L}\p{N}&'’-]|\.[\p{L}\p{N}])*";

const ARTIST_CONNECTOR: &str = r"(?:the|and|of|a|&)";

const TITLE_CONNECTOR: &str =
    r"(?:the|a|an|and|of|in|on|to|my|me|you|your|is|it|for|with|at|&)";

/// Quoted free text, excluding double quotes and newlines
const QUOTED_TEXT: &str = r#"[^\s"“”][^"“”\n]{0,99}?"#;

/// Lowercased words that open a sentence rather than name an artist or title
const SENTENCE_OPENERS: &[&str] = &[
    "after", "also", "and", "anyway", "because", "before", "but", "finally", "first", "here",
    "later", "meanwhile", "next", "now", "or", "plus", "so", "then", "today", "tonight", "well",
    "yeah",
];

/// Lowercased words whose `'s` is a contraction ("Let's", "It's"), not a possessive
const CONTRACTION_STEMS: &[&str] = &[
    "he", "here", "how", "it", "let", "she", "that", "there", "what", "when", "where", "who",
];

/// Byte offset where an unquoted run really starts, past leading sentence openers
///
/// Connectors left dangling after an opener ("And the ...") are skipped too.
/// Returns `None` when nothing else remains.
pub fn skip_sentence_openers(run: &str) -> Option<usize> {
    let mut rest = run.trim_start();
    let mut skipped = false;

    loop {
        let word_end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        let word = &rest[..word_end];
        let opener = SENTENCE_OPENERS.contains(&word.to_lowercase().as_str());
        let capitalized = word
            .chars()
            .next()
            .map_or(false, |c| c.is_uppercase() || c.is_numeric());

        if !opener && (capitalized || !skipped) {
            return Some(run.len() - rest.len());
        }
        if word_end == rest.len() {
            return None;
        }

        skipped = true;
        rest = rest[word_end..].trim_start();
    }
}

/// Whether `word` followed by `'s` is a contraction rather than a possessive
pub fn is_contraction_stem(word: &str) -> bool {
    CONTRACTION_STEMS.contains(&word.to_lowercase().as_str())
}

fn artist_run() -> String {
    format!(
        r"{word}(?:(?:[ \t]+{conn})*[ \t]+{word}){{0,5}}",
        word = CAP_WORD,
        conn = ARTIST_CONNECTOR
    )
}

fn title_run() -> String {
    format!(
        r"{word}(?:(?:[ \t]+{conn})*[ \t]+{word}){{0,7}}",
        word = CAP_WORD_APOS,
        conn = TITLE_CONNECTOR
    )
}

/// Built-in rule table, in declaration order
pub fn canonical_specs() -> Vec<PatternSpec> {
    let artist = artist_run();
    let title = title_run();

    vec![
        PatternSpec {
            id: "quoted-by".to_string(),
            pattern: format!(
                r#"\B["“'‘](?P<title>{quoted})["”'’][ \t]+(?i:by)[ \t]+(?P<artist>{artist})(?:[ \t]+(?:from|off)[ \t]+(?:the[ \t]+album[ \t]+)?["“](?P<album>[^"“”\n]{{1,100}})["”])?"#,
                quoted = QUOTED_TEXT,
                artist = artist,
            ),
            base_weight: 0.9,
        },
        PatternSpec {
            id: "dash-separated".to_string(),
            pattern: format!(
                r#"(?P<artist>{artist})\.?[ \t]+[-–—][ \t]+["“]?(?P<title>{title})"#,
                artist = artist,
                title = title,
            ),
            base_weight: 0.7,
        },
        PatternSpec {
            id: "possessive".to_string(),
            pattern: format!(
                r#"(?P<artist>{artist})['’]s[ \t]+["“]?(?P<title>{title})"#,
                artist = artist,
                title = title,
            ),
            base_weight: 0.6,
        },
        PatternSpec {
            id: "labeled".to_string(),
            pattern: format!(
                r#"(?i:artist)[: \t]+["“](?P<artist>{quoted})["”][,;]?[ \t]+(?:and[ \t]+)?(?i:song|track)[: \t]+["“](?P<title>{quoted})["”](?:[,;]?[ \t]+(?:and[ \t]+)?(?i:album)[: \t]+["“](?P<album>{quoted})["”])?"#,
                quoted = QUOTED_TEXT,
            ),
            base_weight: 0.95,
        },
        PatternSpec {
            id: "bare-by".to_string(),
            pattern: format!(
                r#"(?P<title>{title})[ \t]+by[ \t]+(?P<artist>{artist})"#,
                title = title,
                artist = artist,
            ),
            base_weight: 0.5,
        },
    ]
}

/// Compiled rule
#[derive(Debug, Clone)]
pub struct PatternRule {
    id: String,
    regex: Regex,
    base_weight: f32,
}

impl PatternRule {
    /// Compile and validate a rule declaration
    pub fn compile(spec: &PatternSpec) -> Result<Self, PatternError> {
        if !(spec.base_weight > 0.0 && spec.base_weight <= 1.0) {
            return Err(PatternError::InvalidWeight {
                id: spec.id.clone(),
                weight: spec.base_weight,
            });
        }

        let regex = Regex::new(&spec.pattern).map_err(|source| PatternError::InvalidRegex {
            id: spec.id.clone(),
            source,
        })?;

        for group in ["artist", "title"] {
            if !regex.capture_names().flatten().any(|name| name == group) {
                return Err(PatternError::MissingGroup {
                    id: spec.id.clone(),
                    group,
                });
            }
        }

        Ok(Self {
            id: spec.id.clone(),
            regex,
            base_weight: spec.base_weight,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn regex(&self) -> &Regex {
        &self.regex
    }

    pub fn base_weight(&self) -> f32 {
        self.base_weight
    }
}

/// Ordered, immutable set of compiled rules
#[derive(Debug, Clone)]
pub struct PatternLibrary {
    rules: Vec<PatternRule>,
}

impl PatternLibrary {
    /// Compile rules in the given order
    pub fn from_specs(specs: &[PatternSpec]) -> Result<Self, PatternError> {
        let mut seen = HashSet::new();
        let mut rules = Vec::with_capacity(specs.len());

        for spec in specs {
            if !seen.insert(spec.id.as_str()) {
                return Err(PatternError::DuplicateId(spec.id.clone()));
            }
            rules.push(PatternRule::compile(spec)?);
        }

        tracing::debug!(rules = rules.len(), "Pattern library compiled");
        Ok(Self { rules })
    }

    /// Built-in rules followed by `extra`
    pub fn with_extra(extra: &[PatternSpec]) -> Result<Self, PatternError> {
        let mut specs = canonical_specs();
        specs.extend_from_slice(extra);
        Self::from_specs(&specs)
    }

    /// Built-in rules only
    pub fn canonical() -> Self {
        Self::from_specs(&canonical_specs()).expect("built-in pattern table must compile")
    }

    pub fn rules(&self) -> &[PatternRule] {
        &self.rules
    }
}

impl Default for PatternLibrary {
    fn default() -> Self {
        Self::canonical()
    }
}
