//! String normalization for identity keys and fuzzy matching

/// Quote characters recognised around transcript fields
pub const QUOTE_CHARS: &[char] = &['"', '\'', '“', '”', '‘', '’', '«', '»'];

fn is_edge_noise(c: char) -> bool {
    c.is_whitespace() || c.is_ascii_punctuation() || QUOTE_CHARS.contains(&c) || c == '…'
}

/// Collapse internal whitespace and strip leading/trailing punctuation, keeping case
///
/// Idempotent: `clean_field(clean_field(s)) == clean_field(s)`.
pub fn clean_field(s: &str) -> String {
    s.trim_matches(is_edge_noise)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Case-folded cleaned field, used as the deduplication identity
pub fn identity_key(s: &str) -> String {
    clean_field(s).to_lowercase()
}

/// Aggressive key for fuzzy comparison against catalog metadata
///
/// Drops bracketed suffixes such as "(Remastered 2009)" when something
/// remains outside them, and folds internal punctuation to spaces.
pub fn matching_key(s: &str) -> String {
    let lowered = identity_key(s);
    let unbracketed = strip_brackets(&lowered);
    let base = if unbracketed.trim().is_empty() {
        lowered.as_str()
    } else {
        unbracketed.as_str()
    };

    base.chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn strip_brackets(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut depth = 0usize;
    for c in s.chars() {
        match c {
            '(' | '[' => depth += 1,
            ')' | ']' => depth = depth.saturating_sub(1),
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out
}
