//! Tag derivation from display names.
//!
//! Tags are lowercase alphanumeric tokens of the name plus any standalone
//! 19xx/20xx year, deduplicated in first-seen order and capped at
//! [`MAX_TAGS`].

pub const MAX_TAGS: usize = 30;

/// Derive the tag set for a display name.
pub fn extract_tags(name: &str) -> Vec<String> {
    let base = name.to_lowercase();
    let mut tags: Vec<String> = Vec::new();

    let tokens = base
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty());
    for token in tokens.chain(year_tokens(&base)) {
        if !tags.iter().any(|t| t == token) {
            tags.push(token.to_string());
        }
    }

    tags.truncate(MAX_TAGS);
    tags
}

/// Four-digit years (19xx or 20xx) not glued to other word characters.
fn year_tokens(base: &str) -> impl Iterator<Item = &str> {
    let bytes = base.as_bytes();
    let is_word = |b: u8| b.is_ascii_alphanumeric() || b == b'_';
    (0..bytes.len().saturating_sub(3)).filter_map(move |i| {
        let window = &bytes[i..i + 4];
        let starts_century = window.starts_with(b"19") || window.starts_with(b"20");
        let all_digits = window.iter().all(u8::is_ascii_digit);
        let left_ok = i == 0 || !is_word(bytes[i - 1]);
        let right_ok = i + 4 == bytes.len() || !is_word(bytes[i + 4]);
        (starts_century && all_digits && left_ok && right_ok).then(|| &base[i..i + 4])
    })
}

/// Parse a comma-separated tag filter (`"2026, HackUTD"` → `["2026", "hackutd"]`).
pub fn parse_tag_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

/// True when every required tag is present.
pub fn has_all_tags(tags: &[String], required: &[String]) -> bool {
    required.iter().all(|r| tags.contains(r))
}
