//! Text processing utilities.

/// Byte length of `c` once escaped inside a JSON string literal, matching
/// `serde_json`'s compact encoding.
pub fn json_escaped_len(c: char) -> usize {
    match c {
        '"' | '\\' | '\u{08}' | '\u{0c}' | '\n' | '\r' | '\t' => 2,
        '\u{00}'..='\u{1f}' => 6,
        _ => c.len_utf8(),
    }
}

/// Byte length of `s` serialized as a JSON string, quotes included.
pub fn json_string_len(s: &str) -> usize {
    2 + s.chars().map(json_escaped_len).sum::<usize>()
}

/// Return the first `max_chars` characters of `s`.
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
