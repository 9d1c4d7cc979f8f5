use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{QueryError, Result};

/// Very simple identifier guard: letters, digits, underscore only.
pub fn validate_ident(ident: &str) -> Result<()> {
    static SEG: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").expect("identifier pattern"));
    if ident.is_empty() {
        return Err(QueryError::InvalidIdentifier("empty".to_string()));
    }
    if !SEG.is_match(ident) {
        return Err(QueryError::InvalidIdentifier(format!("`{ident}`")));
    }
    Ok(())
}

/// Dotted path guard: every segment must be a valid identifier.
pub fn validate_path(path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(QueryError::InvalidIdentifier("empty path".to_string()));
    }
    for part in path.split('.') {
        if part.is_empty() {
            return Err(QueryError::InvalidIdentifier(format!(
                "empty segment in `{path}`"
            )));
        }
        validate_ident(part)?;
    }
    Ok(())
}

/// Case-insensitive ASCII substring search returning the byte offset.
pub fn index_of_ignore_case(haystack: &str, needle: &str) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    let hay = haystack.as_bytes();
    let needle = needle.as_bytes();
    if needle.len() > hay.len() {
        return None;
    }
    (0..=hay.len() - needle.len()).find(|&i| hay[i..i + needle.len()].eq_ignore_ascii_case(needle))
}
