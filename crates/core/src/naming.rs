//! Filename hygiene for user-supplied upload names.

use std::path::Path;

/// Longest sanitized name kept; longer names are truncated from the front
/// so the extension survives.
const MAX_NAME_LEN: usize = 120;

/// Reduce a client-supplied filename to something safe to embed in a
/// storage path.
///
/// Strips any directory components, replaces characters outside
/// `[A-Za-z0-9._-]` with `_`, and caps the length at 120 characters.
/// An empty or unusable input becomes `"unnamed"`.
pub fn sanitize_file_name(name: &str) -> String {
    let base = Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");

    let mut cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    // Dot-only names ("." / "..") are path syntax, not names.
    if cleaned.chars().all(|c| c == '.') {
        cleaned.clear();
    }

    if cleaned.is_empty() {
        return "unnamed".to_string();
    }

    if cleaned.len() > MAX_NAME_LEN {
        cleaned = cleaned[cleaned.len() - MAX_NAME_LEN..].to_string();
    }

    cleaned
}
