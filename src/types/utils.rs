//! Shared utility functions.

use std::fmt::Display;

// =============================================================================
// String Utilities
// =============================================================================

/// Lowercase alphanumeric slug with single dashes, used as checkpoint key prefix.
///
/// Falls back to `"project"` when nothing alphanumeric remains.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;

    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }

    if slug.is_empty() {
        "project".to_string()
    } else {
        slug
    }
}

/// Truncate to at most `max` characters on a char boundary, appending `...` when cut.
pub fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let cut: String = s.chars().take(max).collect();
    format!("{}...", cut)
}

// =============================================================================
// Result Helpers
// =============================================================================

/// Filter a Result, logging the error at warn level before discarding.
///
/// # Example
/// ```ignore
/// let entries: Vec<_> = results
///     .filter_map(|r| log_filter_warn(r, "reading checkpoint"))
///     .collect();
/// ```
pub fn log_filter_warn<T, E: Display>(result: Result<T, E>, context: &str) -> Option<T> {
    match result {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::warn!("{}: {}", context, e);
            None
        }
    }
}
