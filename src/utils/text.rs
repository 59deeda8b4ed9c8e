//! Naming and text helpers for generated artifacts.

use std::sync::OnceLock;

use regex::Regex;

/// Maximum length of a chapter slug.
pub const MAX_SLUG_LEN: usize = 40;

/// Two-digit chapter prefix used in artifact names (`7` becomes `07`).
pub fn pad(number: u32) -> String {
    format!("{:02}", number)
}

/// Lowercases `text`, replaces every non-alphanumeric run with `-`, trims the
/// dashes at both ends and truncates to [`MAX_SLUG_LEN`] characters.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;
    for ch in text.to_lowercase().chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch);
        } else {
            pending_dash = true;
        }
    }
    let truncated: String = slug.chars().take(MAX_SLUG_LEN).collect();
    truncated.trim_end_matches('-').to_string()
}

fn html_fence_regex() -> Option<&'static Regex> {
    static FENCE: OnceLock<Option<Regex>> = OnceLock::new();
    FENCE
        .get_or_init(|| Regex::new(r"```html\s*\n?([\s\S]*?)\n?```").ok())
        .as_ref()
}

/// Pulls an HTML document out of a model response.
///
/// Prefers an ```` ```html ```` fence, then a `<!DOCTYPE`/`<html` start up to
/// the final `</html>`, and otherwise returns the text unchanged.
pub fn extract_html(text: &str) -> String {
    if let Some(body) = html_fence_regex()
        .and_then(|re| re.captures(text))
        .and_then(|caps| caps.get(1))
    {
        return body.as_str().to_string();
    }

    let trimmed = text.trim();
    if trimmed.starts_with("<!DOCTYPE") || trimmed.starts_with("<html") {
        return trimmed.to_string();
    }

    let start = text.find("<!DOCTYPE").or_else(|| text.find("<html"));
    match start {
        Some(begin) => match text.rfind("</html>") {
            Some(end) if end >= begin => text[begin..end + "</html>".len()].to_string(),
            _ => text[begin..].to_string(),
        },
        None => text.to_string(),
    }
}

/// Returns at most `max` characters of `text`.
pub fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
