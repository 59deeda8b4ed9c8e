//! Tolerant JSON parsing for model responses.
//!
//! Generative models reliably produce "almost JSON": the value is wrapped in
//! prose or a fenced code block, arrays end with a trailing comma, and string
//! values contain unescaped inner quotes. [`parse_json`] targets exactly that
//! defect distribution instead of attempting general auto-correction:
//!
//! 1. Strip an enclosing fenced code block if present
//! 2. Keep the span from the first opening character to the last closing one
//! 3. Remove trailing commas before `]` or `}`
//! 4. Parse; on failure, escape the unescaped quote the parser tripped on and
//!    retry, up to [`MAX_REPAIR_ATTEMPTS`] times
//!
//! If the value still does not parse, the last `serde_json` error is returned
//! unmodified.
//!
//! # Example
//!
//! ```
//! use course_forge::utils::json_extraction::{parse_json, Wrap};
//!
//! let response = "Here's the result:\n```json\n[{\"a\":1},]\n```";
//! let value = parse_json(response, Wrap::Array).unwrap();
//! assert_eq!(value, serde_json::json!([{"a": 1}]));
//! ```

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::error::ParseError;

/// Maximum number of quote repairs attempted before giving up.
pub const MAX_REPAIR_ATTEMPTS: usize = 10;

/// The outermost JSON container expected in a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wrap {
    /// A top-level `[...]` array.
    Array,
    /// A top-level `{...}` object.
    Object,
}

impl Wrap {
    /// Opening character of the container.
    pub fn open(self) -> char {
        match self {
            Wrap::Array => '[',
            Wrap::Object => '{',
        }
    }

    /// Closing character of the container.
    pub fn close(self) -> char {
        match self {
            Wrap::Array => ']',
            Wrap::Object => '}',
        }
    }
}

fn fence_regex() -> Option<&'static Regex> {
    static FENCE: OnceLock<Option<Regex>> = OnceLock::new();
    FENCE
        .get_or_init(|| Regex::new(r"```(?:json)?\s*\n?([\s\S]*?)\n?```").ok())
        .as_ref()
}

fn trailing_comma_regex() -> Option<&'static Regex> {
    static TRAILING: OnceLock<Option<Regex>> = OnceLock::new();
    TRAILING
        .get_or_init(|| Regex::new(r",\s*([}\]])").ok())
        .as_ref()
}

/// Returns the content of the first fenced code block, or the input itself.
pub fn strip_code_fence(text: &str) -> &str {
    fence_regex()
        .and_then(|re| re.captures(text))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .unwrap_or(text)
}

/// Narrows `text` to the span between the first `wrap` opener and the last
/// matching closer. Text without both characters is returned unchanged.
pub fn isolate_json(text: &str, wrap: Wrap) -> &str {
    let body = strip_code_fence(text);
    match (body.find(wrap.open()), body.rfind(wrap.close())) {
        (Some(first), Some(last)) if first <= last => &body[first..=last],
        _ => body,
    }
}

/// Removes commas that directly precede a closing bracket or brace.
pub fn strip_trailing_commas(json: &str) -> String {
    match trailing_comma_regex() {
        Some(re) => re.replace_all(json, "$1").into_owned(),
        None => json.to_string(),
    }
}

/// Parses a JSON value out of a model response, repairing unescaped quotes.
///
/// # Errors
///
/// Returns [`ParseError::Invalid`] carrying the final `serde_json` error when
/// the value cannot be parsed after [`MAX_REPAIR_ATTEMPTS`] repairs, or as
/// soon as the failure is not a repairable quote.
pub fn parse_json(text: &str, wrap: Wrap) -> Result<Value, ParseError> {
    let mut candidate = strip_trailing_commas(isolate_json(text, wrap));

    for attempt in 0..MAX_REPAIR_ATTEMPTS {
        match serde_json::from_str::<Value>(&candidate) {
            Ok(value) => {
                if attempt > 0 {
                    debug!(repairs = attempt, "Parsed JSON after quote repair");
                }
                return Ok(value);
            }
            Err(err) => match locate_unescaped_quote(&candidate, &err) {
                Some(pos) => candidate.insert(pos, '\\'),
                None => return Err(ParseError::Invalid(err)),
            },
        }
    }

    serde_json::from_str::<Value>(&candidate).map_err(ParseError::Invalid)
}

/// Converts a 1-based line/column pair reported by `serde_json` to a byte offset.
fn error_offset(json: &str, line: usize, column: usize) -> Option<usize> {
    if line == 0 {
        return None;
    }
    let line_start = if line == 1 {
        0
    } else {
        json.match_indices('\n').nth(line - 2).map(|(idx, _)| idx + 1)?
    };
    Some(line_start + column.saturating_sub(1))
}

/// Finds the quote that caused `err`, if it is an unescaped inner quote.
///
/// The parser either stops on the stray quote itself or on the first token
/// after a string that was closed too early; in the latter case the culprit
/// is the nearest preceding non-whitespace character.
fn locate_unescaped_quote(json: &str, err: &serde_json::Error) -> Option<usize> {
    let bytes = json.as_bytes();
    if bytes.is_empty() {
        return None;
    }
    let offset = error_offset(json, err.line(), err.column())?.min(bytes.len() - 1);

    let quote = if bytes[offset] == b'"' {
        offset
    } else {
        let mut idx = offset;
        loop {
            if idx == 0 {
                return None;
            }
            idx -= 1;
            if !bytes[idx].is_ascii_whitespace() {
                break;
            }
        }
        if bytes[idx] != b'"' {
            return None;
        }
        idx
    };

    (quote > 0 && !is_escaped(bytes, quote)).then_some(quote)
}

/// True when the byte at `pos` is preceded by an odd run of backslashes.
fn is_escaped(bytes: &[u8], pos: usize) -> bool {
    bytes[..pos]
        .iter()
        .rev()
        .take_while(|&&b| b == b'\\')
        .count()
        % 2
        == 1
}
