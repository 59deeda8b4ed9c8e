//! Progressive extraction of complete records from a growing text buffer.
//!
//! While a response is still streaming, the consumer can already show the
//! scalar header fields and every record of the main array that has fully
//! closed. Records are detected by tracking brace depth from the array's
//! opening bracket (string literals are skipped), and each closed span is
//! parsed in isolation. A span that fails to parse is treated as "not yet
//! complete" and silently skipped.
//!
//! [`extract_partial`] is stateless and may be called any number of times on
//! a monotonically growing buffer. [`ProgressiveExtractor`] wraps it for
//! consumers that only want the records completed since their last call.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

/// Compiled patterns for the fields scanned in a streaming buffer.
///
/// Patterns are compiled once per field set; scanning runs on every text
/// delta of a call.
#[derive(Debug, Clone)]
pub struct RecordFields {
    title: Option<Regex>,
    overview: Option<Regex>,
    records: Option<Regex>,
}

impl RecordFields {
    /// Compiles the patterns for a title scalar, an overview scalar and an
    /// array-of-records field.
    pub fn new(title: &str, overview: &str, records: &str) -> Self {
        Self {
            title: string_field_regex(title),
            overview: string_field_regex(overview),
            records: array_anchor_regex(records),
        }
    }

    /// Field set used by syllabus responses.
    pub fn syllabus() -> Self {
        static SYLLABUS: OnceLock<RecordFields> = OnceLock::new();
        SYLLABUS
            .get_or_init(|| Self::new("courseTitle", "courseOverview", "chapters"))
            .clone()
    }
}

/// Whatever could be recovered from a partial buffer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartialExtraction {
    pub title: Option<String>,
    pub overview: Option<String>,
    /// Every record of the array that has closed and parses, in order.
    pub records: Vec<Value>,
}

/// Scans `buffer` for the header scalars and all completed records.
pub fn extract_partial(buffer: &str, fields: &RecordFields) -> PartialExtraction {
    PartialExtraction {
        title: scan_string_field(buffer, fields.title.as_ref()),
        overview: scan_string_field(buffer, fields.overview.as_ref()),
        records: completed_records(buffer, fields.records.as_ref()),
    }
}

fn string_field_regex(field: &str) -> Option<Regex> {
    Regex::new(&format!(r#""{}"\s*:\s*"((?:[^"\\]|\\.)*)""#, regex::escape(field))).ok()
}

fn array_anchor_regex(field: &str) -> Option<Regex> {
    Regex::new(&format!(r#""{}"\s*:\s*\["#, regex::escape(field))).ok()
}

/// Returns the value of a closed `"field": "..."` string, unescaped.
fn scan_string_field(buffer: &str, pattern: Option<&Regex>) -> Option<String> {
    let raw = pattern?.captures(buffer)?.get(1)?.as_str();
    Some(unescape(raw))
}

fn unescape(raw: &str) -> String {
    serde_json::from_str::<String>(&format!("\"{}\"", raw))
        .unwrap_or_else(|_| raw.replace("\\\"", "\"").replace("\\n", "\n"))
}

/// Parses every fully closed object inside the anchored array.
fn completed_records(buffer: &str, anchor: Option<&Regex>) -> Vec<Value> {
    let Some(anchor) = anchor.and_then(|re| re.find(buffer)) else {
        return Vec::new();
    };

    let body = &buffer[anchor.end()..];
    let mut records = Vec::new();
    let mut depth = 0usize;
    let mut start = None;
    let mut in_string = false;
    let mut escaped = false;

    for (idx, ch) in body.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => {
                if depth == 0 {
                    start = Some(idx);
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    if let Some(begin) = start.take() {
                        if let Ok(value @ Value::Object(_)) =
                            serde_json::from_str::<Value>(&body[begin..=idx])
                        {
                            records.push(value);
                        }
                    }
                }
            }
            ']' if depth == 0 => break,
            _ => {}
        }
    }

    records
}

/// Incremental view over [`extract_partial`] that reports each record once.
#[derive(Debug, Clone)]
pub struct ProgressiveExtractor {
    fields: RecordFields,
    emitted: usize,
}

/// Result of one [`ProgressiveExtractor::update`] call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressUpdate {
    pub title: Option<String>,
    pub overview: Option<String>,
    /// Records completed since the previous update.
    pub new_records: Vec<Value>,
    /// Total records completed so far.
    pub total_records: usize,
}

impl ProgressiveExtractor {
    pub fn new(fields: RecordFields) -> Self {
        Self { fields, emitted: 0 }
    }

    /// Number of records reported so far.
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    /// Forgets every reported record. Used when the buffer restarts from an
    /// empty response.
    pub fn reset(&mut self) {
        self.emitted = 0;
    }

    /// Re-scans `buffer` and returns only records not reported before.
    pub fn update(&mut self, buffer: &str) -> ProgressUpdate {
        let partial = extract_partial(buffer, &self.fields);
        let total = partial.records.len();
        let new_records = if total > self.emitted {
            partial.records.into_iter().skip(self.emitted).collect()
        } else {
            Vec::new()
        };
        self.emitted = self.emitted.max(total);

        ProgressUpdate {
            title: partial.title,
            overview: partial.overview,
            new_records,
            total_records: self.emitted,
        }
    }
}

impl Default for ProgressiveExtractor {
    fn default() -> Self {
        Self::new(RecordFields::syllabus())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"{
  "courseTitle": "Minds \"and\" Machines",
  "courseOverview": "An arc from perception\nto judgment.",
  "chapters": [
    {"number": 1, "title": "Seeing", "narrative": "Braces {like this} are fine"},
    {"number": 2, "title": "Judging", "narrative": "Second"}
  ]
}"#;

    #[test]
    fn test_full_buffer() {
        let partial = extract_partial(FULL, &RecordFields::syllabus());
        assert_eq!(partial.title.as_deref(), Some("Minds \"and\" Machines"));
        assert_eq!(
            partial.overview.as_deref(),
            Some("An arc from perception\nto judgment.")
        );
        assert_eq!(partial.records.len(), 2);
        assert_eq!(partial.records[0]["narrative"], "Braces {like this} are fine");
    }

    #[test]
    fn test_empty_buffer() {
        let partial = extract_partial("", &RecordFields::syllabus());
        assert_eq!(partial, PartialExtraction::default());
    }

    #[test]
    fn test_truncated_title_is_absent() {
        let partial = extract_partial(r#"{"courseTitle": "Minds and Ma"#, &RecordFields::syllabus());
        assert!(partial.title.is_none());
        assert!(partial.records.is_empty());
    }

    #[test]
    fn test_truncated_record_never_returned() {
        let cut = FULL.find("\"Judging\"").unwrap();
        let partial = extract_partial(&FULL[..cut], &RecordFields::syllabus());
        assert_eq!(partial.records.len(), 1);
        assert_eq!(partial.records[0]["title"], "Seeing");
    }

    #[test]
    fn test_every_prefix_is_a_prefix_of_the_final_records() {
        let fields = RecordFields::syllabus();
        let full = extract_partial(FULL, &fields).records;
        for end in 0..=FULL.len() {
            if !FULL.is_char_boundary(end) {
                continue;
            }
            let partial = extract_partial(&FULL[..end], &fields).records;
            assert!(partial.len() <= full.len());
            assert_eq!(&full[..partial.len()], &partial[..]);
        }
    }

    #[test]
    fn test_extractor_reports_each_record_once() {
        let mut extractor = ProgressiveExtractor::default();
        let cut = FULL.find("\"Judging\"").unwrap();

        let first = extractor.update(&FULL[..cut]);
        assert_eq!(first.new_records.len(), 1);
        assert_eq!(first.total_records, 1);

        let again = extractor.update(&FULL[..cut]);
        assert!(again.new_records.is_empty());

        let done = extractor.update(FULL);
        assert_eq!(done.new_records.len(), 1);
        assert_eq!(done.new_records[0]["title"], "Judging");
        assert_eq!(done.total_records, 2);

        assert!(extractor.update(FULL).new_records.is_empty());
        assert_eq!(extractor.emitted(), 2);
    }

    #[test]
    fn test_malformed_closed_record_is_skipped() {
        let buffer = r#"{"chapters": [{"title": oops}, {"title": "ok"}]}"#;
        let records = extract_partial(buffer, &RecordFields::syllabus()).records;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["title"], "ok");
    }

    #[test]
    fn test_field_patterns_compile_once() {
        let first = RecordFields::syllabus();
        let second = RecordFields::syllabus();
        let pattern = |fields: &RecordFields| fields.records.as_ref().map(|re| re.as_str().to_string());
        assert!(first.title.is_some() && first.overview.is_some());
        assert_eq!(pattern(&first), pattern(&second));

        let mut extractor = ProgressiveExtractor::new(first);
        for end in (0..=FULL.len()).filter(|end| FULL.is_char_boundary(*end)) {
            extractor.update(&FULL[..end]);
        }
        assert_eq!(extractor.emitted(), 2);
    }

    #[test]
    fn test_custom_field_set() {
        let fields = RecordFields::new("name", "summary", "items");
        let partial = extract_partial(
            r#"{"name": "Kit", "summary": "Two parts", "items": [{"id": 1}, {"id": 2"#,
            &fields,
        );
        assert_eq!(partial.title.as_deref(), Some("Kit"));
        assert_eq!(partial.overview.as_deref(), Some("Two parts"));
        assert_eq!(partial.records.len(), 1);
    }

    #[test]
    fn test_reset_reports_records_again() {
        let mut extractor = ProgressiveExtractor::default();
        assert_eq!(extractor.update(FULL).new_records.len(), 2);

        extractor.reset();
        let cut = FULL.find("\"Judging\"").unwrap();
        let restarted = extractor.update(&FULL[..cut]);
        assert_eq!(restarted.new_records.len(), 1);
        assert_eq!(restarted.total_records, 1);
    }
}
