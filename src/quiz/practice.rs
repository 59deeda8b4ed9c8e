//! Answer-length balancing for the Markdown practice quiz.
//!
//! The practice quiz is stored as Markdown: numbered bold question stems,
//! lettered options with the correct answer always as option `a`, and
//! blocks separated by `---` lines. Blocks are parsed into questions for the
//! shared length audit, and any rewritten distractors are spliced back into
//! the original text in place, leaving every other byte untouched.

use std::ops::Range;
use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, info};

use super::balance::{audit_answer_lengths, merge_rewrites, request_rewrites};
use crate::course::{Distractor, QuizQuestion};
use crate::llm::{GenerativeService, RetryPolicy};

/// One question parsed from a practice quiz.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PracticeQuestion {
    /// Number printed before the stem.
    pub number: u32,
    pub question: String,
    /// Text of option `a`.
    pub correct_answer: String,
    /// Texts of options `b` to `d`, in letter order.
    pub distractors: Vec<String>,
    /// Byte ranges of the distractor texts in the source Markdown.
    distractor_spans: Vec<Range<usize>>,
}

impl PracticeQuestion {
    fn to_quiz_question(&self) -> QuizQuestion {
        QuizQuestion {
            question: self.question.clone(),
            correct_answer: self.correct_answer.clone(),
            correct_feedback: String::new(),
            distractors: self
                .distractors
                .iter()
                .map(|text| Distractor {
                    text: text.clone(),
                    feedback: String::new(),
                })
                .collect(),
        }
    }
}

fn separator_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^[ \t]*---[ \t]*\r?$").ok()).as_ref()
}

fn stem_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^[ \t]*(\d+)\.[ \t]*\*\*(.+?)\*\*").ok())
        .as_ref()
}

fn option_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^[ \t]*([a-d])[.)][ \t]+(\S.*?)[ \t]*\r?$").ok())
        .as_ref()
}

/// Byte ranges of the blocks between separator lines.
fn block_ranges(markdown: &str) -> Vec<Range<usize>> {
    let mut ranges = Vec::new();
    let mut start = 0;
    if let Some(separator) = separator_regex() {
        for found in separator.find_iter(markdown) {
            ranges.push(start..found.start());
            start = found.end();
        }
    }
    ranges.push(start..markdown.len());
    ranges
}

fn parse_block(markdown: &str, range: Range<usize>) -> Option<PracticeQuestion> {
    let block = &markdown[range.clone()];
    let stem = stem_regex()?.captures(block)?;
    let number = stem.get(1)?.as_str().parse().ok()?;
    let question = stem.get(2)?.as_str().trim().to_string();

    let mut options: Vec<(char, Range<usize>)> = Vec::new();
    for caps in option_regex()?.captures_iter(&block[stem.get(0)?.end()..]) {
        let letter = caps.get(1)?.as_str().chars().next()?;
        if options.iter().any(|(seen, _)| *seen == letter) {
            continue;
        }
        let text = caps.get(2)?;
        let offset = range.start + stem.get(0)?.end();
        options.push((letter, offset + text.start()..offset + text.end()));
    }
    options.sort_by_key(|(letter, _)| *letter);

    let (first, correct_span) = options.first()?.clone();
    if first != 'a' || options.len() < 2 {
        return None;
    }
    let distractor_spans: Vec<Range<usize>> = options[1..].iter().map(|(_, span)| span.clone()).collect();

    Some(PracticeQuestion {
        number,
        question,
        correct_answer: markdown[correct_span].to_string(),
        distractors: distractor_spans.iter().map(|span| markdown[span.clone()].to_string()).collect(),
        distractor_spans,
    })
}

/// Parses every well-formed question block. Blocks without a numbered
/// bold stem or without an option `a` and at least one distractor are
/// skipped.
pub fn parse_practice_quiz(markdown: &str) -> Vec<PracticeQuestion> {
    block_ranges(markdown)
        .into_iter()
        .filter_map(|range| parse_block(markdown, range))
        .collect()
}

/// Writes changed distractor texts over their original spans.
fn splice_distractors(markdown: &str, parsed: &[PracticeQuestion], merged: &[QuizQuestion]) -> String {
    let mut edits: Vec<(Range<usize>, String)> = Vec::new();
    for (question, balanced) in parsed.iter().zip(merged) {
        for (span, distractor) in question.distractor_spans.iter().zip(&balanced.distractors) {
            if markdown[span.clone()] != distractor.text {
                let single_line = distractor.text.split_whitespace().collect::<Vec<_>>().join(" ");
                edits.push((span.clone(), single_line));
            }
        }
    }
    edits.sort_by_key(|(span, _)| span.start);

    let mut out = String::with_capacity(markdown.len());
    let mut cursor = 0;
    for (span, text) in edits {
        out.push_str(&markdown[cursor..span.start]);
        out.push_str(&text);
        cursor = span.end;
    }
    out.push_str(&markdown[cursor..]);
    out
}

/// Audits the practice quiz and asks the service to lengthen distractors
/// of the flagged questions. Any failure returns `markdown` unchanged.
pub async fn rebalance_practice_quiz(
    service: &dyn GenerativeService,
    model: &str,
    policy: &RetryPolicy,
    label: &str,
    markdown: &str,
) -> String {
    let parsed = parse_practice_quiz(markdown);
    let questions: Vec<QuizQuestion> = parsed.iter().map(PracticeQuestion::to_quiz_question).collect();
    let audit = audit_answer_lengths(&questions);
    if audit.is_balanced() {
        debug!(label = %label, questions = parsed.len(), "Practice quiz lengths balanced");
        return markdown.to_string();
    }

    match request_rewrites(service, model, policy, label, &questions, &audit.flagged).await {
        Some(rewrites) => {
            info!(label = %label, flagged = audit.flagged.len(), "Rebalanced practice quiz distractors");
            let merged = merge_rewrites(questions, &audit.flagged, rewrites);
            splice_distractors(markdown, &parsed, &merged)
        }
        None => markdown.to_string(),
    }
}
