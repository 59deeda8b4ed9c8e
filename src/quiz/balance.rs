//! Answer-length audit for multiple-choice questions.
//!
//! Test-wise learners pick the longest option. When the correct answer is
//! the strictly longest option in noticeably more than a quarter of the
//! questions, a seeded subset of the excess is sent back to the service to
//! lengthen distractors.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::course::QuizQuestion;
use crate::llm::{stream_with_retry, GenerationRequest, GenerativeService, RetryPolicy, ThinkingEffort};
use crate::prompts;
use crate::utils::json_extraction::{parse_json, Wrap};

/// Sets this small are never flagged.
pub const MIN_AUDITED_QUESTIONS: usize = 5;

/// Share of questions where the correct answer may be the longest option.
pub const EXPECTED_LONGEST_SHARE: f64 = 0.25;

const AUDIT_SEED: u64 = 42;

/// Outcome of [`audit_answer_lengths`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LengthAudit {
    /// Indices of the questions selected for rebalancing.
    pub flagged: Vec<usize>,
    /// How many questions exceed the expected share.
    pub excess: usize,
}

impl LengthAudit {
    pub fn is_balanced(&self) -> bool {
        self.excess == 0
    }
}

fn correct_is_longest(question: &QuizQuestion) -> bool {
    let correct = question.correct_answer.chars().count();
    let longest_distractor = question
        .distractors
        .iter()
        .map(|d| d.text.chars().count())
        .max()
        .unwrap_or(0);
    correct > longest_distractor
}

/// Flags questions whose correct answer is strictly the longest option.
///
/// Only the excess over `round(n * 0.25)` is selected, chosen by a seeded
/// shuffle so repeated audits of the same set agree.
pub fn audit_answer_lengths(questions: &[QuizQuestion]) -> LengthAudit {
    if questions.len() < MIN_AUDITED_QUESTIONS {
        return LengthAudit::default();
    }

    let mut longest: Vec<usize> = questions
        .iter()
        .enumerate()
        .filter(|(_, q)| correct_is_longest(q))
        .map(|(idx, _)| idx)
        .collect();

    let expected = (questions.len() as f64 * EXPECTED_LONGEST_SHARE).round() as usize;
    let excess = longest.len().saturating_sub(expected);
    if excess == 0 {
        return LengthAudit::default();
    }

    let mut rng = ChaCha8Rng::seed_from_u64(AUDIT_SEED);
    longest.shuffle(&mut rng);
    longest.truncate(excess);
    longest.sort_unstable();

    LengthAudit {
        flagged: longest,
        excess,
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RewriteInput<'a> {
    id: usize,
    question: &'a str,
    correct_answer: &'a str,
    distractors: Vec<&'a str>,
}

#[derive(Debug, Deserialize)]
pub(super) struct RewriteOutput {
    pub(super) id: usize,
    #[serde(default)]
    pub(super) distractors: Vec<String>,
}

/// Merges replacement distractor texts into `questions`.
///
/// A replacement is applied only to a flagged question and only when it
/// carries exactly as many distractors as the original; empty texts keep the
/// original distractor.
pub(super) fn merge_rewrites(
    mut questions: Vec<QuizQuestion>,
    flagged: &[usize],
    rewrites: Vec<RewriteOutput>,
) -> Vec<QuizQuestion> {
    for rewrite in rewrites {
        if !flagged.contains(&rewrite.id) {
            continue;
        }
        let Some(question) = questions.get_mut(rewrite.id) else {
            continue;
        };
        if rewrite.distractors.len() != question.distractors.len() {
            debug!(question = rewrite.id, "Skipping malformed distractor rewrite");
            continue;
        }
        for (distractor, text) in question.distractors.iter_mut().zip(rewrite.distractors) {
            if !text.trim().is_empty() {
                distractor.text = text;
            }
        }
    }
    questions
}

/// Sends the flagged questions to the service and parses its rewrites.
/// Returns `None` when the call or its response fails.
pub(super) async fn request_rewrites(
    service: &dyn GenerativeService,
    model: &str,
    policy: &RetryPolicy,
    label: &str,
    questions: &[QuizQuestion],
    flagged: &[usize],
) -> Option<Vec<RewriteOutput>> {
    let inputs: Vec<RewriteInput<'_>> = flagged
        .iter()
        .filter_map(|&idx| questions.get(idx).map(|q| (idx, q)))
        .map(|(idx, q)| RewriteInput {
            id: idx,
            question: &q.question,
            correct_answer: &q.correct_answer,
            distractors: q.distractors.iter().map(|d| d.text.as_str()).collect(),
        })
        .collect();

    let payload = match serde_json::to_string_pretty(&inputs) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(label = %label, error = %e, "Could not encode rebalance request");
            return None;
        }
    };

    let request =
        GenerationRequest::new(format!("{}-rebalance", label), model, prompts::REBALANCE_SYSTEM)
            .with_user_message(payload)
            .with_thinking(ThinkingEffort::Low)
            .with_max_tokens(4_000);

    match stream_with_retry(service, &request, None, policy).await {
        Ok(text) => parse_json(&text, Wrap::Array)
            .ok()
            .and_then(|value| serde_json::from_value::<Vec<RewriteOutput>>(value).ok()),
        Err(e) => {
            warn!(label = %label, error = %e, "Distractor rebalance call failed");
            None
        }
    }
}

/// Audits `questions` and asks the service to lengthen distractors of the
/// flagged ones. Any failure returns the questions unchanged.
pub async fn rebalance_distractors(
    service: &dyn GenerativeService,
    model: &str,
    policy: &RetryPolicy,
    label: &str,
    questions: Vec<QuizQuestion>,
) -> Vec<QuizQuestion> {
    let audit = audit_answer_lengths(&questions);
    if audit.is_balanced() {
        return questions;
    }

    match request_rewrites(service, model, policy, label, &questions, &audit.flagged).await {
        Some(rewrites) => {
            info!(label = %label, flagged = audit.flagged.len(), "Rebalanced distractor lengths");
            merge_rewrites(questions, &audit.flagged, rewrites)
        }
        None => questions,
    }
}
