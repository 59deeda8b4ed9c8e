//! Deterministic multi-version quiz generation.
//!
//! Each version reorders the questions and the options within each question
//! using a generator seeded with `version * 1000 + 42`. The same canonical
//! questions therefore always produce byte-identical versions, which keeps a
//! printed answer key valid across regenerations.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::course::QuizQuestion;

/// Number of versions produced for an in-class quiz.
pub const DEFAULT_VERSION_COUNT: usize = 5;

/// Seed of the generator for version `index`.
pub fn version_seed(index: usize) -> u64 {
    index as u64 * 1000 + 42
}

/// Version label for `index`: A, B, ... Z, then AA, AB, ...
pub fn version_label(index: usize) -> String {
    let mut label = String::new();
    let mut n = index;
    loop {
        label.insert(0, (b'A' + (n % 26) as u8) as char);
        if n < 26 {
            break;
        }
        n = n / 26 - 1;
    }
    label
}

/// Option letter for a 0-based display position.
pub fn option_letter(position: usize) -> char {
    if position < 26 {
        (b'a' + position as u8) as char
    } else {
        '?'
    }
}

/// A question as it appears in one version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionedQuestion {
    /// Index of the canonical question.
    pub original_index: usize,
    pub question: String,
    /// Option texts in display order.
    pub options: Vec<String>,
    /// Display position of the correct answer.
    pub correct_letter_index: usize,
}

impl VersionedQuestion {
    /// Letter of the correct option.
    pub fn correct_letter(&self) -> char {
        option_letter(self.correct_letter_index)
    }
}

/// One printable quiz version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizVersion {
    pub label: String,
    pub questions: Vec<VersionedQuestion>,
}

/// Builds `count` shuffled versions of `questions`.
///
/// The question order and every option list are shuffled from the same
/// generator stream, in that order.
pub fn generate_versions(questions: &[QuizQuestion], count: usize) -> Vec<QuizVersion> {
    (0..count)
        .map(|v| {
            let mut rng = ChaCha8Rng::seed_from_u64(version_seed(v));

            let mut order: Vec<usize> = (0..questions.len()).collect();
            order.shuffle(&mut rng);

            let shuffled = order
                .into_iter()
                .map(|original_index| {
                    let canonical = &questions[original_index];
                    let mut options: Vec<(&str, bool)> =
                        std::iter::once((canonical.correct_answer.as_str(), true))
                            .chain(canonical.distractors.iter().map(|d| (d.text.as_str(), false)))
                            .collect();
                    options.shuffle(&mut rng);

                    let correct_letter_index = options
                        .iter()
                        .position(|(_, correct)| *correct)
                        .unwrap_or(0);

                    VersionedQuestion {
                        original_index,
                        question: canonical.question.clone(),
                        options: options.into_iter().map(|(text, _)| text.to_string()).collect(),
                        correct_letter_index,
                    }
                })
                .collect();

            QuizVersion {
                label: version_label(v),
                questions: shuffled,
            }
        })
        .collect()
}

/// Where one canonical question landed in one version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEntry {
    pub version: String,
    /// 1-based question number in that version.
    pub position: usize,
    pub letter: char,
}

/// Answer-key row for one canonical question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyRow {
    pub original_index: usize,
    pub entries: Vec<KeyEntry>,
}

/// Cross-reference from canonical questions to their place in every version.
pub fn answer_key(question_count: usize, versions: &[QuizVersion]) -> Vec<KeyRow> {
    (0..question_count)
        .map(|original_index| KeyRow {
            original_index,
            entries: versions
                .iter()
                .filter_map(|version| {
                    version
                        .questions
                        .iter()
                        .position(|q| q.original_index == original_index)
                        .map(|pos| KeyEntry {
                            version: version.label.clone(),
                            position: pos + 1,
                            letter: version.questions[pos].correct_letter(),
                        })
                })
                .collect(),
        })
        .collect()
}

/// A complete version set as checkpointed for a chapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionSet {
    pub versions: Vec<QuizVersion>,
    pub answer_key: Vec<KeyRow>,
}

impl VersionSet {
    /// Generates versions and their answer key.
    pub fn build(questions: &[QuizQuestion], count: usize) -> Self {
        let versions = generate_versions(questions, count);
        let answer_key = answer_key(questions.len(), &versions);
        Self { versions, answer_key }
    }
}
