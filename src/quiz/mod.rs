//! Quiz post-processing: answer-length balancing for both quizzes and
//! deterministic printable versions of the in-class quiz.

pub mod balance;
pub mod practice;
pub mod versions;

pub use balance::{audit_answer_lengths, rebalance_distractors, LengthAudit};
pub use practice::{parse_practice_quiz, rebalance_practice_quiz, PracticeQuestion};
pub use versions::{
    answer_key, generate_versions, KeyEntry, KeyRow, QuizVersion, VersionSet, VersionedQuestion,
    DEFAULT_VERSION_COUNT,
};
