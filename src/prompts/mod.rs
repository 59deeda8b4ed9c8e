//! Prompts for every generation call in the course pipeline.
//!
//! The prompts are organized by stage:
//!
//! - [`course`] - Syllabus design, chapter research and chapter bodies
//! - [`materials`] - Per-chapter quizzes, discussion, activities, audio,
//!   slides and infographics
//!
//! Every builder takes the course setup and syllabus records explicitly so
//! concurrent calls never share mutable prompt state.

pub mod course;
pub mod materials;

pub use course::{chapter_prompt, research_prompt, syllabus_prompt, ResearchContext};
pub use materials::material_prompt;

/// A system prompt together with the user message for one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    /// System prompt establishing the model's role and output format.
    pub system: String,
    /// User message with the specific request.
    pub user: String,
}

impl Prompt {
    /// Creates a new prompt with the given system and user messages.
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
        }
    }
}

/// System prompt for lengthening distractors of flagged quiz questions.
pub const REBALANCE_SYSTEM: &str = r#"You are an assessment editor. For each question below, the correct answer is currently the longest option, which is a detectable pattern. Rewrite one or two of the INCORRECT options so the correct answer is no longer the longest.

Rules:
- NEVER modify the correct answer. Only modify incorrect options.
- A rewritten distractor should be no more than ~30% longer than the correct answer.
- Add ONE specific detail, qualifying clause or named example. No filler.
- The rewritten distractor should be a more seductive wrong answer, not just a longer one.
- Keep the number and order of distractors unchanged.
- Return ONLY the JSON array.

Input format:
[{"id": 3, "question": "What is...?", "correctAnswer": "The correct text", "distractors": ["Wrong 1", "Wrong 2", "Wrong 3"]}]

Output format (same ids, only distractors changed):
[{"id": 3, "distractors": ["Elaborated wrong 1", "Wrong 2", "Elaborated wrong 3"]}]"#;

/// Truncates chapter HTML to an excerpt suitable for a material prompt.
pub(crate) fn excerpt(html: &str, max_chars: usize) -> String {
    crate::utils::truncate_chars(html, max_chars)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_new() {
        let prompt = Prompt::new("system", "user");
        assert_eq!(prompt.system, "system");
        assert_eq!(prompt.user, "user");
    }

    #[test]
    fn test_excerpt_respects_char_boundaries() {
        assert_eq!(excerpt("héllo wörld", 4), "héll");
    }
}
