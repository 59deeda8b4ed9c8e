//! Prompts for the materials generated from a finished chapter body.

use crate::course::{ChapterSyllabus, CourseSetup, MaterialKind};

use super::{excerpt, Prompt};

/// Characters of chapter HTML included in quiz, slide and infographic prompts.
pub const CONTENT_EXCERPT_CHARS: usize = 3_000;

/// Characters of chapter HTML included in the audio adaptation prompt.
pub const AUDIO_EXCERPT_CHARS: usize = 60_000;

const PRACTICE_QUIZ_SYSTEM: &str = r#"You are an expert assessment designer writing formative practice questions for a university course chapter.

- Test genuine understanding, not surface recall.
- Each question has ONE correct answer and THREE plausible distractors based on real misconceptions.
- Order questions from easier to harder.

Output questions in this EXACT format:

1. **Question text?**
   a. The correct answer (ALWAYS option a)
   b. Distractor 1
   c. Distractor 2
   d. Distractor 3

   **Answer**: The correct answer (exactly matching option a)

   **Feedback**: 2-4 sentences on why the answer is right. Never refer to options by letter; options are shuffled when displayed.

---

Generate 18-20 questions separated by --- lines. Output ONLY the question blocks."#;

const IN_CLASS_QUIZ_SYSTEM: &str = r#"You are an expert assessment designer writing a formal, printed in-class quiz for a university course chapter.

- 10 questions testing understanding and application.
- Each question has ONE correct answer and THREE plausible distractors.
- No "all of the above", no negative stems, no question that gives away another.
- Feedback must NEVER reference option letters; the quiz is shuffled into several versions. Name the answer text instead.

Output a JSON array:
[
  {
    "question": "Question text?",
    "correctAnswer": "The correct answer",
    "correctFeedback": "Why this answer is correct",
    "distractors": [
      {"text": "Plausible wrong answer", "feedback": "Why a student might pick it and why it is wrong"}
    ]
  }
]

Generate exactly 10 questions. Output ONLY valid JSON."#;

const DISCUSSION_SYSTEM: &str = r#"You are designing conversation starters shown on screen as students arrive for class. They are social icebreakers with intellectual content: casual language, no single correct answer, answerable from experience without having done the reading.

Output a JSON array:
[{"prompt": "The conversation starter", "hook": "A 3-5 word teaser label"}]

Generate 5-6 prompts. Output ONLY valid JSON."#;

const ACTIVITIES_SYSTEM: &str = r#"You are an instructional designer creating in-class activities worth showing up for: social, applied and feasible within 5-20 minutes. Activities MUST be physically possible in the stated teaching environment.

Output a JSON array:
[
  {
    "title": "Activity name",
    "duration": "10-15 minutes",
    "description": "3-5 sentences an instructor can run without guessing",
    "materials": "Required materials or 'None'",
    "learningGoal": "What the activity reinforces",
    "scalingNotes": "How to adapt for different class sizes"
  }
]

Generate 4-6 activities. Output ONLY valid JSON."#;

const AUDIO_SYSTEM: &str = r#"You adapt written chapter text into a transcript for text-to-speech narration.

- Remove references to figures, widgets, buttons and other visual or interactive elements; describe the concept verbally instead.
- Convert citations to speech: "(Smith, 2020)" becomes "according to Smith in 2020".
- Expand abbreviations and symbols; spell out small numbers.
- Insert [short pause] at section transitions. Use CAPS sparingly for key terms.
- Strip all HTML and markdown; turn lists into flowing prose.

Output ONLY the transcript text."#;

const SLIDES_SYSTEM: &str = r#"You are a presentation designer creating varied, engaging lecture slides.

Layouts: "title" (first slide only), "section" (2-3 dividers), "content" (3-5 short bullets, never more than 2 in a row), "big-idea" (one memorable sentence in bodyText), "quote" (a finding or quote in bodyText), "two-column" (left items in bullets, right items as a JSON string array in bodyText).

Build a 12-16 slide deck ending with a "Key Takeaways" content slide. Speaker notes should sound like coaching.

Output ONLY a JSON array of objects:
{"title": string, "bullets": string[], "speakerNotes": string, "layout": string, "bodyText": string}"#;

const INFOGRAPHIC_SYSTEM: &str = r#"You write image-generation prompts for educational infographics.

- Describe an INFOGRAPHIC or DIAGRAM layout, not an illustration or photo.
- Specify exact short text labels, the visual hierarchy, arrows and icons.
- Request a 16:9 landscape aspect ratio.
- Focus on ONE core concept or relationship from the chapter.

Respond with ONLY the image prompt text."#;

fn environment_block(setup: &CourseSetup) -> String {
    let mut block = String::new();
    if let Some(env) = setup.teaching_environment {
        block.push_str(&format!("\n**Teaching environment**: {}", env.description()));
        if let Some(notes) = &setup.environment_notes {
            block.push_str(&format!("\n**Room details**: {}", notes));
        }
    }
    block
}

fn concepts(chapter: &ChapterSyllabus) -> String {
    chapter.key_concepts.join(", ")
}

/// Builds the prompt that produces `kind` for a chapter whose body is `html`.
///
/// For [`MaterialKind::Infographic`] this is the prompt that writes the
/// image-generation prompt.
pub fn material_prompt(
    kind: MaterialKind,
    setup: &CourseSetup,
    chapter: &ChapterSyllabus,
    html: &str,
) -> Prompt {
    match kind {
        MaterialKind::PracticeQuiz => Prompt::new(
            PRACTICE_QUIZ_SYSTEM,
            format!(
                "Generate practice quiz questions for:\n\n**Class**: \"{}\"\n**Key concepts**: {}\n**Chapter description**: {}\n\n**Chapter content excerpt**:\n{}",
                chapter.title,
                concepts(chapter),
                chapter.narrative,
                excerpt(html, CONTENT_EXCERPT_CHARS),
            ),
        ),
        MaterialKind::InClassQuiz => Prompt::new(
            IN_CLASS_QUIZ_SYSTEM,
            format!(
                "Generate an in-class quiz for:\n\n**Class**: \"{}\"\n**Key concepts**: {}\n**Chapter description**: {}\n\n**Chapter content excerpt**:\n{}\n\nOutput ONLY valid JSON.",
                chapter.title,
                concepts(chapter),
                chapter.narrative,
                excerpt(html, CONTENT_EXCERPT_CHARS),
            ),
        ),
        MaterialKind::Discussion => Prompt::new(
            DISCUSSION_SYSTEM,
            format!(
                "Generate discussion starters for:\n\n**Class**: \"{}\"\n**Key concepts**: {}\n**Cohort size**: ~{} students{}",
                chapter.title,
                concepts(chapter),
                setup.cohort_size,
                environment_block(setup),
            ),
        ),
        MaterialKind::Activities => Prompt::new(
            ACTIVITIES_SYSTEM,
            format!(
                "Generate in-class activities for:\n\n**Class**: \"{}\"\n**Key concepts**: {}\n**Cohort size**: ~{} students{}",
                chapter.title,
                concepts(chapter),
                setup.cohort_size,
                environment_block(setup),
            ),
        ),
        MaterialKind::AudioTranscript => Prompt::new(
            AUDIO_SYSTEM,
            format!(
                "Adapt the following reading, titled \"{}\", for spoken delivery.\n\n{}",
                chapter.title,
                excerpt(html, AUDIO_EXCERPT_CHARS),
            ),
        ),
        MaterialKind::Slides => Prompt::new(
            SLIDES_SYSTEM,
            format!(
                "Create lecture slides for:\n\n**Class**: \"{}\"\n**Key concepts**: {}\n\n**Chapter content excerpt**:\n{}",
                chapter.title,
                concepts(chapter),
                excerpt(html, CONTENT_EXCERPT_CHARS),
            ),
        ),
        MaterialKind::Infographic => {
            let mut system = INFOGRAPHIC_SYSTEM.to_string();
            if let Some(theme) = &setup.theme_id {
                system.push_str(&format!("\n\nUse the \"{}\" theme colour palette.", theme));
            }
            Prompt::new(
                system,
                format!(
                    "Write an infographic generation prompt for:\n\n**Class**: \"{}\"\n**Key concepts**: {}\n\n**Content excerpt**:\n{}",
                    chapter.title,
                    concepts(chapter),
                    excerpt(html, CONTENT_EXCERPT_CHARS),
                ),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::course::TeachingEnvironment;

    fn chapter() -> ChapterSyllabus {
        ChapterSyllabus {
            number: 1,
            title: "Seeing".to_string(),
            narrative: "How perception works.".to_string(),
            key_concepts: vec!["light".to_string(), "edges".to_string()],
            widgets: Vec::new(),
            science_annotations: Vec::new(),
            spacing_connections: Vec::new(),
        }
    }

    #[test]
    fn test_every_material_has_a_prompt() {
        let setup = CourseSetup::new("Vision");
        for kind in MaterialKind::ALL {
            let prompt = material_prompt(kind, &setup, &chapter(), "<html></html>");
            assert!(!prompt.system.is_empty(), "{}", kind);
            assert!(prompt.user.contains("Seeing"), "{}", kind);
        }
    }

    #[test]
    fn test_excerpt_is_bounded() {
        let setup = CourseSetup::new("Vision");
        let html = "x".repeat(10_000);
        let prompt = material_prompt(MaterialKind::Slides, &setup, &chapter(), &html);
        assert!(prompt.user.len() < 3_500);
    }

    #[test]
    fn test_environment_block() {
        let mut setup = CourseSetup::new("Vision");
        assert_eq!(environment_block(&setup), "");
        setup.teaching_environment = Some(TeachingEnvironment::Online);
        setup.environment_notes = Some("Zoom".to_string());
        let prompt = material_prompt(MaterialKind::Activities, &setup, &chapter(), "");
        assert!(prompt.user.contains("online"));
        assert!(prompt.user.contains("Room details**: Zoom"));
    }
}
