//! Conversion from parsed model output to typed course records.
//!
//! The tolerant parser produces an untyped [`Value`]; every record shape has
//! exactly one function here that turns it into a typed record. Missing
//! scalars fall back to defaults, missing arrays to empty, and entries that
//! lack their defining field are dropped.

use serde_json::Value;

use super::types::{
    Activity, ChapterSyllabus, DiscussionPrompt, Distractor, Dossier, QuizQuestion,
    ResearchSource, ScienceAnnotation, SciencePrinciple, Slide, Syllabus, Widget,
};
use crate::error::ParseError;
use crate::utils::json_extraction::{parse_json, Wrap};

/// Reads a scalar field as text. Numbers and booleans are stringified.
fn text(value: &Value, key: &str) -> String {
    match value.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

fn optional_text(value: &Value, key: &str) -> Option<String> {
    Some(text(value, key)).filter(|s| !s.trim().is_empty())
}

fn items<'a>(value: &'a Value, key: &str) -> &'a [Value] {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn string_list(value: &Value, key: &str) -> Vec<String> {
    items(value, key)
        .iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .collect()
}

fn number_list(value: &Value, key: &str) -> Vec<u32> {
    items(value, key)
        .iter()
        .filter_map(|item| match item {
            Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
        .collect()
}

fn as_array<'a>(value: &'a Value, record: &str) -> Result<&'a [Value], ParseError> {
    value
        .as_array()
        .map(Vec::as_slice)
        .ok_or_else(|| ParseError::Conversion {
            record: record.to_string(),
            message: "expected a JSON array".to_string(),
        })
}

/// Converts one syllabus chapter. `index` is its 0-based position.
pub fn chapter_from_value(value: &Value, index: usize) -> ChapterSyllabus {
    let position = u32::try_from(index + 1).unwrap_or(u32::MAX);
    let number = value
        .get("number")
        .and_then(Value::as_u64)
        .and_then(|n| u32::try_from(n).ok())
        .filter(|n| *n > 0)
        .unwrap_or(position);
    let title = optional_text(value, "title").unwrap_or_else(|| format!("Chapter {}", position));

    let widgets = items(value, "widgets")
        .iter()
        .map(|w| Widget {
            title: text(w, "title"),
            description: text(w, "description"),
            concept: text(w, "concept"),
            rationale: text(w, "rationale"),
        })
        .collect();

    let science_annotations = items(value, "scienceAnnotations")
        .iter()
        .map(|a| ScienceAnnotation {
            principle: SciencePrinciple::normalize(&text(a, "principle")),
            description: text(a, "description"),
            related_chapters: number_list(a, "relatedChapters"),
        })
        .collect();

    ChapterSyllabus {
        number,
        title,
        narrative: text(value, "narrative"),
        key_concepts: string_list(value, "keyConcepts"),
        widgets,
        science_annotations,
        spacing_connections: number_list(value, "spacingConnections"),
    }
}

/// Converts a full syllabus object.
pub fn syllabus_from_value(value: &Value) -> Result<Syllabus, ParseError> {
    if !value.is_object() {
        return Err(ParseError::Conversion {
            record: "syllabus".to_string(),
            message: "expected a JSON object".to_string(),
        });
    }

    let chapters = items(value, "chapters")
        .iter()
        .enumerate()
        .map(|(idx, ch)| chapter_from_value(ch, idx))
        .collect();

    Ok(Syllabus {
        course_title: optional_text(value, "courseTitle")
            .unwrap_or_else(|| "Untitled Course".to_string()),
        course_overview: text(value, "courseOverview"),
        chapters,
    })
}

/// Parses a syllabus response end to end.
pub fn parse_syllabus(response: &str) -> Result<Syllabus, ParseError> {
    let value = parse_json(response, Wrap::Object)?;
    syllabus_from_value(&value)
}

fn source_from_value(value: &Value) -> ResearchSource {
    ResearchSource {
        title: text(value, "title"),
        authors: text(value, "authors"),
        year: text(value, "year"),
        url: optional_text(value, "url"),
        doi: optional_text(value, "doi"),
        summary: text(value, "summary"),
        relevance: text(value, "relevance"),
        is_verified: value
            .get("isVerified")
            .and_then(Value::as_bool)
            .unwrap_or(false),
    }
}

/// Converts a research object into the dossier for `chapter_number`.
pub fn dossier_from_value(value: &Value, chapter_number: u32) -> Dossier {
    Dossier {
        chapter_number,
        sources: items(value, "sources")
            .iter()
            .map(source_from_value)
            .filter(|s| !s.title.trim().is_empty())
            .collect(),
        synthesis_notes: text(value, "synthesisNotes"),
    }
}

/// Converts an array of canonical quiz questions.
///
/// Questions without question text or correct answer are dropped.
pub fn questions_from_value(value: &Value) -> Result<Vec<QuizQuestion>, ParseError> {
    let questions = as_array(value, "quiz questions")?
        .iter()
        .map(|q| QuizQuestion {
            question: text(q, "question"),
            correct_answer: text(q, "correctAnswer"),
            correct_feedback: text(q, "correctFeedback"),
            distractors: items(q, "distractors")
                .iter()
                .map(|d| Distractor {
                    text: text(d, "text"),
                    feedback: text(d, "feedback"),
                })
                .filter(|d| !d.text.is_empty())
                .collect(),
        })
        .filter(|q| !q.question.trim().is_empty() && !q.correct_answer.trim().is_empty())
        .collect();
    Ok(questions)
}

/// Converts an array of discussion prompts.
pub fn discussion_from_value(value: &Value) -> Result<Vec<DiscussionPrompt>, ParseError> {
    Ok(as_array(value, "discussion prompts")?
        .iter()
        .map(|d| DiscussionPrompt {
            prompt: text(d, "prompt"),
            hook: text(d, "hook"),
        })
        .filter(|d| !d.prompt.trim().is_empty())
        .collect())
}

/// Converts an array of in-class activities.
pub fn activities_from_value(value: &Value) -> Result<Vec<Activity>, ParseError> {
    Ok(as_array(value, "activities")?
        .iter()
        .map(|a| Activity {
            title: text(a, "title"),
            duration: text(a, "duration"),
            description: text(a, "description"),
            materials: text(a, "materials"),
            learning_goal: text(a, "learningGoal"),
            scaling_notes: text(a, "scalingNotes"),
        })
        .filter(|a| !a.title.trim().is_empty())
        .collect())
}

/// Converts an array of slides. Two-column slides may carry their columns
/// as a JSON value in `bodyText`; it is kept as serialized text.
pub fn slides_from_value(value: &Value) -> Result<Vec<Slide>, ParseError> {
    Ok(as_array(value, "slides")?
        .iter()
        .map(|s| Slide {
            title: text(s, "title"),
            bullets: string_list(s, "bullets"),
            speaker_notes: text(s, "speakerNotes"),
            layout: optional_text(s, "layout"),
            body_text: match s.get("bodyText") {
                Some(Value::String(body)) if !body.is_empty() => Some(body.clone()),
                Some(other @ (Value::Array(_) | Value::Object(_))) => Some(other.to_string()),
                _ => None,
            },
        })
        .filter(|s| !s.title.trim().is_empty())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_syllabus_defaults() {
        let syllabus = syllabus_from_value(&json!({
            "chapters": [
                {"title": "Seeing", "keyConcepts": ["light", 3]},
                {"number": 0},
                {"number": 7, "title": "Deciding", "spacingConnections": [1, "2", "x"]}
            ]
        }))
        .unwrap();

        assert_eq!(syllabus.course_title, "Untitled Course");
        assert_eq!(syllabus.chapters[0].number, 1);
        assert_eq!(syllabus.chapters[0].key_concepts, vec!["light", "3"]);
        assert_eq!(syllabus.chapters[1].number, 2);
        assert_eq!(syllabus.chapters[1].title, "Chapter 2");
        assert!(syllabus.chapters[1].widgets.is_empty());
        assert_eq!(syllabus.chapters[2].number, 7);
        assert_eq!(syllabus.chapters[2].spacing_connections, vec![1, 2]);
    }

    #[test]
    fn test_syllabus_requires_object() {
        assert!(matches!(
            syllabus_from_value(&json!([])),
            Err(ParseError::Conversion { .. })
        ));
    }

    #[test]
    fn test_parse_syllabus_normalizes_principles() {
        let response = r#"Sure! {"courseTitle": "Mind", "chapters": [
            {"number": 1, "title": "A", "scienceAnnotations": [
                {"principle": "Retrieval Practice", "description": "quiz", "relatedChapters": [1]}
            ]}
        ]}"#;
        let syllabus = parse_syllabus(response).unwrap();
        let annotation = &syllabus.chapters[0].science_annotations[0];
        assert_eq!(annotation.principle, SciencePrinciple::Retrieval);
        assert_eq!(annotation.related_chapters, vec![1]);
    }

    #[test]
    fn test_dossier_source_defaults() {
        let dossier = dossier_from_value(
            &json!({
                "sources": [
                    {"title": "Spacing effects", "year": 2006, "doi": "10.1037/0033-2909.132.3.354"},
                    {"summary": "no title"}
                ],
                "synthesisNotes": "Use spacing."
            }),
            4,
        );
        assert_eq!(dossier.chapter_number, 4);
        assert_eq!(dossier.sources.len(), 1);
        let source = &dossier.sources[0];
        assert_eq!(source.year, "2006");
        assert_eq!(source.authors, "");
        assert!(source.url.is_none());
        assert!(!source.is_verified);
        assert!(dossier.has_research());
    }

    #[test]
    fn test_questions_drop_incomplete_entries() {
        let questions = questions_from_value(&json!([
            {"question": "2+2?", "correctAnswer": "4", "correctFeedback": "Yes",
             "distractors": [{"text": "3", "feedback": "no"}, {"feedback": "missing text"}]},
            {"question": "no answer"}
        ]))
        .unwrap();
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].distractors.len(), 1);
    }

    #[test]
    fn test_arrays_required_for_materials() {
        assert!(discussion_from_value(&json!({"prompt": "x"})).is_err());
        assert!(activities_from_value(&json!("text")).is_err());
    }

    #[test]
    fn test_slides_keep_structured_body() {
        let slides = slides_from_value(&json!([
            {"title": "Compare", "layout": "two-column", "bodyText": {"left": ["a"], "right": ["b"]}},
            {"title": "Intro", "bullets": ["one"], "speakerNotes": "hello"}
        ]))
        .unwrap();
        assert_eq!(slides[0].layout.as_deref(), Some("two-column"));
        assert!(slides[0].body_text.as_deref().unwrap().contains("\"left\""));
        assert_eq!(slides[1].bullets, vec!["one"]);
        assert!(slides[1].layout.is_none());
    }
}
