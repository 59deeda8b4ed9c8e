//! Checkpoint key layout.
//!
//! Per-chapter keys use a two-digit chapter prefix so listings sort in
//! chapter order.

use crate::course::MaterialKind;
use crate::utils::{pad, slugify};

/// The committed syllabus.
pub const SYLLABUS: &str = "syllabus.json";

/// The assembled course record.
pub const COURSE: &str = "course.json";

/// Prefix of everything written by publish assembly.
pub const PUBLISH_PREFIX: &str = "publish/";

/// Research dossier for a chapter.
pub fn research(chapter: u32) -> String {
    format!("research/{}_research.json", pad(chapter))
}

/// Chapter body HTML.
pub fn chapter_body(chapter: u32, title: &str) -> String {
    let slug = slugify(title);
    if slug.is_empty() {
        format!("chapters/{}_chapter.html", pad(chapter))
    } else {
        format!("chapters/{}_{}.html", pad(chapter), slug)
    }
}

/// Generated-chapter record. Its presence marks the chapter as done.
pub fn chapter_record(chapter: u32) -> String {
    format!("chapters/{}_chapter.json", pad(chapter))
}

/// Printable versions and answer key of the in-class quiz.
pub fn in_class_versions(chapter: u32) -> String {
    format!("quizzes/{}_inclass_versions.json", pad(chapter))
}

/// Rendered infographic image.
pub fn infographic_image(chapter: u32, extension: &str) -> String {
    format!("infographic/{}.{}", pad(chapter), extension)
}

/// Narrated audio for a chapter transcript.
pub fn audio_file(chapter: u32, extension: &str) -> String {
    format!("audio/{}.{}", pad(chapter), extension)
}

/// Data checkpoint of one material.
pub fn material(kind: MaterialKind, chapter: u32) -> String {
    let n = pad(chapter);
    match kind {
        MaterialKind::PracticeQuiz => format!("quizzes/{}_practice.md", n),
        MaterialKind::InClassQuiz => format!("quizzes/{}_inclass.json", n),
        MaterialKind::Discussion => format!("discussion/{}_discussion.json", n),
        MaterialKind::Activities => format!("activities/{}_activities.json", n),
        MaterialKind::AudioTranscript => format!("audio/{}_transcript.md", n),
        MaterialKind::Slides => format!("slides/{}_slides.json", n),
        MaterialKind::Infographic => format!("infographic/{}_prompt.txt", n),
    }
}

/// Exported document. `chapter` is `None` for course-level documents.
pub fn export(chapter: Option<u32>, kind: &str, extension: &str) -> String {
    match chapter {
        Some(n) => format!("exports/{}_{}.{}", pad(n), kind, extension),
        None => format!("exports/{}.{}", kind, extension),
    }
}

/// A file inside the published package.
pub fn publish(path: &str) -> String {
    format!("{}{}", PUBLISH_PREFIX, path.trim_start_matches('/'))
}
