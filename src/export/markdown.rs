//! Markdown document exporter.

use std::fmt::Write as _;

use super::{DocumentExporter, ExportDocument};
use crate::course::{Activity, ChapterSyllabus, DiscussionPrompt, Dossier, QuizQuestion, Slide, Syllabus};
use crate::error::ExportError;
use crate::quiz::VersionSet;

/// Renders every document kind as Markdown.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownExporter;

impl MarkdownExporter {
    pub fn new() -> Self {
        Self
    }

    /// Renders `document` to a Markdown string.
    pub fn render(&self, document: &ExportDocument<'_>) -> String {
        match document {
            ExportDocument::Syllabus(syllabus) => syllabus_md(syllabus),
            ExportDocument::Research { chapter, dossier } => research_md(chapter, dossier),
            ExportDocument::Discussion { chapter, prompts } => discussion_md(chapter, prompts),
            ExportDocument::Activities { chapter, activities } => activities_md(chapter, activities),
            ExportDocument::InClassQuiz {
                chapter,
                questions,
                versions,
            } => in_class_quiz_md(chapter, questions, versions),
            ExportDocument::Slides { chapter, slides } => slides_md(chapter, slides),
        }
    }
}

impl DocumentExporter for MarkdownExporter {
    fn name(&self) -> &str {
        "markdown"
    }

    fn extension(&self) -> &str {
        "md"
    }

    fn export(&self, document: &ExportDocument<'_>) -> Result<Vec<u8>, ExportError> {
        Ok(self.render(document).into_bytes())
    }
}

// `write!` into a String cannot fail; results are ignored throughout.

fn syllabus_md(syllabus: &Syllabus) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# {}\n", syllabus.course_title);
    let _ = writeln!(out, "## Course Overview\n\n{}\n", syllabus.course_overview);
    for ch in &syllabus.chapters {
        let _ = writeln!(out, "## Chapter {}: {}\n\n{}\n", ch.number, ch.title, ch.narrative);
        let _ = writeln!(out, "**Key Concepts:** {}\n", ch.key_concepts.join(", "));
        if !ch.widgets.is_empty() {
            out.push_str("### Interactive Widgets\n\n");
            for widget in &ch.widgets {
                let _ = writeln!(out, "**{}**\n\n{}\n", widget.title, widget.description);
            }
        }
        if !ch.science_annotations.is_empty() {
            out.push_str("### Learning Science Annotations\n\n");
            for annotation in &ch.science_annotations {
                let _ = writeln!(out, "- **[{}]** {}", annotation.principle, annotation.description);
            }
            out.push('\n');
        }
        out.push_str("---\n\n");
    }
    out
}

fn research_md(chapter: &ChapterSyllabus, dossier: &Dossier) -> String {
    let mut out = format!("# Research Dossier: {}\n\n", chapter.title);
    if !dossier.synthesis_notes.is_empty() {
        let _ = writeln!(out, "## Synthesis Notes\n\n{}\n", dossier.synthesis_notes);
    }
    let _ = writeln!(out, "## Sources ({})\n", dossier.sources.len());
    for (i, source) in dossier.sources.iter().enumerate() {
        let _ = writeln!(out, "### {}. {}\n", i + 1, source.title);
        let _ = writeln!(out, "**{} ({})**", source.authors, source.year);
        if let Some(doi) = &source.doi {
            let _ = writeln!(out, "DOI: {}", doi);
        }
        if let Some(url) = &source.url {
            let _ = writeln!(out, "URL: {}", url);
        }
        let _ = writeln!(out, "\n{}", source.summary);
        if !source.relevance.is_empty() {
            let _ = writeln!(out, "\n*Relevance:* {}", source.relevance);
        }
        out.push_str("\n---\n\n");
    }
    out
}

fn discussion_md(chapter: &ChapterSyllabus, prompts: &[DiscussionPrompt]) -> String {
    let mut out = format!("# Conversation Starters: {}\n\n", chapter.title);
    for (i, prompt) in prompts.iter().enumerate() {
        let _ = writeln!(out, "## {}. {}\n\n{}\n", i + 1, prompt.hook, prompt.prompt);
    }
    out
}

fn activities_md(chapter: &ChapterSyllabus, activities: &[Activity]) -> String {
    let mut out = format!("# Activities: {}\n\n", chapter.title);
    for (i, activity) in activities.iter().enumerate() {
        let _ = writeln!(out, "## {}. {} ({})\n\n{}\n", i + 1, activity.title, activity.duration, activity.description);
        if !activity.materials.is_empty() {
            let _ = writeln!(out, "**Materials:** {}\n", activity.materials);
        }
        if !activity.learning_goal.is_empty() {
            let _ = writeln!(out, "**Learning Goal:** {}\n", activity.learning_goal);
        }
        if !activity.scaling_notes.is_empty() {
            let _ = writeln!(out, "**Scaling Notes:** {}\n", activity.scaling_notes);
        }
        out.push_str("---\n\n");
    }
    out
}

fn in_class_quiz_md(chapter: &ChapterSyllabus, questions: &[QuizQuestion], versions: &VersionSet) -> String {
    let mut out = format!("# In-Class Quiz: {}\n\n", chapter.title);

    for version in &versions.versions {
        let _ = writeln!(out, "## Version {}\n", version.label);
        for (i, q) in version.questions.iter().enumerate() {
            let _ = writeln!(out, "{}. {}\n", i + 1, q.question);
            for (pos, option) in q.options.iter().enumerate() {
                let _ = writeln!(out, "   {}. {}", crate::quiz::versions::option_letter(pos), option);
            }
            out.push('\n');
        }
    }

    if !versions.answer_key.is_empty() {
        out.push_str("## Answer Key\n\n| Question |");
        for version in &versions.versions {
            let _ = write!(out, " {} |", version.label);
        }
        out.push_str("\n|---|");
        for _ in &versions.versions {
            out.push_str("---|");
        }
        out.push('\n');
        for row in &versions.answer_key {
            let _ = write!(out, "| {} |", row.original_index + 1);
            for entry in &row.entries {
                let _ = write!(out, " Q{}: {} |", entry.position, entry.letter);
            }
            out.push('\n');
        }
        out.push('\n');
    }

    out.push_str("## Feedback\n\n");
    for (i, q) in questions.iter().enumerate() {
        let _ = writeln!(out, "### Question {}\n\n{}\n", i + 1, q.question);
        let _ = writeln!(out, "**Correct:** {}", q.correct_answer);
        if !q.correct_feedback.is_empty() {
            let _ = writeln!(out, "**Feedback:** {}", q.correct_feedback);
        }
        for distractor in &q.distractors {
            if !distractor.feedback.is_empty() {
                let _ = writeln!(out, "**If \"{}\":** {}", distractor.text, distractor.feedback);
            }
        }
        out.push_str("\n---\n\n");
    }
    out
}

fn slides_md(chapter: &ChapterSyllabus, slides: &[Slide]) -> String {
    let mut out = format!("# Slides: {}\n\n", chapter.title);
    for (i, slide) in slides.iter().enumerate() {
        let layout = slide
            .layout
            .as_deref()
            .map(|l| format!(" [{}]", l))
            .unwrap_or_default();
        let _ = writeln!(out, "## Slide {}: {}{}\n", i + 1, slide.title, layout);
        if let Some(body) = &slide.body_text {
            let _ = writeln!(out, "> {}\n", body);
        }
        if !slide.bullets.is_empty() {
            for bullet in &slide.bullets {
                let _ = writeln!(out, "- {}", bullet);
            }
            out.push('\n');
        }
        if !slide.speaker_notes.is_empty() {
            let _ = writeln!(out, "*Speaker Notes:* {}\n", slide.speaker_notes);
        }
    }
    out
}
