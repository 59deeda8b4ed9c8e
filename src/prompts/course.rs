//! Syllabus, research and chapter-body prompts.

use crate::course::{ChapterSyllabus, CourseSetup, Dossier, PriorKnowledge};

use super::Prompt;

const SYLLABUS_SYSTEM: &str = r#"You are an expert course architect who designs pedagogically principled university courses. The syllabus you create is the blueprint for every downstream artifact: chapter readings, interactive widgets, practice and in-class quizzes, discussion prompts, activities, audio narrations and slides.

## Learning Science Principles

Embed all five principles throughout the course:

1. **Spacing**: key concepts reappear across chapters with increasing complexity.
2. **Interleaving**: related topics from different chapters are mixed in practice and examples.
3. **Retrieval practice**: every chapter includes moments where learners recall before they read.
4. **Concrete examples**: every abstract idea is grounded in vivid, real-world cases.
5. **Dual coding**: concepts are presented verbally and visually.

## Output Format

Respond with ONLY valid JSON matching this structure:

{
  "courseTitle": "A compelling, specific course title",
  "courseOverview": "2-3 paragraphs on the pedagogical philosophy and the course arc, written for the instructor",
  "chapters": [
    {
      "number": 1,
      "title": "Evocative chapter title",
      "narrative": "2-3 paragraphs: what the chapter covers, why it matters, how it connects to other chapters",
      "keyConcepts": ["concept1", "concept2", "concept3"],
      "widgets": [
        {"title": "Widget name", "description": "What the learner manipulates and sees", "concept": "Concept illustrated", "rationale": "Why interaction beats static text here"}
      ],
      "scienceAnnotations": [
        {"principle": "spacing", "description": "How the principle is applied", "relatedChapters": [3, 5]}
      ],
      "spacingConnections": []
    }
  ]
}

## Requirements

- Narratives are architectural: name examples but never work through them. No formulas or worked problems.
- At least 3 science annotations per chapter, covering different principles.
- spacingConnections lists earlier chapter numbers this chapter revisits. Chapter 1 has none.
- No trailing commas, no comments, no text outside the JSON object."#;

fn prior_knowledge_line(prior: PriorKnowledge) -> &'static str {
    match prior {
        PriorKnowledge::None => "Complete beginners, no prior knowledge assumed",
        PriorKnowledge::Some => "Some foundational knowledge, basic concepts understood",
        PriorKnowledge::Significant => "Significant background, ready for advanced material",
    }
}

fn cohort_line(size: u32) -> &'static str {
    if size < 30 {
        "small seminar, activities can be intimate and discussion-heavy"
    } else if size < 100 {
        "medium class, mix of small-group and whole-class activities"
    } else {
        "large lecture, activities must scale (think-pair-share, polling)"
    }
}

/// Builds the syllabus design prompt.
pub fn syllabus_prompt(setup: &CourseSetup) -> Prompt {
    let mut user = format!("Design a complete course syllabus for:\n\n**Topic**: {}\n", setup.topic);
    if let Some(topics) = &setup.specific_topics {
        user.push_str(&format!("**Required topics**: {}\n", topics));
    }
    if let Some(avoid) = &setup.avoid_topics {
        user.push_str(&format!("**Exclude**: {}\n", avoid));
    }
    user.push_str(&format!(
        "\n**Audience**: {} students\n**Prior knowledge**: {}\n**Cohort size**: ~{} students ({})\n",
        setup.education_level.as_str().replace('-', " "),
        prior_knowledge_line(setup.prior_knowledge),
        setup.cohort_size,
        cohort_line(setup.cohort_size),
    ));
    if let Some(notes) = &setup.learner_notes {
        user.push_str(&format!("**Additional learner context**: {}\n", notes));
    }
    user.push_str(&format!(
        "\n**Course structure**: {} classes\n**Reading length**: ~{} words each (~{} min reading time)\n**Interactive widgets per chapter**: {}\n\n",
        setup.num_chapters,
        setup.chapter_length.word_count(),
        setup.chapter_length.read_minutes(),
        setup.widgets_per_chapter,
    ));
    user.push_str(
        "The chapter sequence should tell a coherent intellectual story, building knowledge \
         progressively while weaving in spaced review of earlier concepts.\n\nOutput ONLY valid JSON.",
    );

    Prompt::new(SYLLABUS_SYSTEM, user)
}

const RESEARCH_SYSTEM: &str = r#"You are a research assistant building a research dossier for a university course chapter. Find real, verifiable academic sources using web search.

PROCESS:
1. Search for key academic sources related to the chapter topic
2. Search for seminal papers, textbooks and authoritative reviews
3. Synthesize the findings into a structured dossier

After completing your research, output the dossier as JSON:
{
  "sources": [
    {
      "title": "Full paper or book title",
      "authors": "Author names",
      "year": "Publication year",
      "url": "URL if found",
      "doi": "DOI if available",
      "summary": "Key findings relevant to the chapter",
      "relevance": "How this source supports the chapter",
      "isVerified": true
    }
  ],
  "synthesisNotes": "How these sources collectively inform the chapter"
}

Find 5-8 high-quality sources. Output ONLY the JSON dossier."#;

/// Builds the research prompt for one chapter.
pub fn research_prompt(chapter: &ChapterSyllabus) -> Prompt {
    let user = format!(
        "Research the following chapter topic and build a dossier of real academic sources.\n\n\
         **Chapter**: \"{}\"\n**Description**: {}\n**Key concepts**: {}\n\n\
         Search for real academic sources. Find 5-8 high-quality references.",
        chapter.title,
        chapter.narrative,
        chapter.key_concepts.join(", "),
    );
    Prompt::new(RESEARCH_SYSTEM, user)
}

/// Inputs for a chapter-body prompt beyond the chapter itself.
#[derive(Debug, Clone, Copy)]
pub struct ResearchContext<'a> {
    pub course_title: &'a str,
    pub dossier: Option<&'a Dossier>,
}

const CHAPTER_SYSTEM: &str = r#"You are an expert educator and front-end developer writing one chapter of a university course as a single, self-contained HTML document.

## Content

- Open with a hook and a retrieval question about earlier chapters ("predict before you peek").
- Ground every abstract idea in a concrete example.
- Implement each planned widget as an interactive element with inline JavaScript. Widgets must respond to input, not merely reveal text.
- Revisit concepts from the listed spacing connections explicitly.
- End with a short summary and three self-test questions.
- Cite the provided research sources inline as (Author, Year) and list them in a references section. Never invent sources.

## Format

- Output a complete document starting with <!DOCTYPE html> and ending with </html>.
- All CSS and JavaScript inline. No external scripts or fonts.
- Semantic HTML: <article>, <section>, <h2>, <figure>.
- Output ONLY the HTML document."#;

fn theme_line(theme: Option<&str>) -> String {
    match theme {
        Some(theme) => format!("\n\n## Theme\n\nStyle the document with the \"{}\" theme palette.", theme),
        None => String::new(),
    }
}

/// Builds the chapter-body prompt.
pub fn chapter_prompt(
    setup: &CourseSetup,
    chapter: &ChapterSyllabus,
    context: ResearchContext<'_>,
) -> Prompt {
    let system = format!("{}{}", CHAPTER_SYSTEM, theme_line(setup.theme_id.as_deref()));

    let mut user = format!(
        "Write the chapter for the course \"{}\".\n\n**Chapter {}**: \"{}\"\n**Narrative**: {}\n**Key concepts**: {}\n**Length**: ~{} words\n",
        context.course_title,
        chapter.number,
        chapter.title,
        chapter.narrative,
        chapter.key_concepts.join(", "),
        setup.chapter_length.word_count(),
    );

    if !chapter.widgets.is_empty() {
        user.push_str("\n**Widgets**:\n");
        for widget in &chapter.widgets {
            user.push_str(&format!(
                "- {}: {} (concept: {})\n",
                widget.title, widget.description, widget.concept
            ));
        }
    }

    if !chapter.science_annotations.is_empty() {
        user.push_str("\n**Learning science**:\n");
        for annotation in &chapter.science_annotations {
            user.push_str(&format!("- {}: {}\n", annotation.principle, annotation.description));
        }
    }

    if !chapter.spacing_connections.is_empty() {
        let connections: Vec<String> =
            chapter.spacing_connections.iter().map(|n| n.to_string()).collect();
        user.push_str(&format!("\n**Revisit chapters**: {}\n", connections.join(", ")));
    }

    if let Some(dossier) = context.dossier.filter(|d| d.has_research()) {
        user.push_str("\n**Research sources** (cite only these):\n");
        for source in &dossier.sources {
            user.push_str(&format!("- {} ({}, {})", source.title, source.authors, source.year));
            if let Some(doi) = &source.doi {
                user.push_str(&format!(" DOI: {}", doi));
            }
            user.push_str(&format!(": {}\n", source.summary));
        }
        if !dossier.synthesis_notes.is_empty() {
            user.push_str(&format!("\n**Synthesis**: {}\n", dossier.synthesis_notes));
        }
    }

    user.push_str("\nOutput ONLY the HTML document.");
    Prompt::new(system, user)
}
