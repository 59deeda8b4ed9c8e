//! Chapter stage: body generation followed by the material fan-out.

use anyhow::bail;
use tracing::{info, warn};

use crate::course::{ChapterSyllabus, Dossier, GeneratedChapter, MaterialKind, Syllabus};
use crate::llm::{GenerationRequest, ThinkingEffort};
use crate::prompts::{chapter_prompt, ResearchContext};
use crate::scheduler::{run_bounded, Task};
use crate::storage::{keys, read_json_lenient, read_text, write_json, write_text};
use crate::utils::{extract_html, pad};

use super::events::{PipelineEvent, Stage};
use super::orchestrator::{ChapterSummary, CoursePipeline, PipelineError};

/// Work queued for one chapter.
enum ChapterWork<'a> {
    /// No record yet: body first, then materials.
    Generate(&'a ChapterSyllabus, &'a Dossier),
    /// A record exists but lacks materials.
    Refill(&'a ChapterSyllabus, GeneratedChapter),
}

impl ChapterWork<'_> {
    fn chapter(&self) -> &ChapterSyllabus {
        match self {
            ChapterWork::Generate(ch, _) | ChapterWork::Refill(ch, _) => ch,
        }
    }
}

impl CoursePipeline {
    /// Generates every chapter that has research and no record yet, and
    /// fills the missing materials of chapters that already have one.
    ///
    /// Chapters without sources are reported and left out. A failed body
    /// skips that chapter's materials; the other chapters carry on.
    pub async fn run_chapters(
        &self,
        syllabus: &Syllabus,
        dossiers: &[Dossier],
    ) -> Result<ChapterSummary, PipelineError> {
        self.emit(PipelineEvent::StageStarted(Stage::Chapters)).await;
        let mut summary = ChapterSummary::default();
        let mut work: Vec<ChapterWork<'_>> = Vec::new();

        for ch in &syllabus.chapters {
            let existing: Option<GeneratedChapter> =
                read_json_lenient(self.store.as_ref(), &keys::chapter_record(ch.number)).await?;
            if let Some(chapter) = existing {
                let missing = self.missing_materials(&chapter);
                if missing.is_empty() {
                    info!(chapter = ch.number, "Chapter already generated, skipping");
                    summary.skipped.push(ch.number);
                    self.emit(PipelineEvent::ChapterSkipped { chapter: ch.number }).await;
                } else {
                    info!(chapter = ch.number, missing = ?missing, "Chapter record lacks materials, refilling");
                    work.push(ChapterWork::Refill(ch, chapter));
                }
                continue;
            }
            match dossiers.iter().find(|d| d.chapter_number == ch.number) {
                Some(dossier) if dossier.has_research() => work.push(ChapterWork::Generate(ch, dossier)),
                _ => {
                    warn!(chapter = ch.number, title = %ch.title, "No research sources, chapter not generated");
                    summary.missing_research.push(ch.number);
                    self.emit(PipelineEvent::ChapterMissingResearch { chapter: ch.number }).await;
                }
            }
        }

        info!(
            pending = work.len(),
            skipped = summary.skipped.len(),
            missing_research = summary.missing_research.len(),
            "Generating chapters"
        );

        let numbers: Vec<(u32, bool)> = work
            .iter()
            .map(|w| (w.chapter().number, matches!(w, ChapterWork::Refill(..))))
            .collect();
        let tasks: Vec<Task<'_, GeneratedChapter>> = work
            .into_iter()
            .map(|w| match w {
                ChapterWork::Generate(ch, dossier) => Task::new(
                    format!("chapter-ch{}", pad(ch.number)),
                    self.generate_chapter(&syllabus.course_title, ch, dossier),
                ),
                ChapterWork::Refill(ch, chapter) => Task::new(
                    format!("refill-ch{}", pad(ch.number)),
                    self.finish_chapter(ch, chapter),
                ),
            })
            .collect();
        let settled = run_bounded(tasks, self.config.body_concurrency).await?;

        for ((number, refill), outcome) in numbers.into_iter().zip(settled) {
            match outcome.into_result() {
                Ok(_) if refill => summary.refilled.push(number),
                Ok(_) => summary.generated.push(number),
                Err(e) => {
                    warn!(chapter = number, error = %e, "Chapter generation failed");
                    summary.failed.push(number);
                    self.emit(PipelineEvent::ChapterFailed {
                        chapter: number,
                        error: e.to_string(),
                    })
                    .await;
                }
            }
        }

        self.emit(PipelineEvent::StageCompleted(Stage::Chapters)).await;
        Ok(summary)
    }

    async fn generate_chapter(
        &self,
        course_title: &str,
        ch: &ChapterSyllabus,
        dossier: &Dossier,
    ) -> anyhow::Result<GeneratedChapter> {
        let number = ch.number;
        let store = self.store.as_ref();
        let body_key = keys::chapter_body(number, &ch.title);

        let html = match read_text(store, &body_key).await? {
            Some(html) => {
                info!(chapter = number, "Chapter body checkpoint found");
                html
            }
            None => {
                info!(chapter = number, title = %ch.title, sources = dossier.sources.len(), "Writing chapter body");
                let prompt = chapter_prompt(
                    &self.setup,
                    ch,
                    ResearchContext {
                        course_title,
                        dossier: Some(dossier),
                    },
                );
                let request = GenerationRequest::new(
                    format!("ch{}-body", pad(number)),
                    &self.config.heavy_model,
                    prompt.system,
                )
                .with_user_message(prompt.user)
                .with_thinking(ThinkingEffort::High)
                .with_max_tokens(self.config.limits.chapter);

                let text = self.call(request, |_| None).await?;
                let html = extract_html(&text);
                if html.trim().is_empty() {
                    bail!("chapter {} body is empty", number);
                }
                write_text(store, &body_key, &html).await?;
                html
            }
        };

        self.finish_chapter(ch, GeneratedChapter::new(number, &ch.title, html)).await
    }

    /// Fills the chapter's missing materials and writes its record.
    async fn finish_chapter(&self, ch: &ChapterSyllabus, mut chapter: GeneratedChapter) -> anyhow::Result<GeneratedChapter> {
        let number = chapter.number;
        self.fill_materials(ch, &mut chapter).await?;
        write_json(self.store.as_ref(), &keys::chapter_record(number), &chapter).await?;

        let materials = chapter.present_materials();
        info!(chapter = number, materials = materials.len(), "Chapter complete");
        self.emit(PipelineEvent::ChapterCompleted {
            chapter: number,
            materials,
        })
        .await;
        Ok(chapter)
    }

    /// Regenerates one material of an already generated chapter.
    ///
    /// The chapter record and the material checkpoint are replaced only when
    /// generation succeeds.
    pub async fn regenerate_material(
        &self,
        number: u32,
        kind: MaterialKind,
    ) -> Result<GeneratedChapter, PipelineError> {
        let syllabus = self.load_syllabus().await?;
        let ch = syllabus
            .chapter(number)
            .ok_or(PipelineError::ChapterNotFound(number))?;
        let record_key = keys::chapter_record(number);
        let mut chapter: GeneratedChapter = read_json_lenient(self.store.as_ref(), &record_key)
            .await?
            .ok_or(PipelineError::ChapterNotGenerated(number))?;
        if kind == MaterialKind::Infographic && self.images.is_none() {
            return Err(PipelineError::MaterialUnavailable(kind));
        }

        info!(chapter = number, kind = %kind, "Regenerating material");
        match self.generate_material(kind, ch, &chapter.html_content).await {
            Ok(output) => {
                output.apply(&mut chapter);
                write_json(self.store.as_ref(), &record_key, &chapter).await?;
                self.emit(PipelineEvent::MaterialCompleted { chapter: number, kind }).await;
                Ok(chapter)
            }
            Err(e) => {
                warn!(chapter = number, kind = %kind, error = %e, "Material regeneration failed");
                self.emit(PipelineEvent::MaterialFailed {
                    chapter: number,
                    kind,
                    error: e.to_string(),
                })
                .await;
                Err(PipelineError::MaterialFailed {
                    chapter: number,
                    kind,
                    message: e.to_string(),
                })
            }
        }
    }
}
