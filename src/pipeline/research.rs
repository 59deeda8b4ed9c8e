//! Research stage: one pooled web-search call per chapter.

use tracing::{debug, info, warn};

use crate::course::{dossier_from_value, ChapterSyllabus, Dossier, Syllabus};
use crate::export::ExportDocument;
use crate::llm::{GenerationRequest, StreamEvent, Tool};
use crate::prompts::research_prompt;
use crate::scheduler::{run_bounded, Task};
use crate::storage::{keys, read_json_lenient, write_json};
use crate::utils::{pad, parse_json, truncate_chars, Wrap};

use super::events::{PipelineEvent, Stage};
use super::orchestrator::{CoursePipeline, PipelineError};

/// Synthesis note of the dossier recorded for a failed research task.
pub const RESEARCH_FAILED_NOTE: &str = "Research failed. Chapter will be generated from model knowledge.";

/// Characters of an unparseable response kept as synthesis notes.
const RAW_NOTES_CHARS: usize = 500;

impl CoursePipeline {
    /// Produces one dossier per syllabus chapter, in syllabus order.
    ///
    /// Chapters that are already generated, and dossiers that already carry
    /// sources, are reused. Everything else is researched in a bounded pool.
    /// A failed task yields a checkpointed dossier without sources.
    pub async fn run_research(&self, syllabus: &Syllabus) -> Result<Vec<Dossier>, PipelineError> {
        self.emit(PipelineEvent::StageStarted(Stage::Research)).await;
        let store = self.store.as_ref();

        let mut slots: Vec<Option<Dossier>> = vec![None; syllabus.chapters.len()];
        let mut pending: Vec<(usize, &ChapterSyllabus)> = Vec::new();

        for (idx, ch) in syllabus.chapters.iter().enumerate() {
            let stored: Option<Dossier> = read_json_lenient(store, &keys::research(ch.number)).await?;
            if store.exists(&keys::chapter_record(ch.number)).await? {
                debug!(chapter = ch.number, "Chapter already generated, skipping research");
                slots[idx] = Some(stored.unwrap_or_else(|| Dossier::empty(ch.number, "")));
                continue;
            }
            match stored {
                Some(dossier) if dossier.has_research() => {
                    debug!(chapter = ch.number, sources = dossier.sources.len(), "Research checkpoint found");
                    slots[idx] = Some(dossier);
                }
                _ => pending.push((idx, ch)),
            }
        }

        info!(
            chapters = syllabus.chapters.len(),
            pending = pending.len(),
            concurrency = self.config.research_concurrency,
            "Starting research"
        );

        let tasks: Vec<Task<'_, Dossier>> = pending
            .iter()
            .map(|(_, ch)| Task::new(format!("research-ch{}", pad(ch.number)), self.research_chapter(ch)))
            .collect();
        let settled = run_bounded(tasks, self.config.research_concurrency).await?;

        for ((idx, ch), outcome) in pending.into_iter().zip(settled) {
            let dossier = match outcome.into_result() {
                Ok(dossier) => dossier,
                Err(e) => {
                    warn!(chapter = ch.number, error = %e, "Research failed");
                    let fallback = Dossier::empty(ch.number, RESEARCH_FAILED_NOTE);
                    if let Err(e) = write_json(store, &keys::research(ch.number), &fallback).await {
                        warn!(chapter = ch.number, error = %e, "Failed to checkpoint research fallback");
                    }
                    fallback
                }
            };
            slots[idx] = Some(dossier);
        }

        let dossiers: Vec<Dossier> = slots.into_iter().flatten().collect();
        info!(
            researched = dossiers.iter().filter(|d| d.has_research()).count(),
            total = dossiers.len(),
            "Research complete"
        );
        self.emit(PipelineEvent::StageCompleted(Stage::Research)).await;
        Ok(dossiers)
    }

    async fn research_chapter(&self, chapter: &ChapterSyllabus) -> anyhow::Result<Dossier> {
        let number = chapter.number;
        let prompt = research_prompt(chapter);
        let request = GenerationRequest::new(
            format!("research-ch{}", pad(number)),
            &self.config.standard_model,
            prompt.system,
        )
        .with_user_message(prompt.user)
        .with_tool(Tool::WebSearch {
            max_uses: self.config.max_searches,
        })
        .with_max_tokens(self.config.limits.research);

        let text = self
            .call(request, |event| match event {
                StreamEvent::WebSearch { query } => {
                    debug!(chapter = number, query = %query, "Research search");
                    Some(PipelineEvent::ResearchSearch { chapter: number, query })
                }
                _ => None,
            })
            .await?;

        let mut dossier = match parse_json(&text, Wrap::Object) {
            Ok(value) => dossier_from_value(&value, number),
            Err(e) => {
                warn!(chapter = number, error = %e, "Research response was not JSON, keeping raw notes");
                Dossier::empty(number, truncate_chars(&text, RAW_NOTES_CHARS))
            }
        };

        self.verify_identifiers(&mut dossier).await;

        write_json(self.store.as_ref(), &keys::research(number), &dossier).await?;
        self.export(&ExportDocument::Research {
            chapter,
            dossier: &dossier,
        })
        .await;

        info!(chapter = number, sources = dossier.sources.len(), "Chapter researched");
        Ok(dossier)
    }

    /// Clears DOIs the validator reports as invalid. A validator failure
    /// keeps every DOI.
    async fn verify_identifiers(&self, dossier: &mut Dossier) {
        if !self.config.validate_dois {
            return;
        }
        let Some(validator) = &self.validator else {
            return;
        };
        let ids: Vec<String> = dossier.sources.iter().filter_map(|s| s.doi.clone()).collect();
        if ids.is_empty() {
            return;
        }

        match validator.validate(&ids).await {
            Ok(results) => {
                let mut cleared = 0usize;
                for source in &mut dossier.sources {
                    let invalid = source
                        .doi
                        .as_ref()
                        .is_some_and(|doi| results.get(doi) == Some(&false));
                    if invalid {
                        source.doi = None;
                        cleared += 1;
                    }
                }
                debug!(chapter = dossier.chapter_number, checked = ids.len(), cleared, "DOIs validated");
            }
            Err(e) => {
                warn!(chapter = dossier.chapter_number, error = %e, "DOI validation unavailable, keeping identifiers");
            }
        }
    }
}
