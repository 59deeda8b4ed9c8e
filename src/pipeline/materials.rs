//! Material fan-out for a finished chapter body.
//!
//! Quizzes run in a small heavy pool, the remaining materials in a larger
//! light pool, and both pools run at the same time. Every material is
//! independent: a failure leaves its field empty and never touches the
//! others.

use anyhow::{anyhow, bail};
use tracing::{debug, info, warn};

use crate::course::{
    activities_from_value, discussion_from_value, questions_from_value, slides_from_value, Activity,
    ChapterSyllabus, DiscussionPrompt, GeneratedChapter, MaterialKind, QuizQuestion, Slide,
};
use crate::error::StoreError;
use crate::export::ExportDocument;
use crate::llm::{GenerationRequest, ThinkingEffort};
use crate::prompts::material_prompt;
use crate::quiz::{rebalance_distractors, rebalance_practice_quiz, VersionSet};
use crate::scheduler::{run_bounded, Task};
use crate::storage::{keys, read_json_lenient, read_text, write_json, write_text};
use crate::utils::{pad, parse_json, Wrap};

use super::events::PipelineEvent;
use super::orchestrator::CoursePipeline;

/// A generated or reloaded material, ready to be stored on its chapter.
#[derive(Debug, Clone, PartialEq)]
pub(super) enum MaterialOutput {
    PracticeQuiz(String),
    InClassQuiz(Vec<QuizQuestion>),
    Discussion(Vec<DiscussionPrompt>),
    Activities(Vec<Activity>),
    /// Transcript plus the key of its narration, when one exists.
    AudioTranscript { transcript: String, asset: Option<String> },
    Slides(Vec<Slide>),
    Infographic { prompt: String, asset: String },
}

impl MaterialOutput {
    pub(super) fn kind(&self) -> MaterialKind {
        match self {
            MaterialOutput::PracticeQuiz(_) => MaterialKind::PracticeQuiz,
            MaterialOutput::InClassQuiz(_) => MaterialKind::InClassQuiz,
            MaterialOutput::Discussion(_) => MaterialKind::Discussion,
            MaterialOutput::Activities(_) => MaterialKind::Activities,
            MaterialOutput::AudioTranscript { .. } => MaterialKind::AudioTranscript,
            MaterialOutput::Slides(_) => MaterialKind::Slides,
            MaterialOutput::Infographic { .. } => MaterialKind::Infographic,
        }
    }

    /// Stores the material on `chapter`, replacing any previous value.
    pub(super) fn apply(self, chapter: &mut GeneratedChapter) {
        match self {
            MaterialOutput::PracticeQuiz(text) => chapter.practice_quiz = Some(text),
            MaterialOutput::InClassQuiz(questions) => chapter.in_class_quiz = Some(questions),
            MaterialOutput::Discussion(prompts) => chapter.discussion = Some(prompts),
            MaterialOutput::Activities(activities) => chapter.activities = Some(activities),
            MaterialOutput::AudioTranscript { transcript, asset } => {
                chapter.audio_transcript = Some(transcript);
                chapter.audio_asset = asset;
            }
            MaterialOutput::Slides(slides) => chapter.slides = Some(slides),
            MaterialOutput::Infographic { prompt, asset } => {
                chapter.infographic_prompt = Some(prompt);
                chapter.infographic_asset = Some(asset);
            }
        }
    }
}

fn material_label(kind: MaterialKind, chapter: u32) -> String {
    format!("ch{}-{}", pad(chapter), kind)
}

impl CoursePipeline {
    /// Model, reasoning effort and answer budget for `kind`.
    fn material_settings(&self, kind: MaterialKind) -> (&str, ThinkingEffort, u32) {
        let limits = &self.config.limits;
        match kind {
            MaterialKind::PracticeQuiz | MaterialKind::InClassQuiz => {
                (self.config.heavy_model.as_str(), ThinkingEffort::High, limits.quiz)
            }
            MaterialKind::AudioTranscript => (self.config.standard_model.as_str(), ThinkingEffort::Medium, limits.audio),
            MaterialKind::Infographic => (self.config.heavy_model.as_str(), ThinkingEffort::Medium, limits.infographic),
            MaterialKind::Discussion | MaterialKind::Activities | MaterialKind::Slides => {
                (self.config.standard_model.as_str(), ThinkingEffort::Medium, limits.light)
            }
        }
    }

    /// Materials this pipeline can produce, in [`MaterialKind::ALL`] order.
    pub(super) fn producible_materials(&self) -> Vec<MaterialKind> {
        MaterialKind::ALL
            .into_iter()
            .filter(|kind| *kind != MaterialKind::Infographic || self.images.is_some())
            .collect()
    }

    /// True when `kind` needs no further work on `chapter`. With speech
    /// configured an audio transcript also needs its narration, and an
    /// infographic always needs its image.
    pub(super) fn material_complete(&self, chapter: &GeneratedChapter, kind: MaterialKind) -> bool {
        match kind {
            MaterialKind::AudioTranscript => {
                chapter.audio_transcript.is_some() && (self.speech.is_none() || chapter.audio_asset.is_some())
            }
            MaterialKind::Infographic => chapter.infographic_prompt.is_some() && chapter.infographic_asset.is_some(),
            _ => chapter.has(kind),
        }
    }

    /// Producible materials that `chapter` still lacks.
    pub(super) fn missing_materials(&self, chapter: &GeneratedChapter) -> Vec<MaterialKind> {
        self.producible_materials()
            .into_iter()
            .filter(|kind| !self.material_complete(chapter, *kind))
            .collect()
    }

    /// Fills every producible material `chapter` lacks, reusing checkpoints
    /// and generating the rest in the heavy and light pools.
    pub(super) async fn fill_materials(
        &self,
        syllabus_chapter: &ChapterSyllabus,
        chapter: &mut GeneratedChapter,
    ) -> anyhow::Result<()> {
        let number = chapter.number;
        let mut missing = Vec::new();
        for kind in self.missing_materials(chapter) {
            match self.load_material(kind, number).await? {
                Some(output) => {
                    debug!(chapter = number, kind = %output.kind(), "Material checkpoint found");
                    output.apply(chapter);
                }
                None => missing.push(kind),
            }
        }
        if missing.is_empty() {
            return Ok(());
        }

        let (heavy, light): (Vec<MaterialKind>, Vec<MaterialKind>) =
            missing.into_iter().partition(|kind| kind.is_heavy());
        info!(
            chapter = number,
            heavy = heavy.len(),
            light = light.len(),
            "Generating chapter materials"
        );

        let html = chapter.html_content.clone();
        let (heavy_done, light_done) = tokio::join!(
            run_bounded(
                self.material_tasks(&heavy, syllabus_chapter, &html),
                self.config.heavy_concurrency
            ),
            run_bounded(
                self.material_tasks(&light, syllabus_chapter, &html),
                self.config.light_concurrency
            ),
        );

        let kinds = heavy.iter().chain(light.iter());
        let outcomes = heavy_done?.into_iter().chain(light_done?);
        for (&kind, outcome) in kinds.zip(outcomes) {
            match outcome.into_result() {
                Ok(output) => {
                    output.apply(chapter);
                    self.emit(PipelineEvent::MaterialCompleted { chapter: number, kind }).await;
                }
                Err(e) => {
                    warn!(chapter = number, kind = %kind, error = %e, "Material generation failed");
                    self.emit(PipelineEvent::MaterialFailed {
                        chapter: number,
                        kind,
                        error: e.to_string(),
                    })
                    .await;
                }
            }
        }
        Ok(())
    }

    fn material_tasks<'a>(
        &'a self,
        kinds: &[MaterialKind],
        chapter: &'a ChapterSyllabus,
        html: &'a str,
    ) -> Vec<Task<'a, MaterialOutput>> {
        kinds
            .iter()
            .map(|&kind| {
                Task::new(
                    material_label(kind, chapter.number),
                    self.complete_material(kind, chapter, html),
                )
            })
            .collect()
    }

    /// Reads the checkpoint of one material. An infographic counts as
    /// present only when both its prompt and its image exist, and an audio
    /// transcript only once narrated when speech is configured.
    pub(super) async fn load_material(
        &self,
        kind: MaterialKind,
        chapter: u32,
    ) -> Result<Option<MaterialOutput>, StoreError> {
        let store = self.store.as_ref();
        let key = keys::material(kind, chapter);
        let output = match kind {
            MaterialKind::PracticeQuiz => read_text(store, &key).await?.map(MaterialOutput::PracticeQuiz),
            MaterialKind::InClassQuiz => read_json_lenient(store, &key).await?.map(MaterialOutput::InClassQuiz),
            MaterialKind::Discussion => read_json_lenient(store, &key).await?.map(MaterialOutput::Discussion),
            MaterialKind::Activities => read_json_lenient(store, &key).await?.map(MaterialOutput::Activities),
            MaterialKind::AudioTranscript => {
                let Some(transcript) = read_text(store, &key).await? else {
                    return Ok(None);
                };
                let asset = store.list(&format!("audio/{}.", pad(chapter))).await?.into_iter().next();
                if asset.is_none() && self.speech.is_some() {
                    return Ok(None);
                }
                Some(MaterialOutput::AudioTranscript { transcript, asset })
            }
            MaterialKind::Slides => read_json_lenient(store, &key).await?.map(MaterialOutput::Slides),
            MaterialKind::Infographic => {
                let Some(prompt) = read_text(store, &key).await? else {
                    return Ok(None);
                };
                let prefix = format!("infographic/{}.", pad(chapter));
                store
                    .list(&prefix)
                    .await?
                    .into_iter()
                    .next()
                    .map(|asset| MaterialOutput::Infographic { prompt, asset })
            }
        };
        Ok(output)
    }

    /// Produces a missing material, narrating an existing transcript instead
    /// of writing a new one when only the audio is absent.
    async fn complete_material(
        &self,
        kind: MaterialKind,
        chapter: &ChapterSyllabus,
        html: &str,
    ) -> anyhow::Result<MaterialOutput> {
        if kind == MaterialKind::AudioTranscript && self.speech.is_some() {
            let key = keys::material(kind, chapter.number);
            if let Some(transcript) = read_text(self.store.as_ref(), &key).await? {
                let asset = self.narrate(chapter.number, &transcript).await?;
                info!(chapter = chapter.number, "Transcript narrated");
                return Ok(MaterialOutput::AudioTranscript { transcript, asset });
            }
        }
        self.generate_material(kind, chapter, html).await
    }

    /// Synthesizes `transcript` and writes the audio file. Returns `None`
    /// when no speech generator is configured.
    async fn narrate(&self, chapter: u32, transcript: &str) -> anyhow::Result<Option<String>> {
        let Some(speech) = self.speech.as_ref() else {
            return Ok(None);
        };
        let audio = speech.synthesize(transcript).await?;
        let asset = keys::audio_file(chapter, audio.extension());
        self.store.write(&asset, &audio.bytes).await?;
        debug!(chapter, asset = %asset, bytes = audio.bytes.len(), "Narration written");
        Ok(Some(asset))
    }

    /// Generates one material and writes its checkpoints.
    ///
    /// Checkpoints are written only after the output is complete, so a
    /// failure leaves any previous version in place.
    pub(super) async fn generate_material(
        &self,
        kind: MaterialKind,
        chapter: &ChapterSyllabus,
        html: &str,
    ) -> anyhow::Result<MaterialOutput> {
        let number = chapter.number;
        let label = material_label(kind, number);
        let images = match kind {
            MaterialKind::Infographic => Some(
                self.images
                    .as_ref()
                    .ok_or_else(|| anyhow!("no image generator configured"))?,
            ),
            _ => None,
        };

        let (model, effort, max_tokens) = self.material_settings(kind);
        let prompt = material_prompt(kind, &self.setup, chapter, html);
        let request = GenerationRequest::new(&label, model, prompt.system)
            .with_user_message(prompt.user)
            .with_thinking(effort)
            .with_max_tokens(max_tokens);

        let text = self.call(request, |_| None).await?;
        let store = self.store.as_ref();
        let key = keys::material(kind, number);

        let output = match kind {
            MaterialKind::PracticeQuiz => {
                let body = text.trim();
                if body.is_empty() {
                    bail!("{} returned an empty response", label);
                }
                let body = rebalance_practice_quiz(
                    self.service.as_ref(),
                    &self.config.fast_model,
                    &self.config.retry,
                    &label,
                    body,
                )
                .await;
                write_text(store, &key, &body).await?;
                MaterialOutput::PracticeQuiz(body)
            }
            MaterialKind::AudioTranscript => {
                let transcript = text.trim();
                if transcript.is_empty() {
                    bail!("{} returned an empty response", label);
                }
                let asset = self.narrate(number, transcript).await?;
                write_text(store, &key, transcript).await?;
                MaterialOutput::AudioTranscript {
                    transcript: transcript.to_string(),
                    asset,
                }
            }
            MaterialKind::InClassQuiz => {
                let questions = questions_from_value(&parse_json(&text, Wrap::Array)?)?;
                if questions.is_empty() {
                    bail!("{} contained no usable questions", label);
                }
                let questions = rebalance_distractors(
                    self.service.as_ref(),
                    &self.config.fast_model,
                    &self.config.retry,
                    &label,
                    questions,
                )
                .await;
                let versions = VersionSet::build(&questions, self.config.quiz_versions);
                write_json(store, &key, &questions).await?;
                write_json(store, &keys::in_class_versions(number), &versions).await?;
                self.export(&ExportDocument::InClassQuiz {
                    chapter,
                    questions: &questions,
                    versions: &versions,
                })
                .await;
                MaterialOutput::InClassQuiz(questions)
            }
            MaterialKind::Discussion => {
                let prompts = discussion_from_value(&parse_json(&text, Wrap::Array)?)?;
                write_json(store, &key, &prompts).await?;
                self.export(&ExportDocument::Discussion {
                    chapter,
                    prompts: &prompts,
                })
                .await;
                MaterialOutput::Discussion(prompts)
            }
            MaterialKind::Activities => {
                let activities = activities_from_value(&parse_json(&text, Wrap::Array)?)?;
                write_json(store, &key, &activities).await?;
                self.export(&ExportDocument::Activities {
                    chapter,
                    activities: &activities,
                })
                .await;
                MaterialOutput::Activities(activities)
            }
            MaterialKind::Slides => {
                let slides = slides_from_value(&parse_json(&text, Wrap::Array)?)?;
                write_json(store, &key, &slides).await?;
                self.export(&ExportDocument::Slides {
                    chapter,
                    slides: &slides,
                })
                .await;
                MaterialOutput::Slides(slides)
            }
            MaterialKind::Infographic => {
                let prompt = text.trim();
                if prompt.is_empty() {
                    bail!("{} returned an empty image prompt", label);
                }
                let Some(images) = images else {
                    bail!("no image generator configured");
                };
                let image = images.generate_image(prompt).await?;
                let asset = keys::infographic_image(number, image.extension());
                store.write(&asset, &image.bytes).await?;
                write_text(store, &key, prompt).await?;
                MaterialOutput::Infographic {
                    prompt: prompt.to_string(),
                    asset,
                }
            }
        };

        info!(chapter = number, kind = %kind, "Material generated");
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_replaces_field() {
        let mut chapter = GeneratedChapter::new(1, "Seeing", "<html></html>");
        MaterialOutput::PracticeQuiz("old".to_string()).apply(&mut chapter);
        MaterialOutput::PracticeQuiz("new".to_string()).apply(&mut chapter);
        assert_eq!(chapter.practice_quiz.as_deref(), Some("new"));

        let output = MaterialOutput::Infographic {
            prompt: "diagram".to_string(),
            asset: "infographic/01.png".to_string(),
        };
        assert_eq!(output.kind(), MaterialKind::Infographic);
        output.apply(&mut chapter);
        assert_eq!(
            chapter.present_materials(),
            vec![MaterialKind::PracticeQuiz, MaterialKind::Infographic]
        );
    }

    #[test]
    fn test_apply_audio_replaces_asset() {
        let mut chapter = GeneratedChapter::new(2, "Storage", "<html></html>");
        MaterialOutput::AudioTranscript {
            transcript: "first".to_string(),
            asset: Some("audio/02.mp3".to_string()),
        }
        .apply(&mut chapter);
        assert_eq!(chapter.audio_asset.as_deref(), Some("audio/02.mp3"));

        MaterialOutput::AudioTranscript {
            transcript: "second".to_string(),
            asset: None,
        }
        .apply(&mut chapter);
        assert_eq!(chapter.audio_transcript.as_deref(), Some("second"));
        assert!(chapter.audio_asset.is_none());
    }

    #[test]
    fn test_material_label() {
        assert_eq!(material_label(MaterialKind::InClassQuiz, 3), "ch03-in-class-quiz");
    }
}
