//! The step orchestrator: renders a prompt from prior artifacts, calls the
//! generation layer, parses and validates the typed result, and persists it
//! with provenance metadata.

pub mod validate;

use crate::artifact::{sha256_hex, ArtifactError, ArtifactMetadata, ArtifactStore, ProjectState};
use crate::config::ModelTier;
use crate::generate::{
    extract::extract_json, FallbackGenerator, GenerationOrigin, ResponseFormat,
};
use crate::logging::{LogLevel, LogRecord, SharedLogSink};
use crate::metrics::Metrics;
use crate::prompts::{PromptError, PromptRegistry};
use crate::story::{
    count_words, Chapter, CharacterBibles, CharacterSummaries, CharacterSynopses,
    FirstThingsFirst, LongSynopsis, Manuscript, OnePageSynopsis, OneParagraphSummary,
    OneSentenceSummary, SceneBriefs, SceneList, SceneProse,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validate::ValidationError;

const TARGET_WORDS: u32 = 80_000;
const TARGET_CHAPTERS: u32 = 20;

/// How many trailing scenes of prose are fed back into the next scene's
/// prompt, and how many words of each are kept.
const RECENT_SCENES: usize = 2;
const RECENT_WORDS_PER_SCENE: usize = 400;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum StepId {
    FirstThingsFirst,
    OneSentenceSummary,
    OneParagraphSummary,
    CharacterSummaries,
    OnePageSynopsis,
    CharacterSynopses,
    LongSynopsis,
    CharacterBibles,
    SceneList,
    SceneBriefs,
    FirstDraft,
}

impl StepId {
    pub fn all() -> [StepId; 11] {
        [
            StepId::FirstThingsFirst,
            StepId::OneSentenceSummary,
            StepId::OneParagraphSummary,
            StepId::CharacterSummaries,
            StepId::OnePageSynopsis,
            StepId::CharacterSynopses,
            StepId::LongSynopsis,
            StepId::CharacterBibles,
            StepId::SceneList,
            StepId::SceneBriefs,
            StepId::FirstDraft,
        ]
    }

    pub fn from_number(n: u8) -> Option<StepId> {
        StepId::all().get(n as usize).copied()
    }

    pub fn number(self) -> u8 {
        self as u8
    }

    /// The artifact/prompt name of the step. The draft step keeps its own
    /// artifact name; its per-scene prompt is `scene_prose`.
    pub fn name(self) -> &'static str {
        match self {
            StepId::FirstThingsFirst => "first_things_first",
            StepId::OneSentenceSummary => "one_sentence_summary",
            StepId::OneParagraphSummary => "one_paragraph_summary",
            StepId::CharacterSummaries => "character_summaries",
            StepId::OnePageSynopsis => "one_page_synopsis",
            StepId::CharacterSynopses => "character_synopses",
            StepId::LongSynopsis => "long_synopsis",
            StepId::CharacterBibles => "character_bibles",
            StepId::SceneList => "scene_list",
            StepId::SceneBriefs => "scene_briefs",
            StepId::FirstDraft => "first_draft",
        }
    }

    /// Cheap models for the short planning steps, the quality rung for the
    /// long-form ones.
    pub fn tier(self) -> ModelTier {
        match self {
            StepId::FirstThingsFirst | StepId::OneSentenceSummary | StepId::OneParagraphSummary => {
                ModelTier::Fast
            }
            StepId::LongSynopsis | StepId::SceneBriefs | StepId::FirstDraft => ModelTier::Quality,
            _ => ModelTier::Balanced,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("there is no step {0}; steps run 0 through 10")]
    UnknownStep(u8),
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
    #[error(transparent)]
    Prompt(#[from] PromptError),
    #[error("step {step} response contained no recoverable JSON")]
    NoJson { step: u8 },
    #[error("step {step} response did not match the expected shape: {source}")]
    Parse {
        step: u8,
        #[source]
        source: serde_json::Error,
    },
    #[error("could not serialize an artifact for digesting: {source}")]
    Digest {
        #[source]
        source: serde_json::Error,
    },
    #[error("step {step} failed validation: {source}")]
    Validation {
        step: u8,
        #[source]
        source: ValidationError,
    },
}

pub struct Pipeline {
    store: ArtifactStore,
    prompts: PromptRegistry,
    generator: FallbackGenerator,
    log: SharedLogSink,
}

impl Pipeline {
    pub fn new(
        store: ArtifactStore,
        prompts: PromptRegistry,
        generator: FallbackGenerator,
        log: SharedLogSink,
    ) -> Self {
        Self {
            store,
            prompts,
            generator,
            log,
        }
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        self.generator.metrics()
    }

    /// Execute one step, overwriting any previous artifact for it.
    pub fn run_step(&self, project_id: &str, step: StepId) -> Result<(), StepError> {
        let mut state = self.store.load_project(project_id)?;
        self.log.log(LogRecord::for_step(
            LogLevel::Info,
            step.number(),
            format!("running {}", step.name()),
        ));
        let result = self.dispatch(&mut state, step);
        match &result {
            Ok(()) => self.generator.metrics().steps_completed.incr(),
            Err(err) => {
                self.generator.metrics().steps_failed.incr();
                self.log.log(LogRecord::for_step(
                    LogLevel::Error,
                    step.number(),
                    format!("{} failed: {err}", step.name()),
                ));
            }
        }
        result
    }

    /// Execute every step not yet completed, in order, stopping at the
    /// first failure. Returns the steps that actually ran.
    pub fn run_all(&self, project_id: &str) -> Result<Vec<StepId>, StepError> {
        let mut executed = Vec::new();
        for step in StepId::all() {
            let state = self.store.load_project(project_id)?;
            if state.is_completed(step.number()) {
                self.log.log(LogRecord::for_step(
                    LogLevel::Debug,
                    step.number(),
                    format!("{} already completed, skipping", step.name()),
                ));
                continue;
            }
            self.run_step(project_id, step)?;
            executed.push(step);
        }
        Ok(executed)
    }

    fn dispatch(&self, state: &mut ProjectState, step: StepId) -> Result<(), StepError> {
        match step {
            StepId::FirstThingsFirst => self.step_first_things_first(state),
            StepId::OneSentenceSummary => self.step_one_sentence_summary(state),
            StepId::OneParagraphSummary => self.step_one_paragraph_summary(state),
            StepId::CharacterSummaries => self.step_character_summaries(state),
            StepId::OnePageSynopsis => self.step_one_page_synopsis(state),
            StepId::CharacterSynopses => self.step_character_synopses(state),
            StepId::LongSynopsis => self.step_long_synopsis(state),
            StepId::CharacterBibles => self.step_character_bibles(state),
            StepId::SceneList => self.step_scene_list(state),
            StepId::SceneBriefs => self.step_scene_briefs(state),
            StepId::FirstDraft => self.step_first_draft(state),
        }
    }

    /// The shared tail of every single-prompt step: generate, recover JSON,
    /// parse, validate, persist with metadata, mark completed.
    fn execute<T>(
        &self,
        state: &mut ProjectState,
        step: StepId,
        prompt: String,
        upstream_digest: String,
        validate_fn: impl FnOnce(&T) -> Result<(), ValidationError>,
        markdown_fn: impl FnOnce(&T) -> String,
    ) -> Result<T, StepError>
    where
        T: Serialize + DeserializeOwned,
    {
        let generation = self
            .generator
            .generate(&prompt, step.tier(), ResponseFormat::Json);
        if generation.is_emergency() {
            self.log.log(LogRecord::for_step(
                LogLevel::Warn,
                step.number(),
                "content came from an emergency template, review before continuing".to_string(),
            ));
        }
        let value = extract_json(&generation.text).ok_or(StepError::NoJson {
            step: step.number(),
        })?;
        let content: T = serde_json::from_value(value).map_err(|source| StepError::Parse {
            step: step.number(),
            source,
        })?;
        validate_fn(&content).map_err(|source| StepError::Validation {
            step: step.number(),
            source,
        })?;

        self.persist(state, step, generation.origin, &prompt, upstream_digest, &content)?;
        self.store
            .write_markdown_twin(&state.project_id, step.number(), step.name(), &markdown_fn(&content))?;
        Ok(content)
    }

    fn persist<T: Serialize>(
        &self,
        state: &mut ProjectState,
        step: StepId,
        origin: GenerationOrigin,
        prompt: &str,
        upstream_digest: String,
        content: &T,
    ) -> Result<(), StepError> {
        let metadata = ArtifactMetadata {
            project_id: state.project_id.clone(),
            step: step.number(),
            step_name: step.name().to_string(),
            origin,
            prompt_sha256: sha256_hex(prompt),
            upstream_sha256: upstream_digest,
            created_at: chrono::Utc::now(),
        };
        self.store.write_artifact(&metadata, content)?;
        state.mark_completed(step.number());
        self.store.save_project(state)?;
        self.log.log(LogRecord::for_step(
            LogLevel::Info,
            step.number(),
            format!("{} completed", step.name()),
        ));
        Ok(())
    }

    fn read<T: DeserializeOwned>(&self, state: &ProjectState, step: StepId) -> Result<T, StepError> {
        let (_, content) =
            self.store
                .read_artifact(&state.project_id, step.number(), step.name())?;
        Ok(content)
    }

    fn step_first_things_first(&self, state: &mut ProjectState) -> Result<(), StepError> {
        let brief = state.brief.clone();
        let prompt = self.prompts.format_with(
            "first_things_first",
            [
                ("premise", brief.premise.as_str()),
                ("category", brief.category.as_str()),
                ("audience", brief.audience.as_str()),
                ("guidance", brief.guidance.as_str()),
            ],
        )?;
        let digest = digest_of(&brief)?;
        self.execute(
            state,
            StepId::FirstThingsFirst,
            prompt,
            digest,
            validate::first_things_first,
            |c: &FirstThingsFirst| {
                format!(
                    "# First things first\n\n- Category: {}\n- Audience: {}\n- Story kind: {}\n- Delight: {}\n",
                    c.category, c.target_audience, c.story_kind, c.delight
                )
            },
        )?;
        Ok(())
    }

    fn step_one_sentence_summary(&self, state: &mut ProjectState) -> Result<(), StepError> {
        let brief = state.brief.clone();
        let prompt = self.prompts.format_with(
            "one_sentence_summary",
            [
                ("premise", brief.premise.as_str()),
                ("category", brief.category.as_str()),
                ("audience", brief.audience.as_str()),
                ("guidance", brief.guidance.as_str()),
            ],
        )?;
        let digest = digest_of(&brief)?;
        self.execute(
            state,
            StepId::OneSentenceSummary,
            prompt,
            digest,
            validate::one_sentence_summary,
            |c: &OneSentenceSummary| format!("# One-sentence summary\n\n{}\n", c.logline),
        )?;
        Ok(())
    }

    fn step_one_paragraph_summary(&self, state: &mut ProjectState) -> Result<(), StepError> {
        let positioning: FirstThingsFirst = self.read(state, StepId::FirstThingsFirst)?;
        let logline: OneSentenceSummary = self.read(state, StepId::OneSentenceSummary)?;
        let positioning_text = format!(
            "{} for {}; {}",
            positioning.category, positioning.target_audience, positioning.story_kind
        );
        let prompt = self.prompts.format_with(
            "one_paragraph_summary",
            [
                ("logline", logline.logline.as_str()),
                ("positioning", positioning_text.as_str()),
            ],
        )?;
        let digest = digest_parts(&[digest_of(&positioning)?, digest_of(&logline)?]);
        self.execute(
            state,
            StepId::OneParagraphSummary,
            prompt,
            digest,
            validate::one_paragraph_summary,
            |c: &OneParagraphSummary| format!("# One-paragraph summary\n\n{}\n", c.as_paragraph()),
        )?;
        Ok(())
    }

    fn step_character_summaries(&self, state: &mut ProjectState) -> Result<(), StepError> {
        let logline: OneSentenceSummary = self.read(state, StepId::OneSentenceSummary)?;
        let paragraph: OneParagraphSummary = self.read(state, StepId::OneParagraphSummary)?;
        let paragraph_text = paragraph.as_paragraph();
        let prompt = self.prompts.format_with(
            "character_summaries",
            [
                ("logline", logline.logline.as_str()),
                ("paragraph_summary", paragraph_text.as_str()),
            ],
        )?;
        let digest = digest_parts(&[digest_of(&logline)?, digest_of(&paragraph)?]);
        self.execute(
            state,
            StepId::CharacterSummaries,
            prompt,
            digest,
            validate::character_summaries,
            characters_markdown,
        )?;
        Ok(())
    }

    fn step_one_page_synopsis(&self, state: &mut ProjectState) -> Result<(), StepError> {
        let paragraph: OneParagraphSummary = self.read(state, StepId::OneParagraphSummary)?;
        let characters: CharacterSummaries = self.read(state, StepId::CharacterSummaries)?;
        let paragraph_text = paragraph.as_paragraph();
        let characters_text = characters_text(&characters);
        let prompt = self.prompts.format_with(
            "one_page_synopsis",
            [
                ("paragraph_summary", paragraph_text.as_str()),
                ("characters", characters_text.as_str()),
            ],
        )?;
        let digest = digest_parts(&[digest_of(&paragraph)?, digest_of(&characters)?]);
        self.execute(
            state,
            StepId::OnePageSynopsis,
            prompt,
            digest,
            validate::one_page_synopsis,
            |c: &OnePageSynopsis| format!("# One-page synopsis\n\n{}\n", c.as_text()),
        )?;
        Ok(())
    }

    fn step_character_synopses(&self, state: &mut ProjectState) -> Result<(), StepError> {
        let synopsis: OnePageSynopsis = self.read(state, StepId::OnePageSynopsis)?;
        let characters: CharacterSummaries = self.read(state, StepId::CharacterSummaries)?;
        let synopsis_text = synopsis.as_text();
        let characters_text = characters_text(&characters);
        let prompt = self.prompts.format_with(
            "character_synopses",
            [
                ("synopsis", synopsis_text.as_str()),
                ("characters", characters_text.as_str()),
            ],
        )?;
        let digest = digest_parts(&[digest_of(&synopsis)?, digest_of(&characters)?]);
        self.execute(
            state,
            StepId::CharacterSynopses,
            prompt,
            digest,
            validate::character_synopses,
            |c: &CharacterSynopses| {
                let mut out = String::from("# Character synopses\n");
                for entry in &c.synopses {
                    out.push_str(&format!("\n## {}\n\n{}\n", entry.name, entry.synopsis));
                }
                out
            },
        )?;
        Ok(())
    }

    fn step_long_synopsis(&self, state: &mut ProjectState) -> Result<(), StepError> {
        let synopsis: OnePageSynopsis = self.read(state, StepId::OnePageSynopsis)?;
        let character_synopses: CharacterSynopses = self.read(state, StepId::CharacterSynopses)?;
        let synopsis_text = synopsis.as_text();
        let synopses_text = synopses_text(&character_synopses);
        let prompt = self.prompts.format_with(
            "long_synopsis",
            [
                ("synopsis", synopsis_text.as_str()),
                ("character_synopses", synopses_text.as_str()),
            ],
        )?;
        let digest = digest_parts(&[digest_of(&synopsis)?, digest_of(&character_synopses)?]);
        self.execute(
            state,
            StepId::LongSynopsis,
            prompt,
            digest,
            validate::long_synopsis,
            |c: &LongSynopsis| format!("# Long synopsis\n\n{}\n", c.synopsis),
        )?;
        Ok(())
    }

    fn step_character_bibles(&self, state: &mut ProjectState) -> Result<(), StepError> {
        let long_synopsis: LongSynopsis = self.read(state, StepId::LongSynopsis)?;
        let character_synopses: CharacterSynopses = self.read(state, StepId::CharacterSynopses)?;
        let synopses_text = synopses_text(&character_synopses);
        let prompt = self.prompts.format_with(
            "character_bibles",
            [
                ("long_synopsis", long_synopsis.synopsis.as_str()),
                ("character_synopses", synopses_text.as_str()),
            ],
        )?;
        let digest = digest_parts(&[digest_of(&long_synopsis)?, digest_of(&character_synopses)?]);
        self.execute(
            state,
            StepId::CharacterBibles,
            prompt,
            digest,
            validate::character_bibles,
            |c: &CharacterBibles| {
                let mut out = String::from("# Character bibles\n");
                for bible in &c.bibles {
                    out.push_str(&format!(
                        "\n## {}\n\n- Physical: {}\n- Personality: {}\n- Environment: {}\n- Psychology: {}\n",
                        bible.name, bible.physical, bible.personality, bible.environment,
                        bible.psychology
                    ));
                }
                out
            },
        )?;
        Ok(())
    }

    fn step_scene_list(&self, state: &mut ProjectState) -> Result<(), StepError> {
        let long_synopsis: LongSynopsis = self.read(state, StepId::LongSynopsis)?;
        let bibles: CharacterBibles = self.read(state, StepId::CharacterBibles)?;
        let bibles_text = bibles_text(&bibles);
        let target_words = TARGET_WORDS.to_string();
        let target_chapters = TARGET_CHAPTERS.to_string();
        let prompt = self.prompts.format_with(
            "scene_list",
            [
                ("long_synopsis", long_synopsis.synopsis.as_str()),
                ("characters", bibles_text.as_str()),
                ("target_words", target_words.as_str()),
                ("target_chapters", target_chapters.as_str()),
            ],
        )?;
        let digest = digest_parts(&[digest_of(&long_synopsis)?, digest_of(&bibles)?]);
        let scenes = self.execute(
            state,
            StepId::SceneList,
            prompt,
            digest,
            validate::scene_list,
            scene_list_markdown,
        )?;
        self.store.write_scene_list_csv(&state.project_id, &scenes)?;
        Ok(())
    }

    fn step_scene_briefs(&self, state: &mut ProjectState) -> Result<(), StepError> {
        let long_synopsis: LongSynopsis = self.read(state, StepId::LongSynopsis)?;
        let scenes: SceneList = self.read(state, StepId::SceneList)?;
        let scenes_text = scenes_text(&scenes);
        let prompt = self.prompts.format_with(
            "scene_briefs",
            [
                ("long_synopsis", long_synopsis.synopsis.as_str()),
                ("scenes", scenes_text.as_str()),
            ],
        )?;
        let digest = digest_parts(&[digest_of(&long_synopsis)?, digest_of(&scenes)?]);
        self.execute(
            state,
            StepId::SceneBriefs,
            prompt,
            digest,
            |briefs: &SceneBriefs| validate::scene_briefs(&scenes, briefs),
            scene_briefs_markdown,
        )?;
        Ok(())
    }

    /// Step 10 runs one generation per scene and assembles the manuscript,
    /// so it does not go through the single-prompt path.
    fn step_first_draft(&self, state: &mut ProjectState) -> Result<(), StepError> {
        let step = StepId::FirstDraft;
        let long_synopsis: LongSynopsis = self.read(state, StepId::LongSynopsis)?;
        let scenes: SceneList = self.read(state, StepId::SceneList)?;
        let briefs: SceneBriefs = self.read(state, StepId::SceneBriefs)?;
        validate::scene_briefs(&scenes, &briefs).map_err(|source| StepError::Validation {
            step: step.number(),
            source,
        })?;

        #[derive(Deserialize)]
        struct ProseOnly {
            prose: String,
        }

        let scene_count = scenes.scenes.len();
        let mut drafted: Vec<SceneProse> = Vec::with_capacity(scene_count);
        let mut origin = None;
        let mut prompt_hashes: Vec<String> = Vec::with_capacity(scene_count);

        for (position, scene) in scenes.scenes.iter().enumerate() {
            let brief = &briefs.briefs[position];
            let brief_json = serde_json::to_string_pretty(brief)
                .map_err(|source| StepError::Digest { source })?;
            let scene_number = scene.index.to_string();
            let total = scene_count.to_string();
            let word_target = scene.word_target.to_string();
            let recent = recent_context(&drafted);
            let prompt = self.prompts.format_with(
                "scene_prose",
                [
                    ("scene_number", scene_number.as_str()),
                    ("scene_count", total.as_str()),
                    ("pov", scene.pov.as_str()),
                    ("word_target", word_target.as_str()),
                    ("brief", brief_json.as_str()),
                    ("recent_prose", recent.as_str()),
                    ("long_synopsis", long_synopsis.synopsis.as_str()),
                ],
            )?;
            prompt_hashes.push(sha256_hex(&prompt));

            let generation = self
                .generator
                .generate(&prompt, step.tier(), ResponseFormat::Json);
            if generation.is_emergency() {
                self.log.log(LogRecord::for_step(
                    LogLevel::Warn,
                    step.number(),
                    format!("scene {} prose came from an emergency template", scene.index),
                ));
            }
            // The manuscript's recorded origin degrades to emergency as soon
            // as any scene does.
            match (&origin, &generation.origin) {
                (_, emergency @ GenerationOrigin::Emergency { .. }) => {
                    origin = Some(emergency.clone());
                }
                (None | Some(GenerationOrigin::Model { .. }), model) => {
                    origin = Some(model.clone());
                }
                (Some(GenerationOrigin::Emergency { .. }), _) => {}
            }

            let value = extract_json(&generation.text).ok_or(StepError::NoJson {
                step: step.number(),
            })?;
            let parsed: ProseOnly =
                serde_json::from_value(value).map_err(|source| StepError::Parse {
                    step: step.number(),
                    source,
                })?;
            drafted.push(SceneProse {
                scene: scene.index,
                pov: scene.pov.clone(),
                word_count: count_words(&parsed.prose),
                prose: parsed.prose,
            });
        }

        let manuscript = assemble_manuscript(&state.project_id, &scenes, drafted);
        validate::manuscript(&manuscript).map_err(|source| StepError::Validation {
            step: step.number(),
            source,
        })?;

        let upstream = digest_parts(&[
            digest_of(&long_synopsis)?,
            digest_of(&scenes)?,
            digest_of(&briefs)?,
        ]);
        let prompt_hash = digest_parts(&prompt_hashes);
        let metadata = ArtifactMetadata {
            project_id: state.project_id.clone(),
            step: step.number(),
            step_name: step.name().to_string(),
            origin: origin.unwrap_or(GenerationOrigin::Emergency {
                template: crate::generate::emergency::EmergencyKind::Prose,
            }),
            prompt_sha256: prompt_hash,
            upstream_sha256: upstream,
            created_at: chrono::Utc::now(),
        };
        self.store.write_artifact(&metadata, &manuscript)?;
        self.store.write_markdown_twin(
            &state.project_id,
            step.number(),
            step.name(),
            &crate::export::markdown::manuscript_to_markdown(&manuscript),
        )?;
        state.mark_completed(step.number());
        self.store.save_project(state)?;
        self.log.log(LogRecord::for_step(
            LogLevel::Info,
            step.number(),
            format!(
                "first draft completed: {} scenes, {} words",
                manuscript.scene_count(),
                manuscript.word_count()
            ),
        ));
        Ok(())
    }
}

fn digest_of<T: Serialize>(value: &T) -> Result<String, StepError> {
    let raw = serde_json::to_string(value).map_err(|source| StepError::Digest { source })?;
    Ok(sha256_hex(&raw))
}

fn digest_parts(parts: &[String]) -> String {
    sha256_hex(&parts.join("\n"))
}

fn characters_text(characters: &CharacterSummaries) -> String {
    characters
        .characters
        .iter()
        .map(|c| format!("- {} ({}): {}", c.name, c.role, c.arc_one_paragraph))
        .collect::<Vec<_>>()
        .join("\n")
}

fn synopses_text(synopses: &CharacterSynopses) -> String {
    synopses
        .synopses
        .iter()
        .map(|s| format!("{}:\n{}", s.name, s.synopsis))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn bibles_text(bibles: &CharacterBibles) -> String {
    bibles
        .bibles
        .iter()
        .map(|b| format!("- {}: {} {}", b.name, b.personality, b.psychology))
        .collect::<Vec<_>>()
        .join("\n")
}

fn scenes_text(scenes: &SceneList) -> String {
    scenes
        .scenes
        .iter()
        .map(|s| {
            format!(
                "{}. [ch {}] POV {}, ~{} words: {}",
                s.index, s.chapter_hint, s.pov, s.word_target, s.summary
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn characters_markdown(characters: &CharacterSummaries) -> String {
    let mut out = String::from("# Character summaries\n");
    for c in &characters.characters {
        out.push_str(&format!(
            "\n## {} ({})\n\n- Goal: {}\n- Ambition: {}\n- Conflict: {}\n- Epiphany: {}\n\n{}\n",
            c.name, c.role, c.goal, c.ambition, c.conflict, c.epiphany, c.arc_one_paragraph
        ));
    }
    out
}

fn scene_list_markdown(scenes: &SceneList) -> String {
    let mut out = String::from(
        "# Scene list\n\n| # | Chapter | POV | Words | Summary |\n|---|---------|-----|-------|---------|\n",
    );
    for s in &scenes.scenes {
        out.push_str(&format!(
            "| {} | {} | {} | {} | {} |\n",
            s.index, s.chapter_hint, s.pov, s.word_target, s.summary
        ));
    }
    out
}

fn scene_briefs_markdown(briefs: &SceneBriefs) -> String {
    let mut out = String::from("# Scene briefs\n");
    for b in &briefs.briefs {
        out.push_str(&format!(
            "\n## Scene {} ({}, POV {})\n\n",
            b.scene, b.scene_type, b.pov
        ));
        for (label, value) in [
            ("Goal", &b.goal),
            ("Conflict", &b.conflict),
            ("Setback", &b.setback),
            ("Reaction", &b.reaction),
            ("Dilemma", &b.dilemma),
            ("Decision", &b.decision),
        ] {
            if let Some(text) = value {
                out.push_str(&format!("- {label}: {text}\n"));
            }
        }
        out.push_str(&format!("- Stakes: {}\n", b.stakes));
    }
    out
}

/// The tail of the last few drafted scenes, newest first, for continuity in
/// the next scene's prompt.
fn recent_context(drafted: &[SceneProse]) -> String {
    if drafted.is_empty() {
        return "(this is the opening scene)".to_string();
    }
    drafted
        .iter()
        .rev()
        .take(RECENT_SCENES)
        .map(|scene| {
            let words: Vec<&str> = scene.prose.split_whitespace().collect();
            let tail = if words.len() > RECENT_WORDS_PER_SCENE {
                let mut text = String::from("...");
                text.push_str(&words[words.len() - RECENT_WORDS_PER_SCENE..].join(" "));
                text
            } else {
                words.join(" ")
            };
            format!("Scene {} (POV {}):\n{}", scene.scene, scene.pov, tail)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Group drafted scenes into chapters by their step-8 chapter hint,
/// preserving scene order.
fn assemble_manuscript(project_id: &str, scenes: &SceneList, drafted: Vec<SceneProse>) -> Manuscript {
    let mut chapters: Vec<Chapter> = Vec::new();
    for (entry, prose) in scenes.scenes.iter().zip(drafted) {
        match chapters.last_mut() {
            Some(chapter) if chapter.number == entry.chapter_hint => chapter.scenes.push(prose),
            _ => chapters.push(Chapter {
                number: entry.chapter_hint,
                scenes: vec![prose],
            }),
        }
    }
    Manuscript {
        title: project_id.replace(['-', '_'], " "),
        chapters,
    }
}
