//! End-to-end pipeline runs against a scripted model invoker.

use snowflake_core::artifact::ArtifactStore;
use snowflake_core::config::{Config, ModelKey, ProviderConfig, RetryPolicy};
use snowflake_core::generate::{FallbackGenerator, InvokeError, ModelInvoker};
use snowflake_core::logging::{LogLevel, VecLogSink};
use snowflake_core::metrics::Metrics;
use snowflake_core::pipeline::{Pipeline, StepError, StepId};
use snowflake_core::prompts::PromptRegistry;
use snowflake_core::story::{Manuscript, StoryBrief};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

struct QueuedInvoker {
    responses: Mutex<VecDeque<Result<String, String>>>,
}

impl QueuedInvoker {
    fn new(responses: Vec<&str>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(|r| Ok(r.to_string())).collect()),
        }
    }

    fn failing() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
        }
    }
}

impl ModelInvoker for QueuedInvoker {
    fn invoke(&self, _key: &ModelKey, _prompt: &str) -> Result<String, InvokeError> {
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err("provider unreachable".to_string()))
            .map_err(InvokeError::from)
    }
}

fn test_config() -> Config {
    let mut config = Config::default();
    config.providers.insert(
        "openai".into(),
        ProviderConfig {
            api_key: "sk-test".into(),
            ..ProviderConfig::default()
        },
    );
    config.retry = RetryPolicy {
        max_attempts: 1,
        base_delay_ms: 0,
        max_delay_ms: 0,
        jitter_ms: 0,
    };
    config
}

fn pipeline_with(
    invoker: Arc<dyn ModelInvoker>,
    root: &std::path::Path,
    log: Arc<VecLogSink>,
) -> Pipeline {
    let generator = FallbackGenerator::new(
        invoker,
        test_config(),
        Arc::new(Metrics::default()),
        log,
    );
    Pipeline::new(
        ArtifactStore::new(root),
        PromptRegistry::new().unwrap(),
        generator,
        Arc::new(VecLogSink::new()),
    )
}

fn scripted_responses() -> Vec<&'static str> {
    vec![
        // step 0
        r#"{"category": "Fantasy", "target_audience": "Adult readers of literary fantasy",
            "story_kind": "a wonder-driven mystery", "delight": "A city that redraws itself every night."}"#,
        // step 1
        r#"{"logline": "A mapmaker must pin down her shifting city before it erases everyone she loves."}"#,
        // step 2
        r#"{"sentence_1": "Mara maps a city that quietly redraws itself at night.",
            "sentence_2": "The erasure of her own street forces her to join the cartographers' guild.",
            "sentence_3": "Her mentor vanishes along with an entire district.",
            "sentence_4": "The city begins rerouting streets to trap her.",
            "sentence_5": "Mara redraws the city by hand and fixes it in place at a cost."}"#,
        // step 3
        r#"{"characters": [{"name": "Mara", "role": "protagonist",
            "goal": "Fix the city's map in place", "ambition": "To make a home that cannot be taken",
            "values": ["Nothing matters more than the people on the map."],
            "conflict": "The city itself resists being pinned down",
            "epiphany": "The city moves because it is afraid",
            "arc_one_sentence": "A cautious surveyor becomes the city's negotiator.",
            "arc_one_paragraph": "Mara starts as a careful observer. Losing her street drags her in. She learns the city is alive. She bargains instead of conquering. She ends as its steward."}]}"#,
        // step 4
        r#"{"paragraph_1": "Mara spends her nights surveying a city nobody else notices changing.",
            "paragraph_2": "When her own street is erased she is forced into the guild's secret war with the map.",
            "paragraph_3": "Her mentor disappears with a whole district and the guild splinters.",
            "paragraph_4": "The city reroutes itself to corner her in a dead-end borough.",
            "paragraph_5": "Mara negotiates with the city and anchors it, trading away her own house."}"#,
        // step 5
        r#"{"synopses": [{"name": "Mara", "synopsis": "From Mara's view the story is about losing a home twice and choosing which loss to keep."}]}"#,
        // step 6
        r#"{"synopsis": "A long synopsis expanding every disaster: the survey, the erasure, the guild, the vanished district, the cornering, and the final anchoring of the city."}"#,
        // step 7
        r#"{"bibles": [{"name": "Mara", "physical": "Ink-stained hands, wiry",
            "personality": "Methodical, quietly stubborn", "environment": "A rented attic full of maps",
            "psychology": "Fears impermanence; controls it by drawing"}]}"#,
        // step 8
        r#"{"scenes": [
            {"index": 1, "chapter_hint": 1, "pov": "Mara", "summary": "Mara notices her street is gone.", "word_target": 1200},
            {"index": 2, "chapter_hint": 2, "pov": "Mara", "summary": "Mara confronts the guild.", "word_target": 1500}]}"#,
        // step 9
        r#"{"briefs": [
            {"scene": 1, "type": "Proactive", "pov": "Mara",
             "goal": "Verify the street is truly gone", "conflict": "The city hides the evidence",
             "setback": "Her survey notes have changed too", "stakes": "Her trust in her own records"},
            {"scene": 2, "type": "Reactive", "pov": "Mara",
             "reaction": "Fury at the guild's silence", "dilemma": "Expose them or join them",
             "decision": "Join them to learn the truth", "stakes": "Her independence"}]}"#,
        // step 10, one response per scene
        r#"{"prose": "The street was gone. Mara checked her notes three times before she believed the paper over her memory."}"#,
        r#"{"prose": "The guild hall smelled of wax and old rivers. Mara put her notes on the table and did not sit down."}"#,
    ]
}

#[test]
fn run_all_walks_every_step_and_persists_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let log = Arc::new(VecLogSink::new());
    let pipeline = pipeline_with(
        Arc::new(QueuedInvoker::new(scripted_responses())),
        dir.path(),
        Arc::clone(&log),
    );

    pipeline
        .store()
        .init_project(
            "midnight-cartographer",
            StoryBrief {
                category: "Fantasy".into(),
                audience: "Adult".into(),
                premise: "A city redraws itself at night.".into(),
                guidance: String::new(),
            },
        )
        .unwrap();

    let executed = pipeline.run_all("midnight-cartographer").unwrap();
    assert_eq!(executed.len(), 11);

    let state = pipeline.store().load_project("midnight-cartographer").unwrap();
    for step in StepId::all() {
        assert!(state.is_completed(step.number()), "step {} incomplete", step.number());
    }

    let project_dir = pipeline.store().project_dir("midnight-cartographer");
    assert!(project_dir.join("step_1_one_sentence_summary.json").exists());
    assert!(project_dir.join("step_1_one_sentence_summary.md").exists());
    assert!(project_dir.join("scene_list.csv").exists());
    assert!(project_dir.join("step_10_first_draft.json").exists());

    let (metadata, manuscript): (_, Manuscript) = pipeline
        .store()
        .read_artifact("midnight-cartographer", 10, "first_draft")
        .unwrap();
    assert_eq!(manuscript.chapters.len(), 2);
    assert_eq!(manuscript.scene_count(), 2);
    assert!(manuscript.word_count() > 0);
    assert!(!metadata.prompt_sha256.is_empty());

    // A second run has nothing left to do.
    let executed_again = pipeline.run_all("midnight-cartographer").unwrap();
    assert!(executed_again.is_empty());
}

#[test]
fn total_outage_fails_the_stage_but_surfaces_the_fallback() {
    let dir = tempfile::tempdir().unwrap();
    let log = Arc::new(VecLogSink::new());
    let pipeline = pipeline_with(Arc::new(QueuedInvoker::failing()), dir.path(), Arc::clone(&log));

    pipeline
        .store()
        .init_project(
            "doomed",
            StoryBrief {
                premise: "Any idea at all.".into(),
                ..StoryBrief::default()
            },
        )
        .unwrap();

    // The generic emergency template is not JSON, so step 0 fails parseably
    // rather than silently persisting placeholder content.
    let err = pipeline.run_step("doomed", StepId::FirstThingsFirst).unwrap_err();
    assert!(matches!(err, StepError::NoJson { step: 0 }));

    assert_eq!(pipeline.metrics().emergency_fallbacks.get(), 1);
    assert_eq!(pipeline.metrics().steps_failed.get(), 1);
    assert!(log
        .records()
        .iter()
        .any(|r| r.level == LogLevel::Warn && r.message.contains("emergency template")));

    let state = pipeline.store().load_project("doomed").unwrap();
    assert!(!state.is_completed(0));
}

#[test]
fn missing_upstream_artifact_is_a_dependency_error() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline_with(
        Arc::new(QueuedInvoker::failing()),
        dir.path(),
        Arc::new(VecLogSink::new()),
    );
    pipeline
        .store()
        .init_project(
            "fresh",
            StoryBrief {
                premise: "An idea.".into(),
                ..StoryBrief::default()
            },
        )
        .unwrap();

    let err = pipeline.run_step("fresh", StepId::SceneBriefs).unwrap_err();
    assert!(err.to_string().contains("has not been produced yet"));
}
