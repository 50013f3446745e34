//! Typed contents of the eleven stage artifacts, from the story brief the
//! user supplies through the assembled manuscript.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The user's input: a one-line idea plus positioning hints. Stored in
/// `project.json`, consumed by steps 0 and 1.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct StoryBrief {
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub audience: String,
    pub premise: String,
    #[serde(default)]
    pub guidance: String,
}

/// Step 0: market positioning.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FirstThingsFirst {
    pub category: String,
    pub target_audience: String,
    pub story_kind: String,
    pub delight: String,
}

/// Step 1: the logline.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct OneSentenceSummary {
    pub logline: String,
}

/// Step 2: five sentences, keyed explicitly so the artifact shape itself
/// guarantees "exactly five".
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct OneParagraphSummary {
    pub sentence_1: String,
    pub sentence_2: String,
    pub sentence_3: String,
    pub sentence_4: String,
    pub sentence_5: String,
}

impl OneParagraphSummary {
    pub fn sentences(&self) -> [&str; 5] {
        [
            &self.sentence_1,
            &self.sentence_2,
            &self.sentence_3,
            &self.sentence_4,
            &self.sentence_5,
        ]
    }

    pub fn as_paragraph(&self) -> String {
        self.sentences().join(" ")
    }
}

/// Step 3: one sheet per principal character.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CharacterSummary {
    pub name: String,
    pub role: String,
    pub goal: String,
    pub ambition: String,
    #[serde(default)]
    pub values: Vec<String>,
    pub conflict: String,
    pub epiphany: String,
    pub arc_one_sentence: String,
    pub arc_one_paragraph: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CharacterSummaries {
    pub characters: Vec<CharacterSummary>,
}

/// Step 4: five paragraph keys expanding the step-2 sentences.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct OnePageSynopsis {
    pub paragraph_1: String,
    pub paragraph_2: String,
    pub paragraph_3: String,
    pub paragraph_4: String,
    pub paragraph_5: String,
}

impl OnePageSynopsis {
    pub fn paragraphs(&self) -> [&str; 5] {
        [
            &self.paragraph_1,
            &self.paragraph_2,
            &self.paragraph_3,
            &self.paragraph_4,
            &self.paragraph_5,
        ]
    }

    pub fn as_text(&self) -> String {
        self.paragraphs().join("\n\n")
    }
}

/// Step 5: the story from each character's point of view.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CharacterSynopsis {
    pub name: String,
    pub synopsis: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CharacterSynopses {
    pub synopses: Vec<CharacterSynopsis>,
}

/// Step 6: the long synopsis.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LongSynopsis {
    pub synopsis: String,
}

/// Step 7: full character bibles.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CharacterBible {
    pub name: String,
    pub physical: String,
    pub personality: String,
    pub environment: String,
    pub psychology: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CharacterBibles {
    pub bibles: Vec<CharacterBible>,
}

/// Step 8: one row per scene, in narrative order.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SceneListEntry {
    pub index: u32,
    pub chapter_hint: u32,
    pub pov: String,
    pub summary: String,
    pub word_target: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SceneList {
    pub scenes: Vec<SceneListEntry>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum SceneType {
    Proactive,
    Reactive,
}

impl fmt::Display for SceneType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SceneType::Proactive => f.write_str("Proactive"),
            SceneType::Reactive => f.write_str("Reactive"),
        }
    }
}

/// Step 9: the dramatic skeleton of one scene. The per-type fields stay
/// optional at the serde level; the stage validator enforces the required
/// set for each type.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SceneBrief {
    pub scene: u32,
    #[serde(rename = "type")]
    pub scene_type: SceneType,
    #[serde(default)]
    pub pov: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflict: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setback: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reaction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dilemma: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<String>,
    #[serde(default)]
    pub stakes: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SceneBriefs {
    pub briefs: Vec<SceneBrief>,
}

/// Step 10: generated prose for one scene.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SceneProse {
    pub scene: u32,
    pub pov: String,
    pub prose: String,
    pub word_count: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Chapter {
    pub number: u32,
    pub scenes: Vec<SceneProse>,
}

impl Chapter {
    pub fn word_count(&self) -> u32 {
        self.scenes.iter().map(|scene| scene.word_count).sum()
    }
}

/// The assembled first draft: chapters in order, scenes in order within
/// each chapter.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Manuscript {
    pub title: String,
    pub chapters: Vec<Chapter>,
}

impl Manuscript {
    pub fn scene_count(&self) -> usize {
        self.chapters.iter().map(|c| c.scenes.len()).sum()
    }

    pub fn word_count(&self) -> u32 {
        self.chapters.iter().map(Chapter::word_count).sum()
    }
}

pub fn count_words(text: &str) -> u32 {
    text.split_whitespace().count() as u32
}
