//! Last-resort templates used when every configured model has failed.
//!
//! The template is chosen by sniffing the prompt text, so a scene-brief
//! request still gets something the downstream parser can load. Content is
//! deliberately generic placeholder material; callers learn it was used from
//! the generation origin and can surface or reject it.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmergencyKind {
    SceneBrief,
    Prose,
    Character,
    Synopsis,
    Generic,
}

impl fmt::Display for EmergencyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmergencyKind::SceneBrief => f.write_str("scene_brief"),
            EmergencyKind::Prose => f.write_str("prose"),
            EmergencyKind::Character => f.write_str("character"),
            EmergencyKind::Synopsis => f.write_str("synopsis"),
            EmergencyKind::Generic => f.write_str("generic"),
        }
    }
}

/// Pick the template kind for a prompt. Scene briefs are sniffed before
/// prose because a brief prompt also mentions the scene's prose.
pub fn classify(prompt: &str) -> EmergencyKind {
    let lower = prompt.to_lowercase();
    if lower.contains("scene brief") || (lower.contains("proactive") && lower.contains("reactive"))
    {
        EmergencyKind::SceneBrief
    } else if lower.contains("prose") || lower.contains("write the scene") {
        EmergencyKind::Prose
    } else if lower.contains("character") {
        EmergencyKind::Character
    } else if lower.contains("synopsis") || lower.contains("summary") {
        EmergencyKind::Synopsis
    } else {
        EmergencyKind::Generic
    }
}

pub fn template(kind: EmergencyKind) -> &'static str {
    match kind {
        // Must parse as a valid Proactive brief so step 9 can still load it.
        EmergencyKind::SceneBrief => {
            r#"{"briefs": [{"scene": 1, "type": "Proactive", "pov": "Protagonist",
  "goal": "The protagonist pursues the immediate objective established earlier.",
  "conflict": "An opposing force blocks the objective at every turn.",
  "setback": "The attempt fails and the situation worsens.",
  "stakes": "Failure here makes the larger goal much harder to reach."}]}"#
        }
        EmergencyKind::Prose => {
            r#"{"scene": 1, "pov": "Protagonist",
  "prose": "The protagonist pressed forward despite everything. Each step brought new resistance, and each setback sharpened their resolve. By the end of the scene the situation had shifted, and nothing would be the same again.",
  "word_count": 43}"#
        }
        EmergencyKind::Character => {
            r#"{"characters": [{"name": "Protagonist", "role": "protagonist",
  "goal": "Resolve the central problem of the story.",
  "ambition": "To restore what was lost.",
  "values": ["Nothing is more important than loyalty."],
  "conflict": "The antagonist stands between them and the goal.",
  "epiphany": "They learn the cost of what they want.",
  "arc_one_sentence": "A determined protagonist confronts the central conflict and is changed by it.",
  "arc_one_paragraph": "The protagonist begins confident in their aim. Opposition mounts and early attempts fail. A hard truth emerges at the midpoint. They pay a real price for progress. In the end they achieve the goal in a changed form."}]}"#
        }
        EmergencyKind::Synopsis => {
            r#"{"sentence_1": "A protagonist faces a disruption that upends their ordinary life.",
  "sentence_2": "Early attempts to fix it fail, which forces them onto a harder path.",
  "sentence_3": "A midpoint revelation changes what they believe the problem is.",
  "sentence_4": "The opposition escalates until everything they value is at risk.",
  "sentence_5": "They confront the source of the conflict and the story resolves."}"#
        }
        EmergencyKind::Generic => {
            "Placeholder content generated without model assistance. Revise before use."
        }
    }
}
