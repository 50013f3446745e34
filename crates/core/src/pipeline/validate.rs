//! Structural checks run on each stage's parsed artifact before it is
//! persisted. Failures are stage failures, surfaced to the caller.

use crate::story::{
    CharacterBibles, CharacterSummaries, CharacterSynopses, FirstThingsFirst, LongSynopsis,
    Manuscript, OnePageSynopsis, OneParagraphSummary, OneSentenceSummary, SceneBriefs, SceneList,
    SceneType,
};

/// Verbs accepted as evidence that the first disaster forces the
/// protagonist into the main conflict.
const FORCES_SYNONYMS: [&str; 12] = [
    "forc", "compel", "drive", "push", "oblig", "requir", "demand", "propel", "thrust", "impel",
    "leaves no choice", "no way back",
];

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field} must not be empty")]
    Empty { field: String },
    #[error("{slot} must show the disaster forcing the protagonist to act")]
    MissingForces { slot: &'static str },
    #[error("no characters were produced")]
    NoCharacters,
    #[error("no scenes were produced")]
    NoScenes,
    #[error("scene indexes must be unique and in order (scene {index})")]
    SceneOrder { index: u32 },
    #[error("chapter hints must not go backwards (scene {index})")]
    ChapterOrder { index: u32 },
    #[error("step 8 lists {scenes} scenes but {briefs} briefs were produced")]
    BriefCountMismatch { scenes: usize, briefs: usize },
    #[error("{scene_type} brief for scene {scene} is missing {field}")]
    MissingBriefField {
        scene: u32,
        scene_type: SceneType,
        field: &'static str,
    },
    #[error("manuscript has no chapters")]
    EmptyManuscript,
}

fn require(field: impl Into<String>, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::Empty {
            field: field.into(),
        })
    } else {
        Ok(())
    }
}

fn contains_forces(text: &str) -> bool {
    let lower = text.to_lowercase();
    FORCES_SYNONYMS.iter().any(|s| lower.contains(s))
}

pub fn first_things_first(content: &FirstThingsFirst) -> Result<(), ValidationError> {
    require("category", &content.category)?;
    require("target_audience", &content.target_audience)?;
    require("story_kind", &content.story_kind)?;
    require("delight", &content.delight)
}

pub fn one_sentence_summary(content: &OneSentenceSummary) -> Result<(), ValidationError> {
    require("logline", &content.logline)
}

pub fn one_paragraph_summary(content: &OneParagraphSummary) -> Result<(), ValidationError> {
    for (i, sentence) in content.sentences().iter().enumerate() {
        require(format!("sentence_{}", i + 1), sentence)?;
    }
    if !contains_forces(&content.sentence_2) {
        return Err(ValidationError::MissingForces { slot: "sentence_2" });
    }
    Ok(())
}

pub fn character_summaries(content: &CharacterSummaries) -> Result<(), ValidationError> {
    if content.characters.is_empty() {
        return Err(ValidationError::NoCharacters);
    }
    for character in &content.characters {
        require(format!("{}: name", character.name), &character.name)?;
        require(format!("{}: role", character.name), &character.role)?;
        require(format!("{}: goal", character.name), &character.goal)?;
        require(format!("{}: conflict", character.name), &character.conflict)?;
        require(format!("{}: epiphany", character.name), &character.epiphany)?;
        require(
            format!("{}: arc_one_sentence", character.name),
            &character.arc_one_sentence,
        )?;
    }
    Ok(())
}

pub fn one_page_synopsis(content: &OnePageSynopsis) -> Result<(), ValidationError> {
    for (i, paragraph) in content.paragraphs().iter().enumerate() {
        require(format!("paragraph_{}", i + 1), paragraph)?;
    }
    if !contains_forces(&content.paragraph_2) {
        return Err(ValidationError::MissingForces {
            slot: "paragraph_2",
        });
    }
    Ok(())
}

pub fn character_synopses(content: &CharacterSynopses) -> Result<(), ValidationError> {
    if content.synopses.is_empty() {
        return Err(ValidationError::NoCharacters);
    }
    for entry in &content.synopses {
        require(format!("{}: synopsis", entry.name), &entry.synopsis)?;
    }
    Ok(())
}

pub fn long_synopsis(content: &LongSynopsis) -> Result<(), ValidationError> {
    require("synopsis", &content.synopsis)
}

pub fn character_bibles(content: &CharacterBibles) -> Result<(), ValidationError> {
    if content.bibles.is_empty() {
        return Err(ValidationError::NoCharacters);
    }
    for bible in &content.bibles {
        require(format!("{}: physical", bible.name), &bible.physical)?;
        require(format!("{}: personality", bible.name), &bible.personality)?;
        require(format!("{}: psychology", bible.name), &bible.psychology)?;
    }
    Ok(())
}

pub fn scene_list(content: &SceneList) -> Result<(), ValidationError> {
    if content.scenes.is_empty() {
        return Err(ValidationError::NoScenes);
    }
    let mut last = 0u32;
    let mut last_chapter = 0u32;
    for scene in &content.scenes {
        if scene.index <= last {
            return Err(ValidationError::SceneOrder { index: scene.index });
        }
        last = scene.index;
        // A hint that goes backwards would split one chapter number across
        // two chapters and break the per-chapter export files.
        if scene.chapter_hint < last_chapter {
            return Err(ValidationError::ChapterOrder { index: scene.index });
        }
        last_chapter = scene.chapter_hint;
        require(format!("scene {}: pov", scene.index), &scene.pov)?;
        require(format!("scene {}: summary", scene.index), &scene.summary)?;
    }
    Ok(())
}

pub fn scene_briefs(scenes: &SceneList, content: &SceneBriefs) -> Result<(), ValidationError> {
    if content.briefs.len() != scenes.scenes.len() {
        return Err(ValidationError::BriefCountMismatch {
            scenes: scenes.scenes.len(),
            briefs: content.briefs.len(),
        });
    }
    for brief in &content.briefs {
        let missing = |field| ValidationError::MissingBriefField {
            scene: brief.scene,
            scene_type: brief.scene_type,
            field,
        };
        let filled = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        match brief.scene_type {
            SceneType::Proactive => {
                if !filled(&brief.goal) {
                    return Err(missing("goal"));
                }
                if !filled(&brief.conflict) {
                    return Err(missing("conflict"));
                }
                if !filled(&brief.setback) {
                    return Err(missing("setback"));
                }
            }
            SceneType::Reactive => {
                if !filled(&brief.reaction) {
                    return Err(missing("reaction"));
                }
                if !filled(&brief.dilemma) {
                    return Err(missing("dilemma"));
                }
                if !filled(&brief.decision) {
                    return Err(missing("decision"));
                }
            }
        }
        if brief.pov.trim().is_empty() {
            return Err(missing("pov"));
        }
        if brief.stakes.trim().is_empty() {
            return Err(missing("stakes"));
        }
    }
    Ok(())
}

pub fn manuscript(content: &Manuscript) -> Result<(), ValidationError> {
    if content.chapters.is_empty() {
        return Err(ValidationError::EmptyManuscript);
    }
    for chapter in &content.chapters {
        for scene in &chapter.scenes {
            require(format!("scene {}: prose", scene.scene), &scene.prose)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::story::SceneBrief;

    fn paragraph(second: &str) -> OneParagraphSummary {
        OneParagraphSummary {
            sentence_1: "A mapmaker discovers her city redraws itself at night.".into(),
            sentence_2: second.into(),
            sentence_3: "Her only ally vanishes along with an entire district.".into(),
            sentence_4: "The city turns its streets against her.".into(),
            sentence_5: "She redraws the city by hand and fixes it in place.".into(),
        }
    }

    #[test]
    fn second_sentence_must_contain_a_forces_synonym() {
        let ok = paragraph("The first erasure forces her to take the cartographer's oath.");
        assert!(one_paragraph_summary(&ok).is_ok());

        let ok2 = paragraph("Losing her home compels her into the guild's war.");
        assert!(one_paragraph_summary(&ok2).is_ok());

        let bad = paragraph("She wanders around and thinks about maps.");
        assert_eq!(
            one_paragraph_summary(&bad),
            Err(ValidationError::MissingForces { slot: "sentence_2" })
        );
    }

    #[test]
    fn empty_sentence_is_rejected_before_forces_check() {
        let bad = paragraph("   ");
        assert!(matches!(
            one_paragraph_summary(&bad),
            Err(ValidationError::Empty { .. })
        ));
    }

    fn brief(scene_type: SceneType) -> SceneBrief {
        SceneBrief {
            scene: 1,
            scene_type,
            pov: "Mara".into(),
            goal: Some("Reach the archive".into()),
            conflict: Some("The streets reroute her".into()),
            setback: Some("The archive has moved".into()),
            reaction: None,
            dilemma: None,
            decision: None,
            stakes: "The city's memory".into(),
        }
    }

    fn one_scene_list() -> SceneList {
        SceneList {
            scenes: vec![crate::story::SceneListEntry {
                index: 1,
                chapter_hint: 1,
                pov: "Mara".into(),
                summary: "Mara heads for the archive.".into(),
                word_target: 1500,
            }],
        }
    }

    #[test]
    fn chapter_hints_must_not_go_backwards() {
        let scene = |index, chapter_hint| crate::story::SceneListEntry {
            index,
            chapter_hint,
            pov: "Mara".into(),
            summary: "Mara heads for the archive.".into(),
            word_target: 1500,
        };
        let ok = SceneList {
            scenes: vec![scene(1, 1), scene(2, 1), scene(3, 2)],
        };
        assert!(scene_list(&ok).is_ok());

        let bad = SceneList {
            scenes: vec![scene(1, 1), scene(2, 2), scene(3, 1)],
        };
        assert_eq!(
            scene_list(&bad),
            Err(ValidationError::ChapterOrder { index: 3 })
        );
    }

    #[test]
    fn proactive_brief_missing_setback_is_rejected() {
        let mut b = brief(SceneType::Proactive);
        b.setback = None;
        let err = scene_briefs(&one_scene_list(), &SceneBriefs { briefs: vec![b] }).unwrap_err();
        assert_eq!(
            err,
            ValidationError::MissingBriefField {
                scene: 1,
                scene_type: SceneType::Proactive,
                field: "setback",
            }
        );
    }

    #[test]
    fn reactive_brief_requires_reaction_dilemma_decision() {
        let mut b = brief(SceneType::Reactive);
        b.reaction = Some("Shock".into());
        b.dilemma = Some("Stay or flee".into());
        b.decision = Some("Stay".into());
        assert!(scene_briefs(&one_scene_list(), &SceneBriefs { briefs: vec![b.clone()] }).is_ok());

        b.decision = Some("  ".into());
        assert!(scene_briefs(&one_scene_list(), &SceneBriefs { briefs: vec![b] }).is_err());
    }

    #[test]
    fn brief_count_must_match_scene_list() {
        let err = scene_briefs(&one_scene_list(), &SceneBriefs { briefs: vec![] }).unwrap_err();
        assert_eq!(
            err,
            ValidationError::BriefCountMismatch {
                scenes: 1,
                briefs: 0
            }
        );
    }

    #[test]
    fn scene_indexes_must_increase() {
        let mut scenes = one_scene_list();
        scenes.scenes.push(scenes.scenes[0].clone());
        assert_eq!(
            scene_list(&scenes),
            Err(ValidationError::SceneOrder { index: 1 })
        );
    }
}
