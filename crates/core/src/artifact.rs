//! On-disk artifact store: one directory per project under the artifacts
//! root, one JSON file per completed step plus human-readable twins.

use crate::generate::GenerationOrigin;
use crate::story::{SceneList, StoryBrief};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("artifact {path} is not valid JSON: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("artifact content for step {step} did not serialize to a JSON object")]
    NotAnObject { step: u8 },
    #[error("project '{0}' does not exist")]
    ProjectNotFound(String),
    #[error("step {step} ({name}) has not been produced yet")]
    ArtifactMissing { step: u8, name: String },
    #[error("failed to write {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

pub fn sha256_hex(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Provenance block embedded in every artifact under the `metadata` key.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ArtifactMetadata {
    pub project_id: String,
    pub step: u8,
    pub step_name: String,
    pub origin: GenerationOrigin,
    pub prompt_sha256: String,
    pub upstream_sha256: String,
    pub created_at: DateTime<Utc>,
}

/// The `project.json` record: the brief plus which steps have completed.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ProjectState {
    pub project_id: String,
    pub brief: StoryBrief,
    pub completed_steps: BTreeSet<u8>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProjectState {
    pub fn new(project_id: impl Into<String>, brief: StoryBrief) -> Self {
        let now = Utc::now();
        Self {
            project_id: project_id.into(),
            brief,
            completed_steps: BTreeSet::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_completed(&self, step: u8) -> bool {
        self.completed_steps.contains(&step)
    }

    pub fn mark_completed(&mut self, step: u8) {
        self.completed_steps.insert(step);
        self.updated_at = Utc::now();
    }
}

#[derive(Clone, Debug)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn project_dir(&self, project_id: &str) -> PathBuf {
        self.root.join(project_id)
    }

    fn artifact_path(&self, project_id: &str, step: u8, name: &str) -> PathBuf {
        self.project_dir(project_id)
            .join(format!("step_{step}_{name}.json"))
    }

    /// Create the project directory and its `project.json`. Re-initializing
    /// an existing project keeps its completed steps.
    pub fn init_project(
        &self,
        project_id: &str,
        brief: StoryBrief,
    ) -> Result<ProjectState, ArtifactError> {
        if let Ok(existing) = self.load_project(project_id) {
            return Ok(existing);
        }
        let dir = self.project_dir(project_id);
        fs::create_dir_all(&dir).map_err(|source| ArtifactError::Io {
            path: dir.clone(),
            source,
        })?;
        let state = ProjectState::new(project_id, brief);
        self.save_project(&state)?;
        Ok(state)
    }

    pub fn load_project(&self, project_id: &str) -> Result<ProjectState, ArtifactError> {
        let path = self.project_dir(project_id).join("project.json");
        if !path.exists() {
            return Err(ArtifactError::ProjectNotFound(project_id.to_string()));
        }
        let raw = fs::read_to_string(&path).map_err(|source| ArtifactError::Io {
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ArtifactError::Json { path, source })
    }

    pub fn save_project(&self, state: &ProjectState) -> Result<(), ArtifactError> {
        let path = self.project_dir(&state.project_id).join("project.json");
        let raw = serde_json::to_string_pretty(state).map_err(|source| ArtifactError::Json {
            path: path.clone(),
            source,
        })?;
        fs::write(&path, raw).map_err(|source| ArtifactError::Io { path, source })
    }

    /// Project ids, sorted, one per directory that carries a `project.json`.
    pub fn list_projects(&self) -> Result<Vec<String>, ArtifactError> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&self.root).map_err(|source| ArtifactError::Io {
            path: self.root.clone(),
            source,
        })?;
        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| ArtifactError::Io {
                path: self.root.clone(),
                source,
            })?;
            if entry.path().join("project.json").exists() {
                ids.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        ids.sort();
        Ok(ids)
    }

    pub fn has_artifact(&self, project_id: &str, step: u8, name: &str) -> bool {
        self.artifact_path(project_id, step, name).exists()
    }

    /// Persist `{ "metadata": {...}, ...content }`. Content must serialize
    /// to a JSON object so the metadata key can live alongside it.
    pub fn write_artifact<T: Serialize>(
        &self,
        metadata: &ArtifactMetadata,
        content: &T,
    ) -> Result<PathBuf, ArtifactError> {
        let path = self.artifact_path(&metadata.project_id, metadata.step, &metadata.step_name);
        let mut value =
            serde_json::to_value(content).map_err(|source| ArtifactError::Json {
                path: path.clone(),
                source,
            })?;
        let obj = value
            .as_object_mut()
            .ok_or(ArtifactError::NotAnObject { step: metadata.step })?;
        obj.insert(
            "metadata".to_string(),
            serde_json::to_value(metadata).map_err(|source| ArtifactError::Json {
                path: path.clone(),
                source,
            })?,
        );
        let raw =
            serde_json::to_string_pretty(&value).map_err(|source| ArtifactError::Json {
                path: path.clone(),
                source,
            })?;
        fs::write(&path, raw).map_err(|source| ArtifactError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }

    pub fn read_artifact<T: DeserializeOwned>(
        &self,
        project_id: &str,
        step: u8,
        name: &str,
    ) -> Result<(ArtifactMetadata, T), ArtifactError> {
        let path = self.artifact_path(project_id, step, name);
        if !path.exists() {
            return Err(ArtifactError::ArtifactMissing {
                step,
                name: name.to_string(),
            });
        }
        let raw = fs::read_to_string(&path).map_err(|source| ArtifactError::Io {
            path: path.clone(),
            source,
        })?;
        let mut value: serde_json::Value =
            serde_json::from_str(&raw).map_err(|source| ArtifactError::Json {
                path: path.clone(),
                source,
            })?;
        let metadata_value = value
            .as_object_mut()
            .and_then(|obj| obj.remove("metadata"))
            .ok_or(ArtifactError::ArtifactMissing {
                step,
                name: name.to_string(),
            })?;
        let metadata = serde_json::from_value(metadata_value).map_err(|source| {
            ArtifactError::Json {
                path: path.clone(),
                source,
            }
        })?;
        let content =
            serde_json::from_value(value).map_err(|source| ArtifactError::Json { path, source })?;
        Ok((metadata, content))
    }

    /// Raw artifact JSON, metadata included, for the HTTP surface.
    pub fn read_artifact_raw(
        &self,
        project_id: &str,
        step: u8,
        name: &str,
    ) -> Result<serde_json::Value, ArtifactError> {
        let path = self.artifact_path(project_id, step, name);
        if !path.exists() {
            return Err(ArtifactError::ArtifactMissing {
                step,
                name: name.to_string(),
            });
        }
        let raw = fs::read_to_string(&path).map_err(|source| ArtifactError::Io {
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ArtifactError::Json { path, source })
    }

    /// The human-readable twin next to the JSON artifact.
    pub fn write_markdown_twin(
        &self,
        project_id: &str,
        step: u8,
        name: &str,
        markdown: &str,
    ) -> Result<PathBuf, ArtifactError> {
        let path = self
            .project_dir(project_id)
            .join(format!("step_{step}_{name}.md"));
        fs::write(&path, markdown).map_err(|source| ArtifactError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }

    pub fn write_scene_list_csv(
        &self,
        project_id: &str,
        scenes: &SceneList,
    ) -> Result<PathBuf, ArtifactError> {
        let path = self.project_dir(project_id).join("scene_list.csv");
        let mut writer =
            csv::Writer::from_path(&path).map_err(|source| ArtifactError::Csv {
                path: path.clone(),
                source,
            })?;
        for scene in &scenes.scenes {
            writer
                .serialize(scene)
                .map_err(|source| ArtifactError::Csv {
                    path: path.clone(),
                    source,
                })?;
        }
        writer.flush().map_err(|source| ArtifactError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }
}
