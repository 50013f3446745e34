//! Single-file Markdown export. Also used for the draft artifact's twin.

use super::ExportError;
use crate::story::Manuscript;
use std::fs;
use std::path::{Path, PathBuf};

pub fn manuscript_to_markdown(manuscript: &Manuscript) -> String {
    let mut out = format!("# {}\n", manuscript.title);
    for chapter in &manuscript.chapters {
        out.push_str(&format!("\n## Chapter {}\n", chapter.number));
        for scene in &chapter.scenes {
            out.push_str(&format!("\n{}\n", scene.prose.trim()));
        }
    }
    out.push_str(&format!(
        "\n---\n\n*{} scenes, {} words.*\n",
        manuscript.scene_count(),
        manuscript.word_count()
    ));
    out
}

pub fn export_markdown(manuscript: &Manuscript, path: &Path) -> Result<PathBuf, ExportError> {
    fs::write(path, manuscript_to_markdown(manuscript)).map_err(|source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(path.to_path_buf())
}
