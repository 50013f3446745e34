use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::PromptConfig;

const BUILT_IN_PROMPTS: &str = include_str!("../prompts/default.toml");

pub type PromptArguments = HashMap<String, String>;

/// Matches `{{`, `}}`, or a `{placeholder}` with a word-character name.
static TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{|\}\}|\{([A-Za-z0-9_]+)\}").expect("valid token regex"));

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PromptSource {
    BuiltIn,
    File(PathBuf),
}

impl PromptSource {
    pub fn is_builtin(&self) -> bool {
        matches!(self, Self::BuiltIn)
    }

    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Self::BuiltIn => None,
            Self::File(path) => Some(path.as_path()),
        }
    }
}

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("prompt `{0}` not found")]
    NotFound(String),
    #[error("missing argument `{argument}` when rendering prompt `{key}`")]
    MissingArgument { key: String, argument: String },
    #[error("failed to read prompt file `{path}`: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse built-in prompt definitions: {0}")]
    ParseBuiltIn(toml::de::Error),
    #[error("failed to parse prompt file `{path}` as TOML: {source}")]
    ParseToml {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("failed to parse prompt file `{path}` as YAML: {source}")]
    ParseYaml {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error(
        "required key `{argument}` declared for prompt `{key}` but no matching placeholder was found"
    )]
    InvalidRequired { key: String, argument: String },
}

#[derive(Clone, Debug)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

/// A single named template. Placeholders use `{name}`; literal braces are
/// written `{{` / `}}`. Rendering fails when a required argument is absent;
/// unknown optional placeholders render empty.
#[derive(Clone, Debug)]
pub struct PromptTemplate {
    key: String,
    template: String,
    segments: Vec<Segment>,
    placeholders: BTreeSet<String>,
    required: BTreeSet<String>,
    description: Option<String>,
    source: PromptSource,
}

impl PromptTemplate {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn source(&self) -> &PromptSource {
        &self.source
    }

    pub fn placeholders(&self) -> impl Iterator<Item = &str> {
        self.placeholders.iter().map(|s| s.as_str())
    }

    pub fn render(&self, arguments: &PromptArguments) -> Result<String, PromptError> {
        for required in &self.required {
            if !arguments.contains_key(required) {
                return Err(PromptError::MissingArgument {
                    key: self.key.clone(),
                    argument: required.clone(),
                });
            }
        }

        let mut output = String::with_capacity(self.template.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => output.push_str(text),
                Segment::Placeholder(name) => {
                    if let Some(value) = arguments.get(name) {
                        output.push_str(value);
                    }
                }
            }
        }
        Ok(output)
    }

    pub fn render_with<I, K, V>(&self, arguments: I) -> Result<String, PromptError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut map = PromptArguments::new();
        for (key, value) in arguments {
            map.insert(key.into(), value.into());
        }
        self.render(&map)
    }

    fn from_raw(key: String, raw: RawPrompt, source: PromptSource) -> Result<Self, PromptError> {
        let (segments, placeholders) = scan_template(&raw.template);
        let required = if raw.required.is_empty() {
            placeholders.clone()
        } else {
            let mut set = BTreeSet::new();
            for argument in raw.required {
                let trimmed = argument.trim().to_string();
                if !placeholders.contains(&trimmed) {
                    return Err(PromptError::InvalidRequired {
                        key: key.clone(),
                        argument: trimmed,
                    });
                }
                set.insert(trimmed);
            }
            set
        };

        Ok(Self {
            key,
            template: raw.template,
            segments,
            placeholders,
            required,
            description: raw.description,
            source,
        })
    }
}

fn scan_template(template: &str) -> (Vec<Segment>, BTreeSet<String>) {
    let mut segments = Vec::new();
    let mut placeholders = BTreeSet::new();
    let mut literal = String::new();
    let mut cursor = 0usize;

    for token in TOKEN_RE.captures_iter(template) {
        let whole = token.get(0).expect("regex match has group 0");
        literal.push_str(&template[cursor..whole.start()]);
        cursor = whole.end();

        match whole.as_str() {
            "{{" => literal.push('{'),
            "}}" => literal.push('}'),
            _ => {
                let name = token
                    .get(1)
                    .expect("placeholder branch has group 1")
                    .as_str()
                    .to_string();
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                placeholders.insert(name.clone());
                segments.push(Segment::Placeholder(name));
            }
        }
    }

    literal.push_str(&template[cursor..]);
    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }

    (segments, placeholders)
}

/// Built-in prompts (compiled in from `prompts/default.toml`) plus any
/// overrides loaded from the configured custom directories. Later directories
/// win; files within a directory load in sorted order.
#[derive(Debug)]
pub struct PromptRegistry {
    prompts: BTreeMap<String, PromptTemplate>,
    directories: Vec<PathBuf>,
    hot_reload: bool,
}

impl PromptRegistry {
    pub fn new() -> Result<Self, PromptError> {
        Self::from_prompt_config(&PromptConfig::default())
    }

    pub fn from_prompt_config(config: &PromptConfig) -> Result<Self, PromptError> {
        Self::with_options(config.custom_directories.clone(), config.enable_hot_reload)
    }

    pub fn with_custom_directories<P: AsRef<Path>>(directories: &[P]) -> Result<Self, PromptError> {
        let dirs = directories
            .iter()
            .map(|p| p.as_ref().to_path_buf())
            .collect();
        Self::with_options(dirs, false)
    }

    fn with_options(directories: Vec<PathBuf>, hot_reload: bool) -> Result<Self, PromptError> {
        let mut registry = Self {
            prompts: BTreeMap::new(),
            directories,
            hot_reload,
        };
        registry.reload()?;
        Ok(registry)
    }

    pub fn hot_reload_enabled(&self) -> bool {
        self.hot_reload
    }

    pub fn custom_directories(&self) -> &[PathBuf] {
        &self.directories
    }

    pub fn reload(&mut self) -> Result<(), PromptError> {
        let mut prompts = BTreeMap::new();

        for template in parse_toml_document(BUILT_IN_PROMPTS, PromptSource::BuiltIn)? {
            prompts.insert(template.key().to_string(), template);
        }
        for dir in &self.directories {
            load_directory(dir, &mut prompts)?;
        }

        self.prompts = prompts;
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&PromptTemplate> {
        self.prompts.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.prompts.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.prompts.keys().map(|k| k.as_str())
    }

    pub fn format(&self, key: &str, args: &PromptArguments) -> Result<String, PromptError> {
        let template = self
            .get(key)
            .ok_or_else(|| PromptError::NotFound(key.to_string()))?;
        template.render(args)
    }

    pub fn format_with<I, K, V>(&self, key: &str, arguments: I) -> Result<String, PromptError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let template = self
            .get(key)
            .ok_or_else(|| PromptError::NotFound(key.to_string()))?;
        template.render_with(arguments)
    }
}

fn load_directory(
    dir: &Path,
    prompts: &mut BTreeMap<String, PromptTemplate>,
) -> Result<(), PromptError> {
    if !dir.is_dir() {
        return Ok(());
    }

    let read_dir = fs::read_dir(dir).map_err(|source| PromptError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut files = Vec::new();
    for entry in read_dir {
        let entry = entry.map_err(|source| PromptError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();

    for path in files {
        let Some(ext) = path.extension().and_then(|ext| ext.to_str()) else {
            continue;
        };
        match ext.to_ascii_lowercase().as_str() {
            "toml" => {
                let contents = fs::read_to_string(&path).map_err(|source| PromptError::Io {
                    path: path.clone(),
                    source,
                })?;
                let templates = parse_toml_document(&contents, PromptSource::File(path.clone()))
                    .map_err(|err| match err {
                        PromptError::ParseBuiltIn(source) => PromptError::ParseToml {
                            path: path.clone(),
                            source,
                        },
                        other => other,
                    })?;
                for template in templates {
                    prompts.insert(template.key().to_string(), template);
                }
            }
            "yaml" | "yml" => {
                let contents = fs::read_to_string(&path).map_err(|source| PromptError::Io {
                    path: path.clone(),
                    source,
                })?;
                let document: PromptDocument =
                    serde_yaml::from_str(&contents).map_err(|source| PromptError::ParseYaml {
                        path: path.clone(),
                        source,
                    })?;
                for (key, raw) in document.prompts {
                    let template = PromptTemplate::from_raw(
                        key.clone(),
                        raw,
                        PromptSource::File(path.clone()),
                    )?;
                    prompts.insert(key, template);
                }
            }
            _ => {}
        }
    }

    Ok(())
}

fn parse_toml_document(
    source: &str,
    origin: PromptSource,
) -> Result<Vec<PromptTemplate>, PromptError> {
    let document: PromptDocument = toml::from_str(source).map_err(PromptError::ParseBuiltIn)?;
    let mut templates = Vec::new();
    for (key, raw) in document.prompts {
        templates.push(PromptTemplate::from_raw(key.clone(), raw, origin.clone())?);
    }
    Ok(templates)
}

#[derive(Debug, Deserialize)]
struct PromptDocument {
    #[serde(default)]
    prompts: BTreeMap<String, RawPrompt>,
}

#[derive(Debug, Deserialize)]
struct RawPrompt {
    #[serde(alias = "text")]
    template: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    required: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn built_in_prompts_cover_all_steps() {
        let registry = PromptRegistry::new().expect("registry");
        for key in [
            "first_things_first",
            "one_sentence_summary",
            "one_paragraph_summary",
            "character_summaries",
            "one_page_synopsis",
            "character_synopses",
            "long_synopsis",
            "character_bibles",
            "scene_list",
            "scene_briefs",
            "scene_prose",
        ] {
            assert!(registry.contains(key), "missing built-in prompt `{key}`");
        }
    }

    #[test]
    fn renders_logline_prompt() {
        let registry = PromptRegistry::new().expect("registry");
        let output = registry
            .format_with(
                "one_sentence_summary",
                [
                    ("category", "Science fiction"),
                    ("audience", "Adult"),
                    ("premise", "A cartographer maps a city that rearranges itself at night."),
                    ("guidance", ""),
                ],
            )
            .expect("rendered");
        assert!(output.contains("cartographer"));
        assert!(output.to_lowercase().contains("json"));
    }

    #[test]
    fn missing_argument_fails() {
        let registry = PromptRegistry::new().expect("registry");
        let template = registry
            .get("one_sentence_summary")
            .expect("template available");
        let args = PromptArguments::from([("category".to_string(), "Mystery".to_string())]);
        let error = template.render(&args).expect_err("missing args");
        assert!(matches!(error, PromptError::MissingArgument { .. }));
    }

    #[test]
    fn literal_braces_survive_rendering() {
        let raw = RawPrompt {
            template: "Return {{\"logline\": \"...\"}} for {premise}".to_string(),
            description: None,
            required: Vec::new(),
        };
        let template =
            PromptTemplate::from_raw("t".into(), raw, PromptSource::BuiltIn).expect("template");
        let output = template
            .render_with([("premise", "a heist")])
            .expect("rendered");
        assert_eq!(output, "Return {\"logline\": \"...\"} for a heist");
    }

    #[test]
    fn json_skeletons_render_literally() {
        // Only word-character names between braces are placeholders, so a
        // quoted-key skeleton needs no escaping.
        let raw = RawPrompt {
            template: "Return {\"logline\": \"...\"} for {premise}".to_string(),
            description: None,
            required: Vec::new(),
        };
        let template =
            PromptTemplate::from_raw("t".into(), raw, PromptSource::BuiltIn).expect("template");
        let output = template
            .render_with([("premise", "a heist")])
            .expect("rendered");
        assert_eq!(output, "Return {\"logline\": \"...\"} for a heist");
    }

    #[test]
    fn custom_directory_overrides_builtin() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        fs::write(
            &path,
            "[prompts.one_sentence_summary]\ntemplate = \"Custom {premise}\"\n",
        )
        .unwrap();

        let registry = PromptRegistry::with_custom_directories(&[dir.path()]).unwrap();
        let output = registry
            .format_with("one_sentence_summary", [("premise", "a duel")])
            .unwrap();
        assert_eq!(output, "Custom a duel");
    }

    #[test]
    fn declared_required_subset_is_honored() {
        let raw = RawPrompt {
            template: "{a} and {b}".to_string(),
            description: None,
            required: vec!["a".to_string()],
        };
        let template =
            PromptTemplate::from_raw("t".into(), raw, PromptSource::BuiltIn).expect("template");
        let output = template.render_with([("a", "left")]).expect("rendered");
        assert_eq!(output, "left and ");
    }

    #[test]
    fn reload_reflects_changes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        fs::write(&path, "[prompts.probe]\ntemplate = \"first {x}\"\n").unwrap();

        let mut registry = PromptRegistry::with_custom_directories(&[dir.path()]).unwrap();
        assert_eq!(registry.format_with("probe", [("x", "1")]).unwrap(), "first 1");

        fs::write(&path, "[prompts.probe]\ntemplate = \"second {x}\"\n").unwrap();
        registry.reload().unwrap();
        assert_eq!(
            registry.format_with("probe", [("x", "2")]).unwrap(),
            "second 2"
        );
    }
}
