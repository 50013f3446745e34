use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_timeout() -> u64 {
    120
}

fn default_max_attempts() -> usize {
    3
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_jitter_ms() -> u64 {
    250
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_cooldown_secs() -> u64 {
    300
}

fn default_artifacts_root() -> PathBuf {
    PathBuf::from("artifacts")
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to access config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Credentials and connection settings for one LLM provider.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ProviderConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub base_url: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: String::new(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout: default_timeout(),
        }
    }
}

impl ProviderConfig {
    pub fn is_meaningful(&self) -> bool {
        !(self.api_key.is_empty() && self.base_url.is_empty())
    }
}

/// One entry in the model ladder: a provider name (a key into
/// `Config::providers`) plus the provider's model identifier.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModelKey {
    pub provider: String,
    pub model: String,
}

impl ModelKey {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
        }
    }
}

impl fmt::Display for ModelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.provider, self.model)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    Fast,
    Balanced,
    Quality,
}

impl fmt::Display for ModelTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ModelTier::Fast => "fast",
            ModelTier::Balanced => "balanced",
            ModelTier::Quality => "quality",
        };
        f.write_str(label)
    }
}

/// Ordered (provider, model) pairs per tier, tried front to back. Defaults
/// keep the openai -> anthropic -> openrouter preference order.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LadderConfig {
    #[serde(default = "LadderConfig::default_fast")]
    pub fast: Vec<ModelKey>,
    #[serde(default = "LadderConfig::default_balanced")]
    pub balanced: Vec<ModelKey>,
    #[serde(default = "LadderConfig::default_quality")]
    pub quality: Vec<ModelKey>,
}

impl LadderConfig {
    fn default_fast() -> Vec<ModelKey> {
        vec![
            ModelKey::new("openai", "gpt-4o-mini"),
            ModelKey::new("anthropic", "claude-3-5-haiku-20241022"),
            ModelKey::new("openrouter", "openai/gpt-4o-mini"),
        ]
    }

    fn default_balanced() -> Vec<ModelKey> {
        vec![
            ModelKey::new("openai", "gpt-4o"),
            ModelKey::new("anthropic", "claude-3-5-sonnet-20241022"),
            ModelKey::new("openrouter", "openai/gpt-4o"),
        ]
    }

    fn default_quality() -> Vec<ModelKey> {
        vec![
            ModelKey::new("openai", "gpt-4o"),
            ModelKey::new("anthropic", "claude-3-opus-20240229"),
            ModelKey::new("openrouter", "anthropic/claude-3-opus"),
        ]
    }

    pub fn tier(&self, tier: ModelTier) -> &[ModelKey] {
        match tier {
            ModelTier::Fast => &self.fast,
            ModelTier::Balanced => &self.balanced,
            ModelTier::Quality => &self.quality,
        }
    }
}

impl Default for LadderConfig {
    fn default() -> Self {
        Self {
            fast: Self::default_fast(),
            balanced: Self::default_balanced(),
            quality: Self::default_quality(),
        }
    }
}

/// Exponential backoff parameters for retries within one ladder entry.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct RetryPolicy {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter_ms: default_jitter_ms(),
        }
    }
}

/// Circuit breaker thresholds, applied per (provider, model) key.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct BreakerPolicy {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

impl Default for BreakerPolicy {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            cooldown_secs: default_cooldown_secs(),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct PromptConfig {
    #[serde(default)]
    pub custom_directories: Vec<PathBuf>,
    #[serde(default)]
    pub enable_hot_reload: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderConfig>,
    #[serde(default)]
    pub ladder: LadderConfig,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub breaker: BreakerPolicy,
    #[serde(default)]
    pub prompts: PromptConfig,
    #[serde(default = "default_artifacts_root")]
    pub artifacts_root: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            providers: BTreeMap::new(),
            ladder: LadderConfig::default(),
            retry: RetryPolicy::default(),
            breaker: BreakerPolicy::default(),
            prompts: PromptConfig::default(),
            artifacts_root: default_artifacts_root(),
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn provider(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.get(name)
    }

    pub fn upsert_provider<S: Into<String>>(&mut self, name: S, profile: ProviderConfig) {
        self.providers.insert(name.into(), profile);
    }

    pub fn remove_provider(&mut self, name: &str) -> Option<ProviderConfig> {
        self.providers.remove(name)
    }

    /// Ladder entries whose provider actually has credentials configured.
    pub fn configured_ladder(&self, tier: ModelTier) -> Vec<ModelKey> {
        self.ladder
            .tier(tier)
            .iter()
            .filter(|key| {
                self.providers
                    .get(&key.provider)
                    .map(ProviderConfig::is_meaningful)
                    .unwrap_or(false)
            })
            .cloned()
            .collect()
    }

    pub fn from_json_str(input: &str) -> Result<Self, ConfigError> {
        if input.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_str(input)?)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let data = fs::read_to_string(path)?;
        Self::from_json_str(&data)
    }

    pub fn to_path(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let serialized = serde_json::to_string_pretty(self)?;
        fs::write(path, serialized)?;
        Ok(())
    }
}

/// Config plus the path it came from; `save` writes back to the same file.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
    config: Config,
}

impl ConfigStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let config = if path.exists() {
            Config::from_path(&path)?
        } else {
            Config::default()
        };
        Ok(Self { path, config })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    pub fn reload(&mut self) -> Result<(), ConfigError> {
        if self.path.exists() {
            self.config = Config::from_path(&self.path)?;
        } else {
            self.config = Config::default();
        }
        Ok(())
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        self.config.to_path(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn empty_input_yields_defaults() {
        let config = Config::from_json_str("").unwrap();
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.breaker.failure_threshold, 5);
        assert_eq!(config.breaker.cooldown_secs, 300);
        assert_eq!(config.ladder.fast[0].provider, "openai");
        assert_eq!(config.artifacts_root, PathBuf::from("artifacts"));
    }

    #[test]
    fn parses_full_config() {
        let json = r#"{
            "providers": {
                "openai": {
                    "api_key": "sk-test",
                    "base_url": "https://api.openai.com/v1",
                    "temperature": 0.6,
                    "max_tokens": 2048,
                    "timeout": 90
                }
            },
            "ladder": {
                "fast": [{"provider": "openai", "model": "gpt-4o-mini"}],
                "balanced": [{"provider": "openai", "model": "gpt-4o"}],
                "quality": [{"provider": "openai", "model": "gpt-4o"}]
            },
            "retry": {"max_attempts": 2, "base_delay_ms": 100, "max_delay_ms": 1000, "jitter_ms": 50},
            "breaker": {"failure_threshold": 4, "cooldown_secs": 60},
            "artifacts_root": "out"
        }"#;

        let config = Config::from_json_str(json).unwrap();
        assert_eq!(config.providers.len(), 1);
        assert_eq!(config.retry.max_attempts, 2);
        assert_eq!(config.breaker.failure_threshold, 4);
        assert_eq!(config.ladder.tier(ModelTier::Fast).len(), 1);
        assert_eq!(config.artifacts_root, PathBuf::from("out"));
    }

    #[test]
    fn configured_ladder_skips_unconfigured_providers() {
        let mut config = Config::default();
        config.upsert_provider(
            "anthropic",
            ProviderConfig {
                api_key: "sk-ant".into(),
                ..ProviderConfig::default()
            },
        );

        let keys = config.configured_ladder(ModelTier::Balanced);
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].provider, "anthropic");
    }

    #[test]
    fn store_persists_config() {
        let temp = tempdir().unwrap();
        let config_path = temp.path().join("config.json");

        let mut store = ConfigStore::open(config_path.clone()).unwrap();
        store.config_mut().upsert_provider(
            "openai",
            ProviderConfig {
                api_key: "sk-123".into(),
                base_url: "https://api.openai.com/v1".into(),
                ..ProviderConfig::default()
            },
        );
        store.save().unwrap();

        let store = ConfigStore::open(config_path).unwrap();
        assert!(store.config().providers.contains_key("openai"));
        assert_eq!(store.config().providers["openai"].api_key, "sk-123");
    }
}
