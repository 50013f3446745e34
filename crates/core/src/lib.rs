//! Snowflake Method novel pipeline: eleven LLM-driven steps expanding a
//! one-line story idea into a first-draft manuscript, with a JSON artifact
//! persisted per step and a retry/fallback layer around every model call.

pub mod artifact;
pub mod config;
pub mod export;
pub mod generate;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod prompts;
pub mod story;

pub use artifact::{ArtifactError, ArtifactMetadata, ArtifactStore, ProjectState};
pub use config::{
    BreakerPolicy, Config, ConfigError, ConfigStore, LadderConfig, ModelKey, ModelTier,
    PromptConfig, ProviderConfig, RetryPolicy,
};
pub use generate::{
    FallbackGenerator, Generation, GenerationOrigin, InvokeError, ModelInvoker, ResponseFormat,
};
pub use logging::{LogLevel, LogRecord, LogSink, NullLogSink, SharedLogSink, StdoutLogSink, VecLogSink};
pub use metrics::Metrics;
pub use pipeline::{Pipeline, StepError, StepId};
pub use prompts::{PromptError, PromptRegistry, PromptTemplate};
pub use story::{Manuscript, StoryBrief};
