//! The generation layer: retries, the model ladder, the circuit breaker,
//! and the emergency fallback, behind a call that never errors.

pub mod backoff;
pub mod breaker;
pub mod emergency;
pub mod extract;

use crate::config::{Config, ModelKey, ModelTier};
use crate::logging::{LogRecord, SharedLogSink};
use crate::metrics::Metrics;
use breaker::CircuitBreaker;
use emergency::EmergencyKind;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::thread;

/// Errors crossing the invoker seam are opaque to the generator; it only
/// decides retry-or-move-on.
pub type InvokeError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// One request to one named model. Implemented over HTTP by the adapters
/// crate; scripted in tests.
pub trait ModelInvoker: Send + Sync {
    fn invoke(&self, key: &ModelKey, prompt: &str) -> Result<String, InvokeError>;
}

/// What counts as an acceptable response.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ResponseFormat {
    Text,
    Json,
}

/// Where the returned text came from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GenerationOrigin {
    Model { key: ModelKey },
    Emergency { template: EmergencyKind },
}

#[derive(Clone, Debug, PartialEq)]
pub struct Generation {
    pub text: String,
    pub origin: GenerationOrigin,
}

impl Generation {
    pub fn is_emergency(&self) -> bool {
        matches!(self.origin, GenerationOrigin::Emergency { .. })
    }
}

pub struct FallbackGenerator {
    invoker: Arc<dyn ModelInvoker>,
    config: Config,
    breaker: CircuitBreaker,
    metrics: Arc<Metrics>,
    log: SharedLogSink,
}

impl FallbackGenerator {
    pub fn new(
        invoker: Arc<dyn ModelInvoker>,
        config: Config,
        metrics: Arc<Metrics>,
        log: SharedLogSink,
    ) -> Self {
        let breaker = CircuitBreaker::new(config.breaker.clone());
        Self {
            invoker,
            config,
            breaker,
            metrics,
            log,
        }
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.metrics)
    }

    /// Walk the tier's ladder until one model yields an acceptable response;
    /// fall back to an emergency template when none does. Never errors.
    pub fn generate(&self, prompt: &str, tier: ModelTier, format: ResponseFormat) -> Generation {
        let expects_json =
            format == ResponseFormat::Json || prompt.to_lowercase().contains("json");

        for key in self.config.configured_ladder(tier) {
            if !self.breaker.allow(&key) {
                self.metrics.breaker_skips.incr();
                self.log.log(LogRecord::new(
                    crate::logging::LogLevel::Debug,
                    format!("circuit open, skipping {key}"),
                ));
                continue;
            }
            if let Some(text) = self.try_model(&key, prompt, expects_json) {
                return Generation {
                    text,
                    origin: GenerationOrigin::Model { key },
                };
            }
        }

        let kind = emergency::classify(prompt);
        self.metrics.emergency_fallbacks.incr();
        self.log.log(LogRecord::new(
            crate::logging::LogLevel::Warn,
            format!("all models failed, using emergency template '{kind}'"),
        ));
        Generation {
            text: emergency::template(kind).to_string(),
            origin: GenerationOrigin::Emergency { template: kind },
        }
    }

    fn try_model(&self, key: &ModelKey, prompt: &str, expects_json: bool) -> Option<String> {
        let attempts = self.config.retry.max_attempts.max(1) as u32;
        for attempt in 0..attempts {
            self.metrics.attempts.incr();
            let opened = match self.invoker.invoke(key, prompt) {
                Ok(text) if accept(&text, expects_json) => {
                    self.breaker.record_success(key);
                    return Some(text);
                }
                Ok(_) => self.note_failure(key, attempt, "unusable response"),
                Err(err) => self.note_failure(key, attempt, &err.to_string()),
            };
            if opened {
                return None;
            }
            if attempt + 1 < attempts {
                self.metrics.retries.incr();
                thread::sleep(backoff::delay_for(&self.config.retry, attempt));
            }
        }
        None
    }

    /// Returns true when this failure opened the circuit.
    fn note_failure(&self, key: &ModelKey, attempt: u32, reason: &str) -> bool {
        self.metrics.failures.incr();
        let opened = self.breaker.record_failure(key);
        let level = if opened {
            crate::logging::LogLevel::Warn
        } else {
            crate::logging::LogLevel::Debug
        };
        let suffix = if opened { " (circuit opened)" } else { "" };
        self.log.log(LogRecord::new(
            level,
            format!("{key} attempt {}: {reason}{suffix}", attempt + 1),
        ));
        opened
    }
}

/// Non-empty, and recoverable JSON when JSON was asked for.
fn accept(text: &str, expects_json: bool) -> bool {
    if text.trim().is_empty() {
        return false;
    }
    !expects_json || extract::extract_json(text).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LadderConfig, ProviderConfig, RetryPolicy};
    use crate::logging::NullLogSink;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ScriptedInvoker {
        responses: Mutex<VecDeque<Result<String, String>>>,
        calls: Mutex<Vec<ModelKey>>,
    }

    impl ScriptedInvoker {
        fn new(responses: Vec<Result<&str, &str>>) -> Self {
            Self {
                responses: Mutex::new(
                    responses
                        .into_iter()
                        .map(|r| r.map(String::from).map_err(String::from))
                        .collect(),
                ),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<ModelKey> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl ModelInvoker for ScriptedInvoker {
        fn invoke(&self, key: &ModelKey, _prompt: &str) -> Result<String, InvokeError> {
            self.calls.lock().unwrap().push(key.clone());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err("script exhausted".into()))
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
        config.providers.insert(
            "anthropic".into(),
            ProviderConfig {
                api_key: "sk-ant-test".into(),
                ..ProviderConfig::default()
            },
        );
        config.ladder = LadderConfig::default();
        config.retry = RetryPolicy {
            max_attempts: 1,
            base_delay_ms: 0,
            max_delay_ms: 0,
            jitter_ms: 0,
        };
        config
    }

    fn generator(invoker: Arc<ScriptedInvoker>, config: Config) -> FallbackGenerator {
        FallbackGenerator::new(
            invoker,
            config,
            Arc::new(Metrics::default()),
            Arc::new(NullLogSink),
        )
    }

    #[test]
    fn falls_through_to_the_next_model() {
        let invoker = Arc::new(ScriptedInvoker::new(vec![
            Err("timeout"),
            Ok("a fine logline"),
        ]));
        let gen = generator(Arc::clone(&invoker), test_config());

        let result = gen.generate("Give me a logline.", ModelTier::Fast, ResponseFormat::Text);
        assert_eq!(result.text, "a fine logline");
        match result.origin {
            GenerationOrigin::Model { key } => assert_eq!(key.provider, "anthropic"),
            other => panic!("unexpected origin: {other:?}"),
        }
        assert_eq!(invoker.calls().len(), 2);
    }

    #[test]
    fn total_outage_yields_emergency_origin() {
        let invoker = Arc::new(ScriptedInvoker::new(vec![
            Err("down"),
            Err("down"),
            Err("down"),
        ]));
        let gen = generator(invoker, test_config());

        let result = gen.generate(
            "Expand into a one-page synopsis. Respond with JSON only.",
            ModelTier::Fast,
            ResponseFormat::Json,
        );
        assert!(result.is_emergency());
        assert!(!result.text.trim().is_empty());
        assert_eq!(gen.metrics().emergency_fallbacks.get(), 1);
    }

    #[test]
    fn fenced_json_is_accepted_when_json_expected() {
        let invoker = Arc::new(ScriptedInvoker::new(vec![Ok(
            "```json\n{\"logline\": \"x\"}\n```",
        )]));
        let gen = generator(invoker, test_config());

        let result = gen.generate("Respond with JSON only.", ModelTier::Fast, ResponseFormat::Json);
        assert!(!result.is_emergency());
    }

    #[test]
    fn non_json_response_is_a_failure_when_json_expected() {
        let invoker = Arc::new(ScriptedInvoker::new(vec![
            Ok("Sorry, I can't produce that."),
            Ok(r#"{"logline": "x"}"#),
        ]));
        let gen = generator(Arc::clone(&invoker), test_config());

        let result = gen.generate("Respond with JSON only.", ModelTier::Fast, ResponseFormat::Json);
        assert!(!result.is_emergency());
        assert_eq!(invoker.calls()[1].provider, "anthropic");
    }

    #[test]
    fn retries_within_one_model_before_moving_on() {
        let mut config = test_config();
        config.retry.max_attempts = 3;
        let invoker = Arc::new(ScriptedInvoker::new(vec![
            Err("flaky"),
            Err("flaky"),
            Ok("third time lucky"),
        ]));
        let gen = generator(Arc::clone(&invoker), config);

        let result = gen.generate("Give me a logline.", ModelTier::Fast, ResponseFormat::Text);
        assert!(!result.is_emergency());
        let calls = invoker.calls();
        assert_eq!(calls.len(), 3);
        assert!(calls.iter().all(|k| k.provider == "openai"));
        assert_eq!(gen.metrics().retries.get(), 2);
    }

    #[test]
    fn circuit_opening_mid_retry_abandons_the_model() {
        let mut config = test_config();
        config.retry.max_attempts = 5;
        config.breaker.failure_threshold = 2;
        let invoker = Arc::new(ScriptedInvoker::new(vec![
            Err("down"),
            Err("down"),
            Ok("a fine logline"),
        ]));
        let gen = generator(Arc::clone(&invoker), config);

        let result = gen.generate("Give me a logline.", ModelTier::Fast, ResponseFormat::Text);
        assert!(!result.is_emergency());
        let calls = invoker.calls();
        // Two failures trip the breaker, so the remaining retries on the
        // first key are not spent.
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0].provider, "openai");
        assert_eq!(calls[1].provider, "openai");
        assert_eq!(calls[2].provider, "anthropic");
    }

    #[test]
    fn open_circuit_skips_the_model() {
        let mut config = test_config();
        config.breaker.failure_threshold = 1;
        let invoker = Arc::new(ScriptedInvoker::new(vec![
            Err("down"),
            Ok("from anthropic"),
            Ok("still from anthropic"),
        ]));
        let gen = generator(Arc::clone(&invoker), config);

        gen.generate("first", ModelTier::Fast, ResponseFormat::Text);
        gen.generate("second", ModelTier::Fast, ResponseFormat::Text);

        let calls = invoker.calls();
        assert_eq!(calls.len(), 3);
        // The second run never touched the tripped openai entry.
        assert_eq!(calls[2].provider, "anthropic");
        assert_eq!(gen.metrics().breaker_skips.get(), 1);
    }
}
