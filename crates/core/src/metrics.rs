//! Process-wide counters, rendered as Prometheus exposition text. Plain
//! atomics; no metrics framework.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn incr(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Default)]
pub struct Metrics {
    /// Model invocations issued, including retries.
    pub attempts: Counter,
    /// Invocations that errored or returned unusable text.
    pub failures: Counter,
    /// Backoff-then-retry cycles within a single model.
    pub retries: Counter,
    /// Ladder entries skipped because their circuit was open.
    pub breaker_skips: Counter,
    /// Generations answered by an emergency template.
    pub emergency_fallbacks: Counter,
    /// Pipeline steps completed successfully.
    pub steps_completed: Counter,
    /// Pipeline steps that failed validation or parsing.
    pub steps_failed: Counter,
}

impl Metrics {
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (name, help, counter) in [
            (
                "snowflake_model_attempts_total",
                "Model invocations issued, including retries.",
                &self.attempts,
            ),
            (
                "snowflake_model_failures_total",
                "Model invocations that errored or returned unusable text.",
                &self.failures,
            ),
            (
                "snowflake_model_retries_total",
                "Retry cycles within a single model.",
                &self.retries,
            ),
            (
                "snowflake_breaker_skips_total",
                "Ladder entries skipped due to an open circuit.",
                &self.breaker_skips,
            ),
            (
                "snowflake_emergency_fallbacks_total",
                "Generations answered by an emergency template.",
                &self.emergency_fallbacks,
            ),
            (
                "snowflake_steps_completed_total",
                "Pipeline steps completed successfully.",
                &self.steps_completed,
            ),
            (
                "snowflake_steps_failed_total",
                "Pipeline steps that failed validation or parsing.",
                &self.steps_failed,
            ),
        ] {
            out.push_str(&format!(
                "# HELP {name} {help}\n# TYPE {name} counter\n{name} {}\n",
                counter.get()
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_prometheus_text() {
        let metrics = Metrics::default();
        metrics.attempts.incr();
        metrics.attempts.incr();
        metrics.emergency_fallbacks.add(3);

        let text = metrics.render();
        assert!(text.contains("# TYPE snowflake_model_attempts_total counter"));
        assert!(text.contains("snowflake_model_attempts_total 2"));
        assert!(text.contains("snowflake_emergency_fallbacks_total 3"));
        assert!(text.contains("snowflake_steps_failed_total 0"));
    }
}
