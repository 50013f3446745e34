//! Per-model circuit breaker.
//!
//! Each model key carries its own failure counter. After
//! `failure_threshold` consecutive failures the circuit opens and the model
//! is skipped entirely until `cooldown_secs` has elapsed; the first call
//! after the cooldown is a probe, and its outcome either closes the circuit
//! or re-opens it for another full cooldown. A single success anywhere
//! resets the counter to zero.

use crate::config::{BreakerPolicy, ModelKey};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug)]
enum CircuitState {
    Closed { failures: u32 },
    Open { since: Instant },
    HalfOpen,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    policy: BreakerPolicy,
    circuits: Mutex<HashMap<ModelKey, CircuitState>>,
}

impl CircuitBreaker {
    pub fn new(policy: BreakerPolicy) -> Self {
        Self {
            policy,
            circuits: Mutex::new(HashMap::new()),
        }
    }

    /// Whether a call to `key` may proceed right now. An open circuit whose
    /// cooldown has elapsed transitions to half-open and admits one probe.
    pub fn allow(&self, key: &ModelKey) -> bool {
        self.allow_at(key, Instant::now())
    }

    pub(crate) fn allow_at(&self, key: &ModelKey, now: Instant) -> bool {
        let mut circuits = self.circuits.lock().unwrap_or_else(|e| e.into_inner());
        match circuits.get(key) {
            None | Some(CircuitState::Closed { .. }) | Some(CircuitState::HalfOpen) => true,
            Some(CircuitState::Open { since }) => {
                let cooldown = Duration::from_secs(self.policy.cooldown_secs);
                if now.duration_since(*since) >= cooldown {
                    circuits.insert(key.clone(), CircuitState::HalfOpen);
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self, key: &ModelKey) {
        let mut circuits = self.circuits.lock().unwrap_or_else(|e| e.into_inner());
        circuits.insert(key.clone(), CircuitState::Closed { failures: 0 });
    }

    /// Returns true when this failure tripped the circuit open.
    pub fn record_failure(&self, key: &ModelKey) -> bool {
        self.record_failure_at(key, Instant::now())
    }

    pub(crate) fn record_failure_at(&self, key: &ModelKey, now: Instant) -> bool {
        let mut circuits = self.circuits.lock().unwrap_or_else(|e| e.into_inner());
        let next = match circuits.get(key) {
            // A failed probe re-opens for a fresh cooldown.
            Some(CircuitState::HalfOpen) => CircuitState::Open { since: now },
            Some(CircuitState::Open { since }) => CircuitState::Open { since: *since },
            Some(CircuitState::Closed { failures }) => {
                let failures = failures + 1;
                if failures >= self.policy.failure_threshold {
                    CircuitState::Open { since: now }
                } else {
                    CircuitState::Closed { failures }
                }
            }
            None => {
                if self.policy.failure_threshold <= 1 {
                    CircuitState::Open { since: now }
                } else {
                    CircuitState::Closed { failures: 1 }
                }
            }
        };
        let opened = matches!(next, CircuitState::Open { since } if since == now);
        circuits.insert(key.clone(), next);
        opened
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(model: &str) -> ModelKey {
        ModelKey {
            provider: "openai".into(),
            model: model.into(),
        }
    }

    fn breaker(threshold: u32, cooldown_secs: u64) -> CircuitBreaker {
        CircuitBreaker::new(BreakerPolicy {
            failure_threshold: threshold,
            cooldown_secs,
        })
    }

    #[test]
    fn opens_after_threshold_consecutive_failures() {
        let b = breaker(5, 300);
        let k = key("gpt-4o");
        for _ in 0..4 {
            assert!(!b.record_failure(&k));
            assert!(b.allow(&k));
        }
        assert!(b.record_failure(&k));
        assert!(!b.allow(&k));
    }

    #[test]
    fn success_resets_the_counter() {
        let b = breaker(3, 300);
        let k = key("gpt-4o");
        b.record_failure(&k);
        b.record_failure(&k);
        b.record_success(&k);
        assert!(!b.record_failure(&k));
        assert!(!b.record_failure(&k));
        assert!(b.record_failure(&k));
    }

    #[test]
    fn cooldown_admits_one_probe() {
        let b = breaker(1, 300);
        let k = key("gpt-4o");
        let t0 = Instant::now();
        assert!(b.record_failure_at(&k, t0));
        assert!(!b.allow_at(&k, t0 + Duration::from_secs(299)));

        // Cooldown elapsed: probe admitted.
        assert!(b.allow_at(&k, t0 + Duration::from_secs(300)));
        // Probe fails: re-opened for a fresh cooldown.
        let t1 = t0 + Duration::from_secs(301);
        assert!(b.record_failure_at(&k, t1));
        assert!(!b.allow_at(&k, t1 + Duration::from_secs(299)));
    }

    #[test]
    fn probe_success_closes_the_circuit() {
        let b = breaker(2, 300);
        let k = key("gpt-4o");
        let t0 = Instant::now();
        b.record_failure_at(&k, t0);
        b.record_failure_at(&k, t0);
        assert!(b.allow_at(&k, t0 + Duration::from_secs(300)));
        b.record_success(&k);
        assert!(b.allow(&k));
        // Fully closed again: the failure count restarted from zero.
        assert!(!b.record_failure(&k));
        assert!(b.allow(&k));
    }

    #[test]
    fn circuits_are_independent_per_model() {
        let b = breaker(1, 300);
        b.record_failure(&key("gpt-4o"));
        assert!(!b.allow(&key("gpt-4o")));
        assert!(b.allow(&key("gpt-4o-mini")));
    }
}
