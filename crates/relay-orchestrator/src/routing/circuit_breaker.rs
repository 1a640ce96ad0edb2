//! Circuit breaker gate for failing providers.

use super::gate::ProviderGate;
use crate::config::CircuitBreakerSettings;
use relay_abstraction::Request;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Circuit state for one provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation.
    Closed,
    /// Skipping the provider until the cooldown expires.
    Open(Instant),
    /// Cooldown expired; one trial request decides.
    HalfOpen,
}

/// Sliding-window outcome history for one provider.
#[derive(Debug)]
struct ProviderHealth {
    state: CircuitState,
    successes: VecDeque<Instant>,
    failures: VecDeque<Instant>,
}

impl ProviderHealth {
    fn new() -> Self {
        Self { state: CircuitState::Closed, successes: VecDeque::new(), failures: VecDeque::new() }
    }

    fn prune(&mut self, now: Instant, window: Duration) {
        for entries in [&mut self.successes, &mut self.failures] {
            while entries.front().is_some_and(|oldest| now.duration_since(*oldest) > window) {
                entries.pop_front();
            }
        }
    }

    fn samples(&self) -> usize {
        self.successes.len() + self.failures.len()
    }

    fn failure_rate(&self) -> f64 {
        let total = self.samples();
        if total == 0 {
            return 0.0;
        }
        self.failures.len() as f64 / total as f64
    }
}

/// Skips providers whose recent failure rate exceeds a threshold.
#[derive(Debug)]
pub struct CircuitBreaker {
    providers: Mutex<HashMap<String, ProviderHealth>>,
    failure_threshold: f64,
    window: Duration,
    cooldown: Duration,
    min_samples: usize,
}

impl CircuitBreaker {
    /// Creates a breaker with default settings (50% over 5 minutes, 60s
    /// cooldown, at least 8 samples).
    #[must_use]
    pub fn new() -> Self {
        Self::from_settings(&CircuitBreakerSettings::default())
    }

    /// Creates a breaker from configuration.
    #[must_use]
    pub fn from_settings(settings: &CircuitBreakerSettings) -> Self {
        Self {
            providers: Mutex::new(HashMap::new()),
            failure_threshold: settings.failure_threshold,
            window: Duration::from_secs(settings.window_secs),
            cooldown: Duration::from_secs(settings.cooldown_secs),
            min_samples: settings.min_samples,
        }
    }

    /// Current state for a provider.
    pub fn state(&self, provider: &str) -> CircuitState {
        let providers = self.providers.lock().unwrap_or_else(PoisonError::into_inner);
        providers.get(provider).map_or(CircuitState::Closed, |health| health.state)
    }

    /// Failure rate in the current window.
    pub fn failure_rate(&self, provider: &str) -> f64 {
        let providers = self.providers.lock().unwrap_or_else(PoisonError::into_inner);
        providers.get(provider).map_or(0.0, ProviderHealth::failure_rate)
    }

    fn maybe_open(&self, provider: &str, health: &mut ProviderHealth) {
        let samples = health.samples();
        if samples < self.min_samples {
            return;
        }

        let rate = health.failure_rate();
        if rate > self.failure_threshold && health.state == CircuitState::Closed {
            health.state = CircuitState::Open(Instant::now());
            warn!(
                provider = provider,
                failure_rate = rate,
                threshold = self.failure_threshold,
                samples = samples,
                "Circuit breaker: Closed -> Open"
            );
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderGate for CircuitBreaker {
    fn permits(&self, provider: &str, _request: &Request) -> bool {
        let mut providers = self.providers.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(health) = providers.get_mut(provider) else {
            return true;
        };

        match health.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open(opened_at) => {
                if opened_at.elapsed() >= self.cooldown {
                    health.state = CircuitState::HalfOpen;
                    debug!(provider = provider, "Circuit breaker: Open -> HalfOpen");
                    true
                } else {
                    false
                }
            }
        }
    }

    fn record_success(&self, provider: &str) {
        let mut providers = self.providers.lock().unwrap_or_else(PoisonError::into_inner);
        let health = providers.entry(provider.to_string()).or_insert_with(ProviderHealth::new);

        if health.state == CircuitState::HalfOpen {
            // Start a fresh window so failures from before the outage don't reopen it.
            *health = ProviderHealth::new();
            debug!(provider = provider, "Circuit breaker: HalfOpen -> Closed");
            return;
        }

        let now = Instant::now();
        health.successes.push_back(now);
        health.prune(now, self.window);
        self.maybe_open(provider, health);
    }

    fn record_failure(&self, provider: &str) {
        let mut providers = self.providers.lock().unwrap_or_else(PoisonError::into_inner);
        let health = providers.entry(provider.to_string()).or_insert_with(ProviderHealth::new);

        let now = Instant::now();
        health.failures.push_back(now);
        health.prune(now, self.window);

        if health.state == CircuitState::HalfOpen {
            health.state = CircuitState::Open(now);
            warn!(provider = provider, "Circuit breaker: HalfOpen -> Open (trial failed)");
            return;
        }

        self.maybe_open(provider, health);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(cooldown_secs: u64) -> CircuitBreaker {
        CircuitBreaker::from_settings(&CircuitBreakerSettings {
            failure_threshold: 0.5,
            window_secs: 300,
            cooldown_secs,
            min_samples: 4,
        })
    }

    #[test]
    fn test_opens_after_high_failure_rate() {
        let breaker = breaker(60);
        let request = Request::text("x");

        for _ in 0..3 {
            breaker.record_failure("p1");
        }
        // Not enough samples yet.
        assert!(breaker.permits("p1", &request));

        breaker.record_failure("p1");
        assert!(matches!(breaker.state("p1"), CircuitState::Open(_)));
        assert!(!breaker.permits("p1", &request));
        assert!(breaker.permits("p2", &request));
    }

    #[test]
    fn test_stays_closed_below_threshold() {
        let breaker = breaker(60);
        for _ in 0..3 {
            breaker.record_success("p1");
        }
        breaker.record_failure("p1");
        breaker.record_failure("p1");
        assert_eq!(breaker.state("p1"), CircuitState::Closed);
        assert!((breaker.failure_rate("p1") - 0.4).abs() < f64::EPSILON);
    }

    #[test]
    fn test_half_open_recovery() {
        let breaker = breaker(0);
        let request = Request::text("x");
        for _ in 0..4 {
            breaker.record_failure("p1");
        }

        // Zero cooldown: the next check moves to half-open.
        assert!(breaker.permits("p1", &request));
        assert_eq!(breaker.state("p1"), CircuitState::HalfOpen);

        breaker.record_success("p1");
        assert_eq!(breaker.state("p1"), CircuitState::Closed);
        assert_eq!(breaker.failure_rate("p1"), 0.0);
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let breaker = breaker(0);
        let request = Request::text("x");
        for _ in 0..4 {
            breaker.record_failure("p1");
        }
        assert!(breaker.permits("p1", &request));
        breaker.record_failure("p1");
        assert!(matches!(breaker.state("p1"), CircuitState::Open(_)));
    }
}
