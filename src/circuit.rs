//! Failure-counting guard shared by the serializer and the integrity verifier.
//!
//! Each owner holds its own [`CircuitBreaker`] value, so a burst of failures
//! in one serializer never disables another.

use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    threshold: u32,
    timeout: Duration,
    failures: u32,
    opened_at: Option<Instant>,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, timeout: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            timeout,
            failures: 0,
            opened_at: None,
        }
    }

    pub fn failure_count(&self) -> u32 {
        self.failures
    }

    pub fn is_open(&mut self) -> bool {
        self.is_open_at(Instant::now())
    }

    /// Closes the breaker and zeroes the failure counter once the cooldown
    /// has elapsed.
    pub fn is_open_at(&mut self, now: Instant) -> bool {
        match self.opened_at {
            Some(opened) if now.saturating_duration_since(opened) >= self.timeout => {
                tracing::info!(failures = self.failures, "circuit breaker closed after cooldown");
                self.reset();
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    pub fn record_success(&mut self) {
        self.failures = 0;
        self.opened_at = None;
    }

    pub fn record_failure(&mut self) {
        self.record_failure_at(Instant::now());
    }

    pub fn record_failure_at(&mut self, now: Instant) {
        self.failures = self.failures.saturating_add(1);
        if self.failures >= self.threshold && self.opened_at.is_none() {
            tracing::warn!(
                failures = self.failures,
                cooldown_ms = self.timeout.as_millis() as u64,
                "circuit breaker opened"
            );
            self.opened_at = Some(now);
        }
    }

    pub fn reset(&mut self) {
        self.failures = 0;
        self.opened_at = None;
    }

    /// Standard payload returned while the breaker is open.
    pub fn open_payload(&self, operation: &str) -> serde_json::Value {
        serde_json::json!({
            "error": format!("circuit breaker open: {} skipped", operation),
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "circuitOpen": true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_after_threshold() {
        let mut cb = CircuitBreaker::new(5, Duration::from_secs(60));
        let t0 = Instant::now();
        for _ in 0..4 {
            cb.record_failure_at(t0);
        }
        assert!(!cb.is_open_at(t0));
        cb.record_failure_at(t0);
        assert!(cb.is_open_at(t0));
        assert_eq!(cb.failure_count(), 5);
    }

    #[test]
    fn closes_after_timeout_and_resets_counter() {
        let mut cb = CircuitBreaker::new(2, Duration::from_millis(100));
        let t0 = Instant::now();
        cb.record_failure_at(t0);
        cb.record_failure_at(t0);
        assert!(cb.is_open_at(t0 + Duration::from_millis(50)));
        assert!(!cb.is_open_at(t0 + Duration::from_millis(100)));
        assert_eq!(cb.failure_count(), 0);
    }

    #[test]
    fn success_resets_failures() {
        let mut cb = CircuitBreaker::new(3, Duration::from_secs(1));
        cb.record_failure();
        cb.record_failure();
        cb.record_success();
        assert_eq!(cb.failure_count(), 0);
        cb.record_failure();
        cb.record_failure();
        assert!(!cb.is_open());
    }

    #[test]
    fn open_payload_shape() {
        let cb = CircuitBreaker::new(1, Duration::from_secs(1));
        let payload = cb.open_payload("serialize");
        assert_eq!(payload["circuitOpen"], true);
        assert!(payload["error"].as_str().unwrap().contains("serialize"));
        assert!(payload["timestamp"].is_string());
    }
}
