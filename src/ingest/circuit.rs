// src/ingest/circuit.rs
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
pub const DEFAULT_RESET_AFTER_SECS: i64 = 60;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CircuitState {
    pub failure_count: u32,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub last_activity_at: Option<DateTime<Utc>>,
}

/// Per-platform failure counter with a cool-down window.
/// - Opens once `failure_count >= threshold`.
/// - Closes by itself when `reset_after` has passed since the last failure (no half-open probe).
/// - Any success resets the count.
///
/// State lives for one run and is never persisted. The `*_at` variants take an explicit
/// clock so tests can move time.
#[derive(Debug)]
pub struct CircuitBreaker {
    threshold: u32,
    reset_after: ChronoDuration,
    states: Mutex<HashMap<String, CircuitState>>,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(DEFAULT_FAILURE_THRESHOLD, DEFAULT_RESET_AFTER_SECS)
    }
}

impl CircuitBreaker {
    /// `threshold` 0 is treated as 1; negative `reset_after_secs` as 0.
    pub fn new(threshold: u32, reset_after_secs: i64) -> Self {
        Self {
            threshold: threshold.max(1),
            reset_after: ChronoDuration::seconds(reset_after_secs.max(0)),
            states: Mutex::new(HashMap::new()),
        }
    }

    pub fn record_success(&self, platform: &str) {
        self.record_success_at(platform, Utc::now());
    }

    pub fn record_failure(&self, platform: &str) {
        self.record_failure_at(platform, Utc::now());
    }

    pub fn is_open(&self, platform: &str) -> bool {
        self.is_open_at(platform, Utc::now())
    }

    pub fn record_success_at(&self, platform: &str, now: DateTime<Utc>) {
        let mut states = self.states.lock().expect("circuit mutex poisoned");
        let st = states.entry(platform.to_string()).or_default();
        st.failure_count = 0;
        st.last_activity_at = Some(now);
    }

    pub fn record_failure_at(&self, platform: &str, now: DateTime<Utc>) {
        let mut states = self.states.lock().expect("circuit mutex poisoned");
        let st = states.entry(platform.to_string()).or_default();
        st.failure_count = st.failure_count.saturating_add(1);
        st.last_failure_at = Some(now);
        st.last_activity_at = Some(now);
    }

    pub fn is_open_at(&self, platform: &str, now: DateTime<Utc>) -> bool {
        let mut states = self.states.lock().expect("circuit mutex poisoned");
        let Some(st) = states.get_mut(platform) else {
            return false;
        };
        if st.failure_count < self.threshold {
            return false;
        }
        match st.last_failure_at {
            Some(at) if now.signed_duration_since(at) < self.reset_after => true,
            _ => {
                // Cool-down elapsed: the next attempt is a normal one.
                st.failure_count = 0;
                false
            }
        }
    }

    pub fn state(&self, platform: &str) -> CircuitState {
        self.states
            .lock()
            .expect("circuit mutex poisoned")
            .get(platform)
            .copied()
            .unwrap_or_default()
    }
}
