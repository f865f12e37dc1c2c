/*!
 * Broker Configuration
 *
 * Runtime configuration with environment overrides
 */

use super::limits;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Broker configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct BrokerConfig {
    /// Emit JSON-formatted traces instead of the compact format
    pub trace_json: bool,
    /// Callbacks slower than this are reported with `warn!`
    #[serde(with = "duration_micros")]
    pub slow_callback_threshold: Duration,
    /// Suggested interval for engine detach polling
    #[serde(with = "duration_micros")]
    pub detach_poll_interval: Duration,
    /// Upper bound on frames visited by one stack walk
    pub max_walk_depth: usize,
    /// Keep the full state history of each recompilation request
    pub record_rejit_history: bool,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            trace_json: false,
            slow_callback_threshold: limits::SLOW_CALLBACK_THRESHOLD,
            detach_poll_interval: limits::DEFAULT_DETACH_POLL_INTERVAL,
            max_walk_depth: limits::DEFAULT_MAX_WALK_DEPTH,
            record_rejit_history: true,
        }
    }
}

impl BrokerConfig {
    /// Build configuration from defaults plus environment overrides
    ///
    /// Environment variables:
    /// - PROFILER_BROKER_TRACE_JSON: "1" or "true"
    /// - PROFILER_BROKER_SLOW_CALLBACK_US: microseconds
    /// - PROFILER_BROKER_DETACH_POLL_MS: milliseconds
    /// - PROFILER_BROKER_MAX_WALK_DEPTH: frame count
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("PROFILER_BROKER_TRACE_JSON") {
            self.trace_json = v == "1" || v.eq_ignore_ascii_case("true");
        }
        if let Some(us) = lookup("PROFILER_BROKER_SLOW_CALLBACK_US").and_then(|v| v.parse().ok()) {
            self.slow_callback_threshold = Duration::from_micros(us);
        }
        if let Some(ms) = lookup("PROFILER_BROKER_DETACH_POLL_MS").and_then(|v| v.parse().ok()) {
            self.detach_poll_interval = Duration::from_millis(ms);
        }
        if let Some(depth) = lookup("PROFILER_BROKER_MAX_WALK_DEPTH").and_then(|v| v.parse().ok()) {
            if depth > 0 {
                self.max_walk_depth = depth;
            }
        }
        self
    }

    /// Parse configuration from a JSON document, missing fields take defaults
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

mod duration_micros {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_micros() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_micros)
    }
}
