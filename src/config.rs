//! Limiter configuration.
//!
//! Configuration is a flat set of options merged over defaults. [`ConfigPatch`] carries a
//! partial update (every field optional) and can be parsed from a flat JSON object, which is
//! how framework glue usually hands settings over:
//!
//! ```rust
//! use surgeguard::{ConfigPatch, LimiterConfig};
//!
//! let patch = ConfigPatch::from_json(r#"{ "default_limit": 10, "retry_strategy": "linear" }"#)
//!     .unwrap();
//! let config = LimiterConfig::default().merge(&patch).unwrap();
//! assert_eq!(config.default_limit, 10);
//! assert_eq!(config.retry_strategy, "linear");
//! assert_eq!(config.default_window, 3600);
//! ```
//!
//! `retry_strategy` is deliberately not checked here: an unknown name only fails when a
//! delay is first computed (see [`StrategyFactory`](crate::StrategyFactory)).

use crate::error::LimiterError;
use serde::{Deserialize, Serialize};

/// Complete limiter configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimiterConfig {
    /// Base number of admitted requests per window.
    pub default_limit: u64,
    /// Window length in seconds; also the TTL of usage records and retry counters.
    pub default_window: u64,
    /// Informational; carried for callers, not used by the limit formula.
    pub burst_threshold: f64,
    /// Informational; pattern history is governed by `learning_enabled`.
    pub pattern_detection: bool,
    /// Record pattern events on admitted requests.
    pub learning_enabled: bool,
    /// Apply trend and burst adjustments to `default_limit`.
    pub adaptive_throttling: bool,
    /// Name of the retry-delay strategy used on rejection.
    pub retry_strategy: String,
    /// Informational; carried for callers.
    pub max_retries: u32,
    /// Namespace prepended to every store key.
    pub isolation_prefix: String,
    /// Base retry delay in seconds.
    pub base_delay: u64,
    /// Upper bound of the jitter added by the `jitter` strategy, as a fraction of its delay.
    pub jitter_factor: f64,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            default_limit: 100,
            default_window: 3600,
            burst_threshold: 0.8,
            pattern_detection: true,
            learning_enabled: true,
            adaptive_throttling: true,
            retry_strategy: "exponential".to_string(),
            max_retries: 3,
            isolation_prefix: "ai_limiter:".to_string(),
            base_delay: 60,
            jitter_factor: 0.1,
        }
    }
}

impl LimiterConfig {
    /// Check that every value is inside its documented range.
    pub fn validate(&self) -> Result<(), LimiterError> {
        if self.default_limit == 0 {
            return Err(LimiterError::InvalidConfig("default_limit must be at least 1".into()));
        }
        if self.default_window == 0 {
            return Err(LimiterError::InvalidConfig("default_window must be at least 1".into()));
        }
        if !self.burst_threshold.is_finite() || !(0.0..=1.0).contains(&self.burst_threshold) {
            return Err(LimiterError::InvalidConfig(format!(
                "burst_threshold must be within [0, 1], got {}",
                self.burst_threshold
            )));
        }
        if !self.jitter_factor.is_finite() || self.jitter_factor < 0.0 {
            return Err(LimiterError::InvalidConfig(format!(
                "jitter_factor must be a non-negative number, got {}",
                self.jitter_factor
            )));
        }
        if self.isolation_prefix.is_empty() {
            return Err(LimiterError::InvalidConfig("isolation_prefix must not be empty".into()));
        }
        Ok(())
    }

    /// Apply `patch` over this config and validate the result.
    pub fn merge(&self, patch: &ConfigPatch) -> Result<Self, LimiterError> {
        let mut next = self.clone();
        if let Some(v) = patch.default_limit {
            next.default_limit = v;
        }
        if let Some(v) = patch.default_window {
            next.default_window = v;
        }
        if let Some(v) = patch.burst_threshold {
            next.burst_threshold = v;
        }
        if let Some(v) = patch.pattern_detection {
            next.pattern_detection = v;
        }
        if let Some(v) = patch.learning_enabled {
            next.learning_enabled = v;
        }
        if let Some(v) = patch.adaptive_throttling {
            next.adaptive_throttling = v;
        }
        if let Some(v) = &patch.retry_strategy {
            next.retry_strategy = v.clone();
        }
        if let Some(v) = patch.max_retries {
            next.max_retries = v;
        }
        if let Some(v) = &patch.isolation_prefix {
            next.isolation_prefix = v.clone();
        }
        if let Some(v) = patch.base_delay {
            next.base_delay = v;
        }
        if let Some(v) = patch.jitter_factor {
            next.jitter_factor = v;
        }
        next.validate()?;
        Ok(next)
    }
}

/// Partial configuration update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigPatch {
    pub default_limit: Option<u64>,
    pub default_window: Option<u64>,
    pub burst_threshold: Option<f64>,
    pub pattern_detection: Option<bool>,
    pub learning_enabled: Option<bool>,
    pub adaptive_throttling: Option<bool>,
    pub retry_strategy: Option<String>,
    pub max_retries: Option<u32>,
    pub isolation_prefix: Option<String>,
    pub base_delay: Option<u64>,
    pub jitter_factor: Option<f64>,
}

impl ConfigPatch {
    /// Parse a flat JSON object. Unknown keys and out-of-type values (such as a negative
    /// window) are rejected as [`LimiterError::InvalidConfig`].
    pub fn from_json(raw: &str) -> Result<Self, LimiterError> {
        serde_json::from_str(raw).map_err(|e| LimiterError::InvalidConfig(e.to_string()))
    }

    /// Same as [`ConfigPatch::from_json`] for an already parsed value.
    pub fn from_value(value: serde_json::Value) -> Result<Self, LimiterError> {
        serde_json::from_value(value).map_err(|e| LimiterError::InvalidConfig(e.to_string()))
    }

    pub fn default_limit(mut self, v: u64) -> Self {
        self.default_limit = Some(v);
        self
    }

    pub fn default_window(mut self, v: u64) -> Self {
        self.default_window = Some(v);
        self
    }

    pub fn pattern_detection(mut self, v: bool) -> Self {
        self.pattern_detection = Some(v);
        self
    }

    pub fn learning_enabled(mut self, v: bool) -> Self {
        self.learning_enabled = Some(v);
        self
    }

    pub fn adaptive_throttling(mut self, v: bool) -> Self {
        self.adaptive_throttling = Some(v);
        self
    }

    pub fn retry_strategy(mut self, v: impl Into<String>) -> Self {
        self.retry_strategy = Some(v.into());
        self
    }

    pub fn isolation_prefix(mut self, v: impl Into<String>) -> Self {
        self.isolation_prefix = Some(v.into());
        self
    }

    pub fn base_delay(mut self, v: u64) -> Self {
        self.base_delay = Some(v);
        self
    }

    pub fn jitter_factor(mut self, v: f64) -> Self {
        self.jitter_factor = Some(v);
        self
    }
}
