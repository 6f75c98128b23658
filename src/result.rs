//! Immutable outcome of one admission check.
//!
//! A [`RateLimitResult`] is built once by the limiter and only read afterwards. It renders to
//! a JSON object for API bodies and to the conventional rate-limit response headers:
//!
//! | header                     | value                                   |
//! |----------------------------|-----------------------------------------|
//! | `X-RateLimit-Limit`        | configured base limit                   |
//! | `X-RateLimit-Remaining`    | headroom left after this decision       |
//! | `X-RateLimit-Reset`        | window reset, unix seconds              |
//! | `X-RateLimit-Reset-ISO`    | window reset, RFC 3339                  |
//! | `Retry-After`              | recommended delay (rejections only)     |
//! | `X-RateLimit-Retry-After`  | recommended delay (rejections only)     |

use crate::adaptive::PatternStats;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Statistics captured alongside a decision.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UsageStats {
    /// Admitted requests in the window after this decision.
    pub current_usage: u64,
    pub pattern_count: usize,
    pub trend: f64,
    pub burst_factor: f64,
    pub base_limit: u64,
    pub adaptive_limit: u64,
}

impl UsageStats {
    pub fn new(
        current_usage: u64,
        patterns: PatternStats,
        base_limit: u64,
        adaptive_limit: u64,
    ) -> Self {
        Self {
            current_usage,
            pattern_count: patterns.pattern_count,
            trend: patterns.trend,
            burst_factor: patterns.burst_factor,
            base_limit,
            adaptive_limit,
        }
    }
}

/// Decision snapshot returned by [`AdaptiveRateLimiter::check`](crate::AdaptiveRateLimiter::check).
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitResult {
    allowed: bool,
    remaining: i64,
    retry_after: u64,
    reset_at: u64,
    decided_at: u64,
    stats: UsageStats,
}

impl RateLimitResult {
    /// Assemble a result. `decided_at` anchors [`RateLimitResult::time_until_reset`].
    pub fn new(
        allowed: bool,
        remaining: i64,
        retry_after: u64,
        reset_at: u64,
        decided_at: u64,
        stats: UsageStats,
    ) -> Self {
        Self { allowed, remaining, retry_after, reset_at, decided_at, stats }
    }

    pub fn is_allowed(&self) -> bool {
        self.allowed
    }

    /// `adaptive_limit - usage_after_decision`.
    pub fn remaining(&self) -> i64 {
        self.remaining
    }

    /// Recommended wait in seconds; `0` when allowed.
    pub fn retry_after(&self) -> u64 {
        self.retry_after
    }

    /// Window reset as unix seconds.
    pub fn reset_at(&self) -> u64 {
        self.reset_at
    }

    pub fn reset_datetime(&self) -> DateTime<Utc> {
        i64::try_from(self.reset_at)
            .ok()
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Seconds from the decision until the window resets, never negative.
    pub fn time_until_reset(&self) -> u64 {
        self.time_until_reset_at(self.decided_at)
    }

    /// Seconds from `now` until the window resets, never negative.
    pub fn time_until_reset_at(&self, now: u64) -> u64 {
        self.reset_at.saturating_sub(now)
    }

    pub fn stats(&self) -> &UsageStats {
        &self.stats
    }

    pub fn current_usage(&self) -> u64 {
        self.stats.current_usage
    }

    pub fn pattern_count(&self) -> usize {
        self.stats.pattern_count
    }

    pub fn trend(&self) -> f64 {
        self.stats.trend
    }

    pub fn burst_factor(&self) -> f64 {
        self.stats.burst_factor
    }

    /// Full snapshot as a JSON object.
    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("allowed".into(), json!(self.allowed));
        map.insert("remaining".into(), json!(self.remaining));
        map.insert("retry_after".into(), json!(self.retry_after));
        map.insert("reset_time".into(), json!(self.reset_at));
        map.insert("reset_time_iso".into(), json!(self.reset_datetime().to_rfc3339()));
        map.insert("time_until_reset".into(), json!(self.time_until_reset()));
        map.insert("stats".into(), serde_json::to_value(self.stats).unwrap_or(Value::Null));
        map
    }

    /// Pretty-printed JSON of [`RateLimitResult::to_map`].
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(&Value::Object(self.to_map())).unwrap_or_default()
    }

    /// Rate-limit response headers; the retry pair is only present on rejection.
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = vec![
            ("X-RateLimit-Limit", self.stats.base_limit.to_string()),
            ("X-RateLimit-Remaining", self.remaining.to_string()),
            ("X-RateLimit-Reset", self.reset_at.to_string()),
            ("X-RateLimit-Reset-ISO", self.reset_datetime().to_rfc3339()),
        ];
        if !self.allowed {
            headers.push(("Retry-After", self.retry_after.to_string()));
            headers.push(("X-RateLimit-Retry-After", self.retry_after.to_string()));
        }
        headers
    }
}
