use serde_json::{json, Value};
use std::fmt;

/// Events emitted by the limiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LimiterEvent {
    /// A request was admitted.
    Admitted {
        /// Composite `identifier:endpoint` key
        key: String,
        /// Effective limit used for the decision
        limit: u64,
        /// Headroom left after admission
        remaining: i64,
    },
    /// A request was rejected.
    Rejected {
        /// Composite `identifier:endpoint` key
        key: String,
        /// Effective limit used for the decision
        limit: u64,
        /// Consecutive rejections including this one
        attempts: u64,
        /// Recommended delay in seconds
        retry_after: u64,
    },
    /// Usage and retry counters for a key were cleared.
    Reset {
        /// Composite `identifier:endpoint` key
        key: String,
    },
    /// A configuration update was applied.
    ConfigUpdated,
}

impl fmt::Display for LimiterEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LimiterEvent::Admitted { key, limit, remaining } => {
                write!(f, "Admitted({}, limit={}, remaining={})", key, limit, remaining)
            }
            LimiterEvent::Rejected { key, limit, attempts, retry_after } => write!(
                f,
                "Rejected({}, limit={}, attempt={}, retry_after={}s)",
                key, limit, attempts, retry_after
            ),
            LimiterEvent::Reset { key } => write!(f, "Reset({})", key),
            LimiterEvent::ConfigUpdated => write!(f, "ConfigUpdated"),
        }
    }
}

/// Convert a LimiterEvent into a JSON value for sinks.
pub fn event_to_json(event: &LimiterEvent) -> Value {
    match event {
        LimiterEvent::Admitted { key, limit, remaining } => json!({
            "kind": "admitted",
            "key": key,
            "limit": *limit,
            "remaining": *remaining,
        }),
        LimiterEvent::Rejected { key, limit, attempts, retry_after } => json!({
            "kind": "rejected",
            "key": key,
            "limit": *limit,
            "attempts": *attempts,
            "retry_after": *retry_after,
        }),
        LimiterEvent::Reset { key } => json!({ "kind": "reset", "key": key }),
        LimiterEvent::ConfigUpdated => json!({ "kind": "config_updated" }),
    }
}
