//! Per-key usage window and retry counter records.

use serde::{Deserialize, Serialize};

/// Admitted requests in the current window for one (identifier, endpoint).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub count: u64,
    /// Unix seconds at which the window (and `count`) resets.
    #[serde(rename = "reset_time")]
    pub reset_at: u64,
}

impl UsageRecord {
    /// Record for a key seen for the first time at `now`.
    pub fn fresh(now: u64, window_secs: u64) -> Self {
        Self { count: 0, reset_at: now.saturating_add(window_secs) }
    }

    /// Decode a persisted record; `None` for anything that is not a valid record.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        serde_json::from_slice(bytes).ok()
    }

    pub fn encode(&self) -> Vec<u8> {
        // Two integers always serialize.
        serde_json::to_vec(self).unwrap_or_default()
    }

    /// The same window with one more admitted request.
    pub fn incremented(self) -> Self {
        Self { count: self.count.saturating_add(1), ..self }
    }
}

/// Decode a persisted retry counter. Unreadable values count as zero.
pub fn decode_retry_count(bytes: &[u8]) -> Option<u64> {
    std::str::from_utf8(bytes).ok()?.trim().parse().ok()
}

pub fn encode_retry_count(count: u64) -> Vec<u8> {
    count.to_string().into_bytes()
}
