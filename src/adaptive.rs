//! Adaptive limit calculation from pattern history.
//!
//! Two signals are derived from a key's events:
//! - **trend**: average event frequency divided by 10, clamped to `[0, 1]`; `0.5` when there
//!   is no history.
//! - **burst factor**: `1 + 0.1` per event in the last [`BURST_WINDOW_SECS`], capped at
//!   [`MAX_BURST_MULTIPLIER`]; `1.0` when nothing is recent.
//!
//! A steady trend above `0.7` raises the base limit by 20%, a sparse one below `0.3` lowers it
//! by 20%. The burst factor then scales the result up: recent density widens the ceiling
//! instead of tightening it, while the plain `count < limit` admission test still applies.
//!
//! ```rust
//! use surgeguard::adaptive::adaptive_limit;
//!
//! assert_eq!(adaptive_limit(100, 0.5, 1.0), 100);
//! assert_eq!(adaptive_limit(100, 0.9, 1.0), 120);
//! assert_eq!(adaptive_limit(100, 0.1, 1.5), 120);
//! assert_eq!(adaptive_limit(100, 0.9, 3.0), 300); // capped at base * 3
//! assert_eq!(adaptive_limit(10, 0.1, 1.0), 10); // floor
//! ```

use crate::pattern::PatternEvent;
use serde::{Deserialize, Serialize};

/// Ceiling of the burst factor and of the adaptive limit relative to the base.
pub const MAX_BURST_MULTIPLIER: u64 = 3;
/// Lowest limit adaptive throttling will ever produce.
pub const MIN_ADAPTIVE_LIMIT: u64 = 10;
/// Lookback used for burst detection.
pub const BURST_WINDOW_SECS: u64 = 300;
/// Trend reported when there is no history.
pub const NEUTRAL_TREND: f64 = 0.5;

const STEADY_TREND: f64 = 0.7;
const SPARSE_TREND: f64 = 0.3;

/// Mean `frequency` over `events`, `None` when empty.
pub fn average_frequency(events: &[PatternEvent]) -> Option<f64> {
    if events.is_empty() {
        return None;
    }
    let total: f64 = events.iter().map(|e| f64::from(e.frequency)).sum();
    Some(total / events.len() as f64)
}

/// Normalized usage trend in `[0, 1]`.
pub fn usage_trend(events: &[PatternEvent]) -> f64 {
    match average_frequency(events) {
        Some(avg) => (avg / 10.0).clamp(0.0, 1.0),
        None => NEUTRAL_TREND,
    }
}

/// Density multiplier from events strictly newer than `now - BURST_WINDOW_SECS`.
pub fn burst_factor(events: &[PatternEvent], now: u64) -> f64 {
    let horizon = now.saturating_sub(BURST_WINDOW_SECS);
    let recent = events.iter().filter(|e| e.timestamp > horizon).count();
    if recent == 0 {
        return 1.0;
    }
    (1.0 + 0.1 * recent as f64).min(MAX_BURST_MULTIPLIER as f64)
}

/// Fold trend and burst factor into an effective limit.
///
/// Each scaling step truncates toward zero. The result is clamped to
/// `[MIN_ADAPTIVE_LIMIT, base * MAX_BURST_MULTIPLIER]`, with the floor winning when the
/// base is so small that the ceiling falls below it.
pub fn adaptive_limit(base: u64, trend: f64, burst: f64) -> u64 {
    let mut optimal = base;
    if trend > STEADY_TREND {
        optimal = (base as f64 * 1.2) as u64;
    } else if trend < SPARSE_TREND {
        optimal = (base as f64 * 0.8) as u64;
    }
    optimal = (optimal as f64 * burst) as u64;
    optimal.min(base.saturating_mul(MAX_BURST_MULTIPLIER)).max(MIN_ADAPTIVE_LIMIT)
}

/// Statistics derived from one key's pattern history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PatternStats {
    pub pattern_count: usize,
    pub trend: f64,
    pub burst_factor: f64,
}

impl PatternStats {
    /// Statistics of an empty history.
    pub const NEUTRAL: PatternStats =
        PatternStats { pattern_count: 0, trend: NEUTRAL_TREND, burst_factor: 1.0 };

    pub fn from_events(events: &[PatternEvent], now: u64) -> Self {
        Self {
            pattern_count: events.len(),
            trend: usage_trend(events),
            burst_factor: burst_factor(events, now),
        }
    }

    /// Effective limit for `base` under these statistics.
    pub fn limit_for(&self, base: u64) -> u64 {
        adaptive_limit(base, self.trend, self.burst_factor)
    }
}

impl Default for PatternStats {
    fn default() -> Self {
        Self::NEUTRAL
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::RequestContext;

    fn event_at(ts: u64) -> PatternEvent {
        PatternEvent::observed(ts, RequestContext::new())
    }

    fn weighted(ts: u64, frequency: u32) -> PatternEvent {
        PatternEvent { frequency, ..event_at(ts) }
    }

    #[test]
    fn empty_history_is_neutral() {
        assert_eq!(usage_trend(&[]), NEUTRAL_TREND);
        assert_eq!(burst_factor(&[], 1_000), 1.0);
        assert_eq!(PatternStats::from_events(&[], 1_000), PatternStats::NEUTRAL);
    }

    #[test]
    fn trend_is_average_frequency_over_ten() {
        let events = vec![weighted(1, 1), weighted(2, 1)];
        assert!((usage_trend(&events) - 0.1).abs() < 1e-9);
        let heavy = vec![weighted(1, 8), weighted(2, 20)];
        assert_eq!(usage_trend(&heavy), 1.0);
    }

    #[test]
    fn burst_counts_only_recent_events() {
        let now = 10_000;
        let events =
            vec![event_at(now - 400), event_at(now - 300), event_at(now - 299), event_at(now)];
        assert!((burst_factor(&events, now) - 1.2).abs() < 1e-9);
    }

    #[test]
    fn burst_is_capped() {
        let now = 10_000;
        let events: Vec<_> = (0..50).map(|i| event_at(now - i)).collect();
        assert_eq!(burst_factor(&events, now), 3.0);
    }

    #[test]
    fn trend_adjusts_base_limit() {
        assert_eq!(adaptive_limit(100, 0.71, 1.0), 120);
        assert_eq!(adaptive_limit(100, 0.7, 1.0), 100);
        assert_eq!(adaptive_limit(100, 0.3, 1.0), 100);
        assert_eq!(adaptive_limit(100, 0.29, 1.0), 80);
    }

    #[test]
    fn sparse_small_base_hits_floor() {
        // 10 * 0.8 = 8, * 1.1 = 8.8 -> 8, floored to 10
        assert_eq!(adaptive_limit(10, 0.1, 1.1), 10);
        // 8 * 1.4 = 11.2 -> 11
        assert_eq!(adaptive_limit(10, 0.1, 1.4), 11);
    }

    #[test]
    fn limit_stays_in_bounds_for_any_signal() {
        for base in [1u64, 4, 10, 37, 100, 1_000] {
            for trend in [0.0, 0.1, 0.29, 0.3, 0.5, 0.7, 0.71, 1.0] {
                for burst in [1.0, 1.1, 1.5, 2.0, 2.9, 3.0] {
                    let limit = adaptive_limit(base, trend, burst);
                    assert!(limit >= MIN_ADAPTIVE_LIMIT, "base={base} trend={trend} burst={burst}");
                    assert!(
                        limit <= (base * MAX_BURST_MULTIPLIER).max(MIN_ADAPTIVE_LIMIT),
                        "base={base} trend={trend} burst={burst}"
                    );
                }
            }
        }
    }
}
