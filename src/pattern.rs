//! Bounded-window request history per (identifier, endpoint).
//!
//! Every admitted check (while learning is enabled) appends one [`PatternEvent`] to the
//! key's ordered collection, scored by its timestamp. Events older than
//! [`PATTERN_WINDOW_SECS`] are pruned on write only, so a read right after the horizon
//! passes can still observe stale entries until the next write for that key.

use crate::error::LimiterError;
use crate::store::RecordStore;
use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Retention horizon for pattern events (1 hour).
pub const PATTERN_WINDOW_SECS: u64 = 3600;

/// Caller-supplied request context. Ordered so that identical contexts serialize to
/// identical bytes.
pub type RequestContext = BTreeMap<String, String>;

/// One observed request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternEvent {
    pub timestamp: u64,
    /// Hour of day in UTC, 0-23.
    #[serde(rename = "hour")]
    pub hour_of_day: u32,
    /// ISO weekday in UTC, 1 (Monday) to 7 (Sunday).
    pub day_of_week: u32,
    pub context: RequestContext,
    /// Weight of the event; always 1 when recorded.
    pub frequency: u32,
}

impl PatternEvent {
    /// Build the event for a request observed at `timestamp`.
    pub fn observed(timestamp: u64, context: RequestContext) -> Self {
        let at = i64::try_from(timestamp)
            .ok()
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
            .unwrap_or_default();
        Self {
            timestamp,
            hour_of_day: at.hour(),
            day_of_week: at.weekday().number_from_monday(),
            context,
            frequency: 1,
        }
    }
}

/// Store accessor for pattern history under one isolation prefix.
#[derive(Debug)]
pub struct PatternHistory<'a, S> {
    store: &'a S,
    prefix: &'a str,
}

impl<'a, S: RecordStore> PatternHistory<'a, S> {
    pub fn new(store: &'a S, prefix: &'a str) -> Self {
        Self { store, prefix }
    }

    /// Store key of the collection for `identifier` on `endpoint`.
    pub fn key(&self, identifier: &str, endpoint: &str) -> String {
        format!("{}patterns:{}:{}", self.prefix, identifier, endpoint)
    }

    /// Append an event observed at `now` and prune everything at or before `now - window`.
    pub async fn record(
        &self,
        identifier: &str,
        endpoint: &str,
        context: &RequestContext,
        now: u64,
    ) -> Result<(), LimiterError> {
        let key = self.key(identifier, endpoint);
        let event = PatternEvent::observed(now, context.clone());
        // Serializing a struct of strings and integers cannot fail.
        let bytes = serde_json::to_vec(&event).unwrap_or_default();
        self.store.append(&key, now, bytes).await.map_err(LimiterError::store)?;
        self.store
            .remove_score_range(&key, 0, now.saturating_sub(PATTERN_WINDOW_SECS))
            .await
            .map_err(LimiterError::store)
    }

    /// Load every stored event, oldest first. Undecodable entries are skipped.
    pub async fn load(
        &self,
        identifier: &str,
        endpoint: &str,
    ) -> Result<Vec<PatternEvent>, LimiterError> {
        let key = self.key(identifier, endpoint);
        let raw = self.store.range_all(&key).await.map_err(LimiterError::store)?;
        let mut events = Vec::with_capacity(raw.len());
        for bytes in raw {
            match serde_json::from_slice::<PatternEvent>(&bytes) {
                Ok(event) => events.push(event),
                Err(err) => {
                    tracing::warn!(key = %key, error = %err, "skipping malformed pattern event")
                }
            }
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::InMemoryRecordStore;
    use std::sync::Arc;

    // 2024-01-01T13:05:00Z, a Monday.
    const MONDAY_1305: u64 = 1_704_114_300;

    fn ctx(pairs: &[(&str, &str)]) -> RequestContext {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn observed_event_derives_calendar_fields() {
        let event = PatternEvent::observed(MONDAY_1305, ctx(&[("ip", "10.0.0.1")]));
        assert_eq!(event.hour_of_day, 13);
        assert_eq!(event.day_of_week, 1);
        assert_eq!(event.frequency, 1);
        assert_eq!(event.context.get("ip").map(String::as_str), Some("10.0.0.1"));
    }

    #[tokio::test]
    async fn record_then_load_returns_events_in_time_order() {
        let store = InMemoryRecordStore::with_clock(Arc::new(ManualClock::new(MONDAY_1305)));
        let history = PatternHistory::new(&store, "t:");
        history.record("u", "e", &ctx(&[]), MONDAY_1305).await.unwrap();
        history.record("u", "e", &ctx(&[]), MONDAY_1305 + 5).await.unwrap();
        let events = history.load("u", "e").await.unwrap();
        assert_eq!(events.len(), 2);
        assert!(events[0].timestamp < events[1].timestamp);
        assert_eq!(history.key("u", "e"), "t:patterns:u:e");
    }

    #[tokio::test]
    async fn writes_prune_events_older_than_window() {
        let store = InMemoryRecordStore::new();
        let history = PatternHistory::new(&store, "t:");
        history.record("u", "e", &ctx(&[]), MONDAY_1305).await.unwrap();

        // Reading after the horizon still sees the stale event.
        let late = MONDAY_1305 + PATTERN_WINDOW_SECS + 1;
        assert_eq!(history.load("u", "e").await.unwrap().len(), 1);

        history.record("u", "e", &ctx(&[]), late).await.unwrap();
        let events = history.load("u", "e").await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].timestamp, late);
    }

    #[tokio::test]
    async fn malformed_entries_are_skipped() {
        let store = InMemoryRecordStore::new();
        let history = PatternHistory::new(&store, "t:");
        store.append("t:patterns:u:e", MONDAY_1305, b"not json".to_vec()).await.unwrap();
        history.record("u", "e", &ctx(&[]), MONDAY_1305).await.unwrap();
        let events = history.load("u", "e").await.unwrap();
        assert_eq!(events.len(), 1);
    }
}
