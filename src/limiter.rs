//! The admission decision engine.
//!
//! [`AdaptiveRateLimiter::check`] runs one decision against the shared record store:
//!
//! 1. Load the key's usage window (absent or undecodable ⇒ a fresh, empty window).
//! 2. Derive the adaptive limit from the key's pattern history.
//! 3. Admit when `count < limit`.
//! 4. On admission: persist `count + 1`, record a pattern event (if learning), clear the
//!    retry counter. On rejection: bump the retry counter and ask the configured
//!    [`RetryStrategy`](crate::RetryStrategy) for a delay.
//! 5. Report the post-decision headroom and statistics in a [`RateLimitResult`].
//!
//! Concurrency: the usage counter is read, incremented, and written back as separate store
//! calls. Concurrent checks on the same key can both read the same count and under-count;
//! last write wins. The engine holds no locks and keeps no per-key state, so several
//! processes can share one store with eventually consistent counting.
//!
//! ```rust
//! use std::sync::Arc;
//! use surgeguard::{AdaptiveRateLimiter, ConfigPatch, InMemoryRecordStore, ManualClock};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let clock = Arc::new(ManualClock::new(1_700_000_000));
//! let store = InMemoryRecordStore::with_clock(clock.clone());
//! let limiter = AdaptiveRateLimiter::from_patch(
//!     store,
//!     &ConfigPatch::default().default_limit(10).default_window(60),
//! )
//! .unwrap()
//! .with_clock(clock);
//!
//! let result = limiter.check_default("user_123").await.unwrap();
//! assert!(result.is_allowed());
//! assert_eq!(result.remaining(), 9);
//! # });
//! ```

use crate::adaptive::PatternStats;
use crate::clock::{Clock, SystemClock};
use crate::config::{ConfigPatch, LimiterConfig};
use crate::dynamic::DynamicConfig;
use crate::error::LimiterError;
use crate::pattern::{PatternEvent, PatternHistory, RequestContext};
use crate::result::{RateLimitResult, UsageStats};
use crate::store::RecordStore;
use crate::strategy::{DelayContext, StrategyFactory};
use crate::telemetry::{emit_best_effort, LimiterEvent, NullSink, TelemetrySink};
use crate::usage::{decode_retry_count, encode_retry_count, UsageRecord};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Endpoint used when the caller does not name one.
pub const DEFAULT_ENDPOINT: &str = "default";

/// Store keys for one (identifier, endpoint).
#[derive(Debug, Clone, PartialEq, Eq)]
struct KeySet {
    composite: String,
    usage: String,
    retries: String,
}

impl KeySet {
    fn new(prefix: &str, identifier: &str, endpoint: &str) -> Self {
        let composite = format!("{}:{}", identifier, endpoint);
        Self {
            usage: format!("{}usage:{}", prefix, composite),
            retries: format!("{}retries:{}", prefix, composite),
            composite,
        }
    }
}

/// Adaptive admission control over a shared [`RecordStore`].
pub struct AdaptiveRateLimiter<S, T = NullSink> {
    store: S,
    config: DynamicConfig<LimiterConfig>,
    clock: Arc<dyn Clock>,
    sink: T,
}

impl<S, T> std::fmt::Debug for AdaptiveRateLimiter<S, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdaptiveRateLimiter")
            .field("config", &self.config.get())
            .field("clock", &self.clock)
            .field("store", &"<store>")
            .field("sink", &"<sink>")
            .finish()
    }
}

impl<S: RecordStore> AdaptiveRateLimiter<S, NullSink> {
    /// Build a limiter; fails with [`LimiterError::InvalidConfig`] on out-of-range values.
    ///
    /// The retry strategy name is not resolved here. An unknown name surfaces as
    /// [`LimiterError::InvalidStrategy`] on the first rejected check.
    pub fn new(store: S, config: LimiterConfig) -> Result<Self, LimiterError> {
        config.validate()?;
        Ok(Self {
            store,
            config: DynamicConfig::new(config),
            clock: Arc::new(SystemClock),
            sink: NullSink,
        })
    }

    /// Build a limiter from `patch` merged over the defaults.
    pub fn from_patch(store: S, patch: &ConfigPatch) -> Result<Self, LimiterError> {
        Self::new(store, LimiterConfig::default().merge(patch)?)
    }
}

impl<S, T> AdaptiveRateLimiter<S, T> {
    /// Replace the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Deliver decision events to `sink`.
    pub fn with_sink<U: TelemetrySink>(self, sink: U) -> AdaptiveRateLimiter<S, U> {
        AdaptiveRateLimiter { store: self.store, config: self.config, clock: self.clock, sink }
    }

    /// Borrow the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Snapshot of the current configuration.
    pub fn config(&self) -> Arc<LimiterConfig> {
        self.config.get()
    }

    /// Names accepted for `retry_strategy`.
    pub fn available_strategies(&self) -> Vec<&'static str> {
        StrategyFactory::available_strategies()
    }

    /// Strategy name to description at the configured base delay.
    pub fn strategy_descriptions(&self) -> BTreeMap<&'static str, String> {
        StrategyFactory::from_config(&self.config.get()).strategy_descriptions()
    }
}

impl<S, T> AdaptiveRateLimiter<S, T>
where
    S: RecordStore,
    T: TelemetrySink,
    T::Future: Send + 'static,
{
    /// Decide whether `identifier` may call `endpoint` now.
    pub async fn check(
        &self,
        identifier: &str,
        endpoint: &str,
        context: &RequestContext,
    ) -> Result<RateLimitResult, LimiterError> {
        let config = self.config.get();
        let now = self.clock.now_secs();
        let keys = KeySet::new(&config.isolation_prefix, identifier, endpoint);
        let history = PatternHistory::new(&self.store, &config.isolation_prefix);
        let base_limit = config.default_limit;
        let window = config.default_window;

        let usage = self.load_usage(&keys.usage, now, window).await?;

        let prior_patterns = if config.adaptive_throttling {
            Some(history.load(identifier, endpoint).await?)
        } else {
            None
        };
        let adaptive_limit = match &prior_patterns {
            Some(events) => PatternStats::from_events(events, now).limit_for(base_limit),
            None => base_limit,
        };

        let allowed = usage.count < adaptive_limit;
        let mut retry_after = 0;

        if allowed {
            self.store
                .set_with_ttl(&keys.usage, usage.incremented().encode(), window)
                .await
                .map_err(LimiterError::store)?;
            if config.learning_enabled {
                history.record(identifier, endpoint, context, now).await?;
            }
            self.store.delete(&keys.retries).await.map_err(LimiterError::store)?;
        } else {
            let attempts = self.load_retry_count(&keys.retries).await?.saturating_add(1);
            self.store
                .set_with_ttl(&keys.retries, encode_retry_count(attempts), window)
                .await
                .map_err(LimiterError::store)?;

            let strategy =
                StrategyFactory::from_config(&config).create(&config.retry_strategy)?;
            let loaded: Vec<PatternEvent>;
            let patterns: &[PatternEvent] = if !strategy.needs_history() {
                &[]
            } else if let Some(events) = &prior_patterns {
                events
            } else {
                loaded = history.load(identifier, endpoint).await?;
                &loaded
            };
            let ctx = DelayContext { key: &keys.composite, patterns };
            let attempts_u32 = u32::try_from(attempts).unwrap_or(u32::MAX);
            retry_after = strategy.calculate_delay(attempts_u32, &usage, adaptive_limit, &ctx);

            emit_best_effort(
                self.sink.clone(),
                LimiterEvent::Rejected {
                    key: keys.composite.clone(),
                    limit: adaptive_limit,
                    attempts,
                    retry_after,
                },
            )
            .await;
        }

        let current_usage = if allowed { usage.count.saturating_add(1) } else { usage.count };
        let remaining = signed(adaptive_limit) - signed(current_usage);

        // Only an admission with learning enabled changes the history read above.
        let pattern_stats = match prior_patterns {
            Some(events) if !(allowed && config.learning_enabled) => {
                PatternStats::from_events(&events, now)
            }
            _ => PatternStats::from_events(&history.load(identifier, endpoint).await?, now),
        };

        tracing::debug!(
            key = %keys.composite,
            allowed,
            remaining,
            limit = adaptive_limit,
            retry_after,
            "rate limit decision"
        );

        if allowed {
            emit_best_effort(
                self.sink.clone(),
                LimiterEvent::Admitted {
                    key: keys.composite.clone(),
                    limit: adaptive_limit,
                    remaining,
                },
            )
            .await;
        }

        Ok(RateLimitResult::new(
            allowed,
            remaining,
            retry_after,
            usage.reset_at,
            now,
            UsageStats::new(current_usage, pattern_stats, base_limit, adaptive_limit),
        ))
    }

    /// [`check`](Self::check) against the `"default"` endpoint with an empty context.
    pub async fn check_default(&self, identifier: &str) -> Result<RateLimitResult, LimiterError> {
        self.check(identifier, DEFAULT_ENDPOINT, &RequestContext::new()).await
    }

    /// Clear the usage window and retry counter of a key. Pattern history is kept.
    pub async fn reset(&self, identifier: &str, endpoint: &str) -> Result<(), LimiterError> {
        let config = self.config.get();
        let keys = KeySet::new(&config.isolation_prefix, identifier, endpoint);
        self.store.delete(&keys.usage).await.map_err(LimiterError::store)?;
        self.store.delete(&keys.retries).await.map_err(LimiterError::store)?;
        tracing::info!(key = %keys.composite, "rate limit reset");
        emit_best_effort(self.sink.clone(), LimiterEvent::Reset { key: keys.composite }).await;
        Ok(())
    }

    /// Merge `patch` over the current configuration.
    ///
    /// A patch that would produce an invalid configuration is rejected and the previous
    /// configuration stays in effect.
    pub async fn update_config(
        &self,
        patch: &ConfigPatch,
    ) -> Result<Arc<LimiterConfig>, LimiterError> {
        let updated = self.config.try_update(|current| current.merge(patch)).map_err(|err| {
            tracing::warn!(error = %err, "rejected configuration update");
            err
        })?;
        tracing::info!(config = ?updated, "configuration updated");
        emit_best_effort(self.sink.clone(), LimiterEvent::ConfigUpdated).await;
        Ok(updated)
    }

    async fn load_usage(
        &self,
        key: &str,
        now: u64,
        window: u64,
    ) -> Result<UsageRecord, LimiterError> {
        let raw = self.store.get(key).await.map_err(LimiterError::store)?;
        Ok(match raw {
            None => UsageRecord::fresh(now, window),
            Some(bytes) => UsageRecord::decode(&bytes).unwrap_or_else(|| {
                tracing::warn!(key = %key, "malformed usage record, starting a fresh window");
                UsageRecord::fresh(now, window)
            }),
        })
    }

    async fn load_retry_count(&self, key: &str) -> Result<u64, LimiterError> {
        let raw = self.store.get(key).await.map_err(LimiterError::store)?;
        Ok(match raw {
            None => 0,
            Some(bytes) => decode_retry_count(&bytes).unwrap_or_else(|| {
                tracing::warn!(key = %key, "malformed retry counter, treating as zero");
                0
            }),
        })
    }
}

fn signed(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
