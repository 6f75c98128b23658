#![forbid(unsafe_code)]
#![deny(warnings)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # surgeguard
//!
//! Adaptive rate limiting for AI APIs: per-caller, per-endpoint admission control whose
//! ceiling follows each caller's observed usage, with pluggable retry-delay strategies for
//! rejected requests.
//!
//! ## Features
//!
//! - **Fixed windows** per `(identifier, endpoint)` kept in a shared [`RecordStore`]
//! - **Adaptive limits** derived from a rolling hour of usage pattern events
//! - **Retry strategies**: fixed, linear, exponential, jitter, adaptive
//! - **Live configuration** via [`ConfigPatch`] merges, validated before they apply
//! - **Tower middleware** in [`middleware`] and **telemetry sinks** in [`telemetry`]
//!
//! ## Quick Start
//!
//! ```rust
//! use surgeguard::{AdaptiveRateLimiter, ConfigPatch, InMemoryRecordStore, RequestContext};
//!
//! #[tokio::main]
//! async fn main() {
//!     let limiter = AdaptiveRateLimiter::from_patch(
//!         InMemoryRecordStore::new(),
//!         &ConfigPatch::default().default_limit(100).retry_strategy("jitter"),
//!     )
//!     .unwrap();
//!
//!     let mut context = RequestContext::new();
//!     context.insert("model".into(), "large".into());
//!
//!     let result = limiter.check("user_123", "chat", &context).await.unwrap();
//!     if result.is_allowed() {
//!         // forward the request
//!     } else {
//!         for (name, value) in result.headers() {
//!             println!("{name}: {value}");
//!         }
//!     }
//! }
//! ```

pub mod adaptive;
pub mod clock;
pub mod config;
pub mod dynamic;
pub mod error;
pub mod limiter;
pub mod middleware;
pub mod pattern;
pub mod prelude;
pub mod result;
pub mod store;
pub mod strategy;
pub mod telemetry;
pub mod usage;

// Re-exports
pub use adaptive::PatternStats;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigPatch, LimiterConfig};
pub use dynamic::DynamicConfig;
pub use error::{BoxError, LimiterError, StoreError};
pub use limiter::{AdaptiveRateLimiter, DEFAULT_ENDPOINT};
pub use middleware::{RateLimitLayer, RateLimitService, RequestKey, ThrottleError};
pub use pattern::{PatternEvent, RequestContext};
pub use result::{RateLimitResult, UsageStats};
pub use store::{InMemoryRecordStore, RecordStore, TimeoutStore};
pub use strategy::{RetryStrategy, StrategyFactory, StrategyKind};
pub use telemetry::{LimiterEvent, LogSink, MemorySink, NullSink, TelemetrySink};
pub use usage::UsageRecord;
