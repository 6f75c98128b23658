//! Convenient re-exports for common surgeguard types.
pub use crate::{
    clock::{Clock, ManualClock, SystemClock},
    config::{ConfigPatch, LimiterConfig},
    error::LimiterError,
    limiter::AdaptiveRateLimiter,
    middleware::{RateLimitLayer, RequestKey, ThrottleError},
    pattern::RequestContext,
    result::RateLimitResult,
    store::{InMemoryRecordStore, RecordStore, TimeoutStore},
    strategy::{RetryStrategy, StrategyFactory},
    telemetry::{LogSink, MemorySink, NullSink},
};
