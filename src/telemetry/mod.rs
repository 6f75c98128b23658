//! Telemetry for limiter decisions.
//!
//! The limiter emits a [`LimiterEvent`] for every decision, reset, and configuration change.
//! Events flow through `TelemetrySink` implementations which can log, buffer, or forward
//! them to external systems.
//!
//! # Telemetry Sinks
//!
//! The `TelemetrySink` trait is a `tower::Service<LimiterEvent>` so sinks compose with the
//! rest of a tower stack. Emission is best-effort: a failing sink never changes a decision.
//!
//! ```rust
//! use surgeguard::telemetry::LimiterEvent;
//!
//! let rejected = LimiterEvent::Rejected {
//!     key: "user_123:api/v1/test".into(),
//!     limit: 10,
//!     attempts: 2,
//!     retry_after: 240,
//! };
//! assert_eq!(
//!     rejected.to_string(),
//!     "Rejected(user_123:api/v1/test, limit=10, attempt=2, retry_after=240s)"
//! );
//! ```

pub mod events;
pub mod sinks;

pub use events::{event_to_json, LimiterEvent};
pub use sinks::{emit_best_effort, LogSink, MemorySink, NullSink, TelemetrySink};
