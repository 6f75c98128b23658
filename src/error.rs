//! Error types for the decision engine and its record store.
use thiserror::Error;

/// Boxed error produced by a record store backend.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors surfaced by [`AdaptiveRateLimiter`](crate::AdaptiveRateLimiter).
///
/// Malformed persisted records are not represented here: they are recovered by treating the
/// record as absent and never reach the caller.
#[derive(Debug, Error)]
pub enum LimiterError {
    /// The configured retry strategy name is not one of the known strategies.
    #[error("unknown retry strategy: {name}")]
    InvalidStrategy { name: String },
    /// The record store failed or did not answer in time.
    #[error("record store unavailable: {0}")]
    StoreUnavailable(#[source] BoxError),
    /// A configuration value is outside its documented range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl LimiterError {
    /// Wrap any store error as [`LimiterError::StoreUnavailable`].
    pub fn store<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        LimiterError::StoreUnavailable(Box::new(err))
    }

    /// Check if this error came from the record store.
    pub fn is_store_unavailable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }

    /// Check if this error is an unknown strategy name.
    pub fn is_invalid_strategy(&self) -> bool {
        matches!(self, Self::InvalidStrategy { .. })
    }

    /// Check if this error is a rejected configuration.
    pub fn is_invalid_config(&self) -> bool {
        matches!(self, Self::InvalidConfig(_))
    }
}

/// Errors raised by the bundled store implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The operation did not complete within the configured deadline.
    #[error("store operation `{op}` timed out after {timeout:?}")]
    Timeout { op: &'static str, timeout: std::time::Duration },
    /// A lock guarding in-memory state was poisoned by a panicking writer.
    #[error("store state poisoned")]
    Poisoned,
    /// Backend-specific failure.
    #[error("store backend: {0}")]
    Backend(#[source] BoxError),
}
