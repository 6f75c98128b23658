//! Tower middleware that puts an [`AdaptiveRateLimiter`] in front of a service.
//!
//! Each request is mapped to a [`RequestKey`] by a caller-supplied extractor. Admitted
//! requests reach the inner service; rejected ones fail with [`ThrottleError::Limited`]
//! carrying the full decision so callers can render headers from it.
//!
//! ```rust
//! use std::sync::Arc;
//! use surgeguard::middleware::{RateLimitLayer, RequestKey};
//! use surgeguard::{AdaptiveRateLimiter, ConfigPatch, InMemoryRecordStore};
//! use tower::{service_fn, Layer, ServiceExt};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let patch = ConfigPatch::default().default_limit(10).default_window(60);
//! let limiter = AdaptiveRateLimiter::from_patch(InMemoryRecordStore::new(), &patch).unwrap();
//! let layer =
//!     RateLimitLayer::new(Arc::new(limiter), |user: &String| RequestKey::new(user.clone()));
//! let svc = layer.layer(service_fn(|user: String| async move {
//!     Ok::<_, std::io::Error>(format!("hello {user}"))
//! }));
//!
//! let reply = svc.oneshot("alice".to_string()).await.unwrap();
//! assert_eq!(reply, "hello alice");
//! # });
//! ```

use crate::error::LimiterError;
use crate::limiter::{AdaptiveRateLimiter, DEFAULT_ENDPOINT};
use crate::pattern::RequestContext;
use crate::result::RateLimitResult;
use crate::store::RecordStore;
use crate::telemetry::TelemetrySink;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use thiserror::Error;
use tower_layer::Layer;
use tower_service::Service;

/// What a request is counted against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestKey {
    pub identifier: String,
    pub endpoint: String,
    pub context: RequestContext,
}

impl RequestKey {
    /// Key on the default endpoint with no context.
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            context: RequestContext::new(),
        }
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Attach one context attribute, recorded with the pattern event.
    pub fn context(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(name.into(), value.into());
        self
    }
}

/// Errors returned by [`RateLimitService`].
#[derive(Debug, Error)]
pub enum ThrottleError<E> {
    /// The request was rejected; the decision says when to retry.
    #[error("rate limited, retry after {}s", .0.retry_after())]
    Limited(Box<RateLimitResult>),
    /// The limiter itself failed (store down, unknown strategy).
    #[error(transparent)]
    Limiter(LimiterError),
    /// The wrapped service failed.
    #[error("inner service error: {0}")]
    Inner(#[source] E),
}

impl<E> ThrottleError<E> {
    pub fn is_limited(&self) -> bool {
        matches!(self, ThrottleError::Limited(_))
    }

    /// The rejection decision, if this error is one.
    pub fn decision(&self) -> Option<&RateLimitResult> {
        match self {
            ThrottleError::Limited(result) => Some(result),
            _ => None,
        }
    }
}

/// A layer that enforces adaptive rate limits using an [`AdaptiveRateLimiter`].
pub struct RateLimitLayer<St, T, F> {
    limiter: Arc<AdaptiveRateLimiter<St, T>>,
    extract: Arc<F>,
}

impl<St, T, F> Clone for RateLimitLayer<St, T, F> {
    fn clone(&self) -> Self {
        Self { limiter: self.limiter.clone(), extract: self.extract.clone() }
    }
}

impl<St, T, F> RateLimitLayer<St, T, F> {
    /// Create a layer sharing `limiter`, keying requests with `extract`.
    pub fn new(limiter: Arc<AdaptiveRateLimiter<St, T>>, extract: F) -> Self {
        Self { limiter, extract: Arc::new(extract) }
    }
}

impl<S, St, T, F> Layer<S> for RateLimitLayer<St, T, F> {
    type Service = RateLimitService<S, St, T, F>;

    fn layer(&self, service: S) -> Self::Service {
        RateLimitService {
            inner: service,
            limiter: self.limiter.clone(),
            extract: self.extract.clone(),
        }
    }
}

/// Middleware service that enforces adaptive rate limits.
pub struct RateLimitService<S, St, T, F> {
    inner: S,
    limiter: Arc<AdaptiveRateLimiter<St, T>>,
    extract: Arc<F>,
}

impl<S: Clone, St, T, F> Clone for RateLimitService<S, St, T, F> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            limiter: self.limiter.clone(),
            extract: self.extract.clone(),
        }
    }
}

impl<S, St, T, F, Req> Service<Req> for RateLimitService<S, St, T, F>
where
    S: Service<Req> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    St: RecordStore + 'static,
    T: TelemetrySink + Sync,
    T::Future: Send + 'static,
    F: Fn(&Req) -> RequestKey + Send + Sync + 'static,
    Req: Send + 'static,
{
    type Response = S::Response;
    type Error = ThrottleError<S::Error>;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(ThrottleError::Inner)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let limiter = self.limiter.clone();
        let key = (self.extract)(&req);
        // Drive the instance that was polled ready; leave a fresh clone in its place.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let decision = limiter
                .check(&key.identifier, &key.endpoint, &key.context)
                .await
                .map_err(ThrottleError::Limiter)?;
            if !decision.is_allowed() {
                return Err(ThrottleError::Limited(Box::new(decision)));
            }
            inner.call(req).await.map_err(ThrottleError::Inner)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::ConfigPatch;
    use crate::store::InMemoryRecordStore;
    use tower::{service_fn, ServiceExt};

    fn limiter(limit: u64) -> Arc<AdaptiveRateLimiter<InMemoryRecordStore>> {
        let clock = Arc::new(ManualClock::new(1_700_000_000));
        let store = InMemoryRecordStore::with_clock(clock.clone());
        let patch = ConfigPatch::default().default_limit(limit).default_window(60);
        Arc::new(AdaptiveRateLimiter::from_patch(store, &patch).unwrap().with_clock(clock))
    }

    async fn echo((user, path): (String, String)) -> Result<String, std::io::Error> {
        Ok(format!("{user}@{path}"))
    }

    fn by_user_and_path(req: &(String, String)) -> RequestKey {
        RequestKey::new(req.0.clone()).endpoint(req.1.clone()).context("path", req.1.clone())
    }

    fn req(user: &str, path: &str) -> (String, String) {
        (user.to_string(), path.to_string())
    }

    #[tokio::test]
    async fn admits_until_limit_then_rejects() {
        let limiter = limiter(10);
        let svc = RateLimitLayer::new(limiter.clone(), by_user_and_path).layer(service_fn(echo));

        for _ in 0..10 {
            let out = svc.clone().oneshot(req("u1", "/chat")).await.unwrap();
            assert_eq!(out, "u1@/chat");
        }
        let err = svc.clone().oneshot(req("u1", "/chat")).await.unwrap_err();
        assert!(err.is_limited());
        let decision = err.decision().unwrap();
        assert_eq!(decision.remaining(), 0);
        assert!(decision.retry_after() > 0);
        assert!(err.to_string().starts_with("rate limited, retry after"));

        // A different endpoint has its own window.
        assert!(svc.oneshot(req("u1", "/embed")).await.is_ok());
    }

    #[tokio::test]
    async fn limiter_failure_is_reported() {
        let limiter = limiter(10);
        limiter.update_config(&ConfigPatch::default().retry_strategy("foo")).await.unwrap();
        let svc = RateLimitLayer::new(limiter, by_user_and_path).layer(service_fn(echo));

        for _ in 0..10 {
            svc.clone().oneshot(req("u1", "/chat")).await.unwrap();
        }
        let err = svc.oneshot(req("u1", "/chat")).await.unwrap_err();
        match err {
            ThrottleError::Limiter(inner) => assert!(inner.is_invalid_strategy()),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn inner_errors_pass_through() {
        let svc = RateLimitLayer::new(limiter(10), |_: &u8| RequestKey::new("u1")).layer(
            service_fn(|_: u8| async {
                Err::<(), _>(std::io::Error::new(std::io::ErrorKind::Other, "boom"))
            }),
        );
        let err = svc.oneshot(1).await.unwrap_err();
        assert!(matches!(err, ThrottleError::Inner(_)));
        assert_eq!(err.to_string(), "inner service error: boom");
    }
}
