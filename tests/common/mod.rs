//! Shared fixtures for integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::Arc;
use surgeguard::{AdaptiveRateLimiter, ConfigPatch, InMemoryRecordStore, ManualClock, RecordStore};

/// 2023-11-14T22:13:20Z
pub const T0: u64 = 1_700_000_000;

/// Limiter over an in-memory store, both driven by the returned clock.
pub fn limiter_with(patch: ConfigPatch) -> (AdaptiveRateLimiter<InMemoryRecordStore>, ManualClock) {
    let clock = ManualClock::new(T0);
    let store = InMemoryRecordStore::with_clock(Arc::new(clock.clone()));
    let limiter = AdaptiveRateLimiter::from_patch(store, &patch)
        .expect("valid config")
        .with_clock(Arc::new(clock.clone()));
    (limiter, clock)
}

/// `default_limit = 10`, `default_window = 60`.
pub fn small_limiter() -> (AdaptiveRateLimiter<InMemoryRecordStore>, ManualClock) {
    limiter_with(ConfigPatch::default().default_limit(10).default_window(60))
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Store whose every operation fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnreachableStore;

fn refused() -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "connection refused")
}

#[async_trait]
impl RecordStore for UnreachableStore {
    type Error = std::io::Error;

    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, Self::Error> {
        Err(refused())
    }
    async fn set_with_ttl(&self, _: &str, _: Vec<u8>, _: u64) -> Result<(), Self::Error> {
        Err(refused())
    }
    async fn delete(&self, _: &str) -> Result<(), Self::Error> {
        Err(refused())
    }
    async fn append(&self, _: &str, _: u64, _: Vec<u8>) -> Result<(), Self::Error> {
        Err(refused())
    }
    async fn range_all(&self, _: &str) -> Result<Vec<Vec<u8>>, Self::Error> {
        Err(refused())
    }
    async fn remove_score_range(&self, _: &str, _: u64, _: u64) -> Result<(), Self::Error> {
        Err(refused())
    }
}

/// Store that never answers.
#[derive(Debug, Clone, Copy, Default)]
pub struct HangingStore;

#[async_trait]
impl RecordStore for HangingStore {
    type Error = std::io::Error;

    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, Self::Error> {
        futures::future::pending().await
    }
    async fn set_with_ttl(&self, _: &str, _: Vec<u8>, _: u64) -> Result<(), Self::Error> {
        futures::future::pending().await
    }
    async fn delete(&self, _: &str) -> Result<(), Self::Error> {
        futures::future::pending().await
    }
    async fn append(&self, _: &str, _: u64, _: Vec<u8>) -> Result<(), Self::Error> {
        futures::future::pending().await
    }
    async fn range_all(&self, _: &str) -> Result<Vec<Vec<u8>>, Self::Error> {
        futures::future::pending().await
    }
    async fn remove_score_range(&self, _: &str, _: u64, _: u64) -> Result<(), Self::Error> {
        futures::future::pending().await
    }
}
