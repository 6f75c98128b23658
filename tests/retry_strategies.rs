mod common;

use common::limiter_with;
use surgeguard::{AdaptiveRateLimiter, ConfigPatch, InMemoryRecordStore, LimiterError};

fn patch(strategy: &str) -> ConfigPatch {
    ConfigPatch::default().default_limit(10).default_window(60).retry_strategy(strategy)
}

async fn exhaust(limiter: &AdaptiveRateLimiter<InMemoryRecordStore>, id: &str) {
    for _ in 0..10 {
        assert!(limiter.check_default(id).await.unwrap().is_allowed());
    }
}

async fn rejected_delays(strategy: &str, rejections: usize) -> Vec<u64> {
    let (limiter, _clock) = limiter_with(patch(strategy));
    exhaust(&limiter, "u1").await;
    let mut delays = Vec::with_capacity(rejections);
    for _ in 0..rejections {
        let r = limiter.check_default("u1").await.unwrap();
        assert!(!r.is_allowed());
        delays.push(r.retry_after());
    }
    delays
}

#[tokio::test]
async fn unknown_strategy_fails_on_first_rejection_only() {
    let (limiter, _clock) = limiter_with(patch("foo"));
    exhaust(&limiter, "u1").await;

    let err = limiter.check_default("u1").await.unwrap_err();
    assert!(matches!(err, LimiterError::InvalidStrategy { ref name } if name == "foo"));

    limiter.update_config(&ConfigPatch::default().retry_strategy("fixed")).await.unwrap();
    let r = limiter.check_default("u1").await.unwrap();
    assert!(!r.is_allowed());
    assert_eq!(r.retry_after(), 60);
}

#[tokio::test]
async fn consecutive_rejections_follow_each_schedule() {
    assert_eq!(rejected_delays("fixed", 3).await, vec![60, 60, 60]);
    assert_eq!(rejected_delays("linear", 3).await, vec![120, 180, 240]);
    assert_eq!(rejected_delays("exponential", 3).await, vec![120, 240, 480]);
}

#[tokio::test]
async fn jitter_stays_within_its_band() {
    let delays = rejected_delays("jitter", 4).await;
    for (i, delay) in delays.into_iter().enumerate() {
        let exp = 60u64 << (i + 1);
        assert!(delay >= exp, "attempt {}: {delay} < {exp}", i + 1);
        assert!(delay as f64 <= exp as f64 * 1.1, "attempt {}: {delay} too large", i + 1);
    }
}

#[tokio::test]
async fn adaptive_delay_scales_with_pattern_history() {
    // Ten admissions at one instant collapse into a single event of frequency 1, so the
    // multiplier bottoms out at 0.5 and usage equals the limit.
    assert_eq!(rejected_delays("adaptive", 2).await, vec![30, 30]);
}

#[tokio::test]
async fn catalog_reflects_configured_base_delay() {
    let (limiter, _clock) = limiter_with(ConfigPatch::default().base_delay(30));
    assert_eq!(
        limiter.available_strategies(),
        vec!["exponential", "linear", "fixed", "jitter", "adaptive"]
    );
    let descriptions = limiter.strategy_descriptions();
    assert_eq!(descriptions["fixed"], "Fixed delay (always 30s)");
    assert_eq!(descriptions["adaptive"], "Adaptive based on usage patterns");
    assert_eq!(descriptions.len(), 5);
}
