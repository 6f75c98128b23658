//! Retry-delay strategies recommended to rejected callers.
//!
//! Every strategy maps `(attempts, usage, limit, context)` to a delay in whole seconds.
//! `attempts` is the number of consecutive rejections for the key, so the first rejection
//! after an admission is attempt `1`.
//!
//! | name          | delay                                                      |
//! |---------------|------------------------------------------------------------|
//! | `fixed`       | `base`                                                     |
//! | `linear`      | `base * (1 + attempts)`                                    |
//! | `exponential` | `base * 2^attempts`                                        |
//! | `jitter`      | `exponential + uniform(0..=exponential * jitter_factor)`   |
//! | `adaptive`    | `base * count / limit * pattern_multiplier`                |
//!
//! Arithmetic saturates at `u64::MAX` instead of overflowing. Only `adaptive` looks at the
//! key's pattern history, which the caller passes in through [`DelayContext`].
//!
//! ```rust
//! use surgeguard::strategy::{DelayContext, StrategyFactory};
//! use surgeguard::UsageRecord;
//!
//! let factory = StrategyFactory::new(60, 0.1);
//! let exp = factory.create("exponential").unwrap();
//! let usage = UsageRecord { count: 10, reset_at: 0 };
//! let ctx = DelayContext::default();
//! assert_eq!(exp.calculate_delay(0, &usage, 10, &ctx), 60);
//! assert_eq!(exp.calculate_delay(3, &usage, 10, &ctx), 480);
//! assert!(factory.create("foo").is_err());
//! ```

use crate::config::LimiterConfig;
use crate::error::LimiterError;
use crate::pattern::PatternEvent;
use crate::usage::UsageRecord;
use rand::{rng, Rng};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Inputs beyond the usage record that a strategy may consult.
#[derive(Debug, Clone, Copy, Default)]
pub struct DelayContext<'a> {
    /// Composite `identifier:endpoint` key being throttled.
    pub key: &'a str,
    /// Pattern history of the key, oldest first.
    pub patterns: &'a [PatternEvent],
}

/// Strategy names, in catalog order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    Exponential,
    Linear,
    Fixed,
    Jitter,
    Adaptive,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 5] = [
        StrategyKind::Exponential,
        StrategyKind::Linear,
        StrategyKind::Fixed,
        StrategyKind::Jitter,
        StrategyKind::Adaptive,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StrategyKind::Exponential => "exponential",
            StrategyKind::Linear => "linear",
            StrategyKind::Fixed => "fixed",
            StrategyKind::Jitter => "jitter",
            StrategyKind::Adaptive => "adaptive",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = LimiterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StrategyKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| LimiterError::InvalidStrategy { name: s.to_string() })
    }
}

fn exponential(base: u64, attempts: u32) -> u64 {
    base.saturating_mul(2u64.saturating_pow(attempts))
}

/// Adaptive multiplier: average event frequency over ten, clamped to `[0.5, 2.0]`.
/// `1.0` without history.
pub fn pattern_multiplier(patterns: &[PatternEvent]) -> f64 {
    match crate::adaptive::average_frequency(patterns) {
        Some(avg) => (avg / 10.0).clamp(0.5, 2.0),
        None => 1.0,
    }
}

/// A resolved retry-delay strategy.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryStrategy {
    Fixed { base_delay: u64 },
    Linear { base_delay: u64 },
    Exponential { base_delay: u64 },
    Jitter { base_delay: u64, jitter_factor: f64 },
    Adaptive { base_delay: u64 },
}

impl RetryStrategy {
    pub fn kind(&self) -> StrategyKind {
        match self {
            RetryStrategy::Fixed { .. } => StrategyKind::Fixed,
            RetryStrategy::Linear { .. } => StrategyKind::Linear,
            RetryStrategy::Exponential { .. } => StrategyKind::Exponential,
            RetryStrategy::Jitter { .. } => StrategyKind::Jitter,
            RetryStrategy::Adaptive { .. } => StrategyKind::Adaptive,
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind().as_str()
    }

    /// Whether [`DelayContext::patterns`] influences the delay.
    pub fn needs_history(&self) -> bool {
        matches!(self, RetryStrategy::Adaptive { .. })
    }

    /// Human-readable summary with the first few delays spelled out.
    pub fn description(&self) -> String {
        match *self {
            RetryStrategy::Fixed { base_delay } => format!("Fixed delay (always {base_delay}s)"),
            RetryStrategy::Linear { base_delay } => {
                let d = |n: u64| base_delay.saturating_mul(n);
                format!("Linear increase ({}s, {}s, {}s, {}s...)", d(1), d(2), d(3), d(4))
            }
            RetryStrategy::Exponential { base_delay } => {
                let d = |n: u32| exponential(base_delay, n);
                format!("Exponential backoff ({}s, {}s, {}s, {}s...)", d(0), d(1), d(2), d(3))
            }
            RetryStrategy::Jitter { base_delay, jitter_factor } => {
                let span = |n: u32| {
                    let exp = exponential(base_delay, n);
                    format!("{}-{}s", exp, exp.saturating_add((exp as f64 * jitter_factor) as u64))
                };
                format!("Exponential with jitter ({}, {}, {}...)", span(0), span(1), span(2))
            }
            RetryStrategy::Adaptive { .. } => "Adaptive based on usage patterns".to_string(),
        }
    }

    /// Delay in seconds using the thread-local RNG for jitter.
    pub fn calculate_delay(
        &self,
        attempts: u32,
        usage: &UsageRecord,
        limit: u64,
        context: &DelayContext<'_>,
    ) -> u64 {
        let mut rng = rng();
        self.calculate_delay_with_rng(attempts, usage, limit, context, &mut rng)
    }

    /// Delay in seconds with a caller-supplied RNG (for testing).
    pub fn calculate_delay_with_rng<R: Rng>(
        &self,
        attempts: u32,
        usage: &UsageRecord,
        limit: u64,
        context: &DelayContext<'_>,
        rng: &mut R,
    ) -> u64 {
        match *self {
            RetryStrategy::Fixed { base_delay } => base_delay,
            RetryStrategy::Linear { base_delay } => {
                base_delay.saturating_mul(u64::from(attempts).saturating_add(1))
            }
            RetryStrategy::Exponential { base_delay } => exponential(base_delay, attempts),
            RetryStrategy::Jitter { base_delay, jitter_factor } => {
                let exp = exponential(base_delay, attempts);
                let spread = (exp as f64 * jitter_factor) as u64;
                if spread == 0 {
                    return exp;
                }
                exp.saturating_add(rng.random_range(0..=spread))
            }
            RetryStrategy::Adaptive { base_delay } => {
                let usage_ratio = usage.count as f64 / limit.max(1) as f64;
                let multiplier = pattern_multiplier(context.patterns);
                (base_delay as f64 * usage_ratio * multiplier) as u64
            }
        }
    }
}

/// Resolves strategy names to [`RetryStrategy`] values sharing one base delay.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrategyFactory {
    base_delay: u64,
    jitter_factor: f64,
}

impl StrategyFactory {
    pub fn new(base_delay: u64, jitter_factor: f64) -> Self {
        Self { base_delay, jitter_factor }
    }

    pub fn from_config(config: &LimiterConfig) -> Self {
        Self::new(config.base_delay, config.jitter_factor)
    }

    /// Build the strategy called `name`; unknown names fail with
    /// [`LimiterError::InvalidStrategy`].
    pub fn create(&self, name: &str) -> Result<RetryStrategy, LimiterError> {
        Ok(self.create_kind(name.parse()?))
    }

    pub fn create_kind(&self, kind: StrategyKind) -> RetryStrategy {
        let base_delay = self.base_delay;
        match kind {
            StrategyKind::Exponential => RetryStrategy::Exponential { base_delay },
            StrategyKind::Linear => RetryStrategy::Linear { base_delay },
            StrategyKind::Fixed => RetryStrategy::Fixed { base_delay },
            StrategyKind::Jitter => {
                RetryStrategy::Jitter { base_delay, jitter_factor: self.jitter_factor }
            }
            StrategyKind::Adaptive => RetryStrategy::Adaptive { base_delay },
        }
    }

    /// Names accepted by [`StrategyFactory::create`].
    pub fn available_strategies() -> Vec<&'static str> {
        StrategyKind::ALL.iter().map(|k| k.as_str()).collect()
    }

    /// Name to description for every strategy at this factory's base delay.
    pub fn strategy_descriptions(&self) -> BTreeMap<&'static str, String> {
        StrategyKind::ALL
            .into_iter()
            .map(|kind| (kind.as_str(), self.create_kind(kind).description()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::RequestContext;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const USAGE: UsageRecord = UsageRecord { count: 10, reset_at: 0 };

    fn factory() -> StrategyFactory {
        StrategyFactory::new(60, 0.1)
    }

    fn delay(name: &str, attempts: u32) -> u64 {
        let strategy = factory().create(name).unwrap();
        strategy.calculate_delay(attempts, &USAGE, 10, &DelayContext::default())
    }

    #[test]
    fn fixed_ignores_attempts() {
        for attempts in 0..6 {
            assert_eq!(delay("fixed", attempts), 60);
        }
    }

    #[test]
    fn linear_grows_by_one_base_per_attempt() {
        assert_eq!(delay("linear", 0), 60);
        assert_eq!(delay("linear", 1), 120);
        assert_eq!(delay("linear", 3), 240);
    }

    #[test]
    fn exponential_doubles_each_attempt() {
        for k in 0..=5u32 {
            assert_eq!(delay("exponential", k), 60 * 2u64.pow(k));
        }
    }

    #[test]
    fn exponential_saturates() {
        assert_eq!(delay("exponential", 200), u64::MAX);
        assert_eq!(delay("jitter", 200), u64::MAX);
    }

    #[test]
    fn jitter_stays_within_ten_percent() {
        let strategy = factory().create("jitter").unwrap();
        let mut rng = StdRng::seed_from_u64(42);
        for k in 0..=5u32 {
            let exp = 60 * 2u64.pow(k);
            for _ in 0..50 {
                let d = strategy.calculate_delay_with_rng(
                    k,
                    &USAGE,
                    10,
                    &DelayContext::default(),
                    &mut rng,
                );
                assert!(d >= exp, "{d} < {exp}");
                assert!(d as f64 <= exp as f64 * 1.1, "{d} > {exp} * 1.1");
            }
        }
    }

    #[test]
    fn zero_jitter_factor_is_plain_exponential() {
        let strategy = StrategyFactory::new(60, 0.0).create("jitter").unwrap();
        assert_eq!(strategy.calculate_delay(2, &USAGE, 10, &DelayContext::default()), 240);
    }

    #[test]
    fn adaptive_without_history_uses_usage_ratio() {
        let strategy = factory().create("adaptive").unwrap();
        let usage = UsageRecord { count: 15, reset_at: 0 };
        assert_eq!(strategy.calculate_delay(1, &usage, 10, &DelayContext::default()), 90);
    }

    #[test]
    fn adaptive_multiplier_is_clamped() {
        let light: Vec<_> =
            (0..3).map(|t| PatternEvent::observed(t, RequestContext::new())).collect();
        assert_eq!(pattern_multiplier(&light), 0.5);
        let heavy: Vec<_> =
            light.iter().cloned().map(|e| PatternEvent { frequency: 40, ..e }).collect();
        assert_eq!(pattern_multiplier(&heavy), 2.0);
        assert_eq!(pattern_multiplier(&[]), 1.0);

        let strategy = factory().create("adaptive").unwrap();
        let ctx = DelayContext { key: "u:e", patterns: &light };
        assert_eq!(strategy.calculate_delay(1, &USAGE, 10, &ctx), 30);
        assert!(strategy.needs_history());
    }

    #[test]
    fn unknown_name_is_rejected_at_creation() {
        let err = factory().create("foo").unwrap_err();
        assert!(matches!(err, LimiterError::InvalidStrategy { ref name } if name == "foo"));
    }

    #[test]
    fn catalog_lists_every_strategy_with_description() {
        let names = StrategyFactory::available_strategies();
        assert_eq!(names, vec!["exponential", "linear", "fixed", "jitter", "adaptive"]);
        let descriptions = factory().strategy_descriptions();
        assert_eq!(descriptions.len(), 5);
        assert_eq!(descriptions["fixed"], "Fixed delay (always 60s)");
        assert_eq!(descriptions["exponential"], "Exponential backoff (60s, 120s, 240s, 480s...)");
        assert_eq!(descriptions["linear"], "Linear increase (60s, 120s, 180s, 240s...)");
        assert_eq!(
            descriptions["jitter"],
            "Exponential with jitter (60-66s, 120-132s, 240-264s...)"
        );
        for name in names {
            assert_eq!(factory().create(name).unwrap().name(), name);
        }
    }
}
