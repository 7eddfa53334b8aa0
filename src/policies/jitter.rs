//! # Jitter for restart delays.
//!
//! Services that fail together (e.g. when a shared device disappears) would
//! otherwise restart in lockstep. [`JitterPolicy`] spreads those restarts.
//!
//! - [`JitterPolicy::None`] exact delay
//! - [`JitterPolicy::Full`] uniform in `[0, delay]`
//! - [`JitterPolicy::Equal`] `delay/2` plus uniform in `[0, delay/2]`
//! - [`JitterPolicy::Decorrelated`] uniform in `[first, prev × 3]`, capped

use std::time::Duration;

use rand::Rng;
use serde::Deserialize;

/// Randomization applied to each restart delay.
///
/// Configured as a lowercase string: `jitter = "equal"`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterPolicy {
    /// Use the computed delay unchanged.
    #[default]
    None,
    /// Uniform in `[0, delay]`.
    Full,
    /// Half the delay plus uniform in `[0, delay/2]`.
    Equal,
    /// Uniform in `[first, prev × 3]`, capped at `max`.
    ///
    /// Needs extra context; see [`apply_decorrelated`](Self::apply_decorrelated).
    Decorrelated,
}

impl JitterPolicy {
    /// Applies jitter to `delay`. `Decorrelated` returns `delay` unchanged here.
    pub fn apply(&self, delay: Duration) -> Duration {
        match self {
            JitterPolicy::None | JitterPolicy::Decorrelated => delay,
            JitterPolicy::Full => uniform(0, millis(delay)),
            JitterPolicy::Equal => {
                let half = millis(delay) / 2;
                Duration::from_millis(half) + uniform(0, half)
            }
        }
    }

    /// Decorrelated jitter between `floor` and `prev × 3`, capped at `max`.
    ///
    /// Other policies fall back to [`apply`](Self::apply) on `prev`.
    pub fn apply_decorrelated(&self, floor: Duration, prev: Duration, max: Duration) -> Duration {
        if *self != JitterPolicy::Decorrelated {
            return self.apply(prev);
        }
        let lo = millis(floor);
        let hi = millis(prev).saturating_mul(3).min(millis(max)).max(lo);
        uniform(lo, hi)
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

fn uniform(lo: u64, hi: u64) -> Duration {
    if lo >= hi {
        return Duration::from_millis(lo);
    }
    Duration::from_millis(rand::rng().random_range(lo..=hi))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_keeps_delay() {
        let d = Duration::from_millis(420);
        assert_eq!(JitterPolicy::None.apply(d), d);
    }

    #[test]
    fn equal_stays_in_upper_half() {
        let d = Duration::from_millis(1_000);
        for _ in 0..200 {
            let j = JitterPolicy::Equal.apply(d);
            assert!(j >= Duration::from_millis(500) && j <= d, "{j:?}");
        }
    }

    #[test]
    fn zero_delay_stays_zero() {
        assert_eq!(JitterPolicy::Full.apply(Duration::ZERO), Duration::ZERO);
        assert_eq!(JitterPolicy::Equal.apply(Duration::ZERO), Duration::ZERO);
    }

    #[test]
    fn decorrelated_respects_floor_and_cap() {
        let floor = Duration::from_millis(100);
        let max = Duration::from_millis(900);
        for _ in 0..200 {
            let j = JitterPolicy::Decorrelated.apply_decorrelated(floor, Duration::from_secs(5), max);
            assert!(j >= floor && j <= max, "{j:?}");
        }
    }

    #[test]
    fn parses_from_config_strings() {
        #[derive(Deserialize)]
        struct Wrap {
            jitter: JitterPolicy,
        }
        let w: Wrap = toml::from_str("jitter = \"decorrelated\"").expect("parse");
        assert_eq!(w.jitter, JitterPolicy::Decorrelated);
    }
}
