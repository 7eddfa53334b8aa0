//! # Restart delay growth.
//!
//! Restart `n` (0-indexed) waits `first × factor^n`, clamped to `max`, then
//! jittered. The base for each restart is derived from `n` alone, so jitter
//! never compounds.
//!
//! ```rust
//! use std::time::Duration;
//! use conductor::{BackoffPolicy, JitterPolicy};
//!
//! let backoff = BackoffPolicy {
//!     first: Duration::from_millis(200),
//!     max: Duration::from_secs(5),
//!     factor: 2.0,
//!     jitter: JitterPolicy::None,
//! };
//! assert_eq!(backoff.next(0), Duration::from_millis(200));
//! assert_eq!(backoff.next(3), Duration::from_millis(1600));
//! assert_eq!(backoff.next(9), Duration::from_secs(5));
//! ```

use std::time::Duration;

use super::jitter::JitterPolicy;

/// Delay schedule between service restarts.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackoffPolicy {
    /// Delay before the first restart.
    pub first: Duration,
    /// Upper bound for any delay.
    pub max: Duration,
    /// Growth per restart (`>= 1.0`; validated in configuration).
    pub factor: f64,
    /// Randomization of each delay.
    pub jitter: JitterPolicy,
}

impl Default for BackoffPolicy {
    /// 200ms doubling up to 30s, no jitter.
    fn default() -> Self {
        Self {
            first: Duration::from_millis(200),
            max: Duration::from_secs(30),
            factor: 2.0,
            jitter: JitterPolicy::None,
        }
    }
}

impl BackoffPolicy {
    /// Delay before restart number `restart` (0-indexed).
    pub fn next(&self, restart: u32) -> Duration {
        let exp = i32::try_from(restart).unwrap_or(i32::MAX);
        let secs = self.first.as_secs_f64() * self.factor.powi(exp);

        let base = if secs.is_finite() && (0.0..=self.max.as_secs_f64()).contains(&secs) {
            Duration::from_secs_f64(secs)
        } else {
            self.max
        };

        match self.jitter {
            JitterPolicy::Decorrelated => {
                self.jitter
                    .apply_decorrelated(self.first.min(self.max), base, self.max)
            }
            other => other.apply(base),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doubling(jitter: JitterPolicy) -> BackoffPolicy {
        BackoffPolicy {
            first: Duration::from_millis(100),
            max: Duration::from_secs(10),
            factor: 2.0,
            jitter,
        }
    }

    #[test]
    fn grows_geometrically_then_caps() {
        let p = doubling(JitterPolicy::None);
        let got: Vec<_> = (0..4).map(|n| p.next(n).as_millis()).collect();
        assert_eq!(got, [100, 200, 400, 800]);
        assert_eq!(p.next(20), Duration::from_secs(10));
        assert_eq!(p.next(u32::MAX), Duration::from_secs(10));
    }

    #[test]
    fn first_above_max_is_clamped() {
        let p = BackoffPolicy {
            first: Duration::from_secs(60),
            ..doubling(JitterPolicy::None)
        };
        assert_eq!(p.next(0), Duration::from_secs(10));
    }

    #[test]
    fn jittered_delays_never_exceed_base() {
        let p = doubling(JitterPolicy::Full);
        for n in 0..12 {
            let base = doubling(JitterPolicy::None).next(n);
            assert!(p.next(n) <= base);
        }
    }

    #[test]
    fn decorrelated_late_restarts_spread_widely() {
        let p = doubling(JitterPolicy::Decorrelated);
        let delays: Vec<_> = (0..200).map(|_| p.next(8)).collect();
        assert!(delays.iter().all(|d| *d >= Duration::from_millis(100)));
        assert!(delays.iter().any(|d| *d >= Duration::from_secs(3)));
    }
}
