//! # Per-key duplicate suppression.
//!
//! An entry is suppressed when an identical `(service, level, message)` key
//! was **accepted** within the window. Suppressed entries do not extend the
//! window, so a steady stream of duplicates yields one accepted entry per
//! window. A zero window disables suppression.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use super::entry::DedupKey;

pub(crate) struct Deduplicator {
    window: Duration,
    accepted_at: HashMap<DedupKey, Instant>,
}

impl Deduplicator {
    pub(crate) fn new(window: Duration) -> Self {
        Self {
            window,
            accepted_at: HashMap::new(),
        }
    }

    /// Returns `true` if an entry with `key` should be accepted at `now`.
    pub(crate) fn admit(&mut self, key: &DedupKey, now: Instant) -> bool {
        if self.window.is_zero() {
            return true;
        }
        match self.accepted_at.get_mut(key) {
            Some(at) if now.duration_since(*at) < self.window => false,
            Some(at) => {
                *at = now;
                true
            }
            None => {
                self.accepted_at.insert(key.clone(), now);
                true
            }
        }
    }

    /// Forgets keys whose window has closed.
    pub(crate) fn prune(&mut self, now: Instant) {
        let window = self.window;
        self.accepted_at
            .retain(|_, at| now.duration_since(*at) < window);
    }

    pub(crate) fn tracked(&self) -> usize {
        self.accepted_at.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logs::Level;

    fn key(msg: &str) -> DedupKey {
        DedupKey {
            service: "audio".into(),
            level: Level::Error,
            message: msg.into(),
        }
    }

    #[test]
    fn suppresses_within_window_per_key() {
        let mut d = Deduplicator::new(Duration::from_secs(30));
        let t0 = Instant::now();
        assert!(d.admit(&key("a"), t0));
        assert!(!d.admit(&key("a"), t0 + Duration::from_secs(29)));
        assert!(d.admit(&key("b"), t0 + Duration::from_secs(1)));
        assert!(d.admit(&key("a"), t0 + Duration::from_secs(30)));
        assert!(!d.admit(&key("a"), t0 + Duration::from_secs(31)));
    }

    #[test]
    fn zero_window_admits_everything() {
        let mut d = Deduplicator::new(Duration::ZERO);
        let t0 = Instant::now();
        assert!(d.admit(&key("a"), t0));
        assert!(d.admit(&key("a"), t0));
        assert_eq!(d.tracked(), 0);
    }

    #[test]
    fn prune_drops_closed_windows() {
        let mut d = Deduplicator::new(Duration::from_secs(10));
        let t0 = Instant::now();
        d.admit(&key("a"), t0);
        d.admit(&key("b"), t0 + Duration::from_secs(5));
        d.prune(t0 + Duration::from_secs(12));
        assert_eq!(d.tracked(), 1);
    }
}
