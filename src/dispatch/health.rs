//! # Provider health.
//!
//! [`HealthBoard`] holds the last known health of every provider; providers
//! never probed count as healthy. The monitor probes each provider every
//! `dispatch.health_interval_ms` and publishes `provider.health` on flips.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::ProviderRef;
use crate::events::{Bus, Payload};

const ORIGIN: &str = "dispatcher";

/// Shared provider health table.
#[derive(Debug, Clone, Default)]
pub struct HealthBoard {
    inner: Arc<RwLock<HashMap<String, bool>>>,
}

impl HealthBoard {
    /// Returns the last known health (`true` if never reported).
    pub fn is_healthy(&self, provider: &str) -> bool {
        self.inner.read().get(provider).copied().unwrap_or(true)
    }

    /// Records health; returns `true` if it changed.
    pub(crate) fn set(&self, provider: &str, healthy: bool) -> bool {
        let mut map = self.inner.write();
        let previous = map.insert(provider.to_string(), healthy);
        previous.unwrap_or(true) != healthy
    }

    /// Providers currently considered unhealthy, sorted.
    pub fn unhealthy(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner
            .read()
            .iter()
            .filter(|(_, ok)| !**ok)
            .map(|(name, _)| name.clone())
            .collect();
        names.sort_unstable();
        names
    }

    /// Records health and publishes `provider.health` if it changed.
    pub(crate) fn report(&self, bus: &Bus, provider: &str, healthy: bool) {
        if self.set(provider, healthy) {
            if healthy {
                tracing::info!(provider, "provider healthy again");
            } else {
                tracing::warn!(provider, "provider unhealthy");
            }
            bus.publish(
                ORIGIN,
                Payload::ProviderHealth {
                    provider: provider.to_string(),
                    healthy,
                },
            );
        }
    }
}

/// Probes every provider once per `interval` until cancelled.
///
/// A probe that does not answer within `interval` counts as unhealthy.
pub(crate) async fn monitor(
    providers: Vec<ProviderRef>,
    board: HealthBoard,
    bus: Bus,
    interval: Duration,
    token: CancellationToken,
) {
    let mut tick = time::interval(interval);
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = token.cancelled() => return,
            _ = tick.tick() => {}
        }
        for provider in &providers {
            let healthy = time::timeout(interval, provider.health_check())
                .await
                .unwrap_or(false);
            board.report(&bus, provider.name(), healthy);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_providers_are_healthy() {
        let board = HealthBoard::default();
        assert!(board.is_healthy("streaming"));
        assert!(!board.set("streaming", true));
        assert!(board.set("streaming", false));
        assert!(!board.is_healthy("streaming"));
        assert_eq!(board.unhealthy(), ["streaming"]);
    }

    #[tokio::test]
    async fn report_publishes_only_flips() {
        let bus = Bus::new();
        let mut rx = bus.listen("provider.health", "test", 8);
        let board = HealthBoard::default();
        board.report(&bus, "hue", true);
        board.report(&bus, "hue", false);
        board.report(&bus, "hue", false);
        board.report(&bus, "hue", true);

        let mut flips = Vec::new();
        while let Some(ev) = rx.try_recv() {
            if let Payload::ProviderHealth { healthy, .. } = &ev.payload {
                flips.push(*healthy);
            }
        }
        assert_eq!(flips, [false, true]);
    }
}
