use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::events::{Bus, Payload};

/// Per-run context handed to [`Service::run`](crate::Service::run).
///
/// A new context (fresh token, fresh readiness flag) is created for every start.
#[derive(Clone)]
pub struct ServiceContext {
    name: Arc<str>,
    bus: Bus,
    token: CancellationToken,
    ready: Arc<watch::Sender<bool>>,
    liveness_interval: Duration,
}

impl ServiceContext {
    pub(crate) fn new(
        name: Arc<str>,
        bus: Bus,
        token: CancellationToken,
        liveness_interval: Duration,
    ) -> (Self, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        let ctx = Self {
            name,
            bus,
            token,
            ready: Arc::new(tx),
            liveness_interval,
        };
        (ctx, rx)
    }

    /// Service name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Marks the service `Running`. Idempotent.
    pub fn ready(&self) {
        self.ready.send_replace(true);
    }

    /// Publishes one `service.liveness` beat.
    pub fn heartbeat(&self) {
        self.bus.publish(
            &self.name,
            Payload::ServiceLiveness {
                service: self.name.to_string(),
            },
        );
    }

    /// Beats once per liveness interval until cancelled.
    pub async fn heartbeat_until_cancelled(&self) {
        let mut tick = tokio::time::interval(self.liveness_interval);
        loop {
            tokio::select! {
                _ = self.token.cancelled() => return,
                _ = tick.tick() => self.heartbeat(),
            }
        }
    }

    /// Expected interval between beats.
    pub fn liveness_interval(&self) -> Duration {
        self.liveness_interval
    }

    /// Bus for publishing service-specific events.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Cancellation token of this run.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Returns `true` once the supervisor asked the service to stop.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Completes when the supervisor asks the service to stop.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }
}
