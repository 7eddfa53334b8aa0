//! # Supervisor: dependency-ordered startup, liveness, restarts, shutdown.
//!
//! ## Architecture
//! ```text
//! KernelConfig.services ──► graph::start_order ──► [a, b, c ...]
//!
//! start():
//!   for name in order:
//!     spawn ServiceActor(name) ──► wait for first-start report
//!        ├─ Ok   → next service
//!        └─ Err  → stop started services (reverse), StartupBlocked { service, blocked }
//!
//! running:
//!   ServiceContext::heartbeat ──► bus: service.liveness ──► LivenessTracker
//!   ServiceActor watchdog / restart / escalate ──► bus: service.health, system.fatal
//!                                           └──► fatal signal (wait_fatal)
//!
//! shutdown():
//!   Registry::stop_all(grace) in reverse start order ──► GraceExceeded { stuck } on timeout
//! ```
//!
//! ## Example
//! ```rust
//! use conductor::{Bus, KernelConfig, ServiceContext, ServiceError, ServiceFn, ServiceState, Supervisor};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let cfg = KernelConfig::from_toml_str("[services.audio]")?;
//! let bus = Bus::new();
//! let audio = ServiceFn::arc("audio", |ctx: ServiceContext| async move {
//!     ctx.ready();
//!     ctx.heartbeat_until_cancelled().await;
//!     Ok::<_, ServiceError>(())
//! });
//!
//! let mut sup = Supervisor::new(&cfg, &bus, vec![audio])?;
//! sup.start().await?;
//! assert_eq!(sup.descriptor("audio").map(|d| d.state), Some(ServiceState::Running));
//! sup.shutdown().await?;
//! # Ok(())
//! # }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, watch};
use tokio_util::sync::CancellationToken;

use super::actor::ServiceActor;
use super::graph;
use super::liveness::LivenessTracker;
use super::registry::Registry;
use super::state::ServiceDescriptor;
use super::status::StatusBoard;
use crate::config::{KernelConfig, ServiceSettings};
use crate::error::{ConfigError, SupervisorError};
use crate::events::{topics, Bus, SubscriptionId};
use crate::services::ServiceRef;

/// Details of a service that exhausted its restart budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FatalReport {
    /// Failing service.
    pub service: String,
    /// Restarts performed before giving up.
    pub restarts: u32,
    /// Last failure reason.
    pub reason: String,
}

impl From<FatalReport> for SupervisorError {
    fn from(r: FatalReport) -> Self {
        SupervisorError::Fatal {
            service: r.service,
            restarts: r.restarts,
            reason: r.reason,
        }
    }
}

/// Owns every supervised service.
pub struct Supervisor {
    bus: Bus,
    board: StatusBoard,
    liveness: Arc<LivenessTracker>,
    liveness_sub: Option<SubscriptionId>,
    services: HashMap<String, ServiceRef>,
    settings: HashMap<String, ServiceSettings>,
    deps: BTreeMap<String, Vec<String>>,
    order: Vec<String>,
    registry: Registry,
    token: CancellationToken,
    fatal: Arc<watch::Sender<Option<FatalReport>>>,
    grace: Duration,
}

impl Supervisor {
    /// Matches `services` against `[services]` and computes the start order.
    ///
    /// Every configured service must be registered and vice versa.
    pub fn new(cfg: &KernelConfig, bus: &Bus, services: Vec<ServiceRef>) -> Result<Self, ConfigError> {
        let mut by_name = HashMap::with_capacity(services.len());
        for svc in services {
            let name = svc.name().to_string();
            if !cfg.services.contains_key(&name) {
                return Err(ConfigError::UnconfiguredService(name));
            }
            by_name.insert(name, svc);
        }

        let mut settings = HashMap::with_capacity(cfg.services.len());
        let mut deps = BTreeMap::new();
        for name in cfg.services.keys() {
            if !by_name.contains_key(name) {
                return Err(ConfigError::MissingService(name.clone()));
            }
            let s = cfg
                .service_settings(name)
                .ok_or_else(|| ConfigError::MissingService(name.clone()))?;
            deps.insert(name.clone(), s.depends_on.clone());
            settings.insert(name.clone(), s);
        }

        let order = graph::start_order(&deps)?;
        let board = StatusBoard::new(
            bus.clone(),
            order
                .iter()
                .map(|n| ServiceDescriptor::new(n, deps.get(n).cloned().unwrap_or_default())),
        );
        let (fatal, _) = watch::channel(None);

        Ok(Self {
            bus: bus.clone(),
            board,
            liveness: Arc::new(LivenessTracker::new()),
            liveness_sub: None,
            services: by_name,
            settings,
            deps,
            order,
            registry: Registry::default(),
            token: CancellationToken::new(),
            fatal: Arc::new(fatal),
            grace: cfg.supervisor.grace(),
        })
    }

    /// Starts services in dependency order, each only after its dependencies are `Running`.
    ///
    /// If one fails to become ready, services already started are stopped in
    /// reverse and [`SupervisorError::StartupBlocked`] names it and its dependents.
    pub async fn start(&mut self) -> Result<(), SupervisorError> {
        if self.liveness_sub.is_none() {
            let sub = self
                .bus
                .subscribe(topics::SERVICE_LIVENESS, Arc::clone(&self.liveness) as _);
            self.liveness_sub = Some(sub);
        }

        for name in self.order.clone() {
            let (Some(service), Some(settings)) = (self.services.get(&name), self.settings.get(&name))
            else {
                continue;
            };
            let actor = ServiceActor {
                service: Arc::clone(service),
                name: Arc::from(name.as_str()),
                settings: settings.clone(),
                bus: self.bus.clone(),
                board: self.board.clone(),
                liveness: Arc::clone(&self.liveness),
                fatal: Arc::clone(&self.fatal),
            };

            let (tx, rx) = oneshot::channel();
            let token = self.token.child_token();
            let join = tokio::spawn(actor.run(token.clone(), tx));
            self.registry.push(name.clone(), join, token);

            let report = rx
                .await
                .unwrap_or_else(|_| Err("actor exited during startup".to_string()));
            if let Err(reason) = report {
                let blocked = graph::dependents(&self.deps, &name);
                tracing::error!(service = %name, %reason, ?blocked, "startup blocked");
                self.registry.stop_all(self.grace).await;
                return Err(SupervisorError::StartupBlocked {
                    service: name,
                    reason,
                    blocked,
                });
            }
            tracing::info!(service = %name, "service running");
        }
        Ok(())
    }

    /// Stops every service in reverse start order within the grace period.
    pub async fn shutdown(&mut self) -> Result<(), SupervisorError> {
        let stuck = self.registry.stop_all(self.grace).await;
        self.token.cancel();
        if let Some(sub) = self.liveness_sub.take() {
            self.bus.unsubscribe(sub);
        }
        if stuck.is_empty() {
            tracing::info!("all services stopped");
            Ok(())
        } else {
            Err(SupervisorError::GraceExceeded {
                grace: self.grace,
                stuck,
            })
        }
    }

    /// Descriptors of every service, in start order.
    pub fn descriptors(&self) -> Vec<ServiceDescriptor> {
        self.order
            .iter()
            .filter_map(|n| self.board.get(n))
            .collect()
    }

    /// Descriptor of one service.
    pub fn descriptor(&self, name: &str) -> Option<ServiceDescriptor> {
        self.board.get(name)
    }

    /// Computed start order.
    pub fn start_order(&self) -> &[String] {
        &self.order
    }

    /// Receiver that turns `Some` once a service exhausts its restart budget.
    pub fn fatal_watch(&self) -> watch::Receiver<Option<FatalReport>> {
        self.fatal.subscribe()
    }

    /// Completes when a service exhausts its restart budget.
    pub async fn wait_fatal(&self) -> SupervisorError {
        let mut rx = self.fatal.subscribe();
        let report = match rx.wait_for(Option::is_some).await {
            Ok(slot) => slot.clone(),
            Err(_) => None,
        };
        match report {
            Some(report) => report.into(),
            None => std::future::pending().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Health, ServiceState};
    use crate::error::ServiceError;
    use crate::events::Payload;
    use crate::services::{ServiceContext, ServiceFn};

    fn steady(name: &'static str) -> ServiceRef {
        ServiceFn::arc(name, |ctx: ServiceContext| async move {
            ctx.ready();
            ctx.heartbeat_until_cancelled().await;
            Ok::<_, ServiceError>(())
        })
    }

    fn silent(name: &'static str) -> ServiceRef {
        ServiceFn::arc(name, |ctx: ServiceContext| async move {
            ctx.ready();
            ctx.cancelled().await;
            Ok::<_, ServiceError>(())
        })
    }

    fn never_ready(name: &'static str) -> ServiceRef {
        ServiceFn::arc(name, |ctx: ServiceContext| async move {
            ctx.cancelled().await;
            Ok::<_, ServiceError>(())
        })
    }

    #[tokio::test(start_paused = true)]
    async fn starts_in_dependency_order_and_stops_in_reverse() {
        let cfg = KernelConfig::from_toml_str(
            r#"
            [services.voice]
            depends_on = ["audio"]
            [services.audio]
            "#,
        )
        .expect("config");
        let bus = Bus::new();
        let mut health = bus.listen(topics::SERVICE_HEALTH, "test", 64);

        let mut sup = Supervisor::new(&cfg, &bus, vec![steady("voice"), steady("audio")]).expect("sup");
        assert_eq!(sup.start_order(), ["audio", "voice"]);
        sup.start().await.expect("start");
        sup.shutdown().await.expect("shutdown");

        let mut transitions = Vec::new();
        while let Some(ev) = health.try_recv() {
            if let Payload::ServiceHealth { service, state, .. } = &ev.payload {
                transitions.push(format!("{service}:{state}"));
            }
        }
        assert_eq!(
            transitions,
            [
                "audio:starting",
                "audio:running",
                "voice:starting",
                "voice:running",
                "voice:stopping",
                "voice:stopped",
                "audio:stopping",
                "audio:stopped",
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn blocked_dependency_keeps_dependents_stopped() {
        let cfg = KernelConfig::from_toml_str(
            r#"
            [services.a]
            start_timeout_ms = 100
            [services.b]
            depends_on = ["a"]
            "#,
        )
        .expect("config");
        let bus = Bus::new();
        let mut sup = Supervisor::new(&cfg, &bus, vec![never_ready("a"), steady("b")]).expect("sup");

        match sup.start().await {
            Err(SupervisorError::StartupBlocked { service, blocked, .. }) => {
                assert_eq!(service, "a");
                assert_eq!(blocked, ["b"]);
            }
            other => panic!("unexpected: {other:?}"),
        }
        let a = sup.descriptor("a").expect("a");
        assert_eq!((a.state, a.health), (ServiceState::Error, Health::Failed));
        assert_eq!(sup.descriptor("b").map(|d| d.state), Some(ServiceState::Stopped));
    }

    #[tokio::test(start_paused = true)]
    async fn missed_liveness_restarts_then_escalates() {
        let cfg = KernelConfig::from_toml_str(
            r#"
            [supervisor]
            liveness_interval_ms = 100
            liveness_misses = 2
            max_restarts = 2
            [supervisor.backoff]
            first_ms = 10
            [services.mute]
            "#,
        )
        .expect("config");
        let bus = Bus::new();
        let mut fatal_events = bus.listen(topics::SYSTEM_FATAL, "test", 8);
        let mut sup = Supervisor::new(&cfg, &bus, vec![silent("mute")]).expect("sup");
        sup.start().await.expect("start");

        let err = sup.wait_fatal().await;
        match err {
            SupervisorError::Fatal { service, restarts, .. } => {
                assert_eq!(service, "mute");
                assert_eq!(restarts, 2);
            }
            other => panic!("unexpected: {other}"),
        }
        let ev = fatal_events.recv().await.expect("system.fatal");
        assert!(matches!(&ev.payload, Payload::SystemFatal { service, .. } if service == "mute"));

        let desc = sup.descriptor("mute").expect("mute");
        assert_eq!(desc.restart_count, 2);
        assert_eq!(desc.health, Health::Unresponsive);
        sup.shutdown().await.expect("shutdown");
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_error_is_not_restarted() {
        let cfg = KernelConfig::from_toml_str("[services.crashy]").expect("config");
        let bus = Bus::new();
        let crashy = ServiceFn::arc("crashy", |ctx: ServiceContext| async move {
            ctx.ready();
            Err::<(), _>(ServiceError::Fatal {
                error: "device gone".into(),
            })
        });
        let mut sup = Supervisor::new(&cfg, &bus, vec![crashy]).expect("sup");
        sup.start().await.expect("start");

        match sup.wait_fatal().await {
            SupervisorError::Fatal { restarts, reason, .. } => {
                assert_eq!(restarts, 0);
                assert!(reason.contains("device gone"));
            }
            other => panic!("unexpected: {other}"),
        }
    }

    #[test]
    fn registrations_must_match_config() {
        let cfg = KernelConfig::from_toml_str("[services.audio]").expect("config");
        let bus = Bus::new();
        let err = Supervisor::new(&cfg, &bus, vec![]).err().expect("missing");
        assert_eq!(err.as_label(), "config_missing_service");
        let err = Supervisor::new(&cfg, &bus, vec![steady("audio"), steady("lights")])
            .err()
            .expect("unconfigured");
        assert_eq!(err.as_label(), "config_unconfigured_service");
    }
}
