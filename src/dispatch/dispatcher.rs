//! # Dispatcher: command intake and worker wiring.
//!
//! ```text
//! DispatcherHandle::submit ──┐
//! bus: command.submitted ──► resolve ──► backlog ──┴──► [queue: music] ──► CapabilityWorker(music)
//!                                                   └──► [queue: lights] ─► CapabilityWorker(lights)
//! bus: mode.changed ──► (sticky_scope = "mode") each worker drops its sticky selection
//! health monitor ──► HealthBoard ──► provider.health
//! ```
//!
//! Submission waits for queue space (backpressure); `try_submit` fails fast.
//! Bus commands never wait in the intake loop: each capability has an
//! unbounded backlog and a forwarder that feeds the worker queue in order.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::health::{self, HealthBoard};
use super::router::CapabilityRoute;
use super::worker::{ActiveProviders, CapabilityWorker, WorkerMsg, ORIGIN};
use super::{Command, CommandOutcome, InFlight, ProviderRef};
use crate::config::{KernelConfig, StickyScope};
use crate::error::{ConfigError, DispatchError};
use crate::events::{topics, Bus, Listener, Payload};

type Backlog = mpsc::UnboundedSender<Command>;

/// Command accepted into a capability queue.
#[derive(Debug)]
pub struct PendingCommand {
    id: Uuid,
    capability: String,
    rx: oneshot::Receiver<Result<CommandOutcome, DispatchError>>,
}

impl PendingCommand {
    /// Id of the queued command.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Capability the command was queued on.
    pub fn capability(&self) -> &str {
        &self.capability
    }

    /// Waits for execution to finish.
    pub async fn outcome(self) -> Result<CommandOutcome, DispatchError> {
        self.rx.await.map_err(|_| DispatchError::Closed)?
    }
}

/// Cloneable access to the dispatcher.
#[derive(Clone)]
pub struct DispatcherHandle {
    queues: Arc<HashMap<String, mpsc::Sender<WorkerMsg>>>,
    routes: Arc<HashMap<String, Vec<String>>>,
    actions: Arc<BTreeMap<String, String>>,
    active: ActiveProviders,
    health: HealthBoard,
    in_flight: InFlight,
    bus: Bus,
}

impl DispatcherHandle {
    /// Routes and executes `command`, waiting for queue space and for the result.
    pub async fn execute(&self, command: Command) -> Result<CommandOutcome, DispatchError> {
        self.submit(command).await?.outcome().await
    }

    /// Queues `command`, waiting while its capability queue is full.
    pub async fn submit(&self, command: Command) -> Result<PendingCommand, DispatchError> {
        let (capability, queue) = self.queue_for(&command)?;
        let (reply, rx) = oneshot::channel();
        let id = command.id;
        queue
            .send(WorkerMsg::Run { command, reply })
            .await
            .map_err(|_| DispatchError::Closed)?;
        Ok(PendingCommand { id, capability, rx })
    }

    /// Queues `command` or fails with [`DispatchError::Busy`] if the queue is full.
    pub fn try_submit(&self, command: Command) -> Result<PendingCommand, DispatchError> {
        let (capability, queue) = self.queue_for(&command)?;
        let (reply, rx) = oneshot::channel();
        let id = command.id;
        match queue.try_send(WorkerMsg::Run { command, reply }) {
            Ok(()) => Ok(PendingCommand { id, capability, rx }),
            Err(mpsc::error::TrySendError::Full(_)) => Err(DispatchError::Busy { capability }),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(DispatchError::Closed),
        }
    }

    /// Makes `provider` the active provider of `capability`.
    ///
    /// Applied in queue order, after commands already submitted.
    pub async fn switch_provider(&self, capability: &str, provider: &str) -> Result<(), DispatchError> {
        let Some(providers) = self.routes.get(capability) else {
            return Err(DispatchError::UnknownCapability {
                action: capability.to_string(),
            });
        };
        if !providers.iter().any(|p| p == provider) {
            return Err(DispatchError::UnknownProvider {
                capability: capability.to_string(),
                provider: provider.to_string(),
            });
        }
        let queue = self.queues.get(capability).ok_or(DispatchError::Closed)?;
        let (reply, rx) = oneshot::channel();
        queue
            .send(WorkerMsg::Switch {
                provider: provider.to_string(),
                reply,
            })
            .await
            .map_err(|_| DispatchError::Closed)?;
        rx.await.map_err(|_| DispatchError::Closed)?
    }

    /// Active (sticky) provider of `capability`, if one was selected.
    pub fn active_provider(&self, capability: &str) -> Option<String> {
        self.active.read().get(capability).cloned()
    }

    /// Providers of `capability` in priority order.
    pub fn providers(&self, capability: &str) -> Option<&[String]> {
        self.routes.get(capability).map(Vec::as_slice)
    }

    /// Counter of executing commands.
    pub fn in_flight(&self) -> InFlight {
        self.in_flight.clone()
    }

    /// Provider health table.
    pub fn health(&self) -> &HealthBoard {
        &self.health
    }

    /// Overrides the health of a provider (e.g. from an external probe).
    pub fn set_provider_health(&self, provider: &str, healthy: bool) {
        self.health.report(&self.bus, provider, healthy);
    }

    /// Resolves the capability: explicit field first, then the action map.
    pub fn capability_of(&self, command: &Command) -> Result<String, DispatchError> {
        let capability = command
            .capability
            .as_deref()
            .or_else(|| self.actions.get(&command.action).map(String::as_str));
        match capability {
            Some(cap) if self.routes.contains_key(cap) => Ok(cap.to_string()),
            _ => Err(DispatchError::UnknownCapability {
                action: command.action.clone(),
            }),
        }
    }

    fn queue_for(&self, command: &Command) -> Result<(String, &mpsc::Sender<WorkerMsg>), DispatchError> {
        let capability = self.resolve(command)?;
        match self.queues.get(&capability) {
            Some(queue) => Ok((capability, queue)),
            None => Err(DispatchError::Closed),
        }
    }

    /// Resolves the capability, publishing `command.failed` if there is none.
    fn resolve(&self, command: &Command) -> Result<String, DispatchError> {
        let resolved = self.capability_of(command);
        if let Err(err) = &resolved {
            tracing::warn!(command = %command.id, action = %command.action, error = %err, "command rejected");
            self.bus.publish(
                ORIGIN,
                Payload::CommandFailed {
                    command_id: command.id,
                    capability: command.capability.clone().unwrap_or_default(),
                    reason: err.to_string(),
                    attempts: Vec::new(),
                },
            );
        }
        resolved
    }
}

/// Dispatcher before it is started: validated routes, queues and bus listeners.
pub struct Dispatcher {
    workers: Vec<CapabilityWorker>,
    providers: Vec<ProviderRef>,
    handle: DispatcherHandle,
    health_interval: Option<Duration>,
    submitted: Listener,
}

impl Dispatcher {
    /// Validates `providers` against `[capabilities]` and builds one worker per capability.
    pub fn new(
        cfg: &KernelConfig,
        bus: &Bus,
        providers: Vec<ProviderRef>,
    ) -> Result<(Self, DispatcherHandle), ConfigError> {
        let by_name: HashMap<String, ProviderRef> = providers
            .iter()
            .map(|p| (p.name().to_string(), Arc::clone(p)))
            .collect();

        let health = HealthBoard::default();
        let in_flight = InFlight::default();
        let active: ActiveProviders = Arc::default();
        let scope = cfg.dispatch.sticky_scope;
        let capacity = cfg.bus.queue_capacity;

        let mut workers = Vec::with_capacity(cfg.capabilities.len());
        let mut queues = HashMap::new();
        let mut routes = HashMap::new();
        for capability in cfg.capabilities.keys() {
            let Some(settings) = cfg.capability_settings(capability) else { continue };
            let mut members = HashMap::new();
            for name in &settings.providers {
                let provider = by_name.get(name).ok_or_else(|| ConfigError::MissingProvider {
                    capability: capability.clone(),
                    provider: name.clone(),
                })?;
                if !provider.capabilities().iter().any(|c| c == capability) {
                    return Err(ConfigError::CapabilityMismatch {
                        capability: capability.clone(),
                        provider: name.clone(),
                    });
                }
                members.insert(name.clone(), Arc::clone(provider));
            }

            let (tx, rx) = mpsc::channel(cfg.dispatch.queue_capacity.max(1));
            routes.insert(capability.clone(), settings.providers.clone());
            queues.insert(capability.clone(), tx);
            workers.push(CapabilityWorker {
                route: CapabilityRoute::new(capability, settings),
                providers: members,
                health: health.clone(),
                in_flight: in_flight.clone(),
                active: Arc::clone(&active),
                bus: bus.clone(),
                mode_changes: (scope == StickyScope::Mode)
                    .then(|| bus.listen(topics::MODE_CHANGED, "dispatcher", capacity)),
                rx,
            });
        }

        let handle = DispatcherHandle {
            queues: Arc::new(queues),
            routes: Arc::new(routes),
            actions: Arc::new(cfg.actions.clone()),
            active,
            health,
            in_flight,
            bus: bus.clone(),
        };
        let dispatcher = Self {
            workers,
            providers,
            handle: handle.clone(),
            health_interval: cfg.dispatch.health_interval(),
            submitted: bus.listen(topics::COMMAND_SUBMITTED, "dispatcher", capacity),
        };
        Ok((dispatcher, handle))
    }

    /// Spawns the workers and health monitor, then serves bus input until cancelled.
    pub async fn run(mut self, token: CancellationToken) {
        for worker in self.workers.drain(..) {
            tokio::spawn(worker.run(token.child_token()));
        }
        if let Some(interval) = self.health_interval {
            tokio::spawn(health::monitor(
                self.providers.clone(),
                self.handle.health.clone(),
                self.handle.bus.clone(),
                interval,
                token.child_token(),
            ));
        }

        let mut backlogs: HashMap<String, Backlog> = HashMap::with_capacity(self.handle.queues.len());
        for (capability, queue) in self.handle.queues.iter() {
            let (tx, rx) = mpsc::unbounded_channel();
            tokio::spawn(forward(capability.clone(), queue.clone(), rx, token.child_token()));
            backlogs.insert(capability.clone(), tx);
        }

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                ev = self.submitted.recv() => {
                    let Some(ev) = ev else { break };
                    let Payload::CommandSubmitted(command) = &ev.payload else { continue };
                    let Ok(capability) = self.handle.resolve(command) else { continue };
                    if let Some(backlog) = backlogs.get(&capability) {
                        if backlog.send(command.clone()).is_err() {
                            tracing::debug!(command = %command.id, %capability, "bus command not queued");
                        }
                    }
                }
            }
        }

        self.handle.bus.unsubscribe(self.submitted.id());
        tracing::debug!("dispatcher stopped");
    }
}

/// Moves bus commands from a capability's backlog into its worker queue.
///
/// Results are reported on the bus, so the reply receiver is dropped.
async fn forward(
    capability: String,
    queue: mpsc::Sender<WorkerMsg>,
    mut backlog: mpsc::UnboundedReceiver<Command>,
    token: CancellationToken,
) {
    loop {
        let command = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            command = backlog.recv() => match command {
                Some(command) => command,
                None => break,
            },
        };
        let (reply, _) = oneshot::channel();
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            sent = queue.send(WorkerMsg::Run { command, reply }) => {
                if sent.is_err() {
                    break;
                }
            }
        }
    }
    tracing::debug!(%capability, "command forwarder stopped");
}
