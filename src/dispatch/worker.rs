//! # Capability worker.
//!
//! One task per capability drains a bounded FIFO queue, so commands for the
//! same capability never run concurrently and run in submission order.
//! The worker owns the capability's sticky provider. With
//! `sticky_scope = "mode"` it also holds its own `mode.changed` listener and
//! drains it before every dequeued message; the bus enqueues the change
//! before `publish` returns, so any command submitted afterwards sees it.
//!
//! ```text
//! queue ──► Run(job) ──► select ──► attempt(primary) ──ok──► sticky update ──► command.result
//!                                        │ err
//!                                        ▼
//!                          fallback enabled & healthy alternative?
//!                                 ├─ yes → attempt(alternative) ── ok ──► provider.changed, command.result
//!                                 │                               └ err ─► command.failed
//!                                 └─ no  → command.failed
//! ```

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use parking_lot::RwLock;
use tokio::sync::{mpsc, oneshot};
use tokio::time;
use tokio_util::sync::CancellationToken;

use super::router::{CapabilityRoute, Selection};
use super::{AttemptReport, Command, CommandOutcome, HealthBoard, InFlight, ProviderRef, SwitchReason};
use crate::error::{DispatchError, ProviderError};
use crate::events::{Bus, Listener, Payload};
use crate::subscribers::panic_reason;

pub(crate) const ORIGIN: &str = "dispatcher";

pub(crate) type Reply<T> = oneshot::Sender<Result<T, DispatchError>>;

pub(crate) enum WorkerMsg {
    Run {
        command: Command,
        reply: Reply<CommandOutcome>,
    },
    Switch {
        provider: String,
        reply: Reply<()>,
    },
}

/// Active provider per capability, mirrored for readers outside the workers.
pub(crate) type ActiveProviders = Arc<RwLock<HashMap<String, String>>>;

pub(crate) struct CapabilityWorker {
    pub(crate) route: CapabilityRoute,
    pub(crate) providers: HashMap<String, ProviderRef>,
    pub(crate) health: HealthBoard,
    pub(crate) in_flight: InFlight,
    pub(crate) active: ActiveProviders,
    pub(crate) bus: Bus,
    /// Present when sticky selections are scoped to a mode.
    pub(crate) mode_changes: Option<Listener>,
    pub(crate) rx: mpsc::Receiver<WorkerMsg>,
}

impl CapabilityWorker {
    pub(crate) async fn run(mut self, token: CancellationToken) {
        tracing::debug!(capability = %self.route.capability, "capability worker started");
        loop {
            let msg = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                msg = self.rx.recv() => match msg {
                    Some(msg) => msg,
                    None => break,
                },
            };
            self.drain_mode_changes();
            match msg {
                WorkerMsg::Run { command, reply } => {
                    let _ticket = self.in_flight.enter();
                    let result = self.route_and_execute(&command, &token).await;
                    let _ = reply.send(result);
                }
                WorkerMsg::Switch { provider, reply } => {
                    self.set_sticky(&provider, SwitchReason::Manual);
                    let _ = reply.send(Ok(()));
                }
            }
        }
        if let Some(listener) = &self.mode_changes {
            self.bus.unsubscribe(listener.id());
        }
        tracing::debug!(capability = %self.route.capability, "capability worker stopped");
    }

    fn drain_mode_changes(&mut self) {
        let Some(listener) = self.mode_changes.as_mut() else { return };
        let mut last = None;
        while let Some(ev) = listener.try_recv() {
            last = Some(ev.seq);
        }
        let Some(seq) = last else { return };
        if self.route.sticky.take().is_some() {
            self.active.write().remove(&self.route.capability);
            tracing::debug!(capability = %self.route.capability, seq, "sticky provider reset on mode change");
        }
    }

    async fn route_and_execute(
        &mut self,
        command: &Command,
        token: &CancellationToken,
    ) -> Result<CommandOutcome, DispatchError> {
        let health = self.health.clone();
        let selection = match self.route.select(command.provider.as_deref(), |p| health.is_healthy(p)) {
            Ok(sel) => sel,
            Err(err) => {
                self.publish_failed(command, &err, &[]);
                return Err(err);
            }
        };
        let Selection {
            provider: primary,
            overridden,
            reason,
        } = selection;
        if let Some(requested) = &overridden {
            tracing::warn!(
                command = %command.id,
                capability = %self.route.capability,
                %requested,
                using = %primary,
                "requested provider unavailable; overridden"
            );
        }

        let mut attempts: Vec<(String, ProviderError)> = Vec::with_capacity(2);
        match self.attempt(&primary, command, token).await {
            Ok(output) => return Ok(self.succeed(command, primary, output, None, overridden, reason)),
            Err(err) => {
                tracing::warn!(
                    command = %command.id,
                    provider = %primary,
                    error = %err,
                    "provider attempt failed"
                );
                attempts.push((primary.clone(), err));
            }
        }

        let alternative = if self.route.fallback && !token.is_cancelled() {
            self.route.alternative(&primary, |p| health.is_healthy(p))
        } else {
            None
        };
        if let Some(alt) = alternative {
            tracing::info!(command = %command.id, from = %primary, to = %alt, "falling back");
            match self.attempt(&alt, command, token).await {
                Ok(output) => {
                    return Ok(self.succeed(
                        command,
                        alt,
                        output,
                        Some(primary),
                        overridden,
                        SwitchReason::Fallback,
                    ))
                }
                Err(err) => attempts.push((alt, err)),
            }
        }

        let err = DispatchError::Failed {
            capability: self.route.capability.clone(),
            attempts,
        };
        let reports: Vec<AttemptReport> = match &err {
            DispatchError::Failed { attempts, .. } => attempts
                .iter()
                .map(|(provider, e)| AttemptReport {
                    provider: provider.clone(),
                    kind: e.as_label().to_string(),
                    error: e.to_string(),
                })
                .collect(),
            _ => Vec::new(),
        };
        self.publish_failed(command, &err, &reports);
        Err(err)
    }

    async fn attempt(
        &self,
        provider: &str,
        command: &Command,
        token: &CancellationToken,
    ) -> Result<serde_json::Value, ProviderError> {
        let Some(p) = self.providers.get(provider) else {
            return Err(ProviderError::fail(format!("provider '{provider}' is not registered")));
        };
        let child = token.child_token();
        let call = AssertUnwindSafe(p.execute(command, child.clone())).catch_unwind();
        let timeout = self.route.timeout;

        tokio::select! {
            biased;
            _ = token.cancelled() => {
                child.cancel();
                Err(ProviderError::Canceled)
            }
            res = time::timeout(timeout, call) => match res {
                Ok(Ok(out)) => out,
                Ok(Err(panic)) => Err(ProviderError::fail(panic_reason(panic.as_ref()))),
                Err(_elapsed) => {
                    child.cancel();
                    Err(ProviderError::Timeout { timeout })
                }
            },
        }
    }

    fn succeed(
        &mut self,
        command: &Command,
        provider: String,
        output: serde_json::Value,
        fallback_from: Option<String>,
        overridden: Option<String>,
        reason: SwitchReason,
    ) -> CommandOutcome {
        self.set_sticky(&provider, reason);
        let outcome = CommandOutcome {
            command_id: command.id,
            capability: self.route.capability.clone(),
            provider,
            output,
            fallback_from,
            overridden,
        };
        self.bus.publish(ORIGIN, Payload::CommandResult(outcome.clone()));
        outcome
    }

    fn set_sticky(&mut self, provider: &str, reason: SwitchReason) {
        if self.route.sticky.as_deref() == Some(provider) {
            return;
        }
        let from = self.route.sticky.replace(provider.to_string());
        self.active
            .write()
            .insert(self.route.capability.clone(), provider.to_string());
        tracing::info!(
            capability = %self.route.capability,
            from = from.as_deref().unwrap_or("-"),
            to = provider,
            ?reason,
            "active provider changed"
        );
        self.bus.publish(
            ORIGIN,
            Payload::ProviderChanged {
                capability: self.route.capability.clone(),
                from,
                to: provider.to_string(),
                reason,
            },
        );
    }

    fn publish_failed(&self, command: &Command, err: &DispatchError, attempts: &[AttemptReport]) {
        tracing::error!(command = %command.id, capability = %self.route.capability, error = %err, "command failed");
        self.bus.publish(
            ORIGIN,
            Payload::CommandFailed {
                command_id: command.id,
                capability: self.route.capability.clone(),
                reason: err.to_string(),
                attempts: attempts.to_vec(),
            },
        );
    }
}
