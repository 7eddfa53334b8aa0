//! # ServiceActor: supervision of one service.
//!
//! Drives a [`Service`](crate::Service) through its lifecycle:
//! - start with a deadline for readiness,
//! - watch liveness while running,
//! - restart on failure per [`RestartPolicy`](crate::RestartPolicy) with
//!   [`BackoffPolicy`](crate::BackoffPolicy) delays,
//! - escalate with `system.fatal` once the budget is spent.
//!
//! ## Flow
//! ```text
//! loop {
//!   ├─► Starting ── run(ctx) ──┬─► ctx.ready()        → Running (first start: report Ok)
//!   │                          ├─► deadline elapsed   → Error
//!   │                          └─► run returned       → Error / Stopped
//!   ├─► Running  ── select ────┬─► cancelled          → Stopping → Stopped
//!   │                          ├─► run returned Err   → Error
//!   │                          └─► watchdog: no beat for interval × misses → Error
//!   └─► Error:
//!        ├─► first start         → report Err to the supervisor, exit
//!        ├─► budget left         → sleep(backoff.next(n)) → restart
//!        └─► budget exhausted    → publish system.fatal, raise fatal signal, exit
//! }
//! ```
//!
//! Runs are polled inside the actor (not spawned), so dropping a run after a
//! deadline or missed liveness aborts it; its token is cancelled first.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::{oneshot, watch};
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio::{pin, select};
use tokio_util::sync::CancellationToken;

use super::liveness::LivenessTracker;
use super::state::{Health, ServiceState};
use super::status::StatusBoard;
use super::supervisor::FatalReport;
use crate::config::ServiceSettings;
use crate::error::ServiceError;
use crate::events::{Bus, Payload};
use crate::services::{ServiceContext, ServiceRef};
use crate::subscribers::panic_reason;

/// Outcome of the first start, reported to the supervisor.
pub(crate) type StartReport = oneshot::Sender<Result<(), String>>;

enum RunOutcome {
    Stopped,
    Failed {
        reason: String,
        health: Health,
        retryable: bool,
        before_ready: bool,
    },
}

pub(crate) struct ServiceActor {
    pub(crate) service: ServiceRef,
    pub(crate) name: Arc<str>,
    pub(crate) settings: ServiceSettings,
    pub(crate) bus: Bus,
    pub(crate) board: StatusBoard,
    pub(crate) liveness: Arc<LivenessTracker>,
    pub(crate) fatal: Arc<watch::Sender<Option<FatalReport>>>,
}

impl ServiceActor {
    pub(crate) async fn run(self, token: CancellationToken, started: StartReport) {
        let mut started = Some(started);
        let mut restarts: u32 = 0;

        loop {
            let (reason, health, retryable) = match self.run_once(&token, &mut started).await {
                RunOutcome::Stopped => {
                    self.board.set(&self.name, ServiceState::Stopped, Health::Unknown, None);
                    if let Some(tx) = started.take() {
                        let _ = tx.send(Err("stopped before becoming ready".into()));
                    }
                    return;
                }
                RunOutcome::Failed {
                    reason,
                    health,
                    before_ready,
                    ..
                } if before_ready && started.is_some() => {
                    self.board
                        .set(&self.name, ServiceState::Error, health, Some(reason.clone()));
                    if let Some(tx) = started.take() {
                        let _ = tx.send(Err(reason));
                    }
                    return;
                }
                RunOutcome::Failed {
                    reason,
                    health,
                    retryable,
                    ..
                } => (reason, health, retryable),
            };

            self.board
                .set(&self.name, ServiceState::Error, health, Some(reason.clone()));

            if !retryable || !self.settings.restart.allows(restarts) {
                self.escalate(restarts, reason);
                return;
            }

            let delay = self.settings.backoff.next(restarts);
            restarts = self.board.record_restart(&self.name);
            tracing::warn!(
                service = %self.name,
                restart = restarts,
                delay_ms = delay.as_millis() as u64,
                %reason,
                "restarting service"
            );

            let sleep = time::sleep(delay);
            pin!(sleep);
            select! {
                _ = &mut sleep => {}
                _ = token.cancelled() => {
                    self.board.set(&self.name, ServiceState::Stopped, Health::Unknown, None);
                    return;
                }
            }
        }
    }

    async fn run_once(&self, token: &CancellationToken, started: &mut Option<StartReport>) -> RunOutcome {
        let child = token.child_token();
        let (ctx, mut ready) = ServiceContext::new(
            Arc::clone(&self.name),
            self.bus.clone(),
            child.clone(),
            self.settings.liveness_interval,
        );
        self.board
            .set(&self.name, ServiceState::Starting, Health::Unknown, None);

        let service = Arc::clone(&self.service);
        let run = AssertUnwindSafe(async move { service.run(ctx).await }).catch_unwind();
        pin!(run);

        let deadline = time::sleep(self.settings.start_timeout);
        pin!(deadline);
        let ready_seen = ready.clone();
        let became_ready = async { ready.wait_for(|r| *r).await.is_ok() };
        pin!(became_ready);

        select! {
            biased;
            _ = token.cancelled() => {
                child.cancel();
                self.board.set(&self.name, ServiceState::Stopping, Health::Unknown, None);
                let _ = (&mut run).await;
                return RunOutcome::Stopped;
            }
            res = &mut run => {
                // Ready and exited within the same poll.
                let was_ready = *ready_seen.borrow();
                if was_ready {
                    self.mark_running(started);
                }
                return exited(res, !was_ready);
            }
            true = &mut became_ready => {}
            _ = &mut deadline => {
                child.cancel();
                return RunOutcome::Failed {
                    reason: format!("not ready within {:?}", self.settings.start_timeout),
                    health: Health::Failed,
                    retryable: true,
                    before_ready: true,
                };
            }
        }

        self.mark_running(started);

        let interval = self.settings.liveness_interval;
        let window = interval
            .checked_mul(self.settings.liveness_misses)
            .unwrap_or(Duration::MAX);
        let mut watchdog = time::interval_at(Instant::now() + interval, interval);
        watchdog.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            select! {
                biased;
                _ = token.cancelled() => {
                    child.cancel();
                    self.board.set(&self.name, ServiceState::Stopping, Health::Unknown, None);
                    let _ = (&mut run).await;
                    return RunOutcome::Stopped;
                }
                res = &mut run => return exited(res, false),
                _ = watchdog.tick() => {
                    let stale = self
                        .liveness
                        .last_beat(&self.name)
                        .map_or(true, |at| at.elapsed() > window);
                    if stale {
                        child.cancel();
                        return RunOutcome::Failed {
                            reason: format!(
                                "missed {} liveness intervals of {:?}",
                                self.settings.liveness_misses, interval
                            ),
                            health: Health::Unresponsive,
                            retryable: true,
                            before_ready: false,
                        };
                    }
                }
            }
        }
    }

    fn mark_running(&self, started: &mut Option<StartReport>) {
        self.liveness.arm(&self.name, Instant::now());
        self.board
            .set(&self.name, ServiceState::Running, Health::Healthy, None);
        if let Some(tx) = started.take() {
            let _ = tx.send(Ok(()));
        }
    }

    fn escalate(&self, restarts: u32, reason: String) {
        tracing::error!(service = %self.name, restarts, %reason, "service failed permanently");
        self.bus.publish(
            "supervisor",
            Payload::SystemFatal {
                service: self.name.to_string(),
                reason: reason.clone(),
            },
        );
        self.fatal.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(FatalReport {
                service: self.name.to_string(),
                restarts,
                reason,
            });
            true
        });
    }
}

fn exited(
    res: Result<Result<(), ServiceError>, Box<dyn std::any::Any + Send>>,
    before_ready: bool,
) -> RunOutcome {
    match res {
        Ok(Ok(())) | Ok(Err(ServiceError::Canceled)) if !before_ready => RunOutcome::Stopped,
        Ok(Ok(())) | Ok(Err(ServiceError::Canceled)) => RunOutcome::Failed {
            reason: "exited before becoming ready".into(),
            health: Health::Failed,
            retryable: true,
            before_ready,
        },
        Ok(Err(err)) => RunOutcome::Failed {
            reason: err.to_string(),
            health: Health::Failed,
            retryable: err.is_retryable(),
            before_ready,
        },
        Err(panic) => RunOutcome::Failed {
            reason: panic_reason(panic.as_ref()),
            health: Health::Failed,
            retryable: true,
            before_ready,
        },
    }
}
