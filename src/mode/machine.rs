//! # Mode machine task.
//!
//! [`ModeMachine`] owns the current [`Mode`]. Everything else reads it through
//! a [`ModeHandle`] (a `watch` snapshot) or learns about changes from
//! `mode.changed`.
//!
//! ## Request paths
//! ```text
//! ModeHandle::request_mode ──► mpsc ──┐
//!                                     ├──► apply() ──► TransitionTable::check
//! bus: mode.requested ──► Listener ───┘        │
//!                                              ├── ok  → watch update → publish mode.changed → reply
//!                                              └── err → reply Err / publish mode.rejected (bus only)
//! ```
//!
//! Requests are applied one at a time in arrival order; the fact is on the bus
//! before the caller's future resolves.

use tokio::select;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;

use super::{Mode, TransitionTable};
use crate::error::ModeError;
use crate::events::{topics, Bus, Listener, Payload};

const ORIGIN: &str = "mode-machine";

/// Result of an accepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeTransition {
    /// Mode before the request.
    pub from: Mode,
    /// Mode after the request.
    pub to: Mode,
    /// Sequence number of the published `mode.changed` (`None` for a no-op).
    pub seq: Option<u64>,
}

impl ModeTransition {
    /// Returns `true` if the requested mode was already active.
    pub fn is_noop(&self) -> bool {
        self.seq.is_none()
    }
}

type Request = (Mode, oneshot::Sender<Result<ModeTransition, ModeError>>);

/// Cloneable access to the mode machine.
#[derive(Clone)]
pub struct ModeHandle {
    tx: mpsc::Sender<Request>,
    current: watch::Receiver<Mode>,
}

impl ModeHandle {
    /// Requests a transition and waits for the decision.
    ///
    /// On success `mode.changed` has already been published.
    pub async fn request_mode(&self, mode: Mode) -> Result<ModeTransition, ModeError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send((mode, reply))
            .await
            .map_err(|_| ModeError::Closed)?;
        rx.await.map_err(|_| ModeError::Closed)?
    }

    /// Currently active mode.
    pub fn current(&self) -> Mode {
        *self.current.borrow()
    }

    /// Receiver notified on every accepted change.
    pub fn watch(&self) -> watch::Receiver<Mode> {
        self.current.clone()
    }
}

/// Task owning the current mode.
pub struct ModeMachine {
    table: TransitionTable,
    bus: Bus,
    current: watch::Sender<Mode>,
    requests: mpsc::Receiver<Request>,
    bus_requests: Listener,
}

impl ModeMachine {
    /// Creates the machine in `initial` and subscribes it to `mode.requested`.
    pub fn new(table: TransitionTable, initial: Mode, bus: &Bus, capacity: usize) -> (Self, ModeHandle) {
        let (tx, requests) = mpsc::channel(capacity.max(1));
        let (current, current_rx) = watch::channel(initial);
        let bus_requests = bus.listen(topics::MODE_REQUESTED, ORIGIN, capacity);
        let machine = Self {
            table,
            bus: bus.clone(),
            current,
            requests,
            bus_requests,
        };
        let handle = ModeHandle {
            tx,
            current: current_rx,
        };
        (machine, handle)
    }

    /// Processes requests until `token` is cancelled or every input closes.
    pub async fn run(mut self, token: CancellationToken) {
        tracing::debug!(mode = %self.current.borrow().as_str(), "mode machine started");
        loop {
            select! {
                biased;
                _ = token.cancelled() => break,
                Some((mode, reply)) = self.requests.recv() => {
                    let _ = reply.send(self.apply(mode));
                }
                Some(ev) = self.bus_requests.recv() => {
                    let Payload::ModeRequested { mode } = &ev.payload else { continue };
                    let mode = *mode;
                    if let Err(err) = self.apply(mode) {
                        let from = *self.current.borrow();
                        self.bus.publish(ORIGIN, Payload::ModeRejected {
                            from,
                            to: mode,
                            reason: err.to_string(),
                        });
                    }
                }
                else => break,
            }
        }
        self.bus.unsubscribe(self.bus_requests.id());
        tracing::debug!("mode machine stopped");
    }

    fn apply(&self, to: Mode) -> Result<ModeTransition, ModeError> {
        let from = *self.current.borrow();
        if from == to {
            tracing::debug!(mode = %to, "mode already active");
            return Ok(ModeTransition { from, to, seq: None });
        }
        if let Err(err) = self.table.check(from, to) {
            tracing::warn!(%from, %to, reason = err.as_label(), "mode transition rejected");
            return Err(err);
        }

        self.current.send_replace(to);
        let seq = self.bus.publish(ORIGIN, Payload::ModeChanged { from, to });
        tracing::info!(%from, %to, seq, "mode changed");
        Ok(ModeTransition {
            from,
            to,
            seq: Some(seq),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModesConfig;
    use crate::mode::GuardRegistry;

    fn start(bus: &Bus) -> (ModeHandle, CancellationToken) {
        let table =
            TransitionTable::from_config(&ModesConfig::default(), &GuardRegistry::new()).expect("table");
        let (machine, handle) = ModeMachine::new(table, Mode::Idle, bus, 16);
        let token = CancellationToken::new();
        tokio::spawn(machine.run(token.clone()));
        (handle, token)
    }

    #[tokio::test]
    async fn accepted_change_is_published_before_reply() {
        let bus = Bus::new();
        let mut changes = bus.listen(topics::MODE_CHANGED, "test", 8);
        let (handle, _token) = start(&bus);

        let t = handle.request_mode(Mode::Ambient).await.expect("allowed");
        assert_eq!((t.from, t.to), (Mode::Idle, Mode::Ambient));

        let ev = changes.try_recv().expect("fact published before the reply");
        assert_eq!(Some(ev.seq), t.seq);
        assert_eq!(
            ev.payload,
            Payload::ModeChanged {
                from: Mode::Idle,
                to: Mode::Ambient
            }
        );
        assert_eq!(handle.current(), Mode::Ambient);
    }

    #[tokio::test]
    async fn rejection_never_changes_mode() {
        let bus = Bus::new();
        let mut changes = bus.listen(topics::MODE_CHANGED, "test", 8);
        let (handle, _token) = start(&bus);

        let err = handle.request_mode(Mode::Performance).await.unwrap_err();
        assert_eq!(
            err,
            ModeError::Unreachable {
                from: Mode::Idle,
                to: Mode::Performance
            }
        );
        assert!(changes.try_recv().is_none());
        assert_eq!(handle.current(), Mode::Idle);
    }

    #[tokio::test]
    async fn same_mode_is_a_silent_noop() {
        let bus = Bus::new();
        let mut changes = bus.listen(topics::MODE_CHANGED, "test", 8);
        let (handle, _token) = start(&bus);

        let t = handle.request_mode(Mode::Idle).await.expect("noop");
        assert!(t.is_noop());
        assert!(changes.try_recv().is_none());
    }

    #[tokio::test]
    async fn bus_requests_are_applied_or_rejected() {
        let bus = Bus::new();
        let mut facts = bus.listen("mode.*", "test", 16);
        let (handle, _token) = start(&bus);

        bus.publish("ui", Payload::ModeRequested { mode: Mode::Performance });
        bus.publish("ui", Payload::ModeRequested { mode: Mode::Interactive });

        let mut seen = Vec::new();
        while seen.len() < 4 {
            let ev = facts.recv().await.expect("open");
            seen.push(ev.topic().to_string());
        }
        assert_eq!(
            seen,
            ["mode.requested", "mode.requested", "mode.rejected", "mode.changed"]
        );
        assert_eq!(handle.current(), Mode::Interactive);
    }

    #[tokio::test]
    async fn cancelled_machine_reports_closed() {
        let bus = Bus::new();
        let (handle, token) = start(&bus);
        token.cancel();
        tokio::task::yield_now().await;
        let mut watch = handle.watch();
        // The machine drops its sender on exit.
        assert!(watch.changed().await.is_err());
        assert_eq!(handle.request_mode(Mode::Ambient).await, Err(ModeError::Closed));
    }
}
