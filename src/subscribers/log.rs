//! # LogWriter - bus event tracer
//!
//! A subscriber that traces every bus event it receives at `debug` level
//! (warn for failures). Attached by the kernel when `bus.trace_events = true`.
//!
//! ## Example output
//! ```text
//! DEBUG conductor::bus: [mode-changed] seq=12 from=idle to=interactive
//! DEBUG conductor::bus: [command-result] seq=15 capability="music" provider="local"
//! WARN  conductor::bus: [command-failed] seq=18 capability="music" reason="..."
//! DEBUG conductor::bus: [service-health] seq=20 service="audio" state=running
//! ```
//!
//! Log entries and raw diagnostics are skipped: they already belong to the
//! log pipeline and tracing them here would feed them back into it.

use async_trait::async_trait;

use crate::error::HandlerError;
use crate::events::{Event, Payload};
use crate::subscribers::Subscribe;

/// Event tracer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) -> Result<(), HandlerError> {
        let seq = e.seq;
        match &e.payload {
            Payload::ModeRequested { mode } => {
                tracing::debug!(target: "conductor::bus", "[mode-requested] seq={seq} mode={mode}");
            }
            Payload::ModeChanged { from, to } => {
                tracing::debug!(target: "conductor::bus", "[mode-changed] seq={seq} from={from} to={to}");
            }
            Payload::ModeRejected { from, to, reason } => {
                tracing::debug!(target: "conductor::bus", "[mode-rejected] seq={seq} from={from} to={to} reason={reason:?}");
            }
            Payload::CommandSubmitted(cmd) => {
                tracing::debug!(target: "conductor::bus", "[command-submitted] seq={seq} id={} action={:?}", cmd.id, cmd.action);
            }
            Payload::CommandResult(out) => {
                tracing::debug!(
                    target: "conductor::bus",
                    "[command-result] seq={seq} capability={:?} provider={:?}",
                    out.capability, out.provider
                );
            }
            Payload::CommandFailed {
                capability, reason, ..
            } => {
                tracing::warn!(target: "conductor::bus", "[command-failed] seq={seq} capability={capability:?} reason={reason:?}");
            }
            Payload::ProviderChanged {
                capability, from, to, reason,
            } => {
                tracing::debug!(
                    target: "conductor::bus",
                    "[provider-changed] seq={seq} capability={capability:?} from={from:?} to={to:?} reason={reason:?}"
                );
            }
            Payload::ProviderHealth { provider, healthy } => {
                tracing::debug!(target: "conductor::bus", "[provider-health] seq={seq} provider={provider:?} healthy={healthy}");
            }
            Payload::ServiceLiveness { .. } => {}
            Payload::ServiceHealth {
                service, state, restart_count, ..
            } => {
                tracing::debug!(
                    target: "conductor::bus",
                    "[service-health] seq={seq} service={service:?} state={state} restarts={restart_count}"
                );
            }
            Payload::SystemFatal { service, reason } => {
                tracing::warn!(target: "conductor::bus", "[system-fatal] seq={seq} service={service:?} reason={reason:?}");
            }
            Payload::HandlerFailed {
                subscriber, topic, ..
            } => {
                tracing::debug!(target: "conductor::bus", "[handler-failed] seq={seq} subscriber={subscriber:?} topic={topic}");
            }
            Payload::SubscriberOverflow { subscriber, topic } => {
                tracing::debug!(target: "conductor::bus", "[subscriber-overflow] seq={seq} subscriber={subscriber:?} topic={topic}");
            }
            Payload::LogDegraded { reason } => {
                tracing::debug!(target: "conductor::bus", "[log-degraded] seq={seq} reason={reason:?}");
            }
            Payload::Custom { topic, .. } => {
                tracing::debug!(target: "conductor::bus", "[custom] seq={seq} topic={topic} origin={}", e.origin);
            }
            Payload::Diagnostic(_) | Payload::LogEntry(_) => {}
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "log-writer"
    }
}
