//! # Per-subscription worker.
//!
//! ```text
//! [bounded queue] ──► worker ──► handler.on_event(&Event)
//!                          ├──► Err(e)  → publish bus.handler_failed
//!                          └──► panic   → publish bus.handler_failed
//! ```
//!
//! Workers use `catch_unwind` to isolate panics and continue with the next
//! event. `AssertUnwindSafe` is used, so a handler that panics while holding
//! a lock may leave its own state inconsistent; other handlers are unaffected.
//!
//! A failure while handling a bus diagnostic (`bus.handler_failed`,
//! `bus.overflow`) is logged but never re-published.

use std::any::Any;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::mpsc;

use crate::events::{Event, Payload, WeakBus};
use crate::subscribers::Subscribe;

pub(crate) fn spawn_worker(
    handler: Arc<dyn Subscribe>,
    mut rx: mpsc::Receiver<Arc<Event>>,
    bus: WeakBus,
) {
    tokio::spawn(async move {
        while let Some(ev) = rx.recv().await {
            let fut = handler.on_event(ev.as_ref());
            let reason = match std::panic::AssertUnwindSafe(fut).catch_unwind().await {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => err.message,
                Err(panic_err) => panic_reason(panic_err.as_ref()),
            };

            tracing::warn!(
                subscriber = handler.name(),
                topic = ev.topic(),
                seq = ev.seq,
                %reason,
                "bus handler failed"
            );
            if ev.payload.is_bus_diagnostic() {
                continue;
            }
            let Some(bus) = bus.upgrade() else { break };
            bus.publish(
                "bus",
                Payload::HandlerFailed {
                    subscriber: handler.name().to_string(),
                    topic: ev.topic().to_string(),
                    reason,
                },
            );
        }
    });
}

/// Formats a caught panic payload as `panic: <message>`.
pub(crate) fn panic_reason(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        format!("panic: {msg}")
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("panic: {msg}")
    } else {
        "panic: unknown".to_string()
    }
}
