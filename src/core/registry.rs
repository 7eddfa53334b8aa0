//! # Registry of running service actors.
//!
//! Owns one handle (join handle + cancellation token) per started service,
//! in start order. Stopping walks the handles in reverse so dependents stop
//! before what they depend on.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

struct Handle {
    name: String,
    join: JoinHandle<()>,
    cancel: CancellationToken,
}

#[derive(Default)]
pub(crate) struct Registry {
    handles: Vec<Handle>,
}

impl Registry {
    pub(crate) fn push(&mut self, name: String, join: JoinHandle<()>, cancel: CancellationToken) {
        self.handles.push(Handle { name, join, cancel });
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Stops every actor in reverse start order within `grace` overall.
    ///
    /// Returns the names of actors that did not stop in time (they are aborted).
    pub(crate) async fn stop_all(&mut self, grace: Duration) -> Vec<String> {
        let deadline = Instant::now() + grace;
        let mut stuck = Vec::new();

        while let Some(handle) = self.handles.pop() {
            handle.cancel.cancel();
            let abort = handle.join.abort_handle();
            match time::timeout_at(deadline, handle.join).await {
                Ok(Ok(())) => tracing::debug!(service = %handle.name, "service actor joined"),
                Ok(Err(err)) => {
                    tracing::error!(service = %handle.name, error = %err, "service actor panicked")
                }
                Err(_elapsed) => {
                    tracing::warn!(service = %handle.name, "service did not stop within grace");
                    abort.abort();
                    stuck.push(handle.name);
                }
            }
        }
        stuck.reverse();
        stuck
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use parking_lot::Mutex;

    #[tokio::test(start_paused = true)]
    async fn stops_in_reverse_and_reports_stuck() {
        let stopped = Arc::new(Mutex::new(Vec::new()));
        let mut reg = Registry::default();

        let join = tokio::spawn(async { std::future::pending::<()>().await });
        reg.push("stubborn".into(), join, CancellationToken::new());

        for name in ["audio", "voice"] {
            let token = CancellationToken::new();
            let t = token.clone();
            let log = Arc::clone(&stopped);
            let join = tokio::spawn(async move {
                t.cancelled().await;
                log.lock().push(name);
            });
            reg.push(name.into(), join, token);
        }
        let stuck = reg.stop_all(Duration::from_secs(1)).await;
        assert_eq!(stuck, ["stubborn"]);
        assert_eq!(*stopped.lock(), ["voice", "audio"]);
        assert!(reg.is_empty());
    }
}
