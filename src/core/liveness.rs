//! # Liveness tracker.
//!
//! Records the last `service.liveness` beat per service, using event sequence
//! numbers to ignore out-of-order beats.
//!
//! ```text
//! ServiceContext::heartbeat ──► Bus ──► LivenessTracker::on_event ──► beats[name] = {seq, at}
//!                                                                          ▲
//!                                          ServiceActor watchdog ── last_beat(name)
//! ```
//!
//! A beat with `seq <= last_seq` for the same service is stale and rejected.
//! [`LivenessTracker::arm`] resets the clock when a service becomes `Running`,
//! so a restart starts with a full window.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::error::HandlerError;
use crate::events::{Event, Payload};
use crate::subscribers::Subscribe;

#[derive(Debug, Clone, Copy)]
struct Beat {
    last_seq: u64,
    at: Instant,
}

#[derive(Default)]
pub(crate) struct LivenessTracker {
    beats: Mutex<HashMap<String, Beat>>,
}

impl LivenessTracker {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Applies a beat if it is newer than the last one seen. Returns `false` if stale.
    pub(crate) fn record(&self, service: &str, seq: u64, at: Instant) -> bool {
        let mut beats = self.beats.lock();
        let beat = beats.entry(service.to_string()).or_insert(Beat { last_seq: 0, at });
        if seq <= beat.last_seq {
            return false;
        }
        beat.last_seq = seq;
        beat.at = at;
        true
    }

    /// Starts a fresh liveness window for `service`.
    pub(crate) fn arm(&self, service: &str, at: Instant) {
        let mut beats = self.beats.lock();
        beats
            .entry(service.to_string())
            .and_modify(|b| b.at = at)
            .or_insert(Beat { last_seq: 0, at });
    }

    pub(crate) fn last_beat(&self, service: &str) -> Option<Instant> {
        self.beats.lock().get(service).map(|b| b.at)
    }
}

#[async_trait]
impl Subscribe for LivenessTracker {
    async fn on_event(&self, ev: &Event) -> Result<(), HandlerError> {
        if let Payload::ServiceLiveness { service } = &ev.payload {
            if !self.record(service, ev.seq, Instant::now()) {
                tracing::trace!(service = %service, seq = ev.seq, "stale liveness beat ignored");
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "liveness-tracker"
    }

    fn queue_capacity(&self) -> usize {
        4096
    }
}
