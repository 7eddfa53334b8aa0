//! # Events carried by the bus.
//!
//! An [`Event`] is an immutable record: a topic, a typed [`Payload`], the
//! origin service, a wall-clock timestamp and a sequence number assigned by
//! the [`Bus`](crate::Bus) at publish time.
//!
//! Each payload variant is one topic schema; [`Payload::topic`] returns the
//! canonical topic so that a topic and its schema can never disagree.
//! `Custom` is the escape hatch for collaborator-defined topics.
//!
//! ## Ordering guarantees
//! `seq` is strictly increasing per process. It is assigned under the same lock
//! that enqueues the event to subscribers, so every subscriber observes
//! events in `seq` order.
//!
//! ## Example
//! ```rust
//! use conductor::{Mode, Payload};
//!
//! let p = Payload::ModeChanged { from: Mode::Idle, to: Mode::Interactive };
//! assert_eq!(p.topic(), "mode.changed");
//! ```

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use super::topic::topics;
use crate::core::{Health, ServiceState};
use crate::dispatch::{AttemptReport, Command, CommandOutcome, SwitchReason};
use crate::logs::{LogEntry, RawDiagnostic};
use crate::mode::Mode;

/// Version of the flat JSON schema produced by [`Event::to_json`].
pub const SCHEMA_VERSION: u16 = 1;

/// Typed event payload; one variant per topic schema.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Payload {
    // === Mode ===
    /// Request a mode change (`mode.requested`).
    ModeRequested { mode: Mode },
    /// Accepted mode change (`mode.changed`).
    ModeChanged { from: Mode, to: Mode },
    /// Rejected bus request (`mode.rejected`).
    ModeRejected { from: Mode, to: Mode, reason: String },

    // === Commands ===
    /// Command submitted over the bus (`command.submitted`).
    CommandSubmitted(Command),
    /// Successful command (`command.result`).
    CommandResult(CommandOutcome),
    /// Failed command (`command.failed`).
    CommandFailed {
        command_id: Uuid,
        capability: String,
        reason: String,
        attempts: Vec<AttemptReport>,
    },

    // === Providers ===
    /// Active provider switched (`provider.changed`).
    ProviderChanged {
        capability: String,
        from: Option<String>,
        to: String,
        reason: SwitchReason,
    },
    /// Provider health flipped (`provider.health`).
    ProviderHealth { provider: String, healthy: bool },

    // === Services ===
    /// Liveness beat (`service.liveness`).
    ServiceLiveness { service: String },
    /// Lifecycle/health transition (`service.health`).
    ServiceHealth {
        service: String,
        state: ServiceState,
        health: Health,
        restart_count: u32,
        reason: Option<String>,
    },
    /// Unrecoverable condition (`system.fatal`).
    SystemFatal { service: String, reason: String },

    // === Logs ===
    /// Raw diagnostic record (`log.raw`).
    Diagnostic(RawDiagnostic),
    /// Accepted log entry (`log.entry`).
    LogEntry(LogEntry),
    /// Sink degraded to memory-only (`log.degraded`).
    LogDegraded { reason: String },

    // === Bus ===
    /// A handler failed (`bus.handler_failed`).
    HandlerFailed {
        subscriber: String,
        topic: String,
        reason: String,
    },
    /// An event was dropped for one subscriber (`bus.overflow`).
    SubscriberOverflow { subscriber: String, topic: String },

    /// Collaborator-defined topic with free-form data.
    Custom {
        topic: String,
        data: serde_json::Value,
    },
}

impl Payload {
    /// Returns the canonical topic of this payload.
    pub fn topic(&self) -> &str {
        match self {
            Payload::ModeRequested { .. } => topics::MODE_REQUESTED,
            Payload::ModeChanged { .. } => topics::MODE_CHANGED,
            Payload::ModeRejected { .. } => topics::MODE_REJECTED,
            Payload::CommandSubmitted(_) => topics::COMMAND_SUBMITTED,
            Payload::CommandResult(_) => topics::COMMAND_RESULT,
            Payload::CommandFailed { .. } => topics::COMMAND_FAILED,
            Payload::ProviderChanged { .. } => topics::PROVIDER_CHANGED,
            Payload::ProviderHealth { .. } => topics::PROVIDER_HEALTH,
            Payload::ServiceLiveness { .. } => topics::SERVICE_LIVENESS,
            Payload::ServiceHealth { .. } => topics::SERVICE_HEALTH,
            Payload::SystemFatal { .. } => topics::SYSTEM_FATAL,
            Payload::Diagnostic(_) => topics::LOG_RAW,
            Payload::LogEntry(_) => topics::LOG_ENTRY,
            Payload::LogDegraded { .. } => topics::LOG_DEGRADED,
            Payload::HandlerFailed { .. } => topics::BUS_HANDLER_FAILED,
            Payload::SubscriberOverflow { .. } => topics::BUS_OVERFLOW,
            Payload::Custom { topic, .. } => topic,
        }
    }

    /// True for payloads the bus itself emits about delivery problems.
    ///
    /// Failures while delivering these are never re-reported.
    #[inline]
    pub fn is_bus_diagnostic(&self) -> bool {
        matches!(
            self,
            Payload::HandlerFailed { .. } | Payload::SubscriberOverflow { .. }
        )
    }
}

/// Immutable bus event.
///
/// - `seq`: monotonic process-wide sequence (assigned at publish)
/// - `at`: wall-clock timestamp
/// - `origin`: publishing service
/// - `payload`: typed body; `topic()` is derived from it
#[derive(Debug, Clone)]
pub struct Event {
    /// Strictly increasing sequence number.
    pub seq: u64,
    /// Wall-clock publish time.
    pub at: SystemTime,
    /// Publishing service identifier.
    pub origin: Arc<str>,
    /// Typed body.
    pub payload: Payload,
}

impl Event {
    pub(crate) fn new(seq: u64, origin: Arc<str>, payload: Payload) -> Self {
        Self {
            seq,
            at: SystemTime::now(),
            origin,
            payload,
        }
    }

    /// Returns the event topic.
    #[inline]
    pub fn topic(&self) -> &str {
        self.payload.topic()
    }

    /// Renders the event as a flat, versioned JSON document for external consumers.
    pub fn to_json(&self) -> serde_json::Value {
        let at_ms = self
            .at
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        json!({
            "schema_version": SCHEMA_VERSION,
            "seq": self.seq,
            "at_ms": at_ms,
            "topic": self.topic(),
            "origin": &*self.origin,
            "payload": serde_json::to_value(&self.payload).unwrap_or(serde_json::Value::Null),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_payload_carries_its_own_topic() {
        let p = Payload::Custom {
            topic: "lighting.scene".into(),
            data: json!({"scene": "calm"}),
        };
        assert_eq!(p.topic(), "lighting.scene");
    }

    #[test]
    fn to_json_is_flat_and_versioned() {
        let ev = Event::new(
            7,
            Arc::from("modes"),
            Payload::ModeChanged {
                from: Mode::Idle,
                to: Mode::Ambient,
            },
        );
        let doc = ev.to_json();
        assert_eq!(doc["schema_version"], 1);
        assert_eq!(doc["seq"], 7);
        assert_eq!(doc["topic"], "mode.changed");
        assert_eq!(doc["origin"], "modes");
        assert_eq!(doc["payload"]["type"], "mode_changed");
        assert_eq!(doc["payload"]["to"], "ambient");
    }

    #[test]
    fn bus_diagnostics_are_flagged() {
        let overflow = Payload::SubscriberOverflow {
            subscriber: "slow".into(),
            topic: "x".into(),
        };
        assert!(overflow.is_bus_diagnostic());
        assert!(!Payload::ServiceLiveness {
            service: "audio".into()
        }
        .is_bus_diagnostic());
    }
}
