//! Service lifecycle state and descriptors.

use std::fmt;

use serde::Serialize;

/// Lifecycle state of a supervised service.
///
/// ```text
/// Stopped → Starting → Running → Stopping → Stopped
///              │          │
///              └──────────┴──► Error ──► Starting (restart)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    /// Not running.
    Stopped,
    /// Run started; waiting for readiness.
    Starting,
    /// Ready and beating.
    Running,
    /// Cancellation requested; waiting for the run to return.
    Stopping,
    /// Failed to start, failed while running, or stopped beating.
    Error,
}

impl ServiceState {
    /// Lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceState::Stopped => "stopped",
            ServiceState::Starting => "starting",
            ServiceState::Running => "running",
            ServiceState::Stopping => "stopping",
            ServiceState::Error => "error",
        }
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Health as last observed by the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Health {
    /// Not running, or not yet ready.
    Unknown,
    /// Running and beating on time.
    Healthy,
    /// Missed too many liveness beats.
    Unresponsive,
    /// Run failed, panicked, or did not become ready in time.
    Failed,
}

impl Health {
    /// Returns `true` for states worth recording as diagnostics.
    pub fn is_failing(&self) -> bool {
        matches!(self, Health::Unresponsive | Health::Failed)
    }
}

impl fmt::Display for Health {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Health::Unknown => "unknown",
            Health::Healthy => "healthy",
            Health::Unresponsive => "unresponsive",
            Health::Failed => "failed",
        })
    }
}

/// Snapshot of one supervised service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceDescriptor {
    /// Service name.
    pub name: String,
    /// Declared dependencies.
    pub depends_on: Vec<String>,
    /// Current lifecycle state.
    pub state: ServiceState,
    /// Current health.
    pub health: Health,
    /// Automatic restarts performed so far.
    pub restart_count: u32,
    /// Reason of the last failure, if any.
    pub last_error: Option<String>,
}

impl ServiceDescriptor {
    pub(crate) fn new(name: &str, depends_on: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            depends_on,
            state: ServiceState::Stopped,
            health: Health::Unknown,
            restart_count: 0,
            last_error: None,
        }
    }
}
