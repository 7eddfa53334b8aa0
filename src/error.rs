//! Error types used across the kernel.
//!
//! The taxonomy follows how each failure is recovered:
//!
//! - [`ConfigError`] - static configuration problems; fatal at startup.
//! - [`SupervisorError`] - failures of the supervision runtime itself
//!   (blocked startup, exhausted restart budget, shutdown grace exceeded).
//! - [`ServiceError`] - errors returned by individual service runs.
//! - [`ProviderError`] - errors returned by provider executions; recovered by fallback.
//! - [`DispatchError`] - the outcome of a command that could not be completed.
//! - [`ModeError`] - rejected mode transition requests.
//! - [`HandlerError`] - bus handler failures; isolated per handler.
//! - [`SinkError`] - log sink failures; the pipeline degrades to memory-only.
//!
//! Every enum provides `as_label` returning a short stable label for logs.

use std::time::Duration;
use thiserror::Error;

use crate::mode::Mode;

/// # Configuration errors.
///
/// Raised while parsing/validating [`KernelConfig`](crate::KernelConfig) or while
/// matching registrations against it. The kernel never starts with any of these.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("failed to read config {path}: {source}")]
    Io {
        /// Path that was read.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration text is not valid TOML or does not match the schema.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Service dependencies form a cycle; no valid start order exists.
    #[error("cyclic service dependency: {}", cycle.join(" -> "))]
    CyclicDependency {
        /// Services participating in the cycle, first repeated at the end.
        cycle: Vec<String>,
    },

    /// A service depends on a service that is not declared.
    #[error("service '{service}' depends on unknown service '{dependency}'")]
    UnknownDependency {
        /// Declaring service.
        service: String,
        /// Missing dependency.
        dependency: String,
    },

    /// A transition names a target mode that has no entry in the table.
    #[error("mode {from} declares a transition to undeclared mode {to}")]
    UnknownModeTransition {
        /// Source mode.
        from: Mode,
        /// Undeclared target mode.
        to: Mode,
    },

    /// The initial mode has no entry in the transition table.
    #[error("initial mode {0} is not declared in the transition table")]
    UnknownInitialMode(Mode),

    /// A transition guard name is not registered.
    #[error("mode {mode} uses unknown guard '{guard}'")]
    UnknownGuard {
        /// Mode declaring the guard.
        mode: Mode,
        /// Guard name.
        guard: String,
    },

    /// A capability lists no providers.
    #[error("capability '{0}' has no providers")]
    EmptyCapability(String),

    /// An action maps to an undeclared capability.
    #[error("action '{action}' maps to unknown capability '{capability}'")]
    UnknownActionCapability {
        /// Action name.
        action: String,
        /// Missing capability.
        capability: String,
    },

    /// A configured provider has no registered implementation.
    #[error("capability '{capability}' lists unregistered provider '{provider}'")]
    MissingProvider {
        /// Capability name.
        capability: String,
        /// Provider name.
        provider: String,
    },

    /// A provider is listed for a capability it does not declare.
    #[error("provider '{provider}' does not implement capability '{capability}'")]
    CapabilityMismatch {
        /// Capability name.
        capability: String,
        /// Provider name.
        provider: String,
    },

    /// A configured service has no registered implementation (or vice versa).
    #[error("service '{0}' is configured but not registered")]
    MissingService(String),

    /// A registered service has no configuration entry.
    #[error("service '{0}' is registered but not configured")]
    UnconfiguredService(String),

    /// A tunable has an out-of-range value.
    #[error("invalid value for {field}: {reason}")]
    InvalidTunable {
        /// Field path (e.g. `pipeline.ring_capacity`).
        field: &'static str,
        /// Why it was rejected.
        reason: &'static str,
    },
}

impl ConfigError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use conductor::ConfigError;
    ///
    /// let err = ConfigError::CyclicDependency { cycle: vec!["a".into(), "b".into(), "a".into()] };
    /// assert_eq!(err.as_label(), "config_cyclic_dependency");
    /// assert_eq!(err.to_string(), "cyclic service dependency: a -> b -> a");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigError::Io { .. } => "config_io",
            ConfigError::Parse(_) => "config_parse",
            ConfigError::CyclicDependency { .. } => "config_cyclic_dependency",
            ConfigError::UnknownDependency { .. } => "config_unknown_dependency",
            ConfigError::UnknownModeTransition { .. } => "config_unknown_mode_transition",
            ConfigError::UnknownInitialMode(_) => "config_unknown_initial_mode",
            ConfigError::UnknownGuard { .. } => "config_unknown_guard",
            ConfigError::EmptyCapability(_) => "config_empty_capability",
            ConfigError::UnknownActionCapability { .. } => "config_unknown_action_capability",
            ConfigError::MissingProvider { .. } => "config_missing_provider",
            ConfigError::CapabilityMismatch { .. } => "config_capability_mismatch",
            ConfigError::MissingService(_) => "config_missing_service",
            ConfigError::UnconfiguredService(_) => "config_unconfigured_service",
            ConfigError::InvalidTunable { .. } => "config_invalid_tunable",
        }
    }
}

/// # Errors produced by the supervision runtime.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SupervisorError {
    /// Invalid configuration detected while preparing the start order.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A service did not reach `Running`; its dependents were never started.
    #[error("service '{service}' failed to start ({reason}); blocked: {blocked:?}")]
    StartupBlocked {
        /// The service that failed to reach `Running`.
        service: String,
        /// Why it failed.
        reason: String,
        /// Dependents (transitive) that were not started because of it.
        blocked: Vec<String>,
    },

    /// A service exhausted its restart budget.
    #[error("service '{service}' failed permanently after {restarts} restarts: {reason}")]
    Fatal {
        /// Failing service.
        service: String,
        /// Restarts performed before giving up.
        restarts: u32,
        /// Last failure reason.
        reason: String,
    },

    /// Shutdown grace period was exceeded; some services remained stuck.
    #[error("shutdown timeout {grace:?} exceeded; stuck: {stuck:?}")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Services that did not stop in time.
        stuck: Vec<String>,
    },
}

impl SupervisorError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            SupervisorError::Config(e) => e.as_label(),
            SupervisorError::StartupBlocked { .. } => "supervisor_startup_blocked",
            SupervisorError::Fatal { .. } => "supervisor_fatal",
            SupervisorError::GraceExceeded { .. } => "supervisor_grace_exceeded",
        }
    }
}

/// # Errors returned by a service run.
///
/// `Fail` is restarted according to the service's restart policy;
/// `Fatal` is never restarted.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Run failed but may succeed if restarted.
    #[error("service failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// Non-recoverable failure (no restart).
    #[error("fatal service error (no restart): {error}")]
    Fatal {
        /// The underlying error message.
        error: String,
    },

    /// Run was cancelled by the supervisor.
    #[error("context cancelled")]
    Canceled,
}

impl ServiceError {
    /// Convenience constructor for [`ServiceError::Fail`].
    pub fn fail(error: impl Into<String>) -> Self {
        ServiceError::Fail {
            error: error.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ServiceError::Fail { .. } => "service_failed",
            ServiceError::Fatal { .. } => "service_fatal",
            ServiceError::Canceled => "service_canceled",
        }
    }

    /// Indicates whether a restart may fix this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ServiceError::Fail { .. })
    }
}

/// # Errors produced by provider execution.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// Execution exceeded the capability deadline; the call was cancelled.
    #[error("timed out after {timeout:?}")]
    Timeout {
        /// The deadline that was exceeded.
        timeout: Duration,
    },

    /// Provider reported a failure.
    #[error("execution failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// Execution was cancelled because the dispatcher is shutting down.
    #[error("execution cancelled")]
    Canceled,
}

impl ProviderError {
    /// Convenience constructor for [`ProviderError::Fail`].
    pub fn fail(error: impl Into<String>) -> Self {
        ProviderError::Fail {
            error: error.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use conductor::ProviderError;
    /// use std::time::Duration;
    ///
    /// let err = ProviderError::Timeout { timeout: Duration::from_secs(1) };
    /// assert_eq!(err.as_label(), "provider_timeout");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            ProviderError::Timeout { .. } => "provider_timeout",
            ProviderError::Fail { .. } => "provider_failed",
            ProviderError::Canceled => "provider_canceled",
        }
    }
}

/// # Errors returned to a command submitter.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// The command names neither a capability nor a mapped action.
    #[error("no capability for action '{action}'")]
    UnknownCapability {
        /// Declared action.
        action: String,
    },

    /// No provider for the capability is currently healthy.
    #[error("no healthy provider for capability '{capability}'")]
    NoHealthyProvider {
        /// Target capability.
        capability: String,
    },

    /// Execution failed on every attempted provider.
    #[error("command failed on capability '{capability}': {}", describe_attempts(attempts))]
    Failed {
        /// Target capability.
        capability: String,
        /// `(provider, error)` per attempt, in order; at most two entries.
        attempts: Vec<(String, ProviderError)>,
    },

    /// The named provider is not registered for the capability.
    #[error("provider '{provider}' is not registered for capability '{capability}'")]
    UnknownProvider {
        /// Target capability.
        capability: String,
        /// Provider name.
        provider: String,
    },

    /// The capability queue is full (`try_submit` only).
    #[error("capability '{capability}' queue is full")]
    Busy {
        /// Target capability.
        capability: String,
    },

    /// The dispatcher is no longer running.
    #[error("dispatcher closed")]
    Closed,
}

fn describe_attempts(attempts: &[(String, ProviderError)]) -> String {
    attempts
        .iter()
        .map(|(provider, err)| format!("{provider}: {err}"))
        .collect::<Vec<_>>()
        .join("; ")
}

impl DispatchError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            DispatchError::UnknownCapability { .. } => "dispatch_unknown_capability",
            DispatchError::NoHealthyProvider { .. } => "dispatch_no_healthy_provider",
            DispatchError::Failed { .. } => "dispatch_failed",
            DispatchError::UnknownProvider { .. } => "dispatch_unknown_provider",
            DispatchError::Busy { .. } => "dispatch_busy",
            DispatchError::Closed => "dispatch_closed",
        }
    }
}

/// # Rejected mode transition.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModeError {
    /// The table has no edge from the current mode to the requested one.
    #[error("mode {to} is unreachable from {from}")]
    Unreachable {
        /// Current mode.
        from: Mode,
        /// Requested mode.
        to: Mode,
    },

    /// The edge exists but its guard refused.
    #[error("transition {from} -> {to} rejected by guard '{guard}'")]
    GuardRejected {
        /// Current mode.
        from: Mode,
        /// Requested mode.
        to: Mode,
        /// Guard name.
        guard: String,
    },

    /// The mode machine is no longer running.
    #[error("mode machine closed")]
    Closed,
}

impl ModeError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ModeError::Unreachable { .. } => "mode_unreachable",
            ModeError::GuardRejected { .. } => "mode_guard_rejected",
            ModeError::Closed => "mode_closed",
        }
    }
}

/// # Failure reported by a bus handler.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct HandlerError {
    /// Human-readable failure description.
    pub message: String,
}

impl HandlerError {
    /// Creates a handler error from any message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// # Log sink failure.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SinkError {
    /// The sink target could not be opened or written.
    #[error("log sink i/o error on {target}: {source}")]
    Io {
        /// Sink target description (usually a path).
        target: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl SinkError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            SinkError::Io { .. } => "sink_io",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_failed_lists_every_attempt() {
        let err = DispatchError::Failed {
            capability: "music".into(),
            attempts: vec![
                ("streaming".into(), ProviderError::fail("offline")),
                (
                    "local".into(),
                    ProviderError::Timeout {
                        timeout: Duration::from_millis(50),
                    },
                ),
            ],
        };
        assert_eq!(
            err.to_string(),
            "command failed on capability 'music': streaming: execution failed: offline; local: timed out after 50ms"
        );
        assert_eq!(err.as_label(), "dispatch_failed");
    }

    #[test]
    fn only_fail_is_retryable() {
        assert!(ServiceError::fail("boom").is_retryable());
        assert!(!ServiceError::Fatal { error: "x".into() }.is_retryable());
        assert!(!ServiceError::Canceled.is_retryable());
    }

    #[test]
    fn supervisor_config_label_is_forwarded() {
        let err = SupervisorError::from(ConfigError::EmptyCapability("music".into()));
        assert_eq!(err.as_label(), "config_empty_capability");
    }
}
