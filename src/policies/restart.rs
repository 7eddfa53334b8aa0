//! # Restart budget of a service.
//!
//! A service that fails after reaching `Running` (run error, panic, or missed
//! liveness) is restarted while its budget lasts. Once the budget is spent the
//! supervisor escalates with `system.fatal`.
//!
//! ```rust
//! use conductor::RestartPolicy;
//!
//! let policy = RestartPolicy::with_budget(2);
//! assert!(policy.allows(0));
//! assert!(policy.allows(1));
//! assert!(!policy.allows(2));
//! assert!(!RestartPolicy::Never.allows(0));
//! ```

/// Whether (and how often) a failed service is restarted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RestartPolicy {
    /// A failure is escalated immediately.
    Never,
    /// Restart on failure, at most `max_restarts` times over the service lifetime.
    OnFailure {
        /// Restarts allowed before escalation.
        max_restarts: u32,
    },
}

impl Default for RestartPolicy {
    /// Returns `OnFailure { max_restarts: 3 }`.
    fn default() -> Self {
        RestartPolicy::OnFailure { max_restarts: 3 }
    }
}

impl RestartPolicy {
    /// Builds a policy from a restart budget (`0` → [`RestartPolicy::Never`]).
    pub fn with_budget(max_restarts: u32) -> Self {
        match max_restarts {
            0 => RestartPolicy::Never,
            n => RestartPolicy::OnFailure { max_restarts: n },
        }
    }

    /// Returns `true` if another restart is allowed after `performed` restarts.
    pub fn allows(&self, performed: u32) -> bool {
        match self {
            RestartPolicy::Never => false,
            RestartPolicy::OnFailure { max_restarts } => performed < *max_restarts,
        }
    }

    /// Restart budget (`0` for [`RestartPolicy::Never`]).
    pub fn budget(&self) -> u32 {
        match self {
            RestartPolicy::Never => 0,
            RestartPolicy::OnFailure { max_restarts } => *max_restarts,
        }
    }
}
