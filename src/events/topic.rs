//! # Topics and subscription patterns.
//!
//! Topics are hierarchical, dot-separated names (`service.health`,
//! `mode.changed`). Every payload schema has exactly one canonical topic,
//! listed in [`topics`].
//!
//! Subscriptions use a [`TopicPattern`]:
//! ```text
//! "mode.changed"   exact match only
//! "service.*"      any topic below `service.` (any depth)
//! "*"              every topic
//! ```
//!
//! [`TopicPattern::any_of`] combines patterns into one subscription.

use std::fmt;
use std::sync::Arc;

/// Canonical topic names.
pub mod topics {
    /// Request to change the operating mode (input to the mode machine).
    pub const MODE_REQUESTED: &str = "mode.requested";
    /// An accepted mode change (fact).
    pub const MODE_CHANGED: &str = "mode.changed";
    /// A rejected bus mode request.
    pub const MODE_REJECTED: &str = "mode.rejected";

    /// Command submitted through the bus (input to the dispatcher).
    pub const COMMAND_SUBMITTED: &str = "command.submitted";
    /// Command completed on a provider.
    pub const COMMAND_RESULT: &str = "command.result";
    /// Command failed on every attempted provider.
    pub const COMMAND_FAILED: &str = "command.failed";

    /// Active provider of a capability changed.
    pub const PROVIDER_CHANGED: &str = "provider.changed";
    /// Provider health check outcome changed.
    pub const PROVIDER_HEALTH: &str = "provider.health";

    /// Periodic liveness beat emitted by a service.
    pub const SERVICE_LIVENESS: &str = "service.liveness";
    /// Service lifecycle/health transition.
    pub const SERVICE_HEALTH: &str = "service.health";

    /// Unrecoverable kernel condition.
    pub const SYSTEM_FATAL: &str = "system.fatal";

    /// Raw diagnostic record (input to the log pipeline).
    pub const LOG_RAW: &str = "log.raw";
    /// Accepted log entry (fact).
    pub const LOG_ENTRY: &str = "log.entry";
    /// Log sink became unwritable; pipeline is memory-only.
    pub const LOG_DEGRADED: &str = "log.degraded";

    /// A bus handler returned an error or panicked.
    pub const BUS_HANDLER_FAILED: &str = "bus.handler_failed";
    /// An event was dropped for one subscriber because its queue was full.
    pub const BUS_OVERFLOW: &str = "bus.overflow";
}

/// Subscription filter over topic names.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TopicPattern {
    /// Matches every topic.
    All,
    /// Matches topics starting with the stored prefix (which ends with `.`).
    Prefix(Arc<str>),
    /// Matches one topic exactly.
    Exact(Arc<str>),
    /// Matches if any of the inner patterns does.
    AnyOf(Arc<[TopicPattern]>),
}

impl TopicPattern {
    /// Parses a pattern string.
    ///
    /// # Example
    /// ```
    /// use conductor::TopicPattern;
    ///
    /// let p = TopicPattern::parse("service.*");
    /// assert!(p.matches("service.health"));
    /// assert!(p.matches("service.audio.liveness"));
    /// assert!(!p.matches("services.health"));
    /// assert!(!p.matches("service"));
    /// ```
    pub fn parse(pattern: &str) -> Self {
        if pattern == "*" {
            return TopicPattern::All;
        }
        match pattern.strip_suffix('*') {
            Some(prefix) if prefix.ends_with('.') => TopicPattern::Prefix(prefix.into()),
            _ => TopicPattern::Exact(pattern.into()),
        }
    }

    /// Combines several patterns; an event matching more than one is still delivered once.
    pub fn any_of<I, P>(patterns: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<TopicPattern>,
    {
        TopicPattern::AnyOf(patterns.into_iter().map(Into::into).collect())
    }

    /// Returns true if `topic` is covered by this pattern.
    pub fn matches(&self, topic: &str) -> bool {
        match self {
            TopicPattern::All => true,
            TopicPattern::Prefix(prefix) => topic.starts_with(&**prefix),
            TopicPattern::Exact(exact) => topic == &**exact,
            TopicPattern::AnyOf(patterns) => patterns.iter().any(|p| p.matches(topic)),
        }
    }
}

impl From<&str> for TopicPattern {
    fn from(pattern: &str) -> Self {
        TopicPattern::parse(pattern)
    }
}

impl fmt::Display for TopicPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TopicPattern::All => f.write_str("*"),
            TopicPattern::Prefix(prefix) => write!(f, "{prefix}*"),
            TopicPattern::Exact(exact) => f.write_str(exact),
            TopicPattern::AnyOf(patterns) => {
                for (i, p) in patterns.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{p}")?;
                }
                Ok(())
            }
        }
    }
}
