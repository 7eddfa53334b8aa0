//! Diagnostic records and accepted log entries.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Severity of a diagnostic, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    /// Very verbose tracing.
    Trace,
    /// Debugging detail.
    Debug,
    /// Normal operation.
    Info,
    /// Something unexpected that was handled.
    Warn,
    /// A failure.
    Error,
}

impl Level {
    /// Uppercase name used in sink lines.
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "TRACE",
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&tracing::Level> for Level {
    fn from(level: &tracing::Level) -> Self {
        match *level {
            tracing::Level::TRACE => Level::Trace,
            tracing::Level::DEBUG => Level::Debug,
            tracing::Level::INFO => Level::Info,
            tracing::Level::WARN => Level::Warn,
            tracing::Level::ERROR => Level::Error,
        }
    }
}

/// A diagnostic as produced by a service, before dedup and session stamping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDiagnostic {
    /// Severity.
    pub level: Level,
    /// Producing service (or component) name.
    pub service: String,
    /// Message text.
    pub message: String,
    /// When the diagnostic was produced.
    pub timestamp: DateTime<Utc>,
}

impl RawDiagnostic {
    /// Creates a diagnostic stamped with the current time.
    pub fn new(level: Level, service: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            service: service.into(),
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Identity used for duplicate suppression.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    /// Service name.
    pub service: String,
    /// Severity.
    pub level: Level,
    /// Message text.
    pub message: String,
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.service, self.level, self.message)
    }
}

/// An accepted, immutable log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// When the diagnostic was produced.
    pub timestamp: DateTime<Utc>,
    /// Severity.
    pub level: Level,
    /// Producing service.
    pub service: String,
    /// Message text.
    pub message: String,
    /// Session the entry was accepted in.
    pub session: Uuid,
}

impl LogEntry {
    pub(crate) fn accept(raw: RawDiagnostic, session: Uuid) -> Self {
        Self {
            timestamp: raw.timestamp,
            level: raw.level,
            service: raw.service,
            message: raw.message,
            session,
        }
    }

    /// Key under which duplicates of this entry are suppressed.
    pub fn dedup_key(&self) -> DedupKey {
        DedupKey {
            service: self.service.clone(),
            level: self.level,
            message: self.message.clone(),
        }
    }

    /// Renders the sink line: `<rfc3339 timestamp> <LEVEL> <service> <message>`.
    ///
    /// Line breaks inside the message are escaped so one entry stays one line.
    pub fn to_line(&self) -> String {
        format!(
            "{} {} {} {}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.level,
            self.service,
            self.message.replace('\n', "\\n")
        )
    }
}
