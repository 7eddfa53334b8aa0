//! # `tracing` bridge.
//!
//! [`DiagnosticLayer`] forwards `tracing` events at or above a minimum level
//! into the pipeline as [`RawDiagnostic`]s. The event target becomes the
//! service name; the `message` field plus any other fields become the message
//! (`"device lost retries=3"`). Events emitted by the pipeline itself are
//! skipped so its own reporting never feeds back into it.

use std::fmt::{self, Write as _};

use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{fmt as fmt_layer, EnvFilter, Layer};

use super::entry::{Level, RawDiagnostic};
use super::pipeline::LogHandle;

const SELF_TARGET: &str = "conductor::logs";

/// `tracing` layer that feeds the log pipeline.
pub struct DiagnosticLayer {
    handle: LogHandle,
    min_level: Level,
}

impl DiagnosticLayer {
    /// Forwards events at `info` and above.
    pub fn new(handle: LogHandle) -> Self {
        Self {
            handle,
            min_level: Level::Info,
        }
    }

    /// Changes the minimum forwarded level.
    pub fn with_min_level(mut self, level: Level) -> Self {
        self.min_level = level;
        self
    }
}

impl<S: Subscriber> Layer<S> for DiagnosticLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        let level = Level::from(meta.level());
        if level < self.min_level || meta.target().starts_with(SELF_TARGET) {
            return;
        }
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        self.handle
            .submit(RawDiagnostic::new(level, meta.target(), visitor.finish()));
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl MessageVisitor {
    fn finish(self) -> String {
        match (self.message.is_empty(), self.fields.is_empty()) {
            (_, true) => self.message,
            (true, false) => self.fields,
            (false, false) => format!("{} {}", self.message, self.fields),
        }
    }
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            self.record_debug(field, &value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{value:?}");
            return;
        }
        if !self.fields.is_empty() {
            self.fields.push(' ');
        }
        let _ = write!(self.fields, "{}={value:?}", field.name());
    }
}

/// Installs a global subscriber: an `fmt` layer filtered by `RUST_LOG`
/// (default `info`) plus a [`DiagnosticLayer`] feeding `handle`.
///
/// Fails if a global subscriber is already set.
pub fn install_tracing(handle: LogHandle) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(fmt_layer::layer().with_target(true).with_filter(filter))
        .with(DiagnosticLayer::new(handle))
        .try_init()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::events::Bus;
    use crate::logs::LogPipeline;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn forwards_events_at_or_above_min_level() {
        let bus = Bus::new();
        let (pipeline, handle) = LogPipeline::new(&PipelineConfig::default(), &bus);
        tokio::spawn(pipeline.run(CancellationToken::new()));

        let subscriber = tracing_subscriber::registry().with(DiagnosticLayer::new(handle.clone()));
        tracing::subscriber::with_default(subscriber, || {
            tracing::debug!(target: "audio", "too quiet");
            tracing::warn!(target: "audio", retries = 3, "device lost");
            tracing::error!(target: "conductor::logs::pipeline", "own report");
        });

        while handle.stats().accepted < 1 {
            tokio::task::yield_now().await;
        }
        let entries = handle.recent(10);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].service, "audio");
        assert_eq!(entries[0].level, Level::Warn);
        assert_eq!(entries[0].message, "device lost retries=3");
    }
}
