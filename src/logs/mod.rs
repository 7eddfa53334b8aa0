//! Log aggregation: dedup, a bounded in-memory ring, and batched session sinks.
//!
//! ## Contents
//! - [`RawDiagnostic`], [`LogEntry`], [`Level`] - records before and after acceptance
//! - [`LogPipeline`], [`LogHandle`], [`PipelineStats`] - the collection task and its accessors
//! - [`LogSink`], [`FileSink`], [`MemorySink`] - flush targets
//! - [`DiagnosticLayer`], [`install_tracing`] - `tracing` integration

mod dedup;
mod entry;
mod layer;
mod pipeline;
mod ring;
mod sink;

pub use entry::{DedupKey, Level, LogEntry, RawDiagnostic};
pub use layer::{install_tracing, DiagnosticLayer};
pub use pipeline::{LogHandle, LogPipeline, PipelineStats};
pub use sink::{FileSink, LogSink, MemorySink};
