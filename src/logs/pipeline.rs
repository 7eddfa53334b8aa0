//! # Log aggregation pipeline.
//!
//! ```text
//! LogHandle::submit ──► [ingest queue] ──┐
//! DiagnosticLayer (tracing) ──► submit ──┤
//! bus (log.raw, bus.*, system.*, ───────┴──► dedup ──► ring (last N) ──► log.entry
//!  failing service.health, command.failed)      │
//!                                               └──► pending ──(flush tick)──► LogSink
//! ```
//!
//! One task owns the dedup cache, the ring and the sink. Ingestion never
//! touches the sink; the flush tick writes pending entries in one batch.
//! A sink error drops the sink for the rest of the session (memory-only),
//! publishes `log.degraded` once and records an entry about it.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::dedup::Deduplicator;
use super::entry::{DedupKey, Level, LogEntry, RawDiagnostic};
use super::ring::LogRing;
use super::sink::{FileSink, LogSink};
use crate::config::PipelineConfig;
use crate::core::ServiceState;
use crate::error::SinkError;
use crate::events::{topics, Bus, Event, Listener, Payload, TopicPattern};

const ORIGIN: &str = "log-pipeline";

/// Topics that can carry a failure worth logging.
const DIAGNOSTIC_TOPICS: [&str; 5] = [
    topics::LOG_RAW,
    "bus.*",
    "system.*",
    topics::SERVICE_HEALTH,
    topics::COMMAND_FAILED,
];

/// Pipeline counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Entries accepted into the ring.
    pub accepted: u64,
    /// Entries suppressed as duplicates.
    pub suppressed: u64,
    /// Suppressed count per dedup key.
    pub suppressed_by_key: HashMap<DedupKey, u64>,
    /// Entries evicted from the ring by capacity pressure.
    pub evicted: u64,
    /// Entries written to the sink.
    pub flushed: u64,
    /// Diagnostics dropped before dedup (full ingest queue or pending backlog).
    pub dropped: u64,
    /// The sink failed; the pipeline is memory-only.
    pub degraded: bool,
}

struct Shared {
    ring: Mutex<LogRing>,
    stats: Mutex<PipelineStats>,
}

/// Cloneable entry point into the pipeline.
#[derive(Clone)]
pub struct LogHandle {
    session: Uuid,
    tx: mpsc::Sender<RawDiagnostic>,
    shared: Arc<Shared>,
}

impl LogHandle {
    /// Queues a diagnostic without waiting.
    ///
    /// Returns `false` (and counts a drop) if the ingest queue is full or the
    /// pipeline has stopped.
    pub fn submit(&self, raw: RawDiagnostic) -> bool {
        match self.tx.try_send(raw) {
            Ok(()) => true,
            Err(_) => {
                self.shared.stats.lock().dropped += 1;
                false
            }
        }
    }

    /// Up to `n` most recent entries, oldest first.
    pub fn recent(&self, n: usize) -> Vec<LogEntry> {
        self.shared.ring.lock().recent(n)
    }

    /// Number of entries currently held in the ring.
    pub fn len(&self) -> usize {
        self.shared.ring.lock().len()
    }

    /// Returns `true` if the ring is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> PipelineStats {
        self.shared.stats.lock().clone()
    }

    /// Session id stamped on every entry.
    pub fn session(&self) -> Uuid {
        self.session
    }
}

/// The pipeline task. Build with [`LogPipeline::new`] or [`LogPipeline::open`], then `run`.
pub struct LogPipeline {
    session: Uuid,
    bus: Bus,
    rx: mpsc::Receiver<RawDiagnostic>,
    listener: Listener,
    shared: Arc<Shared>,
    dedup: Deduplicator,
    pending: VecDeque<LogEntry>,
    max_pending: usize,
    flush_interval: Duration,
    sink: Option<Box<dyn LogSink>>,
}

impl LogPipeline {
    /// Creates a memory-only pipeline with a fresh session id.
    pub fn new(cfg: &PipelineConfig, bus: &Bus) -> (Self, LogHandle) {
        let session = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(cfg.ingest_capacity.max(1));
        let shared = Arc::new(Shared {
            ring: Mutex::new(LogRing::new(cfg.ring_capacity)),
            stats: Mutex::new(PipelineStats::default()),
        });
        let listener = bus.listen(
            TopicPattern::any_of(DIAGNOSTIC_TOPICS),
            ORIGIN,
            cfg.ingest_capacity.max(1),
        );

        let pipeline = Self {
            session,
            bus: bus.clone(),
            rx,
            listener,
            shared: Arc::clone(&shared),
            dedup: Deduplicator::new(cfg.dedup_window()),
            pending: VecDeque::new(),
            max_pending: cfg.max_pending.max(1),
            flush_interval: cfg.flush_interval(),
            sink: None,
        };
        let handle = LogHandle { session, tx, shared };
        (pipeline, handle)
    }

    /// Creates the pipeline and, if `log_dir` is set, the session file.
    pub async fn open(cfg: &PipelineConfig, bus: &Bus) -> (Self, LogHandle) {
        let (mut pipeline, handle) = Self::new(cfg, bus);
        if let Some(dir) = &cfg.log_dir {
            pipeline.open_session_file(dir).await;
        }
        (pipeline, handle)
    }

    /// Creates the session file under `dir` and makes it the sink.
    ///
    /// A file that cannot be created degrades the pipeline immediately.
    pub async fn open_session_file(&mut self, dir: &Path) {
        match FileSink::create(dir, self.session).await {
            Ok(sink) => {
                tracing::info!(path = %sink.path().display(), session = %self.session, "log session opened");
                self.sink = Some(Box::new(sink));
            }
            Err(err) => self.degrade(&err),
        }
    }

    /// Replaces the sink.
    pub fn with_sink(mut self, sink: Box<dyn LogSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Session id of this pipeline.
    pub fn session(&self) -> Uuid {
        self.session
    }

    /// Runs until `token` is cancelled, then drains queued input and flushes once more.
    pub async fn run(mut self, token: CancellationToken) {
        let mut flush = time::interval_at(Instant::now() + self.flush_interval, self.flush_interval);
        flush.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                Some(ev) = self.listener.recv() => {
                    if let Some(raw) = diagnostic_from(&ev) {
                        self.ingest(raw);
                    }
                }
                Some(raw) = self.rx.recv() => self.ingest(raw),
                _ = flush.tick() => {
                    self.dedup.prune(Instant::now());
                    tracing::trace!(keys = self.dedup.tracked(), "dedup window pruned");
                    self.flush().await;
                }
            }
        }

        while let Ok(raw) = self.rx.try_recv() {
            self.ingest(raw);
        }
        while let Some(ev) = self.listener.try_recv() {
            if let Some(raw) = diagnostic_from(&ev) {
                self.ingest(raw);
            }
        }
        self.flush().await;
        tracing::debug!(session = %self.session, "log pipeline stopped");
    }

    fn ingest(&mut self, raw: RawDiagnostic) {
        let entry = LogEntry::accept(raw, self.session);
        let key = entry.dedup_key();
        if !self.dedup.admit(&key, Instant::now()) {
            let mut stats = self.shared.stats.lock();
            stats.suppressed += 1;
            *stats.suppressed_by_key.entry(key).or_default() += 1;
            return;
        }

        let evicted = self.shared.ring.lock().push(entry.clone());
        let mut dropped = false;
        if self.sink.is_some() {
            if self.pending.len() >= self.max_pending {
                self.pending.pop_front();
                dropped = true;
            }
            self.pending.push_back(entry.clone());
        }
        {
            let mut stats = self.shared.stats.lock();
            stats.accepted += 1;
            stats.evicted += u64::from(evicted);
            stats.dropped += u64::from(dropped);
        }
        self.bus.publish(ORIGIN, Payload::LogEntry(entry));
    }

    async fn flush(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let Some(sink) = self.sink.as_mut() else {
            self.pending.clear();
            return;
        };
        let batch: Vec<LogEntry> = self.pending.drain(..).collect();
        match sink.write_batch(&batch).await {
            Ok(()) => {
                self.shared.stats.lock().flushed += batch.len() as u64;
                tracing::trace!(entries = batch.len(), "log batch flushed");
            }
            Err(err) => self.degrade(&err),
        }
    }

    fn degrade(&mut self, err: &SinkError) {
        {
            let mut stats = self.shared.stats.lock();
            if stats.degraded {
                return;
            }
            stats.degraded = true;
        }
        self.sink = None;
        self.pending.clear();

        let reason = err.to_string();
        tracing::warn!(error = %reason, label = err.as_label(), "log sink failed; continuing memory-only");
        self.bus.publish(ORIGIN, Payload::LogDegraded { reason: reason.clone() });
        self.ingest(RawDiagnostic::new(
            Level::Error,
            ORIGIN,
            format!("log sink degraded: {reason}"),
        ));
    }
}

/// Converts bus facts that describe failures into raw diagnostics.
fn diagnostic_from(ev: &Event) -> Option<RawDiagnostic> {
    let (level, service, message) = match &ev.payload {
        Payload::Diagnostic(raw) => return Some(raw.clone()),
        Payload::HandlerFailed {
            subscriber,
            topic,
            reason,
        } => (
            Level::Warn,
            "bus".to_string(),
            format!("handler '{subscriber}' failed on {topic}: {reason}"),
        ),
        Payload::SubscriberOverflow { subscriber, topic } => (
            Level::Warn,
            "bus".to_string(),
            format!("subscriber '{subscriber}' overflowed on {topic}"),
        ),
        Payload::SystemFatal { service, reason } => {
            (Level::Error, service.clone(), format!("fatal: {reason}"))
        }
        Payload::ServiceHealth {
            service,
            state,
            health,
            reason,
            ..
        } if *state == ServiceState::Error || health.is_failing() => {
            let level = if *state == ServiceState::Error {
                Level::Error
            } else {
                Level::Warn
            };
            let reason = reason.as_deref().unwrap_or("-");
            (level, service.clone(), format!("{state} ({health}): {reason}"))
        }
        Payload::CommandFailed {
            capability, reason, ..
        } => (
            Level::Warn,
            ev.origin.to_string(),
            format!("command on '{capability}' failed: {reason}"),
        ),
        _ => return None,
    };
    Some(RawDiagnostic {
        level,
        service,
        message,
        timestamp: DateTime::<Utc>::from(ev.at),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Health;
    use crate::events::topics;
    use crate::logs::MemorySink;
    use async_trait::async_trait;

    fn cfg(toml: &str) -> PipelineConfig {
        crate::config::KernelConfig::from_toml_str(toml)
            .expect("config")
            .pipeline
    }

    fn raw(service: &str, msg: &str) -> RawDiagnostic {
        RawDiagnostic::new(Level::Error, service, msg)
    }

    async fn settle(handle: &LogHandle, accepted_plus_suppressed: u64) {
        while {
            let s = handle.stats();
            s.accepted + s.suppressed < accepted_plus_suppressed
        } {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn identical_errors_are_stored_once() {
        let bus = Bus::new();
        let (pipeline, handle) = LogPipeline::new(&cfg(""), &bus);
        let token = CancellationToken::new();
        tokio::spawn(pipeline.run(token.clone()));

        for _ in 0..1000 {
            // Submit waits for queue space the way a producer loop would.
            while !handle.submit(raw("audio", "device lost")) {
                tokio::task::yield_now().await;
            }
        }
        settle(&handle, 1000).await;

        let stats = handle.stats();
        assert_eq!(stats.accepted, 1);
        assert_eq!(stats.suppressed, 999);
        let key = handle.recent(1)[0].dedup_key();
        assert_eq!(stats.suppressed_by_key.get(&key), Some(&999));
        assert_eq!(handle.len(), 1);
        token.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn window_reopens_per_key() {
        let bus = Bus::new();
        let (pipeline, handle) = LogPipeline::new(&cfg("[pipeline]\ndedup_window_ms = 1000"), &bus);
        tokio::spawn(pipeline.run(CancellationToken::new()));

        handle.submit(raw("audio", "x"));
        handle.submit(raw("audio", "x"));
        handle.submit(raw("video", "x"));
        settle(&handle, 3).await;
        assert_eq!(handle.stats().accepted, 2);

        time::sleep(Duration::from_millis(1_001)).await;
        handle.submit(raw("audio", "x"));
        settle(&handle, 4).await;
        assert_eq!(handle.stats().accepted, 3);
    }

    #[tokio::test]
    async fn ring_never_exceeds_capacity() {
        let bus = Bus::new();
        let (pipeline, handle) = LogPipeline::new(&cfg("[pipeline]\nring_capacity = 10"), &bus);
        tokio::spawn(pipeline.run(CancellationToken::new()));

        for i in 0..50 {
            handle.submit(raw("svc", &format!("m{i}")));
        }
        settle(&handle, 50).await;
        assert_eq!(handle.len(), 10);
        let stats = handle.stats();
        assert_eq!(stats.evicted, 40);
        assert_eq!(handle.recent(100).last().map(|e| e.message.as_str()), Some("m49"));
        assert!(handle.recent(100).iter().all(|e| e.session == handle.session()));
    }

    #[tokio::test(start_paused = true)]
    async fn flushes_in_batches_on_the_interval() {
        let bus = Bus::new();
        let sink = MemorySink::new();
        let (pipeline, handle) = LogPipeline::new(&cfg("[pipeline]\nflush_interval_ms = 100"), &bus);
        let pipeline = pipeline.with_sink(Box::new(sink.clone()));
        let token = CancellationToken::new();
        let task = tokio::spawn(pipeline.run(token.clone()));

        handle.submit(raw("a", "one"));
        handle.submit(raw("b", "two"));
        settle(&handle, 2).await;
        assert!(sink.lines().is_empty());

        time::sleep(Duration::from_millis(150)).await;
        assert_eq!(sink.lines().len(), 2);
        assert!(sink.lines()[0].ends_with(" ERROR a one"));

        handle.submit(raw("c", "three"));
        settle(&handle, 3).await;
        token.cancel();
        task.await.unwrap();
        assert_eq!(sink.lines().len(), 3);
        assert_eq!(handle.stats().flushed, 3);
    }

    struct BrokenSink;

    #[async_trait]
    impl LogSink for BrokenSink {
        fn target(&self) -> String {
            "broken".into()
        }

        async fn write_batch(&mut self, _batch: &[LogEntry]) -> Result<(), SinkError> {
            Err(SinkError::Io {
                target: "broken".into(),
                source: std::io::Error::other("disk full"),
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn sink_failure_degrades_once() {
        let bus = Bus::new();
        let mut degraded = bus.listen(topics::LOG_DEGRADED, "test", 8);
        let (pipeline, handle) = LogPipeline::new(&cfg("[pipeline]\nflush_interval_ms = 100"), &bus);
        let pipeline = pipeline.with_sink(Box::new(BrokenSink));
        tokio::spawn(pipeline.run(CancellationToken::new()));

        handle.submit(raw("a", "one"));
        time::sleep(Duration::from_millis(150)).await;
        handle.submit(raw("a", "two"));
        time::sleep(Duration::from_millis(150)).await;

        assert!(handle.stats().degraded);
        assert!(degraded.try_recv().is_some());
        assert!(degraded.try_recv().is_none());
        // Ingestion continues in memory.
        let messages: Vec<_> = handle.recent(10).into_iter().map(|e| e.message).collect();
        assert!(messages.contains(&"two".to_string()));
        assert!(messages.iter().any(|m| m.starts_with("log sink degraded")));
    }

    #[tokio::test]
    async fn session_file_receives_flushed_lines() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = PipelineConfig::default();
        cfg.log_dir = Some(dir.path().to_path_buf());
        let bus = Bus::new();
        let (pipeline, handle) = LogPipeline::open(&cfg, &bus).await;
        let token = CancellationToken::new();
        let task = tokio::spawn(pipeline.run(token.clone()));

        handle.submit(raw("audio", "device lost"));
        settle(&handle, 1).await;
        token.cancel();
        task.await.unwrap();

        let file = std::fs::read_dir(dir.path()).unwrap().next().unwrap().unwrap().path();
        let text = std::fs::read_to_string(file).unwrap();
        assert!(text.trim_end().ends_with("ERROR audio device lost"));
        assert_eq!(handle.stats().flushed, 1);
    }

    #[tokio::test]
    async fn unwritable_log_dir_degrades_at_open() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("not-a-dir");
        std::fs::write(&file, b"x").unwrap();
        let mut cfg = PipelineConfig::default();
        cfg.log_dir = Some(file.join("logs"));

        let bus = Bus::new();
        let (_pipeline, handle) = LogPipeline::open(&cfg, &bus).await;
        let stats = handle.stats();
        assert!(stats.degraded);
        assert_eq!(stats.accepted, 1);
    }

    #[tokio::test]
    async fn bus_failures_become_entries() {
        let bus = Bus::new();
        let (pipeline, handle) = LogPipeline::new(&cfg(""), &bus);
        let mut entries = bus.listen(topics::LOG_ENTRY, "test", 8);
        tokio::spawn(pipeline.run(CancellationToken::new()));

        bus.publish("audio", Payload::Diagnostic(raw("audio", "raw over bus")));
        bus.publish(
            "supervisor",
            Payload::ServiceHealth {
                service: "audio".into(),
                state: ServiceState::Running,
                health: Health::Healthy,
                restart_count: 0,
                reason: None,
            },
        );
        bus.publish(
            "supervisor",
            Payload::SystemFatal {
                service: "audio".into(),
                reason: "restart budget exhausted".into(),
            },
        );

        let first = entries.recv().await.expect("entry");
        let second = entries.recv().await.expect("entry");
        match (&first.payload, &second.payload) {
            (Payload::LogEntry(a), Payload::LogEntry(b)) => {
                assert_eq!(a.message, "raw over bus");
                assert_eq!(b.message, "fatal: restart budget exhausted");
                assert_eq!(b.level, Level::Error);
            }
            other => panic!("unexpected payloads: {other:?}"),
        }
        assert_eq!(handle.len(), 2);
    }

    #[tokio::test]
    async fn chatter_topics_do_not_crowd_out_failures() {
        let bus = Bus::new();
        let (pipeline, handle) = LogPipeline::new(&cfg("[pipeline]\ningest_capacity = 4"), &bus);

        for _ in 0..16 {
            bus.publish("audio", Payload::ServiceLiveness { service: "audio".into() });
            bus.publish("log-pipeline", Payload::LogEntry(LogEntry::accept(raw("audio", "echo"), handle.session())));
        }
        bus.publish(
            "supervisor",
            Payload::SystemFatal {
                service: "audio".into(),
                reason: "restart budget exhausted".into(),
            },
        );

        let token = CancellationToken::new();
        let run = tokio::spawn(pipeline.run(token.clone()));
        token.cancel();
        run.await.expect("pipeline task");

        let recent = handle.recent(10);
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].message, "fatal: restart budget exhausted");
    }
}
