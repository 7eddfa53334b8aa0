//! # conductor
//!
//! **Conductor** is an event-driven orchestration kernel for long-running,
//! multi-service applications (voice assistants, kiosks, installations).
//!
//! It wires five components around one typed event bus:
//!
//! ```text
//!                         ┌───────────────────────────────┐
//!  services ─────────────►│                               │◄──── mode.requested
//!  (ServiceContext)       │          Bus (topics)         │◄──── command.submitted
//!                         │                               │◄──── log.raw
//!                         └──┬──────────┬──────────┬──────┘
//!                            ▼          ▼          ▼
//!                     Supervisor   ModeMachine   Dispatcher ──► CapabilityWorker ──► Provider
//!                   (start order,  (transition   (per-capability      (priority list,
//!                    liveness,      table,        FIFO)                fallback once)
//!                    restarts)      guards)
//!                            │          │          │
//!                            └──────────┴────┬─────┘
//!                                            ▼
//!                                      LogPipeline ──► ring (last N) + session file
//!                                  (dedup per key)
//! ```
//!
//! ## Lifecycle
//! ```text
//! Kernel::builder(cfg) ─► build()  registrations checked against config
//!                    └─► start()   log pipeline, subscribers, mode machine, dispatcher,
//!                                  then services in dependency order
//!                    └─► run_until_shutdown()
//!                           ├─ SIGINT/SIGTERM ─► shutdown() ─► Ok
//!                           └─ system.fatal   ─► shutdown() ─► Err(SupervisorError::Fatal)
//! ```
//!
//! ## Guarantees
//! - Every event carries a process-wide `seq`; each subscription sees events in `seq` order.
//! - A service starts only after all its dependencies are `Running`.
//! - Exactly one mode is active; `mode.changed` is published before the requester is answered.
//! - Commands of one capability run one at a time, in submission order; a failed
//!   provider is retried on at most one alternative.
//! - The log ring never holds more than `ring_capacity` entries; identical entries
//!   within the dedup window are counted, not stored.
//!
//! ## Example
//! ```rust,no_run
//! use conductor::{Command, Kernel, KernelConfig, Mode, ProviderFn, ServiceFn};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cfg = KernelConfig::from_toml_str(
//!         r#"
//!         [services.audio]
//!
//!         [capabilities.music]
//!         providers = ["streaming", "local"]
//!
//!         [actions]
//!         play = "music"
//!         "#,
//!     )?;
//!
//!     let audio = ServiceFn::arc("audio", |ctx| async move {
//!         ctx.ready();
//!         ctx.heartbeat_until_cancelled().await;
//!         Ok(())
//!     });
//!     let streaming = ProviderFn::arc("streaming", ["music"], |_cmd, _token| async move {
//!         Err(conductor::ProviderError::fail("offline"))
//!     });
//!     let local = ProviderFn::arc("local", ["music"], |cmd, _token| async move {
//!         Ok(json!({ "playing": cmd.parameters }))
//!     });
//!
//!     let mut kernel = Kernel::builder(cfg)
//!         .with_service(audio)
//!         .with_provider(streaming)
//!         .with_provider(local)
//!         .build()?;
//!     kernel.start().await?;
//!
//!     kernel.modes().request_mode(Mode::Ambient).await?;
//!     let out = kernel.dispatcher().execute(Command::new("play")).await?;
//!     assert_eq!(out.provider, "local");
//!
//!     kernel.run_until_shutdown().await?;
//!     Ok(())
//! }
//! ```

mod config;
mod core;
mod dispatch;
mod error;
mod events;
mod kernel;
mod logs;
mod mode;
mod policies;
mod services;
mod subscribers;

// ---- Public re-exports ----

pub use config::{
    BackoffConfig, BusConfig, CapabilityConfig, CapabilitySettings, DispatchConfig, KernelConfig,
    ModeRule, ModesConfig, PipelineConfig, ServiceConfig, ServiceSettings, StickyScope,
    SupervisorConfig,
};
pub use core::{wait_for_shutdown_signal, FatalReport, Health, ServiceDescriptor, ServiceState, Supervisor};
pub use dispatch::{
    AttemptReport, Command, CommandOutcome, Dispatcher, DispatcherHandle, HealthBoard, InFlight,
    InFlightTicket, PendingCommand, Provider, ProviderFn, ProviderRef, SwitchReason,
};
pub use error::{
    ConfigError, DispatchError, HandlerError, ModeError, ProviderError, ServiceError, SinkError,
    SupervisorError,
};
pub use events::{topics, Bus, Event, Listener, Payload, SubscriptionId, TopicPattern, SCHEMA_VERSION};
pub use kernel::{Kernel, KernelBuilder};
pub use logs::{
    install_tracing, DedupKey, DiagnosticLayer, FileSink, Level, LogEntry, LogHandle, LogPipeline,
    LogSink, MemorySink, PipelineStats, RawDiagnostic,
};
pub use mode::{
    GuardRegistry, Mode, ModeGuard, ModeHandle, ModeMachine, ModeTransition, NoDispatchInFlight,
    TransitionTable,
};
pub use policies::{BackoffPolicy, JitterPolicy, RestartPolicy};
pub use services::{Service, ServiceContext, ServiceFn, ServiceRef};
pub use subscribers::{HandlerFn, LogWriter, Subscribe};
