//! # Kernel: wiring and lifecycle of every component.
//!
//! ```text
//! Kernel::builder(cfg)
//!   .with_service(..) .with_provider(..) .with_guard(..) .with_subscriber(..)
//!   .build()?                       registrations checked against cfg
//!
//! start():    log pipeline ─► bus subscribers ─► mode machine ─► dispatcher ─► supervisor
//! shutdown(): supervisor ─► dispatcher ─► mode machine ─► bus subscribers ─► log pipeline
//! ```
//!
//! [`Kernel::run_until_shutdown`] waits for an OS signal or a fatal service
//! failure, then shuts down in reverse order.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::KernelConfig;
use crate::core::{wait_for_shutdown_signal, Supervisor};
use crate::dispatch::{Dispatcher, DispatcherHandle, ProviderRef};
use crate::error::{ConfigError, SupervisorError};
use crate::events::{Bus, SubscriptionId, TopicPattern};
use crate::logs::{LogHandle, LogPipeline, LogSink};
use crate::mode::{GuardRegistry, ModeGuard, ModeHandle, ModeMachine, NoDispatchInFlight, TransitionTable};
use crate::services::ServiceRef;
use crate::subscribers::{LogWriter, Subscribe};

/// Collects registrations for a [`Kernel`].
pub struct KernelBuilder {
    cfg: KernelConfig,
    services: Vec<ServiceRef>,
    providers: Vec<ProviderRef>,
    guards: Vec<Arc<dyn ModeGuard>>,
    subscribers: Vec<(TopicPattern, Arc<dyn Subscribe>)>,
    log_sink: Option<Box<dyn LogSink>>,
}

impl KernelBuilder {
    /// Registers a supervised service; its name must appear under `[services]`.
    pub fn with_service(mut self, service: ServiceRef) -> Self {
        self.services.push(service);
        self
    }

    /// Registers a provider; its name must appear in some capability's provider list.
    pub fn with_provider(mut self, provider: ProviderRef) -> Self {
        self.providers.push(provider);
        self
    }

    /// Registers a transition guard under its own name.
    pub fn with_guard(mut self, guard: Arc<dyn ModeGuard>) -> Self {
        self.guards.push(guard);
        self
    }

    /// Subscribes `handler` to `pattern` when the kernel starts.
    pub fn with_subscriber(mut self, pattern: impl Into<TopicPattern>, handler: Arc<dyn Subscribe>) -> Self {
        self.subscribers.push((pattern.into(), handler));
        self
    }

    /// Replaces the session file sink (and ignores `pipeline.log_dir`).
    pub fn with_log_sink(mut self, sink: Box<dyn LogSink>) -> Self {
        self.log_sink = Some(sink);
        self
    }

    /// Validates registrations against the configuration and assembles the kernel.
    ///
    /// Nothing is spawned until [`Kernel::start`].
    pub fn build(self) -> Result<Kernel, ConfigError> {
        self.cfg.validate()?;
        let bus = Bus::new();

        let (pipeline, logs) = LogPipeline::new(&self.cfg.pipeline, &bus);
        let (dispatcher, dispatch) = Dispatcher::new(&self.cfg, &bus, self.providers)?;

        let mut guards = GuardRegistry::new();
        guards.register(Arc::new(NoDispatchInFlight::new(dispatch.in_flight())));
        for guard in self.guards {
            guards.register(guard);
        }
        let table = TransitionTable::from_config(&self.cfg.modes, &guards)?;
        let (machine, modes) = ModeMachine::new(table, self.cfg.modes.initial, &bus, self.cfg.bus.queue_capacity);

        let supervisor = Supervisor::new(&self.cfg, &bus, self.services)?;

        Ok(Kernel {
            cfg: self.cfg,
            bus,
            pending: Some(Pending {
                pipeline,
                machine,
                dispatcher,
                subscribers: self.subscribers,
                log_sink: self.log_sink,
            }),
            supervisor,
            logs,
            modes,
            dispatch,
            tasks: Vec::new(),
            subscriptions: Vec::new(),
        })
    }
}

struct Pending {
    pipeline: LogPipeline,
    machine: ModeMachine,
    dispatcher: Dispatcher,
    subscribers: Vec<(TopicPattern, Arc<dyn Subscribe>)>,
    log_sink: Option<Box<dyn LogSink>>,
}

struct Task {
    name: &'static str,
    token: CancellationToken,
    join: JoinHandle<()>,
}

/// The assembled orchestration kernel.
pub struct Kernel {
    cfg: KernelConfig,
    bus: Bus,
    pending: Option<Pending>,
    supervisor: Supervisor,
    logs: LogHandle,
    modes: ModeHandle,
    dispatch: DispatcherHandle,
    tasks: Vec<Task>,
    subscriptions: Vec<SubscriptionId>,
}

impl Kernel {
    /// Starts a builder over `cfg`.
    pub fn builder(cfg: KernelConfig) -> KernelBuilder {
        KernelBuilder {
            cfg,
            services: Vec::new(),
            providers: Vec::new(),
            guards: Vec::new(),
            subscribers: Vec::new(),
            log_sink: None,
        }
    }

    /// Brings every component up in order; services last, in dependency order.
    ///
    /// If a service fails to start, the components already running are shut
    /// down and [`SupervisorError::StartupBlocked`] is returned. Calling
    /// `start` twice is a no-op.
    pub async fn start(&mut self) -> Result<(), SupervisorError> {
        let Some(pending) = self.pending.take() else {
            return Ok(());
        };
        let Pending {
            mut pipeline,
            machine,
            dispatcher,
            subscribers,
            log_sink,
        } = pending;

        match (log_sink, &self.cfg.pipeline.log_dir) {
            (Some(sink), _) => pipeline = pipeline.with_sink(sink),
            (None, Some(dir)) => pipeline.open_session_file(dir).await,
            (None, None) => {}
        }
        self.spawn("log-pipeline", |token| pipeline.run(token));

        if self.cfg.bus.trace_events {
            self.subscriptions.push(self.bus.subscribe("*", Arc::new(LogWriter::new())));
        }
        for (pattern, handler) in subscribers {
            self.subscriptions.push(self.bus.subscribe(pattern, handler));
        }

        self.spawn("mode-machine", |token| machine.run(token));
        self.spawn("dispatcher", |token| dispatcher.run(token));

        tracing::info!(mode = %self.modes.current(), session = %self.logs.session(), "kernel starting services");
        if let Err(err) = self.supervisor.start().await {
            self.stop_components().await;
            return Err(err);
        }
        tracing::info!(order = ?self.supervisor.start_order(), "kernel started");
        Ok(())
    }

    /// Waits for a shutdown signal or a fatal service failure, then shuts down.
    ///
    /// Returns the fatal error if one caused the shutdown.
    pub async fn run_until_shutdown(&mut self) -> Result<(), SupervisorError> {
        let fatal = tokio::select! {
            res = wait_for_shutdown_signal() => {
                if let Err(err) = res {
                    tracing::warn!(error = %err, "signal handling failed; shutting down");
                }
                None
            }
            err = self.supervisor.wait_fatal() => Some(err),
        };
        let stopped = self.shutdown().await;
        match fatal {
            Some(err) => {
                tracing::error!(error = %err, label = err.as_label(), "kernel stopped after fatal failure");
                Err(err)
            }
            None => stopped,
        }
    }

    /// Stops services (reverse dependency order, within the grace period),
    /// then the dispatcher, the mode machine, subscribers and the log pipeline.
    pub async fn shutdown(&mut self) -> Result<(), SupervisorError> {
        let res = self.supervisor.shutdown().await;
        self.stop_components().await;
        tracing::info!("kernel stopped");
        res
    }

    async fn stop_components(&mut self) {
        while let Some(task) = self.tasks.pop() {
            if task.name == "log-pipeline" {
                for id in self.subscriptions.drain(..) {
                    self.bus.unsubscribe(id);
                }
            }
            task.token.cancel();
            if let Err(err) = task.join.await {
                tracing::warn!(component = task.name, error = %err, "component task ended abnormally");
            }
        }
    }

    fn spawn<F, Fut>(&mut self, name: &'static str, run: F)
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let join = tokio::spawn(run(token.clone()));
        self.tasks.push(Task { name, token, join });
    }

    /// The process event bus.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Mode control.
    pub fn modes(&self) -> &ModeHandle {
        &self.modes
    }

    /// Command submission and provider state.
    pub fn dispatcher(&self) -> &DispatcherHandle {
        &self.dispatch
    }

    /// Log pipeline access.
    pub fn logs(&self) -> &LogHandle {
        &self.logs
    }

    /// Service supervisor (descriptors, start order).
    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    /// Effective configuration.
    pub fn config(&self) -> &KernelConfig {
        &self.cfg
    }
}
