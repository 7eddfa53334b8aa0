//! # Kernel configuration.
//!
//! Provides [`KernelConfig`], the declarative startup surface:
//! - `[services.<name>]` - dependencies and per-service supervision overrides
//! - `[capabilities.<name>]` - ordered provider list (first = highest priority)
//! - `[actions]` - action name → capability
//! - `[modes]` - initial mode and the transition table
//! - `[pipeline]` - log ring size, dedup window, flush interval, sink directory
//! - `[bus]`, `[supervisor]`, `[dispatch]` - runtime tunables
//!
//! Durations are written as `*_ms` integers; use the accessor methods to get
//! [`Duration`]s. `0` is a sentinel where documented (e.g. disabled health checks).
//!
//! ## Example
//! ```rust
//! use conductor::{KernelConfig, Mode};
//!
//! let cfg = KernelConfig::from_toml_str(r#"
//!     [services.audio]
//!     [services.voice]
//!     depends_on = ["audio"]
//!
//!     [capabilities.music]
//!     providers = ["local", "streaming"]
//!
//!     [actions]
//!     play = "music"
//!
//!     [modes]
//!     initial = "idle"
//!     [modes.transitions.idle]
//!     allowed = ["interactive"]
//!     [modes.transitions.interactive]
//!     allowed = ["idle"]
//!
//!     [pipeline]
//!     ring_capacity = 100
//! "#).unwrap();
//!
//! assert_eq!(cfg.capabilities["music"].providers, ["local", "streaming"]);
//! assert_eq!(cfg.modes.initial, Mode::Idle);
//! assert_eq!(cfg.pipeline.ring_capacity, 100);
//! ```

mod validate;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::mode::Mode;
use crate::policies::{BackoffPolicy, JitterPolicy, RestartPolicy};

/// Complete kernel configuration.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KernelConfig {
    /// Event bus tunables.
    #[serde(default)]
    pub bus: BusConfig,
    /// Supervision defaults.
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    /// Service name → dependencies and overrides.
    #[serde(default)]
    pub services: BTreeMap<String, ServiceConfig>,
    /// Dispatcher tunables.
    #[serde(default)]
    pub dispatch: DispatchConfig,
    /// Capability → providers.
    #[serde(default)]
    pub capabilities: BTreeMap<String, CapabilityConfig>,
    /// Action → capability.
    #[serde(default)]
    pub actions: BTreeMap<String, String>,
    /// Mode table.
    #[serde(default)]
    pub modes: ModesConfig,
    /// Log pipeline tunables.
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

impl KernelConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let cfg: KernelConfig = toml::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reads, parses and validates a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "loading kernel config");
        Self::from_toml_str(&text)
    }

    /// Runs every static check (dependency graph, mode table, capabilities, tunables).
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate::validate(self)
    }
}

/// Event bus tunables.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BusConfig {
    /// Queue capacity for the kernel's own subscriptions (min 1).
    pub queue_capacity: usize,
    /// Attach a [`LogWriter`](crate::LogWriter) tracing every event.
    pub trace_events: bool,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            trace_events: false,
        }
    }
}

/// Supervision defaults; each may be overridden per service.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SupervisorConfig {
    /// Time a service has to reach `Running`.
    pub start_timeout_ms: u64,
    /// Expected interval between liveness beats.
    pub liveness_interval_ms: u64,
    /// Consecutive missed beats before a service is marked `Error`.
    pub liveness_misses: u32,
    /// Automatic restarts before escalation (`0` = never restart).
    pub max_restarts: u32,
    /// Time to wait for all services to stop on shutdown.
    pub grace_ms: u64,
    /// Restart delay policy.
    pub backoff: BackoffConfig,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            start_timeout_ms: 5_000,
            liveness_interval_ms: 1_000,
            liveness_misses: 3,
            max_restarts: 3,
            grace_ms: 10_000,
            backoff: BackoffConfig::default(),
        }
    }
}

impl SupervisorConfig {
    /// Shutdown grace period.
    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.grace_ms)
    }
}

/// Restart backoff in configuration form.
#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackoffConfig {
    /// First restart delay.
    pub first_ms: u64,
    /// Delay cap.
    pub max_ms: u64,
    /// Growth factor per restart.
    pub factor: f64,
    /// Jitter strategy.
    pub jitter: JitterPolicy,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            first_ms: 200,
            max_ms: 30_000,
            factor: 2.0,
            jitter: JitterPolicy::None,
        }
    }
}

impl From<BackoffConfig> for BackoffPolicy {
    fn from(cfg: BackoffConfig) -> Self {
        BackoffPolicy {
            first: Duration::from_millis(cfg.first_ms),
            max: Duration::from_millis(cfg.max_ms),
            factor: cfg.factor,
            jitter: cfg.jitter,
        }
    }
}

/// One service entry.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceConfig {
    /// Services that must be `Running` before this one starts.
    pub depends_on: Vec<String>,
    /// Override of [`SupervisorConfig::start_timeout_ms`].
    pub start_timeout_ms: Option<u64>,
    /// Override of [`SupervisorConfig::liveness_interval_ms`].
    pub liveness_interval_ms: Option<u64>,
    /// Override of [`SupervisorConfig::liveness_misses`].
    pub liveness_misses: Option<u32>,
    /// Override of [`SupervisorConfig::max_restarts`].
    pub max_restarts: Option<u32>,
}

/// Effective supervision settings of one service (config defaults + overrides).
#[derive(Clone, Debug)]
pub struct ServiceSettings {
    /// Declared dependencies.
    pub depends_on: Vec<String>,
    /// Time allowed to reach `Running`.
    pub start_timeout: Duration,
    /// Liveness beat interval.
    pub liveness_interval: Duration,
    /// Missed beats tolerated.
    pub liveness_misses: u32,
    /// Restart policy.
    pub restart: RestartPolicy,
    /// Restart delays.
    pub backoff: BackoffPolicy,
}

impl KernelConfig {
    /// Resolves the effective settings of `service`, if configured.
    pub fn service_settings(&self, service: &str) -> Option<ServiceSettings> {
        let svc = self.services.get(service)?;
        let sup = &self.supervisor;
        let max_restarts = svc.max_restarts.unwrap_or(sup.max_restarts);
        Some(ServiceSettings {
            depends_on: svc.depends_on.clone(),
            start_timeout: Duration::from_millis(svc.start_timeout_ms.unwrap_or(sup.start_timeout_ms)),
            liveness_interval: Duration::from_millis(
                svc.liveness_interval_ms.unwrap_or(sup.liveness_interval_ms),
            ),
            liveness_misses: svc.liveness_misses.unwrap_or(sup.liveness_misses),
            restart: RestartPolicy::with_budget(max_restarts),
            backoff: sup.backoff.into(),
        })
    }
}

/// Scope of sticky provider selections.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StickyScope {
    /// Sticky selections persist across mode changes.
    #[default]
    Process,
    /// Every accepted mode change resets sticky selections.
    Mode,
}

/// Dispatcher tunables.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DispatchConfig {
    /// Whether sticky selections survive mode changes.
    pub sticky_scope: StickyScope,
    /// Pending commands per capability before submitters wait.
    pub queue_capacity: usize,
    /// Default execution deadline.
    pub timeout_ms: u64,
    /// Default fallback switch.
    pub fallback: bool,
    /// Provider health check period (`0` = disabled; providers stay healthy unless marked).
    pub health_interval_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            sticky_scope: StickyScope::Process,
            queue_capacity: 64,
            timeout_ms: 5_000,
            fallback: true,
            health_interval_ms: 5_000,
        }
    }
}

impl DispatchConfig {
    /// Returns the health check period as an `Option` (`None` → disabled).
    #[inline]
    pub fn health_interval(&self) -> Option<Duration> {
        match self.health_interval_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }
}

/// One capability entry.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CapabilityConfig {
    /// Providers, highest priority first.
    pub providers: Vec<String>,
    /// Override of [`DispatchConfig::fallback`].
    pub fallback: Option<bool>,
    /// Override of [`DispatchConfig::timeout_ms`].
    pub timeout_ms: Option<u64>,
}

/// Effective routing settings of one capability.
#[derive(Clone, Debug)]
pub struct CapabilitySettings {
    /// Providers, highest priority first.
    pub providers: Vec<String>,
    /// Whether one fallback attempt is allowed.
    pub fallback: bool,
    /// Execution deadline per attempt.
    pub timeout: Duration,
}

impl KernelConfig {
    /// Resolves the effective settings of `capability`, if configured.
    pub fn capability_settings(&self, capability: &str) -> Option<CapabilitySettings> {
        let cap = self.capabilities.get(capability)?;
        Some(CapabilitySettings {
            providers: cap.providers.clone(),
            fallback: cap.fallback.unwrap_or(self.dispatch.fallback),
            timeout: Duration::from_millis(cap.timeout_ms.unwrap_or(self.dispatch.timeout_ms)),
        })
    }
}

/// Mode table.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModesConfig {
    /// Mode active at startup.
    pub initial: Mode,
    /// Mode → allowed targets and optional guard.
    pub transitions: BTreeMap<Mode, ModeRule>,
}

/// Outgoing transitions of one mode.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModeRule {
    /// Modes reachable directly from this one.
    pub allowed: Vec<Mode>,
    /// Guard consulted for every transition leaving this mode.
    pub guard: Option<String>,
}

impl Default for ModesConfig {
    /// `idle` start; `performance` is only reachable from `ambient` and only returns to `idle`.
    fn default() -> Self {
        let rule = |allowed: &[Mode]| ModeRule {
            allowed: allowed.to_vec(),
            guard: None,
        };
        let mut transitions = BTreeMap::new();
        transitions.insert(Mode::Idle, rule(&[Mode::Interactive, Mode::Ambient]));
        transitions.insert(Mode::Interactive, rule(&[Mode::Idle, Mode::Ambient]));
        transitions.insert(
            Mode::Ambient,
            rule(&[Mode::Idle, Mode::Interactive, Mode::Performance]),
        );
        transitions.insert(Mode::Performance, rule(&[Mode::Idle]));
        Self {
            initial: Mode::Idle,
            transitions,
        }
    }
}

/// Log pipeline tunables.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// In-memory ring capacity (entries).
    pub ring_capacity: usize,
    /// Dedup window per (service, level, message).
    pub dedup_window_ms: u64,
    /// Background flush period.
    pub flush_interval_ms: u64,
    /// Directory for session files (`None` → memory-only).
    pub log_dir: Option<PathBuf>,
    /// Raw diagnostics buffered before ingestion drops new ones.
    pub ingest_capacity: usize,
    /// Accepted entries awaiting flush before the oldest are dropped.
    pub max_pending: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            ring_capacity: 1_000,
            dedup_window_ms: 30_000,
            flush_interval_ms: 5_000,
            log_dir: None,
            ingest_capacity: 4_096,
            max_pending: 10_000,
        }
    }
}

impl PipelineConfig {
    /// Dedup window.
    pub fn dedup_window(&self) -> Duration {
        Duration::from_millis(self.dedup_window_ms)
    }

    /// Flush period.
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let cfg = KernelConfig::from_toml_str("").expect("defaults are valid");
        assert_eq!(cfg.pipeline.ring_capacity, 1_000);
        assert_eq!(cfg.pipeline.dedup_window(), Duration::from_secs(30));
        assert_eq!(cfg.pipeline.flush_interval(), Duration::from_secs(5));
        assert_eq!(cfg.dispatch.sticky_scope, StickyScope::Process);
        assert_eq!(cfg.modes.initial, Mode::Idle);
    }

    #[test]
    fn service_overrides_win_over_defaults() {
        let cfg = KernelConfig::from_toml_str(
            r#"
            [supervisor]
            start_timeout_ms = 1000
            max_restarts = 5

            [services.audio]
            start_timeout_ms = 250
            max_restarts = 0
            [services.voice]
            depends_on = ["audio"]
            "#,
        )
        .expect("valid");

        let audio = cfg.service_settings("audio").expect("audio configured");
        assert_eq!(audio.start_timeout, Duration::from_millis(250));
        assert_eq!(audio.restart, RestartPolicy::Never);

        let voice = cfg.service_settings("voice").expect("voice configured");
        assert_eq!(voice.start_timeout, Duration::from_secs(1));
        assert_eq!(voice.depends_on, ["audio"]);
        assert_eq!(voice.restart, RestartPolicy::OnFailure { max_restarts: 5 });
        assert!(cfg.service_settings("lighting").is_none());
    }

    #[test]
    fn capability_settings_inherit_dispatch_defaults() {
        let cfg = KernelConfig::from_toml_str(
            r#"
            [dispatch]
            timeout_ms = 750
            fallback = false
            health_interval_ms = 0

            [capabilities.music]
            providers = ["local"]
            [capabilities.lights]
            providers = ["hue"]
            fallback = true
            timeout_ms = 100
            "#,
        )
        .expect("valid");

        let music = cfg.capability_settings("music").expect("music");
        assert!(!music.fallback);
        assert_eq!(music.timeout, Duration::from_millis(750));

        let lights = cfg.capability_settings("lights").expect("lights");
        assert!(lights.fallback);
        assert_eq!(lights.timeout, Duration::from_millis(100));
        assert!(cfg.dispatch.health_interval().is_none());
    }

    #[test]
    fn unknown_fields_and_modes_fail_to_parse() {
        let err = KernelConfig::from_toml_str("[pipeline]\nring_size = 4").unwrap_err();
        assert_eq!(err.as_label(), "config_parse");

        let err = KernelConfig::from_toml_str("[modes]\ninitial = \"party\"\n[modes.transitions]")
            .unwrap_err();
        assert_eq!(err.as_label(), "config_parse");
    }

    #[test]
    fn load_reports_missing_file() {
        let err = KernelConfig::load("/definitely/not/here.toml").unwrap_err();
        assert_eq!(err.as_label(), "config_io");
    }
}
