use std::collections::BTreeMap;

use super::KernelConfig;
use crate::core::graph;
use crate::error::ConfigError;

pub(super) fn validate(cfg: &KernelConfig) -> Result<(), ConfigError> {
    services(cfg)?;
    modes(cfg)?;
    capabilities(cfg)?;
    tunables(cfg)
}

fn services(cfg: &KernelConfig) -> Result<(), ConfigError> {
    let deps: BTreeMap<String, Vec<String>> = cfg
        .services
        .iter()
        .map(|(name, svc)| (name.clone(), svc.depends_on.clone()))
        .collect();
    graph::start_order(&deps).map(|_| ())
}

fn modes(cfg: &KernelConfig) -> Result<(), ConfigError> {
    let table = &cfg.modes.transitions;
    if !table.contains_key(&cfg.modes.initial) {
        return Err(ConfigError::UnknownInitialMode(cfg.modes.initial));
    }
    for (from, rule) in table {
        if let Some(to) = rule.allowed.iter().find(|to| !table.contains_key(to)) {
            return Err(ConfigError::UnknownModeTransition { from: *from, to: *to });
        }
    }
    Ok(())
}

fn capabilities(cfg: &KernelConfig) -> Result<(), ConfigError> {
    if let Some((name, _)) = cfg.capabilities.iter().find(|(_, c)| c.providers.is_empty()) {
        return Err(ConfigError::EmptyCapability(name.clone()));
    }
    for (action, capability) in &cfg.actions {
        if !cfg.capabilities.contains_key(capability) {
            return Err(ConfigError::UnknownActionCapability {
                action: action.clone(),
                capability: capability.clone(),
            });
        }
    }
    Ok(())
}

/// Upper bound on `liveness_interval_ms * liveness_misses` (one day).
const MAX_LIVENESS_WINDOW_MS: u64 = 86_400_000;

fn liveness_window_ok(interval_ms: u64, misses: u32) -> bool {
    interval_ms
        .checked_mul(u64::from(misses))
        .is_some_and(|window| window <= MAX_LIVENESS_WINDOW_MS)
}

fn tunables(cfg: &KernelConfig) -> Result<(), ConfigError> {
    let positive: [(&'static str, bool); 11] = [
        ("bus.queue_capacity", cfg.bus.queue_capacity > 0),
        ("supervisor.start_timeout_ms", cfg.supervisor.start_timeout_ms > 0),
        ("supervisor.liveness_interval_ms", cfg.supervisor.liveness_interval_ms > 0),
        ("supervisor.liveness_misses", cfg.supervisor.liveness_misses > 0),
        ("dispatch.queue_capacity", cfg.dispatch.queue_capacity > 0),
        ("dispatch.timeout_ms", cfg.dispatch.timeout_ms > 0),
        ("pipeline.ring_capacity", cfg.pipeline.ring_capacity > 0),
        ("pipeline.flush_interval_ms", cfg.pipeline.flush_interval_ms > 0),
        ("pipeline.ingest_capacity", cfg.pipeline.ingest_capacity > 0),
        ("pipeline.max_pending", cfg.pipeline.max_pending > 0),
        ("supervisor.backoff.max_ms", cfg.supervisor.backoff.max_ms > 0),
    ];
    if let Some((field, _)) = positive.iter().find(|(_, ok)| !ok) {
        return Err(ConfigError::InvalidTunable {
            field: *field,
            reason: "must be greater than zero",
        });
    }

    let factor = cfg.supervisor.backoff.factor;
    if !factor.is_finite() || factor < 1.0 {
        return Err(ConfigError::InvalidTunable {
            field: "supervisor.backoff.factor",
            reason: "must be a finite number >= 1.0",
        });
    }

    let sup = &cfg.supervisor;
    if !liveness_window_ok(sup.liveness_interval_ms, sup.liveness_misses) {
        return Err(ConfigError::InvalidTunable {
            field: "supervisor.liveness_interval_ms",
            reason: "liveness window must not exceed one day",
        });
    }

    for svc in cfg.services.values() {
        let interval = svc.liveness_interval_ms.unwrap_or(sup.liveness_interval_ms);
        let misses = svc.liveness_misses.unwrap_or(sup.liveness_misses);
        if !liveness_window_ok(interval, misses) {
            return Err(ConfigError::InvalidTunable {
                field: "services.liveness",
                reason: "liveness window must not exceed one day",
            });
        }
        if svc.start_timeout_ms == Some(0) {
            return Err(ConfigError::InvalidTunable {
                field: "services.start_timeout_ms",
                reason: "must be greater than zero",
            });
        }
        if svc.liveness_interval_ms == Some(0) || svc.liveness_misses == Some(0) {
            return Err(ConfigError::InvalidTunable {
                field: "services.liveness",
                reason: "interval and misses must be greater than zero",
            });
        }
    }
    for cap in cfg.capabilities.values() {
        if cap.timeout_ms == Some(0) {
            return Err(ConfigError::InvalidTunable {
                field: "capabilities.timeout_ms",
                reason: "must be greater than zero",
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::error::ConfigError;
    use crate::mode::Mode;
    use crate::KernelConfig;

    fn parse(text: &str) -> Result<KernelConfig, ConfigError> {
        KernelConfig::from_toml_str(text)
    }

    #[test]
    fn cycle_is_reported_with_its_path() {
        let err = parse(
            r#"
            [services.a]
            depends_on = ["b"]
            [services.b]
            depends_on = ["a"]
            [services.c]
            "#,
        )
        .unwrap_err();
        match err {
            ConfigError::CyclicDependency { cycle } => {
                assert_eq!(cycle, ["a", "b", "a"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unknown_dependency_is_rejected() {
        let err = parse("[services.voice]\ndepends_on = [\"audio\"]").unwrap_err();
        assert_eq!(err.as_label(), "config_unknown_dependency");
    }

    #[test]
    fn transition_to_undeclared_mode_is_rejected() {
        let err = parse(
            r#"
            [modes]
            initial = "idle"
            [modes.transitions.idle]
            allowed = ["performance"]
            "#,
        )
        .unwrap_err();
        match err {
            ConfigError::UnknownModeTransition { from, to } => {
                assert_eq!((from, to), (Mode::Idle, Mode::Performance));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn initial_mode_must_be_declared() {
        let err = parse(
            r#"
            [modes]
            initial = "ambient"
            [modes.transitions.idle]
            "#,
        )
        .unwrap_err();
        assert_eq!(err.as_label(), "config_unknown_initial_mode");
    }

    #[test]
    fn capability_rules() {
        let err = parse("[capabilities.music]\nproviders = []").unwrap_err();
        assert_eq!(err.as_label(), "config_empty_capability");

        let err = parse("[actions]\nplay = \"music\"").unwrap_err();
        assert_eq!(err.as_label(), "config_unknown_action_capability");
    }

    #[test]
    fn zero_tunables_are_rejected() {
        let err = parse("[pipeline]\nring_capacity = 0").unwrap_err();
        match err {
            ConfigError::InvalidTunable { field, .. } => assert_eq!(field, "pipeline.ring_capacity"),
            other => panic!("unexpected error: {other}"),
        }

        let err = parse("[supervisor.backoff]\nfactor = 0.5").unwrap_err();
        assert_eq!(err.as_label(), "config_invalid_tunable");

        let err = parse("[services.audio]\nliveness_misses = 0").unwrap_err();
        assert_eq!(err.as_label(), "config_invalid_tunable");
    }

    #[test]
    fn oversized_liveness_window_is_rejected() {
        let err = parse("[supervisor]\nliveness_interval_ms = 9223372036854775807").unwrap_err();
        match err {
            ConfigError::InvalidTunable { field, .. } => {
                assert_eq!(field, "supervisor.liveness_interval_ms")
            }
            other => panic!("unexpected error: {other}"),
        }

        let err = parse("[services.audio]\nliveness_interval_ms = 3600000\nliveness_misses = 25").unwrap_err();
        match err {
            ConfigError::InvalidTunable { field, .. } => assert_eq!(field, "services.liveness"),
            other => panic!("unexpected error: {other}"),
        }

        assert!(parse("[services.audio]\nliveness_interval_ms = 3600000\nliveness_misses = 24").is_ok());
    }
}
