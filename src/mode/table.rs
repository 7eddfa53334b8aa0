use std::collections::BTreeMap;
use std::sync::Arc;

use super::{GuardRegistry, Mode, ModeGuard};
use crate::config::ModesConfig;
use crate::error::{ConfigError, ModeError};

struct Rule {
    allowed: Vec<Mode>,
    guard: Option<Arc<dyn ModeGuard>>,
}

/// Allowed mode edges with resolved guards.
///
/// A guard configured on a mode applies to every transition leaving it.
pub struct TransitionTable {
    rules: BTreeMap<Mode, Rule>,
}

impl TransitionTable {
    /// Builds the table, resolving guard names against `guards`.
    pub fn from_config(cfg: &ModesConfig, guards: &GuardRegistry) -> Result<Self, ConfigError> {
        let mut rules = BTreeMap::new();
        for (mode, rule) in &cfg.transitions {
            let guard = match &rule.guard {
                Some(name) => Some(guards.get(name).ok_or_else(|| ConfigError::UnknownGuard {
                    mode: *mode,
                    guard: name.clone(),
                })?),
                None => None,
            };
            rules.insert(
                *mode,
                Rule {
                    allowed: rule.allowed.clone(),
                    guard,
                },
            );
        }
        Ok(Self { rules })
    }

    /// Returns `true` if the table declares an edge `from -> to` (guards not consulted).
    pub fn has_edge(&self, from: Mode, to: Mode) -> bool {
        self.rules
            .get(&from)
            .is_some_and(|rule| rule.allowed.contains(&to))
    }

    /// Checks the edge and its guard.
    pub fn check(&self, from: Mode, to: Mode) -> Result<(), ModeError> {
        let rule = match self.rules.get(&from) {
            Some(rule) if rule.allowed.contains(&to) => rule,
            _ => return Err(ModeError::Unreachable { from, to }),
        };
        match &rule.guard {
            Some(guard) if !guard.allows(from, to) => Err(ModeError::GuardRejected {
                from,
                to,
                guard: guard.name().to_string(),
            }),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModeRule;
    use crate::dispatch::InFlight;
    use crate::mode::NoDispatchInFlight;

    fn modes(guard: Option<&str>) -> ModesConfig {
        let mut cfg = ModesConfig::default();
        cfg.transitions.insert(
            Mode::Performance,
            ModeRule {
                allowed: vec![Mode::Idle],
                guard: guard.map(str::to_string),
            },
        );
        cfg
    }

    #[test]
    fn only_configured_edges_are_reachable() {
        let table = TransitionTable::from_config(&modes(None), &GuardRegistry::new()).expect("table");
        assert!(table.check(Mode::Idle, Mode::Interactive).is_ok());
        assert!(table.has_edge(Mode::Ambient, Mode::Performance));
        assert_eq!(
            table.check(Mode::Idle, Mode::Performance),
            Err(ModeError::Unreachable {
                from: Mode::Idle,
                to: Mode::Performance
            })
        );
    }

    #[test]
    fn guard_on_source_mode_is_consulted() {
        let in_flight = InFlight::default();
        let mut guards = GuardRegistry::new();
        guards.register(Arc::new(NoDispatchInFlight::new(in_flight.clone())));
        let table =
            TransitionTable::from_config(&modes(Some(NoDispatchInFlight::NAME)), &guards).expect("table");

        let _ticket = in_flight.enter();
        let err = table.check(Mode::Performance, Mode::Idle).unwrap_err();
        assert_eq!(err.as_label(), "mode_guard_rejected");
        assert!(table.check(Mode::Idle, Mode::Ambient).is_ok());
    }

    #[test]
    fn unknown_guard_is_a_config_error() {
        let err = TransitionTable::from_config(&modes(Some("stage_clear")), &GuardRegistry::new())
            .err()
            .expect("must fail");
        assert_eq!(err.as_label(), "config_unknown_guard");
    }
}
