//! # Transition guards.
//!
//! A guard is a named predicate attached to a mode in configuration
//! (`guard = "no_dispatch_in_flight"`). It is consulted for every transition
//! leaving that mode. Guards are registered by name in a [`GuardRegistry`];
//! an unknown name is a configuration error.

use std::collections::HashMap;
use std::sync::Arc;

use super::Mode;
use crate::dispatch::InFlight;

/// Predicate deciding whether a transition may proceed.
pub trait ModeGuard: Send + Sync + 'static {
    /// Registered name.
    fn name(&self) -> &str;

    /// Returns `true` if `from -> to` may proceed now.
    fn allows(&self, from: Mode, to: Mode) -> bool;
}

/// Rejects transitions while any command is executing.
pub struct NoDispatchInFlight {
    in_flight: InFlight,
}

impl NoDispatchInFlight {
    /// Name used in configuration.
    pub const NAME: &'static str = "no_dispatch_in_flight";

    /// Creates the guard over the dispatcher's in-flight counter.
    pub fn new(in_flight: InFlight) -> Self {
        Self { in_flight }
    }
}

impl ModeGuard for NoDispatchInFlight {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn allows(&self, _from: Mode, _to: Mode) -> bool {
        self.in_flight.get() == 0
    }
}

/// Guards by name.
#[derive(Default, Clone)]
pub struct GuardRegistry {
    guards: HashMap<String, Arc<dyn ModeGuard>>,
}

impl GuardRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) a guard under its own name.
    pub fn register(&mut self, guard: Arc<dyn ModeGuard>) {
        self.guards.insert(guard.name().to_string(), guard);
    }

    /// Looks a guard up by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn ModeGuard>> {
        self.guards.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_flight_guard_follows_counter() {
        let in_flight = InFlight::default();
        let guard = NoDispatchInFlight::new(in_flight.clone());
        assert!(guard.allows(Mode::Performance, Mode::Idle));

        let ticket = in_flight.enter();
        assert!(!guard.allows(Mode::Performance, Mode::Idle));
        drop(ticket);
        assert!(guard.allows(Mode::Performance, Mode::Idle));
    }

    #[test]
    fn registry_resolves_by_name() {
        let mut reg = GuardRegistry::new();
        reg.register(Arc::new(NoDispatchInFlight::new(InFlight::default())));
        assert!(reg.get("no_dispatch_in_flight").is_some());
        assert!(reg.get("missing").is_none());
    }
}
