//! Shared service descriptors; every state change is published as `service.health`.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::state::{Health, ServiceDescriptor, ServiceState};
use crate::events::{Bus, Payload};

const ORIGIN: &str = "supervisor";

#[derive(Clone)]
pub(crate) struct StatusBoard {
    inner: Arc<RwLock<BTreeMap<String, ServiceDescriptor>>>,
    bus: Bus,
}

impl StatusBoard {
    pub(crate) fn new(bus: Bus, descriptors: impl IntoIterator<Item = ServiceDescriptor>) -> Self {
        let map = descriptors.into_iter().map(|d| (d.name.clone(), d)).collect();
        Self {
            inner: Arc::new(RwLock::new(map)),
            bus,
        }
    }

    /// Updates state and health, then publishes the transition.
    pub(crate) fn set(&self, service: &str, state: ServiceState, health: Health, reason: Option<String>) {
        let restart_count = {
            let mut map = self.inner.write();
            let Some(desc) = map.get_mut(service) else { return };
            desc.state = state;
            desc.health = health;
            if reason.is_some() {
                desc.last_error = reason.clone();
            }
            desc.restart_count
        };
        self.bus.publish(
            ORIGIN,
            Payload::ServiceHealth {
                service: service.to_string(),
                state,
                health,
                restart_count,
                reason,
            },
        );
    }

    pub(crate) fn record_restart(&self, service: &str) -> u32 {
        let mut map = self.inner.write();
        match map.get_mut(service) {
            Some(desc) => {
                desc.restart_count += 1;
                desc.restart_count
            }
            None => 0,
        }
    }

    pub(crate) fn get(&self, service: &str) -> Option<ServiceDescriptor> {
        self.inner.read().get(service).cloned()
    }

    pub(crate) fn state(&self, service: &str) -> Option<ServiceState> {
        self.inner.read().get(service).map(|d| d.state)
    }
}
