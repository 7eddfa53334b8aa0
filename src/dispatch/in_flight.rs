use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Number of commands currently executing, across all capabilities.
///
/// Shared between the dispatcher workers and guards such as
/// [`NoDispatchInFlight`](crate::NoDispatchInFlight).
#[derive(Debug, Clone, Default)]
pub struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    /// Current count.
    pub fn get(&self) -> usize {
        self.0.load(Ordering::Acquire)
    }

    /// Increments the count until the returned ticket is dropped.
    pub fn enter(&self) -> InFlightTicket {
        self.0.fetch_add(1, Ordering::AcqRel);
        InFlightTicket(self.clone())
    }
}

/// Decrements the [`InFlight`] count on drop.
#[derive(Debug)]
pub struct InFlightTicket(InFlight);

impl Drop for InFlightTicket {
    fn drop(&mut self) {
        self.0 .0.fetch_sub(1, Ordering::AcqRel);
    }
}
