//! Runtime core: service supervision and lifecycle.
//!
//! The public surface is [`Supervisor`], the lifecycle types
//! ([`ServiceState`], [`Health`], [`ServiceDescriptor`]) and
//! [`wait_for_shutdown_signal`].
//!
//! Internal modules:
//! - [`graph`]: start order and dependents;
//! - [`actor`]: one service with readiness deadline, watchdog, restarts;
//! - [`liveness`]: last beat per service, fed from the bus;
//! - [`status`]: shared descriptors, publishes `service.health`;
//! - [`registry`]: actor handles, reverse-order stop with grace;
//! - [`shutdown`]: OS signal handling.

mod actor;
pub(crate) mod graph;
mod liveness;
mod registry;
mod shutdown;
mod state;
mod status;
mod supervisor;

pub use shutdown::wait_for_shutdown_signal;
pub use state::{Health, ServiceDescriptor, ServiceState};
pub use supervisor::{FatalReport, Supervisor};
