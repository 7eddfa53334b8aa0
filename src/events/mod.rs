//! Event data model and the topic-routed bus.
//!
//! ## Contents
//! - [`Event`], [`Payload`] - immutable records with one typed schema per topic
//! - [`TopicPattern`], [`topics`] - topic names and subscription filters
//! - [`Bus`], [`Listener`] - publish/subscribe registry
//!
//! ## Quick reference
//! - **Publishers**: supervisor and service actors, mode machine, dispatcher,
//!   log pipeline, bus workers (handler failures/overflow), collaborators.
//! - **Consumers**: liveness tracker (`service.liveness`), mode machine
//!   (`mode.requested`), dispatcher (`command.submitted`, `mode.changed`),
//!   log pipeline (`*`), user [`Subscribe`](crate::Subscribe) handlers.

mod bus;
mod event;
mod topic;

pub use bus::{Bus, Listener, SubscriptionId};
pub use event::{Event, Payload, SCHEMA_VERSION};
pub use topic::{topics, TopicPattern};

pub(crate) use bus::WeakBus;
