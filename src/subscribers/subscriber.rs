//! # Event subscriber trait.
//!
//! Provides [`Subscribe`], the extension point for plugging handlers into the
//! [`Bus`](crate::Bus), and [`HandlerFn`], a closure-backed implementation.
//!
//! Each subscription gets:
//! - **Dedicated worker task** (runs independently of publishers)
//! - **Bounded queue** (capacity via [`Subscribe::queue_capacity`])
//! - **Failure isolation** (errors and panics become `bus.handler_failed`)
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use conductor::{Event, HandlerError, Payload, Subscribe};
//!
//! struct FatalAlarm;
//!
//! #[async_trait]
//! impl Subscribe for FatalAlarm {
//!     async fn on_event(&self, ev: &Event) -> Result<(), HandlerError> {
//!         if let Payload::SystemFatal { service, .. } = &ev.payload {
//!             eprintln!("fatal in {service}");
//!         }
//!         Ok(())
//!     }
//!
//!     fn name(&self) -> &str { "fatal-alarm" }
//! }
//! ```

use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::HandlerError;
use crate::events::Event;

/// Bus event handler.
///
/// ### Implementation requirements
/// - Use async I/O; avoid blocking the executor.
/// - Return `Err` for handled failures; panics are caught as well.
/// - Slow processing only affects this subscription's queue.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Processes a single event, in publish order.
    async fn on_event(&self, event: &Event) -> Result<(), HandlerError>;

    /// Name used in logs and in `bus.handler_failed` / `bus.overflow` events.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Preferred queue capacity (clamped to at least 1). Default: 1024.
    fn queue_capacity(&self) -> usize {
        1024
    }
}

/// Closure-backed handler.
///
/// The closure receives the shared event and returns a fresh future per event.
pub struct HandlerFn<F> {
    name: Cow<'static, str>,
    capacity: usize,
    f: F,
}

impl<F, Fut> HandlerFn<F>
where
    F: Fn(Arc<Event>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    /// Creates a handler with the default queue capacity.
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self {
            name: name.into(),
            capacity: 1024,
            f,
        }
    }

    /// Creates the handler and returns it as a shared handle.
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }

    /// Overrides the queue capacity.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }
}

#[async_trait]
impl<F, Fut> Subscribe for HandlerFn<F>
where
    F: Fn(Arc<Event>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    async fn on_event(&self, event: &Event) -> Result<(), HandlerError> {
        (self.f)(Arc::new(event.clone())).await
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn queue_capacity(&self) -> usize {
        self.capacity
    }
}
