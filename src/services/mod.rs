//! Supervised services.
//!
//! A [`Service`] is a long-running, cancellable unit owned by the
//! [`Supervisor`](crate::Supervisor). Its run receives a [`ServiceContext`]
//! used to signal readiness, emit liveness beats and observe cancellation.
//!
//! ## Contents
//! - [`Service`] trait and [`ServiceRef`] handle
//! - [`ServiceFn`] closure-backed service
//! - [`ServiceContext`] per-run context
//!
//! ## Lifecycle seen from a service
//! ```text
//! run(ctx) ──► setup ──► ctx.ready() ──► loop { work; ctx.heartbeat() } ──► ctx.cancelled() ──► return
//!                          (Running)          (service.liveness)              (Stopping)
//! ```

mod context;
mod service;
mod service_fn;

pub use context::ServiceContext;
pub use service::{Service, ServiceRef};
pub use service_fn::ServiceFn;
