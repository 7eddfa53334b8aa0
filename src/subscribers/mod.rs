//! # Bus subscribers.
//!
//! This module provides the [`Subscribe`] trait, the closure adapter
//! [`HandlerFn`], the worker that drives each subscription, and the built-in
//! [`LogWriter`] tracer.
//!
//! ## Architecture
//! ```text
//! Bus::publish ──► [queue per subscription] ──► worker ──► Subscribe::on_event(&Event)
//!                                                   │
//!                                                   └──► error/panic → bus.handler_failed
//! ```
//!
//! ## Subscriber kinds
//! - **Passive** - observe and react (tracing, dashboards, hardware bridges)
//! - **Stateful** - maintain state from events (the supervisor's liveness tracker)

mod log;
mod subscriber;
mod worker;

pub use log::LogWriter;
pub use subscriber::{HandlerFn, Subscribe};

pub(crate) use worker::{panic_reason, spawn_worker};
