//! Restart policies for supervised services.
//!
//! ## Contents
//! - [`RestartPolicy`] whether a failed service is restarted, and how many times
//! - [`BackoffPolicy`] how restart delays grow (first / factor / max + jitter)
//! - [`JitterPolicy`]  randomization applied to each delay
//!
//! ## Wiring
//! ```text
//! [supervisor] max_restarts, backoff ──► ServiceSettings { restart, backoff }
//!      └─► core::actor::ServiceActor:
//!           - restart.allows(n) decides restart vs. system.fatal
//!           - backoff.next(n) schedules restart n
//! ```
//!
//! `max_restarts = 0` maps to [`RestartPolicy::Never`].

mod backoff;
mod jitter;
mod restart;

pub use backoff::BackoffPolicy;
pub use jitter::JitterPolicy;
pub use restart::RestartPolicy;
