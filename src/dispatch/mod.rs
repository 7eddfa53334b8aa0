//! Command dispatch and provider routing.
//!
//! ## Contents
//! - [`Command`], [`CommandOutcome`], [`AttemptReport`], [`SwitchReason`] - records
//! - [`Provider`], [`ProviderFn`], [`ProviderRef`] - capability implementations
//! - [`Dispatcher`], [`DispatcherHandle`], [`PendingCommand`] - intake and execution
//! - [`HealthBoard`] - provider health
//! - [`InFlight`] - executing-command counter shared with mode guards
//!
//! ## Guarantees
//! - One command per capability executes at a time, in submission order.
//! - A failed command is retried at most once, on a different healthy provider.
//! - Every command ends in exactly one `command.result` or `command.failed`.

mod command;
mod dispatcher;
mod health;
mod in_flight;
mod provider;
mod router;
mod worker;

pub use command::{AttemptReport, Command, CommandOutcome, SwitchReason};
pub use dispatcher::{Dispatcher, DispatcherHandle, PendingCommand};
pub use health::HealthBoard;
pub use in_flight::{InFlight, InFlightTicket};
pub use provider::{Provider, ProviderFn, ProviderRef};
