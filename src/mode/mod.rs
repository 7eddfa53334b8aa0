//! Operating modes and the mode state machine.
//!
//! ## Contents
//! - [`Mode`] - closed set of operating modes
//! - [`TransitionTable`] - allowed edges and guards, built from configuration
//! - [`ModeGuard`], [`GuardRegistry`], [`NoDispatchInFlight`] - transition guards
//! - [`ModeMachine`], [`ModeHandle`] - the task owning the current mode
//!
//! ## Topics
//! ```text
//! mode.requested ──► ModeMachine ──┬─► mode.changed   (accepted; published before the reply)
//! request_mode() ──►               └─► mode.rejected  (bus requests only)
//! ```

mod guard;
mod machine;
mod table;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use guard::{GuardRegistry, ModeGuard, NoDispatchInFlight};
pub use machine::{ModeHandle, ModeMachine, ModeTransition};
pub use table::TransitionTable;

/// Operating mode; exactly one is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Nothing active; waiting for wake-up.
    Idle,
    /// Conversational interaction with a user.
    Interactive,
    /// Background ambience (music, lighting).
    Ambient,
    /// Scripted performance.
    Performance,
}

impl Mode {
    /// Every mode, in declaration order.
    pub const ALL: [Mode; 4] = [Mode::Idle, Mode::Interactive, Mode::Ambient, Mode::Performance];

    /// Returns the lowercase name used in configuration and events.
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Idle => "idle",
            Mode::Interactive => "interactive",
            Mode::Ambient => "ambient",
            Mode::Performance => "performance",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
