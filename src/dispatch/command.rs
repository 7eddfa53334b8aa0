//! Command and outcome records.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A request to perform an action through some capability provider.
///
/// ```rust
/// use conductor::Command;
/// use serde_json::json;
///
/// let cmd = Command::new("play")
///     .with_capability("music")
///     .with_provider("streaming")
///     .with_parameters(json!({ "track": "intro" }));
/// assert_eq!(cmd.capability.as_deref(), Some("music"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    /// Unique id, echoed in `command.result` / `command.failed`.
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    /// Action name; resolves the capability through `[actions]` when `capability` is absent.
    pub action: String,
    /// Target capability.
    #[serde(default)]
    pub capability: Option<String>,
    /// Preferred provider (honoured only if registered for the capability and healthy).
    #[serde(default)]
    pub provider: Option<String>,
    /// Free-form parameters passed to the provider.
    #[serde(default)]
    pub parameters: serde_json::Value,
}

impl Command {
    /// Creates a command with a fresh id and no parameters.
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            action: action.into(),
            capability: None,
            provider: None,
            parameters: serde_json::Value::Null,
        }
    }

    /// Targets `capability` directly.
    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capability = Some(capability.into());
        self
    }

    /// Names a preferred provider.
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Attaches parameters.
    pub fn with_parameters(mut self, parameters: serde_json::Value) -> Self {
        self.parameters = parameters;
        self
    }
}

/// Successful execution, published as `command.result`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandOutcome {
    /// Id of the executed command.
    pub command_id: Uuid,
    /// Capability used.
    pub capability: String,
    /// Provider that produced `output`.
    pub provider: String,
    /// Provider output.
    pub output: serde_json::Value,
    /// Provider whose failure triggered the fallback, if any.
    pub fallback_from: Option<String>,
    /// Explicitly requested provider that was not used, if any.
    pub overridden: Option<String>,
}

/// One failed attempt inside `command.failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttemptReport {
    /// Provider tried.
    pub provider: String,
    /// Stable error label (e.g. `provider_timeout`).
    pub kind: String,
    /// Error description.
    pub error: String,
}

/// Why the active provider of a capability changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchReason {
    /// First successful execution on the capability.
    Initial,
    /// The previous provider failed and the fallback succeeded.
    Fallback,
    /// The command named this provider.
    Requested,
    /// The previous provider was unhealthy at selection time.
    Unhealthy,
    /// `switch_provider` was called.
    Manual,
}
