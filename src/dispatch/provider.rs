//! # Capability providers.
//!
//! A [`Provider`] implements one or more capabilities (`music`, `lights`, ...).
//! Configuration lists, per capability, the providers in priority order; the
//! router only ever picks among those.

use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::Command;
use crate::error::ProviderError;

/// Shared handle to a provider.
pub type ProviderRef = Arc<dyn Provider>;

/// Executes commands for the capabilities it declares.
///
/// `execute` receives a token that is cancelled when the capability deadline
/// elapses or the dispatcher shuts down; return promptly when it fires.
#[async_trait]
pub trait Provider: Send + Sync + 'static {
    /// Name matching the configured provider lists.
    fn name(&self) -> &str;

    /// Capabilities this provider implements.
    fn capabilities(&self) -> &[String];

    /// Performs `command`.
    async fn execute(
        &self,
        command: &Command,
        token: CancellationToken,
    ) -> Result<serde_json::Value, ProviderError>;

    /// Probe used by the health monitor. Default: always healthy.
    async fn health_check(&self) -> bool {
        true
    }
}

/// Closure-backed provider.
///
/// ```rust
/// use conductor::{Command, Provider, ProviderError, ProviderFn, ProviderRef};
/// use serde_json::json;
/// use tokio_util::sync::CancellationToken;
///
/// let local: ProviderRef = ProviderFn::arc("local", ["music"], |cmd: Command, _t: CancellationToken| async move {
///     Ok::<_, ProviderError>(json!({ "playing": cmd.parameters }))
/// });
/// assert_eq!(local.capabilities(), ["music"]);
/// ```
pub struct ProviderFn<F> {
    name: Cow<'static, str>,
    capabilities: Vec<String>,
    f: F,
}

impl<F, Fut> ProviderFn<F>
where
    F: Fn(Command, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<serde_json::Value, ProviderError>> + Send + 'static,
{
    /// Creates the provider.
    pub fn new<I, S>(name: impl Into<Cow<'static, str>>, capabilities: I, f: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            capabilities: capabilities.into_iter().map(Into::into).collect(),
            f,
        }
    }

    /// Creates the provider behind an `Arc`.
    pub fn arc<I, S>(name: impl Into<Cow<'static, str>>, capabilities: I, f: F) -> Arc<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Arc::new(Self::new(name, capabilities, f))
    }
}

#[async_trait]
impl<F, Fut> Provider for ProviderFn<F>
where
    F: Fn(Command, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<serde_json::Value, ProviderError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> &[String] {
        &self.capabilities
    }

    async fn execute(
        &self,
        command: &Command,
        token: CancellationToken,
    ) -> Result<serde_json::Value, ProviderError> {
        (self.f)(command.clone(), token).await
    }
}
