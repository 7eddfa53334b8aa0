use std::sync::Arc;

use async_trait::async_trait;

use super::ServiceContext;
use crate::error::ServiceError;

/// Shared handle to a service.
pub type ServiceRef = Arc<dyn Service>;

/// # Long-running supervised unit.
///
/// `run` must call [`ServiceContext::ready`] once setup is complete and then
/// beat at least once per liveness interval. It returns when
/// [`ServiceContext::cancelled`] fires.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use conductor::{Service, ServiceContext, ServiceError};
///
/// struct Lights;
///
/// #[async_trait]
/// impl Service for Lights {
///     fn name(&self) -> &str { "lights" }
///
///     async fn run(&self, ctx: ServiceContext) -> Result<(), ServiceError> {
///         ctx.ready();
///         ctx.heartbeat_until_cancelled().await;
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Service: Send + Sync + 'static {
    /// Name matching a `[services.<name>]` configuration entry.
    fn name(&self) -> &str;

    /// Runs until cancelled or failed.
    async fn run(&self, ctx: ServiceContext) -> Result<(), ServiceError>;
}
