//! # Closure-backed service.
//!
//! [`ServiceFn`] builds a fresh future from a closure on every (re)start, so
//! no state leaks between runs unless the closure captures it explicitly.
//!
//! ```rust
//! use conductor::{Service, ServiceContext, ServiceError, ServiceFn, ServiceRef};
//!
//! let svc: ServiceRef = ServiceFn::arc("audio", |ctx: ServiceContext| async move {
//!     ctx.ready();
//!     ctx.heartbeat_until_cancelled().await;
//!     Ok::<_, ServiceError>(())
//! });
//! assert_eq!(svc.name(), "audio");
//! ```

use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use super::{Service, ServiceContext};
use crate::error::ServiceError;

/// Service whose run is produced by a closure.
pub struct ServiceFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F, Fut> ServiceFn<F>
where
    F: Fn(ServiceContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ServiceError>> + Send + 'static,
{
    /// Creates the service.
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }

    /// Creates the service behind an `Arc`.
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }
}

#[async_trait]
impl<F, Fut> Service for ServiceFn<F>
where
    F: Fn(ServiceContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ServiceError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: ServiceContext) -> Result<(), ServiceError> {
        (self.f)(ctx).await
    }
}
