//! Lifecycle hook traits
//!
//! Each trait is one optional capability of a hook. A service implements the
//! subset of phases it cares about and is attached to a
//! [`HookObject`](super::HookObject) slot per implemented trait.

use super::LifecycleError;
use async_trait::async_trait;

/// Result returned by hook methods
pub type HookResult = anyhow::Result<()>;

/// Called once configuration has been loaded
///
/// Runs best-effort: a failure is reported and the remaining hooks still run.
#[async_trait]
pub trait ConfigDidLoad: Send + Sync {
    async fn config_did_load(&mut self) -> HookResult;
}

/// Called during the load phase
///
/// Use this hook to:
/// - Open database pools
/// - Read files the service depends on
/// - Register handlers that later phases rely on
///
/// The boot phase does not start until every `did_load` has completed. A
/// failure here fails overall readiness and the boot phase never runs.
///
/// # Example
///
/// ```rust,ignore
/// use meshestra_lifecycle::lifecycle::{DidLoad, HookResult};
/// use async_trait::async_trait;
///
/// #[async_trait]
/// impl DidLoad for DatabaseService {
///     async fn did_load(&mut self) -> HookResult {
///         self.pool = Some(create_pool(&self.config).await?);
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait DidLoad: Send + Sync {
    async fn did_load(&mut self) -> HookResult;
}

/// Called during the boot phase, after every `did_load` succeeded
///
/// Use this hook for warm-up work that depends on other services being
/// loaded. Overall readiness waits for it.
#[async_trait]
pub trait WillReady: Send + Sync {
    async fn will_ready(&mut self) -> HookResult;
}

/// Called once overall readiness has settled
///
/// `err` carries the startup failure, if any.
#[async_trait]
pub trait DidReady: Send + Sync {
    async fn did_ready(&mut self, err: Option<&LifecycleError>) -> HookResult;
}

/// Called when the application is shutting down
///
/// # Note
///
/// Teardown runs in **reverse order** of registration, so services
/// registered later are closed before the ones they depend on.
///
/// # Example
///
/// ```rust,ignore
/// use meshestra_lifecycle::lifecycle::{BeforeClose, HookResult};
/// use async_trait::async_trait;
///
/// #[async_trait]
/// impl BeforeClose for DatabaseService {
///     async fn before_close(&mut self) -> HookResult {
///         if let Some(pool) = self.pool.take() {
///             pool.close().await;
///         }
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait BeforeClose: Send + Sync {
    async fn before_close(&mut self) -> HookResult;
}

/// Called once the server is accepting traffic
#[async_trait]
pub trait ServerDidReady: Send + Sync {
    async fn server_did_ready(&mut self) -> HookResult;
}
