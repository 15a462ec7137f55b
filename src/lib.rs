//! # Meshestra Lifecycle
//!
//! Phased startup and shutdown coordination for long-running Rust services.
//!
//! An application is made of hooks. Each hook implements some of the phase
//! traits (`ConfigDidLoad`, `DidLoad`, `WillReady`, `DidReady`,
//! `ServerDidReady`, `BeforeClose`) and the [`LifecycleManager`] calls them
//! in a fixed order. The load and boot phases are tracked by ready latches:
//! the next phase starts only once every task of the current one has
//! finished, failed, or timed out.
//!
//! ## Features
//!
//! - **Ready latches**: named tasks with duplicate detection and a timeout watchdog
//! - **Hook dispatch**: latched phases run concurrently, notification phases in order
//! - **Ordered teardown**: `beforeClose` callbacks run last-registered first
//! - **Timing**: every hook invocation is recorded as a named span
//! - **Events**: progress, timeouts and errors are published on an [`EventBus`]
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use meshestra_lifecycle::prelude::*;
//! use tokio::sync::RwLock;
//!
//! struct Database {
//!     connected: bool,
//! }
//!
//! #[async_trait]
//! impl DidLoad for Database {
//!     async fn did_load(&mut self) -> HookResult {
//!         self.connected = true;
//!         Ok(())
//!     }
//! }
//!
//! #[async_trait]
//! impl BeforeClose for Database {
//!     async fn before_close(&mut self) -> HookResult {
//!         self.connected = false;
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let db = Arc::new(RwLock::new(Database { connected: false }));
//!
//!     let app = Application::builder()
//!         .config(ConfigService::new())
//!         .hook(
//!             HookObject::new("Database")
//!                 .on_did_load(Arc::clone(&db))
//!                 .on_before_close(db),
//!         )
//!         .build()
//!         .await?;
//!
//!     // Serve your app...
//!     app.server_did_ready().await;
//!
//!     app.shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod lifecycle;
pub mod messaging;
pub mod timing;

// Re-export core types
pub use config::{ConfigService, LifecycleOptions};
pub use lifecycle::{
    Application, ApplicationBuilder, HookObject, HookPhase, LifecycleError, LifecycleManager,
    LifecycleState, ReadyLatch, Result,
};
pub use messaging::{EventBus, LifecycleEvent};
pub use timing::Timing;

// Re-export commonly used types from dependencies
pub use async_trait::async_trait;

/// Prelude module for convenient imports
///
/// ```
/// use meshestra_lifecycle::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::{ConfigService, LifecycleOptions};
    pub use crate::lifecycle::{
        Application, ApplicationBuilder, BeforeClose, ConfigDidLoad, DidLoad, DidReady,
        HookObject, HookPhase, HookResult, LifecycleError, LifecycleManager, LifecycleState,
        ReadyLatch, ServerDidReady, ShutdownHandler, TaskHandle, WillReady, shutdown_signal,
    };
    pub use crate::messaging::{EventBus, LifecycleEvent};
    pub use crate::timing::Timing;
    pub use async_trait::async_trait;
    pub use std::sync::Arc;
}
