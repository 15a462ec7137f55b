//! Lifecycle Hooks Module
//!
//! This module coordinates the phased startup and shutdown of a long-running
//! process. Hooks opt into the phases they care about; the manager runs the
//! phases in a fixed order and waits for each latched phase to finish (or
//! time out) before moving on.
//!
//! # Lifecycle Phases
//!
//! ```text
//! 1. add_hook(...)                     hook list is append-only
//!    ↓
//! 2. init()                            hook list frozen, beforeClose registered
//!    ↓
//! 3. configDidLoad                     ← best-effort
//!    ↓
//! 4. didLoad                           ← load latch
//!    ↓ (settles; an error skips to 6)
//! 5. willReady                         ← boot latch
//!    ↓
//! 6. ready ─▶ didReady(err)            ← best-effort
//!    ↓
//! 7. serverDidReady                    ← best-effort, driven by the server
//!    ↓
//! [Running...]
//!    ↓
//! 8. close() ─▶ beforeClose            ← reverse registration order
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use meshestra_lifecycle::lifecycle::{BeforeClose, DidLoad, HookObject, HookResult};
//! use async_trait::async_trait;
//!
//! pub struct DatabaseService {
//!     pool: Option<Pool>,
//! }
//!
//! #[async_trait]
//! impl DidLoad for DatabaseService {
//!     async fn did_load(&mut self) -> HookResult {
//!         tracing::info!("Opening database pool");
//!         self.pool = Some(Pool::connect().await?);
//!         Ok(())
//!     }
//! }
//!
//! #[async_trait]
//! impl BeforeClose for DatabaseService {
//!     async fn before_close(&mut self) -> HookResult {
//!         tracing::info!("Closing database pool");
//!         self.pool.take();
//!         Ok(())
//!     }
//! }
//!
//! let db = Arc::new(RwLock::new(DatabaseService { pool: None }));
//! let hook = HookObject::new("DatabaseService")
//!     .on_did_load(Arc::clone(&db))
//!     .on_before_close(db);
//! ```

mod application;
mod dispatcher;
mod error;
mod hook;
mod latch;
mod manager;
mod phase;
mod shutdown;
mod signal;
mod traits;

pub use application::{Application, ApplicationBuilder};
pub use dispatcher::HookDispatcher;
pub use error::{LifecycleError, Result};
pub use hook::{HookFuture, HookObject};
pub use latch::{ReadyLatch, TaskHandle};
pub use manager::LifecycleManager;
pub use phase::{HookPhase, LifecycleState};
pub use shutdown::{ShutdownHandler, shutdown_signal};
pub use signal::{ReadySignal, SettleOutcome};
pub use traits::{
    BeforeClose, ConfigDidLoad, DidLoad, DidReady, HookResult, ServerDidReady, WillReady,
};
