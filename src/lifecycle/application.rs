//! Application Bootstrap
//!
//! Drives a [`LifecycleManager`] through startup in one call and hands back
//! a running application.

use super::{HookObject, LifecycleManager, Result, ShutdownHandler};
use crate::config::{ConfigService, LifecycleOptions};
use crate::timing::Timing;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// A started application
///
/// # Example
///
/// ```rust,ignore
/// use meshestra_lifecycle::lifecycle::Application;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let app = Application::builder()
///         .base_dir(env!("CARGO_MANIFEST_DIR"))
///         .config(ConfigService::new())
///         .hook(database_hook)
///         .hook(cache_hook)
///         .build()
///         .await?;
///
///     // Start server...
///     app.server_did_ready().await;
///
///     app.spawn_shutdown_handler().await?;
///     Ok(())
/// }
/// ```
pub struct Application {
    lifecycle: LifecycleManager,
}

impl Application {
    /// Create a new application builder
    pub fn builder() -> ApplicationBuilder {
        ApplicationBuilder::new()
    }

    /// Get a reference to the lifecycle manager
    pub fn lifecycle(&self) -> &LifecycleManager {
        &self.lifecycle
    }

    /// Notify hooks that the server is accepting traffic
    pub async fn server_did_ready(&self) {
        self.lifecycle.trigger_server_did_ready().await;
    }

    /// Create a shutdown handler for graceful shutdown
    pub fn shutdown_handler(&self) -> ShutdownHandler {
        ShutdownHandler::new(self.lifecycle.clone())
    }

    /// Perform graceful shutdown
    ///
    /// Runs every beforeClose callback in reverse registration order.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Shutting down application...");
        self.lifecycle.close().await?;
        tracing::info!("Application shutdown complete");
        Ok(())
    }

    /// Spawn a background task that waits for shutdown signals
    /// and performs graceful shutdown automatically.
    ///
    /// Returns a handle that can be used to wait for the shutdown to complete.
    pub fn spawn_shutdown_handler(&self) -> tokio::task::JoinHandle<()> {
        let shutdown_handler = self.shutdown_handler();
        tokio::spawn(async move {
            shutdown_handler.wait_for_shutdown().await;
        })
    }
}

/// Builder for Application
pub struct ApplicationBuilder {
    options: LifecycleOptions,
    config: Option<ConfigService>,
    timing: Option<Arc<Timing>>,
    hooks: Vec<HookObject>,
}

impl Default for ApplicationBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ApplicationBuilder {
    /// Create a new application builder
    pub fn new() -> Self {
        Self {
            options: LifecycleOptions::default(),
            config: None,
            timing: None,
            hooks: Vec::new(),
        }
    }

    /// Replace all lifecycle options
    pub fn options(mut self, options: LifecycleOptions) -> Self {
        self.options = options;
        self
    }

    /// Directory hook sources are reported relative to
    pub fn base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.options.base_dir = base_dir.into();
        self
    }

    /// Set the timeout for each ready latch
    pub fn ready_timeout(mut self, timeout: Duration) -> Self {
        self.options.ready_timeout = timeout;
        self
    }

    /// Fail startup when a ready latch times out
    pub fn fail_on_timeout(mut self, fail_on_timeout: bool) -> Self {
        self.options.fail_on_timeout = fail_on_timeout;
        self
    }

    /// Apply overrides from `config` when building
    pub fn config(mut self, config: ConfigService) -> Self {
        self.config = Some(config);
        self
    }

    /// Record timing spans into a shared recorder
    pub fn timing(mut self, timing: Arc<Timing>) -> Self {
        self.timing = Some(timing);
        self
    }

    /// Register a hook; hooks run in registration order
    pub fn hook(mut self, hook: HookObject) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Build and start the application
    ///
    /// This will:
    /// 1. Apply configuration overrides
    /// 2. Register hooks and call `init()`
    /// 3. Call every configDidLoad hook
    /// 4. Run the load and boot phases and wait for readiness
    ///
    /// # Errors
    ///
    /// Returns a configuration error, or the first didLoad/willReady failure.
    pub async fn build(self) -> Result<Application> {
        let options = match &self.config {
            Some(config) => self.options.apply_config(config)?,
            None => self.options,
        };
        let timing = self.timing.unwrap_or_else(|| Arc::new(Timing::new()));
        let lifecycle = LifecycleManager::with_timing(options, timing);

        tracing::info!("Starting application initialization...");

        for hook in self.hooks {
            lifecycle.add_hook(hook)?;
        }
        lifecycle.init()?;
        lifecycle.trigger_config_did_load().await;
        lifecycle.trigger_did_load()?;
        lifecycle.ready().await?;

        tracing::info!("Application initialization complete");

        Ok(Application { lifecycle })
    }
}
