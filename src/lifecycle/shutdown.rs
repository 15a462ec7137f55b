//! Graceful Shutdown Handler
//!
//! Waits for OS signals and closes the lifecycle.

use super::LifecycleManager;
use tokio::signal;

/// Handles graceful shutdown of the application
///
/// ShutdownHandler listens for OS signals (SIGTERM, SIGINT) and then runs
/// every registered beforeClose callback through [`LifecycleManager::close`].
///
/// # Example
///
/// ```rust,ignore
/// use meshestra_lifecycle::lifecycle::{LifecycleManager, ShutdownHandler};
///
/// let lifecycle = LifecycleManager::new(LifecycleOptions::default());
/// let shutdown_handler = ShutdownHandler::new(lifecycle.clone());
///
/// tokio::spawn(async move {
///     shutdown_handler.wait_for_shutdown().await;
///     std::process::exit(0);
/// });
/// ```
pub struct ShutdownHandler {
    lifecycle: LifecycleManager,
}

impl ShutdownHandler {
    /// Create a new ShutdownHandler
    pub fn new(lifecycle: LifecycleManager) -> Self {
        Self { lifecycle }
    }

    /// Wait for a shutdown signal and perform graceful shutdown
    pub async fn wait_for_shutdown(&self) {
        shutdown_signal().await;
        self.shutdown().await;
    }

    /// Close the lifecycle without waiting for a signal
    pub async fn shutdown(&self) {
        tracing::info!("Starting graceful shutdown...");

        if let Err(e) = self.lifecycle.close().await {
            tracing::error!("Error during lifecycle close: {}", e);
        }

        tracing::info!("Graceful shutdown complete");
    }
}

/// Create a future that completes when a shutdown signal is received
///
/// A handler that cannot be installed is logged and never fires, so the
/// other signal can still end the wait.
///
/// # Example
///
/// ```rust,ignore
/// use meshestra_lifecycle::lifecycle::shutdown_signal;
///
/// tokio::select! {
///     _ = shutdown_signal() => {
///         println!("Shutdown signal received");
///     }
///     _ = server.serve() => {}
/// }
/// ```
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM signal");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LifecycleOptions;
    use crate::lifecycle::LifecycleState;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_shutdown_closes_lifecycle() {
        let lifecycle = LifecycleManager::new(LifecycleOptions::default());
        lifecycle.init().unwrap();

        let closed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&closed);
        lifecycle
            .register_before_close("counter", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, anyhow::Error>(())
            })
            .unwrap();

        let handler = ShutdownHandler::new(lifecycle.clone());
        handler.shutdown().await;
        handler.shutdown().await;

        assert_eq!(closed.load(Ordering::SeqCst), 1);
        assert_eq!(lifecycle.state(), LifecycleState::Closed);
    }
}
