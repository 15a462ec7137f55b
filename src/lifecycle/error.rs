//! Lifecycle-specific error types

use thiserror::Error;

/// Errors that can occur during lifecycle operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    /// A construction option could not be parsed or is out of range
    #[error("Invalid configuration for {key}: {message}")]
    Configuration {
        /// Configuration key that was rejected
        key: String,
        /// Why the value was rejected
        message: String,
    },

    /// `init()` was called more than once, or hooks were added after it
    #[error("Lifecycle has already been initialized")]
    AlreadyInitialized,

    /// A teardown callback was registered after closing started
    #[error("Lifecycle is already closing or closed")]
    AlreadyClosed,

    /// An operation was invoked from the wrong state
    #[error("Invalid lifecycle state: expected {expected}, found {actual}")]
    InvalidState {
        /// State(s) the operation requires
        expected: String,
        /// State the lifecycle was in
        actual: String,
    },

    /// A task or teardown callback with the same id is already registered
    #[error("Task {id} is already registered on {latch}")]
    DuplicateTask {
        /// Latch name
        latch: String,
        /// Task id
        id: String,
    },

    /// A task was registered on a latch that has already settled
    #[error("Cannot register {id} on {latch}: latch has already settled")]
    LatePhaseRegistration {
        /// Latch name
        latch: String,
        /// Task id
        id: String,
    },

    /// A hook failed during a latched phase (`didLoad`, `willReady`, before-start tasks)
    #[error("{phase} failed for {hook}: {message}")]
    PhaseHook {
        /// Hook identity
        hook: String,
        /// Phase name
        phase: String,
        /// Error message including its context chain
        message: String,
    },

    /// A hook failed during a best-effort phase
    #[error("{phase} failed for {hook}: {message}")]
    BestEffortHook {
        /// Hook identity
        hook: String,
        /// Phase name
        phase: String,
        /// Error message including its context chain
        message: String,
    },

    /// A latch timed out while running in strict mode
    #[error("Timeout during {phase}: {message}")]
    Timeout {
        /// The latch that timed out
        phase: String,
        /// Additional error message
        message: String,
    },
}

impl LifecycleError {
    /// Create a configuration error
    pub fn configuration(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Create an invalid state error
    pub fn invalid_state(expected: impl Into<String>, actual: impl ToString) -> Self {
        Self::InvalidState {
            expected: expected.into(),
            actual: actual.to_string(),
        }
    }

    /// Create a latched-phase hook failure from the hook's own error
    pub fn phase_hook(
        hook: impl Into<String>,
        phase: impl Into<String>,
        err: &anyhow::Error,
    ) -> Self {
        Self::PhaseHook {
            hook: hook.into(),
            phase: phase.into(),
            message: format!("{err:#}"),
        }
    }

    /// Create a best-effort hook failure from the hook's own error
    pub fn best_effort(
        hook: impl Into<String>,
        phase: impl Into<String>,
        err: &anyhow::Error,
    ) -> Self {
        Self::BestEffortHook {
            hook: hook.into(),
            phase: phase.into(),
            message: format!("{err:#}"),
        }
    }

    /// Create a timeout error
    pub fn timeout(phase: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Timeout {
            phase: phase.into(),
            message: message.into(),
        }
    }

    /// Whether the error came from a hook rather than from misuse of the API
    pub fn is_hook_failure(&self) -> bool {
        matches!(self, Self::PhaseHook { .. } | Self::BestEffortHook { .. })
    }
}

/// A specialized Result type for lifecycle operations
pub type Result<T> = std::result::Result<T, LifecycleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hook_error_keeps_context_chain() {
        let err = anyhow::anyhow!("connection refused").context("opening pool");
        let error = LifecycleError::phase_hook("db", "didLoad", &err);

        assert_eq!(
            error.to_string(),
            "didLoad failed for db: opening pool: connection refused"
        );
        assert!(error.is_hook_failure());
        assert!(!LifecycleError::AlreadyClosed.is_hook_failure());
    }
}
