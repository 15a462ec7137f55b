use crate::lifecycle::{LifecycleError, Result};
use dashmap::DashMap;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Configuration key overriding the ready timeout, in milliseconds
pub const READY_TIMEOUT_ENV: &str = "MESHESTRA_READY_TIMEOUT";

/// Ready timeout used when nothing overrides it
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Configuration service
#[derive(Clone, Default)]
pub struct ConfigService {
    config: Arc<DashMap<String, String>>,
}

impl ConfigService {
    /// Snapshot of the process environment
    pub fn new() -> Self {
        let service = Self::empty();
        for (key, value) in env::vars() {
            service.set(&key, &value);
        }
        service
    }

    /// A service with no values, for explicit configuration and tests
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.config.get(key).map(|v| v.clone())
    }

    pub fn set(&self, key: &str, value: &str) {
        self.config.insert(key.to_string(), value.to_string());
    }

    pub fn remove(&self, key: &str) -> Option<String> {
        self.config.remove(key).map(|(_, value)| value)
    }
}

/// Options the lifecycle is constructed with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleOptions {
    /// Hook source paths are reported relative to this directory
    pub base_dir: PathBuf,
    /// How long each ready latch waits before timing out; zero disables the timer
    pub ready_timeout: Duration,
    /// Settle a timed-out latch with an error instead of success
    pub fail_on_timeout: bool,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self::new(".")
    }
}

impl LifecycleOptions {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            ready_timeout: DEFAULT_READY_TIMEOUT,
            fail_on_timeout: false,
        }
    }

    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }

    pub fn with_fail_on_timeout(mut self, fail_on_timeout: bool) -> Self {
        self.fail_on_timeout = fail_on_timeout;
        self
    }

    /// Apply overrides from `config`
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Configuration`] if [`READY_TIMEOUT_ENV`] is
    /// set but is not a non-negative integer.
    pub fn apply_config(mut self, config: &ConfigService) -> Result<Self> {
        if let Some(raw) = config.get(READY_TIMEOUT_ENV) {
            self.ready_timeout = parse_timeout(&raw)?;
            tracing::debug!("Ready timeout overridden to {:?}", self.ready_timeout);
        }
        Ok(self)
    }
}

fn parse_timeout(raw: &str) -> Result<Duration> {
    raw.trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|e| {
            LifecycleError::configuration(
                READY_TIMEOUT_ENV,
                format!("expected a non-negative integer of milliseconds, got {raw:?} ({e})"),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timeout() {
        let options = LifecycleOptions::new("/srv/app")
            .apply_config(&ConfigService::empty())
            .unwrap();

        assert_eq!(options.ready_timeout, Duration::from_secs(10));
        assert_eq!(options.base_dir, PathBuf::from("/srv/app"));
        assert!(!options.fail_on_timeout);
    }

    #[test]
    fn test_config_overrides_timeout() {
        let config = ConfigService::empty();
        config.set(READY_TIMEOUT_ENV, " 250 ");

        let options = LifecycleOptions::default().apply_config(&config).unwrap();
        assert_eq!(options.ready_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_invalid_timeout_is_rejected() {
        let config = ConfigService::empty();

        for raw in ["soon", "-1", "1.5", ""] {
            config.set(READY_TIMEOUT_ENV, raw);
            let err = LifecycleOptions::default().apply_config(&config).unwrap_err();
            assert!(
                matches!(&err, LifecycleError::Configuration { key, .. } if key == READY_TIMEOUT_ENV),
                "unexpected error for {raw:?}: {err}"
            );
        }
    }

    #[test]
    fn test_config_service_set_and_remove() {
        let config = ConfigService::empty();
        config.set("A", "1");
        assert_eq!(config.get("A").as_deref(), Some("1"));
        assert_eq!(config.remove("A").as_deref(), Some("1"));
        assert!(config.get("A").is_none());
    }
}
