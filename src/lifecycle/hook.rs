//! Hook objects
//!
//! A [`HookObject`] is a named record with one optional slot per phase. The
//! dispatcher looks up the slot for a phase and skips hooks that leave it
//! empty.

use super::{
    BeforeClose, ConfigDidLoad, DidLoad, DidReady, HookPhase, HookResult, LifecycleError,
    ServerDidReady, WillReady,
};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use strum::IntoEnumIterator;
use tokio::sync::RwLock;

/// Boxed future returned by a hook invocation
pub type HookFuture = Pin<Box<dyn Future<Output = HookResult> + Send + 'static>>;

/// A lifecycle participant
///
/// # Example
///
/// ```rust,ignore
/// let db = Arc::new(RwLock::new(DatabaseService::new(config)));
///
/// let hook = HookObject::new("DatabaseService")
///     .source("app/database.rs")
///     .on_did_load(Arc::clone(&db))
///     .on_before_close(db);
/// ```
pub struct HookObject {
    name: String,
    source: Option<PathBuf>,
    config_did_load: Option<Arc<RwLock<dyn ConfigDidLoad>>>,
    did_load: Option<Arc<RwLock<dyn DidLoad>>>,
    will_ready: Option<Arc<RwLock<dyn WillReady>>>,
    did_ready: Option<Arc<RwLock<dyn DidReady>>>,
    before_close: Option<Arc<RwLock<dyn BeforeClose>>>,
    server_did_ready: Option<Arc<RwLock<dyn ServerDidReady>>>,
}

impl HookObject {
    /// Create a hook with no capabilities
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: None,
            config_did_load: None,
            did_load: None,
            will_ready: None,
            did_ready: None,
            before_close: None,
            server_did_ready: None,
        }
    }

    /// Record the file the hook was loaded from
    ///
    /// Task ids and timing spans use this path relative to the base directory.
    pub fn source(mut self, path: impl Into<PathBuf>) -> Self {
        self.source = Some(path.into());
        self
    }

    pub fn on_config_did_load<T>(mut self, service: Arc<RwLock<T>>) -> Self
    where
        T: ConfigDidLoad + 'static,
    {
        let service: Arc<RwLock<dyn ConfigDidLoad>> = service;
        self.config_did_load = Some(service);
        self
    }

    pub fn on_did_load<T>(mut self, service: Arc<RwLock<T>>) -> Self
    where
        T: DidLoad + 'static,
    {
        let service: Arc<RwLock<dyn DidLoad>> = service;
        self.did_load = Some(service);
        self
    }

    pub fn on_will_ready<T>(mut self, service: Arc<RwLock<T>>) -> Self
    where
        T: WillReady + 'static,
    {
        let service: Arc<RwLock<dyn WillReady>> = service;
        self.will_ready = Some(service);
        self
    }

    pub fn on_did_ready<T>(mut self, service: Arc<RwLock<T>>) -> Self
    where
        T: DidReady + 'static,
    {
        let service: Arc<RwLock<dyn DidReady>> = service;
        self.did_ready = Some(service);
        self
    }

    pub fn on_before_close<T>(mut self, service: Arc<RwLock<T>>) -> Self
    where
        T: BeforeClose + 'static,
    {
        let service: Arc<RwLock<dyn BeforeClose>> = service;
        self.before_close = Some(service);
        self
    }

    pub fn on_server_did_ready<T>(mut self, service: Arc<RwLock<T>>) -> Self
    where
        T: ServerDidReady + 'static,
    {
        let service: Arc<RwLock<dyn ServerDidReady>> = service;
        self.server_did_ready = Some(service);
        self
    }

    /// Hook name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Identity used for latch task ids and timing spans
    ///
    /// The source path relative to `base_dir` when one was recorded,
    /// otherwise the hook name.
    pub fn identity(&self, base_dir: &Path) -> String {
        match &self.source {
            Some(path) => path
                .strip_prefix(base_dir)
                .unwrap_or(path)
                .display()
                .to_string(),
            None => self.name.clone(),
        }
    }

    /// Whether the hook has a slot for `phase`
    pub fn implements(&self, phase: HookPhase) -> bool {
        match phase {
            HookPhase::ConfigDidLoad => self.config_did_load.is_some(),
            HookPhase::DidLoad => self.did_load.is_some(),
            HookPhase::WillReady => self.will_ready.is_some(),
            HookPhase::DidReady => self.did_ready.is_some(),
            HookPhase::BeforeClose => self.before_close.is_some(),
            HookPhase::ServerDidReady => self.server_did_ready.is_some(),
        }
    }

    /// Build the future for `phase`, or `None` if the slot is empty
    ///
    /// Nothing runs until the returned future is polled. `err` is only
    /// passed to `didReady`.
    pub fn invoke(&self, phase: HookPhase, err: Option<LifecycleError>) -> Option<HookFuture> {
        match phase {
            HookPhase::ConfigDidLoad => self.config_did_load.clone().map(|service| {
                Box::pin(async move {
                    let mut service = service.write().await;
                    service.config_did_load().await
                }) as HookFuture
            }),
            HookPhase::DidLoad => self.did_load.clone().map(|service| {
                Box::pin(async move {
                    let mut service = service.write().await;
                    service.did_load().await
                }) as HookFuture
            }),
            HookPhase::WillReady => self.will_ready.clone().map(|service| {
                Box::pin(async move {
                    let mut service = service.write().await;
                    service.will_ready().await
                }) as HookFuture
            }),
            HookPhase::DidReady => self.did_ready.clone().map(|service| {
                Box::pin(async move {
                    let mut service = service.write().await;
                    service.did_ready(err.as_ref()).await
                }) as HookFuture
            }),
            HookPhase::BeforeClose => self.before_close.clone().map(|service| {
                Box::pin(async move {
                    let mut service = service.write().await;
                    service.before_close().await
                }) as HookFuture
            }),
            HookPhase::ServerDidReady => self.server_did_ready.clone().map(|service| {
                Box::pin(async move {
                    let mut service = service.write().await;
                    service.server_did_ready().await
                }) as HookFuture
            }),
        }
    }
}

impl std::fmt::Debug for HookObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let phases: Vec<HookPhase> = HookPhase::iter()
            .filter(|phase| self.implements(*phase))
            .collect();

        f.debug_struct("HookObject")
            .field("name", &self.name)
            .field("source", &self.source)
            .field("phases", &phases)
            .finish()
    }
}
