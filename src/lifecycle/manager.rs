//! Lifecycle Manager
//!
//! Drives the phase order and owns the hook list, the two ready latches, the
//! overall readiness signal and the close registry.

use super::{
    HookDispatcher, HookFuture, HookObject, HookPhase, HookResult, LifecycleError,
    LifecycleState, ReadyLatch, ReadySignal, Result, SettleOutcome,
};
use crate::config::{ConfigService, LifecycleOptions};
use crate::messaging::{EventBus, LifecycleEvent};
use crate::timing::Timing;
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, Weak};
use tokio::sync::broadcast;

const APPLICATION_START: &str = "Application Start";
const CLOSE_REGISTRY: &str = "close";

type CloseCallback = Box<dyn FnOnce() -> Option<HookFuture> + Send>;

/// Teardown callbacks, closed last-in first-out
#[derive(Default)]
struct CloseRegistry {
    entries: Vec<(String, CloseCallback)>,
}

impl CloseRegistry {
    fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(existing, _)| existing == name)
    }

    fn insert(&mut self, name: String, callback: CloseCallback) -> Result<()> {
        if self.contains(&name) {
            return Err(duplicate_close(name));
        }
        self.entries.push((name, callback));
        Ok(())
    }

    fn pop(&mut self) -> Option<(String, CloseCallback)> {
        self.entries.pop()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

struct Inner {
    options: LifecycleOptions,
    state: Mutex<LifecycleState>,
    hooks: Mutex<Vec<Arc<HookObject>>>,
    snapshot: OnceLock<Arc<[Arc<HookObject>]>>,
    close_registry: Mutex<CloseRegistry>,
    load_latch: Arc<ReadyLatch>,
    boot_latch: OnceLock<Arc<ReadyLatch>>,
    ready: ReadySignal,
    dispatcher: HookDispatcher,
    events: EventBus,
    timing: Arc<Timing>,
}

/// Coordinates startup and shutdown phases across registered hooks
///
/// Phases run in a fixed order:
///
/// ```text
/// init()                      snapshot hooks, register beforeClose
/// trigger_config_did_load()   configDidLoad   best-effort
/// trigger_did_load()          didLoad         load latch
///   └─ load latch settles ─▶  willReady       boot latch
///        └─ boot latch settles ─▶ ready ─▶ didReady(err)   best-effort
/// trigger_server_did_ready()  serverDidReady  best-effort
/// close()                     beforeClose     reverse registration order
/// ```
///
/// A failed `didLoad` settles readiness with that error and the boot phase
/// never starts. The manager is cheap to clone; clones share state.
///
/// # Example
///
/// ```rust,ignore
/// use meshestra_lifecycle::lifecycle::LifecycleManager;
///
/// let lifecycle = LifecycleManager::new(LifecycleOptions::new(base_dir));
/// lifecycle.add_hook(HookObject::new("db").on_did_load(db.clone()).on_before_close(db))?;
///
/// lifecycle.init()?;
/// lifecycle.trigger_config_did_load().await;
/// lifecycle.trigger_did_load()?;
/// lifecycle.ready().await?;
/// // ... application runs ...
/// lifecycle.close().await?;
/// ```
#[derive(Clone)]
pub struct LifecycleManager {
    inner: Arc<Inner>,
}

impl LifecycleManager {
    /// Create a manager with its own timing recorder
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(options: LifecycleOptions) -> Self {
        Self::with_timing(options, Arc::new(Timing::new()))
    }

    /// Create a manager with options read from `config`
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Configuration`] for an invalid ready timeout.
    pub fn from_config(base_dir: impl Into<PathBuf>, config: &ConfigService) -> Result<Self> {
        let options = LifecycleOptions::new(base_dir).apply_config(config)?;
        Ok(Self::new(options))
    }

    /// Create a manager recording spans into a shared timing recorder
    pub fn with_timing(options: LifecycleOptions, timing: Arc<Timing>) -> Self {
        let events = EventBus::new();
        let load_latch = Arc::new(
            ReadyLatch::new("load", options.ready_timeout, events.clone())
                .fail_on_timeout(options.fail_on_timeout),
        );
        let dispatcher =
            HookDispatcher::new(options.base_dir.clone(), Arc::clone(&timing), events.clone())
                .with_hook_timeout(options.ready_timeout);

        let inner = Arc::new(Inner {
            options,
            state: Mutex::new(LifecycleState::Uninitialized),
            hooks: Mutex::new(Vec::new()),
            snapshot: OnceLock::new(),
            close_registry: Mutex::new(CloseRegistry::default()),
            load_latch,
            boot_latch: OnceLock::new(),
            ready: ReadySignal::new(),
            dispatcher,
            events,
            timing,
        });
        inner.timing.start(APPLICATION_START);

        let weak = Arc::downgrade(&inner);
        inner.load_latch.on_settled(move |outcome| {
            let Some(lifecycle) = upgrade(&weak) else {
                return;
            };
            match outcome {
                Err(err) => {
                    tracing::error!("Load phase failed, skipping boot phase: {}", err);
                    lifecycle.inner.ready.settle(Err(err));
                }
                Ok(()) => {
                    tracing::debug!("Load phase complete");
                    if let Err(err) = lifecycle.trigger_will_ready() {
                        lifecycle.inner.ready.settle(Err(err));
                    }
                }
            }
        });

        let weak = Arc::downgrade(&inner);
        inner.ready.on_settled(move |outcome| {
            let Some(lifecycle) = upgrade(&weak) else {
                return;
            };
            lifecycle.on_ready_settled(outcome);
        });

        Self { inner }
    }

    /// Add a hook to the end of the hook list
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::AlreadyInitialized`] once `init()` has run.
    pub fn add_hook(&self, hook: HookObject) -> Result<()> {
        let state = self.lock_state();
        if *state != LifecycleState::Uninitialized {
            return Err(LifecycleError::AlreadyInitialized);
        }
        tracing::debug!("Adding hook {}", hook.name());
        lock(&self.inner.hooks).push(Arc::new(hook));
        Ok(())
    }

    /// Freeze the hook list and register every hook's `beforeClose`
    ///
    /// # Errors
    ///
    /// - [`LifecycleError::AlreadyInitialized`] if called twice; the hook
    ///   list is left unchanged
    /// - [`LifecycleError::DuplicateTask`] if two hooks with `beforeClose`
    ///   share an identity, or one matches a name passed to
    ///   `register_before_close`; nothing is registered
    pub fn init(&self) -> Result<()> {
        let mut state = self.lock_state();
        if *state != LifecycleState::Uninitialized {
            return Err(LifecycleError::AlreadyInitialized);
        }

        let hooks: Arc<[Arc<HookObject>]> = lock(&self.inner.hooks).clone().into();
        let closers: Vec<(String, Arc<HookObject>)> = hooks
            .iter()
            .filter(|h| h.implements(HookPhase::BeforeClose))
            .map(|h| (h.identity(&self.inner.options.base_dir), Arc::clone(h)))
            .collect();

        let mut registry = lock(&self.inner.close_registry);
        for (index, (name, _)) in closers.iter().enumerate() {
            if registry.contains(name) || closers[..index].iter().any(|(n, _)| n == name) {
                return Err(duplicate_close(name.clone()));
            }
        }

        if self.inner.snapshot.set(Arc::clone(&hooks)).is_err() {
            return Err(LifecycleError::AlreadyInitialized);
        }
        for (name, hook) in closers {
            let callback: CloseCallback =
                Box::new(move || hook.invoke(HookPhase::BeforeClose, None));
            registry.insert(name, callback)?;
        }

        *state = LifecycleState::Initialized;
        tracing::info!(
            "Lifecycle initialized ({} hooks, {} close callbacks)",
            hooks.len(),
            registry.len()
        );
        Ok(())
    }

    /// Run `task` on the load latch; startup waits for it
    ///
    /// `task` runs on a later scheduling turn, never inside this call.
    ///
    /// # Errors
    ///
    /// - [`LifecycleError::LatePhaseRegistration`] once the load latch has settled
    /// - [`LifecycleError::DuplicateTask`] if `name` is already pending
    pub fn register_before_start<F, Fut>(&self, name: &str, task: F) -> Result<()>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = HookResult> + Send + 'static,
    {
        self.inner.dispatcher.schedule(
            &self.inner.load_latch,
            name,
            "Before Start",
            Box::pin(async move { task().await }),
        )
    }

    /// Register a teardown callback run by `close()`
    ///
    /// # Errors
    ///
    /// - [`LifecycleError::AlreadyClosed`] once closing has started
    /// - [`LifecycleError::DuplicateTask`] if `name` is already registered;
    ///   the existing callback is kept
    pub fn register_before_close<F, Fut>(&self, name: &str, callback: F) -> Result<()>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = HookResult> + Send + 'static,
    {
        let state = self.lock_state();
        if state.is_closing() {
            return Err(LifecycleError::AlreadyClosed);
        }

        let callback: CloseCallback =
            Box::new(move || -> Option<HookFuture> { Some(Box::pin(callback())) });
        lock(&self.inner.close_registry).insert(name.to_string(), callback)
    }

    /// Dispatch `configDidLoad` to every hook, one at a time
    pub async fn trigger_config_did_load(&self) {
        tracing::debug!("Triggering configDidLoad");
        let hooks = self.hooks();
        self.inner
            .dispatcher
            .invoke_best_effort(HookPhase::ConfigDidLoad, &hooks, None)
            .await;
    }

    /// Start the load phase
    ///
    /// Registers each hook's `didLoad` on the load latch and starts it. When
    /// the latch settles successfully the boot phase starts on its own.
    ///
    /// # Errors
    ///
    /// - [`LifecycleError::InvalidState`] unless the lifecycle is `Initialized`
    /// - latch registration errors, which also fail readiness
    pub fn trigger_did_load(&self) -> Result<()> {
        let mut state = self.lock_state();
        if *state != LifecycleState::Initialized {
            return Err(LifecycleError::invalid_state(
                LifecycleState::Initialized.as_ref(),
                *state,
            ));
        }
        *state = LifecycleState::LoadPhase;
        drop(state);

        tracing::info!("Triggering didLoad");
        let hooks = self.hooks();
        let result = self
            .inner
            .dispatcher
            .invoke_phase(HookPhase::DidLoad, &hooks, &self.inner.load_latch);
        self.inner.load_latch.start();
        result.map(|_| ())
    }

    /// Start the boot phase
    ///
    /// Called automatically once the load latch settles successfully. Only
    /// the first call creates the boot latch; later calls do nothing.
    ///
    /// # Errors
    ///
    /// - [`LifecycleError::InvalidState`] if the load latch has not settled successfully
    /// - latch registration errors
    pub fn trigger_will_ready(&self) -> Result<()> {
        let mut state = self.lock_state();
        if self.inner.boot_latch.get().is_some() {
            tracing::debug!("Boot phase already started");
            return Ok(());
        }
        if *state != LifecycleState::LoadPhase || self.inner.load_latch.outcome() != Some(Ok(())) {
            return Err(LifecycleError::invalid_state(
                "LoadPhase with a settled load latch",
                *state,
            ));
        }

        let boot_latch = Arc::new(
            ReadyLatch::new(
                "boot",
                self.inner.options.ready_timeout,
                self.inner.events.clone(),
            )
            .fail_on_timeout(self.inner.options.fail_on_timeout),
        );
        let boot_latch = Arc::clone(self.inner.boot_latch.get_or_init(|| boot_latch));
        *state = LifecycleState::BootPhase;
        drop(state);

        let weak = Arc::downgrade(&self.inner);
        boot_latch.on_settled(move |outcome| {
            if let Some(lifecycle) = upgrade(&weak) {
                lifecycle.inner.ready.settle(outcome);
            }
        });

        tracing::info!("Triggering willReady");
        let hooks = self.hooks();
        let result = self
            .inner
            .dispatcher
            .invoke_phase(HookPhase::WillReady, &hooks, &boot_latch);
        boot_latch.start();
        result.map(|_| ())
    }

    /// Dispatch `didReady(err)` to every hook, one at a time
    ///
    /// Runs automatically once readiness settles.
    pub async fn trigger_did_ready(&self, err: Option<LifecycleError>) {
        tracing::debug!("Triggering didReady");
        let hooks = self.hooks();
        self.inner
            .dispatcher
            .invoke_best_effort(HookPhase::DidReady, &hooks, err)
            .await;
    }

    /// Dispatch `serverDidReady` to every hook, one at a time
    pub async fn trigger_server_did_ready(&self) {
        tracing::debug!("Triggering serverDidReady");
        let hooks = self.hooks();
        self.inner
            .dispatcher
            .invoke_best_effort(HookPhase::ServerDidReady, &hooks, None)
            .await;
    }

    /// Wait for overall readiness
    ///
    /// Resolves with the first load-phase or boot-phase error, if any.
    pub async fn ready(&self) -> SettleOutcome {
        self.inner.ready.wait().await
    }

    /// Register a listener invoked once readiness settles
    pub fn on_ready<F>(&self, callback: F)
    where
        F: FnOnce(SettleOutcome) + Send + 'static,
    {
        self.inner.ready.on_settled(callback);
    }

    /// Run every teardown callback in reverse registration order
    ///
    /// Each callback is awaited before the next one starts, for at most the
    /// ready timeout; failures and timeouts are reported and do not stop the
    /// remaining callbacks. Publishes
    /// [`LifecycleEvent::Close`] once done. Closing an already closed
    /// lifecycle does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::InvalidState`] if another `close()` is in progress.
    pub async fn close(&self) -> Result<()> {
        {
            let mut state = self.lock_state();
            match *state {
                LifecycleState::Closed => {
                    tracing::debug!("Lifecycle already closed");
                    return Ok(());
                }
                LifecycleState::Closing => {
                    return Err(LifecycleError::invalid_state(
                        "any state before Closing",
                        *state,
                    ));
                }
                _ => *state = LifecycleState::Closing,
            }
        }

        tracing::info!("Closing lifecycle...");
        let mut executed = 0;
        loop {
            let next = lock(&self.inner.close_registry).pop();
            let Some((name, callback)) = next else {
                break;
            };
            let Some(future) = callback() else {
                continue;
            };
            tracing::debug!("Closing: {}", name);
            self.inner.dispatcher.run_best_effort(&name, future).await;
            executed += 1;
        }

        self.inner.events.publish(LifecycleEvent::Close);
        *self.lock_state() = LifecycleState::Closed;
        tracing::info!("Lifecycle closed ({} callbacks executed)", executed);
        Ok(())
    }

    pub fn state(&self) -> LifecycleState {
        *self.lock_state()
    }

    pub fn is_closed(&self) -> bool {
        self.state() == LifecycleState::Closed
    }

    /// Subscribe to lifecycle notifications
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.inner.events.subscribe()
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    pub fn timing(&self) -> &Arc<Timing> {
        &self.inner.timing
    }

    pub fn options(&self) -> &LifecycleOptions {
        &self.inner.options
    }

    /// Number of registered hooks
    pub fn hook_count(&self) -> usize {
        match self.inner.snapshot.get() {
            Some(hooks) => hooks.len(),
            None => lock(&self.inner.hooks).len(),
        }
    }

    /// The frozen hook list after `init()`, else the hooks added so far
    fn hooks(&self) -> Arc<[Arc<HookObject>]> {
        match self.inner.snapshot.get() {
            Some(hooks) => Arc::clone(hooks),
            None => lock(&self.inner.hooks).clone().into(),
        }
    }

    fn on_ready_settled(&self, outcome: SettleOutcome) {
        self.inner.timing.end(APPLICATION_START);
        {
            let mut state = self.lock_state();
            if *state < LifecycleState::Ready {
                *state = LifecycleState::Ready;
            }
        }

        let err = outcome.err();
        match &err {
            Some(err) => tracing::error!("Lifecycle failed to become ready: {}", err),
            None => tracing::info!("Lifecycle ready"),
        }

        let lifecycle = self.clone();
        tokio::spawn(async move {
            lifecycle.trigger_did_ready(err).await;
        });
    }

    fn lock_state(&self) -> MutexGuard<'_, LifecycleState> {
        lock(&self.inner.state)
    }
}

impl std::fmt::Debug for LifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleManager")
            .field("state", &self.state())
            .field("hooks", &self.hook_count())
            .field("options", &self.inner.options)
            .finish()
    }
}

fn duplicate_close(id: String) -> LifecycleError {
    LifecycleError::DuplicateTask {
        latch: CLOSE_REGISTRY.to_string(),
        id,
    }
}

fn upgrade(weak: &Weak<Inner>) -> Option<LifecycleManager> {
    weak.upgrade().map(|inner| LifecycleManager { inner })
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
