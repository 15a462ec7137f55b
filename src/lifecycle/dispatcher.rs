//! Hook dispatcher
//!
//! Runs one phase method across the hook list. Latched phases register every
//! task before any hook starts; best-effort phases run hooks one at a time
//! and isolate failures.

use super::{
    HookFuture, HookObject, HookPhase, HookResult, LifecycleError, ReadyLatch, Result, TaskHandle,
};
use crate::messaging::{EventBus, LifecycleEvent};
use crate::timing::Timing;
use futures::FutureExt;
use futures::future::join_all;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;

/// A registered latch task waiting for its turn to run
struct QueuedTask {
    handle: TaskHandle,
    hook: String,
    phase: String,
    timing_key: String,
    future: HookFuture,
}

/// Dispatches hook methods for a phase
#[derive(Clone)]
pub struct HookDispatcher {
    base_dir: PathBuf,
    timing: Arc<Timing>,
    events: EventBus,
    hook_timeout: Duration,
}

impl HookDispatcher {
    pub fn new(base_dir: impl Into<PathBuf>, timing: Arc<Timing>, events: EventBus) -> Self {
        Self {
            base_dir: base_dir.into(),
            timing,
            events,
            hook_timeout: Duration::ZERO,
        }
    }

    /// Bound every best-effort and teardown invocation; zero waits forever
    ///
    /// Latched phases are never bounded here. Their latch timeout only
    /// unblocks the next phase and leaves the hook running.
    pub fn with_hook_timeout(mut self, timeout: Duration) -> Self {
        self.hook_timeout = timeout;
        self
    }

    /// Run `phase` on every hook implementing it, as tasks on `latch`
    ///
    /// All tasks are registered before any hook method is polled; the
    /// methods then run concurrently on a single spawned task. Returns the
    /// number of tasks registered.
    ///
    /// # Errors
    ///
    /// Returns the latch registration error. Tasks already queued for this
    /// call are completed with that error so the latch still settles.
    pub fn invoke_phase(
        &self,
        phase: HookPhase,
        hooks: &[Arc<HookObject>],
        latch: &Arc<ReadyLatch>,
    ) -> Result<usize> {
        let mut queue = Vec::new();

        for hook in hooks {
            let Some(future) = hook.invoke(phase, None) else {
                continue;
            };
            let identity = hook.identity(&self.base_dir);
            match latch.register_task(identity.clone()) {
                Ok(handle) => queue.push(QueuedTask {
                    handle,
                    timing_key: format!("{} in {}", phase.timing_prefix(), identity),
                    hook: identity,
                    phase: phase.to_string(),
                    future,
                }),
                Err(err) => {
                    for task in queue {
                        task.handle.complete(Err(err.clone()));
                    }
                    return Err(err);
                }
            }
        }

        let registered = queue.len();
        tracing::debug!(
            "[{}] registered {} {} task(s)",
            latch.name(),
            registered,
            phase
        );
        self.drain(queue);
        Ok(registered)
    }

    /// Register a single ad-hoc task on `latch` and run `future` on a later turn
    pub fn schedule(
        &self,
        latch: &Arc<ReadyLatch>,
        name: &str,
        timing_prefix: &str,
        future: HookFuture,
    ) -> Result<()> {
        let handle = latch.register_task(name)?;
        self.drain(vec![QueuedTask {
            handle,
            hook: name.to_string(),
            phase: timing_prefix.to_string(),
            timing_key: format!("{timing_prefix} in {name}"),
            future,
        }]);
        Ok(())
    }

    /// Run `phase` sequentially on every hook implementing it
    ///
    /// A failing or panicking hook is logged and published as
    /// [`LifecycleEvent::Error`]; the remaining hooks still run. Returns the
    /// number of failed hooks.
    pub async fn invoke_best_effort(
        &self,
        phase: HookPhase,
        hooks: &[Arc<HookObject>],
        err: Option<LifecycleError>,
    ) -> usize {
        let mut failures = 0;

        for hook in hooks {
            let Some(future) = hook.invoke(phase, err.clone()) else {
                continue;
            };
            let identity = hook.identity(&self.base_dir);
            let timing_key = format!("{} in {}", phase.timing_prefix(), identity);

            let span = tracing::info_span!("lifecycle_hook", hook = %identity, phase = %phase);
            self.timing.start(timing_key.clone());
            let result = self.run_bounded(future).instrument(span).await;
            self.timing.end(&timing_key);

            if let Err(e) = result {
                failures += 1;
                let error = LifecycleError::best_effort(&identity, phase.as_ref(), &e);
                tracing::error!("{} failed for {}: {:#}", phase, identity, e);
                self.events.publish(LifecycleEvent::Error(error));
            }
        }

        failures
    }

    /// Run closure-based teardown the same way as a best-effort hook
    pub(crate) async fn run_best_effort(&self, name: &str, future: HookFuture) -> bool {
        let phase = HookPhase::BeforeClose;
        let timing_key = format!("{} in {}", phase.timing_prefix(), name);
        let span = tracing::info_span!("lifecycle_hook", hook = %name, phase = %phase);

        self.timing.start(timing_key.clone());
        let result = self.run_bounded(future).instrument(span).await;
        self.timing.end(&timing_key);

        match result {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("{} failed for {}: {:#}", phase, name, e);
                self.events.publish(LifecycleEvent::Error(LifecycleError::best_effort(
                    name,
                    phase.as_ref(),
                    &e,
                )));
                false
            }
        }
    }

    /// Await a best-effort hook, giving up once the hook timeout elapses
    ///
    /// A hook still holding its service lock from a timed-out latched phase
    /// would otherwise block every hook after it.
    async fn run_bounded(&self, future: HookFuture) -> HookResult {
        if self.hook_timeout.is_zero() {
            return run_guarded(future).await;
        }
        match tokio::time::timeout(self.hook_timeout, run_guarded(future)).await {
            Ok(result) => result,
            Err(_) => Err(anyhow::anyhow!(
                "timed out after {}ms",
                self.hook_timeout.as_millis()
            )),
        }
    }

    fn drain(&self, queue: Vec<QueuedTask>) {
        if queue.is_empty() {
            return;
        }
        let timing = Arc::clone(&self.timing);
        tokio::spawn(async move {
            join_all(
                queue
                    .into_iter()
                    .map(|task| run_latched(task, Arc::clone(&timing))),
            )
            .await;
        });
    }
}

async fn run_latched(task: QueuedTask, timing: Arc<Timing>) {
    let QueuedTask {
        handle,
        hook,
        phase,
        timing_key,
        future,
    } = task;

    let span = tracing::info_span!("lifecycle_hook", hook = %hook, phase = %phase);
    timing.start(timing_key.clone());
    let result = run_guarded(future).instrument(span).await;
    timing.end(&timing_key);

    handle.complete(result.map_err(|e| LifecycleError::phase_hook(hook, phase, &e)));
}

/// Await a hook, turning a panic into an error
async fn run_guarded(future: HookFuture) -> HookResult {
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(anyhow::anyhow!("hook panicked: {}", panic_message(&*panic))),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::{DidLoad, ServerDidReady, WillReady};
    use std::time::Duration;
    use tokio::sync::RwLock;

    struct Recorder {
        name: &'static str,
        fail: bool,
        log: Arc<RwLock<Vec<String>>>,
    }

    impl Recorder {
        fn shared(
            name: &'static str,
            fail: bool,
            log: &Arc<RwLock<Vec<String>>>,
        ) -> Arc<RwLock<Self>> {
            Arc::new(RwLock::new(Self {
                name,
                fail,
                log: Arc::clone(log),
            }))
        }

        async fn record(&self, method: &str) -> HookResult {
            self.log.write().await.push(format!("{}.{}", self.name, method));
            if self.fail {
                anyhow::bail!("{} refused to {}", self.name, method);
            }
            Ok(())
        }
    }

    #[async_trait::async_trait]
    impl DidLoad for Recorder {
        async fn did_load(&mut self) -> HookResult {
            self.record("didLoad").await
        }
    }

    #[async_trait::async_trait]
    impl WillReady for Recorder {
        async fn will_ready(&mut self) -> HookResult {
            if self.name == "panicky" {
                panic!("boom");
            }
            self.record("willReady").await
        }
    }

    #[async_trait::async_trait]
    impl ServerDidReady for Recorder {
        async fn server_did_ready(&mut self) -> HookResult {
            self.record("serverDidReady").await
        }
    }

    fn dispatcher() -> (HookDispatcher, Arc<Timing>, EventBus) {
        let timing = Arc::new(Timing::new());
        let events = EventBus::new();
        (
            HookDispatcher::new("/srv/app", Arc::clone(&timing), events.clone()),
            timing,
            events,
        )
    }

    #[tokio::test]
    async fn test_registers_one_task_per_implementing_hook() {
        let (dispatcher, timing, events) = dispatcher();
        let log = Arc::new(RwLock::new(Vec::new()));

        let hooks = vec![
            Arc::new(HookObject::new("a").on_did_load(Recorder::shared("a", false, &log))),
            Arc::new(HookObject::new("b")),
            Arc::new(
                HookObject::new("c")
                    .source("/srv/app/plugins/c.rs")
                    .on_did_load(Recorder::shared("c", false, &log)),
            ),
        ];
        let latch = Arc::new(ReadyLatch::new("load", Duration::from_secs(5), events));

        let registered = dispatcher
            .invoke_phase(HookPhase::DidLoad, &hooks, &latch)
            .unwrap();
        assert_eq!(registered, 2);
        assert_eq!(latch.pending_tasks(), vec!["a", "plugins/c.rs"]);
        // Nothing runs until every task is registered and the caller yields.
        assert!(log.read().await.is_empty());

        latch.start();
        assert_eq!(latch.wait().await, Ok(()));
        assert_eq!(*log.read().await, vec!["a.didLoad", "c.didLoad"]);

        let names: Vec<String> = timing.entries().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["Did Load in a", "Did Load in plugins/c.rs"]);
    }

    #[tokio::test]
    async fn test_failing_hook_does_not_stop_siblings() {
        let (dispatcher, _, events) = dispatcher();
        let log = Arc::new(RwLock::new(Vec::new()));

        let hooks = vec![
            Arc::new(HookObject::new("bad").on_did_load(Recorder::shared("bad", true, &log))),
            Arc::new(HookObject::new("good").on_did_load(Recorder::shared("good", false, &log))),
        ];
        let latch = Arc::new(ReadyLatch::new("load", Duration::from_secs(5), events));

        dispatcher
            .invoke_phase(HookPhase::DidLoad, &hooks, &latch)
            .unwrap();
        latch.start();

        let err = latch.wait().await.unwrap_err();
        assert_eq!(
            err,
            LifecycleError::PhaseHook {
                hook: "bad".into(),
                phase: "didLoad".into(),
                message: "bad refused to didLoad".into(),
            }
        );
        assert_eq!(*log.read().await, vec!["bad.didLoad", "good.didLoad"]);
    }

    #[tokio::test]
    async fn test_panicking_hook_completes_with_error() {
        let (dispatcher, _, events) = dispatcher();
        let log = Arc::new(RwLock::new(Vec::new()));
        let hooks = vec![
            Arc::new(
                HookObject::new("panicky")
                    .on_will_ready(Recorder::shared("panicky", false, &log)),
            ),
            Arc::new(HookObject::new("ok").on_will_ready(Recorder::shared("ok", false, &log))),
        ];
        let latch = Arc::new(ReadyLatch::new("boot", Duration::from_secs(5), events));

        dispatcher
            .invoke_phase(HookPhase::WillReady, &hooks, &latch)
            .unwrap();
        latch.start();

        let err = latch.wait().await.unwrap_err();
        assert!(err.to_string().contains("hook panicked: boom"), "{err}");
        assert_eq!(*log.read().await, vec!["ok.willReady"]);
    }

    #[tokio::test]
    async fn test_registration_failure_completes_queued_tasks() {
        let (dispatcher, _, events) = dispatcher();
        let log = Arc::new(RwLock::new(Vec::new()));
        let hooks = vec![
            Arc::new(HookObject::new("dup").on_did_load(Recorder::shared("one", false, &log))),
            Arc::new(HookObject::new("dup").on_did_load(Recorder::shared("two", false, &log))),
        ];
        let latch = Arc::new(ReadyLatch::new("load", Duration::from_secs(5), events));

        let err = dispatcher
            .invoke_phase(HookPhase::DidLoad, &hooks, &latch)
            .unwrap_err();
        assert!(matches!(err, LifecycleError::DuplicateTask { .. }));

        latch.start();
        assert_eq!(latch.wait().await, Err(err));
        assert!(log.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_best_effort_isolates_failures() {
        let (dispatcher, _, events) = dispatcher();
        let mut rx = events.subscribe();
        let log = Arc::new(RwLock::new(Vec::new()));

        let hooks = vec![
            Arc::new(
                HookObject::new("first").on_server_did_ready(Recorder::shared("first", true, &log)),
            ),
            Arc::new(HookObject::new("skipped")),
            Arc::new(
                HookObject::new("second")
                    .on_server_did_ready(Recorder::shared("second", false, &log)),
            ),
        ];

        let failures = dispatcher
            .invoke_best_effort(HookPhase::ServerDidReady, &hooks, None)
            .await;

        assert_eq!(failures, 1);
        assert_eq!(
            *log.read().await,
            vec!["first.serverDidReady", "second.serverDidReady"]
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            LifecycleEvent::Error(LifecycleError::BestEffortHook {
                hook: "first".into(),
                phase: "serverDidReady".into(),
                message: "first refused to serverDidReady".into(),
            })
        );
    }

    #[tokio::test]
    async fn test_best_effort_gives_up_on_stuck_hook() {
        struct Stalled;

        #[async_trait::async_trait]
        impl ServerDidReady for Stalled {
            async fn server_did_ready(&mut self) -> HookResult {
                std::future::pending::<()>().await;
                Ok(())
            }
        }

        let (dispatcher, _, events) = dispatcher();
        let dispatcher = dispatcher.with_hook_timeout(Duration::from_millis(30));
        let mut rx = events.subscribe();
        let log = Arc::new(RwLock::new(Vec::new()));

        let hooks = vec![
            Arc::new(
                HookObject::new("stalled").on_server_did_ready(Arc::new(RwLock::new(Stalled))),
            ),
            Arc::new(
                HookObject::new("next").on_server_did_ready(Recorder::shared("next", false, &log)),
            ),
        ];

        let failures = tokio::time::timeout(
            Duration::from_secs(1),
            dispatcher.invoke_best_effort(HookPhase::ServerDidReady, &hooks, None),
        )
        .await
        .unwrap();

        assert_eq!(failures, 1);
        assert_eq!(*log.read().await, vec!["next.serverDidReady"]);
        assert_eq!(
            rx.recv().await.unwrap(),
            LifecycleEvent::Error(LifecycleError::BestEffortHook {
                hook: "stalled".into(),
                phase: "serverDidReady".into(),
                message: "timed out after 30ms".into(),
            })
        );
    }

    #[tokio::test]
    async fn test_schedule_runs_future_as_latch_task() {
        let (dispatcher, _, events) = dispatcher();
        let latch = Arc::new(ReadyLatch::new("load", Duration::from_secs(5), events));

        dispatcher
            .schedule(
                &latch,
                "warm cache",
                "Before Start",
                Box::pin(async { Err::<(), _>(anyhow::anyhow!("cache offline")) }),
            )
            .unwrap();
        latch.start();

        let err = latch.wait().await.unwrap_err();
        assert_eq!(
            err,
            LifecycleError::PhaseHook {
                hook: "warm cache".into(),
                phase: "Before Start".into(),
                message: "cache offline".into(),
            }
        );
    }
}
