//! Ready latch
//!
//! A countdown barrier over named tasks. The latch settles once, when every
//! registered task has completed or the timeout fires, whichever comes first.

use super::{LifecycleError, ReadySignal, Result, SettleOutcome};
use crate::messaging::{EventBus, LifecycleEvent};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::AbortHandle;

#[derive(Default)]
struct LatchState {
    /// Pending task ids in registration order
    pending: Vec<String>,
    started: bool,
    first_error: Option<LifecycleError>,
    later_errors: Vec<LifecycleError>,
    timer: Option<AbortHandle>,
}

/// Countdown barrier with a timeout
///
/// # Example
///
/// ```rust,ignore
/// let latch = Arc::new(ReadyLatch::new("load", Duration::from_secs(10), events));
/// let task = latch.register_task("db")?;
/// latch.start();
///
/// tokio::spawn(async move {
///     let result = connect().await;
///     task.complete(result);
/// });
///
/// latch.wait().await?;
/// ```
pub struct ReadyLatch {
    name: String,
    timeout: Duration,
    fail_on_timeout: bool,
    events: EventBus,
    state: Mutex<LatchState>,
    signal: ReadySignal,
}

impl ReadyLatch {
    pub fn new(name: impl Into<String>, timeout: Duration, events: EventBus) -> Self {
        Self {
            name: name.into(),
            timeout,
            fail_on_timeout: false,
            events,
            state: Mutex::new(LatchState::default()),
            signal: ReadySignal::new(),
        }
    }

    /// Settle with [`LifecycleError::Timeout`] instead of success when the timer fires
    pub fn fail_on_timeout(mut self, fail_on_timeout: bool) -> Self {
        self.fail_on_timeout = fail_on_timeout;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add a pending task
    ///
    /// # Errors
    ///
    /// - [`LifecycleError::LatePhaseRegistration`] if the latch has settled
    /// - [`LifecycleError::DuplicateTask`] if `id` is already pending
    pub fn register_task(self: &Arc<Self>, id: impl Into<String>) -> Result<TaskHandle> {
        let id = id.into();
        let mut state = self.lock();

        if self.signal.is_settled() {
            return Err(LifecycleError::LatePhaseRegistration {
                latch: self.name.clone(),
                id,
            });
        }
        if state.pending.contains(&id) {
            return Err(LifecycleError::DuplicateTask {
                latch: self.name.clone(),
                id,
            });
        }

        tracing::debug!("[{}] register task {}", self.name, id);
        state.pending.push(id.clone());
        Ok(TaskHandle {
            latch: Arc::clone(self),
            id,
        })
    }

    /// Arm the timeout and allow the latch to settle
    ///
    /// An empty latch settles successfully on the next scheduling turn. Must
    /// be called from within a Tokio runtime. Calling it again does nothing.
    pub fn start(self: &Arc<Self>) {
        let mut state = self.lock();
        if state.started {
            return;
        }
        state.started = true;

        if !self.timeout.is_zero() {
            let latch = Arc::downgrade(self);
            let timeout = self.timeout;
            let timer = tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                if let Some(latch) = latch.upgrade() {
                    latch.on_timeout();
                }
            });
            state.timer = Some(timer.abort_handle());
        }

        let latch = Arc::downgrade(self);
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            if let Some(latch) = latch.upgrade() {
                latch.settle_if_drained();
            }
        });
    }

    pub fn is_started(&self) -> bool {
        self.lock().started
    }

    pub fn is_settled(&self) -> bool {
        self.signal.is_settled()
    }

    /// The settlement outcome, if settled
    pub fn outcome(&self) -> Option<SettleOutcome> {
        self.signal.outcome()
    }

    /// Ids of tasks that have not completed yet
    pub fn pending_tasks(&self) -> Vec<String> {
        self.lock().pending.clone()
    }

    /// Errors reported after the first one
    pub fn later_errors(&self) -> Vec<LifecycleError> {
        self.lock().later_errors.clone()
    }

    /// Register a listener invoked once the latch settles
    pub fn on_settled<F>(&self, callback: F)
    where
        F: FnOnce(SettleOutcome) + Send + 'static,
    {
        self.signal.on_settled(callback);
    }

    /// Wait for the latch to settle
    pub async fn wait(&self) -> SettleOutcome {
        self.signal.wait().await
    }

    fn complete(&self, id: &str, result: SettleOutcome) {
        let mut state = self.lock();

        match state.pending.iter().position(|pending| pending == id) {
            Some(index) => {
                state.pending.remove(index);
            }
            None => {
                tracing::warn!("[{}] completed unknown task {}", self.name, id);
                return;
            }
        }

        if let Err(err) = result {
            tracing::error!("[{}] task {} failed: {}", self.name, id, err);
            self.events.publish(LifecycleEvent::Error(err.clone()));
            if state.first_error.is_none() {
                state.first_error = Some(err);
            } else {
                state.later_errors.push(err);
            }
        }

        let remain = state.pending.len();
        tracing::info!(
            "[{}] end ready task {}, remain {:?}",
            self.name,
            id,
            state.pending
        );
        self.events.publish(LifecycleEvent::ReadyStat {
            latch: self.name.clone(),
            id: id.to_string(),
            remain,
        });

        if state.started && remain == 0 {
            self.settle(&mut state, None);
        }
    }

    fn settle_if_drained(&self) {
        let mut state = self.lock();
        if state.pending.is_empty() {
            self.settle(&mut state, None);
        }
    }

    fn on_timeout(&self) {
        let mut state = self.lock();
        if self.signal.is_settled() {
            return;
        }

        for id in &state.pending {
            tracing::warn!(
                "[{}] {} still doing, {}ms check ready",
                self.name,
                id,
                self.timeout.as_millis()
            );
            self.events.publish(LifecycleEvent::ReadyTimeout {
                latch: self.name.clone(),
                id: id.clone(),
            });
        }

        let timeout_error = self.fail_on_timeout.then(|| {
            LifecycleError::timeout(
                self.name.clone(),
                format!(
                    "{} task(s) still pending after {:?}: {}",
                    state.pending.len(),
                    self.timeout,
                    state.pending.join(", ")
                ),
            )
        });
        self.settle(&mut state, timeout_error);
    }

    /// Settle with the first recorded error, else `fallback`, else success
    fn settle(&self, state: &mut LatchState, fallback: Option<LifecycleError>) {
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }

        let outcome = match state.first_error.clone().or(fallback) {
            Some(err) => Err(err),
            None => Ok(()),
        };
        if self.signal.settle(outcome) {
            tracing::info!("[{}] ready latch settled", self.name);
        }
    }

    fn lock(&self) -> MutexGuard<'_, LatchState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for ReadyLatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadyLatch")
            .field("name", &self.name)
            .field("timeout", &self.timeout)
            .field("pending", &self.pending_tasks())
            .field("settled", &self.is_settled())
            .finish()
    }
}

/// Completion handle for one latch task
///
/// Consumed on completion, so each task completes at most once. Dropping the
/// handle leaves the task pending until the latch times out.
#[must_use = "a task that is never completed holds the latch until it times out"]
pub struct TaskHandle {
    latch: Arc<ReadyLatch>,
    id: String,
}

impl TaskHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Complete the task, recording `result` on the latch
    pub fn complete(self, result: SettleOutcome) {
        self.latch.complete(&self.id, result);
    }

    /// Complete the task successfully
    pub fn done(self) {
        self.complete(Ok(()));
    }
}

impl std::fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("latch", &self.latch.name)
            .field("id", &self.id)
            .finish()
    }
}
