//! One-shot readiness signal

use super::Result;
use tokio::sync::watch;

/// Outcome carried by a settled signal or latch
pub type SettleOutcome = Result<()>;

/// A value that settles exactly once
///
/// The first call to [`settle`](Self::settle) wins; later calls are ignored.
/// Listeners registered with [`on_settled`](Self::on_settled) always run on a
/// later scheduling turn, even if the signal has already settled.
#[derive(Debug)]
pub struct ReadySignal {
    tx: watch::Sender<Option<SettleOutcome>>,
}

impl Default for ReadySignal {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadySignal {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    /// Settle the signal; returns `false` if it had already settled
    pub fn settle(&self, outcome: SettleOutcome) -> bool {
        self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(outcome);
            true
        })
    }

    pub fn is_settled(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// The outcome, if settled
    pub fn outcome(&self) -> Option<SettleOutcome> {
        self.tx.borrow().clone()
    }

    /// Register a listener invoked once with the outcome
    ///
    /// Must be called from within a Tokio runtime. If the signal is dropped
    /// without settling, the listener is never invoked.
    pub fn on_settled<F>(&self, callback: F)
    where
        F: FnOnce(SettleOutcome) + Send + 'static,
    {
        let mut rx = self.tx.subscribe();
        tokio::spawn(async move {
            let outcome = match rx.wait_for(Option::is_some).await {
                Ok(settled) => settled.clone(),
                Err(_) => return,
            };
            if let Some(outcome) = outcome {
                callback(outcome);
            }
        });
    }

    /// Wait for the signal to settle
    pub async fn wait(&self) -> SettleOutcome {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let settled = rx.wait_for(Option::is_some).await.map(|settled| settled.clone());
        match settled {
            Ok(Some(outcome)) => outcome,
            _ => Ok(()),
        }
    }
}
