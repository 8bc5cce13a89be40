use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::traits::Clock;

/// Handle to a deferred action. Dropping the handle does not cancel it.
#[derive(Debug)]
pub struct ScheduledTask {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    /// Cancel the action if it has not started yet.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Wait for the action to run or be cancelled.
    pub async fn join(self) {
        let _ = self.handle.await;
    }
}

/// Runs futures after a delay measured on the injected [`Clock`].
#[derive(Clone)]
pub struct Scheduler<C: Clock> {
    clock: C,
}

impl<C: Clock> Scheduler<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    pub fn schedule<F>(&self, delay: Duration, action: F) -> ScheduledTask
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        // Deadline counts from the call, not from the first poll.
        let sleep = self.clock.sleep(delay);

        let handle = tokio::spawn(async move {
            tokio::select! {
                () = sleep => action.await,
                () = cancelled.cancelled() => {
                    tracing::debug!("Scheduled task cancelled");
                }
            }
        });

        ScheduledTask { token, handle }
    }
}
