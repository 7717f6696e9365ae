use std::sync::Weak;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::monitor::controller::Shared;
use crate::monitor::job::JobHandle;

/// The live polling machinery of one job: the recurring status fetch, the
/// lifetime guard, and the token that stops both.
///
/// Dropping the cycle cancels the token and aborts both tasks, so every exit
/// path (completion, stop, reset, expiry, controller drop) tears it down.
#[derive(Debug)]
pub struct PollCycle {
    id: u64,
    token: CancellationToken,
    deadline: Instant,
    poll_task: JoinHandle<()>,
    guard_task: JoinHandle<()>,
}

impl PollCycle {
    /// Start polling `handle` every `interval` until `max_lifetime` elapses.
    pub(crate) fn start(
        shared: Weak<Shared>,
        handle: JobHandle,
        id: u64,
        interval: Duration,
        max_lifetime: Duration,
    ) -> Self {
        let token = CancellationToken::new();
        let deadline = Instant::now() + max_lifetime;

        let poller = StatusPoller::new(interval);
        let poll_task = tokio::spawn(poller.run(shared.clone(), handle.clone(), id, token.clone()));

        let guard = LifetimeGuard::new(deadline);
        let guard_task = tokio::spawn(guard.run(shared, handle, id, token.clone()));

        Self {
            id,
            token,
            deadline,
            poll_task,
            guard_task,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for PollCycle {
    fn drop(&mut self) {
        self.token.cancel();
        self.poll_task.abort();
        self.guard_task.abort();
    }
}

/// Periodically fetches the job status and hands results to the controller.
pub struct StatusPoller {
    interval: Duration,
}

impl StatusPoller {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// First fetch happens one interval after activation. A transport failure
    /// never ends the loop; only a terminal status, cancellation, or the
    /// controller going away does.
    async fn run(
        self,
        shared: Weak<Shared>,
        handle: JobHandle,
        cycle_id: u64,
        token: CancellationToken,
    ) {
        let mut interval = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::debug!(job_id = %handle, cycle_id, interval_ms = self.interval.as_millis() as u64, "Polling started");

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = interval.tick() => {}
            }

            let Some(backend) = shared.upgrade().map(|s| s.backend()) else {
                break;
            };

            let result = tokio::select! {
                _ = token.cancelled() => break,
                result = backend.fetch_status(&handle.id) => result,
            };

            let Some(controller) = shared.upgrade() else {
                break;
            };
            let keep_polling = match result {
                Ok(report) => controller.apply_report(cycle_id, report).await,
                Err(e) => controller.apply_fetch_error(cycle_id, e).await,
            };
            if !keep_polling {
                break;
            }
        }

        tracing::debug!(job_id = %handle, cycle_id, "Polling ended");
    }
}

/// Ends a poll cycle once its deadline passes, whatever the job state is.
pub struct LifetimeGuard {
    deadline: Instant,
}

impl LifetimeGuard {
    pub fn new(deadline: Instant) -> Self {
        Self { deadline }
    }

    async fn run(
        self,
        shared: Weak<Shared>,
        handle: JobHandle,
        cycle_id: u64,
        token: CancellationToken,
    ) {
        tokio::select! {
            _ = token.cancelled() => {}
            _ = tokio::time::sleep_until(self.deadline) => {
                if let Some(controller) = shared.upgrade() {
                    tracing::warn!(job_id = %handle, cycle_id, "Monitoring window elapsed, polling stopped");
                    controller.expire_cycle(cycle_id).await;
                }
            }
        }
    }
}
