use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::service::AssessmentSession;

/// Background task that ticks a session's timer once per period.
///
/// The timer keeps running while a run is in flight and stops at zero without
/// blocking anything. Dropping the handle stops the task.
#[derive(Debug)]
pub struct Countdown {
    task: JoinHandle<()>,
}

impl Countdown {
    /// Spawn the countdown on the current runtime.
    #[must_use]
    pub fn start(session: Arc<AssessmentSession>, period: Duration) -> Self {
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                // Ticks at zero would only re-save zero, so the task ends there.
                if session.tick().await == 0 {
                    tracing::info!(scenario = %session.scenario().id(), "time budget exhausted");
                    break;
                }
            }
        });
        Self { task }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    pub fn stop(self) {
        drop(self);
    }
}

impl Drop for Countdown {
    fn drop(&mut self) {
        self.task.abort();
    }
}
