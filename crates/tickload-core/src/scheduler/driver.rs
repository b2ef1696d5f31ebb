//! Fixed-rate tick driver for tokio hosts
//!
//! Hosts without their own frame loop can let a tokio task call
//! [`TaskScheduler::tick`] on an interval. Callbacks then run on that task.

use super::TaskScheduler;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Handle to a running tick loop
pub struct TickDriver {
    cancel: CancellationToken,
    task: JoinHandle<u64>,
}

impl TickDriver {
    /// Tick `scheduler` every `period` with both clocks advancing in real time.
    /// Must be called from within a tokio runtime.
    pub fn spawn(scheduler: Arc<TaskScheduler>, period: Duration) -> Self {
        Self::spawn_scaled(scheduler, period, 1.0)
    }

    /// Like [`TickDriver::spawn`], with the scaled clock running at `time_scale`
    pub fn spawn_scaled(scheduler: Arc<TaskScheduler>, period: Duration, time_scale: f64) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut last = Instant::now();
            let mut ticks = 0u64;

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        let now = Instant::now();
                        let delta = now.duration_since(last).as_secs_f64();
                        last = now;
                        scheduler.tick(delta * time_scale, delta);
                        ticks += 1;
                    }
                }
            }

            debug!("Tick driver stopped after {} ticks", ticks);
            ticks
        });

        Self { cancel, task }
    }

    /// Token that stops the loop when cancelled
    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop ticking and wait for the loop to exit. Returns the tick count.
    pub async fn stop(self) -> u64 {
        self.cancel.cancel();
        match self.task.await {
            Ok(ticks) => ticks,
            Err(e) => {
                warn!("Tick driver task failed: {}", e);
                0
            }
        }
    }
}
