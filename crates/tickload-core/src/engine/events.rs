//! Transfer notifications delivered through the scheduler
//!
//! Workers never call user code. Every notification is a flagged task on the
//! [`TaskScheduler`], so it runs on whatever thread ticks the scheduler:
//!
//! - `progress:<id>` zero-duration, refreshed per chunk. Chunks written within
//!   one tick collapse into a single delivery of the latest value.
//! - `complete:<id>`, `failed:<id>`, `cancelled:<id>` one-shot terminal
//!   notifications. The progress task is removed before any of them is
//!   registered.

use crate::scheduler::TaskScheduler;
use std::sync::Arc;
use tickload_types::TaskOptions;
use tracing::debug;
use uuid::Uuid;

type ProgressFn = Arc<dyn Fn(f32) + Send + Sync>;
type SignalFn = Arc<dyn Fn() + Send + Sync>;
type FailureFn = Arc<dyn Fn(&str) + Send + Sync>;

/// Handlers for one transfer. All of them run on the tick thread.
#[derive(Clone, Default)]
pub struct TransferCallbacks {
    on_progress: Option<ProgressFn>,
    on_complete: Option<SignalFn>,
    on_failed: Option<FailureFn>,
    on_cancelled: Option<SignalFn>,
}

impl TransferCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Progress in [0, 1]. Never decreases; 1.0 arrives right before completion.
    pub fn on_progress<F>(mut self, f: F) -> Self
    where
        F: Fn(f32) + Send + Sync + 'static,
    {
        self.on_progress = Some(Arc::new(f));
        self
    }

    pub fn on_complete<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_complete = Some(Arc::new(f));
        self
    }

    /// Receives the error message
    pub fn on_failed<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on_failed = Some(Arc::new(f));
        self
    }

    pub fn on_cancelled<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_cancelled = Some(Arc::new(f));
        self
    }
}

impl std::fmt::Debug for TransferCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferCallbacks")
            .field("on_progress", &self.on_progress.is_some())
            .field("on_complete", &self.on_complete.is_some())
            .field("on_failed", &self.on_failed.is_some())
            .field("on_cancelled", &self.on_cancelled.is_some())
            .finish()
    }
}

/// Largest progress value a progress task may carry
const PROGRESS_CEILING: f32 = 1.0 - f32::EPSILON;

/// Posts one session's notifications onto the scheduler
pub(crate) struct Notifier {
    scheduler: Arc<TaskScheduler>,
    callbacks: TransferCallbacks,
    progress_flag: String,
    session_id: Uuid,
}

impl Notifier {
    pub(crate) fn new(
        scheduler: Arc<TaskScheduler>,
        callbacks: TransferCallbacks,
        session_id: Uuid,
    ) -> Self {
        Self {
            scheduler,
            callbacks,
            progress_flag: format!("progress:{}", session_id),
            session_id,
        }
    }

    /// Refresh the pending progress delivery with `progress`
    pub(crate) fn progress(&self, progress: f32) {
        let Some(on_progress) = self.callbacks.on_progress.clone() else {
            return;
        };
        let value = progress.clamp(0.0, PROGRESS_CEILING);
        self.scheduler.add_task_with(
            TaskOptions::next_tick().flag(self.progress_flag.clone()),
            move || on_progress(value),
        );
    }

    pub(crate) fn completed(&self) {
        let on_progress = self.callbacks.on_progress.clone();
        let on_complete = self.callbacks.on_complete.clone();
        self.terminal("complete", move || {
            if let Some(f) = &on_progress {
                f(1.0);
            }
            if let Some(f) = &on_complete {
                f();
            }
        });
    }

    pub(crate) fn failed(&self, message: String) {
        let on_failed = self.callbacks.on_failed.clone();
        self.terminal("failed", move || {
            if let Some(f) = &on_failed {
                f(&message);
            }
        });
    }

    pub(crate) fn cancelled(&self) {
        let on_cancelled = self.callbacks.on_cancelled.clone();
        self.terminal("cancelled", move || {
            if let Some(f) = &on_cancelled {
                f();
            }
        });
    }

    fn terminal<F>(&self, kind: &str, deliver: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        // A stale progress value must never land after the terminal event
        self.scheduler.discard_flag(&self.progress_flag);
        let flag = format!("{}:{}", kind, self.session_id);
        debug!("Scheduling {} notification", flag);
        self.scheduler
            .add_task_with(TaskOptions::next_tick().flag(flag), deliver);
    }
}
