//! Scheduled task state

use parking_lot::Mutex;
use std::sync::Arc;
use tickload_types::{ClockDomain, TaskOptions};
use tracing::{debug, warn};

/// Called every tick while the task runs, with progress clamped to [0, 1]
pub type UpdateCallback = Arc<dyn Fn(f32) + Send + Sync>;

/// Called each time the task fires
pub type CompletionCallback = Arc<dyn Fn() + Send + Sync>;

/// Opaque handle returned when a task is registered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskHandle(pub(crate) u64);

impl std::fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Read-only view of a registered task
#[derive(Debug, Clone, PartialEq)]
pub struct TaskInfo {
    pub handle: TaskHandle,
    pub flag: Option<String>,
    pub duration: f64,
    pub elapsed: f64,
    pub looping: bool,
    pub ignore_scale: bool,
    pub paused: bool,
}

pub(crate) struct TaskEntry {
    pub(crate) handle: TaskHandle,
    /// Fixed for the life of the entry; reusing the flag reconfigures this entry
    pub(crate) flag: Option<String>,
    pub(crate) state: Mutex<TaskState>,
}

impl TaskEntry {
    pub(crate) fn new(handle: TaskHandle, options: &TaskOptions, now: f64) -> Self {
        let mut state = TaskState::default();
        state.configure(options, now);
        Self {
            handle,
            flag: options.flag.clone(),
            state: Mutex::new(state),
        }
    }

    pub(crate) fn info(&self) -> TaskInfo {
        let state = self.state.lock();
        TaskInfo {
            handle: self.handle,
            flag: self.flag.clone(),
            duration: state.duration,
            elapsed: state.elapsed,
            looping: state.looping,
            ignore_scale: state.domain == ClockDomain::Unscaled,
            paused: state.paused,
        }
    }
}

#[derive(Default)]
pub(crate) struct TaskState {
    pub(crate) duration: f64,
    pub(crate) elapsed: f64,
    pub(crate) looping: bool,
    pub(crate) domain: ClockDomain,
    pub(crate) paused: bool,
    pub(crate) finished: bool,
    /// Set when the task is removed from the registry; pending deliveries are dropped
    pub(crate) revoked: bool,
    /// Clock reading that `elapsed` is measured from
    pub(crate) cached_base: f64,
    /// Bumped on every reconfigure
    pub(crate) generation: u64,
    pub(crate) on_update: Vec<UpdateCallback>,
    pub(crate) on_complete: Vec<CompletionCallback>,
}

/// Outcome of evaluating one task during a tick
pub(crate) struct Firing {
    pub(crate) progress: f32,
    pub(crate) fired: bool,
    /// One-shot task that fired and must leave the registry
    pub(crate) spent: bool,
    pub(crate) generation: u64,
    pub(crate) on_update: Vec<UpdateCallback>,
    pub(crate) on_complete: Vec<CompletionCallback>,
}

impl Firing {
    pub(crate) fn deliver(self) {
        for callback in &self.on_update {
            callback(self.progress);
        }
        if self.fired {
            for callback in &self.on_complete {
                callback();
            }
        }
    }
}

pub(crate) fn sanitize_duration(duration: f64) -> f64 {
    if duration.is_nan() {
        warn!("Task duration is NaN, using 0");
        0.0
    } else if duration < 0.0 {
        debug!("Negative task duration {}, using its absolute value", duration);
        duration.abs()
    } else {
        duration
    }
}

impl TaskState {
    /// Reset for a fresh run. Previously attached callbacks are dropped.
    pub(crate) fn configure(&mut self, options: &TaskOptions, now: f64) {
        self.duration = sanitize_duration(options.duration);
        self.looping = options.looping;
        self.domain = options.clock_domain();
        self.elapsed = 0.0;
        self.cached_base = now;
        self.paused = false;
        self.finished = false;
        self.generation += 1;
        self.on_update.clear();
        self.on_complete.clear();
    }

    pub(crate) fn progress(&self) -> f32 {
        if self.duration <= 0.0 {
            1.0
        } else {
            (self.elapsed / self.duration).clamp(0.0, 1.0) as f32
        }
    }

    /// Bring `elapsed` up to date with the clock
    pub(crate) fn measure(&mut self, now: f64) {
        self.elapsed = (now - self.cached_base).max(self.elapsed);
    }

    pub(crate) fn evaluate(&mut self, now: f64) -> Option<Firing> {
        if self.paused || self.finished || self.revoked {
            return None;
        }
        self.measure(now);
        let progress = self.progress();
        let fired = self.elapsed >= self.duration;
        let mut spent = false;
        if fired {
            if self.looping {
                self.cached_base = now;
                self.elapsed = 0.0;
            } else {
                self.finished = true;
                spent = true;
            }
        }
        Some(Firing {
            progress,
            fired,
            spent,
            generation: self.generation,
            on_update: self.on_update.clone(),
            on_complete: if fired {
                self.on_complete.clone()
            } else {
                Vec::new()
            },
        })
    }

    pub(crate) fn revoke(&mut self) {
        self.finished = true;
        self.revoked = true;
        self.paused = false;
        self.on_update.clear();
        self.on_complete.clear();
    }
}
