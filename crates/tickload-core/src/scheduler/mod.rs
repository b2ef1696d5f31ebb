//! Tick-driven task scheduler
//!
//! The scheduler is a registry of timed callbacks. A host calls
//! [`TaskScheduler::tick`] once per update cycle; every user callback runs
//! inside that call, on the host's thread, no matter which thread registered
//! the task. Worker threads use it to marshal events onto the host thread.
//!
//! - Tasks may carry a flag. Registering a flag that is already present
//!   reconfigures the existing task and drops its callbacks.
//! - Registry mutation happens under one coarse lock. Callbacks never run
//!   while it is held, so a callback may register or remove tasks; such
//!   changes take effect on the next tick.
//! - Callback invocations are posted to a [`DispatchQueue`] that is drained
//!   at the end of each tick, after actions posted from other threads.

mod clock;
mod dispatch;
mod driver;
mod task;

pub use clock::*;
pub use dispatch::*;
pub use driver::*;
pub use task::{CompletionCallback, TaskHandle, TaskInfo, UpdateCallback};

use crate::error::SchedulerMisuse;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use task::{sanitize_duration, TaskEntry};
use tickload_types::{ClockDomain, TaskOptions};
use tracing::{debug, warn};

/// Registry of scheduled tasks driven by an external tick
pub struct TaskScheduler {
    registry: Mutex<Registry>,
    clock: Arc<dyn ClockSource>,
    dispatch: DispatchQueue,
}

#[derive(Default)]
struct Registry {
    /// Registration order, which is also firing order
    tasks: Vec<Arc<TaskEntry>>,
    flags: HashMap<String, Arc<TaskEntry>>,
    next_id: u64,
}

impl Registry {
    fn find(&self, handle: TaskHandle) -> Option<Arc<TaskEntry>> {
        self.tasks.iter().find(|e| e.handle == handle).cloned()
    }

    fn detach(&mut self, handle: TaskHandle) -> Option<Arc<TaskEntry>> {
        let index = self.tasks.iter().position(|e| e.handle == handle)?;
        let entry = self.tasks.remove(index);
        if let Some(flag) = &entry.flag {
            self.flags.remove(flag);
        }
        Some(entry)
    }
}

fn misuse<T>(error: SchedulerMisuse) -> Result<T, SchedulerMisuse> {
    warn!("Scheduler misuse: {}", error);
    Err(error)
}

impl TaskScheduler {
    /// Create a scheduler driven by its own [`TickClock`]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(TickClock::new()))
    }

    /// Create a scheduler reading a host-provided clock
    pub fn with_clock(clock: Arc<dyn ClockSource>) -> Self {
        Self {
            registry: Mutex::new(Registry::default()),
            clock,
            dispatch: DispatchQueue::new(),
        }
    }

    /// Register a task, or reconfigure the task already holding `options.flag`
    pub fn add_task(&self, options: TaskOptions) -> TaskHandle {
        self.register(options, None)
    }

    /// Register a task and attach its completion callback atomically
    ///
    /// A concurrent tick never observes the task without the callback, which
    /// matters when refreshing a flagged task from a worker thread.
    pub fn add_task_with<F>(&self, options: TaskOptions, on_complete: F) -> TaskHandle
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.register(options, Some(Arc::new(on_complete)))
    }

    fn register(&self, mut options: TaskOptions, on_complete: Option<CompletionCallback>) -> TaskHandle {
        // An empty flag is anonymous, however the options were built
        options.flag = options.flag.filter(|f| !f.is_empty());
        let now = self.clock.now(options.clock_domain());
        let mut registry = self.registry.lock();

        if let Some(flag) = &options.flag {
            if let Some(entry) = registry.flags.get(flag) {
                let mut state = entry.state.lock();
                state.configure(&options, now);
                state.on_complete.extend(on_complete);
                debug!("Reconfigured task {} ({})", entry.handle, flag);
                return entry.handle;
            }
        }

        registry.next_id += 1;
        let handle = TaskHandle(registry.next_id);
        let entry = Arc::new(TaskEntry::new(handle, &options, now));
        entry.state.lock().on_complete.extend(on_complete);
        if let Some(flag) = &options.flag {
            registry.flags.insert(flag.clone(), Arc::clone(&entry));
        }
        registry.tasks.push(entry);
        debug!(
            "Registered task {} (flag: {:?}, duration: {})",
            handle, options.flag, options.duration
        );
        handle
    }

    fn entry(&self, handle: TaskHandle) -> Result<Arc<TaskEntry>, SchedulerMisuse> {
        match self.registry.lock().find(handle) {
            Some(entry) => Ok(entry),
            None => misuse(SchedulerMisuse::UnknownTask(handle)),
        }
    }

    /// Attach a callback invoked every tick with the task's progress
    pub fn add_update_callback(
        &self,
        handle: TaskHandle,
        callback: UpdateCallback,
    ) -> Result<(), SchedulerMisuse> {
        let entry = self.entry(handle)?;
        let mut state = entry.state.lock();
        if state.finished {
            return misuse(SchedulerMisuse::TaskFinished(handle));
        }
        if state.on_update.iter().any(|c| Arc::ptr_eq(c, &callback)) {
            return misuse(SchedulerMisuse::DuplicateCallback);
        }
        state.on_update.push(callback);
        Ok(())
    }

    /// Attach a callback invoked each time the task fires
    pub fn add_completion_callback(
        &self,
        handle: TaskHandle,
        callback: CompletionCallback,
    ) -> Result<(), SchedulerMisuse> {
        let entry = self.entry(handle)?;
        let mut state = entry.state.lock();
        if state.finished {
            return misuse(SchedulerMisuse::TaskFinished(handle));
        }
        if state.on_complete.iter().any(|c| Arc::ptr_eq(c, &callback)) {
            return misuse(SchedulerMisuse::DuplicateCallback);
        }
        state.on_complete.push(callback);
        Ok(())
    }

    /// Stop a task and drop it from the registry
    pub fn remove_task(&self, handle: TaskHandle) -> Result<(), SchedulerMisuse> {
        let entry = self.registry.lock().detach(handle);
        match entry {
            Some(entry) => {
                entry.state.lock().revoke();
                debug!("Removed task {}", handle);
                Ok(())
            }
            None => misuse(SchedulerMisuse::UnknownTask(handle)),
        }
    }

    /// Stop the task registered under `flag`
    pub fn remove_flag(&self, flag: &str) -> Result<(), SchedulerMisuse> {
        if self.discard_flag(flag) {
            Ok(())
        } else {
            misuse(SchedulerMisuse::UnknownFlag(flag.to_string()))
        }
    }

    /// Remove the task under `flag` if there is one, without a warning when
    /// it already fired. Returns whether a task was removed.
    pub fn discard_flag(&self, flag: &str) -> bool {
        let entry = {
            let mut registry = self.registry.lock();
            match registry.flags.get(flag).map(|e| e.handle) {
                Some(handle) => registry.detach(handle),
                None => None,
            }
        };
        match entry {
            Some(entry) => {
                entry.state.lock().revoke();
                debug!("Removed task {} ({})", entry.handle, flag);
                true
            }
            None => false,
        }
    }

    /// Stop every task. Returns how many were removed.
    pub fn remove_all(&self) -> usize {
        let entries = {
            let mut registry = self.registry.lock();
            registry.flags.clear();
            std::mem::take(&mut registry.tasks)
        };
        for entry in &entries {
            entry.state.lock().revoke();
        }
        entries.len()
    }

    /// Remove all tasks and drop undelivered actions
    pub fn shutdown(&self) {
        let tasks = self.remove_all();
        let actions = self.dispatch.clear();
        debug!(
            "Scheduler shut down ({} tasks, {} pending actions dropped)",
            tasks, actions
        );
    }

    pub fn exists(&self, flag: &str) -> bool {
        self.registry.lock().flags.contains_key(flag)
    }

    pub fn lookup(&self, flag: &str) -> Option<TaskHandle> {
        self.registry.lock().flags.get(flag).map(|e| e.handle)
    }

    pub fn contains(&self, handle: TaskHandle) -> bool {
        self.registry.lock().find(handle).is_some()
    }

    pub fn info(&self, handle: TaskHandle) -> Option<TaskInfo> {
        self.registry.lock().find(handle).map(|e| e.info())
    }

    /// Number of registered tasks
    pub fn len(&self) -> usize {
        self.registry.lock().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Freeze a task's elapsed time
    pub fn pause(&self, handle: TaskHandle) -> Result<(), SchedulerMisuse> {
        let entry = self.entry(handle)?;
        let mut state = entry.state.lock();
        if state.finished {
            return misuse(SchedulerMisuse::TaskFinished(handle));
        }
        if !state.paused {
            let now = self.clock.now(state.domain);
            state.measure(now);
            state.paused = true;
        }
        Ok(())
    }

    /// Continue a paused task from the elapsed time it was frozen at
    pub fn resume(&self, handle: TaskHandle) -> Result<(), SchedulerMisuse> {
        let entry = self.entry(handle)?;
        let mut state = entry.state.lock();
        if state.finished {
            return misuse(SchedulerMisuse::TaskFinished(handle));
        }
        if !state.paused {
            return misuse(SchedulerMisuse::NotPaused(handle));
        }
        state.cached_base = self.clock.now(state.domain) - state.elapsed;
        state.paused = false;
        Ok(())
    }

    /// Change how long a running task waits. A duration already exceeded
    /// fires on the next tick.
    pub fn set_duration(&self, handle: TaskHandle, duration: f64) -> Result<(), SchedulerMisuse> {
        let entry = self.entry(handle)?;
        let mut state = entry.state.lock();
        if state.finished {
            return misuse(SchedulerMisuse::TaskFinished(handle));
        }
        let duration = sanitize_duration(duration);
        if duration < state.elapsed {
            debug!(
                "Task {} duration {} is below elapsed {}, firing early",
                handle, duration, state.elapsed
            );
        }
        state.duration = duration;
        Ok(())
    }

    pub fn set_looping(&self, handle: TaskHandle, looping: bool) -> Result<(), SchedulerMisuse> {
        let entry = self.entry(handle)?;
        let mut state = entry.state.lock();
        if state.finished {
            return misuse(SchedulerMisuse::TaskFinished(handle));
        }
        state.looping = looping;
        Ok(())
    }

    /// Switch a running task between the scaled and unscaled clocks,
    /// keeping the time it has already accumulated.
    pub fn set_ignore_scale(
        &self,
        handle: TaskHandle,
        ignore_scale: bool,
    ) -> Result<(), SchedulerMisuse> {
        let entry = self.entry(handle)?;
        let mut state = entry.state.lock();
        if state.finished {
            return misuse(SchedulerMisuse::TaskFinished(handle));
        }
        let domain = if ignore_scale {
            ClockDomain::Unscaled
        } else {
            ClockDomain::Scaled
        };
        if domain != state.domain {
            if !state.paused {
                let now = self.clock.now(state.domain);
                state.measure(now);
            }
            state.domain = domain;
            state.cached_base = self.clock.now(domain) - state.elapsed;
        }
        Ok(())
    }

    /// Queue an action to run on the next tick
    pub fn post<F>(&self, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.dispatch.post(action);
    }

    /// Advance the clocks and run everything that is due
    pub fn tick(&self, scaled_delta: f64, unscaled_delta: f64) {
        self.clock.advance(scaled_delta, unscaled_delta);

        // Callbacks may register or remove tasks; iterate a copy
        let snapshot: Vec<Arc<TaskEntry>> = self.registry.lock().tasks.clone();

        let mut spent = Vec::new();
        for entry in &snapshot {
            let firing = {
                let mut state = entry.state.lock();
                let now = self.clock.now(state.domain);
                state.evaluate(now)
            };
            let Some(firing) = firing else {
                continue;
            };
            if firing.spent {
                spent.push((Arc::clone(entry), firing.generation));
            }
            let entry = Arc::clone(entry);
            self.dispatch.post(move || {
                // Removed between evaluation and delivery
                if entry.state.lock().revoked {
                    return;
                }
                firing.deliver();
            });
        }

        if !spent.is_empty() {
            let mut registry = self.registry.lock();
            for (entry, generation) in spent {
                let mut state = entry.state.lock();
                // Reconfigured by another thread since evaluation: keep it
                if state.generation != generation {
                    continue;
                }
                state.on_update.clear();
                state.on_complete.clear();
                drop(state);
                registry.detach(entry.handle);
            }
        }

        self.dispatch.drain();
    }
}

impl Default for TaskScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TaskScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskScheduler")
            .field("tasks", &self.len())
            .field("dispatch", &self.dispatch)
            .finish()
    }
}
