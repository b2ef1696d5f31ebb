//! tickload core
//!
//! Two pieces that work together:
//! - [`TaskScheduler`]: a tick-driven registry of timed callbacks. Whatever
//!   thread calls [`TaskScheduler::tick`] is the only thread user callbacks
//!   run on.
//! - [`DownloadEngine`]: resumable HTTP transfers on worker threads, which
//!   report back exclusively through the scheduler.
//!
//! ```no_run
//! use std::sync::Arc;
//! use tickload_core::{DownloadEngine, EngineConfig, TaskScheduler, TransferCallbacks};
//!
//! # fn main() -> Result<(), tickload_core::TickloadError> {
//! let scheduler = Arc::new(TaskScheduler::new());
//! let engine = DownloadEngine::new(Arc::clone(&scheduler), EngineConfig::default())?;
//! let handle = engine.start_download(
//!     "https://example.com/file.bin",
//!     "file.bin",
//!     TransferCallbacks::new().on_progress(|p| println!("{:.0}%", p * 100.0)),
//! )?;
//! while engine.is_active(handle) {
//!     scheduler.tick(0.016, 0.016);
//!     std::thread::sleep(std::time::Duration::from_millis(16));
//! }
//! scheduler.tick(0.016, 0.016);
//! # Ok(())
//! # }
//! ```

pub mod config;
mod engine;
mod error;
pub mod scheduler;

pub use engine::*;
pub use error::*;
pub use scheduler::{
    ClockSource, CompletionCallback, DispatchQueue, TaskHandle, TaskInfo, TaskScheduler,
    TickClock, TickDriver, UpdateCallback,
};

pub use tickload_types::{ClockDomain, DownloadSession, EngineConfig, SessionState, TaskOptions};
