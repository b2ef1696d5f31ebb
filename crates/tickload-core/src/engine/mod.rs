//! Download engine
//!
//! Resumable single-stream HTTP transfers:
//! - One blocking worker thread per session
//! - The destination file's length is the resume checkpoint
//! - Cooperative cancellation at chunk boundaries
//! - Optional token bucket speed limit
//! - Every notification delivered through the [`TaskScheduler`](crate::scheduler::TaskScheduler)

mod events;
mod manager;
mod throttle;
mod transport;
mod worker;

pub use events::TransferCallbacks;
pub use manager::*;
pub use throttle::*;
pub use transport::*;
